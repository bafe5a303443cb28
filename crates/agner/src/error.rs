use thiserror::Error;

use crate::merge::MergeError;
use crate::pipeline::Stage;

/// Harness errors.
#[derive(Error, Debug)]
pub enum Error {
    #[error("counter catalog error: {0}")]
    Counters(#[from] agner_counters::CounterError),
    #[error("Counter validation failed:{}", format_list(.0))]
    CounterValidation(Vec<String>),
    #[error("failed to start {stage}: {source}")]
    Spawn {
        stage: Stage,
        #[source]
        source: std::io::Error,
    },
    #[error("{stage} failed: {source}")]
    StageIo {
        stage: Stage,
        #[source]
        source: std::io::Error,
    },
    #[error("{stage} failed ({status}){}", format_stderr(.stderr))]
    Pipeline {
        stage: Stage,
        status: String,
        stderr: String,
    },
    #[error("malformed benchmark output at line {line}: {reason}")]
    MalformedOutput { line: usize, reason: String },
    #[error(transparent)]
    Merge(#[from] MergeError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot error: {0}")]
    Snapshot(#[from] serde_json::Error),
    #[error("{test}: {source}")]
    Test {
        test: String,
        #[source]
        source: Box<Error>,
    },
    #[error("unexpected result shape: {0}")]
    ResultShape(String),
}

pub type Result<T> = std::result::Result<T, Error>;

fn format_list(errors: &[String]) -> String {
    errors.iter().map(|e| format!("\n  - {e}")).collect()
}

fn format_stderr(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {stderr}")
    }
}
