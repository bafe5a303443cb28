//! Performance counter catalog.
//!
//! Resolves counter references (numeric ID or symbolic name) against the
//! descriptors reported by the host probe tool, and explains why a reference
//! cannot be used on this CPU.

mod database;
mod descriptor;
mod probe;

pub use database::{CounterDatabase, Validation};
pub use descriptor::{CounterDescriptor, CounterRef};
pub use probe::{ProbeBuild, ProbeConfig};

use thiserror::Error;

/// Counter catalog errors.
#[derive(Error, Debug)]
pub enum CounterError {
    #[error("failed to run counter probe {tool}: {source}")]
    ProbeSpawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to build counter probe: {0}")]
    ProbeBuild(String),
    #[error("counter probe exited with {status}: {stderr}")]
    ProbeFailed { status: String, stderr: String },
    #[error("counter probe produced no counters")]
    EmptyFeed,
    #[error("malformed counter feed at line {line}: {reason}")]
    Malformed { line: u64, reason: String },
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, CounterError>;
