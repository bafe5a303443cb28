//! Host counter probe.
//!
//! The probe is a small native tool that detects the CPU's PMC scheme and
//! family and prints every counter definition as CSV.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, info};

use crate::{CounterDatabase, CounterError, Result};

/// How to find (and if needed, build) the probe tool.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Path to the probe executable.
    pub tool: PathBuf,
    /// How to build the tool when it is missing.
    pub build: Option<ProbeBuild>,
}

/// `make` invocation that produces the probe tool.
#[derive(Debug, Clone)]
pub struct ProbeBuild {
    /// Directory holding the Makefile.
    pub dir: PathBuf,
    pub make: String,
    pub args: Vec<String>,
}

impl ProbeConfig {
    /// Probe at `root/out/list-counters`, built with `make out/list-counters`.
    #[must_use]
    pub fn for_root(root: &Path) -> Self {
        Self {
            tool: root.join("out").join("list-counters"),
            build: Some(ProbeBuild {
                dir: root.to_path_buf(),
                make: "make".to_string(),
                args: vec!["out/list-counters".to_string()],
            }),
        }
    }

    /// Use an existing tool without building it.
    #[must_use]
    pub fn prebuilt(tool: impl Into<PathBuf>) -> Self {
        Self {
            tool: tool.into(),
            build: None,
        }
    }
}

impl CounterDatabase {
    /// Run the probe tool once and parse its output.
    ///
    /// # Errors
    /// Returns an error if the tool cannot be built or run, exits non-zero,
    /// or prints no counters.
    pub fn probe(config: &ProbeConfig) -> Result<Self> {
        if !config.tool.exists()
            && let Some(build) = &config.build
        {
            build_probe(build)?;
        }

        debug!(tool = %config.tool.display(), "running counter probe");
        let output = Command::new(&config.tool)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| CounterError::ProbeSpawn {
                tool: config.tool.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(CounterError::ProbeFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        if output.stdout.iter().all(u8::is_ascii_whitespace) {
            return Err(CounterError::EmptyFeed);
        }

        let db = Self::from_csv(output.stdout.as_slice())?;
        info!(
            supported = db.list_supported_counters().len(),
            "counter catalog ready"
        );
        Ok(db)
    }
}

fn build_probe(build: &ProbeBuild) -> Result<()> {
    info!(dir = %build.dir.display(), "building counter probe");
    let status = Command::new(&build.make)
        .args(&build.args)
        .current_dir(&build.dir)
        .stdout(Stdio::null())
        .status()
        .map_err(|e| CounterError::ProbeBuild(format!("failed to run {}: {e}", build.make)))?;
    if !status.success() {
        return Err(CounterError::ProbeBuild(format!(
            "{} exited with {status}",
            build.make
        )));
    }
    Ok(())
}
