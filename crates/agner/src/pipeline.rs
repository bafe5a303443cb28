//! External build-and-run pipeline.
//!
//! The benchmark binary is produced by a fixed toolchain sequence:
//!
//! ```text
//! make out/a64.o            support object (C++ driver, built once)
//! out/*.inc                 counters, body, init snippets (rewritten per call)
//! nasm PMCTestB64.nasm      -D REPETITIONS / -D NUM_THREADS
//! g++ a64.o b64.o           link
//! out/test                  prints CSV to stdout
//! ```
//!
//! Every stage blocks until it finishes and a failing stage stops the sequence.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::time::Instant;

use metrics::histogram;
use tracing::{debug, info_span};

use crate::{Error, Result};

/// Pipeline stage, used in errors, logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    SupportObject,
    WriteInputs,
    Assemble,
    Link,
    Execute,
}

impl Stage {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SupportObject => "support object build",
            Self::WriteInputs => "write inputs",
            Self::Assemble => "assemble",
            Self::Link => "link",
            Self::Execute => "execute",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs for one build-and-run cycle.
#[derive(Debug, Clone, Copy)]
pub struct PipelineRequest<'a> {
    /// Resolved hardware counter IDs.
    pub counter_ids: &'a [u32],
    /// Assembly for the measured body.
    pub body: &'a str,
    /// Assembly run once before the measurements.
    pub init_once: &'a str,
    /// Assembly run before every repetition.
    pub init_each: &'a str,
    pub repetitions: u32,
    /// Number of benchmark threads.
    pub concurrency: u32,
}

/// Builds and runs a benchmark, returning its raw stdout.
pub trait BuildPipeline {
    /// # Errors
    /// Returns an error if any stage fails. No partial output is returned.
    fn execute(&self, request: &PipelineRequest<'_>) -> Result<String>;
}

/// Toolchain commands and file layout.
#[derive(Debug, Clone)]
pub struct Toolchain {
    /// Directory holding the Makefile and the NASM driver source.
    pub root: PathBuf,
    /// Working area relative to `root`.
    pub out_dir: PathBuf,
    pub make: String,
    pub assembler: String,
    pub linker: String,
    /// NASM test driver relative to `root`.
    pub source: PathBuf,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self::new(".")
    }
}

impl Toolchain {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            out_dir: PathBuf::from("out"),
            make: "make".to_string(),
            assembler: "nasm".to_string(),
            linker: "g++".to_string(),
            source: PathBuf::from("PMCTestB64.nasm"),
        }
    }

    /// Absolute-or-root-relative working area.
    #[must_use]
    pub fn out_path(&self) -> PathBuf {
        self.root.join(&self.out_dir)
    }

    fn out_file(&self, name: &str) -> PathBuf {
        self.out_dir.join(name)
    }
}

/// The four generated input fragments.
pub const INPUT_FILES: [&str; 4] = ["counters.inc", "test.inc", "init_once.inc", "init_each.inc"];

/// Drives `make`, `nasm` and `g++` in the toolchain root.
#[derive(Debug, Clone, Default)]
pub struct NasmPipeline {
    toolchain: Toolchain,
}

impl NasmPipeline {
    #[must_use]
    pub const fn new(toolchain: Toolchain) -> Self {
        Self { toolchain }
    }

    #[must_use]
    pub const fn toolchain(&self) -> &Toolchain {
        &self.toolchain
    }

    /// Write the generated fragments into the working area.
    ///
    /// # Errors
    /// Returns [`Error::StageIo`] if a file cannot be written.
    pub fn write_inputs(&self, request: &PipelineRequest<'_>) -> Result<()> {
        self.write_fragments(request).map_err(|source| Error::StageIo {
            stage: Stage::WriteInputs,
            source,
        })
    }

    fn write_fragments(&self, request: &PipelineRequest<'_>) -> std::io::Result<()> {
        let out = self.toolchain.out_path();
        fs::create_dir_all(&out)?;

        let counters: String = request
            .counter_ids
            .iter()
            .map(|id| format!("    DD {id}\n"))
            .collect();
        let contents = [counters.as_str(), request.body, request.init_once, request.init_each];
        for (name, text) in INPUT_FILES.iter().zip(contents) {
            fs::write(out.join(name), text)?;
        }
        Ok(())
    }

    fn support_object(&self) -> Command {
        let mut cmd = Command::new(&self.toolchain.make);
        cmd.arg("-s").arg(self.toolchain.out_file("a64.o"));
        cmd
    }

    fn assemble(&self, request: &PipelineRequest<'_>) -> Command {
        let tc = &self.toolchain;
        // NASM concatenates the include prefix verbatim, so it needs the separator.
        let include = format!("{}/", tc.out_dir.display());
        let mut cmd = Command::new(&tc.assembler);
        cmd.args(["-f", "elf64", "-l"])
            .arg(tc.out_file("b64.lst"))
            .arg("-I")
            .arg(include)
            .arg("-o")
            .arg(tc.out_file("b64.o"))
            .arg("-D")
            .arg(format!("REPETITIONS={}", request.repetitions))
            .arg("-D")
            .arg(format!("NUM_THREADS={}", request.concurrency))
            .arg(&tc.source);
        cmd
    }

    fn link(&self) -> Command {
        let tc = &self.toolchain;
        let mut cmd = Command::new(&tc.linker);
        cmd.arg("-o")
            .arg(tc.out_file("test"))
            .arg(tc.out_file("a64.o"))
            .arg(tc.out_file("b64.o"))
            .arg("-lpthread");
        cmd
    }

    fn benchmark(&self) -> Command {
        // Relative program paths are ambiguous once current_dir is set.
        let binary = self.toolchain.root.join(self.toolchain.out_file("test"));
        Command::new(std::path::absolute(&binary).unwrap_or(binary))
    }

    fn run_stage(&self, stage: Stage, mut cmd: Command) -> Result<Output> {
        let _span = info_span!("stage", stage = %stage).entered();
        cmd.current_dir(&self.toolchain.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        debug!(command = ?cmd, "running");

        let start = Instant::now();
        let output = cmd.output().map_err(|source| Error::Spawn { stage, source })?;
        histogram!("agner_pipeline_stage_seconds", "stage" => stage.as_str())
            .record(start.elapsed().as_secs_f64());

        if !output.status.success() {
            return Err(Error::Pipeline {
                stage,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output)
    }
}

impl BuildPipeline for NasmPipeline {
    fn execute(&self, request: &PipelineRequest<'_>) -> Result<String> {
        self.run_stage(Stage::SupportObject, self.support_object())?;
        self.write_inputs(request)?;
        self.run_stage(Stage::Assemble, self.assemble(request))?;
        self.run_stage(Stage::Link, self.link())?;
        let output = self.run_stage(Stage::Execute, self.benchmark())?;
        String::from_utf8(output.stdout).map_err(|e| Error::MalformedOutput {
            line: 0,
            reason: format!("benchmark output is not UTF-8: {e}"),
        })
    }
}

/// Returns true if `program` resolves to an executable on `PATH`.
#[must_use]
pub fn find_in_path(program: &str) -> bool {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file();
    }
    std::env::var_os("PATH").is_some_and(|paths| {
        std::env::split_paths(&paths).any(|dir| dir.join(program).is_file())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request<'a>(ids: &'a [u32]) -> PipelineRequest<'a> {
        PipelineRequest {
            counter_ids: ids,
            body: "nop\n",
            init_once: "xor eax, eax\n",
            init_each: "",
            repetitions: 5,
            concurrency: 2,
        }
    }

    #[test]
    fn test_write_inputs_overwrites_fragments() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = NasmPipeline::new(Toolchain::new(dir.path()));

        pipeline.write_inputs(&request(&[1, 9, 207])).unwrap();
        let out = dir.path().join("out");
        assert_eq!(
            fs::read_to_string(out.join("counters.inc")).unwrap(),
            "    DD 1\n    DD 9\n    DD 207\n"
        );
        assert_eq!(fs::read_to_string(out.join("test.inc")).unwrap(), "nop\n");
        assert_eq!(
            fs::read_to_string(out.join("init_once.inc")).unwrap(),
            "xor eax, eax\n"
        );
        assert_eq!(fs::read_to_string(out.join("init_each.inc")).unwrap(), "");

        pipeline.write_inputs(&request(&[9])).unwrap();
        assert_eq!(
            fs::read_to_string(out.join("counters.inc")).unwrap(),
            "    DD 9\n"
        );
    }

    #[test]
    fn test_write_inputs_failure_names_stage() {
        let dir = tempfile::tempdir().unwrap();
        // A file where the working directory should be.
        fs::write(dir.path().join("out"), "").unwrap();
        let pipeline = NasmPipeline::new(Toolchain::new(dir.path()));

        let err = pipeline.write_inputs(&request(&[1])).unwrap_err();
        assert!(matches!(
            err,
            Error::StageIo {
                stage: Stage::WriteInputs,
                ..
            }
        ));
        assert!(err.to_string().starts_with("write inputs failed: "));
    }

    #[test]
    fn test_assemble_arguments() {
        let pipeline = NasmPipeline::new(Toolchain::new("/src"));
        let cmd = pipeline.assemble(&request(&[1]));
        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(cmd.get_program(), "nasm");
        assert_eq!(
            args,
            [
                "-f", "elf64", "-l", "out/b64.lst", "-I", "out/", "-o", "out/b64.o", "-D",
                "REPETITIONS=5", "-D", "NUM_THREADS=2", "PMCTestB64.nasm",
            ]
        );
    }

    #[test]
    fn test_link_arguments() {
        let pipeline = NasmPipeline::default();
        let cmd = pipeline.link();
        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args, ["-o", "out/test", "out/a64.o", "out/b64.o", "-lpthread"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_stage_stops_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let mut toolchain = Toolchain::new(dir.path());
        toolchain.make = "false".to_string();
        let pipeline = NasmPipeline::new(toolchain);

        let err = pipeline.execute(&request(&[1])).unwrap_err();
        assert!(matches!(
            err,
            Error::Pipeline {
                stage: Stage::SupportObject,
                ..
            }
        ));
        // Inputs are written after the support object, so nothing was generated.
        assert!(!dir.path().join("out").join("test.inc").exists());
    }

    #[test]
    fn test_missing_tool_is_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut toolchain = Toolchain::new(dir.path());
        toolchain.make = "agner-no-such-make".to_string();

        let err = NasmPipeline::new(toolchain).execute(&request(&[1])).unwrap_err();
        assert!(matches!(err, Error::Spawn { stage: Stage::SupportObject, .. }));
    }

    #[test]
    fn test_find_in_path() {
        assert!(!find_in_path("agner-no-such-tool"));
    }
}
