//! MSR kernel driver install and uninstall.

use std::path::Path;
use std::process::Command;

use agner::HarnessConfig;
use tracing::error;

use crate::cli::{EXIT_FAILURE, EXIT_SUCCESS};
use crate::terminal::{self, Spinner};

/// Handle the `install` command: build the driver, then load it.
pub fn cmd_install(config: &HarnessConfig) -> i32 {
    let dir = config.driver_dir();
    terminal::info("This requires superuser privileges; sudo will be called.");

    let spinner = Spinner::new("Building MSR driver");
    if let Err(message) = run_in(&dir, "make", &[]) {
        spinner.finish_with_failure("Driver build failed");
        error!(dir = %dir.display(), "{message}");
        return EXIT_FAILURE;
    }
    spinner.finish_with_success("Built MSR driver");

    match run_in(&dir, "sudo", &["./install.sh"]) {
        Ok(()) => {
            terminal::success("Installed MSR driver");
            EXIT_SUCCESS
        }
        Err(message) => {
            error!(dir = %dir.display(), "{message}");
            EXIT_FAILURE
        }
    }
}

/// Handle the `uninstall` command.
pub fn cmd_uninstall(config: &HarnessConfig) -> i32 {
    let dir = config.driver_dir();
    terminal::info("This requires superuser privileges; sudo will be called.");

    match run_in(&dir, "sudo", &["./uninstall.sh"]) {
        Ok(()) => {
            terminal::success("Uninstalled MSR driver");
            EXIT_SUCCESS
        }
        Err(message) => {
            error!(dir = %dir.display(), "{message}");
            EXIT_FAILURE
        }
    }
}

/// Run a command in `dir` with inherited stdio, so sudo can prompt.
fn run_in(dir: &Path, program: &str, args: &[&str]) -> Result<(), String> {
    let status = Command::new(program)
        .args(args)
        .current_dir(dir)
        .status()
        .map_err(|e| format!("failed to run {program}: {e}"))?;
    if status.success() {
        Ok(())
    } else {
        Err(format!("{program} {} failed ({status})", args.join(" ")))
    }
}
