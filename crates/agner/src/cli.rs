//! CLI definitions and argument types.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Exit code for success.
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code for failure.
pub const EXIT_FAILURE: i32 = 1;

#[derive(Parser)]
#[allow(clippy::struct_excessive_bools)]
#[command(name = "agner")]
#[command(about = "Microarchitecture experiments under hardware performance counters")]
#[command(version)]
pub struct Cli {
    /// Harness root containing the Makefile, NASM driver and MSR driver sources
    #[arg(long, global = true, default_value = ".")]
    pub root: PathBuf,

    /// Result snapshot written by `test-only` and read by `plot`
    #[arg(long, global = true, default_value = "results.json")]
    pub results_file: PathBuf,

    /// Use each test's alternative plot
    #[arg(long, global = true)]
    pub alternative: bool,

    /// Length of the longest bar in rendered figures
    #[arg(long, global = true, default_value = "60")]
    pub width: usize,

    /// Write figures to files instead of stdout.
    /// `{test}` and `{subtest}` are replaced by the test's names.
    #[arg(long, global = true, value_name = "TEMPLATE")]
    pub output: Option<String>,

    /// Show metrics summary after execution
    #[arg(long, global = true)]
    pub metrics: bool,

    /// Enable verbose output (sets RUST_LOG=debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress output (only show errors)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub silent: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run tests and plot the results
    Run {
        /// Tests to run, as `group.subtest` or `group.*` (default: all)
        #[arg(value_name = "TEST")]
        tests: Vec<String>,
    },
    /// Run tests and save the results without plotting
    TestOnly {
        /// Tests to run, as `group.subtest` or `group.*` (default: all)
        #[arg(value_name = "TEST")]
        tests: Vec<String>,
    },
    /// Plot previously saved results
    Plot {
        /// Tests to plot, as `group.subtest` or `group.*` (default: all)
        #[arg(value_name = "TEST")]
        tests: Vec<String>,
    },
    /// List test groups and their subtests
    List,
    /// Inspect the host's performance counters
    Counters {
        #[command(subcommand)]
        command: CounterCommands,
    },
    /// Build and load the MSR kernel driver (uses sudo)
    Install,
    /// Unload the MSR kernel driver (uses sudo)
    Uninstall,
}

#[derive(Subcommand)]
pub enum CounterCommands {
    /// List counters supported on this CPU
    List,
    /// Check whether counters are supported
    Check {
        /// Counter IDs or names
        #[arg(value_name = "COUNTER", required = true)]
        counters: Vec<String>,
    },
}
