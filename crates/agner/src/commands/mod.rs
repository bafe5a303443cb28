//! Command implementations.
//!
//! Each submodule handles a specific CLI command or group of commands.

mod counters;
mod driver;
mod plot;
mod run;

use agner::{Harness, HarnessConfig, Selection};

use crate::cli::{Cli, Commands, CounterCommands};

/// Dispatch CLI command to the appropriate handler.
pub fn run_command(cli: &Cli) -> i32 {
    match &cli.command {
        Commands::Run { .. } => handle_run(cli),
        Commands::TestOnly { .. } => handle_test_only(cli),
        Commands::Plot { .. } => handle_plot(cli),
        Commands::List => plot::cmd_list(&harness(cli)),
        Commands::Counters { command } => handle_counters(cli, command),
        Commands::Install => driver::cmd_install(&harness_config(cli)),
        Commands::Uninstall => driver::cmd_uninstall(&harness_config(cli)),
    }
}

fn handle_run(cli: &Cli) -> i32 {
    let Commands::Run { tests } = &cli.command else {
        unreachable!("run command variant mismatch");
    };
    run::cmd_run(&harness(cli), &Selection::new(tests), &plot_options(cli), cli.silent)
}

fn handle_test_only(cli: &Cli) -> i32 {
    let Commands::TestOnly { tests } = &cli.command else {
        unreachable!("test-only command variant mismatch");
    };
    run::cmd_test_only(&harness(cli), &Selection::new(tests), &cli.results_file, cli.silent)
}

fn handle_plot(cli: &Cli) -> i32 {
    let Commands::Plot { tests } = &cli.command else {
        unreachable!("plot command variant mismatch");
    };
    plot::cmd_plot(
        &harness(cli),
        &Selection::new(tests),
        &cli.results_file,
        &plot_options(cli),
    )
}

fn handle_counters(cli: &Cli, command: &CounterCommands) -> i32 {
    let harness = harness(cli);
    match command {
        CounterCommands::List => counters::cmd_list(&harness),
        CounterCommands::Check { counters } => counters::cmd_check(&harness, counters),
    }
}

fn harness_config(cli: &Cli) -> HarnessConfig {
    HarnessConfig::new(&cli.root)
}

fn harness(cli: &Cli) -> Harness {
    Harness::new(harness_config(cli))
}

fn plot_options(cli: &Cli) -> plot::PlotOptions {
    plot::PlotOptions {
        alternative: cli.alternative,
        width: cli.width,
        output: cli.output.clone(),
    }
}
