//! Run and test-only commands.

use std::path::Path;

use agner::{Harness, Results, Selection, snapshot};
use tracing::{error, info};

use crate::cli::{EXIT_FAILURE, EXIT_SUCCESS};
use crate::commands::plot::{PlotOptions, plot_results};
use crate::terminal::{self, Spinner};

/// Handle the `run` command.
pub fn cmd_run(
    harness: &Harness,
    selection: &Selection,
    options: &PlotOptions,
    silent: bool,
) -> i32 {
    let Some(results) = run_tests(harness, selection, silent) else {
        return EXIT_FAILURE;
    };
    plot_results(harness, &results, selection, options)
}

/// Handle the `test-only` command.
pub fn cmd_test_only(
    harness: &Harness,
    selection: &Selection,
    results_file: &Path,
    silent: bool,
) -> i32 {
    let Some(results) = run_tests(harness, selection, silent) else {
        return EXIT_FAILURE;
    };
    if let Err(e) = snapshot::save(results_file, &results) {
        error!(error = %e, path = %results_file.display(), "failed to save results");
        return EXIT_FAILURE;
    }
    if !silent {
        terminal::success("Saved results");
        terminal::path_output(results_file);
    }
    EXIT_SUCCESS
}

fn run_tests(harness: &Harness, selection: &Selection, silent: bool) -> Option<Results> {
    if !check_prerequisites(harness) {
        return None;
    }

    let selected = harness.registry().selected(selection).len();
    if selected == 0 {
        terminal::warning("No tests match the selection");
        return Some(Results::new());
    }

    let runner = match harness.runner() {
        Ok(r) => r,
        Err(e) => {
            error!(error = %e, "failed to read counter catalog");
            return None;
        }
    };

    let spinner = if silent {
        Spinner::hidden()
    } else {
        Spinner::new("Running tests")
    };
    let mut done = 0;
    let outcome = harness
        .registry()
        .run_selected_with(selection, &runner, |group, subtest| {
            done += 1;
            spinner.set_message(format!("[{done}/{selected}] {group}.{subtest}"));
        });

    match outcome {
        Ok(results) => {
            spinner.finish_with_success(&format!("Ran {selected} tests"));
            info!(tests = selected, "all tests finished");
            Some(results)
        }
        Err(e) => {
            spinner.finish_with_failure("Test run failed");
            error!(error = %e, "test run failed");
            None
        }
    }
}

/// Report every unmet host requirement. Returns true if none are missing.
fn check_prerequisites(harness: &Harness) -> bool {
    let missing = harness.missing_prerequisites();
    for prerequisite in &missing {
        terminal::error(&prerequisite.what);
        terminal::hint(&prerequisite.hint);
    }
    missing.is_empty()
}
