//! Plot and list commands.

use std::fs;
use std::path::{Path, PathBuf};

use agner::figure::expand_template;
use agner::{Figure, Harness, Results, Selection, snapshot};
use tracing::error;

use crate::cli::{EXIT_FAILURE, EXIT_SUCCESS};
use crate::terminal;

/// How figures are rendered and where they go.
pub struct PlotOptions {
    pub alternative: bool,
    pub width: usize,
    /// Path template; figures go to stdout when unset.
    pub output: Option<String>,
}

/// Handle the `plot` command.
pub fn cmd_plot(
    harness: &Harness,
    selection: &Selection,
    results_file: &Path,
    options: &PlotOptions,
) -> i32 {
    let results = match snapshot::load(results_file) {
        Ok(r) => r,
        Err(e) => {
            error!(error = %e, path = %results_file.display(), "failed to load results");
            return EXIT_FAILURE;
        }
    };
    plot_results(harness, &results, selection, options)
}

/// Plot `results` and emit every figure.
pub fn plot_results(
    harness: &Harness,
    results: &Results,
    selection: &Selection,
    options: &PlotOptions,
) -> i32 {
    let mut written: Vec<PathBuf> = Vec::new();
    let mut write_error = None;
    let mut emit = |group: &str, subtest: &str, figure: &Figure| {
        if write_error.is_some() {
            return;
        }
        let text = figure.render(options.width);
        match &options.output {
            None => println!("{text}"),
            Some(template) => {
                let path = PathBuf::from(expand_template(template, group, subtest));
                match write_figure(&path, &text) {
                    Ok(()) => written.push(path),
                    Err(e) => write_error = Some((path, e)),
                }
            }
        }
    };

    let plotted =
        harness
            .registry()
            .plot_selected(results, selection, options.alternative, Some(&mut emit));
    if let Err(e) = plotted {
        error!(error = %e, "plotting failed");
        return EXIT_FAILURE;
    }
    if let Some((path, e)) = write_error {
        error!(error = %e, path = %path.display(), "failed to write figure");
        return EXIT_FAILURE;
    }
    if !written.is_empty() {
        terminal::success(&format!("Wrote {} figures", written.len()));
        for path in &written {
            terminal::path_output(path);
        }
    }
    EXIT_SUCCESS
}

fn write_figure(path: &Path, text: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, text)
}

/// Handle the `list` command.
pub fn cmd_list(harness: &Harness) -> i32 {
    let registry = harness.registry();
    for group in registry.groups() {
        println!("{group}:");
        for subtest in registry.subtests(group).unwrap_or_default() {
            println!("  {subtest}");
        }
    }
    EXIT_SUCCESS
}
