//! Counter catalog commands.

use agner::{CounterRef, Harness};
use tracing::error;

use crate::cli::{EXIT_FAILURE, EXIT_SUCCESS};
use crate::terminal::{self, Table};

/// Handle `counters list`.
pub fn cmd_list(harness: &Harness) -> i32 {
    let db = match harness.counters() {
        Ok(db) => db,
        Err(e) => {
            error!(error = %e, "failed to read counter catalog");
            return EXIT_FAILURE;
        }
    };

    let mut table = Table::new(&["ID", "Name", "Scheme", "Family"]);
    for counter in db.list_supported_counters() {
        table.add_row(vec![
            counter.counter_id.to_string(),
            counter.name.clone(),
            format!("0x{:02x}", counter.scheme),
            format!("0x{:02x}", counter.family),
        ]);
    }
    println!("Supported counters on this CPU:");
    table.print();
    EXIT_SUCCESS
}

/// Handle `counters check`.
pub fn cmd_check(harness: &Harness, references: &[String]) -> i32 {
    let db = match harness.counters() {
        Ok(db) => db,
        Err(e) => {
            error!(error = %e, "failed to read counter catalog");
            return EXIT_FAILURE;
        }
    };

    let references: Vec<CounterRef> = references
        .iter()
        .map(|r| match r.parse::<CounterRef>() {
            Ok(reference) => reference,
            Err(never) => match never {},
        })
        .collect();
    let validation = db.validate_counters(&references);

    if !validation.valid_ids.is_empty() {
        terminal::success(&format!("Supported counters: {:?}", validation.valid_ids));
    }
    if validation.is_ok() {
        return EXIT_SUCCESS;
    }
    terminal::error("Unsupported counters:");
    for message in &validation.errors {
        terminal::hint(&format!("- {message}"));
    }
    EXIT_FAILURE
}
