//! Result snapshots.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use tracing::debug;

use crate::Result;
use crate::registry::Results;

/// Write results to `path` as pretty-printed JSON, replacing the file.
///
/// # Errors
/// Returns an error if the file cannot be written.
pub fn save(path: &Path, results: &Results) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, results)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    debug!(path = %path.display(), groups = results.len(), "snapshot saved");
    Ok(())
}

/// Read results previously written by [`save`].
///
/// # Errors
/// Returns an error if the file is missing or does not hold a snapshot.
pub fn load(path: &Path) -> Result<Results> {
    let reader = BufReader::new(File::open(path)?);
    let results: Results = serde_json::from_reader(reader)?;
    debug!(path = %path.display(), groups = results.len(), "snapshot loaded");
    Ok(results)
}
