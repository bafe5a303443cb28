//! Counter lookup and validation.

use std::collections::HashSet;
use std::io::Read;

use csv::{ReaderBuilder, StringRecord, Trim};
use indexmap::IndexMap;
use tracing::debug;

use crate::{CounterDescriptor, CounterError, CounterRef, Result};

/// Columns emitted by the probe tool.
const COLUMNS: [&str; 5] = ["counter_id", "name", "supported", "scheme", "family"];

/// Result of validating a list of counter references.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validation {
    /// Resolved IDs in reference order (duplicates kept).
    pub valid_ids: Vec<u32>,
    /// One diagnostic per unusable reference.
    pub errors: Vec<String>,
}

impl Validation {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Catalog of the counters known to the probe tool.
///
/// Built once and then only read. Both indices keep the probe's row order,
/// which decides which variant wins when several are supported.
#[derive(Debug, Clone, Default)]
pub struct CounterDatabase {
    by_id: IndexMap<u32, Vec<CounterDescriptor>>,
    by_name: IndexMap<String, Vec<CounterDescriptor>>,
}

impl CounterDatabase {
    /// Build from descriptors, preserving their order.
    pub fn from_descriptors(descriptors: impl IntoIterator<Item = CounterDescriptor>) -> Self {
        let mut db = Self::default();
        for descriptor in descriptors {
            db.insert(descriptor);
        }
        db
    }

    /// Parse the probe tool's CSV feed.
    ///
    /// # Errors
    /// Returns an error if the header is missing a column, a row is malformed,
    /// or the feed contains no counters.
    pub fn from_csv(reader: impl Read) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .trim(Trim::All)
            .from_reader(reader);

        let headers = reader.headers()?.clone();
        let mut positions = [0usize; COLUMNS.len()];
        for (slot, column) in positions.iter_mut().zip(COLUMNS) {
            *slot = headers
                .iter()
                .position(|h| h == column)
                .ok_or_else(|| CounterError::Malformed {
                    line: 1,
                    reason: format!("missing column '{column}'"),
                })?;
        }

        let mut db = Self::default();
        for record in reader.records() {
            let record = record?;
            db.insert(parse_row(&record, &positions)?);
        }

        if db.by_id.is_empty() {
            return Err(CounterError::EmptyFeed);
        }
        debug!(
            ids = db.by_id.len(),
            names = db.by_name.len(),
            "loaded counter catalog"
        );
        Ok(db)
    }

    fn insert(&mut self, descriptor: CounterDescriptor) {
        self.by_name
            .entry(descriptor.name.clone())
            .or_default()
            .push(descriptor.clone());
        self.by_id
            .entry(descriptor.counter_id)
            .or_default()
            .push(descriptor);
    }

    /// First supported descriptor matching the reference.
    #[must_use]
    pub fn get_counter(&self, reference: &CounterRef) -> Option<&CounterDescriptor> {
        self.get_all_variants(reference).iter().find(|c| c.supported)
    }

    #[must_use]
    pub fn is_supported(&self, reference: &CounterRef) -> bool {
        self.get_counter(reference).is_some()
    }

    /// Every descriptor matching the reference, supported or not.
    #[must_use]
    pub fn get_all_variants(&self, reference: &CounterRef) -> &[CounterDescriptor] {
        let variants = match reference {
            CounterRef::Id(id) => self.by_id.get(id),
            CounterRef::Name(name) => self.by_name.get(name),
        };
        variants.map_or(&[], Vec::as_slice)
    }

    /// Resolve references to supported IDs, collecting a diagnostic for each
    /// reference that cannot be used. Never fails.
    #[must_use]
    pub fn validate_counters(&self, references: &[CounterRef]) -> Validation {
        let mut validation = Validation::default();
        for reference in references {
            if let Some(info) = self.get_counter(reference) {
                validation.valid_ids.push(info.counter_id);
                continue;
            }
            let message = match (reference, self.get_all_variants(reference).first()) {
                (CounterRef::Id(id), None) => format!("Counter ID {id} does not exist"),
                (CounterRef::Name(name), None) => format!("Counter '{name}' does not exist"),
                (CounterRef::Id(id), Some(variant)) => format!(
                    "Counter ID {id} ('{}') is not supported on this CPU \
                     (requires scheme=0x{:x}, family=0x{:x})",
                    variant.name, variant.scheme, variant.family
                ),
                (CounterRef::Name(name), Some(variant)) => format!(
                    "Counter '{name}' (ID {}) is not supported on this CPU \
                     (requires scheme=0x{:x}, family=0x{:x})",
                    variant.counter_id, variant.scheme, variant.family
                ),
            };
            validation.errors.push(message);
        }
        validation
    }

    /// Supported counters, one per ID (first supported variant), sorted by ID.
    #[must_use]
    pub fn list_supported_counters(&self) -> Vec<&CounterDescriptor> {
        let mut seen = HashSet::new();
        let mut supported: Vec<_> = self
            .by_id
            .values()
            .flatten()
            .filter(|c| c.supported && seen.insert(c.counter_id))
            .collect();
        supported.sort_by_key(|c| c.counter_id);
        supported
    }
}

fn parse_row(record: &StringRecord, positions: &[usize; COLUMNS.len()]) -> Result<CounterDescriptor> {
    let line = record.position().map_or(0, csv::Position::line);
    let field = |index: usize| -> Result<&str> {
        record.get(positions[index]).ok_or_else(|| CounterError::Malformed {
            line,
            reason: format!("missing field '{}'", COLUMNS[index]),
        })
    };
    let malformed = |column: &str, value: &str| CounterError::Malformed {
        line,
        reason: format!("invalid {column} '{value}'"),
    };

    let id = field(0)?;
    let supported = field(2)?;
    let scheme = field(3)?;
    let family = field(4)?;

    Ok(CounterDescriptor {
        counter_id: id.parse().map_err(|_| malformed("counter_id", id))?,
        name: field(1)?.to_string(),
        supported: supported
            .parse::<u32>()
            .map_err(|_| malformed("supported", supported))?
            != 0,
        scheme: parse_hex(scheme).ok_or_else(|| malformed("scheme", scheme))?,
        family: parse_hex(family).ok_or_else(|| malformed("family", family))?,
    })
}

fn parse_hex(value: &str) -> Option<u32> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    u32::from_str_radix(digits, 16).ok()
}
