//! Built-in test groups.

pub mod branch;
pub mod btb_size;

pub use branch::{BranchGroup, BranchTest, SCRAMBLE_BTB};
pub use btb_size::{BtbSizeGroup, BtbSizeTest};

use serde::de::DeserializeOwned;
use serde_json::Value;

use agner_counters::CounterRef;

use crate::registry::TestGroup;
use crate::{Error, Result};

/// Every built-in group with its registry name, in alphabetical order.
#[must_use]
pub fn all() -> Vec<(&'static str, Box<dyn TestGroup>)> {
    vec![
        ("branch", Box::new(BranchGroup)),
        ("btb_size", Box::new(BtbSizeGroup)),
    ]
}

fn counters(ids: &[u32]) -> Vec<CounterRef> {
    ids.iter().copied().map(CounterRef::Id).collect()
}

/// Convert a stored result back into the shape a runner produced.
fn decode<T: DeserializeOwned>(result: &Value) -> Result<T> {
    T::deserialize(result).map_err(|e| Error::ResultShape(e.to_string()))
}

#[allow(clippy::cast_precision_loss)]
const fn as_f64(value: i64) -> f64 {
    value as f64
}

/// Mean of the readings, or 0 with none.
#[allow(clippy::cast_precision_loss)]
fn mean(values: impl Iterator<Item = i64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0_usize), |(sum, count), v| (sum + as_f64(v), count + 1));
    if count == 0 { 0.0 } else { sum / count as f64 }
}
