//! Result merging across counter-subset runs.
//!
//! The PMU can only read a handful of counters at once, so one logical
//! experiment is split into several runs over the same repetitions. Counters
//! read in more than one run must agree, otherwise the runs are not
//! comparable and the merge is rejected.

use metrics::counter;
use thiserror::Error;
use tracing::{debug, warn};

use agner_counters::CounterRef;

use crate::experiment::{ExperimentOptions, ExperimentResult, Experimenter};
use crate::{Error, Result};

/// Default relative tolerance for shared counters.
pub const DEFAULT_THRESHOLD: f64 = 0.15;

/// Merge failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MergeError {
    #[error("Badly sized results: {previous} repetitions merged with {new}")]
    SizeMismatch { previous: usize, new: usize },
    #[error(
        "Unable to get a stable merge for {counter} (repetition {repetition}: {previous} vs {new}, ratio {ratio:.3})"
    )]
    Unstable {
        counter: String,
        repetition: usize,
        previous: i64,
        new: i64,
        ratio: f64,
    },
}

/// Relative change of a shared counter.
///
/// Zero against zero is stable; any change away from zero is treated as an
/// infinite ratio, which no threshold accepts.
#[must_use]
pub fn delta_ratio(previous: i64, new: i64) -> f64 {
    if previous == 0 {
        return if new == 0 { 0.0 } else { f64::INFINITY };
    }
    #[allow(clippy::cast_precision_loss)]
    let ratio = previous.abs_diff(new) as f64 / (previous as f64).abs();
    ratio
}

/// Fold `new` into `previous`.
///
/// With no previous result, or an empty one, `new` is returned unchanged. Otherwise both must
/// have the same number of repetitions, every shared counter must be within
/// `threshold` of the previous reading, and counters only present in `new`
/// are added. Existing values are never overwritten.
///
/// # Errors
/// [`MergeError::SizeMismatch`] if the repetition counts differ and
/// [`MergeError::Unstable`] for the first shared counter out of tolerance.
pub fn merge(
    previous: Option<ExperimentResult>,
    new: ExperimentResult,
    threshold: f64,
) -> std::result::Result<ExperimentResult, MergeError> {
    let mut previous = match previous {
        Some(previous) if !previous.is_empty() => previous,
        _ => return Ok(new),
    };
    if previous.len() != new.len() {
        return Err(MergeError::SizeMismatch {
            previous: previous.len(),
            new: new.len(),
        });
    }

    for (repetition, (prev_item, new_item)) in previous.iter_mut().zip(new).enumerate() {
        for (key, &prev_value) in prev_item.iter() {
            let Some(&new_value) = new_item.get(key) else {
                continue;
            };
            let ratio = delta_ratio(prev_value, new_value);
            debug!(counter = %key, repetition, ratio, "merge delta");
            if ratio > threshold {
                return Err(MergeError::Unstable {
                    counter: key.clone(),
                    repetition,
                    previous: prev_value,
                    new: new_value,
                    ratio,
                });
            }
        }
        for (key, value) in new_item {
            prev_item.entry(key).or_insert(value);
        }
    }
    Ok(previous)
}

/// Retry policy for multi-subset experiments.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Full passes over every subset before giving up.
    pub attempts: u32,
    pub threshold: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

/// Run each counter subset and merge the results, redoing every subset from
/// scratch when the merge is unstable.
///
/// Size mismatches and run failures are returned immediately. When all
/// attempts are unstable, the last instability is returned.
///
/// # Errors
/// See above.
pub fn merge_subsets(
    experimenter: &dyn Experimenter,
    body: &str,
    subsets: &[Vec<CounterRef>],
    options: &ExperimentOptions,
    policy: RetryPolicy,
) -> Result<ExperimentResult> {
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match merge_pass(experimenter, body, subsets, options, policy.threshold)? {
            Ok(result) => return Ok(result),
            Err(err) if attempt >= attempts => return Err(Error::Merge(err)),
            Err(err) => {
                warn!(attempt, attempts, error = %err, "unstable merge, retrying");
                counter!("agner_merge_retries_total").increment(1);
                attempt += 1;
            }
        }
    }
}

/// One pass over all subsets. The inner result carries an instability so
/// the caller can retry it; everything else is the outer error.
fn merge_pass(
    experimenter: &dyn Experimenter,
    body: &str,
    subsets: &[Vec<CounterRef>],
    options: &ExperimentOptions,
    threshold: f64,
) -> Result<std::result::Result<ExperimentResult, MergeError>> {
    let mut merged = None;
    for subset in subsets {
        let result = experimenter.run_experiment(body, subset, options)?;
        match merge(merged.take(), result, threshold) {
            Ok(next) => merged = Some(next),
            Err(err @ MergeError::Unstable { .. }) => return Ok(Err(err)),
            Err(err) => return Err(err.into()),
        }
    }
    Ok(Ok(merged.unwrap_or_default()))
}
