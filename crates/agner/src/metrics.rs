//! Harness metrics using metrics-rs.
//!
//! The library only emits through the `metrics` facade. With `--metrics` the
//! binary installs [`CliRecorder`] and prints a summary when it exits.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::{
    Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit,
    describe_counter, describe_histogram,
};
use parking_lot::RwLock;

/// Register metric descriptions. Call once at startup.
pub fn init() {
    describe_counter!(
        "agner_tests_run_total",
        Unit::Count,
        "Registered tests run to completion"
    );
    describe_counter!(
        "agner_experiments_total",
        Unit::Count,
        "Benchmark binaries built and executed"
    );
    describe_counter!(
        "agner_merge_retries_total",
        Unit::Count,
        "Counter-subset passes redone after an unstable merge"
    );
    describe_histogram!(
        "agner_pipeline_stage_seconds",
        Unit::Seconds,
        "Wall-clock time per pipeline stage"
    );
}

#[derive(Default)]
struct CounterStorage {
    values: RwLock<HashMap<String, u64>>,
}

#[derive(Default)]
struct HistogramStorage {
    values: RwLock<HashMap<String, Vec<f64>>>,
}

struct CliCounter {
    key: String,
    storage: Arc<CounterStorage>,
}

impl metrics::CounterFn for CliCounter {
    fn increment(&self, value: u64) {
        let mut values = self.storage.values.write();
        *values.entry(self.key.clone()).or_insert(0) += value;
    }

    fn absolute(&self, value: u64) {
        self.storage.values.write().insert(self.key.clone(), value);
    }
}

struct CliHistogram {
    key: String,
    storage: Arc<HistogramStorage>,
}

impl metrics::HistogramFn for CliHistogram {
    fn record(&self, value: f64) {
        let mut values = self.storage.values.write();
        values.entry(self.key.clone()).or_default().push(value);
    }
}

/// In-memory recorder for terminal output.
///
/// Only counters and histograms are kept; the harness emits no gauges.
#[derive(Default)]
pub struct CliRecorder {
    counters: Arc<CounterStorage>,
    histograms: Arc<HistogramStorage>,
}

impl CliRecorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle onto this recorder's storage.
    #[must_use]
    pub fn handle(&self) -> CliRecorderHandle {
        CliRecorderHandle {
            counters: Arc::clone(&self.counters),
            histograms: Arc::clone(&self.histograms),
        }
    }

    /// Install as the global recorder. Returns `None` if one is already set.
    #[must_use]
    pub fn install(self) -> Option<CliRecorderHandle> {
        let handle = self.handle();
        metrics::set_global_recorder(self).ok()?;
        Some(handle)
    }
}

fn key_to_string(key: &Key) -> String {
    let labels: Vec<String> = key
        .labels()
        .map(|l| format!("{}={}", l.key(), l.value()))
        .collect();
    if labels.is_empty() {
        key.name().to_string()
    } else {
        format!("{}{{{}}}", key.name(), labels.join(","))
    }
}

impl Recorder for CliRecorder {
    fn describe_counter(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}
    fn describe_gauge(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}
    fn describe_histogram(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn register_counter(&self, key: &Key, _metadata: &Metadata<'_>) -> Counter {
        Counter::from_arc(Arc::new(CliCounter {
            key: key_to_string(key),
            storage: Arc::clone(&self.counters),
        }))
    }

    fn register_gauge(&self, _key: &Key, _metadata: &Metadata<'_>) -> Gauge {
        Gauge::noop()
    }

    fn register_histogram(&self, key: &Key, _metadata: &Metadata<'_>) -> Histogram {
        Histogram::from_arc(Arc::new(CliHistogram {
            key: key_to_string(key),
            storage: Arc::clone(&self.histograms),
        }))
    }
}

/// Read access to what a [`CliRecorder`] collected.
#[derive(Clone)]
pub struct CliRecorderHandle {
    counters: Arc<CounterStorage>,
    histograms: Arc<HistogramStorage>,
}

impl CliRecorderHandle {
    #[must_use]
    pub fn get_counter(&self, key: &str) -> Option<u64> {
        self.counters.values.read().get(key).copied()
    }

    #[must_use]
    pub fn get_histogram(&self, key: &str) -> Option<Vec<f64>> {
        self.histograms.values.read().get(key).cloned()
    }

    /// Render collected metrics as Markdown-ish text.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn summary(&self) -> String {
        let counters = self.counters.values.read();
        let histograms = self.histograms.values.read();
        if counters.is_empty() && histograms.is_empty() {
            return "No metrics collected.\n".to_string();
        }

        let mut lines = vec![String::new(), "## Metrics Summary".to_string(), String::new()];
        if !counters.is_empty() {
            lines.push("### Counters".to_string());
            let mut keys: Vec<_> = counters.keys().collect();
            keys.sort();
            for key in keys {
                lines.push(format!("  {key}: {}", counters[key]));
            }
            lines.push(String::new());
        }
        if !histograms.is_empty() {
            lines.push("### Histograms".to_string());
            let mut keys: Vec<_> = histograms.keys().collect();
            keys.sort();
            for key in keys {
                let values = &histograms[key];
                if values.is_empty() {
                    continue;
                }
                let min = values.iter().copied().fold(f64::INFINITY, f64::min);
                let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                let avg = values.iter().sum::<f64>() / values.len() as f64;
                lines.push(format!(
                    "  {key}: count={}, min={min:.6}, max={max:.6}, avg={avg:.6}",
                    values.len()
                ));
            }
            lines.push(String::new());
        }
        lines.join("\n")
    }

    pub fn print_summary(&self) {
        println!("{}", self.summary());
    }
}
