//! Experiment runner.
//!
//! Resolves counter references, hands the experiment to a [`BuildPipeline`]
//! and turns the benchmark's CSV output into per-repetition samples.

use std::io::Write;

use indexmap::IndexMap;
use metrics::counter;
use tracing::debug;

use agner_counters::{CounterDatabase, CounterRef};

use crate::pipeline::{BuildPipeline, PipelineRequest};
use crate::{Error, Result};

/// Counter name to count, for one repetition. Keeps the benchmark's column order.
pub type ExperimentSample = IndexMap<String, i64>;

/// One sample per repetition, in emission order.
pub type ExperimentResult = Vec<ExperimentSample>;

/// Options for a single experiment run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentOptions {
    /// Assembly executed once before any measurement.
    pub init_once: String,
    /// Assembly executed before each repetition.
    pub init_each: String,
    pub repetitions: u32,
    /// Parallel execution contexts inside the benchmark binary.
    pub concurrency: u32,
}

impl Default for ExperimentOptions {
    fn default() -> Self {
        Self {
            init_once: String::new(),
            init_each: String::new(),
            repetitions: 3,
            concurrency: 1,
        }
    }
}

impl ExperimentOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_init_once(mut self, code: impl Into<String>) -> Self {
        self.init_once = code.into();
        self
    }

    #[must_use]
    pub fn with_init_each(mut self, code: impl Into<String>) -> Self {
        self.init_each = code.into();
        self
    }

    #[must_use]
    pub const fn with_repetitions(mut self, repetitions: u32) -> Self {
        self.repetitions = repetitions;
        self
    }

    #[must_use]
    pub const fn with_concurrency(mut self, concurrency: u32) -> Self {
        self.concurrency = concurrency;
        self
    }
}

/// Anything that can run an experiment body against a set of counters.
///
/// Test runners receive this instead of a concrete runner, so they can be
/// exercised without the native toolchain.
pub trait Experimenter {
    /// # Errors
    /// Fails on invalid counters, any pipeline failure, or unparsable output.
    fn run_experiment(
        &self,
        body: &str,
        counters: &[CounterRef],
        options: &ExperimentOptions,
    ) -> Result<ExperimentResult>;
}

/// Runs experiments through a build pipeline using a shared counter catalog.
pub struct ExperimentRunner<'a, P: BuildPipeline> {
    counters: &'a CounterDatabase,
    pipeline: P,
}

impl<'a, P: BuildPipeline> ExperimentRunner<'a, P> {
    pub const fn new(counters: &'a CounterDatabase, pipeline: P) -> Self {
        Self { counters, pipeline }
    }

    #[must_use]
    pub const fn counters(&self) -> &'a CounterDatabase {
        self.counters
    }

    #[must_use]
    pub const fn pipeline(&self) -> &P {
        &self.pipeline
    }
}

impl<P: BuildPipeline> Experimenter for ExperimentRunner<'_, P> {
    fn run_experiment(
        &self,
        body: &str,
        counters: &[CounterRef],
        options: &ExperimentOptions,
    ) -> Result<ExperimentResult> {
        let validation = self.counters.validate_counters(counters);
        if !validation.is_ok() {
            return Err(Error::CounterValidation(validation.errors));
        }
        debug!(counters = ?validation.valid_ids, repetitions = options.repetitions, "running experiment");

        let request = PipelineRequest {
            counter_ids: &validation.valid_ids,
            body,
            init_once: &options.init_once,
            init_each: &options.init_each,
            repetitions: options.repetitions,
            concurrency: options.concurrency,
        };
        let output = self.pipeline.execute(&request)?;
        counter!("agner_experiments_total").increment(1);
        parse_samples(&output)
    }
}

/// Parse benchmark output: a header of counter names, then one row of
/// integers per repetition.
///
/// # Errors
/// Returns an error if a row has the wrong number of fields or a field is not
/// an integer.
pub fn parse_samples(output: &str) -> Result<ExperimentResult> {
    let mut header: Option<Vec<&str>> = None;
    let mut samples = ExperimentResult::new();

    for (index, line) in output.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields = line.split(',').map(str::trim);
        let Some(names) = &header else {
            header = Some(fields.collect());
            continue;
        };

        if fields.clone().count() != names.len() {
            return Err(Error::MalformedOutput {
                line: index + 1,
                reason: format!("expected {} fields", names.len()),
            });
        }
        let mut sample = ExperimentSample::with_capacity(names.len());
        for (name, field) in names.iter().zip(fields) {
            let value = field.parse::<i64>().map_err(|_| Error::MalformedOutput {
                line: index + 1,
                reason: format!("'{field}' is not an integer"),
            })?;
            sample.insert((*name).to_string(), value);
        }
        samples.push(sample);
    }
    Ok(samples)
}

/// Run an experiment and print one sample per line.
///
/// # Errors
/// Propagates any error from [`Experimenter::run_experiment`].
pub fn print_experiment(
    experimenter: &dyn Experimenter,
    body: &str,
    counters: &[CounterRef],
    options: &ExperimentOptions,
) -> Result<()> {
    write_experiment(&mut std::io::stdout().lock(), experimenter, body, counters, options)
}

/// Run an experiment and write each sample as `{name: value, ...}`.
///
/// # Errors
/// Returns an error if the experiment fails or `out` cannot be written.
pub fn write_experiment(
    out: &mut dyn Write,
    experimenter: &dyn Experimenter,
    body: &str,
    counters: &[CounterRef],
    options: &ExperimentOptions,
) -> Result<()> {
    for sample in experimenter.run_experiment(body, counters, options)? {
        let row: Vec<String> = sample.iter().map(|(k, v)| format!("{k}: {v}")).collect();
        writeln!(out, "{{{}}}", row.join(", "))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use agner_counters::CounterDescriptor;

    use super::*;

    /// Records requests and replies with canned output.
    struct FakePipeline {
        output: String,
        calls: RefCell<Vec<(Vec<u32>, u32, u32)>>,
    }

    impl FakePipeline {
        fn new(output: &str) -> Self {
            Self {
                output: output.to_string(),
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl BuildPipeline for FakePipeline {
        fn execute(&self, request: &PipelineRequest<'_>) -> Result<String> {
            self.calls.borrow_mut().push((
                request.counter_ids.to_vec(),
                request.repetitions,
                request.concurrency,
            ));
            Ok(self.output.clone())
        }
    }

    fn catalog() -> CounterDatabase {
        let descriptor = |id: u32, name: &str, supported| CounterDescriptor {
            counter_id: id,
            name: name.to_string(),
            supported,
            scheme: 0x8,
            family: 0x1000,
        };
        CounterDatabase::from_descriptors([
            descriptor(1, "Core cyc", true),
            descriptor(9, "Instruct", true),
            descriptor(400, "BaClrAny", false),
        ])
    }

    #[test]
    fn test_parse_samples() {
        let output = "Core cyc,Instruct\n1200,1005\n\n 1180 , 1003 \n";
        let samples = parse_samples(output).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1]["Core cyc"], 1180);
        assert_eq!(samples[1]["Instruct"], 1003);
        let names: Vec<_> = samples[0].keys().map(String::as_str).collect();
        assert_eq!(names, ["Core cyc", "Instruct"]);
    }

    #[test]
    fn test_parse_samples_rejects_bad_rows() {
        let short = parse_samples("a,b\n1\n").unwrap_err();
        assert!(matches!(short, Error::MalformedOutput { line: 2, .. }));

        let long = parse_samples("a,b\n1,2,3\n").unwrap_err();
        assert!(matches!(long, Error::MalformedOutput { line: 2, .. }));

        let text = parse_samples("a\n\nx\n").unwrap_err();
        assert!(matches!(text, Error::MalformedOutput { line: 3, .. }));
    }

    #[test]
    fn test_parse_empty_output() {
        assert!(parse_samples("").unwrap().is_empty());
        assert!(parse_samples("a,b\n").unwrap().is_empty());
    }

    #[test]
    fn test_runner_resolves_counters() {
        let db = catalog();
        let runner = ExperimentRunner::new(&db, FakePipeline::new("Core cyc,Instruct\n10,20\n"));
        let options = ExperimentOptions::new().with_repetitions(1).with_concurrency(4);

        let result = runner
            .run_experiment("nop", &[CounterRef::Id(1), "Instruct".into()], &options)
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0]["Instruct"], 20);
        assert_eq!(runner.pipeline().calls.borrow().as_slice(), &[(vec![1, 9], 1, 4)]);
    }

    #[test]
    fn test_invalid_counters_never_reach_pipeline() {
        let db = catalog();
        let runner = ExperimentRunner::new(&db, FakePipeline::new(""));

        let err = runner
            .run_experiment(
                "nop",
                &[CounterRef::Id(400), CounterRef::Id(1), CounterRef::Id(12345)],
                &ExperimentOptions::default(),
            )
            .unwrap_err();
        match err {
            Error::CounterValidation(errors) => {
                assert_eq!(errors.len(), 2);
                assert!(errors[0].contains("400"));
                assert!(errors[1].contains("12345"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(runner.pipeline().calls.borrow().is_empty());
    }

    #[test]
    fn test_write_experiment_rows() {
        let db = catalog();
        let pipeline = FakePipeline::new("Core cyc,Instruct\n10,20\n11,21\n");
        let runner = ExperimentRunner::new(&db, pipeline);
        let options = ExperimentOptions::default();

        let mut out = Vec::new();
        write_experiment(&mut out, &runner, "nop", &[CounterRef::Id(1)], &options).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "{Core cyc: 10, Instruct: 20}\n{Core cyc: 11, Instruct: 21}\n"
        );
    }

    #[test]
    fn test_write_experiment_propagates_failure() {
        let db = catalog();
        let runner = ExperimentRunner::new(&db, FakePipeline::new(""));

        let options = ExperimentOptions::default();

        let mut out = Vec::new();
        let err =
            write_experiment(&mut out, &runner, "nop", &[CounterRef::Id(400)], &options).unwrap_err();
        assert!(matches!(err, Error::CounterValidation(_)));
        assert!(out.is_empty());
    }

    #[test]
    fn test_default_options() {
        let options = ExperimentOptions::default();
        assert_eq!(options.repetitions, 3);
        assert_eq!(options.concurrency, 1);
        assert!(options.init_once.is_empty() && options.init_each.is_empty());
    }
}
