//! Agner - microarchitecture experiment harness
//!
//! Runs small assembly experiments under hardware performance counters and
//! reconciles readings taken over several limited-width counter runs.
//!
//! # Example
//!
//! ```ignore
//! use agner::{Harness, HarnessConfig, Selection};
//!
//! let harness = Harness::new(HarnessConfig::default());
//! let runner = harness.runner()?;
//! let results = harness.registry().run_selected(&Selection::all(), &runner)?;
//! ```

mod error;
pub mod experiment;
pub mod figure;
pub mod groups;
mod harness;
pub mod merge;
pub mod metrics;
pub mod pipeline;
pub mod registry;
pub mod snapshot;

pub use agner_counters::{CounterDatabase, CounterDescriptor, CounterError, CounterRef, ProbeConfig, Validation};
pub use error::{Error, Result};
pub use experiment::{
    ExperimentOptions, ExperimentResult, ExperimentRunner, ExperimentSample, Experimenter,
    parse_samples, print_experiment, write_experiment,
};
pub use figure::Figure;
pub use harness::{DRIVER_DEVICE, Harness, HarnessConfig, MissingPrerequisite};
pub use merge::{DEFAULT_THRESHOLD, MergeError, RetryPolicy, merge, merge_subsets};
pub use pipeline::{BuildPipeline, NasmPipeline, PipelineRequest, Stage, Toolchain};
pub use registry::{GroupBuilder, Plotter, Registry, Results, Runner, Selection, TestGroup};
