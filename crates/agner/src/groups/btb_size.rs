//! BTB capacity: a chain of taken branches whose targets are spread ever
//! further apart. Cycles per branch jump once the chain no longer fits.

use indexmap::IndexMap;
use serde_json::Value;

use crate::Result;
use crate::experiment::{ExperimentOptions, ExperimentResult, Experimenter};
use crate::figure::Figure;
use crate::registry::{GroupBuilder, Plotter, Runner, TestGroup};

use super::{as_f64, counters, decode, mean};

pub const BRANCH_COUNTS: [u32; 5] = [1, 4, 8, 64, 128];

pub const ALIGNMENTS: [u32; 8] = [16, 256, 512, 1024, 2048, 4096, 16384, 65536];

/// Core cycles, instructions, branches.
pub const COUNTERS: [u32; 3] = [1, 9, 207];

/// Column holding core cycles in the benchmark output.
const CYCLES: &str = "Core cyc";

/// Results keyed by alignment.
type Sweep = IndexMap<String, ExperimentResult>;

/// A chain of `branches` taken jumps, swept over every alignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BtbSizeTest {
    pub branches: u32,
    pub alignments: Vec<u32>,
}

impl BtbSizeTest {
    #[must_use]
    pub fn new(branches: u32) -> Self {
        Self {
            branches,
            alignments: ALIGNMENTS.to_vec(),
        }
    }

    /// Assembly for `branches` jumps, each landing on an `align` boundary.
    #[must_use]
    pub fn body(&self, align: u32) -> String {
        format!(
            "
%macro OneJump 0
je %%next
align {align}
%%next:
%endmacro

cmp eax, eax
jmp BtbLoop
align {align}
BtbLoop:
%rep {branches}
OneJump
%endrep
",
            branches = self.branches
        )
    }

    fn cycles_per_branch(&self, samples: &ExperimentResult) -> f64 {
        let cycles = samples
            .iter()
            .filter_map(|s| s.get(CYCLES).or_else(|| s.values().next()).copied());
        mean(cycles) / f64::from(self.branches.max(1))
    }
}

impl Runner for BtbSizeTest {
    fn run(&self, experimenter: &dyn Experimenter) -> Result<Value> {
        let counters = counters(&COUNTERS);
        let options = ExperimentOptions::new().with_repetitions(1);
        let mut sweep = Sweep::new();
        for &align in &self.alignments {
            let result = experimenter.run_experiment(&self.body(align), &counters, &options)?;
            sweep.insert(align.to_string(), result);
        }
        Ok(serde_json::to_value(sweep)?)
    }
}

impl Plotter for BtbSizeTest {
    fn plot(&self, result: &Value, alternative: bool, figure: &mut Figure) -> Result<()> {
        let sweep: Sweep = decode(result)?;
        figure
            .set_title(format!("BTB size: {} branches", self.branches))
            .set_categories(sweep.keys().cloned());

        if !alternative {
            figure.set_labels("alignment", "cycles per branch");
            let values = sweep.values().map(|s| self.cycles_per_branch(s)).collect();
            figure.add_series("cycles", values);
            return Ok(());
        }

        figure.set_labels("alignment", "count per branch");
        let mut names: Vec<&String> = Vec::new();
        for sample in sweep.values().flatten() {
            for name in sample.keys() {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        for name in names {
            let values = sweep
                .values()
                .map(|samples| {
                    let readings = samples.iter().filter_map(|s| s.get(name).copied());
                    mean(readings) / f64::from(self.branches.max(1))
                })
                .collect();
            figure.add_series(name.clone(), values);
        }
        Ok(())
    }
}

pub struct BtbSizeGroup;

impl TestGroup for BtbSizeGroup {
    fn add_tests(&self, builder: &mut GroupBuilder<'_>) {
        for branches in BRANCH_COUNTS {
            let test = BtbSizeTest::new(branches);
            builder.add_test(branches.to_string(), test.clone(), test);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use agner_counters::CounterRef;
    use serde_json::json;

    use super::*;
    use crate::experiment::ExperimentSample;

    /// Answers with cycles proportional to the alignment found in the body.
    #[derive(Default)]
    struct ByAlignment {
        calls: RefCell<Vec<(String, Vec<CounterRef>, u32)>>,
    }

    impl Experimenter for ByAlignment {
        fn run_experiment(
            &self,
            body: &str,
            counters: &[CounterRef],
            options: &ExperimentOptions,
        ) -> Result<ExperimentResult> {
            self.calls
                .borrow_mut()
                .push((body.to_string(), counters.to_vec(), options.repetitions));
            let align: i64 = body
                .lines()
                .find_map(|l| l.strip_prefix("align "))
                .and_then(|a| a.parse().ok())
                .unwrap_or(0);
            let sample: ExperimentSample = [
                ("Core cyc".to_string(), align),
                ("Instruct".to_string(), 3),
                ("BrTaken".to_string(), 1),
            ]
            .into_iter()
            .collect();
            Ok(vec![sample])
        }
    }

    #[test]
    fn test_body_uses_parameters() {
        let body = BtbSizeTest::new(64).body(4096);
        assert!(body.contains("align 4096\n%%next:"));
        assert!(body.contains("%rep 64\nOneJump\n%endrep"));
    }

    #[test]
    fn test_run_sweeps_alignments() {
        let experimenter = ByAlignment::default();
        let result = BtbSizeTest::new(4).run(&experimenter).unwrap();

        let calls = experimenter.calls.borrow();
        assert_eq!(calls.len(), ALIGNMENTS.len());
        assert!(calls.iter().all(|(_, c, reps)| c == &COUNTERS.map(CounterRef::Id) && *reps == 1));

        let keys: Vec<_> = result.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, ALIGNMENTS.map(|a| a.to_string()));
        assert_eq!(result["65536"][0]["Core cyc"], json!(65536));
    }

    #[test]
    fn test_plot_cycles_per_branch() {
        let test = BtbSizeTest::new(4);
        let result = json!({
            "16": [{ "Core cyc": 8, "Instruct": 12 }],
            "4096": [{ "Core cyc": 40, "Instruct": 12 }],
        });

        let mut figure = Figure::new();
        test.plot(&result, false, &mut figure).unwrap();
        assert_eq!(figure.title, "BTB size: 4 branches");
        assert_eq!(figure.categories, ["16", "4096"]);
        assert_eq!(figure.series[0].values, [2.0, 10.0]);

        let mut all = Figure::new();
        test.plot(&result, true, &mut all).unwrap();
        let names: Vec<_> = all.series.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["Core cyc", "Instruct"]);
        assert_eq!(all.series[1].values, [3.0, 3.0]);
    }

    #[test]
    fn test_group_registers_each_count() {
        let mut registry = crate::registry::Registry::new();
        registry.add_group("btb_size", &BtbSizeGroup);
        assert_eq!(
            registry.subtests("btb_size").unwrap(),
            ["1", "4", "8", "64", "128"]
        );
    }
}
