//! Branch prediction: cost of taken and not-taken branches, forwards and
//! backwards, with a scrambled BTB before every repetition.

use serde_json::Value;

use crate::Result;
use crate::experiment::{ExperimentOptions, ExperimentResult, Experimenter};
use crate::figure::Figure;
use crate::merge::{RetryPolicy, merge_subsets};
use crate::registry::{GroupBuilder, Plotter, Runner, TestGroup};

use super::{as_f64, counters, decode, mean};

/// Copies of the branch in the measured body.
pub const BRANCHES: u32 = 1000;

/// Counter subsets, each small enough to be read in one run. Cycles and
/// instructions are repeated so the runs can be checked against each other.
pub const SUBSETS: [[u32; 4]; 3] = [[1, 9, 207, 400], [1, 9, 401, 402], [1, 9, 403, 404]];

/// Per-repetition init that trains the predictor on unrelated jumps.
pub const SCRAMBLE_BTB: &str = r"
%macro OneJump 0
    mov ecx, esi
    align 16
%%lp:
    dec ecx
    jnz %%lp
%endmacro

    jmp ScrambleBTB

ScrambleBTB_i:
    align 16
%REP 4096
    OneJump
%ENDREP
    ret

ScrambleBTB:
    mov esi, 3
.lp:
    call ScrambleBTB_i
    dec esi
    jnz .lp
";

const BACKWARDS_PROLOGUE: &str = r"
jmp BranchTestEnd - 16
%REP 16
nop
%ENDREP
align 16
jmp BranchTestEnd
";

const BACKWARDS_EPILOGUE: &str = r"
align 16
BranchTestEnd:
";

/// One branch flavour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchTest {
    pub title: &'static str,
    pub instruction: &'static str,
    /// The branch targets code before itself.
    pub backwards: bool,
}

impl BranchTest {
    #[must_use]
    pub const fn new(title: &'static str, instruction: &'static str) -> Self {
        Self {
            title,
            instruction,
            backwards: false,
        }
    }

    #[must_use]
    pub const fn backwards(mut self) -> Self {
        self.backwards = true;
        self
    }

    /// Assembly for the measured body.
    #[must_use]
    pub fn body(&self) -> String {
        let (prologue, epilogue) = if self.backwards {
            (BACKWARDS_PROLOGUE, BACKWARDS_EPILOGUE)
        } else {
            ("", "")
        };
        format!(
            "\ncmp ebp, ebp\n{prologue}\n%REP {BRANCHES}\nalign 16\n{}\n%ENDREP\nalign 16\n{epilogue}",
            self.instruction
        )
    }
}

impl Runner for BranchTest {
    fn run(&self, experimenter: &dyn Experimenter) -> Result<Value> {
        let subsets: Vec<_> = SUBSETS.iter().map(|ids| counters(ids)).collect();
        let options = ExperimentOptions::new().with_init_each(SCRAMBLE_BTB);
        let merged = merge_subsets(
            experimenter,
            &self.body(),
            &subsets,
            &options,
            RetryPolicy::default(),
        )?;
        Ok(serde_json::to_value(merged)?)
    }
}

impl Plotter for BranchTest {
    fn plot(&self, result: &Value, alternative: bool, figure: &mut Figure) -> Result<()> {
        let samples: ExperimentResult = decode(result)?;
        let names: Vec<String> = samples
            .first()
            .map(|s| s.keys().cloned().collect())
            .unwrap_or_default();

        figure.set_title(self.title).set_categories(names.iter().cloned());
        if alternative {
            figure.set_labels("counter", "count per repetition");
            for (repetition, sample) in samples.iter().enumerate() {
                let values = names
                    .iter()
                    .map(|name| sample.get(name).copied().map_or(0.0, as_f64))
                    .collect();
                figure.add_series(format!("rep {repetition}"), values);
            }
        } else {
            figure.set_labels("counter", "count per branch");
            let values = names
                .iter()
                .map(|name| mean(samples.iter().filter_map(|s| s.get(name).copied())) / f64::from(BRANCHES))
                .collect();
            figure.add_series("per branch", values);
        }
        Ok(())
    }
}

pub struct BranchGroup;

impl BranchGroup {
    #[must_use]
    pub fn tests() -> [(&'static str, BranchTest); 4] {
        [
            ("ahead_not_taken", BranchTest::new("Ahead not taken", "jne $+4")),
            ("behind_not_taken", BranchTest::new("Behind not taken", "jne $-4")),
            ("ahead_taken", BranchTest::new("Ahead taken", "je $+4")),
            (
                "behind_taken",
                BranchTest::new("Behind taken", "je $-16-8").backwards(),
            ),
        ]
    }
}

impl TestGroup for BranchGroup {
    fn add_tests(&self, builder: &mut GroupBuilder<'_>) {
        for (name, test) in Self::tests() {
            builder.add_test(name, test.clone(), test);
        }
    }
}
