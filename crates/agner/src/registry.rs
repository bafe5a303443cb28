//! Test registry and dispatcher.
//!
//! Tests live in a two-level namespace, `group.subtest`. Each group
//! registers its subtests through a [`GroupBuilder`] that is only available
//! while the group is being added.

use indexmap::IndexMap;
use metrics::counter;
use serde_json::Value;
use tracing::{info, warn};

use crate::experiment::Experimenter;
use crate::figure::Figure;
use crate::{Error, Result};

/// Results keyed by group, then subtest.
pub type Results = IndexMap<String, IndexMap<String, Value>>;

/// Produces a test's result.
pub trait Runner {
    /// # Errors
    /// Returns any error raised while running the experiments.
    fn run(&self, experimenter: &dyn Experimenter) -> Result<Value>;
}

impl<F> Runner for F
where
    F: Fn(&dyn Experimenter) -> Result<Value>,
{
    fn run(&self, experimenter: &dyn Experimenter) -> Result<Value> {
        self(experimenter)
    }
}

/// Draws a test's result.
pub trait Plotter {
    /// # Errors
    /// Returns an error if the result does not have the expected shape.
    fn plot(&self, result: &Value, alternative: bool, figure: &mut Figure) -> Result<()>;
}

impl<F> Plotter for F
where
    F: Fn(&Value, bool, &mut Figure) -> Result<()>,
{
    fn plot(&self, result: &Value, alternative: bool, figure: &mut Figure) -> Result<()> {
        self(result, alternative, figure)
    }
}

/// A group of related subtests.
pub trait TestGroup {
    /// Register subtests with the builder.
    fn add_tests(&self, builder: &mut GroupBuilder<'_>);
}

/// A registered subtest.
pub struct Test {
    name: String,
    runner: Box<dyn Runner>,
    plotter: Box<dyn Plotter>,
}

impl Test {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// # Errors
    /// Propagates the runner's error.
    pub fn run(&self, experimenter: &dyn Experimenter) -> Result<Value> {
        self.runner.run(experimenter)
    }

    /// # Errors
    /// Propagates the plotter's error.
    pub fn plot(&self, result: &Value, alternative: bool, figure: &mut Figure) -> Result<()> {
        self.plotter.plot(result, alternative, figure)
    }
}

/// Registration handle scoped to one group.
pub struct GroupBuilder<'a> {
    tests: &'a mut IndexMap<String, Test>,
}

impl GroupBuilder<'_> {
    /// Add a subtest to the group being built.
    pub fn add_test(
        &mut self,
        name: impl Into<String>,
        runner: impl Runner + 'static,
        plotter: impl Plotter + 'static,
    ) -> &mut Self {
        let name = name.into();
        self.tests.insert(
            name.clone(),
            Test {
                name,
                runner: Box::new(runner),
                plotter: Box::new(plotter),
            },
        );
        self
    }
}

/// Which tests to run or plot.
///
/// Each selector is either `group.subtest` or `group.*`. No selectors selects
/// everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    selectors: Vec<String>,
}

impl Selection {
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn new<I, S>(selectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            selectors: selectors.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn matches(&self, group: &str, subtest: &str) -> bool {
        if self.selectors.is_empty() {
            return true;
        }
        self.selectors.iter().any(|selector| {
            selector
                .strip_prefix(group)
                .and_then(|rest| rest.strip_prefix('.'))
                .is_some_and(|rest| rest == "*" || rest == subtest)
        })
    }
}

/// All registered test groups, in registration order.
#[derive(Default)]
pub struct Registry {
    groups: IndexMap<String, IndexMap<String, Test>>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a group under `name`, replacing any group of the same name.
    pub fn add_group(&mut self, name: impl Into<String>, group: &dyn TestGroup) -> &mut Self {
        let mut tests = IndexMap::new();
        group.add_tests(&mut GroupBuilder { tests: &mut tests });
        self.groups.insert(name.into(), tests);
        self
    }

    /// Group names in registration order.
    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    /// Subtest names of a group, or `None` if the group is unknown.
    #[must_use]
    pub fn subtests(&self, group: &str) -> Option<Vec<&str>> {
        self.groups
            .get(group)
            .map(|tests| tests.keys().map(String::as_str).collect())
    }

    #[must_use]
    pub fn get(&self, group: &str, subtest: &str) -> Option<&Test> {
        self.groups.get(group)?.get(subtest)
    }

    /// Selected `(group, subtest)` pairs in registration order.
    #[must_use]
    pub fn selected(&self, selection: &Selection) -> Vec<(&str, &str)> {
        self.groups
            .iter()
            .flat_map(|(group, tests)| {
                tests
                    .keys()
                    .filter(|subtest| selection.matches(group, subtest))
                    .map(move |subtest| (group.as_str(), subtest.as_str()))
            })
            .collect()
    }

    /// Run every selected test.
    ///
    /// # Errors
    /// Stops at the first failing test.
    pub fn run_selected(
        &self,
        selection: &Selection,
        experimenter: &dyn Experimenter,
    ) -> Result<Results> {
        self.run_selected_with(selection, experimenter, |_, _| {})
    }

    /// Like [`Registry::run_selected`], calling `before` ahead of each test.
    ///
    /// # Errors
    /// Stops at the first failing test.
    pub fn run_selected_with(
        &self,
        selection: &Selection,
        experimenter: &dyn Experimenter,
        mut before: impl FnMut(&str, &str),
    ) -> Result<Results> {
        let mut results = Results::new();
        for (group, subtest) in self.selected(selection) {
            let Some(test) = self.get(group, subtest) else {
                continue;
            };
            before(group, subtest);
            info!("running {group}.{subtest}");
            let result = test.run(experimenter).map_err(|e| Error::Test {
                test: format!("{group}.{subtest}"),
                source: Box::new(e),
            })?;
            counter!("agner_tests_run_total").increment(1);
            results
                .entry(group.to_string())
                .or_default()
                .insert(subtest.to_string(), result);
        }
        Ok(results)
    }

    /// Plot every selected result, calling `callback` after each plot.
    ///
    /// Results for tests that are no longer registered are skipped.
    ///
    /// # Errors
    /// Stops at the first plotter error.
    pub fn plot_selected(
        &self,
        results: &Results,
        selection: &Selection,
        alternative: bool,
        mut callback: Option<&mut dyn FnMut(&str, &str, &Figure)>,
    ) -> Result<()> {
        for (group, subtests) in results {
            for (subtest, result) in subtests {
                if !selection.matches(group, subtest) {
                    continue;
                }
                let Some(test) = self.get(group, subtest) else {
                    warn!("no registered test for {group}.{subtest}, skipping");
                    continue;
                };
                let mut figure = Figure::new();
                test.plot(result, alternative, &mut figure)
                    .map_err(|e| Error::Test {
                        test: format!("{group}.{subtest}"),
                        source: Box::new(e),
                    })?;
                if let Some(callback) = callback.as_mut() {
                    callback(group, subtest, &figure);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_selection_matching() {
        let all = Selection::all();
        assert!(all.matches("g1", "s1"));

        let wildcard = Selection::new(["g1.*"]);
        assert!(wildcard.matches("g1", "s1"));
        assert!(wildcard.matches("g1", "s2"));
        assert!(!wildcard.matches("g2", "s1"));
        // Not a prefix match on the group name.
        assert!(!wildcard.matches("g", "1.s1"));

        let exact = Selection::new(["g1.s1"]);
        assert!(exact.matches("g1", "s1"));
        assert!(!exact.matches("g1", "s2"));
        assert!(!exact.matches("g1", "s1x"));

        // Only a trailing `*` is special.
        assert!(!Selection::new(["g1.s*"]).matches("g1", "s1"));
        assert!(!Selection::new(["*.s1"]).matches("g1", "s1"));
    }

    struct Pair;

    impl TestGroup for Pair {
        fn add_tests(&self, builder: &mut GroupBuilder<'_>) {
            for name in ["s1", "s2"] {
                builder.add_test(
                    name,
                    move |_: &dyn Experimenter| -> Result<Value> { Ok(json!({ "name": name })) },
                    |_: &Value, _: bool, _: &mut Figure| -> Result<()> { Ok(()) },
                );
            }
        }
    }

    #[test]
    fn test_group_registration_order() {
        let mut registry = Registry::new();
        registry.add_group("g2", &Pair).add_group("g1", &Pair);

        assert_eq!(registry.groups().collect::<Vec<_>>(), ["g2", "g1"]);
        assert_eq!(registry.subtests("g1").unwrap(), ["s1", "s2"]);
        assert!(registry.subtests("missing").is_none());
        assert_eq!(registry.get("g1", "s2").unwrap().name(), "s2");
    }

    #[test]
    fn test_re_adding_group_replaces_tests() {
        struct Single;
        impl TestGroup for Single {
            fn add_tests(&self, builder: &mut GroupBuilder<'_>) {
                builder.add_test(
                    "only",
                    |_: &dyn Experimenter| -> Result<Value> { Ok(Value::Null) },
                    |_: &Value, _: bool, _: &mut Figure| -> Result<()> { Ok(()) },
                );
            }
        }

        let mut registry = Registry::new();
        registry.add_group("g", &Pair).add_group("h", &Pair).add_group("g", &Single);
        assert_eq!(registry.groups().collect::<Vec<_>>(), ["g", "h"]);
        assert_eq!(registry.subtests("g").unwrap(), ["only"]);
    }

    #[test]
    fn test_selected_pairs() {
        let mut registry = Registry::new();
        registry.add_group("g1", &Pair).add_group("g2", &Pair);

        assert_eq!(registry.selected(&Selection::all()).len(), 4);
        assert_eq!(
            registry.selected(&Selection::new(["g2.*", "g1.s2"])),
            [("g1", "s2"), ("g2", "s1"), ("g2", "s2")]
        );
    }
}
