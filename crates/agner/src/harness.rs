//! Process-wide harness state.
//!
//! The counter catalog is probed at most once per process and handed to
//! every runner by reference.

use std::path::PathBuf;
use std::sync::OnceLock;

use agner_counters::{CounterDatabase, ProbeConfig};

use crate::experiment::ExperimentRunner;
use crate::groups;
use crate::pipeline::{NasmPipeline, Toolchain, find_in_path};
use crate::Result;
use crate::registry::Registry;

/// Device node created by the MSR driver.
pub const DRIVER_DEVICE: &str = "/dev/MSRdrv";

/// Resolved harness paths and tools.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Directory containing the native sources and Makefile.
    pub root: PathBuf,
    pub toolchain: Toolchain,
    pub probe: ProbeConfig,
    /// Device that must exist before counters can be read.
    pub driver_device: PathBuf,
}

impl HarnessConfig {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            toolchain: Toolchain::new(&root),
            probe: ProbeConfig::for_root(&root),
            driver_device: PathBuf::from(DRIVER_DEVICE),
            root,
        }
    }

    /// MSR driver sources, next to the Makefile.
    #[must_use]
    pub fn driver_dir(&self) -> PathBuf {
        self.root.join("driver")
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self::new(".")
    }
}

/// A host requirement that is not met.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingPrerequisite {
    pub what: String,
    pub hint: String,
}

pub struct Harness {
    config: HarnessConfig,
    counters: OnceLock<CounterDatabase>,
    registry: Registry,
}

impl Harness {
    /// Harness with every built-in test group registered.
    #[must_use]
    pub fn new(config: HarnessConfig) -> Self {
        let mut registry = Registry::new();
        for (name, group) in groups::all() {
            registry.add_group(name, group.as_ref());
        }
        Self {
            config,
            counters: OnceLock::new(),
            registry,
        }
    }

    /// Harness using an already built counter catalog instead of the probe.
    #[must_use]
    pub fn with_counters(config: HarnessConfig, counters: CounterDatabase) -> Self {
        Self {
            counters: OnceLock::from(counters),
            ..Self::new(config)
        }
    }

    #[must_use]
    pub const fn config(&self) -> &HarnessConfig {
        &self.config
    }

    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The counter catalog, probing the host on first use.
    ///
    /// # Errors
    /// Returns an error if the probe fails. A failed probe is retried on the
    /// next call.
    pub fn counters(&self) -> Result<&CounterDatabase> {
        if let Some(db) = self.counters.get() {
            return Ok(db);
        }
        let db = CounterDatabase::probe(&self.config.probe)?;
        Ok(self.counters.get_or_init(|| db))
    }

    /// Runner over the native toolchain.
    ///
    /// # Errors
    /// Returns an error if the counter catalog cannot be built.
    pub fn runner(&self) -> Result<ExperimentRunner<'_, NasmPipeline>> {
        let counters = self.counters()?;
        Ok(ExperimentRunner::new(
            counters,
            NasmPipeline::new(self.config.toolchain.clone()),
        ))
    }

    /// Requirements for running experiments that the host does not meet.
    #[must_use]
    pub fn missing_prerequisites(&self) -> Vec<MissingPrerequisite> {
        let mut missing = Vec::new();
        if !self.config.driver_device.exists() {
            missing.push(MissingPrerequisite {
                what: format!("{} not found", self.config.driver_device.display()),
                hint: "install the MSR driver with `agner install`".to_string(),
            });
        }
        let assembler = &self.config.toolchain.assembler;
        if !find_in_path(assembler) {
            missing.push(MissingPrerequisite {
                what: format!("{assembler} not found on PATH"),
                hint: format!("install {assembler} from your package manager"),
            });
        }
        missing
    }
}

#[cfg(test)]
mod tests {
    use agner_counters::{CounterDescriptor, CounterRef};

    use super::*;

    #[test]
    fn test_builtin_groups_registered() {
        let harness = Harness::new(HarnessConfig::default());
        let groups: Vec<_> = harness.registry().groups().collect();
        assert_eq!(groups, ["branch", "btb_size"]);
    }

    #[test]
    fn test_paths_share_the_makefile_root() {
        let config = HarnessConfig::new("/repo/src");
        assert_eq!(config.toolchain.root, PathBuf::from("/repo/src"));
        assert_eq!(config.probe.tool, PathBuf::from("/repo/src/out/list-counters"));
        assert_eq!(config.driver_dir(), PathBuf::from("/repo/src/driver"));
    }

    #[test]
    fn test_preset_counters_skip_probe() {
        let mut config = HarnessConfig::new("/nonexistent");
        config.probe = ProbeConfig::prebuilt("/nonexistent/list-counters");
        let db = CounterDatabase::from_descriptors([CounterDescriptor {
            counter_id: 1,
            name: "Core cyc".to_string(),
            supported: true,
            scheme: 0,
            family: 0,
        }]);

        let harness = Harness::with_counters(config, db);
        let counters = harness.counters().unwrap();
        assert!(counters.is_supported(&CounterRef::Id(1)));
        assert!(harness.runner().is_ok());
    }

    #[test]
    fn test_failed_probe_is_reported() {
        let mut config = HarnessConfig::new("/nonexistent");
        config.probe = ProbeConfig::prebuilt("/nonexistent/list-counters");
        let harness = Harness::new(config);
        assert!(harness.counters().is_err());
        assert!(harness.runner().is_err());
    }

    #[test]
    fn test_missing_prerequisites() {
        let mut config = HarnessConfig::new(".");
        config.driver_device = PathBuf::from("/nonexistent/MSRdrv");
        config.toolchain.assembler = "agner-no-such-nasm".to_string();

        let missing = Harness::new(config).missing_prerequisites();
        assert_eq!(missing.len(), 2);
        assert_eq!(missing[0].what, "/nonexistent/MSRdrv not found");
        assert_eq!(missing[1].what, "agner-no-such-nasm not found on PATH");
    }
}
