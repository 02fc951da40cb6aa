//! Session configuration
//!
//! Loaded from an optional file plus `EDGE_VEDA_*` environment variables,
//! with `__` separating nested keys
//! (e.g. `EDGE_VEDA_SCHEDULER__WARMUP_THRESHOLD=30`).

use crate::budget::{BudgetLimits, BudgetProfile, EdgeVedaBudget};
use crate::scheduler::{SchedulerConfig, DEFAULT_MAX_CONCURRENT_TASKS, DEFAULT_WARMUP_THRESHOLD};
use crate::tracker::{
    BatteryConfig, DEFAULT_BATTERY_MAX_SAMPLES, DEFAULT_BATTERY_SAMPLE_INTERVAL,
    DEFAULT_BATTERY_WINDOW, DEFAULT_LATENCY_WINDOW, DEFAULT_MEMORY_WINDOW,
    DEFAULT_PRESSURE_THRESHOLD, DEFAULT_THERMAL_POLL_INTERVAL,
};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const ENV_PREFIX: &str = "EDGE_VEDA";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub warmup_threshold: usize,
    pub latency_window: usize,
    pub max_concurrent_tasks: usize,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            warmup_threshold: DEFAULT_WARMUP_THRESHOLD,
            latency_window: DEFAULT_LATENCY_WINDOW,
            max_concurrent_tasks: DEFAULT_MAX_CONCURRENT_TASKS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatterySettings {
    pub sample_interval_secs: u64,
    pub window_secs: u64,
    pub max_samples: usize,
}

impl Default for BatterySettings {
    fn default() -> Self {
        Self {
            sample_interval_secs: DEFAULT_BATTERY_SAMPLE_INTERVAL.as_secs(),
            window_secs: DEFAULT_BATTERY_WINDOW.as_secs(),
            max_samples: DEFAULT_BATTERY_MAX_SAMPLES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThermalSettings {
    pub poll_interval_secs: u64,
    /// Platform code pushes status changes; used when there is no probe
    pub push_updates: bool,
}

impl Default for ThermalSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_THERMAL_POLL_INTERVAL.as_secs(),
            push_updates: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemorySettings {
    pub window: usize,
    /// Periodic sampling is off unless set
    pub sample_interval_secs: Option<u64>,
    /// Pressure detection is off unless set
    pub limit_mb: Option<u64>,
    pub pressure_threshold: f64,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            window: DEFAULT_MEMORY_WINDOW,
            sample_interval_secs: None,
            limit_mb: None,
            pressure_threshold: DEFAULT_PRESSURE_THRESHOLD,
        }
    }
}

/// Either a profile name or explicit limits, never both
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetSettings {
    pub profile: Option<BudgetProfile>,
    #[serde(flatten)]
    pub limits: BudgetLimits,
}

impl BudgetSettings {
    /// `None` when no budget was configured
    pub fn to_budget(&self) -> Result<Option<EdgeVedaBudget>> {
        match (self.profile, self.limits.is_unconstrained()) {
            (Some(_), false) => {
                bail!("budget.profile cannot be combined with explicit budget limits")
            }
            (Some(profile), true) => Ok(Some(EdgeVedaBudget::adaptive(profile))),
            (None, false) => Ok(Some(EdgeVedaBudget::explicit(self.limits))),
            (None, true) => Ok(None),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

/// Complete session configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeVedaConfig {
    /// Label attached to every structured log event
    pub device: String,
    pub scheduler: SchedulerSettings,
    pub battery: BatterySettings,
    pub thermal: ThermalSettings,
    pub memory: MemorySettings,
    pub budget: BudgetSettings,
    pub server: ServerSettings,
}

impl Default for EdgeVedaConfig {
    fn default() -> Self {
        Self {
            device: "local".to_string(),
            scheduler: SchedulerSettings::default(),
            battery: BatterySettings::default(),
            thermal: ThermalSettings::default(),
            memory: MemorySettings::default(),
            budget: BudgetSettings::default(),
            server: ServerSettings::default(),
        }
    }
}

impl EdgeVedaConfig {
    /// Load from an optional file, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| match path {
                Some(path) => format!("Failed to read configuration from {}", path.display()),
                None => "Failed to read configuration from environment".to_string(),
            })?;

        Self::from_settings(settings)
    }

    /// Parse an in-memory TOML document
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .context("Failed to parse configuration")?;
        Self::from_settings(settings)
    }

    fn from_settings(settings: config::Config) -> Result<Self> {
        let config: Self = settings
            .try_deserialize()
            .context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the trackers cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.latency_window == 0 {
            bail!("scheduler.latency_window must be at least 1");
        }
        if self.scheduler.warmup_threshold == 0 {
            bail!("scheduler.warmup_threshold must be at least 1");
        }
        if self.battery.sample_interval_secs == 0 || self.thermal.poll_interval_secs == 0 {
            bail!("sampling intervals must be at least one second");
        }
        if self.memory.sample_interval_secs == Some(0) {
            bail!("memory.sample_interval_secs must be at least one second");
        }
        if self.memory.window == 0 {
            bail!("memory.window must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.memory.pressure_threshold) {
            bail!("memory.pressure_threshold must be between 0 and 1");
        }
        self.budget.to_budget()?;
        Ok(())
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            warmup_threshold: self.scheduler.warmup_threshold,
            max_concurrent_tasks: self.scheduler.max_concurrent_tasks,
        }
    }

    pub fn battery_config(&self) -> BatteryConfig {
        BatteryConfig {
            sample_interval: Duration::from_secs(self.battery.sample_interval_secs),
            window: Duration::from_secs(self.battery.window_secs),
            max_samples: self.battery.max_samples,
        }
    }

    pub fn thermal_poll_interval(&self) -> Duration {
        Duration::from_secs(self.thermal.poll_interval_secs)
    }

    pub fn memory_sample_interval(&self) -> Option<Duration> {
        self.memory.sample_interval_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EdgeVedaConfig::default();
        assert_eq!(config.scheduler.warmup_threshold, 20);
        assert_eq!(config.scheduler.latency_window, 100);
        assert_eq!(config.battery_config().window, Duration::from_secs(600));
        assert_eq!(config.battery.max_samples, 11);
        assert_eq!(config.thermal_poll_interval(), Duration::from_secs(5));
        assert_eq!(config.memory_sample_interval(), None);
        assert_eq!(config.server.port, 8080);
        assert!(config.budget.to_budget().unwrap().is_none());
    }

    #[test]
    fn test_adaptive_profile_from_toml() {
        let config = EdgeVedaConfig::from_toml_str(
            r#"
            device = "pixel-8"

            [scheduler]
            warmup_threshold = 30

            [budget]
            profile = "conservative"
            "#,
        )
        .unwrap();

        assert_eq!(config.device, "pixel-8");
        assert_eq!(config.scheduler_config().warmup_threshold, 30);
        assert_eq!(config.scheduler.latency_window, 100);
        assert_eq!(
            config.budget.to_budget().unwrap(),
            Some(EdgeVedaBudget::adaptive(BudgetProfile::Conservative))
        );
    }

    #[test]
    fn test_explicit_limits_from_toml() {
        let config = EdgeVedaConfig::from_toml_str(
            r#"
            [budget]
            p95_latency_ms = 2500
            memory_ceiling_mb = 3072
            "#,
        )
        .unwrap();

        let budget = config.budget.to_budget().unwrap().unwrap();
        assert_eq!(budget.p95_latency_ms(), Some(2500));
        assert_eq!(budget.memory_ceiling_mb(), Some(3072));
        assert_eq!(budget.max_thermal_level(), None);
    }

    #[test]
    fn test_profile_and_limits_are_exclusive() {
        let result = EdgeVedaConfig::from_toml_str(
            r#"
            [budget]
            profile = "balanced"
            p95_latency_ms = 2500
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_window_rejected() {
        let result = EdgeVedaConfig::from_toml_str(
            r#"
            [scheduler]
            latency_window = 0
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[memory]\nsample_interval_secs = 15\n\n[server]\nport = 9100").unwrap();

        let config = EdgeVedaConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.memory_sample_interval(), Some(Duration::from_secs(15)));
        assert_eq!(config.server.port, 9100);
    }

    #[test]
    fn test_memory_pressure_settings() {
        let config = EdgeVedaConfig::from_toml_str(
            r#"
            [thermal]
            push_updates = true

            [memory]
            limit_mb = 1200
            pressure_threshold = 0.8
            "#,
        )
        .unwrap();
        assert!(config.thermal.push_updates);
        assert_eq!(config.memory.limit_mb, Some(1200));
        assert_eq!(config.memory.pressure_threshold, 0.8);

        let result = EdgeVedaConfig::from_toml_str(
            r#"
            [memory]
            pressure_threshold = 1.5
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(EdgeVedaConfig::load(Some(Path::new("/nonexistent/edge-veda.toml"))).is_err());
    }
}
