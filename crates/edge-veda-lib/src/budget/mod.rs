//! Declarative resource budgets
//!
//! A budget is either explicit (concrete ceilings chosen by the operator) or
//! adaptive (a qualitative profile resolved against a measured baseline once
//! the scheduler has warmed up).

mod violation;

pub use violation::{
    evaluate_constraints, BudgetConstraint, BudgetViolation, ConstraintReadings,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Below this p95 the budget is unlikely to be met by on-device inference
const MIN_REALISTIC_P95_MS: u64 = 500;

/// Below this drain rate the budget fires constantly on real devices
const MIN_REALISTIC_DRAIN: f64 = 0.5;

/// Below this ceiling most models cannot even be loaded
const MIN_REALISTIC_MEMORY_MB: u64 = 2000;

/// Qualitative intent resolved against a measured baseline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetProfile {
    /// Generous latency headroom, tight battery, low thermal tolerance
    Conservative,
    Balanced,
    /// Tight latency, relaxed battery and thermal limits
    Performance,
}

impl BudgetProfile {
    pub fn p95_multiplier(&self) -> f64 {
        match self {
            BudgetProfile::Conservative => 2.0,
            BudgetProfile::Balanced => 1.5,
            BudgetProfile::Performance => 1.1,
        }
    }

    pub fn drain_multiplier(&self) -> f64 {
        match self {
            BudgetProfile::Conservative => 0.6,
            BudgetProfile::Balanced => 1.0,
            BudgetProfile::Performance => 1.5,
        }
    }

    /// Highest tolerated thermal level given the level seen at calibration
    pub fn thermal_ceiling(&self, baseline_thermal: i32) -> i32 {
        match self {
            BudgetProfile::Conservative => baseline_thermal.max(1),
            BudgetProfile::Balanced => 1,
            BudgetProfile::Performance => 3,
        }
    }
}

impl fmt::Display for BudgetProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BudgetProfile::Conservative => write!(f, "conservative"),
            BudgetProfile::Balanced => write!(f, "balanced"),
            BudgetProfile::Performance => write!(f, "performance"),
        }
    }
}

impl FromStr for BudgetProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "conservative" => Ok(BudgetProfile::Conservative),
            "balanced" => Ok(BudgetProfile::Balanced),
            "performance" => Ok(BudgetProfile::Performance),
            other => Err(format!("unknown budget profile '{other}'")),
        }
    }
}

/// Concrete ceilings; `None` leaves a dimension unconstrained
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BudgetLimits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p95_latency_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery_drain_per_ten_minutes: Option<f64>,
    /// Highest tolerated thermal level, 0 to 3
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_thermal_level: Option<i32>,
    /// Observe-only: breaches are reported but never mitigated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_ceiling_mb: Option<u64>,
}

impl BudgetLimits {
    pub fn is_unconstrained(&self) -> bool {
        self.p95_latency_ms.is_none()
            && self.battery_drain_per_ten_minutes.is_none()
            && self.max_thermal_level.is_none()
            && self.memory_ceiling_mb.is_none()
    }
}

/// Device readings captured when warm-up completes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasuredBaseline {
    pub measured_p95_ms: f64,
    /// `None` when the device has no battery API or too few samples
    pub measured_drain_per_ten_min: Option<f64>,
    pub current_thermal_state: i32,
    pub current_rss_mb: f64,
    pub sample_count: usize,
    pub measured_at: DateTime<Utc>,
}

/// Operator-declared compute budget
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum EdgeVedaBudget {
    Explicit(BudgetLimits),
    Adaptive { profile: BudgetProfile },
}

impl EdgeVedaBudget {
    pub fn explicit(limits: BudgetLimits) -> Self {
        EdgeVedaBudget::Explicit(limits)
    }

    pub fn adaptive(profile: BudgetProfile) -> Self {
        EdgeVedaBudget::Adaptive { profile }
    }

    /// Turn a profile into concrete ceilings for this device.
    ///
    /// The p95 ceiling is truncated to whole milliseconds; an unknown drain
    /// stays unknown and memory is left unconstrained.
    pub fn resolve(profile: BudgetProfile, baseline: &MeasuredBaseline) -> Self {
        EdgeVedaBudget::Explicit(BudgetLimits {
            p95_latency_ms: Some((baseline.measured_p95_ms * profile.p95_multiplier()) as u64),
            battery_drain_per_ten_minutes: baseline
                .measured_drain_per_ten_min
                .map(|drain| drain * profile.drain_multiplier()),
            max_thermal_level: Some(profile.thermal_ceiling(baseline.current_thermal_state)),
            memory_ceiling_mb: None,
        })
    }

    pub fn profile(&self) -> Option<BudgetProfile> {
        match self {
            EdgeVedaBudget::Adaptive { profile } => Some(*profile),
            EdgeVedaBudget::Explicit(_) => None,
        }
    }

    /// Concrete limits, if this budget already has them
    pub fn limits(&self) -> Option<&BudgetLimits> {
        match self {
            EdgeVedaBudget::Explicit(limits) => Some(limits),
            EdgeVedaBudget::Adaptive { .. } => None,
        }
    }

    pub fn p95_latency_ms(&self) -> Option<u64> {
        self.limits().and_then(|l| l.p95_latency_ms)
    }

    pub fn battery_drain_per_ten_minutes(&self) -> Option<f64> {
        self.limits().and_then(|l| l.battery_drain_per_ten_minutes)
    }

    pub fn max_thermal_level(&self) -> Option<i32> {
        self.limits().and_then(|l| l.max_thermal_level)
    }

    pub fn memory_ceiling_mb(&self) -> Option<u64> {
        self.limits().and_then(|l| l.memory_ceiling_mb)
    }

    /// Advisory warnings about values that are unrealistic on-device
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let limits = match self.limits() {
            Some(limits) => limits,
            None => return warnings,
        };

        if let Some(p95) = limits.p95_latency_ms {
            if p95 < MIN_REALISTIC_P95_MS {
                warnings.push(format!(
                    "p95 latency budget of {p95} ms is below {MIN_REALISTIC_P95_MS} ms; on-device generation rarely achieves this"
                ));
            }
        }
        if let Some(drain) = limits.battery_drain_per_ten_minutes {
            if drain < MIN_REALISTIC_DRAIN {
                warnings.push(format!(
                    "battery drain budget of {drain:.2}%/10min is below {MIN_REALISTIC_DRAIN}%/10min and will be exceeded by any sustained inference"
                ));
            }
        }
        if let Some(thermal) = limits.max_thermal_level {
            if !(0..=3).contains(&thermal) {
                warnings.push(format!(
                    "thermal ceiling {thermal} is outside the 0-3 level scale"
                ));
            }
        }
        if let Some(memory) = limits.memory_ceiling_mb {
            if memory < MIN_REALISTIC_MEMORY_MB {
                warnings.push(format!(
                    "memory ceiling of {memory} MB is below {MIN_REALISTIC_MEMORY_MB} MB; model weights alone usually exceed it"
                ));
            }
        }
        warnings
    }
}

impl Default for EdgeVedaBudget {
    fn default() -> Self {
        EdgeVedaBudget::Explicit(BudgetLimits::default())
    }
}
