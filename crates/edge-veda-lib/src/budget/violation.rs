//! Budget constraint evaluation
//!
//! Compares tracker readings against concrete limits and describes how each
//! breach could be mitigated. Evaluation is pure; the scheduler decides
//! whether anything acts on the result.

use super::BudgetLimits;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The four budget dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetConstraint {
    P95Latency,
    BatteryDrain,
    Thermal,
    MemoryCeiling,
}

impl BudgetConstraint {
    /// Fixed mitigation description for a breach of this constraint
    pub fn mitigation(&self) -> &'static str {
        match self {
            BudgetConstraint::P95Latency => {
                "Reduce inference frequency and defer low-priority workloads until p95 latency recovers"
            }
            BudgetConstraint::BatteryDrain => {
                "Lower inference rate and pause background workloads to reduce battery drain"
            }
            BudgetConstraint::Thermal => {
                "Throttle inference cadence and lower vision frame rate until the device cools"
            }
            BudgetConstraint::MemoryCeiling => {
                "Observe only: resident model weights cannot be released at runtime; consider a smaller model"
            }
        }
    }

    /// Memory cannot be reduced by any runtime action
    pub fn is_observe_only(&self) -> bool {
        matches!(self, BudgetConstraint::MemoryCeiling)
    }

    /// Metric label value
    pub fn as_str(&self) -> &'static str {
        match self {
            BudgetConstraint::P95Latency => "p95_latency",
            BudgetConstraint::BatteryDrain => "battery_drain",
            BudgetConstraint::Thermal => "thermal",
            BudgetConstraint::MemoryCeiling => "memory_ceiling",
        }
    }
}

impl fmt::Display for BudgetConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A breached budget dimension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetViolation {
    pub constraint: BudgetConstraint,
    pub current_value: f64,
    pub budget_value: f64,
    pub mitigation: String,
    pub timestamp: DateTime<Utc>,
    pub mitigated: bool,
    pub observe_only: bool,
}

impl BudgetViolation {
    pub fn new(
        constraint: BudgetConstraint,
        current_value: f64,
        budget_value: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            constraint,
            current_value,
            budget_value,
            mitigation: constraint.mitigation().to_string(),
            timestamp,
            mitigated: false,
            observe_only: constraint.is_observe_only(),
        }
    }

    /// How far over budget, as a percentage of the budget value
    pub fn percentage_over_budget(&self) -> f64 {
        if self.budget_value.abs() < f64::EPSILON {
            return 0.0;
        }
        (self.current_value - self.budget_value) / self.budget_value * 100.0
    }
}

/// Tracker readings taken for one evaluation pass
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConstraintReadings {
    pub p95_latency_ms: f64,
    pub drain_per_ten_min: Option<f64>,
    /// `-1` when unsupported
    pub thermal_level: i32,
    pub rss_mb: f64,
}

/// Compare readings with limits, returning one violation per breach.
///
/// Unknown readings (no drain estimate, unsupported thermal) never breach.
pub fn evaluate_constraints(
    limits: &BudgetLimits,
    readings: &ConstraintReadings,
    now: DateTime<Utc>,
) -> Vec<BudgetViolation> {
    let mut violations = Vec::new();

    if let Some(budget) = limits.p95_latency_ms {
        if readings.p95_latency_ms > budget as f64 {
            violations.push(BudgetViolation::new(
                BudgetConstraint::P95Latency,
                readings.p95_latency_ms,
                budget as f64,
                now,
            ));
        }
    }

    if let (Some(budget), Some(drain)) =
        (limits.battery_drain_per_ten_minutes, readings.drain_per_ten_min)
    {
        if drain > budget {
            violations.push(BudgetViolation::new(
                BudgetConstraint::BatteryDrain,
                drain,
                budget,
                now,
            ));
        }
    }

    if let Some(budget) = limits.max_thermal_level {
        if readings.thermal_level >= 0 && readings.thermal_level > budget {
            violations.push(BudgetViolation::new(
                BudgetConstraint::Thermal,
                readings.thermal_level as f64,
                budget as f64,
                now,
            ));
        }
    }

    if let Some(budget) = limits.memory_ceiling_mb {
        if readings.rss_mb > budget as f64 {
            violations.push(BudgetViolation::new(
                BudgetConstraint::MemoryCeiling,
                readings.rss_mb,
                budget as f64,
                now,
            ));
        }
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_limits() -> BudgetLimits {
        BudgetLimits {
            p95_latency_ms: Some(1000),
            battery_drain_per_ten_minutes: Some(2.0),
            max_thermal_level: Some(1),
            memory_ceiling_mb: Some(2048),
        }
    }

    #[test]
    fn test_no_violation_within_budget() {
        let readings = ConstraintReadings {
            p95_latency_ms: 800.0,
            drain_per_ten_min: Some(1.0),
            thermal_level: 1,
            rss_mb: 1500.0,
        };
        assert!(evaluate_constraints(&all_limits(), &readings, Utc::now()).is_empty());
    }

    #[test]
    fn test_every_dimension_breached() {
        let readings = ConstraintReadings {
            p95_latency_ms: 1500.0,
            drain_per_ten_min: Some(3.5),
            thermal_level: 3,
            rss_mb: 3000.0,
        };
        let violations = evaluate_constraints(&all_limits(), &readings, Utc::now());
        let kinds: Vec<_> = violations.iter().map(|v| v.constraint).collect();

        assert_eq!(
            kinds,
            vec![
                BudgetConstraint::P95Latency,
                BudgetConstraint::BatteryDrain,
                BudgetConstraint::Thermal,
                BudgetConstraint::MemoryCeiling,
            ]
        );
        assert!(violations.iter().all(|v| !v.mitigated));
        assert!((violations[0].percentage_over_budget() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_memory_violation_is_observe_only() {
        let readings = ConstraintReadings {
            p95_latency_ms: 0.0,
            drain_per_ten_min: None,
            thermal_level: -1,
            rss_mb: 4096.0,
        };
        let violations = evaluate_constraints(&all_limits(), &readings, Utc::now());

        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].constraint, BudgetConstraint::MemoryCeiling);
        assert!(violations[0].observe_only);
        assert!(violations[0].mitigation.starts_with("Observe only"));
    }

    #[test]
    fn test_unknown_readings_never_breach() {
        let readings = ConstraintReadings {
            p95_latency_ms: 0.0,
            drain_per_ten_min: None,
            thermal_level: -1,
            rss_mb: 0.0,
        };
        let strict = BudgetLimits {
            p95_latency_ms: Some(0),
            battery_drain_per_ten_minutes: Some(0.0),
            max_thermal_level: Some(0),
            memory_ceiling_mb: Some(0),
        };
        assert!(evaluate_constraints(&strict, &readings, Utc::now()).is_empty());
    }

    #[test]
    fn test_mitigation_text_is_fixed_per_constraint() {
        let a = BudgetViolation::new(BudgetConstraint::Thermal, 3.0, 1.0, Utc::now());
        let b = BudgetViolation::new(BudgetConstraint::Thermal, 2.0, 1.0, Utc::now());
        assert_eq!(a.mitigation, b.mitigation);
        assert!(!a.observe_only);
    }
}
