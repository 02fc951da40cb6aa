//! Observability infrastructure for the budget core
//!
//! Provides:
//! - Prometheus metrics (task latency, outcomes, violations, tracker gauges)
//! - Structured logging of scheduling and budget events with tracing

use crate::budget::{BudgetLimits, BudgetProfile, BudgetViolation, MeasuredBaseline};
use crate::models::{TaskId, TaskPriority, TaskStatus, Workload};
use prometheus::{
    register_gauge, register_histogram, register_int_counter_vec, register_int_gauge, Gauge,
    Histogram, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Histogram buckets for task latency (in seconds); inference runs long
const TASK_LATENCY_BUCKETS: &[f64] = &[
    0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<RuntimeMetricsInner> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct RuntimeMetricsInner {
    task_latency_seconds: Histogram,
    task_outcomes: IntCounterVec,
    budget_violations: IntCounterVec,
    queue_depth: IntGauge,
    thermal_level: IntGauge,
    battery_drain_per_ten_min: Gauge,
    memory_rss_mb: Gauge,
    memory_peak_rss_mb: Gauge,
    latency_p95_ms: Gauge,
    dropped_frames: IntGauge,
}

impl RuntimeMetricsInner {
    fn new() -> Self {
        Self {
            task_latency_seconds: register_histogram!(
                "edge_veda_task_latency_seconds",
                "Wall-clock duration of scheduled task bodies",
                TASK_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register task_latency_seconds"),

            task_outcomes: register_int_counter_vec!(
                "edge_veda_tasks_total",
                "Scheduled tasks by terminal status",
                &["status"]
            )
            .expect("Failed to register tasks_total"),

            budget_violations: register_int_counter_vec!(
                "edge_veda_budget_violations_total",
                "Budget violations by constraint",
                &["constraint"]
            )
            .expect("Failed to register budget_violations_total"),

            queue_depth: register_int_gauge!(
                "edge_veda_queue_depth",
                "Tasks waiting for an execution slot"
            )
            .expect("Failed to register queue_depth"),

            thermal_level: register_int_gauge!(
                "edge_veda_thermal_level",
                "Current thermal level (-1 unsupported, 0 nominal .. 3 critical)"
            )
            .expect("Failed to register thermal_level"),

            battery_drain_per_ten_min: register_gauge!(
                "edge_veda_battery_drain_percent_per_ten_minutes",
                "Current battery drain estimate"
            )
            .expect("Failed to register battery_drain"),

            memory_rss_mb: register_gauge!(
                "edge_veda_memory_rss_megabytes",
                "Most recent process memory footprint"
            )
            .expect("Failed to register memory_rss_mb"),

            memory_peak_rss_mb: register_gauge!(
                "edge_veda_memory_peak_rss_megabytes",
                "Peak process memory footprint this session"
            )
            .expect("Failed to register memory_peak_rss_mb"),

            latency_p95_ms: register_gauge!(
                "edge_veda_latency_p95_milliseconds",
                "p95 of the task latency window"
            )
            .expect("Failed to register latency_p95_ms"),

            dropped_frames: register_int_gauge!(
                "edge_veda_dropped_frames",
                "Frames replaced while the consumer was busy"
            )
            .expect("Failed to register dropped_frames"),
        }
    }
}

/// Runtime metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct RuntimeMetrics {
    _private: (),
}

impl Default for RuntimeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(RuntimeMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &RuntimeMetricsInner {
        GLOBAL_METRICS.get_or_init(RuntimeMetricsInner::new)
    }

    pub fn observe_task_latency(&self, duration_secs: f64) {
        self.inner().task_latency_seconds.observe(duration_secs);
    }

    pub fn inc_task_outcome(&self, status: TaskStatus) {
        self.inner()
            .task_outcomes
            .with_label_values(&[&status.to_string()])
            .inc();
    }

    pub fn inc_violation(&self, violation: &BudgetViolation) {
        self.inner()
            .budget_violations
            .with_label_values(&[violation.constraint.as_str()])
            .inc();
    }

    pub fn set_queue_depth(&self, depth: usize) {
        self.inner().queue_depth.set(depth as i64);
    }

    pub fn set_thermal_level(&self, level: i32) {
        self.inner().thermal_level.set(level as i64);
    }

    /// Unknown drain is exported as zero
    pub fn set_battery_drain(&self, drain: Option<f64>) {
        self.inner()
            .battery_drain_per_ten_min
            .set(drain.unwrap_or(0.0));
    }

    pub fn set_memory(&self, rss_mb: f64, peak_mb: f64) {
        self.inner().memory_rss_mb.set(rss_mb);
        self.inner().memory_peak_rss_mb.set(peak_mb);
    }

    pub fn set_latency_p95(&self, p95_ms: f64) {
        self.inner().latency_p95_ms.set(p95_ms);
    }

    pub fn set_dropped_frames(&self, dropped: u64) {
        self.inner().dropped_frames.set(dropped as i64);
    }
}

/// Structured logger for budget-core events
///
/// Provides consistent field names for scheduling, calibration and
/// violation events so they can be filtered in JSON logs.
#[derive(Clone)]
pub struct StructuredLogger {
    device: String,
}

impl StructuredLogger {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn log_task_admitted(&self, id: TaskId, priority: TaskPriority, workload: Workload) {
        debug!(
            event = "task_admitted",
            device = %self.device,
            task_id = %id,
            priority = %priority,
            workload = %workload,
            "Task admitted"
        );
    }

    pub fn log_task_finished(&self, id: TaskId, status: TaskStatus, duration_ms: Option<f64>) {
        match status {
            TaskStatus::Failed => {
                warn!(
                    event = "task_failed",
                    device = %self.device,
                    task_id = %id,
                    status = %status,
                    duration_ms = ?duration_ms,
                    "Task body failed"
                );
            }
            _ => {
                debug!(
                    event = if status == TaskStatus::Cancelled {
                        "task_cancelled"
                    } else {
                        "task_completed"
                    },
                    device = %self.device,
                    task_id = %id,
                    status = %status,
                    duration_ms = ?duration_ms,
                    "Task finished"
                );
            }
        }
    }

    pub fn log_calibration(
        &self,
        baseline: &MeasuredBaseline,
        profile: Option<BudgetProfile>,
        resolved: Option<&BudgetLimits>,
    ) {
        info!(
            event = "calibration_completed",
            device = %self.device,
            measured_p95_ms = baseline.measured_p95_ms,
            measured_drain = ?baseline.measured_drain_per_ten_min,
            thermal_state = baseline.current_thermal_state,
            rss_mb = baseline.current_rss_mb,
            sample_count = baseline.sample_count,
            profile = ?profile,
            resolved_p95_ms = ?resolved.and_then(|l| l.p95_latency_ms),
            resolved_drain = ?resolved.and_then(|l| l.battery_drain_per_ten_minutes),
            resolved_thermal = ?resolved.and_then(|l| l.max_thermal_level),
            "Warm-up complete, baseline measured"
        );
    }

    pub fn log_violation(&self, violation: &BudgetViolation) {
        warn!(
            event = "budget_violation",
            device = %self.device,
            constraint = %violation.constraint,
            current_value = violation.current_value,
            budget_value = violation.budget_value,
            mitigated = violation.mitigated,
            observe_only = violation.observe_only,
            mitigation = %violation.mitigation,
            "Budget violated"
        );
    }

    pub fn log_budget_warnings(&self, warnings: &[String]) {
        for warning in warnings {
            warn!(
                event = "budget_warning",
                device = %self.device,
                warning = %warning,
                "Budget value looks unrealistic"
            );
        }
    }

    pub fn log_session_started(&self, version: &str, thermal: bool, battery: bool, memory: bool) {
        info!(
            event = "session_started",
            device = %self.device,
            version = %version,
            thermal_supported = thermal,
            battery_supported = battery,
            memory_supported = memory,
            "Budget session started"
        );
    }

    pub fn log_session_stopped(&self, reason: &str) {
        info!(
            event = "session_stopped",
            device = %self.device,
            reason = %reason,
            "Budget session stopped"
        );
    }
}
