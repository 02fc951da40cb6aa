//! Session lifecycle
//!
//! A session owns the trackers and scheduler for one run of the SDK:
//! built from configuration and platform probes, started once, and torn
//! down with [`EdgeVedaSession::shutdown`].

use crate::budget::{EdgeVedaBudget, MeasuredBaseline};
use crate::config::EdgeVedaConfig;
use crate::frame_queue::FrameQueue;
use crate::listeners::ListenerId;
use crate::models::QueueStatus;
use crate::observability::{RuntimeMetrics, StructuredLogger};
use crate::probe::PlatformProbes;
use crate::scheduler::Scheduler;
use crate::tracker::{
    BatteryDrainTracker, LatencyTracker, ResourceMonitor, ThermalMonitor, Trackers,
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencySnapshot {
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub average_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub sample_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThermalSnapshot {
    pub supported: bool,
    pub level: i32,
    pub should_throttle: bool,
    pub is_critical: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatterySnapshot {
    pub supported: bool,
    pub level: Option<f64>,
    pub current_drain_per_ten_min: Option<f64>,
    pub average_drain_per_ten_min: Option<f64>,
    pub sample_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemorySnapshot {
    pub supported: bool,
    pub last_rss_mb: f64,
    pub peak_rss_mb: f64,
    pub average_rss_mb: f64,
    pub limit_mb: Option<u64>,
    /// `-1.0` without a limit
    pub usage_percentage: f64,
    pub under_pressure: bool,
}

/// Everything a telemetry surface needs, read in one pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    pub device: String,
    pub taken_at: DateTime<Utc>,
    pub latency: LatencySnapshot,
    pub thermal: ThermalSnapshot,
    pub battery: BatterySnapshot,
    pub memory: MemorySnapshot,
    pub queue: QueueStatus,
    pub dropped_frames: u64,
    pub warmup_complete: bool,
    pub baseline: Option<MeasuredBaseline>,
    pub budget: Option<EdgeVedaBudget>,
    pub working_budget: Option<EdgeVedaBudget>,
}

pub struct EdgeVedaSession {
    config: EdgeVedaConfig,
    trackers: Trackers,
    scheduler: Arc<Scheduler>,
    frames: Arc<FrameQueue>,
    metrics: RuntimeMetrics,
    logger: StructuredLogger,
    thermal_listener: ListenerId,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl EdgeVedaSession {
    /// Build trackers and scheduler; nothing runs until [`start`](Self::start)
    pub fn new(config: EdgeVedaConfig, probes: PlatformProbes) -> Result<Self> {
        config.validate()?;

        let thermal = match probes.thermal {
            None if config.thermal.push_updates => ThermalMonitor::observed(),
            probe => ThermalMonitor::new(probe, config.thermal_poll_interval()),
        };
        let trackers = Trackers {
            latency: Arc::new(LatencyTracker::new(config.scheduler.latency_window)),
            thermal: Arc::new(thermal),
            battery: Arc::new(BatteryDrainTracker::new(
                probes.battery,
                config.battery_config(),
            )),
            memory: Arc::new(ResourceMonitor::new(probes.memory, config.memory.window)),
        };
        trackers.memory.set_limit_mb(config.memory.limit_mb);
        trackers
            .memory
            .set_pressure_threshold(config.memory.pressure_threshold);

        let logger = StructuredLogger::new(config.device.clone());
        let metrics = RuntimeMetrics::new();
        let scheduler = Arc::new(Scheduler::with_logger(
            config.scheduler_config(),
            trackers.clone(),
            logger.clone(),
        ));
        if let Some(budget) = config.budget.to_budget()? {
            scheduler.set_compute_budget(budget);
        }

        metrics.set_thermal_level(trackers.thermal.current_level());
        let gauge = metrics.clone();
        let thermal_listener = trackers
            .thermal
            .add_listener(move |change| gauge.set_thermal_level(change.current));

        Ok(Self {
            config,
            trackers,
            scheduler,
            frames: Arc::new(FrameQueue::new()),
            metrics,
            logger,
            thermal_listener,
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        })
    }

    /// Start the background sampling loops. Must run inside a Tokio runtime.
    pub fn start(&self) {
        if self.stopped.load(Ordering::SeqCst) || self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        self.trackers.thermal.start();
        self.trackers.battery.start();
        if let Some(interval) = self.config.memory_sample_interval() {
            self.trackers.memory.start(interval);
        }

        self.logger.log_session_started(
            env!("CARGO_PKG_VERSION"),
            self.trackers.thermal.is_supported(),
            self.trackers.battery.is_supported(),
            self.trackers.memory.is_supported(),
        );
    }

    pub fn config(&self) -> &EdgeVedaConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn trackers(&self) -> &Trackers {
        &self.trackers
    }

    /// Backpressure buffer for the vision workload
    pub fn frame_queue(&self) -> &Arc<FrameQueue> {
        &self.frames
    }

    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst) && !self.stopped.load(Ordering::SeqCst)
    }

    /// Read every tracker once and refresh the exported gauges
    pub fn snapshot(&self) -> TelemetrySnapshot {
        let latency = &self.trackers.latency;
        let thermal = &self.trackers.thermal;
        let battery = &self.trackers.battery;
        let memory = &self.trackers.memory;

        let snapshot = TelemetrySnapshot {
            device: self.config.device.clone(),
            taken_at: Utc::now(),
            latency: LatencySnapshot {
                p50_ms: latency.p50(),
                p95_ms: latency.p95(),
                p99_ms: latency.p99(),
                average_ms: latency.average(),
                min_ms: latency.min(),
                max_ms: latency.max(),
                sample_count: latency.sample_count(),
            },
            thermal: ThermalSnapshot {
                supported: thermal.is_supported(),
                level: thermal.current_level(),
                should_throttle: thermal.should_throttle(),
                is_critical: thermal.is_critical(),
            },
            battery: BatterySnapshot {
                supported: battery.is_supported(),
                level: battery.current_level(),
                current_drain_per_ten_min: battery.current_drain_rate(),
                average_drain_per_ten_min: battery.average_drain_rate(),
                sample_count: battery.sample_count(),
            },
            memory: MemorySnapshot {
                supported: memory.is_supported(),
                last_rss_mb: memory.last_rss_mb(),
                peak_rss_mb: memory.peak_rss_mb(),
                average_rss_mb: memory.average_rss_mb(),
                limit_mb: memory.limit_mb(),
                usage_percentage: memory.usage_percentage(),
                under_pressure: memory.is_under_pressure(),
            },
            queue: self.scheduler.queue_status(),
            dropped_frames: self.frames.dropped_frames(),
            warmup_complete: self.scheduler.is_warmup_complete(),
            baseline: self.scheduler.measured_baseline(),
            budget: self.scheduler.compute_budget(),
            working_budget: self.scheduler.working_budget(),
        };

        self.metrics.set_latency_p95(snapshot.latency.p95_ms);
        self.metrics.set_thermal_level(snapshot.thermal.level);
        self.metrics
            .set_battery_drain(snapshot.battery.current_drain_per_ten_min);
        self.metrics
            .set_memory(snapshot.memory.last_rss_mb, snapshot.memory.peak_rss_mb);
        self.metrics.set_queue_depth(snapshot.queue.queued);
        self.metrics.set_dropped_frames(snapshot.dropped_frames);

        snapshot
    }

    /// Stop all loops and release listeners. Idempotent.
    pub fn shutdown(&self, reason: &str) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.trackers.thermal.remove_listener(self.thermal_listener);
        self.trackers.destroy();
        self.frames.reset();
        self.logger.log_session_stopped(reason);
    }
}

impl Drop for EdgeVedaSession {
    fn drop(&mut self) {
        self.shutdown("dropped");
    }
}
