//! Telemetry trackers
//!
//! Each tracker owns its sample buffer behind an internal mutex, so they can
//! be shared by `Arc` between the scheduler, a policy enforcer and any UI
//! surface without external synchronisation:
//! - Latency: sliding window of task durations with percentiles
//! - Thermal: four-level pressure scale with change listeners
//! - Battery: rolling drain rate over a ten-minute window
//! - Memory: process footprint with current, peak and average

mod battery;
mod latency;
mod resource;
mod thermal;

pub use battery::{
    drain_between, BatteryConfig, BatteryDrainTracker, BatterySample,
    DEFAULT_BATTERY_MAX_SAMPLES, DEFAULT_BATTERY_SAMPLE_INTERVAL, DEFAULT_BATTERY_WINDOW,
};
pub use latency::{LatencyTracker, DEFAULT_LATENCY_WINDOW};
pub use resource::{
    MemoryPressure, ResourceMonitor, DEFAULT_MEMORY_WINDOW, DEFAULT_PRESSURE_THRESHOLD,
};
pub use thermal::{
    level_from_raw_status, ThermalChange, ThermalMonitor, DEFAULT_THERMAL_POLL_INTERVAL,
    THERMAL_CRITICAL, THERMAL_FAIR, THERMAL_NOMINAL, THERMAL_SERIOUS, THERMAL_UNSUPPORTED,
};

use std::sync::Arc;

/// The four telemetry trackers of one session, shared by reference
#[derive(Clone)]
pub struct Trackers {
    pub latency: Arc<LatencyTracker>,
    pub thermal: Arc<ThermalMonitor>,
    pub battery: Arc<BatteryDrainTracker>,
    pub memory: Arc<ResourceMonitor>,
}

impl Default for Trackers {
    /// Default latency window, every platform capability unsupported
    fn default() -> Self {
        Self {
            latency: Arc::new(LatencyTracker::default()),
            thermal: Arc::new(ThermalMonitor::unsupported()),
            battery: Arc::new(BatteryDrainTracker::unsupported()),
            memory: Arc::new(ResourceMonitor::unsupported()),
        }
    }
}

impl Trackers {
    /// Stop all background loops and release listeners
    pub fn destroy(&self) {
        self.thermal.destroy();
        self.battery.destroy();
        self.memory.destroy();
    }
}
