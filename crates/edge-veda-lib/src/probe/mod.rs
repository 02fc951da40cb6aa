//! Platform telemetry probes
//!
//! The trackers never talk to the operating system directly. They are handed
//! optional probe implementations at construction; a missing probe means the
//! capability is unsupported on this device. Linux implementations read
//! procfs and sysfs, and the mobile platform glue supplies its own.

mod procfs;
mod sysfs;


pub use procfs::{parse_statm_resident_pages, ProcStatmProbe, DEFAULT_PAGE_SIZE};
pub use sysfs::{
    status_from_millidegrees, SysfsBatteryProbe, SysfsThermalProbe, DEFAULT_POWER_SUPPLY_ROOT,
    DEFAULT_THERMAL_ZONE,
};

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

pub use async_trait::async_trait;

/// Bytes per megabyte used for all footprint conversions
pub const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Source of raw thermal status codes.
///
/// Codes follow the platform's own scale (0 = none, increasing with
/// severity); the thermal monitor folds them into four levels.
#[async_trait]
pub trait ThermalProbe: Send + Sync {
    async fn read_status(&self) -> Result<i32>;
}

/// Source of the current battery charge as a fraction in `[0, 1]`
#[async_trait]
pub trait BatteryProbe: Send + Sync {
    async fn read_level(&self) -> Result<f64>;
}

/// Source of the process memory footprint
#[async_trait]
pub trait MemoryProbe: Send + Sync {
    async fn read_footprint(&self) -> Result<MemoryFootprint>;
}

/// Memory footprint split the way mobile runtimes report it
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MemoryFootprint {
    /// Managed (garbage-collected) heap currently in use
    pub managed_heap_bytes: u64,
    /// Native heap allocated outside the managed runtime
    pub native_heap_bytes: u64,
}

impl MemoryFootprint {
    pub fn total_mb(&self) -> f64 {
        (self.managed_heap_bytes + self.native_heap_bytes) as f64 / BYTES_PER_MB
    }
}

/// Probe set handed to a session; `None` marks an unsupported capability
#[derive(Clone, Default)]
pub struct PlatformProbes {
    pub thermal: Option<Arc<dyn ThermalProbe>>,
    pub battery: Option<Arc<dyn BatteryProbe>>,
    pub memory: Option<Arc<dyn MemoryProbe>>,
}

impl PlatformProbes {
    /// No telemetry at all; every tracker reports unsupported
    pub fn unsupported() -> Self {
        Self::default()
    }
}

/// Discover the Linux probes available under the given roots
pub async fn detect_linux_probes(proc_root: &Path, sys_root: &Path) -> PlatformProbes {
    let memory = ProcStatmProbe::new(proc_root.join("self/statm"));
    let memory: Option<Arc<dyn MemoryProbe>> = if memory.is_available().await {
        tracing::info!("Using /proc statm memory probe");
        Some(Arc::new(memory))
    } else {
        tracing::warn!("No procfs statm found, memory telemetry unsupported");
        None
    };

    let thermal = SysfsThermalProbe::new(sys_root.join(DEFAULT_THERMAL_ZONE));
    let thermal: Option<Arc<dyn ThermalProbe>> = if thermal.is_available().await {
        tracing::info!("Using sysfs thermal zone probe");
        Some(Arc::new(thermal))
    } else {
        tracing::warn!("No thermal zone found, thermal telemetry unsupported");
        None
    };

    let battery: Option<Arc<dyn BatteryProbe>> =
        match SysfsBatteryProbe::discover(&sys_root.join(DEFAULT_POWER_SUPPLY_ROOT)).await {
            Some(probe) => {
                tracing::info!(path = %probe.capacity_path().display(), "Using sysfs battery probe");
                Some(Arc::new(probe))
            }
            None => {
                tracing::warn!("No battery power supply found, battery telemetry unsupported");
                None
            }
        };

    PlatformProbes {
        thermal,
        battery,
        memory,
    }
}
