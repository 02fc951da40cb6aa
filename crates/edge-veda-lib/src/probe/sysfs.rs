//! Thermal and battery probes backed by sysfs
//!
//! - `class/thermal/thermal_zone0/temp` reports millidegrees Celsius
//! - `class/power_supply/<name>/capacity` reports charge percent for
//!   supplies whose `type` is `Battery`

use super::{BatteryProbe, ThermalProbe};
use crate::error::ProbeError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Thermal zone relative to the sysfs root
pub const DEFAULT_THERMAL_ZONE: &str = "class/thermal/thermal_zone0/temp";

/// Power supply class directory relative to the sysfs root
pub const DEFAULT_POWER_SUPPLY_ROOT: &str = "class/power_supply";

/// Temperature steps (millidegrees) for raw statuses 1..=5
const STATUS_THRESHOLDS_MC: [i64; 5] = [60_000, 70_000, 80_000, 85_000, 95_000];

/// Map a temperature to a raw thermal status code.
///
/// The codes mirror the mobile status scale: 0 none, 1 light, 2 moderate,
/// 3 severe, 4 critical, 5 emergency.
pub fn status_from_millidegrees(millidegrees: i64) -> i32 {
    STATUS_THRESHOLDS_MC
        .iter()
        .take_while(|threshold| millidegrees >= **threshold)
        .count() as i32
}

async fn read_trimmed(path: &Path) -> Result<String, ProbeError> {
    if fs::metadata(path).await.is_err() {
        return Err(ProbeError::NotAvailable {
            path: path.to_path_buf(),
        });
    }
    fs::read_to_string(path)
        .await
        .map(|s| s.trim().to_string())
        .map_err(|source| ProbeError::Read {
            path: path.to_path_buf(),
            source,
        })
}

/// Thermal probe for one sysfs thermal zone
pub struct SysfsThermalProbe {
    temp_path: PathBuf,
}

impl SysfsThermalProbe {
    pub fn new(temp_path: impl Into<PathBuf>) -> Self {
        Self {
            temp_path: temp_path.into(),
        }
    }

    pub async fn is_available(&self) -> bool {
        fs::metadata(&self.temp_path).await.is_ok()
    }

    pub async fn read_millidegrees(&self) -> Result<i64> {
        let content = read_trimmed(&self.temp_path).await?;
        let value = content.parse::<i64>().map_err(|_| ProbeError::Parse {
            path: self.temp_path.clone(),
            detail: format!("expected integer millidegrees, got '{content}'"),
        })?;
        Ok(value)
    }
}

#[async_trait]
impl ThermalProbe for SysfsThermalProbe {
    async fn read_status(&self) -> Result<i32> {
        Ok(status_from_millidegrees(self.read_millidegrees().await?))
    }
}

/// Battery probe for the first power supply that reports itself as a battery
pub struct SysfsBatteryProbe {
    capacity_path: PathBuf,
}

impl SysfsBatteryProbe {
    pub fn new(capacity_path: impl Into<PathBuf>) -> Self {
        Self {
            capacity_path: capacity_path.into(),
        }
    }

    /// Scan the power supply directory for a battery with a capacity file
    pub async fn discover(power_supply_root: &Path) -> Option<Self> {
        let mut entries = fs::read_dir(power_supply_root).await.ok()?;
        let mut candidates = Vec::new();

        while let Ok(Some(entry)) = entries.next_entry().await {
            let supply = entry.path();
            let kind = match read_trimmed(&supply.join("type")).await {
                Ok(kind) => kind,
                Err(_) => continue,
            };
            if kind == "Battery" && fs::metadata(supply.join("capacity")).await.is_ok() {
                candidates.push(supply.join("capacity"));
            }
        }

        // read_dir order is unspecified; pick deterministically (BAT0 before BAT1)
        candidates.sort();
        candidates.into_iter().next().map(Self::new)
    }

    pub fn capacity_path(&self) -> &Path {
        &self.capacity_path
    }
}

#[async_trait]
impl BatteryProbe for SysfsBatteryProbe {
    async fn read_level(&self) -> Result<f64> {
        let content = read_trimmed(&self.capacity_path).await?;
        let percent: f64 = content
            .parse()
            .with_context(|| format!("Failed to parse battery capacity '{content}'"))?;
        Ok((percent / 100.0).clamp(0.0, 1.0))
    }
}
