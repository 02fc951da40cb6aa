//! Health reporting for a budget session
//!
//! Each tracker and the scheduler is a component. Missing platform
//! capabilities leave a component degraded rather than failed, since the
//! core keeps working with unknown readings.

use crate::tracker::{Trackers, THERMAL_CRITICAL};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Health status of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Working with reduced telemetry or under pressure
    Degraded,
    Unhealthy,
}

impl ComponentStatus {
    /// Returns true if the component is at least partially operational
    pub fn is_operational(&self) -> bool {
        matches!(self, ComponentStatus::Healthy | ComponentStatus::Degraded)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    pub fn healthy() -> Self {
        Self::with_status(ComponentStatus::Healthy, None)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::with_status(ComponentStatus::Degraded, Some(message.into()))
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::with_status(ComponentStatus::Unhealthy, Some(message.into()))
    }

    fn with_status(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// Overall health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: HashMap<String, ComponentHealth>,
}

impl HealthResponse {
    /// Worst status across all components
    pub fn compute_status(components: &HashMap<String, ComponentHealth>) -> ComponentStatus {
        let mut has_degraded = false;

        for health in components.values() {
            match health.status {
                ComponentStatus::Unhealthy => return ComponentStatus::Unhealthy,
                ComponentStatus::Degraded => has_degraded = true,
                ComponentStatus::Healthy => {}
            }
        }

        if has_degraded {
            ComponentStatus::Degraded
        } else {
            ComponentStatus::Healthy
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Component names for health tracking
pub mod components {
    pub const LATENCY: &str = "latency";
    pub const THERMAL: &str = "thermal";
    pub const BATTERY: &str = "battery";
    pub const MEMORY: &str = "memory";
    pub const SCHEDULER: &str = "scheduler";
}

/// Derive per-component health from the current tracker state
pub fn assess_trackers(trackers: &Trackers) -> Vec<(&'static str, ComponentHealth)> {
    let thermal = if !trackers.thermal.is_supported() {
        ComponentHealth::degraded("thermal API unavailable")
    } else if trackers.thermal.current_level() >= THERMAL_CRITICAL {
        ComponentHealth::degraded("device thermal state is critical")
    } else {
        ComponentHealth::healthy()
    };

    let battery = if trackers.battery.is_supported() {
        ComponentHealth::healthy()
    } else {
        ComponentHealth::degraded("battery API unavailable")
    };

    let memory = if !trackers.memory.is_supported() {
        ComponentHealth::degraded("memory footprint API unavailable")
    } else if trackers.memory.is_under_pressure() {
        ComponentHealth::degraded("memory usage above pressure threshold")
    } else {
        ComponentHealth::healthy()
    };

    vec![
        (components::LATENCY, ComponentHealth::healthy()),
        (components::THERMAL, thermal),
        (components::BATTERY, battery),
        (components::MEMORY, memory),
    ]
}

/// Health registry for tracking component health
#[derive(Debug, Clone)]
pub struct HealthRegistry {
    components: Arc<RwLock<HashMap<String, ComponentHealth>>>,
    ready: Arc<RwLock<bool>>,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self {
            components: Arc::new(RwLock::new(HashMap::new())),
            ready: Arc::new(RwLock::new(false)),
        }
    }

    /// Register a component with initial healthy status
    pub async fn register(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    pub async fn update(&self, name: &str, health: ComponentHealth) {
        let mut components = self.components.write().await;
        components.insert(name.to_string(), health);
    }

    pub async fn set_healthy(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::degraded(message)).await;
    }

    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::unhealthy(message)).await;
    }

    /// Replace tracker component health with a fresh assessment
    pub async fn refresh_trackers(&self, trackers: &Trackers) {
        let assessed = assess_trackers(trackers);
        let mut components = self.components.write().await;
        for (name, health) in assessed {
            components.insert(name.to_string(), health);
        }
    }

    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    pub async fn health(&self) -> HealthResponse {
        let components = self.components.read().await.clone();
        let status = HealthResponse::compute_status(&components);
        HealthResponse { status, components }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        let ready = *self.ready.read().await;
        let health = self.health().await;

        if !ready {
            ReadinessResponse {
                ready: false,
                reason: Some("Session not yet started".to_string()),
            }
        } else if health.status == ComponentStatus::Unhealthy {
            ReadinessResponse {
                ready: false,
                reason: Some("Critical component unhealthy".to_string()),
            }
        } else {
            ReadinessResponse {
                ready: true,
                reason: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{async_trait, MemoryFootprint, MemoryProbe, ThermalProbe, BYTES_PER_MB};
    use crate::tracker::{ResourceMonitor, ThermalMonitor};
    use std::time::Duration;

    struct Hot;

    struct Bloated;

    #[async_trait]
    impl MemoryProbe for Bloated {
        async fn read_footprint(&self) -> anyhow::Result<MemoryFootprint> {
            Ok(MemoryFootprint {
                managed_heap_bytes: 0,
                native_heap_bytes: 1900 * BYTES_PER_MB as u64,
            })
        }
    }

    #[async_trait]
    impl ThermalProbe for Hot {
        async fn read_status(&self) -> anyhow::Result<i32> {
            Ok(4)
        }
    }

    #[tokio::test]
    async fn test_health_registry_initial_state() {
        let registry = HealthRegistry::new();
        let health = registry.health().await;

        assert_eq!(health.status, ComponentStatus::Healthy);
        assert!(health.components.is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_trackers_are_degraded() {
        let registry = HealthRegistry::new();
        registry.register(components::SCHEDULER).await;
        registry.refresh_trackers(&Trackers::default()).await;

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Degraded);
        assert_eq!(health.components.len(), 5);
        assert_eq!(
            health.components[components::LATENCY].status,
            ComponentStatus::Healthy
        );
        assert_eq!(
            health.components[components::BATTERY].status,
            ComponentStatus::Degraded
        );
        assert!(health.components[components::THERMAL]
            .message
            .as_deref()
            .unwrap()
            .contains("unavailable"));
    }

    #[tokio::test]
    async fn test_critical_thermal_is_degraded() {
        let trackers = Trackers {
            thermal: Arc::new(ThermalMonitor::new(
                Some(Arc::new(Hot)),
                Duration::from_secs(5),
            )),
            ..Trackers::default()
        };
        trackers.thermal.poll_once().await;

        let assessed = assess_trackers(&trackers);
        let (_, thermal) = assessed
            .iter()
            .find(|(name, _)| *name == components::THERMAL)
            .unwrap();
        assert_eq!(thermal.status, ComponentStatus::Degraded);
        assert!(thermal.message.as_deref().unwrap().contains("critical"));
    }

    #[tokio::test]
    async fn test_memory_pressure_is_degraded() {
        let trackers = Trackers {
            memory: Arc::new(ResourceMonitor::new(Some(Arc::new(Bloated)), 10)),
            ..Trackers::default()
        };
        trackers.memory.sample().await;

        let memory_status = |trackers: &Trackers| {
            assess_trackers(trackers)
                .into_iter()
                .find(|(name, _)| *name == components::MEMORY)
                .map(|(_, health)| health)
                .unwrap()
        };
        assert_eq!(memory_status(&trackers).status, ComponentStatus::Healthy);

        trackers.memory.set_limit_mb(Some(2000));
        let memory = memory_status(&trackers);
        assert_eq!(memory.status, ComponentStatus::Degraded);
        assert!(memory.message.as_deref().unwrap().contains("pressure"));
    }

    #[tokio::test]
    async fn test_readiness_not_ready_initially() {
        let registry = HealthRegistry::new();
        let readiness = registry.readiness().await;

        assert!(!readiness.ready);
        assert!(readiness.reason.is_some());
    }

    #[tokio::test]
    async fn test_readiness_ready_when_degraded() {
        let registry = HealthRegistry::new();
        registry.refresh_trackers(&Trackers::default()).await;
        registry.set_ready(true).await;

        assert!(registry.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_readiness_not_ready_when_unhealthy() {
        let registry = HealthRegistry::new();
        registry.register(components::SCHEDULER).await;
        registry.set_ready(true).await;
        registry
            .set_unhealthy(components::SCHEDULER, "Scheduler stopped")
            .await;

        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
    }
}
