//! Budget enforcement core for on-device inference
//!
//! This crate provides:
//! - Telemetry trackers for latency, thermal state, battery drain and memory
//! - Declarative compute budgets, explicit or adaptive
//! - A priority scheduler that calibrates budgets and reports violations
//! - A single-slot frame queue for vision workloads
//! - Health checks, Prometheus metrics and structured logging

pub mod budget;
pub mod config;
pub mod error;
pub mod frame_queue;
pub mod health;
pub mod listeners;
pub mod models;
pub mod observability;
pub mod probe;
pub mod scheduler;
pub mod session;
pub mod tracker;

pub use budget::{
    BudgetConstraint, BudgetLimits, BudgetProfile, BudgetViolation, EdgeVedaBudget,
    MeasuredBaseline,
};
pub use config::EdgeVedaConfig;
pub use error::{ProbeError, TaskError};
pub use frame_queue::{FrameData, FrameQueue};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use listeners::ListenerId;
pub use models::*;
pub use observability::{RuntimeMetrics, StructuredLogger};
pub use probe::PlatformProbes;
pub use scheduler::{Scheduler, SchedulerConfig};
pub use session::{EdgeVedaSession, TelemetrySnapshot};
pub use tracker::Trackers;
