//! Edge Veda monitor
//!
//! Hosts a budget session on a Linux device or dev box, reading telemetry
//! from procfs/sysfs, and serves health, metrics and telemetry over HTTP.

use anyhow::{Context, Result};
use clap::Parser;
use edge_veda_lib::{
    budget::{BudgetProfile, EdgeVedaBudget},
    health::{components, HealthRegistry},
    probe::detect_linux_probes,
    EdgeVedaConfig, EdgeVedaSession, Scheduler, TaskPriority, Workload,
};
use edge_veda_monitor::api;
use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// How often health and budget status are re-evaluated
const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Edge Veda budget monitor
#[derive(Parser)]
#[command(name = "edge-veda-monitor")]
#[command(author, version, about = "Host the Edge Veda budget core with health and metrics endpoints", long_about = None)]
struct Cli {
    /// Configuration file (TOML, JSON or YAML)
    #[arg(long, env = "EDGE_VEDA_CONFIG")]
    config: Option<PathBuf>,

    /// API port, overrides the configured one
    #[arg(long)]
    port: Option<u16>,

    /// Adaptive budget profile, overrides the configured budget
    #[arg(long)]
    profile: Option<BudgetProfile>,

    /// Root of the proc filesystem
    #[arg(long, default_value = "/proc")]
    proc_root: PathBuf,

    /// Root of the sys filesystem
    #[arg(long, default_value = "/sys")]
    sys_root: PathBuf,

    /// Run a synthetic task of this many milliseconds every second
    #[arg(long)]
    synthetic_task_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let cli = Cli::parse();
    info!("Starting edge-veda-monitor");

    let mut config = EdgeVedaConfig::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    let port = config.server.port;
    info!(device = %config.device, port, "Monitor configured");

    let probes = detect_linux_probes(&cli.proc_root, &cli.sys_root).await;
    let session = Arc::new(
        EdgeVedaSession::new(config, probes).context("Failed to build budget session")?,
    );
    if let Some(profile) = cli.profile {
        session
            .scheduler()
            .set_compute_budget(EdgeVedaBudget::adaptive(profile));
    }
    session.start();

    let health_registry = HealthRegistry::new();
    health_registry.register(components::SCHEDULER).await;
    health_registry.refresh_trackers(session.trackers()).await;

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    tokio::spawn(watch_budget(
        session.clone(),
        health_registry.clone(),
        shutdown_tx.subscribe(),
    ));
    if let Some(millis) = cli.synthetic_task_ms {
        tokio::spawn(synthetic_load(
            session.scheduler().clone(),
            Duration::from_millis(millis),
            shutdown_tx.subscribe(),
        ));
    }

    let app_state = Arc::new(api::AppState::new(health_registry.clone(), session.clone()));
    health_registry.set_ready(true).await;

    let mut server_shutdown = shutdown_tx.subscribe();
    let api_handle = tokio::spawn(api::serve(port, app_state, async move {
        let _ = server_shutdown.recv().await;
    }));

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    health_registry.set_ready(false).await;
    let _ = shutdown_tx.send(());
    session.shutdown("SIGINT received");

    api_handle.await??;
    Ok(())
}

/// Periodically refresh component health and re-check the budget
async fn watch_budget(
    session: Arc<EdgeVedaSession>,
    health_registry: HealthRegistry,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = interval(HEALTH_CHECK_INTERVAL);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                health_registry.refresh_trackers(session.trackers()).await;
                let violations = session.scheduler().check_budget_constraints().await;
                if violations.is_empty() {
                    health_registry.set_healthy(components::SCHEDULER).await;
                } else {
                    let breached: Vec<&str> =
                        violations.iter().map(|v| v.constraint.as_str()).collect();
                    health_registry
                        .set_degraded(
                            components::SCHEDULER,
                            format!("over budget: {}", breached.join(", ")),
                        )
                        .await;
                }
                session.snapshot();
            }
            _ = shutdown.recv() => {
                debug!("Stopping budget watch");
                break;
            }
        }
    }
}

/// Keep the scheduler busy so calibration and budget checks can be observed
async fn synthetic_load(
    scheduler: Arc<Scheduler>,
    duration: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    info!(
        duration_ms = duration.as_millis() as u64,
        "Starting synthetic load"
    );
    let mut ticker = interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let _ = scheduler
                    .schedule_task(TaskPriority::Low, Workload::Text, || async move {
                        tokio::time::sleep(duration).await;
                        Ok::<_, Infallible>(())
                    })
                    .await;
            }
            _ = shutdown.recv() => {
                debug!("Stopping synthetic load");
                break;
            }
        }
    }
}
