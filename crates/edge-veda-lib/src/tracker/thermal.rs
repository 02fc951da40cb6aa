//! Thermal pressure monitoring
//!
//! Folds platform thermal status codes into a four-level scale and notifies
//! registered listeners on every level transition. The level is driven
//! either by a polling observer over a [`ThermalProbe`] or by platform glue
//! pushing status changes through [`ThermalMonitor::observe_status`].

use crate::listeners::{dispatch, Listener, ListenerId, ListenerRegistry};
use crate::probe::ThermalProbe;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, info, warn};

/// Level reported when no thermal API exists
pub const THERMAL_UNSUPPORTED: i32 = -1;
pub const THERMAL_NOMINAL: i32 = 0;
pub const THERMAL_FAIR: i32 = 1;
pub const THERMAL_SERIOUS: i32 = 2;
pub const THERMAL_CRITICAL: i32 = 3;

/// Default observer poll interval
pub const DEFAULT_THERMAL_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Map a raw platform status onto the four-level scale.
///
/// Monotonic; anything at or above 3 collapses to critical and negative
/// codes are treated as nominal.
pub fn level_from_raw_status(raw: i32) -> i32 {
    raw.clamp(THERMAL_NOMINAL, THERMAL_CRITICAL)
}

/// A single observed level transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ThermalChange {
    pub previous: i32,
    pub current: i32,
}

struct ThermalState {
    level: i32,
    listeners: ListenerRegistry<ThermalChange>,
    shutdown: Option<broadcast::Sender<()>>,
    destroyed: bool,
}

/// Tracks the device thermal level
pub struct ThermalMonitor {
    probe: Option<Arc<dyn ThermalProbe>>,
    supported: bool,
    poll_interval: Duration,
    state: Mutex<ThermalState>,
}

impl ThermalMonitor {
    pub fn new(probe: Option<Arc<dyn ThermalProbe>>, poll_interval: Duration) -> Self {
        let supported = probe.is_some();
        Self::build(probe, supported, poll_interval)
    }

    /// Monitor driven only by platform callbacks through
    /// [`observe_status`](Self::observe_status); nothing is polled.
    pub fn observed() -> Self {
        Self::build(None, true, DEFAULT_THERMAL_POLL_INTERVAL)
    }

    fn build(
        probe: Option<Arc<dyn ThermalProbe>>,
        supported: bool,
        poll_interval: Duration,
    ) -> Self {
        let level = if supported {
            THERMAL_NOMINAL
        } else {
            THERMAL_UNSUPPORTED
        };
        Self {
            probe,
            supported,
            poll_interval,
            state: Mutex::new(ThermalState {
                level,
                listeners: ListenerRegistry::new(),
                shutdown: None,
                destroyed: false,
            }),
        }
    }

    /// Monitor for a device without any thermal API
    pub fn unsupported() -> Self {
        Self::new(None, DEFAULT_THERMAL_POLL_INTERVAL)
    }

    fn lock(&self) -> MutexGuard<'_, ThermalState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_supported(&self) -> bool {
        self.supported
    }

    /// Whether a background observer has something to poll
    pub fn is_pollable(&self) -> bool {
        self.probe.is_some()
    }

    /// Current level in `{-1, 0, 1, 2, 3}`
    pub fn current_level(&self) -> i32 {
        self.lock().level
    }

    pub fn should_throttle(&self) -> bool {
        self.current_level() >= THERMAL_SERIOUS
    }

    pub fn is_critical(&self) -> bool {
        self.current_level() >= THERMAL_CRITICAL
    }

    /// Register a listener invoked on every level transition
    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ThermalChange) + Send + Sync + 'static,
    {
        let listener: Listener<ThermalChange> = Arc::new(listener);
        self.lock().listeners.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.lock().listeners.remove(id)
    }

    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    /// Feed a raw platform status into the monitor.
    ///
    /// Returns the transition when the level changed. Ignored when the
    /// device is unsupported or the monitor was destroyed.
    pub fn observe_status(&self, raw: i32) -> Option<ThermalChange> {
        let (change, listeners) = {
            let mut state = self.lock();
            if state.destroyed || !self.supported {
                return None;
            }
            let level = level_from_raw_status(raw);
            if level == state.level {
                return None;
            }
            let change = ThermalChange {
                previous: state.level,
                current: level,
            };
            state.level = level;
            (change, state.listeners.snapshot())
        };

        if change.current >= THERMAL_SERIOUS {
            warn!(
                event = "thermal_transition",
                previous = change.previous,
                current = change.current,
                "Thermal pressure elevated"
            );
        } else {
            info!(
                event = "thermal_transition",
                previous = change.previous,
                current = change.current,
                "Thermal level changed"
            );
        }

        dispatch(&listeners, &change, "thermal");
        Some(change)
    }

    /// Read the probe once and apply the result
    pub async fn poll_once(&self) -> Option<ThermalChange> {
        let probe = self.probe.as_ref()?;
        match probe.read_status().await {
            Ok(raw) => self.observe_status(raw),
            Err(e) => {
                debug!(error = %e, "Thermal probe read failed, keeping last level");
                None
            }
        }
    }

    /// Start the background observer. No-op without a probe, when destroyed
    /// or when already running.
    pub fn start(self: &Arc<Self>) {
        let shutdown = {
            let mut state = self.lock();
            if state.destroyed || state.shutdown.is_some() || self.probe.is_none() {
                return;
            }
            let (tx, rx) = broadcast::channel(1);
            state.shutdown = Some(tx);
            rx
        };

        let monitor = Arc::clone(self);
        tokio::spawn(async move { monitor.run(shutdown).await });
    }

    async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_ms = self.poll_interval.as_millis() as u64,
            "Starting thermal observer"
        );
        let mut ticker = interval(self.poll_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.poll_once().await;
                }
                _ = shutdown.recv() => {
                    debug!("Stopping thermal observer");
                    break;
                }
            }
        }
    }

    /// Stop the observer and drop all listeners. Idempotent.
    pub fn destroy(&self) {
        let mut state = self.lock();
        if state.destroyed {
            return;
        }
        state.destroyed = true;
        if let Some(tx) = state.shutdown.take() {
            let _ = tx.send(());
        }
        state.listeners.clear();
    }

    pub fn is_destroyed(&self) -> bool {
        self.lock().destroyed
    }
}
