//! Process memory footprint tracking
//!
//! Every reading is appended to a bounded window. The peak is kept
//! separately so it survives window eviction until an explicit reset.
//!
//! With a limit set, each fresh reading at or above the pressure threshold
//! (a fraction of the limit) is reported to the pressure listeners.

use crate::listeners::{dispatch, Listener, ListenerId, ListenerRegistry};
use crate::probe::MemoryProbe;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, info, warn};

/// Default number of readings retained
pub const DEFAULT_MEMORY_WINDOW: usize = 100;

/// Fraction of the limit at which pressure is reported
pub const DEFAULT_PRESSURE_THRESHOLD: f64 = 0.9;

/// A reading at or above the pressure threshold
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MemoryPressure {
    pub current_mb: f64,
    pub limit_mb: u64,
    /// `current_mb / limit_mb`
    pub usage_ratio: f64,
}

struct ResourceState {
    samples: VecDeque<f64>,
    peak_mb: f64,
    limit_mb: Option<u64>,
    pressure_threshold: f64,
    pressure_listeners: ListenerRegistry<MemoryPressure>,
    shutdown: Option<broadcast::Sender<()>>,
    destroyed: bool,
}

/// Memory footprint monitor
pub struct ResourceMonitor {
    probe: Option<Arc<dyn MemoryProbe>>,
    window_size: usize,
    state: Mutex<ResourceState>,
}

impl ResourceMonitor {
    pub fn new(probe: Option<Arc<dyn MemoryProbe>>, window_size: usize) -> Self {
        let window_size = window_size.max(1);
        Self {
            probe,
            window_size,
            state: Mutex::new(ResourceState {
                samples: VecDeque::with_capacity(window_size),
                peak_mb: 0.0,
                limit_mb: None,
                pressure_threshold: DEFAULT_PRESSURE_THRESHOLD,
                pressure_listeners: ListenerRegistry::new(),
                shutdown: None,
                destroyed: false,
            }),
        }
    }

    pub fn unsupported() -> Self {
        Self::new(None, DEFAULT_MEMORY_WINDOW)
    }

    fn lock(&self) -> MutexGuard<'_, ResourceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_supported(&self) -> bool {
        self.probe.is_some()
    }

    /// Append an externally obtained reading
    pub fn record_mb(&self, rss_mb: f64) {
        let mut state = self.lock();
        while state.samples.len() >= self.window_size {
            state.samples.pop_front();
        }
        state.samples.push_back(rss_mb);
        if rss_mb > state.peak_mb {
            state.peak_mb = rss_mb;
        }
    }

    /// Limit used for pressure detection; `None` or zero disables it
    pub fn set_limit_mb(&self, limit_mb: Option<u64>) {
        self.lock().limit_mb = limit_mb.filter(|limit| *limit > 0);
    }

    pub fn limit_mb(&self) -> Option<u64> {
        self.lock().limit_mb
    }

    /// Fraction of the limit that counts as pressure, clamped to `[0, 1]`
    pub fn set_pressure_threshold(&self, threshold: f64) {
        let threshold = if threshold.is_nan() {
            DEFAULT_PRESSURE_THRESHOLD
        } else {
            threshold.clamp(0.0, 1.0)
        };
        self.lock().pressure_threshold = threshold;
    }

    pub fn pressure_threshold(&self) -> f64 {
        self.lock().pressure_threshold
    }

    /// Register a listener invoked for every reading under pressure
    pub fn on_pressure<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&MemoryPressure) + Send + Sync + 'static,
    {
        let listener: Listener<MemoryPressure> = Arc::new(listener);
        self.lock().pressure_listeners.add(listener)
    }

    pub fn remove_pressure_listener(&self, id: ListenerId) -> bool {
        self.lock().pressure_listeners.remove(id)
    }

    pub fn pressure_listener_count(&self) -> usize {
        self.lock().pressure_listeners.len()
    }

    /// Last reading as a percentage of the limit, `-1.0` without a limit
    pub fn usage_percentage(&self) -> f64 {
        let state = self.lock();
        match state.limit_mb {
            Some(limit) => state.samples.back().copied().unwrap_or(0.0) / limit as f64 * 100.0,
            None => -1.0,
        }
    }

    pub fn is_under_pressure(&self) -> bool {
        let state = self.lock();
        let last = state.samples.back().copied().unwrap_or(0.0);
        pressure_of(&state, last).is_some()
    }

    /// Take a fresh reading and record it. Probe failure yields `0.0`.
    ///
    /// Notifies the pressure listeners when the reading crosses the
    /// threshold.
    pub async fn sample(&self) -> f64 {
        let reading = match &self.probe {
            Some(probe) => match probe.read_footprint().await {
                Ok(footprint) => footprint.total_mb(),
                Err(e) => {
                    debug!(error = %e, "Memory probe read failed");
                    0.0
                }
            },
            None => 0.0,
        };
        self.record_mb(reading);

        let (pressure, listeners) = {
            let state = self.lock();
            if state.destroyed {
                return reading;
            }
            match pressure_of(&state, reading) {
                Some(pressure) => (pressure, state.pressure_listeners.snapshot()),
                None => return reading,
            }
        };

        warn!(
            event = "memory_pressure",
            current_mb = pressure.current_mb,
            limit_mb = pressure.limit_mb,
            usage_percent = pressure.usage_ratio * 100.0,
            "Memory usage above pressure threshold"
        );
        dispatch(&listeners, &pressure, "memory_pressure");
        reading
    }

    /// Alias for [`sample`](Self::sample)
    pub async fn current_rss_mb(&self) -> f64 {
        self.sample().await
    }

    /// Most recent reading without touching the probe
    pub fn last_rss_mb(&self) -> f64 {
        self.lock().samples.back().copied().unwrap_or(0.0)
    }

    pub fn peak_rss_mb(&self) -> f64 {
        self.lock().peak_mb
    }

    pub fn average_rss_mb(&self) -> f64 {
        let state = self.lock();
        if state.samples.is_empty() {
            return 0.0;
        }
        state.samples.iter().sum::<f64>() / state.samples.len() as f64
    }

    pub fn sample_count(&self) -> usize {
        self.lock().samples.len()
    }

    /// Clear the window and the peak
    pub fn reset(&self) {
        let mut state = self.lock();
        state.samples.clear();
        state.peak_mb = 0.0;
    }

    /// Start periodic sampling. No-op when unsupported, destroyed or
    /// already running.
    pub fn start(self: &Arc<Self>, sample_interval: Duration) {
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
        tokio::spawn(async move { monitor.run(sample_interval, shutdown).await });
    }

    async fn run(self: Arc<Self>, sample_interval: Duration, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_ms = sample_interval.as_millis() as u64,
            "Starting memory sampling loop"
        );
        let mut ticker = interval(sample_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sample().await;
                }
                _ = shutdown.recv() => {
                    debug!("Stopping memory sampling loop");
                    break;
                }
            }
        }
    }

    /// Stop the sampling loop and drop pressure listeners. Idempotent.
    pub fn destroy(&self) {
        let mut state = self.lock();
        if state.destroyed {
            return;
        }
        state.destroyed = true;
        if let Some(tx) = state.shutdown.take() {
            let _ = tx.send(());
        }
        state.pressure_listeners.clear();
    }
}

fn pressure_of(state: &ResourceState, current_mb: f64) -> Option<MemoryPressure> {
    let limit_mb = state.limit_mb?;
    if current_mb <= 0.0 {
        return None;
    }
    let usage_ratio = current_mb / limit_mb as f64;
    (usage_ratio >= state.pressure_threshold).then_some(MemoryPressure {
        current_mb,
        limit_mb,
        usage_ratio,
    })
}

impl Default for ResourceMonitor {
    fn default() -> Self {
        Self::unsupported()
    }
}
