//! Battery drain tracking
//!
//! Samples the battery level on a fixed period and estimates the drain rate
//! in percent per ten minutes over a trailing time window.

use crate::probe::BatteryProbe;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, info};

/// Ten minutes in milliseconds, the unit the drain rate is expressed over
const TEN_MINUTES_MS: f64 = 600_000.0;

/// Default sampling period
pub const DEFAULT_BATTERY_SAMPLE_INTERVAL: Duration = Duration::from_secs(60);

/// Default trailing window
pub const DEFAULT_BATTERY_WINDOW: Duration = Duration::from_secs(10 * 60);

/// One sample per minute across ten minutes, both ends inclusive
pub const DEFAULT_BATTERY_MAX_SAMPLES: usize = 11;

/// Configuration for the battery drain tracker
#[derive(Debug, Clone)]
pub struct BatteryConfig {
    pub sample_interval: Duration,
    pub window: Duration,
    pub max_samples: usize,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            sample_interval: DEFAULT_BATTERY_SAMPLE_INTERVAL,
            window: DEFAULT_BATTERY_WINDOW,
            max_samples: DEFAULT_BATTERY_MAX_SAMPLES,
        }
    }
}

/// Battery level at a point in time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatterySample {
    /// Charge fraction in `[0, 1]`
    pub level: f64,
    /// Wall-clock milliseconds
    pub timestamp_ms: i64,
}

/// Drain between two samples in percent per ten minutes.
///
/// `None` for a non-positive interval. Charging is clamped to zero.
pub fn drain_between(first: &BatterySample, last: &BatterySample) -> Option<f64> {
    let elapsed_ms = last.timestamp_ms - first.timestamp_ms;
    if elapsed_ms <= 0 {
        return None;
    }
    let rate = (first.level - last.level) / elapsed_ms as f64 * TEN_MINUTES_MS * 100.0;
    Some(rate.max(0.0))
}

struct BatteryState {
    samples: VecDeque<BatterySample>,
    shutdown: Option<broadcast::Sender<()>>,
    destroyed: bool,
}

/// Rolling battery drain estimator
pub struct BatteryDrainTracker {
    probe: Option<Arc<dyn BatteryProbe>>,
    config: BatteryConfig,
    state: Mutex<BatteryState>,
}

impl BatteryDrainTracker {
    pub fn new(probe: Option<Arc<dyn BatteryProbe>>, config: BatteryConfig) -> Self {
        Self {
            probe,
            state: Mutex::new(BatteryState {
                samples: VecDeque::with_capacity(config.max_samples),
                shutdown: None,
                destroyed: false,
            }),
            config,
        }
    }

    /// Tracker for a device without a battery API
    pub fn unsupported() -> Self {
        Self::new(None, BatteryConfig::default())
    }

    fn lock(&self) -> MutexGuard<'_, BatteryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_supported(&self) -> bool {
        self.probe.is_some()
    }

    /// Append a sample and drop everything outside the trailing window
    pub fn record_sample(&self, level: f64, timestamp_ms: i64) {
        let window_ms = self.config.window.as_millis() as i64;
        let mut state = self.lock();
        state.samples.push_back(BatterySample {
            level: level.clamp(0.0, 1.0),
            timestamp_ms,
        });

        let cutoff = timestamp_ms - window_ms;
        while let Some(front) = state.samples.front() {
            if front.timestamp_ms < cutoff || state.samples.len() > self.config.max_samples {
                state.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Read the probe once and record the result
    pub async fn sample_now(&self) -> Option<f64> {
        let probe = self.probe.as_ref()?;
        match probe.read_level().await {
            Ok(level) => {
                self.record_sample(level, chrono::Utc::now().timestamp_millis());
                Some(level)
            }
            Err(e) => {
                debug!(error = %e, "Battery probe read failed, skipping sample");
                None
            }
        }
    }

    /// Drain from the oldest to the newest sample in the window
    pub fn current_drain_rate(&self) -> Option<f64> {
        if !self.is_supported() {
            return None;
        }
        let state = self.lock();
        if state.samples.len() < 2 {
            return None;
        }
        let first = state.samples.front()?;
        let last = state.samples.back()?;
        drain_between(first, last)
    }

    /// Mean of the non-negative consecutive-pair drain rates.
    ///
    /// Deliberately differs from [`current_drain_rate`](Self::current_drain_rate):
    /// charging intervals are discarded instead of being netted out.
    pub fn average_drain_rate(&self) -> Option<f64> {
        if !self.is_supported() {
            return None;
        }
        let state = self.lock();
        let n = state.samples.len();
        if n < 2 {
            return None;
        }
        if n < 3 {
            return drain_between(state.samples.front()?, state.samples.back()?);
        }

        let rates: Vec<f64> = state
            .samples
            .iter()
            .zip(state.samples.iter().skip(1))
            .filter_map(|(a, b)| {
                let elapsed_ms = b.timestamp_ms - a.timestamp_ms;
                if elapsed_ms <= 0 {
                    return None;
                }
                let rate = (a.level - b.level) / elapsed_ms as f64 * TEN_MINUTES_MS * 100.0;
                (rate >= 0.0).then_some(rate)
            })
            .collect();

        if rates.is_empty() {
            return None;
        }
        Some(rates.iter().sum::<f64>() / rates.len() as f64)
    }

    pub fn sample_count(&self) -> usize {
        self.lock().samples.len()
    }

    pub fn samples(&self) -> Vec<BatterySample> {
        self.lock().samples.iter().copied().collect()
    }

    /// Latest recorded level, if any
    pub fn current_level(&self) -> Option<f64> {
        self.lock().samples.back().map(|s| s.level)
    }

    /// Clear samples; support status is unaffected
    pub fn reset(&self) {
        self.lock().samples.clear();
    }

    /// Start periodic sampling. No-op when unsupported, destroyed or
    /// already running.
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

        let tracker = Arc::clone(self);
        tokio::spawn(async move { tracker.run(shutdown).await });
    }

    async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.sample_interval.as_secs(),
            "Starting battery sampling loop"
        );
        let mut ticker = interval(self.config.sample_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sample_now().await;
                }
                _ = shutdown.recv() => {
                    debug!("Stopping battery sampling loop");
                    break;
                }
            }
        }
    }

    /// Stop the sampling loop. Idempotent.
    pub fn destroy(&self) {
        let mut state = self.lock();
        if state.destroyed {
            return;
        }
        state.destroyed = true;
        if let Some(tx) = state.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::async_trait;

    const MINUTE_MS: i64 = 60_000;

    struct FakeBattery(Mutex<f64>);

    #[async_trait]
    impl BatteryProbe for FakeBattery {
        async fn read_level(&self) -> anyhow::Result<f64> {
            Ok(*self.0.lock().unwrap())
        }
    }

    fn supported() -> BatteryDrainTracker {
        BatteryDrainTracker::new(
            Some(Arc::new(FakeBattery(Mutex::new(1.0)))),
            BatteryConfig::default(),
        )
    }

    #[test]
    fn test_unsupported_returns_none() {
        let tracker = BatteryDrainTracker::unsupported();
        tracker.record_sample(0.9, 0);
        tracker.record_sample(0.8, MINUTE_MS);
        assert!(tracker.current_drain_rate().is_none());
        assert!(tracker.average_drain_rate().is_none());
    }

    #[test]
    fn test_needs_two_samples() {
        let tracker = supported();
        assert!(tracker.current_drain_rate().is_none());
        tracker.record_sample(0.9, 0);
        assert!(tracker.current_drain_rate().is_none());
    }

    #[test]
    fn test_two_point_drain() {
        let tracker = supported();
        tracker.record_sample(0.90, 0);
        tracker.record_sample(0.88, 10 * MINUTE_MS);

        // 2% over ten minutes
        let rate = tracker.current_drain_rate().unwrap();
        assert!((rate - 2.0).abs() < 1e-9);
        assert!((tracker.average_drain_rate().unwrap() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_charging_clamps_to_zero() {
        let tracker = supported();
        tracker.record_sample(0.50, 0);
        tracker.record_sample(0.55, 5 * MINUTE_MS);

        assert_eq!(tracker.current_drain_rate(), Some(0.0));
    }

    #[test]
    fn test_drain_between_non_negative() {
        let a = BatterySample {
            level: 0.7,
            timestamp_ms: 0,
        };
        let b = BatterySample {
            level: 0.7,
            timestamp_ms: MINUTE_MS,
        };
        assert_eq!(drain_between(&a, &b), Some(0.0));
        assert_eq!(drain_between(&a, &a), None);
    }

    #[test]
    fn test_average_discards_charging_pairs() {
        let tracker = supported();
        tracker.record_sample(0.80, 0);
        tracker.record_sample(0.79, MINUTE_MS); // 10 %/10min
        tracker.record_sample(0.85, 2 * MINUTE_MS); // charging, discarded
        tracker.record_sample(0.83, 3 * MINUTE_MS); // 20 %/10min

        let avg = tracker.average_drain_rate().unwrap();
        assert!((avg - 15.0).abs() < 1e-6);

        // Endpoint formula nets the charge out: 0.80 -> 0.83 is charging
        assert_eq!(tracker.current_drain_rate(), Some(0.0));
    }

    #[test]
    fn test_average_none_when_all_charging() {
        let tracker = supported();
        tracker.record_sample(0.50, 0);
        tracker.record_sample(0.60, MINUTE_MS);
        tracker.record_sample(0.70, 2 * MINUTE_MS);

        assert!(tracker.average_drain_rate().is_none());
    }

    #[test]
    fn test_window_eviction() {
        let tracker = supported();
        for i in 0..20 {
            tracker.record_sample(1.0 - i as f64 * 0.001, i * MINUTE_MS);
        }

        let samples = tracker.samples();
        assert_eq!(samples.len(), DEFAULT_BATTERY_MAX_SAMPLES);
        assert_eq!(samples.first().unwrap().timestamp_ms, 9 * MINUTE_MS);
        assert_eq!(samples.last().unwrap().timestamp_ms, 19 * MINUTE_MS);
    }

    #[test]
    fn test_sparse_samples_evicted_by_age_only() {
        let tracker = supported();
        for (i, minute) in [0, 5, 10, 15].into_iter().enumerate() {
            tracker.record_sample(0.9 - i as f64 * 0.01, minute * MINUTE_MS);
        }

        // Well under the sample cap; only the 0-minute reading is outside 10 minutes
        let samples = tracker.samples();
        assert_eq!(samples.len(), 3);
        assert_eq!(samples.first().unwrap().timestamp_ms, 5 * MINUTE_MS);

        let rate = tracker.current_drain_rate().unwrap();
        assert!((rate - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_sample_cap_applies_within_window() {
        let tracker = BatteryDrainTracker::new(
            Some(Arc::new(FakeBattery(Mutex::new(1.0)))),
            BatteryConfig {
                max_samples: 3,
                ..Default::default()
            },
        );
        for i in 0..5 {
            tracker.record_sample(1.0 - i as f64 * 0.01, i * MINUTE_MS);
        }

        let samples = tracker.samples();
        assert_eq!(samples.len(), 3);
        assert_eq!(samples.first().unwrap().timestamp_ms, 2 * MINUTE_MS);
    }

    #[test]
    fn test_shared_timestamp_intervals() {
        let tracker = supported();
        tracker.record_sample(0.90, 0);
        tracker.record_sample(0.89, 0);

        // Two readings, zero elapsed time: no rate either way
        assert!(tracker.current_drain_rate().is_none());
        assert!(tracker.average_drain_rate().is_none());

        tracker.record_sample(0.88, MINUTE_MS); // 10 %/10min
        tracker.record_sample(0.87, MINUTE_MS); // zero-length, skipped
        tracker.record_sample(0.86, 2 * MINUTE_MS); // 10 %/10min

        let avg = tracker.average_drain_rate().unwrap();
        assert!((avg - 10.0).abs() < 1e-6);
        // Endpoints: 0.90 -> 0.86 over two minutes
        let current = tracker.current_drain_rate().unwrap();
        assert!((current - 20.0).abs() < 1e-6);
    }

    #[test]
    fn test_reset_keeps_support() {
        let tracker = supported();
        tracker.record_sample(0.9, 0);
        tracker.reset();
        assert_eq!(tracker.sample_count(), 0);
        assert!(tracker.is_supported());
    }

    #[tokio::test]
    async fn test_sample_now_uses_probe() {
        let tracker = supported();
        assert_eq!(tracker.sample_now().await, Some(1.0));
        assert_eq!(tracker.sample_count(), 1);
        assert_eq!(tracker.current_level(), Some(1.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sampling_loop_and_destroy() {
        let tracker = Arc::new(BatteryDrainTracker::new(
            Some(Arc::new(FakeBattery(Mutex::new(0.5)))),
            BatteryConfig {
                sample_interval: Duration::from_secs(1),
                ..Default::default()
            },
        ));
        tracker.start();
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(tracker.sample_count() >= 2);

        tracker.destroy();
        tracker.destroy();
    }
}
