//! Task latency tracking
//!
//! Keeps a fixed-capacity sliding window of execution durations and answers
//! nearest-rank percentile queries over it.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Default number of samples retained
pub const DEFAULT_LATENCY_WINDOW: usize = 100;

struct LatencyWindow {
    samples: VecDeque<f64>,
    capacity: usize,
}

/// Sliding window of task durations in milliseconds
pub struct LatencyTracker {
    window: Mutex<LatencyWindow>,
}

impl LatencyTracker {
    pub fn new(window_size: usize) -> Self {
        let capacity = window_size.max(1);
        Self {
            window: Mutex::new(LatencyWindow {
                samples: VecDeque::with_capacity(capacity),
                capacity,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LatencyWindow> {
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record one duration, evicting the oldest sample when full
    pub fn record(&self, value_ms: f64) {
        let mut window = self.lock();
        while window.samples.len() >= window.capacity {
            window.samples.pop_front();
        }
        window.samples.push_back(value_ms);
    }

    /// Nearest-rank percentile for `p` in `[0, 1]`; `0.0` when empty
    pub fn percentile(&self, p: f64) -> f64 {
        let window = self.lock();
        if window.samples.is_empty() {
            return 0.0;
        }

        let mut sorted: Vec<f64> = window.samples.iter().copied().collect();
        drop(window);
        sorted.sort_by(f64::total_cmp);

        let n = sorted.len();
        let index = ((n as f64 * p).floor() as usize).min(n - 1);
        sorted[index]
    }

    pub fn p50(&self) -> f64 {
        self.percentile(0.50)
    }

    pub fn p95(&self) -> f64 {
        self.percentile(0.95)
    }

    pub fn p99(&self) -> f64 {
        self.percentile(0.99)
    }

    pub fn average(&self) -> f64 {
        let window = self.lock();
        if window.samples.is_empty() {
            return 0.0;
        }
        window.samples.iter().sum::<f64>() / window.samples.len() as f64
    }

    pub fn min(&self) -> f64 {
        self.lock()
            .samples
            .iter()
            .copied()
            .min_by(f64::total_cmp)
            .unwrap_or(0.0)
    }

    pub fn max(&self) -> f64 {
        self.lock()
            .samples
            .iter()
            .copied()
            .max_by(f64::total_cmp)
            .unwrap_or(0.0)
    }

    pub fn sample_count(&self) -> usize {
        self.lock().samples.len()
    }

    pub fn window_size(&self) -> usize {
        self.lock().capacity
    }

    /// Most recent sample, if any
    pub fn last(&self) -> Option<f64> {
        self.lock().samples.back().copied()
    }

    pub fn reset(&self) {
        self.lock().samples.clear();
    }
}

impl Default for LatencyTracker {
    fn default() -> Self {
        Self::new(DEFAULT_LATENCY_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_empty_tracker_reports_zero() {
        let tracker = LatencyTracker::default();
        assert_eq!(tracker.p50(), 0.0);
        assert_eq!(tracker.p95(), 0.0);
        assert_eq!(tracker.p99(), 0.0);
        assert_eq!(tracker.average(), 0.0);
        assert_eq!(tracker.min(), 0.0);
        assert_eq!(tracker.max(), 0.0);
        assert_eq!(tracker.sample_count(), 0);
    }

    #[test]
    fn test_window_evicts_oldest() {
        let tracker = LatencyTracker::new(100);
        for i in 1..=150 {
            tracker.record(i as f64);
        }

        assert_eq!(tracker.sample_count(), 100);
        // 150 recorded, window 100: the 51st value is the oldest survivor
        assert_eq!(tracker.min(), 51.0);
        assert_eq!(tracker.max(), 150.0);
    }

    #[test]
    fn test_nearest_rank_percentiles() {
        let tracker = LatencyTracker::new(100);
        // Insert out of order to make sure a sorted copy is used
        for i in (1..=100).rev() {
            tracker.record(i as f64);
        }

        // index = floor(100 * p) over values 1..=100
        assert_eq!(tracker.p50(), 51.0);
        assert_eq!(tracker.p95(), 96.0);
        assert_eq!(tracker.p99(), 100.0);
        assert_eq!(tracker.percentile(1.0), 100.0);
        assert!((tracker.average() - 50.5).abs() < 1e-9);
    }

    #[test]
    fn test_single_sample() {
        let tracker = LatencyTracker::default();
        tracker.record(42.0);

        assert_eq!(tracker.p50(), 42.0);
        assert_eq!(tracker.p99(), 42.0);
        assert_eq!(tracker.last(), Some(42.0));
    }

    #[test]
    fn test_percentiles_are_monotonic() {
        let tracker = LatencyTracker::new(50);
        let values = [
            310.0, 12.0, 95.5, 400.0, 88.0, 88.0, 1200.0, 5.0, 61.0, 73.0, 240.0,
        ];
        for (i, v) in values.iter().enumerate() {
            tracker.record(*v);
            if i > 0 {
                assert!(tracker.p50() <= tracker.p95());
                assert!(tracker.p95() <= tracker.p99());
            }
        }
    }

    #[test]
    fn test_nan_sample_sorts_last() {
        let tracker = LatencyTracker::new(10);
        for v in [30.0, f64::NAN, 10.0, 20.0] {
            tracker.record(v);
        }

        assert_eq!(tracker.min(), 10.0);
        assert!(tracker.max().is_nan());
        // sorted: 10, 20, 30, NaN
        assert_eq!(tracker.p50(), 30.0);
        assert_eq!(tracker.percentile(0.0), 10.0);
        assert!(tracker.p99().is_nan());
    }

    #[test]
    fn test_reset_clears_samples() {
        let tracker = LatencyTracker::new(10);
        tracker.record(5.0);
        tracker.reset();
        assert_eq!(tracker.sample_count(), 0);
        assert_eq!(tracker.window_size(), 10);
    }

    #[test]
    fn test_concurrent_writers_never_exceed_window() {
        let tracker = Arc::new(LatencyTracker::new(64));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let tracker = tracker.clone();
                std::thread::spawn(move || {
                    for i in 0..500 {
                        tracker.record((t * 1000 + i) as f64);
                        assert!(tracker.sample_count() <= 64);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(tracker.sample_count(), 64);
    }
}
