//! Latency histograms for the translation layer.
//! Each metric keeps its most recent samples; summaries report p50/p95/p99.
//! Time comes from the tokio clock so paused-time runs record virtual time.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;

/// Times one operation from creation until [`finish`](Self::finish).
/// A span dropped without finishing records nothing.
pub struct TimingSpan {
    name: &'static str,
    start: Instant,
    registry: Arc<MetricsRegistry>,
}

impl TimingSpan {
    pub fn finish(self) -> Duration {
        let elapsed = self.start.elapsed();
        self.registry.record(self.name, elapsed);
        elapsed
    }
}

/// Bounded window of samples in microseconds, oldest evicted first.
struct Window {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl Window {
    fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, value_us: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value_us);
    }

    fn sorted(&self) -> Vec<f64> {
        let mut sorted: Vec<f64> = self.samples.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);
        sorted
    }

    fn summarize(&self) -> MetricSummary {
        let sorted = self.sorted();
        MetricSummary {
            p50_us: rank(&sorted, 50.0),
            p95_us: rank(&sorted, 95.0),
            p99_us: rank(&sorted, 99.0),
            max_us: sorted.last().copied().unwrap_or(0.0),
            count: sorted.len(),
        }
    }
}

/// Nearest-rank percentile over an already sorted slice.
fn rank(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64).round() as usize;
    sorted[idx]
}

pub struct MetricsRegistry {
    windows: Mutex<HashMap<&'static str, Window>>,
    window_size: usize,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(window_size: usize) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            window_size: window_size.max(1),
        }
    }

    pub fn record(&self, name: &'static str, elapsed: Duration) {
        let value_us = elapsed.as_nanos() as f64 / 1_000.0;
        self.windows
            .lock()
            .entry(name)
            .or_insert_with(|| Window::new(self.window_size))
            .push(value_us);
        tracing::trace!(metric = name, value_us, "metric_recorded");
    }

    pub fn span(self: &Arc<Self>, name: &'static str) -> TimingSpan {
        TimingSpan {
            name,
            start: Instant::now(),
            registry: Arc::clone(self),
        }
    }

    /// Percentile (0-100) in microseconds; 0 for an unknown metric.
    pub fn percentile(&self, name: &str, p: f64) -> f64 {
        self.windows
            .lock()
            .get(name)
            .map(|w| rank(&w.sorted(), p))
            .unwrap_or(0.0)
    }

    pub fn count(&self, name: &str) -> usize {
        self.windows.lock().get(name).map(|w| w.samples.len()).unwrap_or(0)
    }

    pub fn summary(&self) -> HashMap<String, MetricSummary> {
        self.windows
            .lock()
            .iter()
            .map(|(&name, window)| (name.to_string(), window.summarize()))
            .collect()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricSummary {
    pub p50_us: f64,
    pub p95_us: f64,
    pub p99_us: f64,
    pub max_us: f64,
    pub count: usize,
}

pub mod metric_names {
    pub const GATE_WAIT: &str = "gate_wait";
    pub const BACKEND_FETCH: &str = "t_backend_fetch";
    pub const BORROWED_WAIT: &str = "t_borrowed_wait";
    pub const PRELOAD_WAVE: &str = "t_preload_wave";
}

#[cfg(test)]
mod tests {
    use super::*;

    fn micros(us: u64) -> Duration {
        Duration::from_micros(us)
    }

    #[test]
    fn percentiles_over_window() {
        let registry = MetricsRegistry::with_capacity(4);
        for us in [10, 20, 30, 40, 50] {
            registry.record(metric_names::BACKEND_FETCH, micros(us));
        }
        // Oldest sample (10) has been evicted.
        assert_eq!(registry.count(metric_names::BACKEND_FETCH), 4);
        assert_eq!(registry.percentile(metric_names::BACKEND_FETCH, 0.0), 20.0);
        assert_eq!(registry.percentile(metric_names::BACKEND_FETCH, 100.0), 50.0);
        assert_eq!(registry.percentile(metric_names::GATE_WAIT, 50.0), 0.0);

        let summary = registry.summary();
        assert_eq!(summary[metric_names::BACKEND_FETCH].count, 4);
        assert_eq!(summary[metric_names::BACKEND_FETCH].max_us, 50.0);
    }

    #[tokio::test(start_paused = true)]
    async fn spans_follow_the_tokio_clock() {
        let registry = Arc::new(MetricsRegistry::new());
        let span = registry.span(metric_names::GATE_WAIT);
        tokio::time::sleep(Duration::from_millis(250)).await;
        let elapsed = span.finish();
        assert!(elapsed >= Duration::from_millis(250) && elapsed < Duration::from_millis(260));
        let p50 = registry.percentile(metric_names::GATE_WAIT, 50.0);
        assert!((250_000.0..260_000.0).contains(&p50));
    }

    #[test]
    fn unfinished_span_records_nothing() {
        let registry = Arc::new(MetricsRegistry::new());
        drop(registry.span(metric_names::PRELOAD_WAVE));
        assert_eq!(registry.count(metric_names::PRELOAD_WAVE), 0);
    }
}
