//! Process-global metrics: lock-free counters/gauges and a
//! reservoir-sampled latency histogram, exposed as a human-readable
//! summary and as JSON for the façade.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

static METRICS: once_cell::sync::Lazy<Arc<Metrics>> =
    once_cell::sync::Lazy::new(|| Arc::new(Metrics::new()));

pub fn metrics() -> Arc<Metrics> {
    Arc::clone(&METRICS)
}

#[derive(Debug)]
pub struct Metrics {
    pub writes_total: Counter,
    pub writes_bytes: Counter,

    pub reads_total: Counter,
    pub reads_hits: Counter,
    pub reads_misses: Counter,

    pub rotations_total: Counter,
    pub compactions_total: Counter,
    pub compaction_bytes_reclaimed: Counter,

    pub write_latency: Histogram,
    pub read_latency: Histogram,

    pub segment_count: Gauge,
    pub active_segment_bytes: Gauge,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            writes_total: Counter::new(),
            writes_bytes: Counter::new(),
            reads_total: Counter::new(),
            reads_hits: Counter::new(),
            reads_misses: Counter::new(),
            rotations_total: Counter::new(),
            compactions_total: Counter::new(),
            compaction_bytes_reclaimed: Counter::new(),
            write_latency: Histogram::new(),
            read_latency: Histogram::new(),
            segment_count: Gauge::new(),
            active_segment_bytes: Gauge::new(),
        }
    }

    pub fn read_hit_rate(&self) -> f64 {
        let hits = self.reads_hits.get();
        let total = self.reads_total.get();
        if total == 0 {
            return 0.0;
        }
        hits as f64 / total as f64
    }

    pub fn summary(&self) -> String {
        format!(
            "writes={} ({} bytes) reads={} (hit_rate={:.2}%) rotations={} compactions={} ({} bytes reclaimed) segments={} active_bytes={} p50_write={:?} p99_write={:?} p50_read={:?} p99_read={:?}",
            self.writes_total.get(),
            self.writes_bytes.get(),
            self.reads_total.get(),
            self.read_hit_rate() * 100.0,
            self.rotations_total.get(),
            self.compactions_total.get(),
            self.compaction_bytes_reclaimed.get(),
            self.segment_count.get(),
            self.active_segment_bytes.get(),
            self.write_latency.percentile(0.5),
            self.write_latency.percentile(0.99),
            self.read_latency.percentile(0.5),
            self.read_latency.percentile(0.99),
        )
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            writes_total: self.writes_total.get(),
            writes_bytes: self.writes_bytes.get(),
            reads_total: self.reads_total.get(),
            reads_hits: self.reads_hits.get(),
            reads_misses: self.reads_misses.get(),
            read_hit_rate: self.read_hit_rate(),
            rotations_total: self.rotations_total.get(),
            compactions_total: self.compactions_total.get(),
            compaction_bytes_reclaimed: self.compaction_bytes_reclaimed.get(),
            segment_count: self.segment_count.get(),
            active_segment_bytes: self.active_segment_bytes.get(),
            write_latency_p50_micros: self.write_latency.percentile(0.5).as_micros() as u64,
            write_latency_p99_micros: self.write_latency.percentile(0.99).as_micros() as u64,
            read_latency_p50_micros: self.read_latency.percentile(0.5).as_micros() as u64,
            read_latency_p99_micros: self.read_latency.percentile(0.99).as_micros() as u64,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// JSON-friendly snapshot returned by the façade's metrics endpoint.
#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub writes_total: u64,
    pub writes_bytes: u64,
    pub reads_total: u64,
    pub reads_hits: u64,
    pub reads_misses: u64,
    pub read_hit_rate: f64,
    pub rotations_total: u64,
    pub compactions_total: u64,
    pub compaction_bytes_reclaimed: u64,
    pub segment_count: u64,
    pub active_segment_bytes: u64,
    pub write_latency_p50_micros: u64,
    pub write_latency_p99_micros: u64,
    pub read_latency_p50_micros: u64,
    pub read_latency_p99_micros: u64,
}

/// Lock-free counter.
#[derive(Debug)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, delta: u64) {
        self.value.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

impl Default for Counter {
    fn default() -> Self {
        Self::new()
    }
}

/// Gauge tracking current state, not a monotonic total.
#[derive(Debug)]
pub struct Gauge {
    value: AtomicU64,
}

impl Gauge {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    pub fn set(&self, value: u64) {
        self.value.store(value, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

impl Default for Gauge {
    fn default() -> Self {
        Self::new()
    }
}

/// Latency histogram backed by reservoir sampling so memory stays bounded
/// regardless of how many operations have been observed.
#[derive(Debug)]
pub struct Histogram {
    samples: parking_lot::RwLock<Vec<Duration>>,
    max_samples: usize,
}

impl Histogram {
    pub fn new() -> Self {
        Self::with_capacity(10_000)
    }

    pub fn with_capacity(max_samples: usize) -> Self {
        Self {
            samples: parking_lot::RwLock::new(Vec::with_capacity(max_samples)),
            max_samples,
        }
    }

    pub fn observe(&self, duration: Duration) {
        let mut samples = self.samples.write();
        if samples.len() < self.max_samples {
            samples.push(duration);
        } else {
            let idx = fastrand::usize(..samples.len());
            samples[idx] = duration;
        }
    }

    pub fn percentile(&self, p: f64) -> Duration {
        let samples = self.samples.read();
        if samples.is_empty() {
            return Duration::ZERO;
        }
        let mut sorted: Vec<Duration> = samples.clone();
        sorted.sort();
        let idx = ((sorted.len() - 1) as f64 * p) as usize;
        sorted[idx]
    }

    pub fn count(&self) -> usize {
        self.samples.read().len()
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn counter_accumulates() {
        let counter = Counter::new();
        counter.inc();
        counter.add(99);
        assert_eq!(counter.get(), 100);
    }

    #[test]
    fn gauge_overwrites() {
        let gauge = Gauge::new();
        gauge.set(42);
        gauge.set(7);
        assert_eq!(gauge.get(), 7);
    }

    #[test]
    fn histogram_percentiles() {
        let hist = Histogram::new();
        for i in 1..=100u64 {
            hist.observe(Duration::from_micros(i));
        }
        assert_eq!(hist.count(), 100);
        let p50 = hist.percentile(0.5);
        assert!(p50.as_micros() >= 45 && p50.as_micros() <= 55);
    }

    #[test]
    fn concurrent_counter_is_consistent() {
        let counter = Arc::new(Counter::new());
        let mut handles = vec![];
        for _ in 0..10 {
            let counter = Arc::clone(&counter);
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    counter.inc();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(counter.get(), 10_000);
    }
}
