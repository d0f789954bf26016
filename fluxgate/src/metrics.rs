//! Latency/rate telemetry window.
//!
//! Collects order-book fetch latencies, the order-book publish count and
//! the private-API call count over a one-second window. The telemetry loop
//! snapshots the window each tick; the cumulative order-book counter feeds
//! the liveness PING.

use fluxgate_integration::metric::{Field, Metric, Tag};
use parking_lot::Mutex;
use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

#[derive(Debug, Default)]
pub struct MetricsRecorder {
    window: Mutex<Window>,
    order_books_received: AtomicU64,
}

#[derive(Debug, Default)]
struct Window {
    fetch_latencies_ms: Vec<f64>,
    order_books_published: u64,
    private_api_calls: u64,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_fetch_latency(&self, latency: Duration) {
        self.window
            .lock()
            .fetch_latencies_ms
            .push(latency.as_secs_f64() * 1_000.0);
    }

    pub fn record_books(&self, count: u64) {
        self.window.lock().order_books_published += count;
        self.order_books_received.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_private_call(&self) {
        self.window.lock().private_api_calls += 1;
    }

    /// Cumulative order books received since startup.
    pub fn books_received_total(&self) -> u64 {
        self.order_books_received.load(Ordering::Relaxed)
    }

    /// Snapshot and reset the window. `None` until at least two latency
    /// samples exist; percentiles are meaningless below that.
    pub fn take_snapshot(&self, exchange: &str, instance: &str) -> Option<Metric> {
        let window = {
            let mut window = self.window.lock();
            if window.fetch_latencies_ms.len() < 2 {
                return None;
            }
            std::mem::take(&mut *window)
        };

        let mut samples = window.fetch_latencies_ms;
        samples.sort_by(f64::total_cmp);

        Some(Metric {
            name: "gateway",
            time: chrono::Utc::now().timestamp_micros() as u64,
            tags: vec![
                Tag::new("exchange", exchange),
                Tag::new("instance", instance),
            ],
            fields: vec![
                Field::new("order_book_latency_p50_ms", percentile(&samples, 0.50)),
                Field::new("order_book_latency_p95_ms", percentile(&samples, 0.95)),
                Field::new("order_book_latency_p99_ms", percentile(&samples, 0.99)),
                Field::new("order_books_per_s", window.order_books_published),
                Field::new("private_api_calls_per_s", window.private_api_calls),
            ],
        })
    }
}

/// Linear-interpolated percentile over an ascending-sorted sample set.
pub fn percentile(sorted: &[f64], quantile: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0];
    }

    let rank = quantile * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;

    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}
