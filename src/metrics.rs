//! Request-level metrics and statistics for the categorization service.

use crate::types::prediction::ResultEnvelope;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::info;

/// Metrics collector shared across request handlers.
pub struct ServiceMetrics {
    /// Total requests served (success or failure envelope)
    pub requests_processed: AtomicU64,
    /// Total transactions categorized across all requests
    pub transactions_processed: AtomicU64,
    /// Requests that returned a failure envelope
    pub requests_failed: AtomicU64,
    /// Envelope counts per mode string ("mock", "tabpfn", "error")
    by_mode: RwLock<HashMap<String, u64>>,
    /// Error counts per kind string
    errors_by_kind: RwLock<HashMap<String, u64>>,
    /// Request processing times (microseconds)
    processing_times: RwLock<Vec<u64>>,
    /// Confidence distribution buckets, 0.0-0.1 .. 0.9-1.0
    confidence_buckets: RwLock<[u64; 10]>,
    start_time: Instant,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self {
            requests_processed: AtomicU64::new(0),
            transactions_processed: AtomicU64::new(0),
            requests_failed: AtomicU64::new(0),
            by_mode: RwLock::new(HashMap::new()),
            errors_by_kind: RwLock::new(HashMap::new()),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            confidence_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record one served request and its envelope.
    pub fn record_request(&self, processing_time: Duration, envelope: &ResultEnvelope) {
        self.requests_processed.fetch_add(1, Ordering::Relaxed);
        self.transactions_processed
            .fetch_add(envelope.total_processed as u64, Ordering::Relaxed);
        if !envelope.success {
            self.requests_failed.fetch_add(1, Ordering::Relaxed);
        }

        if let Ok(mut times) = self.processing_times.write() {
            times.push(processing_time.as_micros() as u64);
            // Bound memory on long-lived instances
            if times.len() > 10_000 {
                times.drain(0..5_000);
            }
        }

        let mode = serde_json::to_value(envelope.mode)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| "unknown".to_string());
        if let Ok(mut by_mode) = self.by_mode.write() {
            *by_mode.entry(mode).or_insert(0) += 1;
        }

        if let Ok(mut by_kind) = self.errors_by_kind.write() {
            for error in &envelope.errors {
                let kind = serde_json::to_value(error.error)
                    .ok()
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_else(|| "unknown".to_string());
                *by_kind.entry(kind).or_insert(0) += 1;
            }
        }

        if let Ok(mut buckets) = self.confidence_buckets.write() {
            for result in &envelope.results {
                let bucket = (result.confidence * 10.0).clamp(0.0, 9.0) as usize;
                buckets[bucket] += 1;
            }
        }
    }

    /// Processing time percentiles over the retained window.
    pub fn get_processing_stats(&self) -> ProcessingStats {
        let times = self.processing_times.read().unwrap();
        if times.is_empty() {
            return ProcessingStats::default();
        }

        let mut sorted: Vec<u64> = times.clone();
        sorted.sort_unstable();
        let count = sorted.len();
        let sum: u64 = sorted.iter().sum();

        ProcessingStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: sorted[count / 2],
            p95_us: sorted[(count as f64 * 0.95) as usize],
            p99_us: sorted[(count as f64 * 0.99) as usize],
            max_us: *sorted.last().unwrap_or(&0),
        }
    }

    /// Requests per second since startup.
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.requests_processed.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn get_requests_by_mode(&self) -> HashMap<String, u64> {
        self.by_mode.read().unwrap().clone()
    }

    pub fn get_errors_by_kind(&self) -> HashMap<String, u64> {
        self.errors_by_kind.read().unwrap().clone()
    }

    pub fn get_confidence_distribution(&self) -> [u64; 10] {
        *self.confidence_buckets.read().unwrap()
    }

    /// Log a summary of everything collected so far.
    pub fn print_summary(&self) {
        let requests = self.requests_processed.load(Ordering::Relaxed);
        let transactions = self.transactions_processed.load(Ordering::Relaxed);
        let failed = self.requests_failed.load(Ordering::Relaxed);
        let processing = self.get_processing_stats();

        info!(
            requests,
            transactions,
            failed,
            throughput = format!("{:.2} req/s", self.get_throughput()),
            "Categorizer metrics summary"
        );
        info!(
            mean_us = processing.mean_us,
            p50_us = processing.p50_us,
            p95_us = processing.p95_us,
            p99_us = processing.p99_us,
            "Request processing time"
        );
        for (mode, count) in self.get_requests_by_mode() {
            info!(mode = %mode, count, "Requests by mode");
        }
        for (kind, count) in self.get_errors_by_kind() {
            info!(kind = %kind, count, "Errors by kind");
        }
    }
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Processing time statistics
#[derive(Debug, Default)]
pub struct ProcessingStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Periodic summary reporter, spawned from the entry point.
pub struct MetricsReporter {
    metrics: std::sync::Arc<ServiceMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: std::sync::Arc<ServiceMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::prediction::{
        EnvelopeMode, ErrorDetail, ErrorKind, PredictionResult, ResultEnvelope,
    };

    fn success_envelope() -> ResultEnvelope {
        ResultEnvelope::success(
            vec![PredictionResult {
                transaction_id: "0".into(),
                description: "SNCF".into(),
                predicted_category: "Transport".into(),
                confidence: 0.95,
            }],
            EnvelopeMode::Mock,
        )
    }

    #[test]
    fn test_request_recording() {
        let metrics = ServiceMetrics::new();
        metrics.record_request(Duration::from_micros(120), &success_envelope());
        metrics.record_request(
            Duration::from_micros(300),
            &ResultEnvelope::failure(ErrorDetail::new(
                ErrorKind::RateLimitExceeded,
                "API rate limit reached",
            )),
        );

        assert_eq!(metrics.requests_processed.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.transactions_processed.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.requests_failed.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.get_requests_by_mode().get("mock"), Some(&1));
        assert_eq!(metrics.get_requests_by_mode().get("error"), Some(&1));
        assert_eq!(
            metrics.get_errors_by_kind().get("RATE_LIMIT_EXCEEDED"),
            Some(&1)
        );
    }

    #[test]
    fn test_confidence_buckets() {
        let metrics = ServiceMetrics::new();
        metrics.record_request(Duration::from_micros(50), &success_envelope());
        let buckets = metrics.get_confidence_distribution();
        assert_eq!(buckets[9], 1); // confidence 0.95 lands in the last bucket
        assert_eq!(buckets.iter().sum::<u64>(), 1);
    }

    #[test]
    fn test_processing_stats() {
        let metrics = ServiceMetrics::new();
        for us in [100u64, 200, 300, 400] {
            metrics.record_request(Duration::from_micros(us), &success_envelope());
        }
        let stats = metrics.get_processing_stats();
        assert_eq!(stats.count, 4);
        assert_eq!(stats.mean_us, 250);
        assert_eq!(stats.max_us, 400);
    }
}
