use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

/// Retained samples per collector; older ones are dropped first.
pub const MAX_SAMPLES: usize = 10_000;

/// One served request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestSample {
    pub timestamp: DateTime<Utc>,
    pub endpoint: String,
    pub status_code: u16,
    pub latency_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct MetricsSummary {
    pub request_count: usize,
    pub error_count: usize,
    pub error_rate: f64,
    pub avg_latency_ms: f64,
    pub max_latency_ms: f64,
    pub p50_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub p99_latency_ms: f64,
}

/// Thread-safe request metrics collector
pub struct MetricsCollector {
    samples: Mutex<VecDeque<RequestSample>>,
    capacity: usize,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::with_capacity(MAX_SAMPLES)
    }
}

impl MetricsCollector {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn record_request(&self, endpoint: &str, status_code: u16, latency_ms: f64) {
        let sample = RequestSample {
            timestamp: Utc::now(),
            endpoint: endpoint.to_string(),
            status_code,
            latency_ms,
        };
        let mut samples = self.lock();
        if samples.len() >= self.capacity {
            samples.pop_front();
        }
        samples.push_back(sample);
    }

    /// Track a simple metric value
    pub fn track_metric(&self, name: &str, value: f64) {
        tracing::debug!(metric = name, value, "Metric");
    }

    /// Summary per endpoint, keyed by endpoint path.
    pub fn summaries(&self) -> BTreeMap<String, MetricsSummary> {
        let samples = self.lock();
        let mut by_endpoint: BTreeMap<String, Vec<&RequestSample>> = BTreeMap::new();
        for sample in samples.iter() {
            by_endpoint.entry(sample.endpoint.clone()).or_default().push(sample);
        }
        by_endpoint
            .into_iter()
            .map(|(endpoint, samples)| (endpoint, Self::summarize(&samples)))
            .collect()
    }

    pub fn get_summary(&self, endpoint: &str) -> MetricsSummary {
        let samples = self.lock();
        let filtered: Vec<&RequestSample> = samples.iter().filter(|s| s.endpoint == endpoint).collect();
        Self::summarize(&filtered)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<RequestSample>> {
        match self.samples.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn summarize(samples: &[&RequestSample]) -> MetricsSummary {
        if samples.is_empty() {
            return MetricsSummary::default();
        }
        let latencies: Vec<f64> = samples.iter().map(|s| s.latency_ms).collect();
        let error_count = samples.iter().filter(|s| s.status_code >= 400).count();

        MetricsSummary {
            request_count: samples.len(),
            error_count,
            error_rate: error_count as f64 / samples.len() as f64,
            avg_latency_ms: latencies.iter().sum::<f64>() / latencies.len() as f64,
            max_latency_ms: latencies.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b)),
            p50_latency_ms: Self::percentile(&latencies, 50.0),
            p95_latency_ms: Self::percentile(&latencies, 95.0),
            p99_latency_ms: Self::percentile(&latencies, 99.0),
        }
    }

    fn percentile(data: &[f64], percentile: f64) -> f64 {
        if data.is_empty() {
            return 0.0;
        }

        let mut sorted = data.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let index = (percentile / 100.0 * (sorted.len() - 1) as f64).round() as usize;
        sorted[index.min(sorted.len() - 1)]
    }
}

/// Global metrics collector instance
pub static METRICS_COLLECTOR: std::sync::OnceLock<MetricsCollector> = std::sync::OnceLock::new();

/// Get the global metrics collector
pub fn get_metrics_collector() -> &'static MetricsCollector {
    METRICS_COLLECTOR.get_or_init(MetricsCollector::default)
}

/// Simple macro for measuring operation duration
#[macro_export]
macro_rules! measure_operation {
    ($operation_name:expr) => {
        {
            let start = std::time::Instant::now();
            struct OperationTimer {
                start: std::time::Instant,
                name: String,
            }

            impl Drop for OperationTimer {
                fn drop(&mut self) {
                    let duration = self.start.elapsed().as_millis() as f64;
                    $crate::metrics::get_metrics_collector().track_metric(
                        &format!("{}_duration_ms", self.name),
                        duration
                    );
                }
            }

            OperationTimer { start, name: $operation_name.to_string() }
        }
    };
}
