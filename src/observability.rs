use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Backend API usage counters
#[derive(Debug, Default)]
pub struct BackendApiMetrics {
    pub total_requests: AtomicU64,
    pub rate_limit_waits: AtomicU64,
    pub errors: AtomicU64,
    pub timeouts: AtomicU64,
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
}

impl BackendApiMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// The local limiter made a request wait for its turn
    pub fn record_rate_limit_wait(&self) {
        self.rate_limit_waits.fetch_add(1, Ordering::Relaxed);
        debug!("Backend request delayed by rate limiter");
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
        warn!("Backend request timed out");
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_stats(&self) -> BackendApiStats {
        BackendApiStats {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            rate_limit_waits: self.rate_limit_waits.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            requests = stats.total_requests,
            rate_limit_waits = stats.rate_limit_waits,
            errors = stats.errors,
            timeouts = stats.timeouts,
            cache_hits = stats.cache_hits,
            cache_misses = stats.cache_misses,
            "Backend API metrics"
        );
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackendApiStats {
    pub total_requests: u64,
    pub rate_limit_waits: u64,
    pub errors: u64,
    pub timeouts: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

static BACKEND_METRICS: std::sync::LazyLock<BackendApiMetrics> =
    std::sync::LazyLock::new(BackendApiMetrics::new);

pub fn backend_metrics() -> &'static BackendApiMetrics {
    &BACKEND_METRICS
}

/// Span that ties together every log line of one enrollment run
pub fn create_workflow_span(
    workflow: &str,
    correlation_id: &str,
    vehicle_class: &str,
) -> tracing::Span {
    tracing::info_span!(
        "workflow",
        workflow.name = workflow,
        correlation.id = correlation_id,
        vehicle.class = vehicle_class
    )
}

/// Logs how long a backend operation took
pub struct OperationTimer {
    operation: &'static str,
    start: Instant,
}

impl OperationTimer {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }

    pub fn finish(self, success: bool) -> Duration {
        let duration = self.start.elapsed();
        debug!(
            operation = self.operation,
            duration_ms = duration.as_millis() as u64,
            success,
            "Backend operation completed"
        );
        duration
    }
}
