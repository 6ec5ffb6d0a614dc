//! Decision metrics with a Prometheus text export

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Engine performance metrics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineMetrics {
    /// Total number of evaluations that produced a decision
    pub total_evaluations: u64,

    pub allowed_decisions: u64,

    pub denied_decisions: u64,

    /// Requests rejected before evaluation for a missing field
    pub validation_denials: u64,

    pub cache_hits: u64,

    pub cache_misses: u64,

    /// Decisions granted through a caveated binding
    pub conditional_grants: u64,

    /// Cache entries dropped by invalidation events
    pub invalidated_entries: u64,

    /// Latency percentiles over the recent sample window
    pub latency_p50_ms: f64,
    pub latency_p90_ms: f64,
    pub latency_p99_ms: f64,

    pub avg_latency_ms: f64,

    /// Evaluations that failed with an infrastructure error
    pub error_count: u64,
}

impl EngineMetrics {
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }

    pub fn allow_rate(&self) -> f64 {
        let total = self.allowed_decisions + self.denied_decisions;
        if total == 0 {
            0.0
        } else {
            self.allowed_decisions as f64 / total as f64
        }
    }
}

/// Collects [`EngineMetrics`] behind an async lock
pub struct MetricsCollector {
    metrics: Arc<RwLock<EngineMetrics>>,

    /// Recent latency samples, oldest dropped first
    latency_samples: Arc<RwLock<Vec<f64>>>,

    max_samples: usize,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::with_max_samples(10_000)
    }

    pub fn with_max_samples(max_samples: usize) -> Self {
        let max_samples = max_samples.max(10);
        Self {
            metrics: Arc::new(RwLock::new(EngineMetrics::default())),
            latency_samples: Arc::new(RwLock::new(Vec::with_capacity(max_samples))),
            max_samples,
        }
    }

    pub async fn record_cache_hit(&self) {
        self.metrics.write().await.cache_hits += 1;
    }

    pub async fn record_cache_miss(&self) {
        self.metrics.write().await.cache_misses += 1;
    }

    pub async fn record_decision(&self, allowed: bool, conditional: bool) {
        let mut metrics = self.metrics.write().await;
        metrics.total_evaluations += 1;

        if allowed {
            metrics.allowed_decisions += 1;
            if conditional {
                metrics.conditional_grants += 1;
            }
        } else {
            metrics.denied_decisions += 1;
        }
    }

    pub async fn record_validation_denial(&self) {
        self.metrics.write().await.validation_denials += 1;
    }

    pub async fn record_invalidation(&self, entries: usize) {
        self.metrics.write().await.invalidated_entries += entries as u64;
    }

    pub async fn record_error(&self) {
        self.metrics.write().await.error_count += 1;
    }

    pub async fn record_latency(&self, latency: Duration) {
        let latency_ms = latency.as_secs_f64() * 1000.0;

        let mut samples = self.latency_samples.write().await;
        samples.push(latency_ms);
        if samples.len() > self.max_samples {
            let excess = samples.len() - self.max_samples + self.max_samples / 10;
            samples.drain(0..excess);
        }

        let mut sorted = samples.clone();
        sorted.sort_by(f64::total_cmp);

        let mut metrics = self.metrics.write().await;
        metrics.avg_latency_ms = sorted.iter().sum::<f64>() / sorted.len() as f64;
        metrics.latency_p50_ms = Self::percentile(&sorted, 0.50);
        metrics.latency_p90_ms = Self::percentile(&sorted, 0.90);
        metrics.latency_p99_ms = Self::percentile(&sorted, 0.99);
    }

    /// Current metrics snapshot
    pub async fn snapshot(&self) -> EngineMetrics {
        self.metrics.read().await.clone()
    }

    pub async fn reset(&self) {
        *self.metrics.write().await = EngineMetrics::default();
        self.latency_samples.write().await.clear();
    }

    /// Export metrics in Prometheus text format
    pub async fn export_prometheus(&self) -> String {
        let metrics = self.metrics.read().await;

        format!(
            r#"# HELP bastion_authz_evaluations_total Evaluations that produced a decision
# TYPE bastion_authz_evaluations_total counter
bastion_authz_evaluations_total {}

# HELP bastion_authz_allowed_total Allowed decisions
# TYPE bastion_authz_allowed_total counter
bastion_authz_allowed_total {}

# HELP bastion_authz_denied_total Denied decisions
# TYPE bastion_authz_denied_total counter
bastion_authz_denied_total {}

# HELP bastion_authz_cache_hits_total Decision cache hits
# TYPE bastion_authz_cache_hits_total counter
bastion_authz_cache_hits_total {}

# HELP bastion_authz_cache_misses_total Decision cache misses
# TYPE bastion_authz_cache_misses_total counter
bastion_authz_cache_misses_total {}

# HELP bastion_authz_invalidated_total Cache entries dropped by invalidation
# TYPE bastion_authz_invalidated_total counter
bastion_authz_invalidated_total {}

# HELP bastion_authz_latency_seconds Evaluation latency percentiles
# TYPE bastion_authz_latency_seconds summary
bastion_authz_latency_seconds{{quantile="0.5"}} {}
bastion_authz_latency_seconds{{quantile="0.9"}} {}
bastion_authz_latency_seconds{{quantile="0.99"}} {}

# HELP bastion_authz_errors_total Evaluations failed by infrastructure errors
# TYPE bastion_authz_errors_total counter
bastion_authz_errors_total {}
"#,
            metrics.total_evaluations,
            metrics.allowed_decisions,
            metrics.denied_decisions,
            metrics.cache_hits,
            metrics.cache_misses,
            metrics.invalidated_entries,
            metrics.latency_p50_ms / 1000.0,
            metrics.latency_p90_ms / 1000.0,
            metrics.latency_p99_ms / 1000.0,
            metrics.error_count,
        )
    }

    fn percentile(sorted: &[f64], p: f64) -> f64 {
        if sorted.is_empty() {
            return 0.0;
        }

        let idx = ((sorted.len() as f64) * p) as usize;
        sorted[idx.min(sorted.len() - 1)]
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_record_decision() {
        let collector = MetricsCollector::new();

        collector.record_decision(true, false).await;
        collector.record_decision(false, false).await;
        collector.record_decision(true, true).await;

        let metrics = collector.snapshot().await;
        assert_eq!(metrics.total_evaluations, 3);
        assert_eq!(metrics.allowed_decisions, 2);
        assert_eq!(metrics.denied_decisions, 1);
        assert_eq!(metrics.conditional_grants, 1);
    }

    #[tokio::test]
    async fn test_record_cache() {
        let collector = MetricsCollector::new();

        collector.record_cache_hit().await;
        collector.record_cache_hit().await;
        collector.record_cache_miss().await;

        let metrics = collector.snapshot().await;
        assert_eq!(metrics.cache_hits, 2);
        assert!((metrics.cache_hit_rate() - 0.666).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_record_latency() {
        let collector = MetricsCollector::new();

        collector.record_latency(Duration::from_millis(5)).await;
        collector.record_latency(Duration::from_millis(10)).await;
        collector.record_latency(Duration::from_millis(15)).await;

        let metrics = collector.snapshot().await;
        assert!((metrics.avg_latency_ms - 10.0).abs() < 1.0);
        assert!(metrics.latency_p50_ms > 0.0);
        assert!(metrics.latency_p99_ms >= metrics.latency_p50_ms);
    }

    #[tokio::test]
    async fn test_sample_window_is_bounded() {
        let collector = MetricsCollector::with_max_samples(20);
        for i in 0..100 {
            collector.record_latency(Duration::from_millis(i)).await;
        }
        assert!(collector.latency_samples.read().await.len() <= 20);
    }

    #[tokio::test]
    async fn test_prometheus_export() {
        let collector = MetricsCollector::new();

        collector.record_decision(true, false).await;
        collector.record_invalidation(3).await;

        let prometheus = collector.export_prometheus().await;
        assert!(prometheus.contains("bastion_authz_evaluations_total 1"));
        assert!(prometheus.contains("bastion_authz_allowed_total 1"));
        assert!(prometheus.contains("bastion_authz_invalidated_total 3"));
    }

    #[tokio::test]
    async fn test_reset() {
        let collector = MetricsCollector::new();

        collector.record_decision(true, false).await;
        collector.record_error().await;
        collector.reset().await;

        assert_eq!(collector.snapshot().await, EngineMetrics::default());
    }
}
