//! Performance metrics and statistics tracking for the evaluation pipeline.

use crate::types::RiskLevel;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Metrics collector for pipeline performance
pub struct PipelineMetrics {
    /// Submissions scored and committed
    pub transactions_evaluated: AtomicU64,
    /// Submissions rejected as already processed
    pub duplicates_rejected: AtomicU64,
    /// Submissions that failed for any other reason
    pub submissions_failed: AtomicU64,
    /// Users that became flagged
    pub users_flagged: AtomicU64,
    /// Verdicts by risk level
    verdicts_by_level: RwLock<HashMap<RiskLevel, u64>>,
    /// Failures by error kind
    failures_by_kind: RwLock<HashMap<&'static str, u64>>,
    /// Processing times (in microseconds)
    processing_times: RwLock<Vec<u64>>,
    /// Risk score distribution buckets
    score_buckets: RwLock<[u64; 10]>,
    /// Start time for rate calculation
    start_time: Instant,
}

impl PipelineMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            transactions_evaluated: AtomicU64::new(0),
            duplicates_rejected: AtomicU64::new(0),
            submissions_failed: AtomicU64::new(0),
            users_flagged: AtomicU64::new(0),
            verdicts_by_level: RwLock::new(HashMap::new()),
            failures_by_kind: RwLock::new(HashMap::new()),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            score_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record an evaluated transaction
    pub fn record_evaluation(&self, processing_time: Duration, risk_score: f64, level: RiskLevel) {
        self.transactions_evaluated.fetch_add(1, Ordering::Relaxed);
        self.record_latency(processing_time);

        let bucket = ((risk_score * 10.0).max(0.0) as usize).min(9);
        if let Ok(mut buckets) = self.score_buckets.write() {
            buckets[bucket] += 1;
        }

        if let Ok(mut by_level) = self.verdicts_by_level.write() {
            *by_level.entry(level).or_insert(0) += 1;
        }
    }

    /// Record a rejected duplicate
    pub fn record_duplicate(&self) {
        self.duplicates_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed submission
    pub fn record_failure(&self, kind: &'static str) {
        self.submissions_failed.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut by_kind) = self.failures_by_kind.write() {
            *by_kind.entry(kind).or_insert(0) += 1;
        }
    }

    /// Record a user crossing into the flagged state
    pub fn record_flagged(&self) {
        self.users_flagged.fetch_add(1, Ordering::Relaxed);
    }

    fn record_latency(&self, processing_time: Duration) {
        if let Ok(mut times) = self.processing_times.write() {
            times.push(processing_time.as_micros() as u64);
            // Keep only last 10000 for memory efficiency
            if times.len() > 10000 {
                times.drain(0..5000);
            }
        }
    }

    /// Get processing time statistics
    pub fn get_processing_stats(&self) -> ProcessingStats {
        let mut sorted: Vec<u64> = match self.processing_times.read() {
            Ok(times) => times.clone(),
            Err(_) => return ProcessingStats::default(),
        };
        if sorted.is_empty() {
            return ProcessingStats::default();
        }
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();
        let at = |q: f64| sorted[((count as f64 * q) as usize).min(count - 1)];

        ProcessingStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: at(0.5),
            p95_us: at(0.95),
            p99_us: at(0.99),
            max_us: sorted[count - 1],
        }
    }

    /// Get current throughput (transactions per second)
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.transactions_evaluated.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Get score distribution
    pub fn get_score_distribution(&self) -> [u64; 10] {
        self.score_buckets.read().map(|b| *b).unwrap_or([0; 10])
    }

    /// Get verdicts by risk level
    pub fn get_verdicts_by_level(&self) -> HashMap<RiskLevel, u64> {
        self.verdicts_by_level
            .read()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    /// Get failures by error kind
    pub fn get_failures_by_kind(&self) -> HashMap<&'static str, u64> {
        self.failures_by_kind
            .read()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let evaluated = self.transactions_evaluated.load(Ordering::Relaxed);
        let duplicates = self.duplicates_rejected.load(Ordering::Relaxed);
        let failed = self.submissions_failed.load(Ordering::Relaxed);
        let flagged = self.users_flagged.load(Ordering::Relaxed);

        let processing = self.get_processing_stats();
        let throughput = self.get_throughput();
        let by_level = self.get_verdicts_by_level();
        let score_dist = self.get_score_distribution();

        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║              RISKWATCH PIPELINE - METRICS SUMMARY            ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Transactions Evaluated: {:>8}  │  Throughput: {:>6.1} tx/s ║",
            evaluated, throughput
        );
        info!(
            "║ Duplicates: {:>8}  │  Failures: {:>8}  │  Flagged: {:>6} ║",
            duplicates, failed, flagged
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Processing Time (μs): mean={:>5} p50={:>5} p95={:>5} p99={:>5} ║",
            processing.mean_us, processing.p50_us, processing.p95_us, processing.p99_us
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Verdicts by Risk Level:                                      ║");
        for level in [RiskLevel::Low, RiskLevel::Medium, RiskLevel::High] {
            let count = by_level.get(&level).copied().unwrap_or(0);
            let pct = if evaluated > 0 {
                (count as f64 / evaluated as f64) * 100.0
            } else {
                0.0
            };
            info!("║   {:10}: {:>6} ({:>5.1}%)                                ║", level, count, pct);
        }
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Risk Score Distribution:                                     ║");
        let total: u64 = score_dist.iter().sum();
        for (i, &count) in score_dist.iter().enumerate() {
            let pct = if total > 0 { (count as f64 / total as f64) * 100.0 } else { 0.0 };
            let bar_len = (pct / 2.0) as usize;
            let bar: String = "█".repeat(bar_len.min(20));
            info!(
                "║   {:.1}-{:.1}: {:>6} ({:>5.1}%) {}",
                i as f64 / 10.0,
                (i + 1) as f64 / 10.0,
                count,
                pct,
                bar
            );
        }
        info!("╚══════════════════════════════════════════════════════════════╝");

        let failures = self.get_failures_by_kind();
        if !failures.is_empty() {
            info!("Failures by kind:");
            for (kind, count) in &failures {
                info!("  {}: {}", kind, count);
            }
        }
    }
}

impl Default for PipelineMetrics {
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

/// Real-time metrics reporter that prints periodic summaries
pub struct MetricsReporter {
    metrics: Arc<PipelineMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<PipelineMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
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

    #[test]
    fn test_metrics_recording() {
        let metrics = PipelineMetrics::new();

        metrics.record_evaluation(Duration::from_micros(100), 0.0, RiskLevel::Low);
        metrics.record_evaluation(Duration::from_micros(200), 0.7, RiskLevel::High);
        metrics.record_evaluation(Duration::from_micros(300), 1.0, RiskLevel::High);
        metrics.record_duplicate();
        metrics.record_failure("storage");

        assert_eq!(metrics.transactions_evaluated.load(Ordering::Relaxed), 3);
        assert_eq!(metrics.duplicates_rejected.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.submissions_failed.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.get_verdicts_by_level().get(&RiskLevel::High), Some(&2));
        assert_eq!(metrics.get_failures_by_kind().get("storage"), Some(&1));

        let dist = metrics.get_score_distribution();
        assert_eq!(dist[0], 1);
        assert_eq!(dist[7], 1);
        assert_eq!(dist[9], 1);
    }

    #[test]
    fn test_processing_stats() {
        let metrics = PipelineMetrics::new();
        assert_eq!(metrics.get_processing_stats().count, 0);

        for us in 1..=100 {
            metrics.record_evaluation(Duration::from_micros(us), 0.0, RiskLevel::Low);
        }
        let stats = metrics.get_processing_stats();
        assert_eq!(stats.count, 100);
        assert_eq!(stats.max_us, 100);
        assert_eq!(stats.p50_us, 51);
    }
}
