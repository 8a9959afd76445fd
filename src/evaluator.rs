//! Rule-based transaction risk scoring.
//!
//! Scoring is a pure function of a transaction and the user's recent
//! transactions. It never touches storage; callers fetch the window.

use crate::error::{Result, RiskError};
use crate::types::alert::RiskLevel;
use crate::types::transaction::{RiskAssessment, Transaction};
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

/// Score added when the amount exceeds the threshold.
pub const AMOUNT_SIGNAL_WEIGHT: f64 = 0.3;

/// Score added when recent activity exceeds the velocity limit.
pub const VELOCITY_SIGNAL_WEIGHT: f64 = 0.4;

pub const AMOUNT_REASON: &str = "Transaction amount exceeds threshold.";
pub const VELOCITY_REASON: &str = "High transaction velocity detected.";

/// Validated scoring configuration, fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskThresholds {
    amount_threshold: f64,
    velocity_limit: u32,
    velocity_window_minutes: u32,
}

impl RiskThresholds {
    pub fn new(
        amount_threshold: f64,
        velocity_limit: u32,
        velocity_window_minutes: u32,
    ) -> Result<Self> {
        if !amount_threshold.is_finite() || amount_threshold <= 0.0 {
            return Err(RiskError::configuration(format!(
                "risk.amount_threshold must be a positive number, got {}",
                amount_threshold
            )));
        }
        if velocity_window_minutes == 0 {
            return Err(RiskError::configuration(
                "risk.velocity_window_minutes must be at least 1",
            ));
        }

        Ok(Self {
            amount_threshold,
            velocity_limit,
            velocity_window_minutes,
        })
    }

    pub fn amount_threshold(&self) -> f64 {
        self.amount_threshold
    }

    pub fn velocity_limit(&self) -> u32 {
        self.velocity_limit
    }

    pub fn velocity_window(&self) -> Duration {
        Duration::minutes(i64::from(self.velocity_window_minutes))
    }
}

/// Scoring strategy over a transaction and its recent window.
///
/// `recent` holds the user's transactions strictly after
/// `velocity_cutoff(tx)`. Implementations must return a score in [0.0, 1.0].
pub trait RiskScorer: Send + Sync {
    /// Start of the trailing window the caller should fetch for `tx`.
    fn velocity_cutoff(&self, tx: &Transaction) -> DateTime<Utc>;

    fn evaluate(&self, tx: &Transaction, recent: &[Transaction]) -> Result<RiskAssessment>;
}

/// Additive two-signal scorer: large amount (+0.3) and high velocity (+0.4).
#[derive(Debug, Clone)]
pub struct RuleBasedScorer {
    thresholds: RiskThresholds,
}

impl RuleBasedScorer {
    pub fn new(thresholds: RiskThresholds) -> Self {
        Self { thresholds }
    }

    /// Window members that count toward velocity: after the cutoff, not `tx` itself.
    fn recent_count(&self, tx: &Transaction, recent: &[Transaction]) -> usize {
        let cutoff = self.velocity_cutoff(tx);
        recent
            .iter()
            .filter(|t| t.transaction_id != tx.transaction_id && t.timestamp > cutoff)
            .count()
    }
}

impl RiskScorer for RuleBasedScorer {
    fn velocity_cutoff(&self, tx: &Transaction) -> DateTime<Utc> {
        tx.timestamp - self.thresholds.velocity_window()
    }

    fn evaluate(&self, tx: &Transaction, recent: &[Transaction]) -> Result<RiskAssessment> {
        debug!(
            transaction_id = %tx.transaction_id,
            user_id = %tx.user_id,
            amount = tx.amount,
            "Evaluating transaction risk"
        );

        if tx.user_id.trim().is_empty() {
            return Err(RiskError::invalid("Transaction userId is required"));
        }

        let mut score: f64 = 0.0;
        let mut reasons = Vec::new();

        if tx.amount > self.thresholds.amount_threshold {
            score += AMOUNT_SIGNAL_WEIGHT;
            reasons.push(AMOUNT_REASON.to_string());
            info!(
                transaction_id = %tx.transaction_id,
                amount = tx.amount,
                threshold = self.thresholds.amount_threshold,
                "High amount transaction detected"
            );
        }

        let recent_count = self.recent_count(tx, recent);
        if recent_count > self.thresholds.velocity_limit as usize {
            score += VELOCITY_SIGNAL_WEIGHT;
            reasons.push(VELOCITY_REASON.to_string());
            info!(
                transaction_id = %tx.transaction_id,
                user_id = %tx.user_id,
                recent_count,
                limit = self.thresholds.velocity_limit,
                "High velocity transaction detected"
            );
        }

        let score = score.clamp(0.0, 1.0);
        let level = RiskLevel::from_score(score);

        info!(
            transaction_id = %tx.transaction_id,
            risk_score = score,
            risk_level = %level,
            reasons = reasons.len(),
            "Risk evaluation result"
        );

        Ok(RiskAssessment {
            score,
            level,
            reasons,
        })
    }
}
