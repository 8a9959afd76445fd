//! Per-user risk profile

use crate::types::alert::RiskLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Running aggregate of a user's transaction risk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRiskProfile {
    pub user_id: String,

    /// Number of transactions folded in
    pub total_transactions: u64,

    /// Exact arithmetic mean of all folded scores
    pub average_risk_score: f64,

    /// Transactions that counted as high risk
    pub high_risk_transaction_count: u64,

    /// Wall-clock time of the most recent fold
    pub last_transaction_time: Option<DateTime<Utc>>,

    /// Band of `average_risk_score`
    pub user_risk_level: RiskLevel,

    pub is_flagged: bool,

    /// Optimistic concurrency token, bumped on every committed fold
    #[serde(default)]
    pub version: u64,
}

impl UserRiskProfile {
    /// Profile of a user with no folded transactions.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            total_transactions: 0,
            average_risk_score: 0.0,
            high_risk_transaction_count: 0,
            last_transaction_time: None,
            user_risk_level: RiskLevel::Low,
            is_flagged: false,
            version: 0,
        }
    }
}
