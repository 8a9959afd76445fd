//! Risk levels and flagged-user alerts

use crate::types::profile::UserRiskProfile;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lower bound (inclusive) of the MEDIUM band.
pub const MEDIUM_RISK_FLOOR: f64 = 0.4;

/// Lower bound (inclusive) of the HIGH band.
pub const HIGH_RISK_FLOOR: f64 = 0.7;

/// Risk level classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    #[serde(alias = "low")]
    Low,
    #[serde(alias = "medium")]
    Medium,
    #[serde(alias = "high")]
    High,
}

impl RiskLevel {
    /// Band a score: below 0.4 is LOW, below 0.7 is MEDIUM, otherwise HIGH.
    ///
    /// Used for both single transactions and a profile's running average.
    pub fn from_score(score: f64) -> Self {
        if score >= HIGH_RISK_FLOOR {
            RiskLevel::High
        } else if score >= MEDIUM_RISK_FLOOR {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
        })
    }
}

/// Alert raised when a user's profile becomes flagged
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlaggedUserAlert {
    /// Unique alert identifier
    pub alert_id: String,

    /// Flagged user
    pub user_id: String,

    /// Transaction whose fold caused the flag
    pub transaction_id: String,

    /// Running mean of the user's scores
    pub average_risk_score: f64,

    /// High-risk transactions seen so far
    pub high_risk_transaction_count: u64,

    /// Band of the running mean
    pub user_risk_level: RiskLevel,

    /// Transactions folded so far
    pub total_transactions: u64,

    /// Alert generation timestamp
    pub timestamp: DateTime<Utc>,
}

impl FlaggedUserAlert {
    /// Build an alert from the profile that just became flagged.
    pub fn new(profile: &UserRiskProfile, transaction_id: impl Into<String>) -> Self {
        Self {
            alert_id: uuid::Uuid::new_v4().to_string(),
            user_id: profile.user_id.clone(),
            transaction_id: transaction_id.into(),
            average_risk_score: profile.average_risk_score,
            high_risk_transaction_count: profile.high_risk_transaction_count,
            user_risk_level: profile.user_risk_level,
            total_transactions: profile.total_transactions,
            timestamp: profile.last_transaction_time.unwrap_or_else(Utc::now),
        }
    }
}
