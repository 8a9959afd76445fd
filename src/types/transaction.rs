//! Transaction data structures for risk evaluation

use crate::error::{Result, RiskError};
use crate::types::alert::RiskLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Incoming request to evaluate a transaction.
///
/// Every field is tolerant at decode time so that missing values surface
/// as `InvalidInput` from validation rather than as a decode failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionRequest {
    /// Externally supplied, globally unique identifier
    #[serde(default, alias = "transactionId")]
    pub transaction_id: String,

    /// Owner of the transaction
    #[serde(default, alias = "userId")]
    pub user_id: String,

    /// Transaction amount, must be positive
    #[serde(default)]
    pub amount: Option<f64>,

    /// Event time; evaluation time is used when omitted
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,

    /// Free-form device tag
    #[serde(default, alias = "deviceId")]
    pub device_id: Option<String>,

    /// Free-form location tag
    #[serde(default)]
    pub location: Option<String>,
}

impl TransactionRequest {
    /// Create a request with the required fields set.
    pub fn new(transaction_id: impl Into<String>, user_id: impl Into<String>, amount: f64) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            user_id: user_id.into(),
            amount: Some(amount),
            ..Default::default()
        }
    }

    /// Set the event timestamp.
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Attach device and location tags.
    pub fn with_tags(mut self, device_id: Option<String>, location: Option<String>) -> Self {
        self.device_id = device_id;
        self.location = location;
        self
    }

    /// Check presence and shape of the required fields.
    pub fn validate(&self) -> Result<()> {
        if self.transaction_id.trim().is_empty() {
            return Err(RiskError::invalid("transactionId is required"));
        }
        if self.user_id.trim().is_empty() {
            return Err(RiskError::invalid("userId is required"));
        }
        match self.amount {
            None => Err(RiskError::invalid("amount is required")),
            Some(amount) if !amount.is_finite() || amount <= 0.0 => Err(RiskError::invalid(
                format!("amount must be a positive number, got {}", amount),
            )),
            Some(_) => Ok(()),
        }
    }

    /// Validate and materialize an unscored transaction.
    pub fn into_transaction(self, now: DateTime<Utc>) -> Result<Transaction> {
        self.validate()?;
        let amount = self
            .amount
            .ok_or_else(|| RiskError::invalid("amount is required"))?;

        Ok(Transaction {
            transaction_id: self.transaction_id,
            user_id: self.user_id,
            amount,
            timestamp: self.timestamp.unwrap_or(now),
            device_id: self.device_id,
            location: self.location,
            risk_score: 0.0,
            risk_level: RiskLevel::Low,
            reasons: Vec::new(),
        })
    }
}

/// Outcome of scoring one transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Risk score in [0.0, 1.0]
    pub score: f64,
    /// Band derived from the score
    pub level: RiskLevel,
    /// Human-readable findings, in detection order
    pub reasons: Vec<String>,
}

/// An evaluated transaction. Immutable once persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: String,
    pub user_id: String,
    pub amount: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub reasons: Vec<String>,
}

impl Transaction {
    /// Attach a scoring result.
    pub fn with_assessment(mut self, assessment: RiskAssessment) -> Self {
        self.risk_score = assessment.score;
        self.risk_level = assessment.level;
        self.reasons = assessment.reasons;
        self
    }
}

/// Verdict returned to the submitter and published downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionVerdict {
    pub transaction_id: String,
    pub user_id: String,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub reasons: Vec<String>,
    pub evaluated_at: DateTime<Utc>,
}

impl TransactionVerdict {
    pub fn from_transaction(tx: &Transaction, evaluated_at: DateTime<Utc>) -> Self {
        Self {
            transaction_id: tx.transaction_id.clone(),
            user_id: tx.user_id.clone(),
            risk_score: tx.risk_score,
            risk_level: tx.risk_level,
            reasons: tx.reasons.clone(),
            evaluated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_request_accepts_camel_case_fields() {
        let json = r#"{
            "transactionId": "tx_123",
            "userId": "user_1",
            "amount": 250.5,
            "deviceId": "ios-42"
        }"#;

        let request: TransactionRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.transaction_id, "tx_123");
        assert_eq!(request.user_id, "user_1");
        assert_eq!(request.amount, Some(250.5));
        assert_eq!(request.device_id.as_deref(), Some("ios-42"));
        assert!(request.timestamp.is_none());
    }

    #[test]
    fn test_validation_rejects_missing_fields() {
        let missing_user = TransactionRequest::new("tx_1", " ", 10.0);
        assert!(matches!(missing_user.validate(), Err(RiskError::InvalidInput(_))));

        let missing_id = TransactionRequest::new("", "user_1", 10.0);
        assert!(matches!(missing_id.validate(), Err(RiskError::InvalidInput(_))));

        let mut missing_amount = TransactionRequest::new("tx_1", "user_1", 10.0);
        missing_amount.amount = None;
        assert!(matches!(missing_amount.validate(), Err(RiskError::InvalidInput(_))));
    }

    #[test]
    fn test_validation_rejects_non_positive_amount() {
        for amount in [0.0, -5.0, f64::NAN] {
            let request = TransactionRequest::new("tx_1", "user_1", amount);
            assert!(matches!(request.validate(), Err(RiskError::InvalidInput(_))));
        }
    }

    #[test]
    fn test_timestamp_defaults_to_now() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let earlier = now - chrono::Duration::minutes(5);

        let tx = TransactionRequest::new("tx_1", "user_1", 10.0)
            .into_transaction(now)
            .unwrap();
        assert_eq!(tx.timestamp, now);
        assert_eq!(tx.risk_level, RiskLevel::Low);
        assert!(tx.reasons.is_empty());

        let tx = TransactionRequest::new("tx_2", "user_1", 10.0)
            .at(earlier)
            .into_transaction(now)
            .unwrap();
        assert_eq!(tx.timestamp, earlier);
    }
}
