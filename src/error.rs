//! Error types for risk evaluation and profile aggregation.

use thiserror::Error;

/// Result type alias using `RiskError`.
pub type Result<T> = std::result::Result<T, RiskError>;

/// Errors surfaced to callers of the evaluation service.
#[derive(Debug, Error)]
pub enum RiskError {
    /// A required field is missing or malformed.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The transaction id has already been recorded.
    #[error("Transaction with ID '{0}' already exists")]
    DuplicateTransaction(String),

    /// Scoring configuration is missing or unusable.
    #[error("Risk configuration error: {0}")]
    Configuration(String),

    /// A store collaborator failed.
    #[error("Storage error: {0}")]
    Storage(#[source] StoreError),
}

impl RiskError {
    /// Create an invalid input error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        RiskError::InvalidInput(msg.into())
    }

    /// Create a configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        RiskError::Configuration(msg.into())
    }

    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            RiskError::InvalidInput(_) => "invalid_input",
            RiskError::DuplicateTransaction(_) => "duplicate",
            RiskError::Configuration(_) => "configuration",
            RiskError::Storage(_) => "storage",
        }
    }
}

impl From<StoreError> for RiskError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateTransaction(id) => RiskError::DuplicateTransaction(id),
            other => RiskError::Storage(other),
        }
    }
}

/// Errors raised by transaction and profile stores.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Uniqueness constraint on the transaction id was violated.
    #[error("duplicate transaction id '{0}'")]
    DuplicateTransaction(String),

    /// The profile changed between read and write.
    #[error("profile version conflict for user '{user_id}' (expected {expected}, found {found})")]
    VersionConflict {
        /// User whose profile was contended.
        user_id: String,
        /// Version the writer read.
        expected: u64,
        /// Version currently stored.
        found: u64,
    },

    /// The backing store could not serve the request.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_store_error_maps_to_duplicate() {
        let err: RiskError = StoreError::DuplicateTransaction("tx_1".to_string()).into();
        assert!(matches!(err, RiskError::DuplicateTransaction(ref id) if id == "tx_1"));
        assert_eq!(err.to_string(), "Transaction with ID 'tx_1' already exists");
    }

    #[test]
    fn test_other_store_errors_map_to_storage() {
        let err: RiskError = StoreError::Unavailable("down".to_string()).into();
        assert_eq!(err.kind(), "storage");

        let err: RiskError = StoreError::VersionConflict {
            user_id: "u1".to_string(),
            expected: 1,
            found: 2,
        }
        .into();
        assert!(matches!(err, RiskError::Storage(StoreError::VersionConflict { .. })));
    }
}
