//! RiskWatch Library
//!
//! Real-time transaction risk evaluation: rule-based scoring of single
//! transactions and per-user risk profiles folded from their history.

pub mod aggregator;
pub mod clock;
pub mod config;
pub mod consumer;
pub mod error;
pub mod evaluator;
pub mod metrics;
pub mod producer;
pub mod queries;
pub mod service;
pub mod store;
pub mod types;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::AppConfig;
pub use consumer::TransactionConsumer;
pub use error::{RiskError, StoreError};
pub use evaluator::{RiskScorer, RiskThresholds, RuleBasedScorer};
pub use producer::{ResponseEnvelope, VerdictProducer};
pub use queries::{Query, QueryHandler};
pub use service::{SubmissionOutcome, TransactionService};
pub use store::{EvaluationStore, InMemoryStore};
pub use types::{
    FlaggedUserAlert, RiskLevel, Transaction, TransactionRequest, TransactionVerdict,
    UserRiskProfile,
};
