//! Storage collaborators for transactions and risk profiles.
//!
//! The evaluation path only depends on these traits. `InMemoryStore` is the
//! reference implementation used by the service binary and the tests.

pub mod memory;

pub use memory::InMemoryStore;

use crate::error::StoreError;
use crate::types::{FlaggedQuery, Page, PageRequest, Transaction, UserRiskProfile};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Durable collection of evaluated transactions, unique by transaction id.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn find_by_transaction_id(&self, transaction_id: &str) -> StoreResult<Option<Transaction>>;

    /// All of the user's transactions with `timestamp > cutoff`.
    async fn find_by_user_after(
        &self,
        user_id: &str,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<Vec<Transaction>>;

    /// The user's transactions, newest first. Equal timestamps keep insertion order.
    async fn find_by_user(&self, user_id: &str, page: PageRequest) -> StoreResult<Page<Transaction>>;

    /// Insert a new transaction. Fails with `DuplicateTransaction` if the id exists.
    async fn save(&self, transaction: Transaction) -> StoreResult<Transaction>;
}

/// Key-value collection of per-user profiles.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn find_profile(&self, user_id: &str) -> StoreResult<Option<UserRiskProfile>>;

    async fn profile_exists(&self, user_id: &str) -> StoreResult<bool>;

    /// Write `profile` if the stored version still equals `profile.version`
    /// (0 when absent). The returned profile carries the bumped version.
    async fn upsert(&self, profile: UserRiskProfile) -> StoreResult<UserRiskProfile>;

    async fn find_flagged(&self, query: &FlaggedQuery) -> StoreResult<Page<UserRiskProfile>>;
}

/// Store able to record a scored transaction and its profile fold as one unit.
#[async_trait]
pub trait EvaluationStore: TransactionStore + ProfileStore {
    /// Insert `transaction` and upsert `profile` atomically.
    ///
    /// Either both writes become visible or neither does. Conflicts are
    /// reported as `DuplicateTransaction` or `VersionConflict`.
    async fn commit_evaluation(
        &self,
        transaction: Transaction,
        profile: UserRiskProfile,
    ) -> StoreResult<(Transaction, UserRiskProfile)>;
}
