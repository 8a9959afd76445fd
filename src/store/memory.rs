//! In-process store backing both collections.

use super::{EvaluationStore, ProfileStore, StoreResult, TransactionStore};
use crate::error::StoreError;
use crate::types::{
    FlaggedQuery, Page, PageRequest, ProfileSortField, SortDirection, Transaction,
    UserRiskProfile,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

#[derive(Default)]
struct Tables {
    /// Transactions in insertion order; the index is the internal row id.
    transactions: Vec<Transaction>,
    by_transaction_id: HashMap<String, usize>,
    by_user: HashMap<String, Vec<usize>>,
    profiles: HashMap<String, UserRiskProfile>,
}

impl Tables {
    fn check_insert(&self, transaction: &Transaction) -> StoreResult<()> {
        if self.by_transaction_id.contains_key(&transaction.transaction_id) {
            return Err(StoreError::DuplicateTransaction(
                transaction.transaction_id.clone(),
            ));
        }
        Ok(())
    }

    fn check_version(&self, profile: &UserRiskProfile) -> StoreResult<()> {
        let found = self
            .profiles
            .get(&profile.user_id)
            .map(|p| p.version)
            .unwrap_or(0);
        if found != profile.version {
            return Err(StoreError::VersionConflict {
                user_id: profile.user_id.clone(),
                expected: profile.version,
                found,
            });
        }
        Ok(())
    }

    fn insert(&mut self, transaction: Transaction) -> Transaction {
        let row = self.transactions.len();
        self.by_transaction_id
            .insert(transaction.transaction_id.clone(), row);
        self.by_user
            .entry(transaction.user_id.clone())
            .or_default()
            .push(row);
        self.transactions.push(transaction.clone());
        transaction
    }

    fn write_profile(&mut self, mut profile: UserRiskProfile) -> UserRiskProfile {
        profile.version += 1;
        self.profiles.insert(profile.user_id.clone(), profile.clone());
        profile
    }

    fn user_rows(&self, user_id: &str) -> impl Iterator<Item = &Transaction> {
        self.by_user
            .get(user_id)
            .into_iter()
            .flatten()
            .map(move |&row| &self.transactions[row])
    }
}

/// Thread-safe in-memory implementation of every store trait.
///
/// Each call holds the table lock only for its own synchronous critical
/// section, so a committed evaluation is never half-visible.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    unavailable: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every call fails with `Unavailable` while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn transaction_count(&self) -> usize {
        self.tables
            .read()
            .map(|t| t.transactions.len())
            .unwrap_or_default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Tables>> {
        self.ensure_available()?;
        self.tables
            .read()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Tables>> {
        self.ensure_available()?;
        self.tables
            .write()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))
    }

    fn ensure_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store offline".to_string()));
        }
        Ok(())
    }
}

fn compare_profiles(a: &UserRiskProfile, b: &UserRiskProfile, field: ProfileSortField) -> CmpOrdering {
    match field {
        ProfileSortField::AverageRiskScore => a.average_risk_score.total_cmp(&b.average_risk_score),
        ProfileSortField::TotalTransactions => a.total_transactions.cmp(&b.total_transactions),
        ProfileSortField::HighRiskTransactionCount => a
            .high_risk_transaction_count
            .cmp(&b.high_risk_transaction_count),
        ProfileSortField::LastTransactionTime => a.last_transaction_time.cmp(&b.last_transaction_time),
        ProfileSortField::UserRiskLevel => a.user_risk_level.cmp(&b.user_risk_level),
    }
}

#[async_trait]
impl TransactionStore for InMemoryStore {
    async fn find_by_transaction_id(&self, transaction_id: &str) -> StoreResult<Option<Transaction>> {
        let tables = self.read()?;
        Ok(tables
            .by_transaction_id
            .get(transaction_id)
            .map(|&row| tables.transactions[row].clone()))
    }

    async fn find_by_user_after(
        &self,
        user_id: &str,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<Vec<Transaction>> {
        let tables = self.read()?;
        Ok(tables
            .user_rows(user_id)
            .filter(|tx| tx.timestamp > cutoff)
            .cloned()
            .collect())
    }

    async fn find_by_user(&self, user_id: &str, page: PageRequest) -> StoreResult<Page<Transaction>> {
        let tables = self.read()?;
        let mut rows: Vec<Transaction> = tables.user_rows(user_id).cloned().collect();
        // Stable sort keeps insertion order among equal timestamps.
        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(Page::from_ordered(rows, page))
    }

    async fn save(&self, transaction: Transaction) -> StoreResult<Transaction> {
        let mut tables = self.write()?;
        tables.check_insert(&transaction)?;
        Ok(tables.insert(transaction))
    }
}

#[async_trait]
impl ProfileStore for InMemoryStore {
    async fn find_profile(&self, user_id: &str) -> StoreResult<Option<UserRiskProfile>> {
        Ok(self.read()?.profiles.get(user_id).cloned())
    }

    async fn profile_exists(&self, user_id: &str) -> StoreResult<bool> {
        Ok(self.read()?.profiles.contains_key(user_id))
    }

    async fn upsert(&self, profile: UserRiskProfile) -> StoreResult<UserRiskProfile> {
        let mut tables = self.write()?;
        tables.check_version(&profile)?;
        Ok(tables.write_profile(profile))
    }

    async fn find_flagged(&self, query: &FlaggedQuery) -> StoreResult<Page<UserRiskProfile>> {
        let tables = self.read()?;
        let mut flagged: Vec<UserRiskProfile> = tables
            .profiles
            .values()
            .filter(|p| p.is_flagged)
            .cloned()
            .collect();

        flagged.sort_by(|a, b| {
            let ord = compare_profiles(a, b, query.sort_field);
            let ord = match query.direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            };
            ord.then_with(|| a.user_id.cmp(&b.user_id))
        });

        Ok(Page::from_ordered(flagged, query.page_request()))
    }
}

#[async_trait]
impl EvaluationStore for InMemoryStore {
    async fn commit_evaluation(
        &self,
        transaction: Transaction,
        profile: UserRiskProfile,
    ) -> StoreResult<(Transaction, UserRiskProfile)> {
        let mut tables = self.write()?;
        // Validate both writes before applying either.
        tables.check_insert(&transaction)?;
        tables.check_version(&profile)?;

        let transaction = tables.insert(transaction);
        let profile = tables.write_profile(profile);
        debug!(
            transaction_id = %transaction.transaction_id,
            user_id = %profile.user_id,
            version = profile.version,
            "Evaluation committed"
        );
        Ok((transaction, profile))
    }
}
