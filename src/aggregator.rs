//! Per-user risk profile aggregation.
//!
//! Each scored transaction is folded into its user's running profile with a
//! read-modify-write. Folds for one user are serialized through
//! [`KeyedLocks`]; the store's version check catches writers outside this
//! process.

use crate::clock::Clock;
use crate::error::{Result, RiskError, StoreError};
use crate::store::{ProfileStore, StoreResult};
use crate::types::{RiskLevel, UserRiskProfile};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

/// A transaction scoring at or above this counts as high risk regardless of level.
pub const HIGH_RISK_SCORE_FLOOR: f64 = 0.8;

/// High-risk transactions after which a user is flagged.
pub const FLAG_HIGH_RISK_COUNT: u64 = 5;

/// Whether a transaction counts toward `high_risk_transaction_count`.
///
/// Both the level check and the 0.8 score check apply.
pub fn is_high_risk(score: f64, level: RiskLevel) -> bool {
    level == RiskLevel::High || score >= HIGH_RISK_SCORE_FLOOR
}

/// Fold one score into a profile.
///
/// `current` is the stored profile, or `None` for a user's first
/// transaction. The returned profile keeps `current`'s version so the
/// store can detect concurrent writers.
pub fn fold_profile(
    current: Option<UserRiskProfile>,
    user_id: &str,
    score: f64,
    level: RiskLevel,
    now: DateTime<Utc>,
) -> UserRiskProfile {
    let mut profile = current.unwrap_or_else(|| UserRiskProfile::new(user_id));

    let previous_total = profile.total_transactions;
    let total = previous_total + 1;
    let average =
        (profile.average_risk_score * previous_total as f64 + score) / total as f64;

    if is_high_risk(score, level) {
        profile.high_risk_transaction_count += 1;
    }

    profile.total_transactions = total;
    profile.average_risk_score = average;
    profile.user_risk_level = RiskLevel::from_score(average);
    profile.is_flagged = profile.user_risk_level == RiskLevel::High
        || profile.high_risk_transaction_count >= FLAG_HIGH_RISK_COUNT;
    profile.last_transaction_time = Some(now);
    profile
}

/// One async mutex per key, created on demand.
#[derive(Default)]
pub struct KeyedLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`.
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let mutex = self
            .locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        mutex.lock_owned().await
    }

    /// Drop locks nobody holds or waits on.
    pub fn prune_idle(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
        before - self.locks.len()
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Maintains per-user risk profiles.
pub struct ProfileAggregator {
    locks: KeyedLocks,
    clock: Arc<dyn Clock>,
    max_retries: u32,
}

impl ProfileAggregator {
    pub fn new(clock: Arc<dyn Clock>, max_retries: u32) -> Self {
        Self {
            locks: KeyedLocks::new(),
            clock,
            max_retries,
        }
    }

    /// Serialize work on one user's profile.
    pub async fn lock_user(&self, user_id: &str) -> OwnedMutexGuard<()> {
        self.locks.lock(user_id).await
    }

    pub fn locks(&self) -> &KeyedLocks {
        &self.locks
    }

    /// Fold using the aggregator's clock for `last_transaction_time`.
    pub fn apply(
        &self,
        current: Option<UserRiskProfile>,
        user_id: &str,
        score: f64,
        level: RiskLevel,
    ) -> UserRiskProfile {
        fold_profile(current, user_id, score, level, self.clock.now())
    }

    /// Load, fold and commit a user's profile.
    ///
    /// `commit` receives the folded profile, still carrying the version it was
    /// read at, and writes it together with whatever else belongs to the same
    /// unit. A `VersionConflict` re-reads and re-folds, up to `max_retries`
    /// times. The caller holds [`ProfileAggregator::lock_user`] for `user_id`.
    pub async fn fold<S, F, Fut, T>(
        &self,
        store: &S,
        user_id: &str,
        score: f64,
        level: RiskLevel,
        mut commit: F,
    ) -> Result<Folded<T>>
    where
        S: ProfileStore + ?Sized,
        F: FnMut(UserRiskProfile) -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let mut attempt = 0;
        loop {
            let current = store.find_profile(user_id).await?;
            let was_flagged = current.as_ref().map(|p| p.is_flagged).unwrap_or(false);
            let folded = self.apply(current, user_id, score, level);
            let (total, average, flagged) = (
                folded.total_transactions,
                folded.average_risk_score,
                folded.is_flagged,
            );

            match commit(folded).await {
                Ok(committed) => {
                    debug!(
                        user_id = %user_id,
                        total_transactions = total,
                        average_risk_score = average,
                        flagged,
                        "User risk profile updated"
                    );
                    return Ok(Folded {
                        committed,
                        newly_flagged: !was_flagged && flagged,
                    });
                }
                Err(conflict @ StoreError::VersionConflict { .. }) => {
                    if attempt >= self.max_retries {
                        return Err(RiskError::Storage(conflict));
                    }
                    attempt += 1;
                    warn!(user_id = %user_id, attempt, "Profile version conflict, retrying fold");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Result of a committed fold.
#[derive(Debug, Clone)]
pub struct Folded<T> {
    /// Whatever the commit step returned
    pub committed: T,
    /// True when this fold moved the user from unflagged to flagged
    pub newly_flagged: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::store::InMemoryStore;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_first_fold_creates_profile() {
        let profile = fold_profile(None, "u1", 0.3, RiskLevel::Low, now());

        assert_eq!(profile.user_id, "u1");
        assert_eq!(profile.total_transactions, 1);
        assert!((profile.average_risk_score - 0.3).abs() < 1e-12);
        assert_eq!(profile.high_risk_transaction_count, 0);
        assert_eq!(profile.user_risk_level, RiskLevel::Low);
        assert!(!profile.is_flagged);
        assert_eq!(profile.last_transaction_time, Some(now()));
        assert_eq!(profile.version, 0);
    }

    #[test]
    fn test_average_is_exact_mean() {
        let scores = [0.0, 0.3, 0.7, 0.4, 0.0, 0.7, 0.3, 1.0, 0.4];
        let mut profile = None;
        for (i, &score) in scores.iter().enumerate() {
            let folded = fold_profile(
                profile,
                "u1",
                score,
                RiskLevel::from_score(score),
                now() + Duration::seconds(i as i64),
            );
            let expected = scores[..=i].iter().sum::<f64>() / (i + 1) as f64;
            assert!((folded.average_risk_score - expected).abs() < 1e-9);
            assert_eq!(folded.total_transactions, (i + 1) as u64);
            profile = Some(folded);
        }
    }

    #[test]
    fn test_high_risk_uses_level_or_score() {
        assert!(is_high_risk(0.7, RiskLevel::High));
        assert!(is_high_risk(0.85, RiskLevel::Medium));
        assert!(is_high_risk(0.8, RiskLevel::Low));
        assert!(!is_high_risk(0.79, RiskLevel::Medium));
        assert!(!is_high_risk(0.4, RiskLevel::Medium));
    }

    #[test]
    fn test_flag_at_fifth_high_risk_transaction() {
        // Alternate HIGH folds with zero scores so the average stays below 0.7.
        let mut profile = None;
        let mut flags = Vec::new();
        for _ in 0..5 {
            let p = fold_profile(profile, "u1", 0.0, RiskLevel::Low, now());
            let p = fold_profile(Some(p), "u1", 0.7, RiskLevel::High, now());
            flags.push((p.high_risk_transaction_count, p.is_flagged));
            assert_ne!(p.user_risk_level, RiskLevel::High);
            profile = Some(p);
        }

        assert_eq!(flags[3], (4, false));
        assert_eq!(flags[4], (5, true));
    }

    #[test]
    fn test_flag_by_high_average() {
        let profile = fold_profile(None, "u1", 0.85, RiskLevel::High, now());
        assert_eq!(profile.user_risk_level, RiskLevel::High);
        assert!(profile.is_flagged);
        assert_eq!(profile.high_risk_transaction_count, 1);
    }

    #[test]
    fn test_flag_clears_when_average_drops() {
        let profile = fold_profile(None, "u1", 0.85, RiskLevel::High, now());
        let profile = fold_profile(Some(profile), "u1", 0.0, RiskLevel::Low, now());
        assert_eq!(profile.user_risk_level, RiskLevel::Medium);
        assert!(!profile.is_flagged);
    }

    #[tokio::test]
    async fn test_fold_persists_with_supplied_clock() {
        let store = InMemoryStore::new();
        let clock = Arc::new(FixedClock::new(now()));
        let aggregator = ProfileAggregator::new(clock.clone(), 3);

        aggregator
            .fold(&store, "u1", 0.4, RiskLevel::Medium, |p| store.upsert(p))
            .await
            .unwrap();
        clock.advance(Duration::minutes(5));
        let saved = aggregator
            .fold(&store, "u1", 0.0, RiskLevel::Low, |p| store.upsert(p))
            .await
            .unwrap()
            .committed;

        assert_eq!(saved.total_transactions, 2);
        assert!((saved.average_risk_score - 0.2).abs() < 1e-12);
        assert_eq!(saved.last_transaction_time, Some(now() + Duration::minutes(5)));
        assert_eq!(saved.version, 2);
        assert_eq!(store.find_profile("u1").await.unwrap(), Some(saved));
    }

    #[tokio::test]
    async fn test_concurrent_folds_do_not_lose_updates() {
        let store = Arc::new(InMemoryStore::new());
        let aggregator = Arc::new(ProfileAggregator::new(Arc::new(FixedClock::new(now())), 0));

        let mut handles = Vec::new();
        for i in 0..64 {
            let store = store.clone();
            let aggregator = aggregator.clone();
            handles.push(tokio::spawn(async move {
                let score = if i % 2 == 0 { 0.7 } else { 0.0 };
                let _guard = aggregator.lock_user("u1").await;
                aggregator
                    .fold(store.as_ref(), "u1", score, RiskLevel::from_score(score), |p| {
                        store.upsert(p)
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let profile = store.find_profile("u1").await.unwrap().unwrap();
        assert_eq!(profile.total_transactions, 64);
        assert_eq!(profile.high_risk_transaction_count, 32);
        assert!((profile.average_risk_score - 0.35).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_fold_refolds_after_version_conflict() {
        let store = InMemoryStore::new();
        let aggregator = ProfileAggregator::new(Arc::new(FixedClock::new(now())), 3);
        let mut attempts = 0;

        let folded = aggregator
            .fold(&store, "u1", 0.7, RiskLevel::High, |p| {
                attempts += 1;
                let first = attempts == 1;
                let store = &store;
                async move {
                    if first {
                        // Another writer lands between our read and our write.
                        let outside = fold_profile(None, "u1", 0.2, RiskLevel::Low, now());
                        store.upsert(outside).await.unwrap();
                    }
                    store.upsert(p).await
                }
            })
            .await
            .unwrap();

        assert_eq!(attempts, 2);
        assert_eq!(folded.committed.total_transactions, 2);
        assert!((folded.committed.average_risk_score - 0.45).abs() < 1e-12);
        assert_eq!(folded.committed.high_risk_transaction_count, 1);
        assert!(!folded.newly_flagged);
    }

    #[tokio::test]
    async fn test_fold_gives_up_after_max_retries() {
        let store = InMemoryStore::new();
        let aggregator = ProfileAggregator::new(Arc::new(FixedClock::new(now())), 2);
        let mut attempts = 0;

        let err = aggregator
            .fold(&store, "u1", 0.1, RiskLevel::Low, |p| {
                attempts += 1;
                async move {
                    Err::<UserRiskProfile, _>(StoreError::VersionConflict {
                        user_id: p.user_id,
                        expected: p.version,
                        found: p.version + 1,
                    })
                }
            })
            .await
            .unwrap_err();

        assert_eq!(attempts, 3);
        assert!(matches!(err, RiskError::Storage(StoreError::VersionConflict { .. })));
    }

    #[tokio::test]
    async fn test_fold_surfaces_storage_errors() {
        let store = InMemoryStore::new();
        store.set_unavailable(true);
        let aggregator = ProfileAggregator::new(Arc::new(FixedClock::new(now())), 3);

        let err = aggregator
            .fold(&store, "u1", 0.1, RiskLevel::Low, |p| store.upsert(p))
            .await
            .unwrap_err();
        assert!(matches!(err, RiskError::Storage(StoreError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_prune_idle_locks() {
        let locks = KeyedLocks::new();
        {
            let _a = locks.lock("a").await;
            let _b = locks.lock("b").await;
            assert_eq!(locks.prune_idle(), 0);
            assert_eq!(locks.len(), 2);
        }
        assert_eq!(locks.prune_idle(), 2);
        assert!(locks.is_empty());
    }
}
