//! Transaction evaluation service.
//!
//! Composes the duplicate check, scoring, persistence and profile fold for
//! one submission, and exposes the read paths over transactions and profiles.

use crate::aggregator::ProfileAggregator;
use crate::clock::Clock;
use crate::error::{Result, RiskError};
use crate::evaluator::RiskScorer;
use crate::store::{EvaluationStore, ProfileStore, TransactionStore};
use crate::types::{
    FlaggedQuery, Page, PageRequest, Transaction, TransactionRequest, UserRiskProfile,
};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Result of a successful submission.
#[derive(Debug, Clone)]
pub struct SubmissionOutcome {
    /// The persisted, scored transaction
    pub transaction: Transaction,
    /// The user's profile after the fold
    pub profile: UserRiskProfile,
    /// True when this fold moved the user from unflagged to flagged
    pub newly_flagged: bool,
}

/// Evaluates transactions and maintains user risk profiles.
pub struct TransactionService {
    store: Arc<dyn EvaluationStore>,
    scorer: Arc<dyn RiskScorer>,
    aggregator: ProfileAggregator,
    clock: Arc<dyn Clock>,
}

impl TransactionService {
    pub fn new(
        store: Arc<dyn EvaluationStore>,
        scorer: Arc<dyn RiskScorer>,
        clock: Arc<dyn Clock>,
        fold_retries: u32,
    ) -> Self {
        Self {
            store,
            scorer,
            aggregator: ProfileAggregator::new(clock.clone(), fold_retries),
            clock,
        }
    }

    pub fn aggregator(&self) -> &ProfileAggregator {
        &self.aggregator
    }

    /// Evaluate a transaction, persist it and fold it into the user's profile.
    ///
    /// The transaction and its profile fold are committed together. A
    /// resubmitted id fails with `DuplicateTransaction` and changes nothing.
    #[instrument(skip(self, request), fields(transaction_id = %request.transaction_id, user_id = %request.user_id))]
    pub async fn submit(&self, request: TransactionRequest) -> Result<SubmissionOutcome> {
        info!(amount = ?request.amount, "Evaluating transaction");
        request.validate()?;

        if self
            .store
            .find_by_transaction_id(&request.transaction_id)
            .await?
            .is_some()
        {
            warn!("Duplicate transaction ID detected");
            return Err(RiskError::DuplicateTransaction(request.transaction_id));
        }

        let tx = request.into_transaction(self.clock.now())?;

        // Window read, scoring and fold for one user run under its lock.
        let _guard = self.aggregator.lock_user(&tx.user_id).await;

        let cutoff = self.scorer.velocity_cutoff(&tx);
        let recent: Vec<Transaction> = self
            .store
            .find_by_user_after(&tx.user_id, cutoff)
            .await?
            .into_iter()
            .filter(|t| t.transaction_id != tx.transaction_id)
            .collect();

        let assessment = self.scorer.evaluate(&tx, &recent)?;
        debug!(
            risk_score = assessment.score,
            risk_level = %assessment.level,
            reasons = ?assessment.reasons,
            recent = recent.len(),
            "Risk evaluation completed"
        );
        let tx = tx.with_assessment(assessment);

        let store = self.store.as_ref();
        let folded = self
            .aggregator
            .fold(store, &tx.user_id, tx.risk_score, tx.risk_level, |profile| {
                store.commit_evaluation(tx.clone(), profile)
            })
            .await
            .inspect_err(|e| {
                if let RiskError::DuplicateTransaction(_) = e {
                    warn!("Duplicate transaction ID detected at commit");
                }
            })?;

        let (transaction, profile) = folded.committed;
        if folded.newly_flagged {
            warn!(
                average_risk_score = profile.average_risk_score,
                high_risk_transactions = profile.high_risk_transaction_count,
                user_risk_level = %profile.user_risk_level,
                "User flagged"
            );
        }
        info!(
            risk_level = %transaction.risk_level,
            risk_score = transaction.risk_score,
            total_transactions = profile.total_transactions,
            "Transaction evaluation completed"
        );

        Ok(SubmissionOutcome {
            transaction,
            profile,
            newly_flagged: folded.newly_flagged,
        })
    }

    /// The user's transactions, newest first.
    #[instrument(skip(self))]
    pub async fn list_for_user(&self, user_id: &str, page: u32, size: u32) -> Result<Page<Transaction>> {
        if user_id.trim().is_empty() {
            return Err(RiskError::invalid("userId is required"));
        }
        let request = PageRequest::new(page, size);
        request.validate()?;

        let transactions = self.store.find_by_user(user_id, request).await?;
        debug!(
            found = transactions.content.len(),
            total_pages = transactions.total_pages,
            "Fetched user transactions"
        );
        Ok(transactions)
    }

    /// Latest profile for `user_id`, if the user has any folded transactions.
    pub async fn get_profile(&self, user_id: &str) -> Result<Option<UserRiskProfile>> {
        Ok(self.store.find_profile(user_id).await?)
    }

    /// Flagged profiles, sorted and paged.
    #[instrument(skip(self))]
    pub async fn list_flagged(&self, query: FlaggedQuery) -> Result<Page<UserRiskProfile>> {
        query.page_request().validate()?;
        Ok(self.store.find_flagged(&query).await?)
    }
}
