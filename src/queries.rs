//! Request/reply read path over NATS.
//!
//! Each request is a JSON object tagged by `query`:
//!
//! ```json
//! {"query": "health"}
//! {"query": "profile", "user_id": "u1"}
//! {"query": "user_transactions", "user_id": "u1", "page": 0, "size": 20}
//! {"query": "flagged", "page": 0, "size": 20, "sort_field": "average_risk_score", "direction": "DESC"}
//! ```

use crate::clock::Clock;
use crate::producer::ResponseEnvelope;
use crate::service::TransactionService;
use crate::types::{FlaggedQuery, PageRequest};
use anyhow::Result;
use async_nats::Client;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Supported read queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "query", rename_all = "snake_case")]
pub enum Query {
    Health,
    Profile {
        #[serde(alias = "userId")]
        user_id: String,
    },
    UserTransactions {
        #[serde(alias = "userId")]
        user_id: String,
        #[serde(default)]
        page: u32,
        #[serde(default = "default_size")]
        size: u32,
    },
    Flagged(FlaggedQuery),
}

fn default_size() -> u32 {
    PageRequest::default().size
}

/// Answers read queries against the evaluation service
pub struct QueryHandler {
    service: Arc<TransactionService>,
    clock: Arc<dyn Clock>,
}

impl QueryHandler {
    pub fn new(service: Arc<TransactionService>, clock: Arc<dyn Clock>) -> Self {
        Self { service, clock }
    }

    /// Decode and answer one request payload.
    pub async fn handle(&self, payload: &[u8]) -> ResponseEnvelope<Value> {
        let now = self.clock.now();
        let query: Query = match serde_json::from_slice(payload) {
            Ok(query) => query,
            Err(e) => return ResponseEnvelope::error(format!("Invalid query: {}", e), now),
        };
        debug!(?query, "Handling query");

        match self.answer(query).await {
            Ok(envelope) => envelope,
            Err(e) => ResponseEnvelope::error(e.to_string(), now),
        }
    }

    async fn answer(&self, query: Query) -> crate::error::Result<ResponseEnvelope<Value>> {
        let now = self.clock.now();
        let envelope = match query {
            Query::Health => ResponseEnvelope::success(
                Value::String(format!("RiskWatch is up and running at {}", now.to_rfc3339())),
                "Health check passed",
                now,
            ),
            Query::Profile { user_id } => match self.service.get_profile(&user_id).await? {
                Some(profile) => ResponseEnvelope::success(
                    to_value(&profile),
                    "User risk profile retrieved successfully.",
                    now,
                ),
                None => ResponseEnvelope::error(format!("User not found: {}", user_id), now),
            },
            Query::UserTransactions {
                user_id,
                page,
                size,
            } => {
                let transactions = self.service.list_for_user(&user_id, page, size).await?;
                ResponseEnvelope::success(
                    to_value(&transactions),
                    format!("Transactions retrieved successfully for user: {}", user_id),
                    now,
                )
            }
            Query::Flagged(query) => {
                let flagged = self.service.list_flagged(query).await?;
                let message = if flagged.total_elements == 0 {
                    "No flagged users found"
                } else {
                    "Flagged users retrieved successfully"
                };
                ResponseEnvelope::success(to_value(&flagged), message, now)
            }
        };
        Ok(envelope)
    }

    /// Serve queries on `subject` until the subscription closes.
    pub async fn serve(self: Arc<Self>, client: Client, subject: String) -> Result<()> {
        let mut subscription = client.subscribe(subject.clone()).await?;
        info!(subject = %subject, "Serving read queries");

        while let Some(message) = subscription.next().await {
            let Some(reply) = message.reply.clone() else {
                warn!("Query without reply subject ignored");
                continue;
            };
            let handler = self.clone();
            let client = client.clone();
            tokio::spawn(async move {
                let envelope = handler.handle(&message.payload).await;
                let payload = match serde_json::to_vec(&envelope) {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!(error = %e, "Failed to encode query reply");
                        return;
                    }
                };
                if let Err(e) = client.publish(reply, payload.into()).await {
                    warn!(error = %e, "Failed to send query reply");
                }
            });
        }

        Ok(())
    }
}

fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::evaluator::{RiskThresholds, RuleBasedScorer};
    use crate::store::InMemoryStore;
    use crate::types::TransactionRequest;
    use chrono::{TimeZone, Utc};

    fn handler() -> (QueryHandler, Arc<TransactionService>) {
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()));
        let scorer = RuleBasedScorer::new(RiskThresholds::new(100.0, 3, 2).unwrap());
        let service = Arc::new(TransactionService::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(scorer),
            clock.clone(),
            3,
        ));
        (QueryHandler::new(service.clone(), clock), service)
    }

    #[test]
    fn test_query_decoding() {
        let query: Query = serde_json::from_str(r#"{"query":"user_transactions","userId":"u1"}"#).unwrap();
        assert_eq!(
            query,
            Query::UserTransactions {
                user_id: "u1".to_string(),
                page: 0,
                size: 20
            }
        );

        let query: Query = serde_json::from_str(r#"{"query":"flagged","size":5,"direction":"ASC"}"#).unwrap();
        match query {
            Query::Flagged(q) => {
                assert_eq!(q.size, 5);
                assert_eq!(q.direction, crate::types::SortDirection::Asc);
            }
            other => panic!("unexpected query {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_health_query() {
        let (handler, _) = handler();
        let reply = handler.handle(br#"{"query":"health"}"#).await;
        assert!(reply.success);
        assert!(reply.data.unwrap().as_str().unwrap().starts_with("RiskWatch is up"));
    }

    #[tokio::test]
    async fn test_profile_query() {
        let (handler, service) = handler();

        let missing = handler.handle(br#"{"query":"profile","user_id":"u1"}"#).await;
        assert!(!missing.success);
        assert_eq!(missing.message, "User not found: u1");

        service
            .submit(TransactionRequest::new("tx_1", "u1", 500.0))
            .await
            .unwrap();
        let found = handler.handle(br#"{"query":"profile","user_id":"u1"}"#).await;
        assert!(found.success);
        assert_eq!(found.data.unwrap()["total_transactions"], 1);
    }

    #[tokio::test]
    async fn test_invalid_queries_become_error_replies() {
        let (handler, _) = handler();

        let reply = handler.handle(b"{}").await;
        assert!(!reply.success);
        assert!(reply.message.starts_with("Invalid query"));

        let reply = handler
            .handle(br#"{"query":"user_transactions","user_id":"u1","size":1000}"#)
            .await;
        assert!(!reply.success);
        assert!(reply.message.contains("Page size"));
    }
}
