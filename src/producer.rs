//! NATS message producer for verdicts, alerts and replies

use crate::types::{FlaggedUserAlert, TransactionVerdict};
use anyhow::Result;
use async_nats::{Client, Subject};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Uniform reply body for request/reply interactions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope<T> {
    pub success: bool,
    pub message: String,
    pub data: Option<T>,
    pub timestamp: DateTime<Utc>,
}

impl<T> ResponseEnvelope<T> {
    pub fn success(data: T, message: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
            timestamp,
        }
    }

    pub fn error(message: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            timestamp,
        }
    }
}

/// Producer for publishing verdicts and flagged-user alerts to NATS
#[derive(Clone)]
pub struct VerdictProducer {
    client: Client,
    verdict_subject: String,
    alert_subject: String,
}

impl VerdictProducer {
    /// Create a new verdict producer
    pub fn new(client: Client, verdict_subject: &str, alert_subject: &str) -> Self {
        Self {
            client,
            verdict_subject: verdict_subject.to_string(),
            alert_subject: alert_subject.to_string(),
        }
    }

    /// Publish the verdict for an evaluated transaction
    pub async fn publish_verdict(&self, verdict: &TransactionVerdict) -> Result<()> {
        let payload = serde_json::to_vec(verdict)?;

        self.client
            .publish(self.verdict_subject.clone(), payload.into())
            .await?;

        debug!(
            transaction_id = %verdict.transaction_id,
            risk_score = verdict.risk_score,
            "Published verdict"
        );

        Ok(())
    }

    /// Publish a flagged-user alert
    pub async fn publish_alert(&self, alert: &FlaggedUserAlert) -> Result<()> {
        let payload = serde_json::to_vec(alert)?;

        self.client
            .publish(self.alert_subject.clone(), payload.into())
            .await?;

        debug!(
            alert_id = %alert.alert_id,
            user_id = %alert.user_id,
            "Published flagged-user alert"
        );

        Ok(())
    }

    /// Answer a request on its reply subject
    pub async fn reply<T: Serialize>(&self, reply: Subject, body: &ResponseEnvelope<T>) -> Result<()> {
        let payload = serde_json::to_vec(body)?;
        self.client.publish(reply, payload.into()).await?;
        Ok(())
    }

    /// Like [`VerdictProducer::reply`], but a failed reply is logged rather
    /// than returned. Returns whether the reply went out.
    pub async fn reply_or_warn<T: Serialize>(
        &self,
        reply: Subject,
        body: &ResponseEnvelope<T>,
        transaction_id: Option<&str>,
    ) -> bool {
        match self.reply(reply.clone(), body).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    reply_subject = %reply,
                    transaction_id = transaction_id.unwrap_or("-"),
                    error = %e,
                    "Failed to send reply"
                );
                false
            }
        }
    }

    /// Get the verdict subject name
    pub fn verdict_subject(&self) -> &str {
        &self.verdict_subject
    }

    /// Get the alert subject name
    pub fn alert_subject(&self) -> &str {
        &self.alert_subject
    }
}
