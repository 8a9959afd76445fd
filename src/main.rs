//! RiskWatch - Main Entry Point
//!
//! Consumes transaction requests from NATS, scores them, folds them into user
//! risk profiles and publishes verdicts and flagged-user alerts. Read queries
//! are answered over NATS request/reply.

use anyhow::Result;
use futures::StreamExt;
use riskwatch::{
    clock::{Clock, SystemClock},
    config::{AppConfig, LoggingConfig},
    consumer::TransactionConsumer,
    error::RiskError,
    evaluator::RuleBasedScorer,
    metrics::{MetricsReporter, PipelineMetrics},
    producer::{ResponseEnvelope, VerdictProducer},
    queries::QueryHandler,
    service::TransactionService,
    store::InMemoryStore,
    types::{FlaggedUserAlert, TransactionVerdict},
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(format!("riskwatch={}", logging.level).parse()?);

    if logging.format.eq_ignore_ascii_case("json") {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = AppConfig::load()?;
    init_tracing(&config.logging)?;

    info!("Starting RiskWatch");

    // Missing or invalid thresholds are fatal at startup
    let thresholds = config.thresholds()?;
    info!(
        amount_threshold = thresholds.amount_threshold(),
        velocity_limit = thresholds.velocity_limit(),
        velocity_window_minutes = thresholds.velocity_window().num_minutes(),
        "Risk thresholds loaded"
    );

    // Initialize metrics
    let metrics = Arc::new(PipelineMetrics::new());

    // Initialize components
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let service = Arc::new(TransactionService::new(
        Arc::new(InMemoryStore::new()),
        Arc::new(RuleBasedScorer::new(thresholds)),
        clock.clone(),
        config.pipeline.fold_retries,
    ));

    // Connect to NATS
    let client = async_nats::connect(&config.nats.url).await?;
    info!("Connected to NATS at {}", config.nats.url);

    // Initialize consumer and producer
    let consumer = TransactionConsumer::new(client.clone(), &config.nats.transaction_subject);
    let producer = Arc::new(VerdictProducer::new(
        client.clone(),
        &config.nats.verdict_subject,
        &config.nats.alert_subject,
    ));

    // Read path
    let queries = Arc::new(QueryHandler::new(service.clone(), clock.clone()));
    let query_client = client.clone();
    let query_subject = config.nats.query_subject.clone();
    tokio::spawn(async move {
        if let Err(e) = queries.serve(query_client, query_subject).await {
            error!(error = %e, "Query responder stopped");
        }
    });

    // Start metrics reporter (prints summary every 30 seconds)
    let metrics_clone = metrics.clone();
    tokio::spawn(async move {
        let reporter = MetricsReporter::new(metrics_clone, 30);
        reporter.start().await;
    });

    // Drop per-user locks nobody is holding
    let service_clone = service.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            let locks = service_clone.aggregator().locks();
            let pruned = locks.prune_idle();
            if pruned > 0 {
                debug!(pruned, remaining = locks.len(), "Pruned idle user locks");
            }
        }
    });

    let num_workers = config.pipeline.workers.max(1);
    let timeout = config.pipeline.timeout();
    info!(
        "Starting transaction processing loop with {} parallel workers",
        num_workers
    );
    info!("Listening on subject: {}", consumer.subject());
    info!(
        "Publishing verdicts to: {}, alerts to: {}",
        producer.verdict_subject(),
        producer.alert_subject()
    );

    // Semaphore to limit concurrent processing
    let semaphore = Arc::new(Semaphore::new(num_workers));
    let processed_count = Arc::new(AtomicU64::new(0));

    let mut subscription = consumer.subscribe().await?;

    loop {
        let message = tokio::select! {
            message = subscription.next() => match message {
                Some(message) => message,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        };

        // Acquire permit (limits concurrent tasks)
        let permit = semaphore.clone().acquire_owned().await?;

        let service = service.clone();
        let producer = producer.clone();
        let metrics = metrics.clone();
        let clock = clock.clone();
        let processed_count = processed_count.clone();

        tokio::spawn(async move {
            let start_time = Instant::now();

            let request = match TransactionConsumer::decode(&message.payload) {
                Ok(request) => request,
                Err(e) => {
                    warn!(error = %e, "Failed to deserialize transaction request");
                    metrics.record_failure("invalid_input");
                    if let Some(reply) = message.reply {
                        let body: ResponseEnvelope<()> =
                            ResponseEnvelope::error(format!("Invalid transaction payload: {}", e), clock.now());
                        producer.reply_or_warn(reply, &body, None).await;
                    }
                    return;
                }
            };
            let tx_id = request.transaction_id.clone();

            match tokio::time::timeout(timeout, service.submit(request)).await {
                Ok(Ok(outcome)) => {
                    let processing_time = start_time.elapsed();
                    let tx = &outcome.transaction;
                    metrics.record_evaluation(processing_time, tx.risk_score, tx.risk_level);

                    let verdict = TransactionVerdict::from_transaction(tx, clock.now());
                    if let Err(e) = producer.publish_verdict(&verdict).await {
                        error!(transaction_id = %tx_id, error = %e, "Failed to publish verdict");
                    }

                    if outcome.newly_flagged {
                        metrics.record_flagged();
                        let alert = FlaggedUserAlert::new(&outcome.profile, tx_id.clone());
                        match producer.publish_alert(&alert).await {
                            Ok(()) => info!(
                                user_id = %alert.user_id,
                                high_risk_count = alert.high_risk_transaction_count,
                                average_risk_score = alert.average_risk_score,
                                "User flagged"
                            ),
                            Err(e) => error!(
                                user_id = %alert.user_id,
                                error = %e,
                                "Failed to publish flagged-user alert"
                            ),
                        }
                    }

                    if let Some(reply) = message.reply {
                        let body = ResponseEnvelope::success(
                            tx.clone(),
                            "Transaction submitted and evaluated successfully.",
                            clock.now(),
                        );
                        producer.reply_or_warn(reply, &body, Some(&tx_id)).await;
                    }

                    debug!(
                        transaction_id = %tx_id,
                        risk_score = tx.risk_score,
                        risk_level = %tx.risk_level,
                        processing_time_us = processing_time.as_micros(),
                        "Transaction processed"
                    );

                    let count = processed_count.fetch_add(1, Ordering::Relaxed) + 1;

                    // Log progress every 100 transactions
                    if count % 100 == 0 {
                        let throughput = metrics.get_throughput();
                        let processing_stats = metrics.get_processing_stats();
                        info!(
                            processed = count,
                            throughput = format!("{:.1} tx/s", throughput),
                            avg_latency_us = processing_stats.mean_us,
                            "Processing milestone"
                        );
                    }
                }
                Ok(Err(e)) => {
                    match &e {
                        RiskError::DuplicateTransaction(_) => {
                            metrics.record_duplicate();
                            warn!(transaction_id = %tx_id, "Duplicate transaction rejected");
                        }
                        _ => {
                            metrics.record_failure(e.kind());
                            error!(transaction_id = %tx_id, kind = e.kind(), error = %e, "Submission failed");
                        }
                    }
                    if let Some(reply) = message.reply {
                        let body: ResponseEnvelope<()> = ResponseEnvelope::error(e.to_string(), clock.now());
                        producer.reply_or_warn(reply, &body, Some(&tx_id)).await;
                    }
                }
                Err(_) => {
                    metrics.record_failure("timeout");
                    error!(
                        transaction_id = %tx_id,
                        timeout_ms = timeout.as_millis() as u64,
                        "Submission timed out"
                    );
                    if let Some(reply) = message.reply {
                        let body: ResponseEnvelope<()> =
                            ResponseEnvelope::error("Transaction evaluation timed out", clock.now());
                        producer.reply_or_warn(reply, &body, Some(&tx_id)).await;
                    }
                }
            }

            // Release permit when done
            drop(permit);
        });
    }

    // Print final summary
    info!("RiskWatch shutting down...");
    metrics.print_summary();

    Ok(())
}
