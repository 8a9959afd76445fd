//! Test Transaction Producer
//!
//! Generates and publishes transaction requests to NATS for exercising the
//! risk pipeline: ordinary spending, large amounts and rapid-fire bursts from
//! a fixed pool of users.

use chrono::Utc;
use rand::Rng;
use riskwatch::types::TransactionRequest;
use std::time::Duration;
use tracing::{info, warn};

const DEVICES: &[&str] = &["ios-app", "android-app", "web-chrome", "web-safari", "pos-terminal"];
const LOCATIONS: &[&str] = &["Berlin", "Lisbon", "New York", "Singapore", "Lagos", "Sao Paulo"];

/// Which kind of traffic a generated request represents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pattern {
    Normal,
    HighAmount,
    Burst,
}

/// Request generator for testing
struct RequestGenerator {
    rng: rand::rngs::ThreadRng,
    transaction_counter: u64,
    users: Vec<String>,
    amount_threshold: f64,
}

impl RequestGenerator {
    fn new(user_count: usize, amount_threshold: f64) -> Self {
        Self {
            rng: rand::thread_rng(),
            transaction_counter: 0,
            users: (1..=user_count.max(1)).map(|i| format!("user_{:04}", i)).collect(),
            amount_threshold,
        }
    }

    fn next_id(&mut self) -> String {
        self.transaction_counter += 1;
        format!(
            "tx_{}_{:08}",
            Utc::now().format("%Y%m%d%H%M%S"),
            self.transaction_counter
        )
    }

    fn random_user(&mut self) -> String {
        let idx = self.rng.gen_range(0..self.users.len());
        self.users[idx].clone()
    }

    fn request(&mut self, user_id: &str, amount: f64) -> TransactionRequest {
        let device = self.random_choice(DEVICES).to_string();
        let location = self.random_choice(LOCATIONS).to_string();
        TransactionRequest::new(self.next_id(), user_id, (amount * 100.0).round() / 100.0)
            .at(Utc::now())
            .with_tags(Some(device), Some(location))
    }

    /// Everyday spending well below the amount threshold
    fn generate_normal(&mut self) -> TransactionRequest {
        let user = self.random_user();
        let amount = self.rng.gen_range(5.0..(self.amount_threshold * 0.2).max(10.0));
        self.request(&user, amount)
    }

    /// A single purchase above the amount threshold
    fn generate_high_amount(&mut self) -> TransactionRequest {
        let user = self.random_user();
        let amount = self
            .rng
            .gen_range(self.amount_threshold * 1.01..self.amount_threshold * 5.0);
        self.request(&user, amount)
    }

    /// Several back-to-back requests for one user, enough to trip the velocity rule
    fn generate_burst(&mut self, size: usize) -> Vec<TransactionRequest> {
        let user = self.random_user();
        (0..size)
            .map(|_| {
                let amount = if self.rng.gen_bool(0.3) {
                    self.rng.gen_range(self.amount_threshold * 1.01..self.amount_threshold * 2.0)
                } else {
                    self.rng.gen_range(5.0..500.0)
                };
                self.request(&user, amount)
            })
            .collect()
    }

    fn pick_pattern(&mut self, anomaly_rate: f64) -> Pattern {
        if !self.rng.gen_bool(anomaly_rate.clamp(0.0, 1.0)) {
            Pattern::Normal
        } else if self.rng.gen_bool(0.5) {
            Pattern::HighAmount
        } else {
            Pattern::Burst
        }
    }

    fn generate(&mut self, pattern: Pattern) -> Vec<TransactionRequest> {
        match pattern {
            Pattern::Normal => vec![self.generate_normal()],
            Pattern::HighAmount => vec![self.generate_high_amount()],
            Pattern::Burst => {
                let size = self.rng.gen_range(4..8);
                self.generate_burst(size)
            }
        }
    }

    fn random_choice<'a>(&mut self, choices: &[&'a str]) -> &'a str {
        choices[self.rng.gen_range(0..choices.len())]
    }
}

/// Amount threshold the generator aims around. Must be a positive, finite number.
fn parse_amount_threshold(arg: Option<&str>) -> anyhow::Result<f64> {
    let Some(raw) = arg else {
        return Ok(10_000.0);
    };
    let threshold: f64 = raw
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid amount threshold '{}': {}", raw, e))?;
    if !threshold.is_finite() || threshold <= 0.0 {
        anyhow::bail!("amount threshold must be a positive number, got {}", raw);
    }
    Ok(threshold)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("test_producer=info".parse()?),
        )
        .init();

    info!("Starting Test Transaction Producer");

    // Parse arguments
    let args: Vec<String> = std::env::args().collect();
    let nats_url = args.get(1).map(|s| s.as_str()).unwrap_or("nats://localhost:4222");
    let subject = args
        .get(2)
        .map(|s| s.as_str())
        .unwrap_or("riskwatch.transactions");
    let count: u64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(100);
    let anomaly_rate: f64 = args
        .get(4)
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|r| r.is_finite())
        .unwrap_or(0.1);
    let delay_ms: u64 = args.get(5).and_then(|s| s.parse().ok()).unwrap_or(100);
    let users: usize = args.get(6).and_then(|s| s.parse().ok()).unwrap_or(50);
    let amount_threshold = parse_amount_threshold(args.get(7).map(|s| s.as_str()))?;

    info!(
        nats_url = %nats_url,
        subject = %subject,
        count = count,
        anomaly_rate = anomaly_rate,
        delay_ms = delay_ms,
        users = users,
        "Configuration loaded"
    );

    let mut generator = RequestGenerator::new(users, amount_threshold);

    // Connect to NATS
    let client = match async_nats::connect(nats_url).await {
        Ok(c) => {
            info!("Connected to NATS");
            c
        }
        Err(e) => {
            warn!(error = %e, "Failed to connect to NATS. Running in dry-run mode.");
            return run_dry_mode(&mut generator, count, anomaly_rate, delay_ms).await;
        }
    };

    info!("Starting to publish {} batches...", count);

    let mut published = 0u64;
    let mut anomalous = 0u64;

    for i in 0..count {
        let pattern = generator.pick_pattern(anomaly_rate);
        if pattern != Pattern::Normal {
            anomalous += 1;
        }

        for request in generator.generate(pattern) {
            let payload = serde_json::to_vec(&request)?;
            client.publish(subject.to_string(), payload.into()).await?;
            published += 1;
        }

        if (i + 1) % 10 == 0 {
            info!(
                "Published {}/{} batches ({} requests, {} anomalous batches)",
                i + 1,
                count,
                published,
                anomalous
            );
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    client.flush().await?;

    info!(
        "Completed! Published {} requests in {} batches ({} anomalous)",
        published, count, anomalous
    );

    Ok(())
}

async fn run_dry_mode(
    generator: &mut RequestGenerator,
    count: u64,
    anomaly_rate: f64,
    delay_ms: u64,
) -> anyhow::Result<()> {
    info!("Running in dry-run mode (no NATS connection)");

    for i in 0..count {
        let pattern = generator.pick_pattern(anomaly_rate);
        let batch = generator.generate(pattern);

        if (i + 1) % 10 == 0 || i == 0 {
            let json = serde_json::to_string_pretty(&batch)?;
            info!("Sample batch {} ({:?}):\n{}", i + 1, pattern, json);
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    Ok(())
}
