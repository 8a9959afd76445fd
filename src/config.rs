//! Configuration management for the risk evaluation service

use crate::error::RiskError;
use crate::evaluator::RiskThresholds;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub nats: NatsConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

/// NATS connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct NatsConfig {
    /// NATS server URL
    pub url: String,
    /// Subject for incoming transaction requests
    pub transaction_subject: String,
    /// Subject for outgoing verdicts
    pub verdict_subject: String,
    /// Subject for flagged-user alerts
    pub alert_subject: String,
    /// Request/reply subject for the read path
    pub query_subject: String,
}

/// Scoring thresholds as read from the config sources.
///
/// Fields are optional here so a missing key is reported by name when
/// converted into [`RiskThresholds`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RiskConfig {
    /// Amounts strictly above this add the amount signal
    pub amount_threshold: Option<f64>,
    /// Recent transactions allowed before the velocity signal fires
    pub velocity_limit: Option<u32>,
    /// Length of the trailing velocity window
    pub velocity_window_minutes: Option<u32>,
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Maximum concurrent submissions
    pub workers: usize,
    /// Per-submission deadline in milliseconds
    pub timeout_ms: u64,
    /// Re-read attempts after an optimistic profile conflict
    #[serde(default = "default_fold_retries")]
    pub fold_retries: u32,
}

fn default_fold_retries() -> u32 {
    3
}

impl PipelineConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/config.toml")
    }

    /// Load configuration from a specific path, overlaid by `RISKWATCH__*` variables
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(Environment::with_prefix("RISKWATCH").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Validated scoring thresholds. Fails when any required key is absent.
    pub fn thresholds(&self) -> std::result::Result<RiskThresholds, RiskError> {
        RiskThresholds::try_from(&self.risk)
    }
}

impl TryFrom<&RiskConfig> for RiskThresholds {
    type Error = RiskError;

    fn try_from(risk: &RiskConfig) -> std::result::Result<Self, Self::Error> {
        let amount_threshold = risk
            .amount_threshold
            .ok_or_else(|| RiskError::configuration("risk.amount_threshold is not set"))?;
        let velocity_limit = risk
            .velocity_limit
            .ok_or_else(|| RiskError::configuration("risk.velocity_limit is not set"))?;
        let velocity_window_minutes = risk
            .velocity_window_minutes
            .ok_or_else(|| RiskError::configuration("risk.velocity_window_minutes is not set"))?;

        RiskThresholds::new(amount_threshold, velocity_limit, velocity_window_minutes)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            nats: NatsConfig {
                url: "nats://localhost:4222".to_string(),
                transaction_subject: "riskwatch.transactions".to_string(),
                verdict_subject: "riskwatch.verdicts".to_string(),
                alert_subject: "riskwatch.alerts.flagged".to_string(),
                query_subject: "riskwatch.queries".to_string(),
            },
            risk: RiskConfig {
                amount_threshold: Some(10_000.0),
                velocity_limit: Some(3),
                velocity_window_minutes: Some(2),
            },
            pipeline: PipelineConfig {
                workers: 8,
                timeout_ms: 2000,
                fold_retries: default_fold_retries(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.nats.url, "nats://localhost:4222");
        assert_eq!(config.pipeline.fold_retries, 3);

        let thresholds = config.thresholds().unwrap();
        assert_eq!(thresholds.amount_threshold(), 10_000.0);
        assert_eq!(thresholds.velocity_limit(), 3);
        assert_eq!(thresholds.velocity_window(), chrono::Duration::minutes(2));
    }

    #[test]
    fn test_missing_threshold_is_configuration_error() {
        let risk = RiskConfig {
            amount_threshold: None,
            velocity_limit: Some(3),
            velocity_window_minutes: Some(2),
        };

        let err = RiskThresholds::try_from(&risk).unwrap_err();
        assert!(matches!(err, RiskError::Configuration(ref msg) if msg.contains("amount_threshold")));
    }

    #[test]
    fn test_missing_velocity_settings_are_configuration_errors() {
        let risk = RiskConfig {
            amount_threshold: Some(100.0),
            velocity_limit: None,
            velocity_window_minutes: Some(2),
        };
        assert!(matches!(RiskThresholds::try_from(&risk), Err(RiskError::Configuration(_))));

        let risk = RiskConfig {
            amount_threshold: Some(100.0),
            velocity_limit: Some(1),
            velocity_window_minutes: None,
        };
        assert!(matches!(RiskThresholds::try_from(&risk), Err(RiskError::Configuration(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = std::env::temp_dir().join(format!("riskwatch-config-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[nats]
url = "nats://nats:4222"
transaction_subject = "tx.in"
verdict_subject = "tx.out"
alert_subject = "tx.alerts"
query_subject = "tx.queries"

[risk]
amount_threshold = 100000.0
velocity_limit = 3

[pipeline]
workers = 2
timeout_ms = 500

[logging]
level = "debug"
format = "json"
"#
        )
        .unwrap();

        let config = AppConfig::load_from_path(&path).unwrap();
        assert_eq!(config.nats.transaction_subject, "tx.in");
        assert_eq!(config.pipeline.workers, 2);
        assert_eq!(config.pipeline.fold_retries, 3);
        assert_eq!(config.risk.amount_threshold, Some(100_000.0));
        assert!(matches!(config.thresholds(), Err(RiskError::Configuration(_))));

        std::fs::remove_dir_all(&dir).ok();
    }
}
