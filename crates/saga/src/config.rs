//! Saga settings.

use std::fmt;

/// A value that never shows up in logs or `Debug` output.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn reveal(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}

/// Tunables shared by the saga services.
#[derive(Debug, Clone)]
pub struct SagaConfig {
    /// How long an intent waits for payment before the sweeper may resolve it.
    pub hold_window: chrono::Duration,
    /// ISO currency code for new intents.
    pub currency: String,
    /// Shared secret for webhook signatures.
    pub webhook_secret: Secret,
    /// Gateway key secret for client payment proofs.
    pub key_secret: Secret,
    /// Attempts at compensation before giving up and leaving it to the sweeper.
    pub compensation_attempts: u32,
    /// Base delay between compensation attempts; jitter is added on top.
    pub compensation_backoff: std::time::Duration,
    /// Gateway orders older than this with no outcome are treated as failed by the status poll.
    pub status_poll_timeout: chrono::Duration,
    pub sweep_interval: std::time::Duration,
    pub sweep_batch_size: usize,
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            hold_window: chrono::Duration::minutes(30),
            currency: "INR".to_string(),
            webhook_secret: Secret::default(),
            key_secret: Secret::default(),
            compensation_attempts: 3,
            compensation_backoff: std::time::Duration::from_millis(50),
            status_poll_timeout: chrono::Duration::seconds(120),
            sweep_interval: std::time::Duration::from_secs(600),
            sweep_batch_size: 50,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_is_redacted() {
        let config = SagaConfig {
            webhook_secret: Secret::new("whsec_live_123"),
            ..SagaConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("whsec_live_123"));
        assert!(debug.contains("****"));
        assert_eq!(config.webhook_secret.reveal(), "whsec_live_123");
    }

    #[test]
    fn test_defaults() {
        let config = SagaConfig::default();
        assert_eq!(config.hold_window, chrono::Duration::minutes(30));
        assert_eq!(config.sweep_batch_size, 50);
        assert_eq!(config.compensation_attempts, 3);
    }
}
