//! Application configuration loaded from environment variables.

use saga::{SagaConfig, Secret};

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `DATABASE_URL`: PostgreSQL URL; the in-memory ledger is used when unset
/// - `DATABASE_MAX_CONNECTIONS` (default: `10`)
/// - `GATEWAY_WEBHOOK_SECRET`, `GATEWAY_KEY_SECRET`
/// - `GATEWAY_SIGNATURE_HEADER` (default: `"x-gateway-signature"`)
/// - `ORDER_HOLD_WINDOW_MINUTES` (default: `30`)
/// - `SWEEP_INTERVAL_SECS` (default: `600`), `SWEEP_BATCH_SIZE` (default: `50`)
/// - `CURRENCY` (default: `"INR"`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<Secret>,
    pub database_max_connections: u32,
    pub webhook_secret: Secret,
    pub key_secret: Secret,
    pub signature_header: String,
    pub hold_window_minutes: i64,
    pub sweep_interval_secs: u64,
    pub sweep_batch_size: usize,
    pub currency: String,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, falling back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse(lookup("PORT")).unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: lookup("DATABASE_URL")
                .filter(|url| !url.is_empty())
                .map(Secret::new),
            database_max_connections: parse(lookup("DATABASE_MAX_CONNECTIONS"))
                .unwrap_or(defaults.database_max_connections),
            webhook_secret: lookup("GATEWAY_WEBHOOK_SECRET")
                .map(Secret::new)
                .unwrap_or(defaults.webhook_secret),
            key_secret: lookup("GATEWAY_KEY_SECRET")
                .map(Secret::new)
                .unwrap_or(defaults.key_secret),
            signature_header: lookup("GATEWAY_SIGNATURE_HEADER")
                .map(|h| h.to_ascii_lowercase())
                .unwrap_or(defaults.signature_header),
            hold_window_minutes: parse(lookup("ORDER_HOLD_WINDOW_MINUTES"))
                .unwrap_or(defaults.hold_window_minutes),
            sweep_interval_secs: parse(lookup("SWEEP_INTERVAL_SECS"))
                .unwrap_or(defaults.sweep_interval_secs),
            sweep_batch_size: parse(lookup("SWEEP_BATCH_SIZE")).unwrap_or(defaults.sweep_batch_size),
            currency: lookup("CURRENCY").unwrap_or(defaults.currency),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Settings for the saga services.
    pub fn saga(&self) -> SagaConfig {
        SagaConfig {
            hold_window: chrono::Duration::minutes(self.hold_window_minutes),
            currency: self.currency.clone(),
            webhook_secret: self.webhook_secret.clone(),
            key_secret: self.key_secret.clone(),
            sweep_interval: std::time::Duration::from_secs(self.sweep_interval_secs),
            sweep_batch_size: self.sweep_batch_size,
            ..SagaConfig::default()
        }
    }
}

fn parse<T: std::str::FromStr>(value: Option<String>) -> Option<T> {
    value.and_then(|v| v.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            database_max_connections: 10,
            webhook_secret: Secret::default(),
            key_secret: Secret::default(),
            signature_header: "x-gateway-signature".to_string(),
            hold_window_minutes: 30,
            sweep_interval_secs: 600,
            sweep_batch_size: 50,
            currency: "INR".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert!(config.database_url.is_none());
        assert_eq!(config.hold_window_minutes, 30);
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_from_lookup_reads_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("PORT", "8081"),
            ("DATABASE_URL", "postgres://app:pw@db/shop"),
            ("GATEWAY_WEBHOOK_SECRET", "whsec"),
            ("GATEWAY_SIGNATURE_HEADER", "X-Razorpay-Signature"),
            ("ORDER_HOLD_WINDOW_MINUTES", "15"),
            ("SWEEP_BATCH_SIZE", "20"),
        ]));

        assert_eq!(config.port, 8081);
        assert_eq!(
            config.database_url.as_ref().map(Secret::reveal),
            Some("postgres://app:pw@db/shop")
        );
        assert_eq!(config.signature_header, "x-razorpay-signature");

        let saga = config.saga();
        assert_eq!(saga.hold_window, chrono::Duration::minutes(15));
        assert_eq!(saga.sweep_batch_size, 20);
        assert_eq!(saga.webhook_secret.reveal(), "whsec");
    }

    #[test]
    fn test_unparseable_values_fall_back() {
        let config = Config::from_lookup(lookup(&[("PORT", "eighty"), ("DATABASE_URL", "")]));
        assert_eq!(config.port, 3000);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_debug_hides_secrets() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://app:hunter2@db/shop"),
            ("GATEWAY_KEY_SECRET", "key_live_abc"),
        ]));
        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("key_live_abc"));
    }
}
