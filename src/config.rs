//! Client configuration.
//!
//! Built in code, deserialized from JSON, or read from `STATION_LEDGER_*`
//! environment variables. The backend URL is normalised on the way in so the
//! API layer can always append `/api/...` paths.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::entry::ReferenceRates;
use crate::resilient::RetryPolicy;
use crate::validation::CashVarianceRule;

pub const ENV_API_URL: &str = "STATION_LEDGER_API_URL";
pub const ENV_RETRY_ATTEMPTS: &str = "STATION_LEDGER_RETRY_ATTEMPTS";
pub const ENV_TIMEOUT_SECS: &str = "STATION_LEDGER_TIMEOUT_SECS";
pub const ENV_POLL_SECS: &str = "STATION_LEDGER_POLL_SECS";
pub const ENV_MOCK_WRITES: &str = "STATION_LEDGER_MOCK_WRITES";

const DEFAULT_API_URL: &str = "http://localhost:8000";
const DEFAULT_POLL_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientConfig {
    pub base_url: String,
    pub retry: RetryPolicy,
    pub poll_interval_secs: u64,
    /// Apply workflow transitions locally (flagged) when the backend is
    /// unreachable.
    pub allow_mock_writes: bool,
    pub reference_rates: ReferenceRates,
    /// `None` disables the cross-product cash check.
    pub cash_variance: Option<CashVarianceRule>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            retry: RetryPolicy::default(),
            poll_interval_secs: DEFAULT_POLL_SECS,
            allow_mock_writes: true,
            reference_rates: ReferenceRates::default(),
            cash_variance: Some(CashVarianceRule::default()),
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: normalize_base_url(base_url),
            ..Self::default()
        }
    }

    /// Defaults overridden by whatever `STATION_LEDGER_*` variables are set.
    /// Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var(ENV_API_URL) {
            if !url.trim().is_empty() {
                config.base_url = normalize_base_url(&url);
            }
        }
        if let Some(attempts) = env_parse::<u32>(ENV_RETRY_ATTEMPTS) {
            config.retry.attempts = attempts.max(1);
        }
        if let Some(secs) = env_parse::<u64>(ENV_TIMEOUT_SECS) {
            config.retry.attempt_timeout = Duration::from_secs(secs.max(1));
        }
        if let Some(secs) = env_parse::<u64>(ENV_POLL_SECS) {
            config.poll_interval_secs = secs.max(1);
        }
        if let Ok(raw) = std::env::var(ENV_MOCK_WRITES) {
            match parse_flag(&raw) {
                Some(flag) => config.allow_mock_writes = flag,
                None => warn!(var = ENV_MOCK_WRITES, value = %raw, "ignoring unparseable flag"),
            }
        }

        config
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

fn env_parse<T: std::str::FromStr>(var: &str) -> Option<T> {
    let raw = std::env::var(var).ok()?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(var, value = %raw, "ignoring unparseable setting");
            None
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Normalise the backend URL:
/// - ensure a scheme is present (https, or http for localhost)
/// - strip trailing slashes
/// - strip a trailing `/api` segment
pub fn normalize_base_url(url: &str) -> String {
    let mut url = url.trim().to_string();
    if url.is_empty() {
        return url;
    }

    if !url.starts_with("http://") && !url.starts_with("https://") {
        if url.starts_with("localhost") || url.starts_with("127.0.0.1") {
            url = format!("http://{url}");
        } else {
            url = format!("https://{url}");
        }
    }

    while url.ends_with('/') {
        url.pop();
    }
    if url.ends_with("/api") {
        url.truncate(url.len() - 4);
    }
    while url.ends_with('/') {
        url.pop();
    }

    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for var in [
            ENV_API_URL,
            ENV_RETRY_ATTEMPTS,
            ENV_TIMEOUT_SECS,
            ENV_POLL_SECS,
            ENV_MOCK_WRITES,
        ] {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn normalizes_scheme_and_api_suffix() {
        assert_eq!(normalize_base_url("ledger.example.com/api/"), "https://ledger.example.com");
        assert_eq!(normalize_base_url("localhost:8000/"), "http://localhost:8000");
        assert_eq!(normalize_base_url(" http://10.0.0.5:9000/api "), "http://10.0.0.5:9000");
        assert_eq!(normalize_base_url("https://x.io///"), "https://x.io");
        assert_eq!(normalize_base_url(""), "");
    }

    #[test]
    #[serial]
    fn env_overrides_defaults() {
        clear_env();
        std::env::set_var(ENV_API_URL, "dash.fuelco.africa/api");
        std::env::set_var(ENV_RETRY_ATTEMPTS, "5");
        std::env::set_var(ENV_TIMEOUT_SECS, "4");
        std::env::set_var(ENV_POLL_SECS, "60");
        std::env::set_var(ENV_MOCK_WRITES, "off");

        let config = ClientConfig::from_env();
        assert_eq!(config.base_url, "https://dash.fuelco.africa");
        assert_eq!(config.retry.attempts, 5);
        assert_eq!(config.retry.attempt_timeout, Duration::from_secs(4));
        assert_eq!(config.poll_interval(), Duration::from_secs(60));
        assert!(!config.allow_mock_writes);
        clear_env();
    }

    #[test]
    #[serial]
    fn bad_env_values_fall_back_to_defaults() {
        clear_env();
        std::env::set_var(ENV_RETRY_ATTEMPTS, "many");
        std::env::set_var(ENV_MOCK_WRITES, "perhaps");

        let config = ClientConfig::from_env();
        assert_eq!(config.retry, RetryPolicy::default());
        assert!(config.allow_mock_writes);
        clear_env();
    }

    #[test]
    fn deserializes_partial_json() {
        let config: ClientConfig = serde_json::from_value(serde_json::json!({
            "baseUrl": "https://ledger.example.com",
            "retry": { "attempts": 2, "backoff": 250, "attemptTimeout": 3000 },
            "allowMockWrites": false
        }))
        .expect("decode config");
        assert_eq!(config.retry.backoff, Duration::from_millis(250));
        assert_eq!(config.retry.attempt_timeout, Duration::from_millis(3000));
        assert_eq!(config.poll_interval_secs, DEFAULT_POLL_SECS);
        assert!(!config.allow_mock_writes);
        assert_eq!(config.cash_variance, Some(CashVarianceRule::default()));
    }

    #[test]
    fn partial_retry_policy_keeps_remaining_defaults() {
        let config: ClientConfig = serde_json::from_value(serde_json::json!({
            "retry": { "attempts": 5 }
        }))
        .expect("decode config");
        assert_eq!(config.retry.attempts, 5);
        assert_eq!(config.retry.backoff, RetryPolicy::default().backoff);
        assert_eq!(config.retry.attempt_timeout, RetryPolicy::default().attempt_timeout);
    }
}
