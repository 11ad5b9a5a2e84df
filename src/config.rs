//! Runtime configuration for fetchers and the engine

use crate::constants::{
    default_rate_limit_interval, default_request_timeout, NAVER_LAND_BASE_URL, USER_AGENT,
};
use std::time::Duration;

/// Ingestion settings
///
/// `Default` uses the compile-time constants; [`IngestConfig::from_env`]
/// additionally honours `NAVER_INGEST_BASE_URL`, `NAVER_INGEST_RATE_LIMIT_MS`,
/// `NAVER_INGEST_TIMEOUT_SECS` and `NAVER_INGEST_USER_AGENT`.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestConfig {
    /// Scheme and host of the listing service
    pub base_url: String,
    /// Pause between two page requests of the same run
    pub rate_limit_interval: Duration,
    /// Timeout of a single page request
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            base_url: NAVER_LAND_BASE_URL.to_string(),
            rate_limit_interval: default_rate_limit_interval(),
            request_timeout: default_request_timeout(),
            user_agent: USER_AGENT.to_string(),
        }
    }
}

impl IngestConfig {
    /// Defaults overridden by environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(base_url) = lookup("NAVER_INGEST_BASE_URL") {
            config.base_url = base_url.trim_end_matches('/').to_string();
        }
        if let Some(user_agent) = lookup("NAVER_INGEST_USER_AGENT") {
            config.user_agent = user_agent;
        }
        if let Some(ms) = parse_u64(&lookup, "NAVER_INGEST_RATE_LIMIT_MS") {
            config.rate_limit_interval = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_u64(&lookup, "NAVER_INGEST_TIMEOUT_SECS") {
            config.request_timeout = Duration::from_secs(secs);
        }

        config
    }

    pub fn with_rate_limit_interval(mut self, interval: Duration) -> Self {
        self.rate_limit_interval = interval;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

fn parse_u64(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<u64> {
    let raw = lookup(key)?;
    match raw.trim().parse::<u64>() {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(key = key, value = %raw, error = %e, "Ignoring invalid configuration value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = IngestConfig::default();
        assert_eq!(config.base_url, "https://new.land.naver.com");
        assert_eq!(config.rate_limit_interval, Duration::from_secs(1));
        assert_eq!(config.request_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_overrides() {
        let config = IngestConfig::from_lookup(lookup_from(&[
            ("NAVER_INGEST_BASE_URL", "http://localhost:8080/"),
            ("NAVER_INGEST_RATE_LIMIT_MS", "250"),
            ("NAVER_INGEST_TIMEOUT_SECS", "3"),
        ]));
        assert_eq!(config.base_url, "http://localhost:8080");
        assert_eq!(config.rate_limit_interval, Duration::from_millis(250));
        assert_eq!(config.request_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = IngestConfig::from_lookup(lookup_from(&[
            ("NAVER_INGEST_RATE_LIMIT_MS", "fast"),
            ("NAVER_INGEST_TIMEOUT_SECS", "-1"),
        ]));
        assert_eq!(config, IngestConfig::default());
    }
}
