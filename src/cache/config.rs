//! Purge configuration.
//!
//! Controls whether the proxy integration runs at all, where flushes are
//! sent, and how hard the dispatcher may hit the proxy.

use std::num::NonZeroUsize;
use std::time::Duration;

use url::Url;

const DEFAULT_CONCURRENCY: usize = 10;
const DEFAULT_CHUNK_SIZE: usize = 100;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Resolved purge configuration.
#[derive(Debug, Clone)]
pub struct PurgeConfig {
    /// Run purges and local invalidation at all.
    pub enabled: bool,
    /// Public base URL of the site. Falls back to the request host when unset.
    pub base_url: Option<Url>,
    /// Maximum in-flight purge requests per batch.
    pub concurrency: NonZeroUsize,
    /// Maximum tags resolved and purged together by a tag flush.
    pub chunk_size: NonZeroUsize,
    /// Upper bound for a single purge request.
    pub request_timeout: Duration,
}

impl Default for PurgeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: None,
            concurrency: non_zero(DEFAULT_CONCURRENCY),
            chunk_size: non_zero(DEFAULT_CHUNK_SIZE),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
        }
    }
}

impl From<&crate::config::PurgeSettings> for PurgeConfig {
    fn from(settings: &crate::config::PurgeSettings) -> Self {
        Self {
            enabled: settings.enabled,
            base_url: settings.base_url.clone(),
            concurrency: non_zero(settings.concurrency.get() as usize),
            chunk_size: non_zero(settings.chunk_size.get() as usize),
            request_timeout: settings.request_timeout,
        }
    }
}

impl PurgeConfig {
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Configured base URL rendered without a trailing slash.
    pub fn configured_base_url(&self) -> Option<String> {
        self.base_url
            .as_ref()
            .map(|url| url.as_str().trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty())
    }
}

fn non_zero(value: usize) -> NonZeroUsize {
    NonZeroUsize::new(value).unwrap_or(NonZeroUsize::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = PurgeConfig::default();
        assert!(config.is_enabled());
        assert!(config.base_url.is_none());
        assert_eq!(config.concurrency.get(), 10);
        assert_eq!(config.chunk_size.get(), 100);
        assert_eq!(config.request_timeout, Duration::from_secs(10));
    }

    #[test]
    fn configured_base_url_trims_trailing_slash() {
        let config = PurgeConfig {
            base_url: Some(Url::parse("https://example.com/").expect("valid url")),
            ..Default::default()
        };
        assert_eq!(
            config.configured_base_url().as_deref(),
            Some("https://example.com")
        );
    }

    #[test]
    fn configured_base_url_keeps_path() {
        let config = PurgeConfig {
            base_url: Some(Url::parse("https://example.com/site/").expect("valid url")),
            ..Default::default()
        };
        assert_eq!(
            config.configured_base_url().as_deref(),
            Some("https://example.com/site")
        );
    }

    #[test]
    fn non_zero_clamps_to_min() {
        assert_eq!(non_zero(0).get(), 1);
        assert_eq!(non_zero(7).get(), 7);
    }
}
