//! Configuration types for offramp-preview

use crate::error::{Error, Result};
use crate::types::VariantId;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration for [`Previewer`](crate::Previewer)
///
/// Every field has a default, so `Config::default()` works against services on
/// localhost and a partial JSON/TOML document only needs the fields it changes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Scheme added to source input that has none (default: "https")
    #[serde(default = "default_scheme")]
    pub default_scheme: String,

    /// Order in which loaded variants are considered for the initial selection
    ///
    /// Variants missing from this list are considered after the listed ones,
    /// in enumeration order. Duplicates are ignored.
    #[serde(default = "default_variant_priority")]
    pub variant_priority: Vec<VariantId>,

    /// Maximum number of variant fetches in flight for one batch (default: 4)
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,

    /// Capacity of the event broadcast channel (default: 256)
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// Transform service settings
    #[serde(default)]
    pub transform: TransformConfig,

    /// Packager settings
    #[serde(default)]
    pub packager: PackagerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_scheme: default_scheme(),
            variant_priority: default_variant_priority(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
            event_buffer: default_event_buffer(),
            transform: TransformConfig::default(),
            packager: PackagerConfig::default(),
        }
    }
}

impl Config {
    /// Check settings that would otherwise fail later at an inconvenient point
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.default_scheme.as_str(), "http" | "https") {
            return Err(Error::Config {
                message: format!(
                    "default scheme must be http or https, got '{}'",
                    self.default_scheme
                ),
                key: Some("default_scheme".to_string()),
            });
        }
        if self.max_concurrent_fetches == 0 {
            return Err(Error::Config {
                message: "max_concurrent_fetches must be at least 1".to_string(),
                key: Some("max_concurrent_fetches".to_string()),
            });
        }
        if self.event_buffer == 0 {
            return Err(Error::Config {
                message: "event_buffer must be at least 1".to_string(),
                key: Some("event_buffer".to_string()),
            });
        }
        validate_base_url(&self.transform.base_url, "transform.base_url")?;
        validate_base_url(&self.packager.base_url, "packager.base_url")?;
        Ok(())
    }

    /// Variants in selection priority order, every variant exactly once
    pub fn selection_order(&self) -> Vec<VariantId> {
        let mut order: Vec<VariantId> = Vec::with_capacity(VariantId::ALL.len());
        for variant in self
            .variant_priority
            .iter()
            .copied()
            .chain(VariantId::ALL)
        {
            if !order.contains(&variant) {
                order.push(variant);
            }
        }
        order
    }
}

fn validate_base_url(value: &str, key: &str) -> Result<()> {
    url::Url::parse(value).map_err(|e| Error::Config {
        message: format!("invalid base URL '{}': {}", value, e),
        key: Some(key.to_string()),
    })?;
    Ok(())
}

/// Transform service configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransformConfig {
    /// Base URL of the transform service (default: "http://127.0.0.1:3000")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout (default: 60 seconds)
    #[serde(default = "default_transform_timeout", with = "duration_serde")]
    pub timeout: Duration,

    /// User-Agent header sent with each request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Retry policy for transient failures within one fetch
    #[serde(default = "default_transform_retry")]
    pub retry: RetryConfig,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout: default_transform_timeout(),
            user_agent: default_user_agent(),
            retry: default_transform_retry(),
        }
    }
}

/// Packager configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PackagerConfig {
    /// Base URL of the packager (default: "http://127.0.0.1:3000")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout (default: 300 seconds)
    #[serde(default = "default_packager_timeout", with = "duration_serde")]
    pub timeout: Duration,
}

impl Default for PackagerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout: default_packager_timeout(),
        }
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Policy that never retries
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }
}

fn default_scheme() -> String {
    crate::source_key::DEFAULT_SCHEME.to_string()
}

fn default_variant_priority() -> Vec<VariantId> {
    VariantId::ALL.to_vec()
}

fn default_max_concurrent_fetches() -> usize {
    VariantId::ALL.len()
}

fn default_event_buffer() -> usize {
    256
}

fn default_base_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_transform_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_packager_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_user_agent() -> String {
    concat!("offramp-preview/", env!("CARGO_PKG_VERSION")).to_string()
}

// LLM-backed transforms are slow; a couple of retries is enough for a preview
fn default_transform_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 2,
        max_delay: Duration::from_secs(10),
        ..RetryConfig::default()
    }
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let config: Config = serde_json::from_str(
            r#"{
                "variant_priority": ["ghibli"],
                "transform": { "base_url": "https://transform.example.com", "timeout": 5 }
            }"#,
        )
        .expect("deserialize failed");

        assert_eq!(config.default_scheme, "https");
        assert_eq!(config.transform.base_url, "https://transform.example.com");
        assert_eq!(config.transform.timeout, Duration::from_secs(5));
        assert_eq!(
            config.transform.retry.max_attempts, 2,
            "omitted retry block should use the transform default"
        );
        assert_eq!(config.packager.timeout, Duration::from_secs(300));
    }

    #[test]
    fn selection_order_appends_missing_variants_once() {
        let config = Config {
            variant_priority: vec![VariantId::Drudge, VariantId::Modern, VariantId::Drudge],
            ..Default::default()
        };

        assert_eq!(
            config.selection_order(),
            vec![
                VariantId::Drudge,
                VariantId::Modern,
                VariantId::Matrix,
                VariantId::Ghibli
            ]
        );
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let config = Config {
            max_concurrent_fetches: 0,
            ..Default::default()
        };

        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            Error::Config { key: Some(ref k), .. } if k == "max_concurrent_fetches"
        ));
    }

    #[test]
    fn unsupported_default_scheme_is_rejected() {
        let config = Config {
            default_scheme: "ftp".to_string(),
            ..Default::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_base_url_is_rejected() {
        let mut config = Config::default();
        config.packager.base_url = "not a url".to_string();

        let err = config.validate().unwrap_err();
        assert_eq!(err.error_code(), "config_error");
    }
}
