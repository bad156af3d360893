//! # Engine Configuration
//!
//! Loaded once at startup from TOML. Every field has a default, so an empty
//! file (or no file) yields a working configuration.
//!
//! ```toml
//! [cache]
//! ttl_secs = 86400
//!
//! [listener]
//! default_duration_ms = 30000
//!
//! [contracts]
//! registry = "0x5FbDB2315678afecb367f032d93F642f64180aa3"
//! asset = "0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512"
//! ```

use std::path::Path;
use std::time::Duration;

use greentrace_chain::units::{DEFAULT_DECIMALS, MAX_DECIMALS};
use greentrace_chain::Address;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::listener::EventClass;

/// Complete engine configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Cache store settings.
    pub cache: CacheConfig,
    /// Event listener settings.
    pub listener: ListenerConfig,
    /// Authoritative fetch settings.
    pub fetch: FetchConfig,
    /// Existence probe settings.
    pub probe: ProbeConfig,
    /// Contract addresses.
    pub contracts: ContractsConfig,
}

/// Cache store settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum age of a usable entry, in seconds.
    pub ttl_secs: u64,
    /// Key prefix for an owner's mint requests.
    pub mint_prefix: String,
    /// Key prefix for an owner's exchange requests.
    pub exchange_prefix: String,
    /// Key prefix for the mint audit queue.
    pub audit_prefix: String,
    /// Key prefix for the exchange audit queue.
    pub exchange_audit_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 24 * 60 * 60,
            mint_prefix: "mint_records_".to_string(),
            exchange_prefix: "exchange_records_".to_string(),
            audit_prefix: "audit_center_".to_string(),
            exchange_audit_prefix: "exchange_audit_center_".to_string(),
        }
    }
}

impl CacheConfig {
    /// TTL as a duration.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Event listener settings. All values in milliseconds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Listening window used when the caller does not pick one.
    pub default_duration_ms: u64,
    /// Refresh delay after a submission event.
    pub submitted_delay_ms: u64,
    /// Refresh delay after an approval or rejection event.
    pub reviewed_delay_ms: u64,
    /// Refresh delay after an NFT was minted.
    pub asset_produced_delay_ms: u64,
    /// Refresh delay after an NFT was exchanged.
    pub asset_retired_delay_ms: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            default_duration_ms: 30_000,
            submitted_delay_ms: 3_000,
            reviewed_delay_ms: 2_000,
            asset_produced_delay_ms: 2_000,
            asset_retired_delay_ms: 1_000,
        }
    }
}

impl ListenerConfig {
    /// Default listening window.
    #[must_use]
    pub const fn default_duration(&self) -> Duration {
        Duration::from_millis(self.default_duration_ms)
    }

    /// How long to wait after an event before re-reading contract state.
    #[must_use]
    pub const fn delay_for(&self, class: EventClass) -> Duration {
        let ms = match class {
            EventClass::Submitted => self.submitted_delay_ms,
            EventClass::Approved | EventClass::Rejected => self.reviewed_delay_ms,
            EventClass::AssetProduced => self.asset_produced_delay_ms,
            EventClass::AssetRetired => self.asset_retired_delay_ms,
        };
        Duration::from_millis(ms)
    }
}

/// Authoritative fetch settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Detail reads per batch. Batches run concurrently.
    pub detail_chunk_size: usize,
    /// Fixed-point scale of on-chain amounts.
    pub unit_decimals: u8,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            detail_chunk_size: 100,
            unit_decimals: DEFAULT_DECIMALS,
        }
    }
}

/// Existence probe settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Extra attempts for probes that failed with a transient error.
    pub retries: u32,
    /// Pause between attempts.
    pub retry_delay_ms: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            retries: 1,
            retry_delay_ms: 500,
        }
    }
}

impl ProbeConfig {
    /// Pause between attempts.
    #[must_use]
    pub const fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Contract addresses.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContractsConfig {
    /// Request registry.
    pub registry: Address,
    /// NFT contract minted into after approval.
    pub asset: Address,
}

impl EngineConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML and
    /// [`ConfigError::Invalid`] for out-of-range values.
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`EngineConfig::from_toml_str`].
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            detail: e.to_string(),
        })?;
        Self::from_toml_str(&text)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.fetch.detail_chunk_size == 0 {
            return Err(ConfigError::Invalid {
                field: "fetch.detail_chunk_size",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.fetch.unit_decimals > MAX_DECIMALS {
            return Err(ConfigError::Invalid {
                field: "fetch.unit_decimals",
                reason: format!("must not exceed {MAX_DECIMALS}"),
            });
        }
        if self.cache.ttl_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "cache.ttl_secs",
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.cache.ttl(), Duration::from_secs(86_400));
        assert_eq!(config.listener.default_duration(), Duration::from_secs(30));
        assert_eq!(config.fetch.unit_decimals, 18);
    }

    #[test]
    fn test_partial_document_overrides_fields() {
        let config = EngineConfig::from_toml_str(
            r#"
            [listener]
            default_duration_ms = 15000

            [contracts]
            registry = "0x5FbDB2315678afecb367f032d93F642f64180aa3"
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.default_duration_ms, 15_000);
        assert_eq!(config.listener.submitted_delay_ms, 3_000);
        assert_ne!(config.contracts.registry, Address::ZERO);
        assert_eq!(config.contracts.asset, Address::ZERO);
    }

    #[test]
    fn test_event_delays() {
        let listener = ListenerConfig::default();
        assert_eq!(listener.delay_for(EventClass::Submitted), Duration::from_secs(3));
        assert_eq!(listener.delay_for(EventClass::Rejected), Duration::from_secs(2));
        assert_eq!(listener.delay_for(EventClass::AssetRetired), Duration::from_secs(1));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = EngineConfig::from_toml_str("[fetch]\ndetail_chunk_size = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "fetch.detail_chunk_size", .. }));

        let err = EngineConfig::from_toml_str("[fetch]\nunit_decimals = 60").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "fetch.unit_decimals", .. }));

        let err = EngineConfig::from_toml_str("[cache\nttl_secs = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = EngineConfig::from_file("/nonexistent/greentrace.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
