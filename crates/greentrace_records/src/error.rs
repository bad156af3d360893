//! # Record Engine Error Types
//!
//! All errors that can occur in the record engine.
//!
//! Only [`FetchError`] and [`ConfigError`] ever reach a caller. Storage faults
//! are absorbed by the cache store and per-item read faults by the fetcher.

use greentrace_chain::ReadError;
use thiserror::Error;

/// Errors raised by a key-value storage backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The backend cannot be used at all.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// The value does not fit in the remaining quota.
    #[error("storage quota exceeded writing {key} ({bytes} bytes)")]
    QuotaExceeded {
        /// Key being written.
        key: String,
        /// Size of the rejected value.
        bytes: usize,
    },

    /// Filesystem or device failure.
    #[error("storage I/O failure: {0}")]
    Io(String),
}

/// Fetch-level failures: the record set could not be produced at all.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// No account is connected.
    #[error("no account connected")]
    NotConnected,

    /// The identifier list could not be resolved.
    #[error("could not resolve request ids via {method}: {source}")]
    IdList {
        /// Solidity signature of the failing lookup.
        method: &'static str,
        /// Underlying read error.
        source: ReadError,
    },
}

/// Errors loading or validating [`crate::EngineConfig`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("cannot read config file {path}: {detail}")]
    Io {
        /// Path that was read.
        path: String,
        /// OS error message.
        detail: String,
    },

    /// The TOML is malformed or has wrongly typed fields.
    #[error("invalid config syntax: {0}")]
    Parse(String),

    /// A field has an out-of-range value.
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// Dotted field path.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// User-visible engine errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The last refresh failed; previously loaded records are still served.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The engine could not be built from its configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type for fetch operations.
pub type FetchResult<T> = Result<T, FetchError>;

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
