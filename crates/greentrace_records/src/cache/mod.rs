//! # Cache Store
//!
//! Per-account, TTL-bound copy of the last known-good record set.
//!
//! Entries are stored as JSON `{"data": [...], "timestamp": <ms>}` under a
//! key built from a per-view prefix and the lowercased account address.
//! The cache is an optimization layer: every storage or parse failure is
//! logged and reported as a miss.

mod store;

pub use store::{JsonFileStore, KeyValueStore, MemoryStore};

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::config::CacheConfig;
use crate::record::{Record, RecordKind, Scope};

/// Stored form of a cache entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Cached records.
    pub data: Vec<Record>,
    /// Write time, milliseconds since the epoch.
    pub timestamp: u64,
}

/// Cache introspection for status displays.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStatus {
    /// An entry exists and parses.
    pub has_cache: bool,
    /// Records in the entry, expired or not.
    pub cache_count: usize,
    /// The entry is within its TTL.
    pub cache_valid: bool,
}

/// TTL cache over a [`KeyValueStore`].
pub struct CacheStore {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    config: CacheConfig,
}

impl CacheStore {
    /// Creates a cache store.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, config: CacheConfig) -> Self {
        Self { store, clock, config }
    }

    /// Storage key for a view.
    #[must_use]
    pub fn key(&self, kind: RecordKind, scope: Scope) -> String {
        let prefix = match (kind, scope) {
            (RecordKind::Mint, Scope::Owner(_)) => &self.config.mint_prefix,
            (RecordKind::Exchange, Scope::Owner(_)) => &self.config.exchange_prefix,
            (RecordKind::Mint, Scope::AuditQueue(_)) => &self.config.audit_prefix,
            (RecordKind::Exchange, Scope::AuditQueue(_)) => &self.config.exchange_audit_prefix,
        };
        format!("{prefix}{}", scope.account()).to_lowercase()
    }

    /// Returns the cached records if present and not older than the TTL.
    pub async fn get(&self, key: &str) -> Option<Vec<Record>> {
        let entry = self.read_entry(key).await?;
        if self.is_expired(&entry) {
            tracing::debug!(key, age_ms = self.age_ms(&entry), "cache entry expired");
            return None;
        }
        Some(entry.data)
    }

    /// Writes the records with the current time.
    ///
    /// # Returns
    ///
    /// Whether the entry was stored.
    pub async fn put(&self, key: &str, records: &[Record]) -> bool {
        let entry = CacheEntry {
            data: records.to_vec(),
            timestamp: self.clock.now_ms(),
        };
        let text = match serde_json::to_string(&entry) {
            Ok(text) => text,
            Err(error) => {
                tracing::warn!(key, %error, "cache entry not serializable");
                return false;
            }
        };
        match self.store.set(key, text).await {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(key, %error, "cache write failed");
                false
            }
        }
    }

    /// Removes the entry. Safe to call repeatedly.
    pub async fn invalidate(&self, key: &str) {
        if let Err(error) = self.store.remove(key).await {
            tracing::warn!(key, %error, "cache invalidation failed");
        }
    }

    /// Describes the entry without applying the TTL to `has_cache`.
    pub async fn status(&self, key: &str) -> CacheStatus {
        match self.read_entry(key).await {
            Some(entry) => CacheStatus {
                has_cache: true,
                cache_count: entry.data.len(),
                cache_valid: !self.is_expired(&entry),
            },
            None => CacheStatus::default(),
        }
    }

    async fn read_entry(&self, key: &str) -> Option<CacheEntry> {
        let text = match self.store.get(key).await {
            Ok(Some(text)) => text,
            Ok(None) => return None,
            Err(error) => {
                tracing::warn!(key, %error, "cache read failed");
                return None;
            }
        };
        match serde_json::from_str(&text) {
            Ok(entry) => Some(entry),
            Err(error) => {
                tracing::warn!(key, %error, "corrupt cache entry");
                None
            }
        }
    }

    fn age_ms(&self, entry: &CacheEntry) -> u64 {
        self.clock.now_ms().saturating_sub(entry.timestamp)
    }

    fn is_expired(&self, entry: &CacheEntry) -> bool {
        Duration::from_millis(self.age_ms(entry)) > self.config.ttl()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::record::{AssetPresence, Source, Status};
    use greentrace_chain::{Address, TokenAmount, U256};

    const ACCOUNT: Address = Address::repeat_byte(0xab);

    fn record(id: u64) -> Record {
        Record {
            kind: RecordKind::Mint,
            id: U256::from(id),
            identity_key: Record::transaction_ref(RecordKind::Mint, U256::from(id)),
            title: format!("Request {id}"),
            details: String::new(),
            quantity: TokenAmount::ZERO,
            fee_paid: TokenAmount::ZERO,
            status: Status::Pending,
            auditor: None,
            audited_value: None,
            audit_comment: None,
            audited_at: None,
            secondary_asset_id: None,
            token_uri: None,
            requester: Some(ACCOUNT),
            source: Source::Contract,
            created_at: id,
            presence: AssetPresence::Unchecked,
        }
    }

    fn cache() -> (CacheStore, Arc<MemoryStore>, Arc<ManualClock>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let cache = CacheStore::new(store.clone(), clock.clone(), CacheConfig::default());
        (cache, store, clock)
    }

    #[test]
    fn test_keys_are_prefixed_and_lowercased() {
        let (cache, _, _) = cache();
        let account = Address::repeat_byte(0xAB);
        let key = cache.key(RecordKind::Mint, Scope::Owner(account));
        assert_eq!(key, format!("mint_records_0x{}", "ab".repeat(20)));
        assert!(cache
            .key(RecordKind::Exchange, Scope::AuditQueue(account))
            .starts_with("exchange_audit_center_0x"));
    }

    #[tokio::test]
    async fn test_ttl_boundary() {
        let (cache, _, clock) = cache();
        let key = cache.key(RecordKind::Mint, Scope::Owner(ACCOUNT));
        assert!(cache.put(&key, &[record(1)]).await);

        clock.advance(Duration::from_secs(23 * 3600 + 59 * 60));
        assert_eq!(cache.get(&key).await.unwrap().len(), 1);

        clock.advance(Duration::from_secs(2 * 60));
        assert!(cache.get(&key).await.is_none());

        let status = cache.status(&key).await;
        assert!(status.has_cache);
        assert_eq!(status.cache_count, 1);
        assert!(!status.cache_valid);
    }

    #[tokio::test]
    async fn test_configured_ttl_is_inclusive() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let config = CacheConfig { ttl_secs: 60, ..CacheConfig::default() };
        let cache = CacheStore::new(store, clock.clone(), config);
        let key = cache.key(RecordKind::Mint, Scope::Owner(ACCOUNT));
        cache.put(&key, &[record(1)]).await;

        clock.advance(Duration::from_secs(60));
        assert!(cache.get(&key).await.is_some());

        clock.advance(Duration::from_millis(1));
        assert!(cache.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_empty_set_is_a_hit() {
        let (cache, _, _) = cache();
        let key = cache.key(RecordKind::Mint, Scope::Owner(ACCOUNT));
        assert!(cache.get(&key).await.is_none());
        cache.put(&key, &[]).await;
        assert_eq!(cache.get(&key).await, Some(Vec::new()));
    }

    #[tokio::test]
    async fn test_storage_faults_are_misses() {
        let (cache, store, _) = cache();
        let key = cache.key(RecordKind::Mint, Scope::Owner(ACCOUNT));

        store.insert_raw(&key, "{not json");
        assert!(cache.get(&key).await.is_none());
        assert_eq!(cache.status(&key).await, CacheStatus::default());

        store.set_offline(true);
        assert!(!cache.put(&key, &[record(1)]).await);
        assert!(cache.get(&key).await.is_none());
        cache.invalidate(&key).await;
    }

    #[tokio::test]
    async fn test_invalidate_is_idempotent() {
        let (cache, store, _) = cache();
        let key = cache.key(RecordKind::Mint, Scope::Owner(ACCOUNT));
        cache.put(&key, &[record(1), record(2)]).await;

        cache.invalidate(&key).await;
        cache.invalidate(&key).await;
        assert!(store.raw(&key).is_none());
        assert!(cache.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_entry_format() {
        let (cache, store, clock) = cache();
        let key = cache.key(RecordKind::Mint, Scope::Owner(ACCOUNT));
        cache.put(&key, &[record(3)]).await;

        let raw: serde_json::Value = serde_json::from_str(&store.raw(&key).unwrap()).unwrap();
        assert_eq!(raw["timestamp"], serde_json::json!(clock.now_ms()));
        assert_eq!(raw["data"].as_array().unwrap().len(), 1);
    }
}
