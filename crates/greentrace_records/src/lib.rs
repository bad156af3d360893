//! # GreenTrace Records
//!
//! Keeps the mint and exchange requests of one account (or of the audit
//! queue) up to date by reconciling three sources:
//!
//! - the registry contract, read in batches and treated as the authority
//! - registry events, turned into provisional records while listening
//! - a TTL cache, served while fresh data loads
//!
//! ## Architecture
//!
//! ```text
//!                ┌────────────────────────────────────────────┐
//!                │                RecordEngine                │
//!  connect ────▶ │  CacheStore ◀──▶ refresh ──▶ Fetcher       │ ──▶ BatchReader
//!  refresh       │                     │        Oracle        │
//!                │                     ▼                      │
//!                │  EventListener ──▶ merge ──▶ records()     │ ◀── EventSource
//!                └────────────────────────────────────────────┘
//!                        ▲
//!                NotificationBus<AssetRetired>
//! ```
//!
//! ## Status derivation
//!
//! The raw status code and the produced NFT id give the lifecycle stage
//! (see [`lifecycle`]). Whether that NFT still exists, as reported by the
//! [`existence`] oracle, decides whether a record is shown as exchanged.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]
#![allow(clippy::module_name_repetitions)]

pub mod bus;
pub mod cache;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod existence;
pub mod fetcher;
pub mod lifecycle;
pub mod listener;
pub mod reconcile;
pub mod record;
pub mod selectors;

pub use bus::{AssetRetired, NotificationBus};
pub use cache::{CacheEntry, CacheStatus, CacheStore, JsonFileStore, KeyValueStore, MemoryStore};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use engine::{Collaborators, RecordEngine};
pub use error::{ConfigError, EngineError, EngineResult, FetchError, StorageError};
pub use listener::{EventClass, ListenLease};
pub use record::{AssetPresence, Record, RecordKind, RecordSet, Scope, Source, Status};
pub use selectors::StatusCounts;
