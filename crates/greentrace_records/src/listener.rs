//! # Event Listener
//!
//! Time-boxed subscriptions to the registry events.
//!
//! Listening is held open by leases. Every [`EventListener::enable`] call
//! grants a [`ListenLease`] with its own deadline; the subscriptions stay
//! open while at least one lease is unexpired and are dropped when the last
//! one expires, is released, or [`EventListener::disable`] revokes them all.
//! A later `enable` never shortens an earlier caller's window.

use std::sync::{Arc, Weak};
use std::time::Duration;

use greentrace_chain::{Address, ChainEventKind, EventSource, LogFilter, LogSink, Subscription};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::record::RecordKind;

/// What an event tells the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventClass {
    /// A request was submitted.
    Submitted,
    /// A request was approved.
    Approved,
    /// A request was rejected.
    Rejected,
    /// The NFT for an approved request was minted.
    AssetProduced,
    /// An NFT was burned in an exchange.
    AssetRetired,
}

impl EventClass {
    /// Classifies a registry event for an engine tracking `kind`.
    ///
    /// # Returns
    ///
    /// `None` for events that concern the other record kind.
    #[must_use]
    pub fn classify(kind: RecordKind, event: ChainEventKind) -> Option<Self> {
        match (kind, event) {
            (RecordKind::Mint, ChainEventKind::MintRequested)
            | (RecordKind::Exchange, ChainEventKind::ExchangeRequested) => Some(Self::Submitted),
            (_, ChainEventKind::AuditSubmitted { audit_type }) if audit_type == kind.audit_type() => {
                Some(Self::Approved)
            }
            (_, ChainEventKind::AuditRejected) => Some(Self::Rejected),
            (RecordKind::Mint, ChainEventKind::NftMinted) => Some(Self::AssetProduced),
            (_, ChainEventKind::NftExchanged) => Some(Self::AssetRetired),
            _ => None,
        }
    }
}

/// Registry events an engine tracking `kind` subscribes to.
#[must_use]
pub fn subscribed_events(kind: RecordKind) -> Vec<ChainEventKind> {
    let audit = ChainEventKind::AuditSubmitted {
        audit_type: kind.audit_type(),
    };
    match kind {
        RecordKind::Mint => vec![
            ChainEventKind::MintRequested,
            audit,
            ChainEventKind::AuditRejected,
            ChainEventKind::NftMinted,
            ChainEventKind::NftExchanged,
        ],
        RecordKind::Exchange => vec![
            ChainEventKind::ExchangeRequested,
            audit,
            ChainEventKind::AuditRejected,
            ChainEventKind::NftExchanged,
        ],
    }
}

/// Token for one caller's listening window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ListenLease {
    id: u64,
    deadline: Instant,
}

impl ListenLease {
    /// Lease id, unique per listener.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// When this lease stops holding the listener open.
    #[must_use]
    pub const fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left before the deadline.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

/// The set of live leases.
#[derive(Debug, Default)]
pub struct LeaseSet {
    next_id: u64,
    leases: Vec<ListenLease>,
}

impl LeaseSet {
    /// Grants a lease running from `now` for `duration`.
    pub fn grant(&mut self, now: Instant, duration: Duration) -> ListenLease {
        self.next_id += 1;
        let lease = ListenLease {
            id: self.next_id,
            deadline: now + duration,
        };
        self.leases.push(lease);
        lease
    }

    /// Revokes one lease. Returns whether it was live.
    pub fn revoke(&mut self, id: u64) -> bool {
        let before = self.leases.len();
        self.leases.retain(|lease| lease.id != id);
        self.leases.len() != before
    }

    /// Revokes every lease.
    pub fn revoke_all(&mut self) {
        self.leases.clear();
    }

    /// Drops leases whose deadline has passed. Returns how many were dropped.
    pub fn prune(&mut self, now: Instant) -> usize {
        let before = self.leases.len();
        self.leases.retain(|lease| lease.deadline > now);
        before - self.leases.len()
    }

    /// Whether any lease is unexpired at `now`.
    #[must_use]
    pub fn is_active(&self, now: Instant) -> bool {
        self.leases.iter().any(|lease| lease.deadline > now)
    }

    /// Latest deadline among live leases.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.leases.iter().map(|lease| lease.deadline).max()
    }

    /// Number of leases held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.leases.len()
    }

    /// Returns true if no lease is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.leases.is_empty()
    }
}

#[derive(Default)]
struct ListenerState {
    leases: LeaseSet,
    subscriptions: Vec<Subscription>,
    expiry: Option<JoinHandle<()>>,
}

/// Lease-bounded subscription manager.
pub struct EventListener {
    source: Arc<dyn EventSource>,
    filters: Vec<LogFilter>,
    sink: LogSink,
    runtime: Option<Handle>,
    state: Mutex<ListenerState>,
}

impl EventListener {
    /// Creates an idle listener.
    ///
    /// # Arguments
    ///
    /// * `source` - Event subscription service
    /// * `registry` - Registry contract address
    /// * `kind` - Record kind, selects the events subscribed to
    /// * `sink` - Receives every batch of matching logs
    /// * `runtime` - Runtime for expiry timers; without one leases only expire lazily
    #[must_use]
    pub fn new(
        source: Arc<dyn EventSource>,
        registry: Address,
        kind: RecordKind,
        sink: LogSink,
        runtime: Option<Handle>,
    ) -> Arc<Self> {
        let filters = subscribed_events(kind)
            .into_iter()
            .map(|event| LogFilter::registry_event(registry, event))
            .collect();
        Arc::new(Self {
            source,
            filters,
            sink,
            runtime,
            state: Mutex::new(ListenerState::default()),
        })
    }

    /// Opens (or extends) listening for `duration`.
    pub fn enable(self: &Arc<Self>, duration: Duration) -> ListenLease {
        let now = Instant::now();
        let mut state = self.state.lock();
        state.leases.prune(now);
        let lease = state.leases.grant(now, duration);

        if state.subscriptions.is_empty() {
            state.subscriptions = self
                .filters
                .iter()
                .map(|filter| self.source.subscribe(*filter, Arc::clone(&self.sink)))
                .collect();
            tracing::info!(
                events = self.filters.len(),
                window_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
                "event listening enabled"
            );
        } else {
            tracing::debug!(lease = lease.id, leases = state.leases.len(), "listening lease added");
        }

        self.rearm(&mut state);
        lease
    }

    /// Gives back one lease. Listening stops if it was the last live one.
    pub fn release(self: &Arc<Self>, lease: &ListenLease) {
        let mut state = self.state.lock();
        if !state.leases.revoke(lease.id) {
            return;
        }
        state.leases.prune(Instant::now());
        if state.leases.is_empty() {
            let closed = Self::close(&mut state);
            drop(state);
            drop(closed);
            tracing::info!("event listening released");
        } else {
            self.rearm(&mut state);
        }
    }

    /// Revokes every lease and closes the subscriptions.
    pub fn disable(&self) {
        let closed = {
            let mut state = self.state.lock();
            state.leases.revoke_all();
            Self::close(&mut state)
        };
        if !closed.is_empty() {
            tracing::info!("event listening disabled");
        }
    }

    /// Whether subscriptions are open and a lease is live.
    #[must_use]
    pub fn is_listening(&self) -> bool {
        let state = self.state.lock();
        !state.subscriptions.is_empty() && state.leases.is_active(Instant::now())
    }

    /// Number of leases currently held.
    #[must_use]
    pub fn lease_count(&self) -> usize {
        self.state.lock().leases.len()
    }

    fn expire(self: &Arc<Self>) {
        let mut state = self.state.lock();
        // This runs on the expiry task itself.
        state.expiry = None;
        let expired = state.leases.prune(Instant::now());
        if state.leases.is_empty() {
            let closed = Self::close(&mut state);
            drop(state);
            drop(closed);
            tracing::info!(expired, "event listening window elapsed");
        } else {
            self.rearm(&mut state);
        }
    }

    /// Stops the timer and hands back the subscriptions so they are dropped
    /// outside the lock.
    fn close(state: &mut ListenerState) -> Vec<Subscription> {
        if let Some(timer) = state.expiry.take() {
            timer.abort();
        }
        std::mem::take(&mut state.subscriptions)
    }

    fn rearm(self: &Arc<Self>, state: &mut ListenerState) {
        if let Some(timer) = state.expiry.take() {
            timer.abort();
        }
        let Some(deadline) = state.leases.deadline() else {
            return;
        };
        let Some(runtime) = self.runtime.as_ref() else {
            tracing::warn!("no runtime for listener expiry, leases expire lazily");
            return;
        };

        let weak: Weak<Self> = Arc::downgrade(self);
        state.expiry = Some(runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(listener) = weak.upgrade() {
                listener.expire();
            }
        }));
    }
}

impl Drop for EventListener {
    fn drop(&mut self) {
        if let Some(timer) = self.state.get_mut().expiry.take() {
            timer.abort();
        }
    }
}
