//! # Record Engine
//!
//! Public read API. Ties the cache store, the authoritative fetcher, the
//! existence oracle and the event listener together for one record kind
//! and one connected scope.
//!
//! ## Refresh protocol
//!
//! ```text
//! connect ──▶ valid cache? ──▶ apply cached records
//!     ▼
//! refresh(force) ──▶ generation += 1
//!     │ force: invalidate cache
//!     ▼
//! fetch ids ──▶ chunked detail reads ──▶ existence probes
//!     ▼
//! apply if scope unchanged and no newer generation applied
//!     ▼
//! merge(event, contract) ──▶ cache put ──▶ revision += 1
//! ```
//!
//! A failed fetch records the error and leaves the records in place.
//! Events arriving while listening add provisional records and schedule a
//! forced refresh after a per-event delay. Scheduled refreshes are aborted
//! when the scope changes or the engine is dropped.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use greentrace_chain::{
    BatchReader, ChainEvent, EventParser, EventSource, LogSink, RawLog, TokenAmount,
};
use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::bus::{AssetRetired, NotificationBus};
use crate::cache::{CacheStatus, CacheStore, KeyValueStore};
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult, FetchError, FetchResult};
use crate::existence::ExistenceOracle;
use crate::fetcher::AuthoritativeFetcher;
use crate::lifecycle::is_forward;
use crate::listener::{EventClass, EventListener, ListenLease};
use crate::reconcile::merge;
use crate::record::{AssetPresence, Record, RecordKind, Scope, Source, Status};
use crate::selectors::{self, StatusCounts};

/// Title given to records known only from an event.
pub const PROVISIONAL_TITLE: &str = "Awaiting confirmation";

/// External services the engine depends on.
#[derive(Clone)]
pub struct Collaborators {
    /// Batch contract reads.
    pub reader: Arc<dyn BatchReader>,
    /// Event subscriptions.
    pub events: Arc<dyn EventSource>,
    /// Cache storage.
    pub store: Arc<dyn KeyValueStore>,
    /// Wall clock for cache timestamps and provisional records.
    pub clock: Arc<dyn Clock>,
}

impl Collaborators {
    /// Bundles the services with the system clock.
    #[must_use]
    pub fn new(
        reader: Arc<dyn BatchReader>,
        events: Arc<dyn EventSource>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self {
            reader,
            events,
            store,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// A record first seen through an event.
struct Provisional {
    seq: u64,
    record: Record,
}

#[derive(Default)]
struct EngineState {
    scope: Option<Scope>,
    /// Bumped on every scope change.
    epoch: u64,
    applied_generation: u64,
    in_flight: usize,
    contract_records: Vec<Record>,
    event_records: Vec<Provisional>,
    next_event_seq: u64,
    merged: Vec<Record>,
    error: Option<EngineError>,
}

impl EngineState {
    fn remerge(&mut self) {
        let events: Vec<Record> = self.event_records.iter().map(|p| p.record.clone()).collect();
        self.merged = merge(&events, &self.contract_records);
    }

    fn insert_provisional(&mut self, record: Record) {
        self.event_records
            .retain(|p| p.record.identity_key != record.identity_key);
        self.event_records.push(Provisional {
            seq: self.next_event_seq,
            record,
        });
        self.next_event_seq += 1;
    }

    fn reset(&mut self, scope: Option<Scope>) {
        self.scope = scope;
        self.epoch += 1;
        self.contract_records.clear();
        self.event_records.clear();
        self.merged.clear();
        self.error = None;
    }
}

/// Identifies one refresh when its result comes back.
#[derive(Clone, Copy, Debug)]
struct RefreshTicket {
    epoch: u64,
    generation: u64,
    event_mark: u64,
    force: bool,
}

#[derive(Default)]
struct TaskSet {
    refresh_timers: Vec<JoinHandle<()>>,
    bus_listeners: Vec<JoinHandle<()>>,
}

struct Inner {
    kind: RecordKind,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    cache: CacheStore,
    fetcher: AuthoritativeFetcher,
    oracle: ExistenceOracle,
    listener: Arc<EventListener>,
    runtime: Option<Handle>,
    generation: AtomicU64,
    state: RwLock<EngineState>,
    tasks: Mutex<TaskSet>,
    revision: watch::Sender<u64>,
}

/// Reconciled view of one record kind for the connected account.
///
/// Cloning is cheap and every clone drives the same engine.
#[derive(Clone)]
pub struct RecordEngine {
    inner: Arc<Inner>,
}

impl RecordEngine {
    /// Builds an engine. Call from within a Tokio runtime so refresh and
    /// lease timers can be scheduled.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] if the configuration is invalid.
    pub fn new(
        kind: RecordKind,
        config: EngineConfig,
        collaborators: Collaborators,
    ) -> EngineResult<Self> {
        config.validate()?;

        let runtime = Handle::try_current().ok();
        if runtime.is_none() {
            tracing::warn!("record engine built outside a runtime, timers are disabled");
        }
        let (revision, _) = watch::channel(0);
        let Collaborators {
            reader,
            events,
            store,
            clock,
        } = collaborators;

        let inner = Arc::new_cyclic(|engine: &Weak<Inner>| Inner {
            kind,
            cache: CacheStore::new(store, Arc::clone(&clock), config.cache.clone()),
            fetcher: AuthoritativeFetcher::new(
                Arc::clone(&reader),
                config.contracts.registry,
                config.fetch.detail_chunk_size,
                config.fetch.unit_decimals,
            ),
            oracle: ExistenceOracle::new(
                reader,
                config.contracts.asset,
                config.probe.retries,
                config.probe.retry_delay(),
            ),
            listener: EventListener::new(
                events,
                config.contracts.registry,
                kind,
                event_sink(engine.clone()),
                runtime.clone(),
            ),
            clock,
            runtime,
            generation: AtomicU64::new(0),
            state: RwLock::new(EngineState::default()),
            tasks: Mutex::new(TaskSet::default()),
            revision,
            config,
        });

        Ok(Self { inner })
    }

    /// Record kind this engine tracks.
    #[must_use]
    pub fn kind(&self) -> RecordKind {
        self.inner.kind
    }

    /// Engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Connected scope, if any.
    #[must_use]
    pub fn scope(&self) -> Option<Scope> {
        self.inner.state.read().scope
    }

    // =========================================================================
    // Connection and refresh
    // =========================================================================

    /// Connects a scope and loads its records.
    ///
    /// A valid cache entry is shown first, then the chain is read. Switching to a different scope drops the previous scope's records and
    /// cancels its scheduled refreshes first.
    ///
    /// # Errors
    ///
    /// Returns the initial load's error; the engine stays connected.
    pub async fn connect(&self, scope: Scope) -> EngineResult<()> {
        let switched = {
            let mut state = self.inner.state.write();
            let switched = state.scope != Some(scope);
            if switched {
                state.reset(Some(scope));
            }
            switched
        };
        if switched {
            self.inner.cancel_timers();
            tracing::info!(kind = ?self.inner.kind, account = %scope.account(), "scope connected");
            self.inner.notify();
        }
        self.inner.serve_cached().await;
        self.inner.refresh(false).await
    }

    /// Disconnects, dropping records, scheduled refreshes and listening.
    pub fn disconnect(&self) {
        let was_connected = {
            let mut state = self.inner.state.write();
            let was_connected = state.scope.is_some();
            state.reset(None);
            was_connected
        };
        self.inner.cancel_timers();
        self.inner.listener.disable();
        if was_connected {
            tracing::info!(kind = ?self.inner.kind, "scope disconnected");
        }
        self.inner.notify();
    }

    /// Reloads the records from the chain and re-probes produced assets.
    ///
    /// With `force`, the cache entry is removed before reading and the
    /// provisional records covered by the read are dropped once it succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::NotConnected`] without a scope, or the fetch
    /// error. On error the previous records remain available.
    pub async fn refresh(&self, force: bool) -> EngineResult<()> {
        self.inner.refresh(force).await
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Merged records, newest first.
    #[must_use]
    pub fn records(&self) -> Vec<Record> {
        self.inner.state.read().merged.clone()
    }

    /// Whether a refresh is in flight.
    #[must_use]
    pub fn loading(&self) -> bool {
        self.inner.state.read().in_flight > 0
    }

    /// Error of the last refresh, cleared by the next successful one.
    #[must_use]
    pub fn error(&self) -> Option<EngineError> {
        self.inner.state.read().error.clone()
    }

    /// Provisional records held.
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.inner.state.read().event_records.len()
    }

    /// Authoritative records held.
    #[must_use]
    pub fn contract_count(&self) -> usize {
        self.inner.state.read().contract_records.len()
    }

    /// Records per displayed status.
    #[must_use]
    pub fn status_counts(&self) -> StatusCounts {
        selectors::status_counts(&self.inner.state.read().merged)
    }

    /// Records grouped by displayed status.
    #[must_use]
    pub fn partition_by_status(&self) -> BTreeMap<Status, Vec<Record>> {
        selectors::partition_by_status(&self.inner.state.read().merged)
    }

    /// Records awaiting review.
    #[must_use]
    pub fn pending_records(&self) -> Vec<Record> {
        selectors::pending(&self.inner.state.read().merged)
    }

    /// Reviewed records.
    #[must_use]
    pub fn completed_records(&self) -> Vec<Record> {
        selectors::completed(&self.inner.state.read().merged)
    }

    /// Cache introspection for the connected scope.
    pub async fn cache_status(&self) -> CacheStatus {
        let Some(scope) = self.scope() else {
            return CacheStatus::default();
        };
        let key = self.inner.cache.key(self.inner.kind, scope);
        self.inner.cache.status(&key).await
    }

    /// Receiver whose value changes every time the visible state changes.
    #[must_use]
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.inner.revision.subscribe()
    }

    /// Scheduled refreshes that have not run yet.
    #[must_use]
    pub fn scheduled_refreshes(&self) -> usize {
        self.inner
            .tasks
            .lock()
            .refresh_timers
            .iter()
            .filter(|timer| !timer.is_finished())
            .count()
    }

    // =========================================================================
    // Event listening
    // =========================================================================

    /// Listens for registry events for `duration`, or the configured default.
    pub fn enable_event_listening(&self, duration: Option<Duration>) -> ListenLease {
        let duration = duration.unwrap_or_else(|| self.inner.config.listener.default_duration());
        self.inner.listener.enable(duration)
    }

    /// Gives back a lease before its deadline.
    pub fn release_listen_lease(&self, lease: &ListenLease) {
        self.inner.listener.release(lease);
    }

    /// Stops listening for every caller.
    pub fn disable_event_listening(&self) {
        self.inner.listener.disable();
    }

    /// Whether registry events are being received.
    #[must_use]
    pub fn is_event_listening(&self) -> bool {
        self.inner.listener.is_listening()
    }

    /// Forces a refresh whenever an asset is retired elsewhere.
    ///
    /// # Returns
    ///
    /// `false` if the engine has no runtime to run the subscription on.
    pub fn attach_bus(&self, bus: &NotificationBus<AssetRetired>) -> bool {
        let Some(runtime) = self.inner.runtime.as_ref() else {
            tracing::warn!("cannot attach notification bus without a runtime");
            return false;
        };

        let mut receiver = bus.subscribe();
        let engine = Arc::downgrade(&self.inner);
        let task = runtime.spawn(async move {
            loop {
                let asset_id = match receiver.recv().await {
                    Ok(note) => Some(note.asset_id),
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "asset notifications lagged");
                        None
                    }
                    Err(RecvError::Closed) => break,
                };
                let Some(inner) = engine.upgrade() else {
                    break;
                };
                let connected = inner.state.read().scope.is_some();
                if !connected {
                    continue;
                }
                tracing::debug!(?asset_id, "asset retired elsewhere, refreshing");
                if let Err(error) = inner.refresh(true).await {
                    tracing::debug!(%error, "notification-driven refresh failed");
                }
            }
        });
        self.inner.tasks.lock().bus_listeners.push(task);
        true
    }
}

impl Inner {
    fn notify(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }

    /// Registers a load for the connected scope and hands out its ticket.
    fn begin(&self, force: bool) -> FetchResult<(Scope, RefreshTicket)> {
        let begun = {
            let mut state = self.state.write();
            let Some(scope) = state.scope else {
                return Err(FetchError::NotConnected);
            };
            state.in_flight += 1;
            let ticket = RefreshTicket {
                epoch: state.epoch,
                generation: self.generation.fetch_add(1, Ordering::SeqCst) + 1,
                event_mark: state.next_event_seq,
                force,
            };
            (scope, ticket)
        };
        self.notify();
        Ok(begun)
    }

    /// Shows a valid cache entry while the chain read is pending.
    async fn serve_cached(&self) -> bool {
        let Ok((scope, ticket)) = self.begin(false) else {
            return false;
        };
        let key = self.cache.key(self.kind, scope);
        if let Some(cached) = self.cache.get(&key).await {
            tracing::debug!(key = %key, records = cached.len(), "serving cached records");
            return self.apply(ticket, cached);
        }
        {
            let mut state = self.state.write();
            state.in_flight = state.in_flight.saturating_sub(1);
        }
        self.notify();
        false
    }

    async fn refresh(&self, force: bool) -> EngineResult<()> {
        let (scope, ticket) = self.begin(force)?;
        let key = self.cache.key(self.kind, scope);
        if force {
            self.cache.invalidate(&key).await;
        }

        let fetched = match self.fetcher.fetch(self.kind, scope).await {
            Ok(mut records) => {
                let prior = self.prior_presence(ticket.epoch);
                self.oracle.annotate(&mut records, &prior).await;
                Ok(records)
            }
            Err(error) => Err(error),
        };

        match fetched {
            Ok(records) => {
                if self.apply(ticket, records.clone()) {
                    self.cache.put(&key, &records).await;
                }
                Ok(())
            }
            Err(error) => {
                self.fail(ticket, error.clone());
                Err(error.into())
            }
        }
    }

    /// Installs a refresh result. Returns whether it was applied.
    fn apply(&self, ticket: RefreshTicket, records: Vec<Record>) -> bool {
        let applied = {
            let mut state = self.state.write();
            state.in_flight = state.in_flight.saturating_sub(1);
            if state.epoch != ticket.epoch {
                tracing::debug!(generation = ticket.generation, "discarding refresh for previous scope");
                false
            } else if ticket.generation < state.applied_generation {
                tracing::debug!(
                    generation = ticket.generation,
                    applied = state.applied_generation,
                    "discarding stale refresh"
                );
                false
            } else {
                state.applied_generation = ticket.generation;
                state.contract_records = records;
                if ticket.force {
                    state.event_records.retain(|p| p.seq >= ticket.event_mark);
                }
                state.error = None;
                state.remerge();
                true
            }
        };
        self.notify();
        applied
    }

    fn fail(&self, ticket: RefreshTicket, error: FetchError) {
        {
            let mut state = self.state.write();
            state.in_flight = state.in_flight.saturating_sub(1);
            if state.epoch == ticket.epoch && ticket.generation >= state.applied_generation {
                tracing::error!(%error, "refresh failed, keeping previous records");
                state.error = Some(EngineError::Fetch(error));
            }
        }
        self.notify();
    }

    fn prior_presence(&self, epoch: u64) -> HashMap<String, AssetPresence> {
        let state = self.state.read();
        if state.epoch != epoch {
            return HashMap::new();
        }
        state
            .contract_records
            .iter()
            .map(|record| (record.identity_key.clone(), record.presence))
            .collect()
    }

    fn on_logs(self: &Arc<Self>, logs: &[RawLog]) {
        if !self.listener.is_listening() {
            return;
        }
        for event in EventParser::parse_all(logs) {
            let Some(class) = EventClass::classify(self.kind, event.kind) else {
                continue;
            };
            if self.absorb_event(class, &event) {
                self.schedule_refresh(class);
            } else {
                tracing::trace!(event = event.kind.name(), id = %event.request_id, "event outside scope");
            }
        }
    }

    /// Records what the event says. Returns whether it concerns the scope.
    fn absorb_event(&self, class: EventClass, event: &ChainEvent) -> bool {
        let now = self.clock.now_secs();
        let mut state = self.state.write();
        let Some(scope) = state.scope else {
            return false;
        };
        let audit_queue = matches!(scope, Scope::AuditQueue(_));
        let known = state
            .merged
            .iter()
            .find(|record| record.id == event.request_id)
            .cloned();

        let (relevant, provisional) = match class {
            EventClass::Submitted => {
                let mine = audit_queue || event.party == scope.account();
                let mut record = self.provisional(event, Status::Pending, now);
                record.requester = Some(event.party);
                (mine, mine.then_some(record))
            }
            // Rejections carry no audit type, so the id may belong to the other kind.
            EventClass::Rejected => (known.is_some() || audit_queue, None),
            EventClass::Approved => {
                let status = Status::Approved;
                match known {
                    // Contract data outranks the event; only the refresh may change it.
                    Some(record) if record.source == Source::Contract => (true, None),
                    Some(mut record) => {
                        let advance = is_forward(record.status, status);
                        record.status = status;
                        record.auditor = Some(event.party);
                        (true, advance.then_some(record))
                    }
                    None if audit_queue => {
                        let mut record = self.provisional(event, status, now);
                        record.auditor = Some(event.party);
                        (true, Some(record))
                    }
                    None => (false, None),
                }
            }
            EventClass::AssetProduced => (known.is_some() || audit_queue, None),
            EventClass::AssetRetired => {
                let holds_asset = state
                    .merged
                    .iter()
                    .any(|record| record.secondary_asset_id == Some(event.request_id));
                (holds_asset, None)
            }
        };

        if let Some(record) = provisional {
            tracing::debug!(event = event.kind.name(), id = %record.id, "provisional record added");
            state.insert_provisional(record);
            state.remerge();
            drop(state);
            self.notify();
        }
        relevant
    }

    fn provisional(&self, event: &ChainEvent, status: Status, now: u64) -> Record {
        let zero = TokenAmount::from_raw(0, self.config.fetch.unit_decimals);
        let block = event
            .block_number
            .map_or_else(|| "pending block".to_string(), |block| format!("block {block}"));
        Record {
            kind: self.kind,
            id: event.request_id,
            identity_key: Record::identity_key_for(self.kind, event.request_id, now),
            title: PROVISIONAL_TITLE.to_string(),
            details: format!("{} seen in {block}", event.kind.name()),
            quantity: zero,
            fee_paid: zero,
            status,
            auditor: None,
            audited_value: None,
            audit_comment: None,
            audited_at: None,
            secondary_asset_id: None,
            token_uri: None,
            requester: None,
            source: Source::Event,
            created_at: now,
            presence: AssetPresence::Unchecked,
        }
    }

    fn schedule_refresh(self: &Arc<Self>, class: EventClass) {
        let Some(runtime) = self.runtime.as_ref() else {
            tracing::warn!(?class, "no runtime, event refresh not scheduled");
            return;
        };
        let delay = self.config.listener.delay_for(class);
        let epoch = self.state.read().epoch;
        let engine = Arc::downgrade(self);

        let timer = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = engine.upgrade() else {
                return;
            };
            let current = inner.state.read().epoch;
            if current != epoch {
                return;
            }
            if let Err(error) = inner.refresh(true).await {
                tracing::debug!(%error, "event-driven refresh failed");
            }
        });

        let mut tasks = self.tasks.lock();
        tasks.refresh_timers.retain(|timer| !timer.is_finished());
        tasks.refresh_timers.push(timer);
        tracing::debug!(
            ?class,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "refresh scheduled"
        );
    }

    fn cancel_timers(&self) {
        let timers = std::mem::take(&mut self.tasks.lock().refresh_timers);
        for timer in &timers {
            timer.abort();
        }
        if !timers.is_empty() {
            tracing::debug!(cancelled = timers.len(), "scheduled refreshes cancelled");
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let tasks = self.tasks.get_mut();
        for task in tasks.refresh_timers.drain(..).chain(tasks.bus_listeners.drain(..)) {
            task.abort();
        }
    }
}

fn event_sink(engine: Weak<Inner>) -> LogSink {
    Arc::new(move |logs: Vec<RawLog>| {
        if let Some(inner) = engine.upgrade() {
            inner.on_logs(&logs);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use crate::clock::ManualClock;
    use greentrace_chain::{Address, ChainEventKind, ChainSimulator, U256};

    const REGISTRY: Address = Address::repeat_byte(0xaa);
    const ASSET: Address = Address::repeat_byte(0xbb);
    const ALICE: Address = Address::repeat_byte(0x01);

    fn engine(chain: &Arc<ChainSimulator>) -> RecordEngine {
        let mut config = EngineConfig::default();
        config.contracts.registry = REGISTRY;
        config.contracts.asset = ASSET;
        let collaborators = Collaborators::new(chain.clone(), chain.clone(), Arc::new(MemoryStore::new()))
            .with_clock(Arc::new(ManualClock::new(1_700_000_000_000)));
        RecordEngine::new(RecordKind::Mint, config, collaborators).unwrap()
    }

    fn ticket(engine: &RecordEngine, generation: u64) -> RefreshTicket {
        let mut state = engine.inner.state.write();
        state.in_flight += 1;
        RefreshTicket {
            epoch: state.epoch,
            generation,
            event_mark: state.next_event_seq,
            force: false,
        }
    }

    #[tokio::test]
    async fn test_older_generation_is_discarded() {
        let chain = Arc::new(ChainSimulator::new(REGISTRY, ASSET));
        chain.submit_mint(ALICE, "Mangroves", 1, 0);
        let engine = engine(&chain);
        engine.connect(Scope::Owner(ALICE)).await.unwrap();

        let stale = ticket(&engine, 0);
        assert!(!engine.inner.apply(stale, Vec::new()));
        assert_eq!(engine.records().len(), 1);
        assert!(!engine.loading());
    }

    #[tokio::test]
    async fn test_result_for_previous_scope_is_discarded() {
        let chain = Arc::new(ChainSimulator::new(REGISTRY, ASSET));
        chain.submit_mint(ALICE, "Mangroves", 1, 0);
        let engine = engine(&chain);
        engine.connect(Scope::Owner(ALICE)).await.unwrap();

        let mut previous = ticket(&engine, u64::MAX);
        previous.epoch -= 1;
        assert!(!engine.inner.apply(previous, Vec::new()));
        assert_eq!(engine.records().len(), 1);
    }

    #[tokio::test]
    async fn test_stale_failure_does_not_set_error() {
        let chain = Arc::new(ChainSimulator::new(REGISTRY, ASSET));
        let engine = engine(&chain);
        engine.connect(Scope::Owner(ALICE)).await.unwrap();

        let stale = ticket(&engine, 0);
        engine.inner.fail(stale, FetchError::NotConnected);
        assert!(engine.error().is_none());

        let current = ticket(&engine, u64::MAX);
        engine.inner.fail(current, FetchError::NotConnected);
        assert_eq!(engine.error(), Some(EngineError::Fetch(FetchError::NotConnected)));
    }

    #[tokio::test]
    async fn test_forced_result_keeps_later_events() {
        let chain = Arc::new(ChainSimulator::new(REGISTRY, ASSET));
        let engine = engine(&chain);
        engine.connect(Scope::Owner(ALICE)).await.unwrap();

        let mut forced = ticket(&engine, u64::MAX);
        forced.force = true;
        {
            let mut state = engine.inner.state.write();
            let record = engine.inner.provisional(
                &ChainEvent {
                    kind: ChainEventKind::MintRequested,
                    request_id: U256::from(9),
                    party: ALICE,
                    block_number: None,
                    transaction_hash: None,
                },
                Status::Pending,
                1_700_000_000,
            );
            state.insert_provisional(record);
        }

        assert!(engine.inner.apply(forced, Vec::new()));
        assert_eq!(engine.event_count(), 1);
        assert_eq!(engine.records()[0].title, PROVISIONAL_TITLE);
    }

    #[test]
    fn test_engine_without_runtime_cannot_attach_bus() {
        let chain = Arc::new(ChainSimulator::new(REGISTRY, ASSET));
        let engine = engine(&chain);
        let bus = NotificationBus::<AssetRetired>::default();

        assert!(!engine.attach_bus(&bus));
        assert_eq!(bus.subscriber_count(), 0);
        assert!(engine.scope().is_none());
    }
}
