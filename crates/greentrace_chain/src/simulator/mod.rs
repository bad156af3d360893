//! # Chain Simulator
//!
//! In-memory registry + NFT contract for tests and benchmarks.
//!
//! Implements [`BatchReader`] by decoding calldata against the real contract
//! ABI and [`EventSource`] by delivering the logs the mutating helpers emit,
//! so the engine under test talks to it exactly as it would to a node
//! adapter. Failures are injected per method, per request or per token.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use alloy_primitives::{Address, U256};
use alloy_sol_types::{SolCall, SolError};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use crate::contracts::{CashRequest, IGreenTalesNFT, IGreenTrace, MintRequest, RequestData};
use crate::events::{address_topic, u256_topic, ChainEventKind, RawLog};
use crate::rpc::{BatchReader, CallOutcome, ContractCall, EventSource, LogFilter, LogSink, ReadError, Subscription};

/// Default simulated wall clock (seconds).
const GENESIS_TIME: u64 = 1_700_000_000;

struct Subscriber {
    id: u64,
    filter: LogFilter,
    sink: LogSink,
}

#[derive(Default)]
struct SimState {
    next_request_id: u64,
    next_cash_id: u64,
    next_token_id: u64,
    now_secs: u64,
    block: u64,
    mint_requests: BTreeMap<U256, MintRequest>,
    user_mints: HashMap<Address, Vec<U256>>,
    cash_requests: BTreeMap<U256, CashRequest>,
    owners: HashMap<U256, Address>,
    failing_methods: HashSet<[u8; 4]>,
    failing_requests: HashSet<U256>,
    failing_tokens: HashSet<U256>,
}

/// Simulated registry and NFT contract.
pub struct ChainSimulator {
    registry: Address,
    asset: Address,
    state: RwLock<SimState>,
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
    next_subscription: AtomicU64,
    reads: AtomicU64,
}

impl ChainSimulator {
    /// Creates an empty chain with the given contract addresses.
    #[must_use]
    pub fn new(registry: Address, asset: Address) -> Self {
        Self {
            registry,
            asset,
            state: RwLock::new(SimState {
                next_request_id: 1,
                next_cash_id: 1,
                next_token_id: 1,
                now_secs: GENESIS_TIME,
                ..SimState::default()
            }),
            subscribers: Arc::new(Mutex::new(Vec::new())),
            next_subscription: AtomicU64::new(1),
            reads: AtomicU64::new(0),
        }
    }

    /// Registry contract address.
    #[must_use]
    pub const fn registry(&self) -> Address {
        self.registry
    }

    /// NFT contract address.
    #[must_use]
    pub const fn asset(&self) -> Address {
        self.asset
    }

    /// Total calls executed through [`BatchReader::read_batch`].
    #[must_use]
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Current simulated time in seconds.
    #[must_use]
    pub fn now_secs(&self) -> u64 {
        self.state.read().now_secs
    }

    /// Advances the simulated clock.
    pub fn advance_time(&self, secs: u64) {
        self.state.write().now_secs += secs;
    }

    // =========================================================================
    // Mint requests
    // =========================================================================

    /// Submits a mint request and emits `MintRequested`.
    ///
    /// # Arguments
    ///
    /// * `requester` - Account submitting the request
    /// * `title` - Request title
    /// * `reduction` - Claimed carbon reduction, raw 18-decimal value
    /// * `fee` - Request fee paid, raw 18-decimal value
    pub fn submit_mint(&self, requester: Address, title: &str, reduction: u128, fee: u128) -> U256 {
        let id = {
            let mut state = self.state.write();
            let id = U256::from(state.next_request_id);
            state.next_request_id += 1;
            let request = MintRequest {
                requester,
                requestData: RequestData {
                    title: title.to_string(),
                    storyDetails: format!("{title} details"),
                    carbonReduction: U256::from(reduction),
                    tokenURI: format!("ipfs://request-{id}"),
                    requestFee: U256::from(fee),
                },
                status: 0,
                auditor: Address::ZERO,
                carbonValue: U256::ZERO,
                auditComment: String::new(),
                requestTimestamp: U256::from(state.now_secs),
                auditTimestamp: U256::ZERO,
                nftTokenId: U256::ZERO,
            };
            state.mint_requests.insert(id, request);
            state.user_mints.entry(requester).or_default().push(id);
            id
        };

        self.emit_registry(ChainEventKind::MintRequested, id, requester, Vec::new());
        id
    }

    /// Stores a mint request verbatim, without emitting anything.
    pub fn insert_mint_request(&self, id: U256, request: MintRequest) {
        let mut state = self.state.write();
        state
            .user_mints
            .entry(request.requester)
            .or_default()
            .push(id);
        state.mint_requests.insert(id, request);
    }

    /// Approves a mint request and emits `AuditSubmitted` (audit type 0).
    ///
    /// Returns `false` if the request does not exist.
    pub fn approve_mint(&self, id: U256, auditor: Address, carbon_value: u128, comment: &str) -> bool {
        {
            let mut state = self.state.write();
            let now = U256::from(state.now_secs);
            let Some(request) = state.mint_requests.get_mut(&id) else {
                return false;
            };
            request.status = 1;
            request.auditor = auditor;
            request.carbonValue = U256::from(carbon_value);
            request.auditComment = comment.to_string();
            request.auditTimestamp = now;
        }

        let data = words(&[U256::from(carbon_value), U256::ZERO]);
        self.emit_registry(ChainEventKind::AuditSubmitted { audit_type: 0 }, id, auditor, data);
        true
    }

    /// Rejects a mint request and emits `AuditRejected`.
    pub fn reject_mint(&self, id: U256, auditor: Address, reason: &str) -> bool {
        {
            let mut state = self.state.write();
            let now = U256::from(state.now_secs);
            let Some(request) = state.mint_requests.get_mut(&id) else {
                return false;
            };
            request.status = 2;
            request.auditor = auditor;
            request.auditComment = reason.to_string();
            request.auditTimestamp = now;
        }

        self.emit_registry(ChainEventKind::AuditRejected, id, auditor, Vec::new());
        true
    }

    /// Mints the NFT for an approved request and emits `NFTMintedAfterAudit`.
    ///
    /// Returns the new token id, or `None` if the request is not approved.
    pub fn mint_nft(&self, id: U256) -> Option<U256> {
        let (token_id, recipient) = {
            let mut state = self.state.write();
            let token_id = U256::from(state.next_token_id);
            let request = state.mint_requests.get_mut(&id)?;
            if request.status != 1 || request.nftTokenId != U256::ZERO {
                return None;
            }
            request.nftTokenId = token_id;
            let recipient = request.requester;
            state.next_token_id += 1;
            state.owners.insert(token_id, recipient);
            (token_id, recipient)
        };

        self.emit_registry(ChainEventKind::NftMinted, id, recipient, Vec::new());
        Some(token_id)
    }

    // =========================================================================
    // Exchange requests
    // =========================================================================

    /// Submits an exchange request for an owned NFT and emits `ExchangeRequested`.
    pub fn submit_exchange(&self, requester: Address, token_id: U256, base_price: u128, fee: u128) -> U256 {
        let id = {
            let mut state = self.state.write();
            let id = U256::from(state.next_cash_id);
            state.next_cash_id += 1;
            let request = CashRequest {
                requester,
                nftTokenId: token_id,
                basePrice: U256::from(base_price),
                requestFee: U256::from(fee),
                status: 0,
                auditor: Address::ZERO,
                carbonValue: U256::ZERO,
                auditComment: String::new(),
                requestTimestamp: U256::from(state.now_secs),
                auditTimestamp: U256::ZERO,
            };
            state.cash_requests.insert(id, request);
            id
        };

        let data = words(&[U256::from(base_price), U256::from(fee)]);
        self.emit_registry(ChainEventKind::ExchangeRequested, id, requester, data);
        id
    }

    /// Approves an exchange request and emits `AuditSubmitted` (audit type 1).
    pub fn approve_exchange(&self, cash_id: U256, auditor: Address, carbon_value: u128) -> bool {
        {
            let mut state = self.state.write();
            let now = U256::from(state.now_secs);
            let Some(request) = state.cash_requests.get_mut(&cash_id) else {
                return false;
            };
            request.status = 1;
            request.auditor = auditor;
            request.carbonValue = U256::from(carbon_value);
            request.auditTimestamp = now;
        }

        let data = words(&[U256::from(carbon_value), U256::from(1u8)]);
        self.emit_registry(ChainEventKind::AuditSubmitted { audit_type: 1 }, cash_id, auditor, data);
        true
    }

    /// Rejects an exchange request and emits `AuditRejected`.
    pub fn reject_exchange(&self, cash_id: U256, auditor: Address, reason: &str) -> bool {
        {
            let mut state = self.state.write();
            let now = U256::from(state.now_secs);
            let Some(request) = state.cash_requests.get_mut(&cash_id) else {
                return false;
            };
            request.status = 2;
            request.auditor = auditor;
            request.auditComment = reason.to_string();
            request.auditTimestamp = now;
        }

        self.emit_registry(ChainEventKind::AuditRejected, cash_id, auditor, Vec::new());
        true
    }

    /// Completes an approved exchange: burns the NFT and emits `NFTExchanged`.
    pub fn complete_exchange(&self, cash_id: U256) -> bool {
        let (token_id, owner, value) = {
            let mut state = self.state.write();
            let Some(request) = state.cash_requests.get(&cash_id) else {
                return false;
            };
            if request.status != 1 {
                return false;
            }
            let (token_id, owner, value) = (request.nftTokenId, request.requester, request.carbonValue);
            state.owners.remove(&token_id);
            (token_id, owner, value)
        };

        self.emit_registry(ChainEventKind::NftExchanged, token_id, owner, words(&[value]));
        true
    }

    /// Burns a token without emitting anything.
    pub fn burn(&self, token_id: U256) {
        self.state.write().owners.remove(&token_id);
    }

    /// Records `owner` as the holder of `token_id` without emitting anything.
    pub fn assign_token(&self, token_id: U256, owner: Address) {
        self.state.write().owners.insert(token_id, owner);
    }

    // =========================================================================
    // Failure injection
    // =========================================================================

    /// Makes every call to the method with this selector fail with a transport error.
    pub fn fail_method(&self, selector: [u8; 4]) {
        self.state.write().failing_methods.insert(selector);
    }

    /// Makes the detail read of one request (mint or cash) fail.
    pub fn fail_request(&self, id: U256) {
        self.state.write().failing_requests.insert(id);
    }

    /// Makes `ownerOf(token_id)` fail with a transport error.
    pub fn fail_owner_lookup(&self, token_id: U256) {
        self.state.write().failing_tokens.insert(token_id);
    }

    /// Removes every injected failure.
    pub fn clear_failures(&self) {
        let mut state = self.state.write();
        state.failing_methods.clear();
        state.failing_requests.clear();
        state.failing_tokens.clear();
    }

    // =========================================================================
    // Log delivery
    // =========================================================================

    /// Delivers a log to every matching subscriber.
    pub fn emit(&self, log: &RawLog) {
        let sinks: Vec<LogSink> = self
            .subscribers
            .lock()
            .iter()
            .filter(|sub| sub.filter.matches(log))
            .map(|sub| Arc::clone(&sub.sink))
            .collect();

        // Sinks run outside the lock so they may subscribe or unsubscribe.
        for sink in sinks {
            sink(vec![log.clone()]);
        }
    }

    fn emit_registry(&self, kind: ChainEventKind, id: U256, party: Address, data: Vec<u8>) {
        let block = {
            let mut state = self.state.write();
            state.block += 1;
            state.block
        };
        let log = RawLog {
            address: self.registry,
            topics: vec![kind.signature_hash(), u256_topic(id), address_topic(party)],
            data,
            block_number: Some(block),
            transaction_hash: Some(u256_topic(U256::from(block))),
        };
        self.emit(&log);
    }

    // =========================================================================
    // Call execution
    // =========================================================================

    fn execute(&self, state: &SimState, call: &ContractCall) -> CallOutcome {
        self.reads.fetch_add(1, Ordering::Relaxed);

        let Some(selector) = call.selector() else {
            return Err(revert("missing selector"));
        };
        if state.failing_methods.contains(&selector) {
            return Err(ReadError::Transport(format!("{} unavailable", call.method)));
        }

        if call.target == self.registry {
            Self::execute_registry(state, selector, &call.input)
        } else if call.target == self.asset {
            Self::execute_asset(state, selector, &call.input)
        } else {
            Err(revert("call to non-contract account"))
        }
    }

    fn execute_registry(state: &SimState, selector: [u8; 4], input: &[u8]) -> CallOutcome {
        match selector {
            s if s == IGreenTrace::getUserMintRequestsCall::SELECTOR => {
                let call = decode_call::<IGreenTrace::getUserMintRequestsCall>(input)?;
                let ids = state.user_mints.get(&call.user).cloned().unwrap_or_default();
                Ok(IGreenTrace::getUserMintRequestsCall::abi_encode_returns(&(ids,)))
            }
            s if s == IGreenTrace::getPendingMintAuditsCall::SELECTOR => {
                let ids = ids_where(&state.mint_requests, |r| r.status == 0);
                Ok(IGreenTrace::getPendingMintAuditsCall::abi_encode_returns(&(ids,)))
            }
            s if s == IGreenTrace::getAllAuditedMintRequestsCall::SELECTOR => {
                let ids = ids_where(&state.mint_requests, |r| r.status != 0);
                Ok(IGreenTrace::getAllAuditedMintRequestsCall::abi_encode_returns(&(ids,)))
            }
            s if s == IGreenTrace::getRequestByIdCall::SELECTOR => {
                let call = decode_call::<IGreenTrace::getRequestByIdCall>(input)?;
                if state.failing_requests.contains(&call.requestId) {
                    return Err(ReadError::Transport(format!("request {} timed out", call.requestId)));
                }
                let request = state
                    .mint_requests
                    .get(&call.requestId)
                    .ok_or_else(|| revert("request does not exist"))?;
                Ok(IGreenTrace::getRequestByIdCall::abi_encode_returns(&(request.clone(),)))
            }
            s if s == IGreenTrace::getPendingCashAuditsCall::SELECTOR => {
                let ids = ids_where(&state.cash_requests, |r| r.status == 0);
                Ok(IGreenTrace::getPendingCashAuditsCall::abi_encode_returns(&(ids,)))
            }
            s if s == IGreenTrace::getAllAuditedCashRequestsCall::SELECTOR => {
                let ids = ids_where(&state.cash_requests, |r| r.status != 0);
                Ok(IGreenTrace::getAllAuditedCashRequestsCall::abi_encode_returns(&(ids,)))
            }
            s if s == IGreenTrace::getCashByIdCall::SELECTOR => {
                let call = decode_call::<IGreenTrace::getCashByIdCall>(input)?;
                if state.failing_requests.contains(&call.cashId) {
                    return Err(ReadError::Transport(format!("cash request {} timed out", call.cashId)));
                }
                let request = state
                    .cash_requests
                    .get(&call.cashId)
                    .ok_or_else(|| revert("cash request does not exist"))?;
                Ok(IGreenTrace::getCashByIdCall::abi_encode_returns(&(request.clone(),)))
            }
            _ => Err(revert("unknown selector")),
        }
    }

    fn execute_asset(state: &SimState, selector: [u8; 4], input: &[u8]) -> CallOutcome {
        if selector != IGreenTalesNFT::ownerOfCall::SELECTOR {
            return Err(revert("unknown selector"));
        }
        let call = decode_call::<IGreenTalesNFT::ownerOfCall>(input)?;
        if state.failing_tokens.contains(&call.tokenId) {
            return Err(ReadError::Transport("ownerOf timed out".to_string()));
        }
        match state.owners.get(&call.tokenId) {
            Some(owner) => Ok(IGreenTalesNFT::ownerOfCall::abi_encode_returns(&(*owner,))),
            None => Err(ReadError::Reverted {
                reason: "ERC721NonexistentToken".to_string(),
                data: IGreenTalesNFT::ERC721NonexistentToken {
                    tokenId: call.tokenId,
                }
                .abi_encode(),
            }),
        }
    }
}

#[async_trait]
impl BatchReader for ChainSimulator {
    async fn read_batch(&self, calls: &[ContractCall]) -> Vec<CallOutcome> {
        let state = self.state.read();
        calls.iter().map(|call| self.execute(&state, call)).collect()
    }
}

impl EventSource for ChainSimulator {
    fn subscribe(&self, filter: LogFilter, sink: LogSink) -> Subscription {
        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().push(Subscriber { id, filter, sink });

        let subscribers = Arc::clone(&self.subscribers);
        Subscription::new(filter, move || {
            subscribers.lock().retain(|sub| sub.id != id);
        })
    }
}

fn decode_call<C: SolCall>(input: &[u8]) -> Result<C, ReadError> {
    C::abi_decode(input, true).map_err(|e| ReadError::Decode {
        method: C::SIGNATURE,
        detail: e.to_string(),
    })
}

fn revert(reason: &str) -> ReadError {
    ReadError::Reverted {
        reason: reason.to_string(),
        data: Vec::new(),
    }
}

fn ids_where<T>(requests: &BTreeMap<U256, T>, keep: impl Fn(&T) -> bool) -> Vec<U256> {
    requests
        .iter()
        .filter(|(_, request)| keep(request))
        .map(|(id, _)| *id)
        .collect()
}

/// ABI-encodes static words back to back.
fn words(values: &[U256]) -> Vec<u8> {
    values
        .iter()
        .flat_map(|value| value.to_be_bytes::<32>())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventParser;
    use crate::rpc::decode_returns;
    use std::sync::atomic::AtomicUsize;

    const REGISTRY: Address = Address::repeat_byte(0xaa);
    const ASSET: Address = Address::repeat_byte(0xbb);
    const ALICE: Address = Address::repeat_byte(0x01);
    const AUDITOR: Address = Address::repeat_byte(0x0a);

    fn owner_of(token_id: U256) -> ContractCall {
        ContractCall::new(ASSET, &IGreenTalesNFT::ownerOfCall { tokenId: token_id })
    }

    #[tokio::test]
    async fn test_simulator_serves_registry_reads() {
        let chain = ChainSimulator::new(REGISTRY, ASSET);
        let first = chain.submit_mint(ALICE, "Mangroves", 5, 1);
        let second = chain.submit_mint(ALICE, "Kelp", 7, 1);
        assert!(chain.approve_mint(first, AUDITOR, 4, "ok"));

        let calls = vec![
            ContractCall::new(REGISTRY, &IGreenTrace::getUserMintRequestsCall { user: ALICE }),
            ContractCall::new(REGISTRY, &IGreenTrace::getPendingMintAuditsCall {}),
            ContractCall::new(REGISTRY, &IGreenTrace::getRequestByIdCall { requestId: first }),
        ];
        let mut outcomes = chain.read_batch(&calls).await.into_iter();

        let ids = decode_returns::<IGreenTrace::getUserMintRequestsCall>(outcomes.next().unwrap()).unwrap();
        assert_eq!(ids._0, vec![first, second]);

        let pending = decode_returns::<IGreenTrace::getPendingMintAuditsCall>(outcomes.next().unwrap()).unwrap();
        assert_eq!(pending._0, vec![second]);

        let request = decode_returns::<IGreenTrace::getRequestByIdCall>(outcomes.next().unwrap()).unwrap();
        assert_eq!(request._0.status, 1);
        assert_eq!(request._0.requestData.title, "Mangroves");
        assert_eq!(chain.read_count(), 3);
    }

    #[tokio::test]
    async fn test_burned_token_reverts_with_not_found() {
        let chain = ChainSimulator::new(REGISTRY, ASSET);
        let id = chain.submit_mint(ALICE, "Peat", 1, 0);
        chain.approve_mint(id, AUDITOR, 1, "");
        let token = chain.mint_nft(id).unwrap();

        let live = chain.read_batch(&[owner_of(token)]).await;
        let owner = decode_returns::<IGreenTalesNFT::ownerOfCall>(live[0].clone()).unwrap();
        assert_eq!(owner._0, ALICE);

        chain.burn(token);
        let burned = chain.read_batch(&[owner_of(token)]).await;
        assert!(burned[0].as_ref().unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_assigned_token_has_owner() {
        let chain = ChainSimulator::new(REGISTRY, ASSET);
        let token = U256::from(7);
        chain.assign_token(token, ALICE);

        let replies = chain.read_batch(&[owner_of(token)]).await;
        let owner = decode_returns::<IGreenTalesNFT::ownerOfCall>(replies[0].clone()).unwrap();
        assert_eq!(owner._0, ALICE);
    }

    #[tokio::test]
    async fn test_injected_failures_stay_per_entry() {
        let chain = ChainSimulator::new(REGISTRY, ASSET);
        let a = chain.submit_mint(ALICE, "A", 1, 0);
        let b = chain.submit_mint(ALICE, "B", 1, 0);
        chain.fail_request(a);

        let outcomes = chain
            .read_batch(&[
                ContractCall::new(REGISTRY, &IGreenTrace::getRequestByIdCall { requestId: a }),
                ContractCall::new(REGISTRY, &IGreenTrace::getRequestByIdCall { requestId: b }),
            ])
            .await;
        assert!(outcomes[0].as_ref().unwrap_err().is_transient());
        assert!(outcomes[1].is_ok());

        chain.fail_owner_lookup(U256::from(1));
        let probe = chain.read_batch(&[owner_of(U256::from(1))]).await;
        assert!(!probe[0].as_ref().unwrap_err().is_not_found());

        chain.clear_failures();
        let retry = chain
            .read_batch(&[ContractCall::new(REGISTRY, &IGreenTrace::getRequestByIdCall { requestId: a })])
            .await;
        assert!(retry[0].is_ok());
    }

    #[test]
    fn test_subscribers_receive_matching_logs_until_dropped() {
        let chain = ChainSimulator::new(REGISTRY, ASSET);
        let received = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&received);
        let sink: LogSink = Arc::new(move |logs: Vec<RawLog>| {
            let parsed = EventParser::parse_all(&logs);
            counter.fetch_add(parsed.len(), Ordering::SeqCst);
        });

        let subscription = chain.subscribe(
            LogFilter::registry_event(REGISTRY, ChainEventKind::MintRequested),
            sink,
        );
        assert_eq!(chain.subscriber_count(), 1);

        let id = chain.submit_mint(ALICE, "Soil", 1, 0);
        chain.reject_mint(id, AUDITOR, "insufficient evidence");
        assert_eq!(received.load(Ordering::SeqCst), 1);

        drop(subscription);
        assert_eq!(chain.subscriber_count(), 0);
        chain.submit_mint(ALICE, "Soil again", 1, 0);
        assert_eq!(received.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_exchange_flow_burns_token() {
        let chain = ChainSimulator::new(REGISTRY, ASSET);
        let id = chain.submit_mint(ALICE, "Forest", 10, 0);
        chain.approve_mint(id, AUDITOR, 10, "");
        let token = chain.mint_nft(id).unwrap();

        let cash = chain.submit_exchange(ALICE, token, 100, 1);
        assert!(!chain.complete_exchange(cash));
        assert!(chain.approve_exchange(cash, AUDITOR, 100));
        assert!(chain.complete_exchange(cash));
        assert!(!chain.state.read().owners.contains_key(&token));
    }
}
