//! # Authoritative Fetcher
//!
//! Reads records from contract state in two steps:
//!
//! 1. Resolve the request ids in scope (one or two list lookups). Failure
//!    here fails the whole fetch.
//! 2. Read every request's detail in chunks of `detail_chunk_size`. The
//!    chunks run concurrently on a `JoinSet` and are re-assembled in id
//!    order. A failing or undecodable entry is logged and skipped.

use std::collections::HashSet;
use std::sync::Arc;

use greentrace_chain::{
    decode_returns, Address, BatchReader, CallOutcome, CashRequest, ContractCall, IGreenTrace,
    MintRequest, ReadError, TokenAmount, U256,
};
use thiserror::Error;
use tokio::task::JoinSet;

use crate::error::{FetchError, FetchResult};
use crate::lifecycle::{asset_id_from_raw, derive_status};
use crate::record::{AssetPresence, Record, RecordKind, Scope, Source, Status};

/// One id-list lookup on the registry.
#[derive(Clone, Copy, Debug)]
enum IdLookup {
    UserMints(Address),
    PendingMints,
    AuditedMints,
    PendingCash,
    AuditedCash,
}

impl IdLookup {
    fn for_scope(kind: RecordKind, scope: Scope) -> Vec<Self> {
        match (kind, scope) {
            (RecordKind::Mint, Scope::Owner(user)) => vec![Self::UserMints(user)],
            (RecordKind::Mint, Scope::AuditQueue(_)) => vec![Self::PendingMints, Self::AuditedMints],
            (RecordKind::Exchange, _) => vec![Self::PendingCash, Self::AuditedCash],
        }
    }

    fn call(self, registry: Address) -> ContractCall {
        match self {
            Self::UserMints(user) => {
                ContractCall::new(registry, &IGreenTrace::getUserMintRequestsCall { user })
            }
            Self::PendingMints => ContractCall::new(registry, &IGreenTrace::getPendingMintAuditsCall {}),
            Self::AuditedMints => {
                ContractCall::new(registry, &IGreenTrace::getAllAuditedMintRequestsCall {})
            }
            Self::PendingCash => ContractCall::new(registry, &IGreenTrace::getPendingCashAuditsCall {}),
            Self::AuditedCash => {
                ContractCall::new(registry, &IGreenTrace::getAllAuditedCashRequestsCall {})
            }
        }
    }

    fn decode(self, reply: CallOutcome) -> Result<Vec<U256>, ReadError> {
        match self {
            Self::UserMints(_) => {
                decode_returns::<IGreenTrace::getUserMintRequestsCall>(reply).map(|r| r._0)
            }
            Self::PendingMints => {
                decode_returns::<IGreenTrace::getPendingMintAuditsCall>(reply).map(|r| r._0)
            }
            Self::AuditedMints => {
                decode_returns::<IGreenTrace::getAllAuditedMintRequestsCall>(reply).map(|r| r._0)
            }
            Self::PendingCash => {
                decode_returns::<IGreenTrace::getPendingCashAuditsCall>(reply).map(|r| r._0)
            }
            Self::AuditedCash => {
                decode_returns::<IGreenTrace::getAllAuditedCashRequestsCall>(reply).map(|r| r._0)
            }
        }
    }
}

/// Why one detail entry was skipped.
#[derive(Error, Debug)]
enum ItemFault {
    #[error(transparent)]
    Read(#[from] ReadError),
    #[error("unknown status code {0}")]
    UnknownStatus(u8),
    #[error("{0} does not fit a 128-bit amount")]
    Overflow(&'static str),
}

/// Contract-state reader for one registry.
pub struct AuthoritativeFetcher {
    reader: Arc<dyn BatchReader>,
    registry: Address,
    chunk_size: usize,
    decimals: u8,
}

impl AuthoritativeFetcher {
    /// Creates a fetcher.
    ///
    /// # Arguments
    ///
    /// * `reader` - Batch read service
    /// * `registry` - Registry contract address
    /// * `chunk_size` - Detail reads per batch, at least 1
    /// * `decimals` - Fixed-point scale of on-chain amounts
    #[must_use]
    pub fn new(reader: Arc<dyn BatchReader>, registry: Address, chunk_size: usize, decimals: u8) -> Self {
        Self {
            reader,
            registry,
            chunk_size: chunk_size.max(1),
            decimals,
        }
    }

    /// Fetches every record of `kind` in `scope`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::IdList`] if the id list cannot be resolved.
    /// Per-record failures never fail the fetch.
    pub async fn fetch(&self, kind: RecordKind, scope: Scope) -> FetchResult<Vec<Record>> {
        let ids = self.resolve_ids(kind, scope).await?;
        if ids.is_empty() {
            tracing::debug!(?kind, account = %scope.account(), "no requests in scope");
            return Ok(Vec::new());
        }

        let replies = self.read_details(kind, &ids).await;
        let mut records = Vec::with_capacity(ids.len());
        let mut skipped = 0usize;
        for (id, reply) in ids.iter().zip(replies) {
            match self.decode_record(kind, *id, reply) {
                Ok(record) => records.push(record),
                Err(fault) => {
                    skipped += 1;
                    tracing::warn!(?kind, id = %id, error = %fault, "skipping unreadable request");
                }
            }
        }

        // The registry has no per-owner exchange index.
        if let (RecordKind::Exchange, Scope::Owner(account)) = (kind, scope) {
            records.retain(|record| record.requester == Some(account));
        }

        tracing::debug!(?kind, fetched = records.len(), skipped, "authoritative fetch complete");
        Ok(records)
    }

    /// Resolves the request ids in scope, de-duplicated, in lookup order.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::IdList`] naming the first failing lookup.
    pub async fn resolve_ids(&self, kind: RecordKind, scope: Scope) -> FetchResult<Vec<U256>> {
        let lookups = IdLookup::for_scope(kind, scope);
        let calls: Vec<ContractCall> = lookups.iter().map(|lookup| lookup.call(self.registry)).collect();
        let mut replies = self.reader.read_batch(&calls).await.into_iter();

        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        for (lookup, call) in lookups.into_iter().zip(&calls) {
            let reply = replies.next().unwrap_or_else(|| Err(missing_reply()));
            let list = lookup.decode(reply).map_err(|source| {
                tracing::error!(method = call.method, error = %source, "id list lookup failed");
                FetchError::IdList {
                    method: call.method,
                    source,
                }
            })?;
            ids.extend(list.into_iter().filter(|id| seen.insert(*id)));
        }
        Ok(ids)
    }

    fn detail_call(&self, kind: RecordKind, id: U256) -> ContractCall {
        match kind {
            RecordKind::Mint => {
                ContractCall::new(self.registry, &IGreenTrace::getRequestByIdCall { requestId: id })
            }
            RecordKind::Exchange => {
                ContractCall::new(self.registry, &IGreenTrace::getCashByIdCall { cashId: id })
            }
        }
    }

    /// Fans the detail reads out over concurrent chunks and joins them back
    /// into one outcome per id, in id order.
    async fn read_details(&self, kind: RecordKind, ids: &[U256]) -> Vec<CallOutcome> {
        let mut join_set = JoinSet::new();
        for (index, chunk) in ids.chunks(self.chunk_size).enumerate() {
            let calls: Vec<ContractCall> = chunk.iter().map(|id| self.detail_call(kind, *id)).collect();
            let reader = Arc::clone(&self.reader);
            join_set.spawn(async move {
                let replies = reader.read_batch(&calls).await;
                (index, replies)
            });
        }

        let mut chunks: Vec<Option<Vec<CallOutcome>>> = vec![None; ids.len().div_ceil(self.chunk_size)];
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, replies)) => {
                    if let Some(slot) = chunks.get_mut(index) {
                        *slot = Some(replies);
                    }
                }
                Err(error) => tracing::warn!(%error, "detail batch task failed"),
            }
        }

        let mut outcomes = Vec::with_capacity(ids.len());
        for (chunk, replies) in ids.chunks(self.chunk_size).zip(chunks) {
            let mut replies = replies.unwrap_or_default().into_iter();
            outcomes.extend(chunk.iter().map(|_| replies.next().unwrap_or_else(|| Err(missing_reply()))));
        }
        outcomes
    }

    fn decode_record(&self, kind: RecordKind, id: U256, reply: CallOutcome) -> Result<Record, ItemFault> {
        match kind {
            RecordKind::Mint => {
                let request = decode_returns::<IGreenTrace::getRequestByIdCall>(reply)?._0;
                self.mint_record(id, request)
            }
            RecordKind::Exchange => {
                let request = decode_returns::<IGreenTrace::getCashByIdCall>(reply)?._0;
                self.exchange_record(id, request)
            }
        }
    }

    fn mint_record(&self, id: U256, request: MintRequest) -> Result<Record, ItemFault> {
        let asset_id = asset_id_from_raw(request.nftTokenId);
        let status = derive_status(RecordKind::Mint, request.status, asset_id)
            .ok_or(ItemFault::UnknownStatus(request.status))?;
        let created_at = seconds(request.requestTimestamp);
        let data = request.requestData;

        Ok(Record {
            kind: RecordKind::Mint,
            id,
            identity_key: Record::identity_key_for(RecordKind::Mint, id, created_at),
            title: data.title,
            details: data.storyDetails,
            quantity: self.amount("carbonReduction", data.carbonReduction)?,
            fee_paid: self.amount("requestFee", data.requestFee)?,
            status,
            auditor: non_zero(request.auditor),
            audited_value: self.audited_value(status, request.carbonValue)?,
            audit_comment: non_empty(request.auditComment),
            audited_at: timestamp(request.auditTimestamp),
            secondary_asset_id: asset_id,
            token_uri: non_empty(data.tokenURI),
            requester: non_zero(request.requester),
            source: Source::Contract,
            created_at,
            presence: AssetPresence::Unchecked,
        })
    }

    fn exchange_record(&self, id: U256, request: CashRequest) -> Result<Record, ItemFault> {
        let asset_id = asset_id_from_raw(request.nftTokenId);
        let status = derive_status(RecordKind::Exchange, request.status, asset_id)
            .ok_or(ItemFault::UnknownStatus(request.status))?;
        let created_at = seconds(request.requestTimestamp);

        Ok(Record {
            kind: RecordKind::Exchange,
            id,
            identity_key: Record::identity_key_for(RecordKind::Exchange, id, created_at),
            title: format!("NFT #{}", request.nftTokenId),
            details: String::new(),
            quantity: self.amount("basePrice", request.basePrice)?,
            fee_paid: self.amount("requestFee", request.requestFee)?,
            status,
            auditor: non_zero(request.auditor),
            audited_value: self.audited_value(status, request.carbonValue)?,
            audit_comment: non_empty(request.auditComment),
            audited_at: timestamp(request.auditTimestamp),
            secondary_asset_id: asset_id,
            token_uri: None,
            requester: non_zero(request.requester),
            source: Source::Contract,
            created_at,
            presence: AssetPresence::Unchecked,
        })
    }

    fn amount(&self, field: &'static str, raw: U256) -> Result<TokenAmount, ItemFault> {
        TokenAmount::from_u256(raw, self.decimals).ok_or(ItemFault::Overflow(field))
    }

    fn audited_value(&self, status: Status, raw: U256) -> Result<Option<TokenAmount>, ItemFault> {
        if status == Status::Pending {
            return Ok(None);
        }
        self.amount("carbonValue", raw).map(Some)
    }
}

fn missing_reply() -> ReadError {
    ReadError::Transport("missing batch reply".to_string())
}

fn non_zero(address: Address) -> Option<Address> {
    (address != Address::ZERO).then_some(address)
}

fn non_empty(text: String) -> Option<String> {
    (!text.is_empty()).then_some(text)
}

fn seconds(raw: U256) -> u64 {
    u64::try_from(raw).unwrap_or(u64::MAX)
}

fn timestamp(raw: U256) -> Option<u64> {
    (!raw.is_zero()).then(|| seconds(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use greentrace_chain::{ChainSimulator, RequestData};
    use alloy_sol_types::SolCall;

    const REGISTRY: Address = Address::repeat_byte(0xaa);
    const ASSET: Address = Address::repeat_byte(0xbb);
    const ALICE: Address = Address::repeat_byte(0x01);
    const BOB: Address = Address::repeat_byte(0x02);
    const AUDITOR: Address = Address::repeat_byte(0x0a);
    const ONE: u128 = 1_000_000_000_000_000_000;

    fn fetcher(chain: &Arc<ChainSimulator>, chunk_size: usize) -> AuthoritativeFetcher {
        let reader: Arc<dyn BatchReader> = chain.clone();
        AuthoritativeFetcher::new(reader, REGISTRY, chunk_size, 18)
    }

    #[tokio::test]
    async fn test_fetch_converts_fields() {
        let chain = Arc::new(ChainSimulator::new(REGISTRY, ASSET));
        let id = chain.submit_mint(ALICE, "Mangroves", 5 * ONE / 2, ONE / 10);
        chain.approve_mint(id, AUDITOR, 2 * ONE, "verified on site");

        let records = fetcher(&chain, 100).fetch(RecordKind::Mint, Scope::Owner(ALICE)).await.unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.identity_key, "request_1");
        assert_eq!(record.quantity.to_string(), "2.500000000000000000");
        assert_eq!(record.fee_paid.to_string(), "0.100000000000000000");
        assert_eq!(record.status, Status::Approved);
        assert_eq!(record.auditor, Some(AUDITOR));
        assert_eq!(record.audited_value.unwrap().whole(), 2);
        assert_eq!(record.audit_comment.as_deref(), Some("verified on site"));
        assert_eq!(record.source, Source::Contract);
        assert_eq!(record.created_at, chain.now_secs());
    }

    #[tokio::test]
    async fn test_empty_id_list_is_valid() {
        let chain = Arc::new(ChainSimulator::new(REGISTRY, ASSET));
        let records = fetcher(&chain, 100).fetch(RecordKind::Mint, Scope::Owner(ALICE)).await.unwrap();
        assert!(records.is_empty());
        assert_eq!(chain.read_count(), 1);
    }

    #[tokio::test]
    async fn test_failing_items_are_skipped() {
        let chain = Arc::new(ChainSimulator::new(REGISTRY, ASSET));
        let ids: Vec<U256> = (0..5).map(|i| chain.submit_mint(ALICE, &format!("R{i}"), 1, 0)).collect();
        chain.fail_request(ids[1]);
        chain.fail_request(ids[3]);

        let records = fetcher(&chain, 2).fetch(RecordKind::Mint, Scope::Owner(ALICE)).await.unwrap();
        let fetched: Vec<U256> = records.iter().map(|r| r.id).collect();
        assert_eq!(fetched, vec![ids[0], ids[2], ids[4]]);
    }

    #[tokio::test]
    async fn test_unknown_status_code_is_skipped() {
        let chain = Arc::new(ChainSimulator::new(REGISTRY, ASSET));
        chain.submit_mint(ALICE, "Good", 1, 0);
        chain.insert_mint_request(
            U256::from(99),
            MintRequest {
                requester: ALICE,
                requestData: RequestData {
                    title: "Odd".to_string(),
                    storyDetails: String::new(),
                    carbonReduction: U256::from(1),
                    tokenURI: String::new(),
                    requestFee: U256::ZERO,
                },
                status: 7,
                auditor: Address::ZERO,
                carbonValue: U256::ZERO,
                auditComment: String::new(),
                requestTimestamp: U256::from(1),
                auditTimestamp: U256::ZERO,
                nftTokenId: U256::ZERO,
            },
        );

        let records = fetcher(&chain, 100).fetch(RecordKind::Mint, Scope::Owner(ALICE)).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Good");
    }

    #[tokio::test]
    async fn test_id_list_failure_fails_fetch() {
        let chain = Arc::new(ChainSimulator::new(REGISTRY, ASSET));
        chain.submit_mint(ALICE, "A", 1, 0);
        chain.fail_method(IGreenTrace::getUserMintRequestsCall::SELECTOR);

        let err = fetcher(&chain, 100)
            .fetch(RecordKind::Mint, Scope::Owner(ALICE))
            .await
            .unwrap_err();
        match err {
            FetchError::IdList { method, source } => {
                assert_eq!(method, "getUserMintRequests(address)");
                assert!(source.is_transient());
            }
            other => panic!("Wrong error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_audit_queue_merges_pending_and_audited() {
        let chain = Arc::new(ChainSimulator::new(REGISTRY, ASSET));
        let a = chain.submit_mint(ALICE, "A", 1, 0);
        let b = chain.submit_mint(BOB, "B", 1, 0);
        chain.reject_mint(a, AUDITOR, "duplicate claim");

        let ids = fetcher(&chain, 100)
            .resolve_ids(RecordKind::Mint, Scope::AuditQueue(AUDITOR))
            .await
            .unwrap();
        assert_eq!(ids, vec![b, a]);
    }

    #[tokio::test]
    async fn test_exchange_owner_scope_filters_requester() {
        let chain = Arc::new(ChainSimulator::new(REGISTRY, ASSET));
        let mine = chain.submit_exchange(ALICE, U256::from(4), 10 * ONE, ONE);
        chain.submit_exchange(BOB, U256::from(5), 10 * ONE, ONE);
        chain.approve_exchange(mine, AUDITOR, 9 * ONE);

        let records = fetcher(&chain, 100)
            .fetch(RecordKind::Exchange, Scope::Owner(ALICE))
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.identity_key, "exchange_request_1");
        assert_eq!(record.secondary_asset_id, Some(U256::from(4)));
        assert_eq!(record.status, Status::Approved);
        assert_eq!(record.quantity.whole(), 10);
    }
}
