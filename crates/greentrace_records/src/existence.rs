//! # Existence Oracle
//!
//! Probes the NFT contract with `ownerOf` to find out whether a produced
//! asset still exists. Burned tokens revert, and only a revert that proves
//! non-existence counts as "retired". Transport failures are retried and,
//! if they persist, leave the record's previous presence in place.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use greentrace_chain::{
    decode_returns, Address, BatchReader, ContractCall, IGreenTalesNFT, ReadError, U256,
};

use crate::record::{AssetPresence, Record};

/// Result of probing one token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The token exists and has this owner.
    Present(Address),
    /// The token does not exist.
    NotFound,
    /// The probe failed without proving anything.
    Unknown(ReadError),
}

/// `ownerOf` prober.
pub struct ExistenceOracle {
    reader: Arc<dyn BatchReader>,
    asset: Address,
    retries: u32,
    retry_delay: Duration,
}

impl ExistenceOracle {
    /// Creates an oracle for the NFT contract at `asset`.
    #[must_use]
    pub fn new(reader: Arc<dyn BatchReader>, asset: Address, retries: u32, retry_delay: Duration) -> Self {
        Self {
            reader,
            asset,
            retries,
            retry_delay,
        }
    }

    /// Probes every token in one batch, retrying inconclusive entries.
    ///
    /// # Arguments
    ///
    /// * `token_ids` - Tokens to probe. Duplicates are probed once.
    ///
    /// # Returns
    ///
    /// One outcome per distinct token id.
    pub async fn probe(&self, token_ids: &[U256]) -> HashMap<U256, ProbeOutcome> {
        let mut pending: Vec<U256> = Vec::with_capacity(token_ids.len());
        for id in token_ids {
            if !pending.contains(id) {
                pending.push(*id);
            }
        }

        let mut results = HashMap::with_capacity(pending.len());
        let mut attempt = 0;
        while !pending.is_empty() {
            if attempt > 0 {
                tokio::time::sleep(self.retry_delay).await;
            }

            let calls: Vec<ContractCall> = pending
                .iter()
                .map(|id| ContractCall::new(self.asset, &IGreenTalesNFT::ownerOfCall { tokenId: *id }))
                .collect();
            let mut replies = self.reader.read_batch(&calls).await.into_iter();

            let mut retry = Vec::new();
            for id in &pending {
                let reply = replies
                    .next()
                    .unwrap_or_else(|| Err(ReadError::Transport("missing batch reply".to_string())));
                let outcome = classify(decode_returns::<IGreenTalesNFT::ownerOfCall>(reply).map(|r| r._0));
                if let ProbeOutcome::Unknown(error) = &outcome {
                    if error.is_transient() && attempt < self.retries {
                        retry.push(*id);
                        continue;
                    }
                    tracing::warn!(token_id = %id, %error, "existence probe inconclusive");
                }
                results.insert(*id, outcome);
            }

            pending = retry;
            attempt += 1;
        }

        results
    }

    /// Sets `presence` on every record that needs a probe.
    ///
    /// `prior` supplies the presence previously known per identity key. A
    /// record already known to be retired is not probed again, and an
    /// inconclusive probe keeps the prior value.
    pub async fn annotate(&self, records: &mut [Record], prior: &HashMap<String, AssetPresence>) {
        let mut to_probe = Vec::new();
        for record in records.iter_mut() {
            let known = prior.get(&record.identity_key).copied().unwrap_or_default();
            record.presence = known;
            if record.needs_probe() && known != AssetPresence::Retired {
                if let Some(asset_id) = record.secondary_asset_id {
                    to_probe.push(asset_id);
                }
            }
        }
        if to_probe.is_empty() {
            return;
        }

        let outcomes = self.probe(&to_probe).await;
        for record in records.iter_mut() {
            if !record.needs_probe() || record.presence == AssetPresence::Retired {
                continue;
            }
            let Some(outcome) = record.secondary_asset_id.and_then(|id| outcomes.get(&id)) else {
                continue;
            };
            match outcome {
                ProbeOutcome::Present(_) => record.presence = AssetPresence::Present,
                ProbeOutcome::NotFound => {
                    tracing::debug!(id = %record.id, "secondary asset retired");
                    record.presence = AssetPresence::Retired;
                }
                ProbeOutcome::Unknown(_) => {}
            }
        }
    }
}

/// Classifies one `ownerOf` result. A zero owner is treated as nonexistent.
fn classify(result: Result<Address, ReadError>) -> ProbeOutcome {
    match result {
        Ok(owner) if owner == Address::ZERO => ProbeOutcome::NotFound,
        Ok(owner) => ProbeOutcome::Present(owner),
        Err(error) if error.is_not_found() => ProbeOutcome::NotFound,
        Err(error) => ProbeOutcome::Unknown(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{RecordKind, Source, Status};
    use greentrace_chain::{ChainSimulator, TokenAmount};

    const REGISTRY: Address = Address::repeat_byte(0xaa);
    const ASSET: Address = Address::repeat_byte(0xbb);
    const ALICE: Address = Address::repeat_byte(0x01);

    fn oracle(chain: &Arc<ChainSimulator>, retries: u32) -> ExistenceOracle {
        let reader: Arc<dyn BatchReader> = chain.clone();
        ExistenceOracle::new(reader, ASSET, retries, Duration::from_millis(10))
    }

    fn minted_token(chain: &ChainSimulator) -> U256 {
        let id = chain.submit_mint(ALICE, "Wetland", 1, 0);
        chain.approve_mint(id, ALICE, 1, "");
        chain.mint_nft(id).unwrap()
    }

    fn minted_record(id: u64, token: U256) -> Record {
        Record {
            kind: RecordKind::Mint,
            id: U256::from(id),
            identity_key: Record::transaction_ref(RecordKind::Mint, U256::from(id)),
            title: "Wetland".to_string(),
            details: String::new(),
            quantity: TokenAmount::ZERO,
            fee_paid: TokenAmount::ZERO,
            status: Status::Minted,
            auditor: Some(ALICE),
            audited_value: None,
            audit_comment: None,
            audited_at: None,
            secondary_asset_id: Some(token),
            token_uri: None,
            requester: Some(ALICE),
            source: Source::Contract,
            created_at: 0,
            presence: AssetPresence::Unchecked,
        }
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(Ok(ALICE)), ProbeOutcome::Present(ALICE));
        assert_eq!(classify(Ok(Address::ZERO)), ProbeOutcome::NotFound);
        let transport = ReadError::Transport("reset".to_string());
        assert_eq!(classify(Err(transport.clone())), ProbeOutcome::Unknown(transport));
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_distinguishes_burned_from_live() {
        let chain = Arc::new(ChainSimulator::new(REGISTRY, ASSET));
        let live = minted_token(&chain);
        let burned = minted_token(&chain);
        chain.burn(burned);

        let outcomes = oracle(&chain, 0).probe(&[live, burned, live]).await;
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[&live], ProbeOutcome::Present(ALICE));
        assert_eq!(outcomes[&burned], ProbeOutcome::NotFound);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_is_retried_then_inconclusive() {
        let chain = Arc::new(ChainSimulator::new(REGISTRY, ASSET));
        let token = minted_token(&chain);
        chain.fail_owner_lookup(token);
        let reads_before = chain.read_count();

        let outcomes = oracle(&chain, 2).probe(&[token]).await;
        assert!(matches!(outcomes[&token], ProbeOutcome::Unknown(_)));
        assert_eq!(chain.read_count() - reads_before, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_annotate_keeps_prior_presence_on_transient_error() {
        let chain = Arc::new(ChainSimulator::new(REGISTRY, ASSET));
        let token = minted_token(&chain);
        chain.fail_owner_lookup(token);

        let mut records = vec![minted_record(1, token)];
        let prior = HashMap::from([(records[0].identity_key.clone(), AssetPresence::Present)]);
        oracle(&chain, 0).annotate(&mut records, &prior).await;
        assert_eq!(records[0].presence, AssetPresence::Present);
        assert_eq!(records[0].display_status(), Status::Minted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_annotate_marks_burned_asset_retired() {
        let chain = Arc::new(ChainSimulator::new(REGISTRY, ASSET));
        let token = minted_token(&chain);
        chain.burn(token);

        let mut records = vec![minted_record(1, token)];
        oracle(&chain, 0).annotate(&mut records, &HashMap::new()).await;
        assert_eq!(records[0].presence, AssetPresence::Retired);
        assert_eq!(records[0].display_status(), Status::Exchanged);

        // Retired is final: no further probe is issued.
        let reads = chain.read_count();
        let prior = HashMap::from([(records[0].identity_key.clone(), AssetPresence::Retired)]);
        oracle(&chain, 0).annotate(&mut records, &prior).await;
        assert_eq!(chain.read_count(), reads);
        assert_eq!(records[0].presence, AssetPresence::Retired);
    }
}
