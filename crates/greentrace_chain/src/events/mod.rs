//! # Registry Events
//!
//! Event types and parsing for registry notifications.
//!
//! Every registry event indexes the request id as topic 1 and an address
//! (requester, auditor, recipient or owner) as topic 2, so parsing only
//! needs the topics. The non-indexed data is read for the single field the
//! engine cares about: the audit type of `AuditSubmitted`.

use alloy_primitives::{Address, B256, U256};
use alloy_sol_types::SolEvent;

use super::contracts::IGreenTrace;

/// A raw log as delivered by an event subscription.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawLog {
    /// Emitting contract.
    pub address: Address,
    /// Indexed topics, topic 0 is the event signature hash.
    pub topics: Vec<B256>,
    /// ABI-encoded non-indexed data.
    pub data: Vec<u8>,
    /// Block the log was included in, if already mined.
    pub block_number: Option<u64>,
    /// Transaction that emitted the log, if known.
    pub transaction_hash: Option<B256>,
}

/// Which registry event a log is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChainEventKind {
    /// `MintRequested`.
    MintRequested,
    /// `ExchangeRequested`.
    ExchangeRequested,
    /// `AuditSubmitted` with the audit type from the log data.
    AuditSubmitted {
        /// 0 = mint audit, 1 = exchange audit.
        audit_type: u8,
    },
    /// `AuditRejected`.
    AuditRejected,
    /// `NFTMintedAfterAudit`.
    NftMinted,
    /// `NFTExchanged`.
    NftExchanged,
}

impl ChainEventKind {
    /// Solidity event name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::MintRequested => "MintRequested",
            Self::ExchangeRequested => "ExchangeRequested",
            Self::AuditSubmitted { .. } => "AuditSubmitted",
            Self::AuditRejected => "AuditRejected",
            Self::NftMinted => "NFTMintedAfterAudit",
            Self::NftExchanged => "NFTExchanged",
        }
    }

    /// Signature hash (topic 0) of this event.
    #[must_use]
    pub fn signature_hash(self) -> B256 {
        match self {
            Self::MintRequested => IGreenTrace::MintRequested::SIGNATURE_HASH,
            Self::ExchangeRequested => IGreenTrace::ExchangeRequested::SIGNATURE_HASH,
            Self::AuditSubmitted { .. } => IGreenTrace::AuditSubmitted::SIGNATURE_HASH,
            Self::AuditRejected => IGreenTrace::AuditRejected::SIGNATURE_HASH,
            Self::NftMinted => IGreenTrace::NFTMintedAfterAudit::SIGNATURE_HASH,
            Self::NftExchanged => IGreenTrace::NFTExchanged::SIGNATURE_HASH,
        }
    }
}

/// A parsed registry event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChainEvent {
    /// Which event this is.
    pub kind: ChainEventKind,
    /// Request (or cash request) id from topic 1.
    pub request_id: U256,
    /// Address from topic 2.
    pub party: Address,
    /// Block number, if mined.
    pub block_number: Option<u64>,
    /// Emitting transaction, if known.
    pub transaction_hash: Option<B256>,
}

/// Event parser for raw log data.
///
/// Parses directly from topic words without going through the full ABI
/// decoder: the engine only needs the indexed fields.
pub struct EventParser;

impl EventParser {
    /// Parses a registry log.
    ///
    /// # Returns
    ///
    /// Parsed event or `None` if the log is not a registry event or is truncated.
    #[must_use]
    pub fn parse(log: &RawLog) -> Option<ChainEvent> {
        // Validate topic count (event sig + tokenId + party = 3)
        if log.topics.len() < 3 {
            return None;
        }

        let kind = Self::classify(&log.topics[0], &log.data)?;
        let request_id = U256::from_be_slice(log.topics[1].as_slice());
        let party = Address::from_slice(&log.topics[2][12..32]);

        Some(ChainEvent {
            kind,
            request_id,
            party,
            block_number: log.block_number,
            transaction_hash: log.transaction_hash,
        })
    }

    /// Parses every log in a batch, dropping the ones that are not registry events.
    #[must_use]
    pub fn parse_all(logs: &[RawLog]) -> Vec<ChainEvent> {
        logs.iter().filter_map(Self::parse).collect()
    }

    fn classify(signature: &B256, data: &[u8]) -> Option<ChainEventKind> {
        let kind = if *signature == IGreenTrace::MintRequested::SIGNATURE_HASH {
            ChainEventKind::MintRequested
        } else if *signature == IGreenTrace::ExchangeRequested::SIGNATURE_HASH {
            ChainEventKind::ExchangeRequested
        } else if *signature == IGreenTrace::AuditSubmitted::SIGNATURE_HASH {
            // Layout: carbonValue(32) | auditType(32)
            if data.len() < 64 {
                return None;
            }
            ChainEventKind::AuditSubmitted {
                audit_type: data[63],
            }
        } else if *signature == IGreenTrace::AuditRejected::SIGNATURE_HASH {
            ChainEventKind::AuditRejected
        } else if *signature == IGreenTrace::NFTMintedAfterAudit::SIGNATURE_HASH {
            ChainEventKind::NftMinted
        } else if *signature == IGreenTrace::NFTExchanged::SIGNATURE_HASH {
            ChainEventKind::NftExchanged
        } else {
            return None;
        };
        Some(kind)
    }
}

/// Encodes a `uint256` as a topic word.
#[must_use]
pub fn u256_topic(value: U256) -> B256 {
    B256::from(value.to_be_bytes::<32>())
}

/// Encodes an address as a left-padded topic word.
#[must_use]
pub fn address_topic(address: Address) -> B256 {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(address.as_slice());
    B256::from(word)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log(kind: ChainEventKind, id: u64, party: Address, data: Vec<u8>) -> RawLog {
        RawLog {
            address: Address::repeat_byte(0xaa),
            topics: vec![
                kind.signature_hash(),
                u256_topic(U256::from(id)),
                address_topic(party),
            ],
            data,
            block_number: Some(12345),
            transaction_hash: None,
        }
    }

    #[test]
    fn test_event_parser_mint_requested() {
        let requester = Address::repeat_byte(1);
        let parsed = EventParser::parse(&log(ChainEventKind::MintRequested, 42, requester, vec![]))
            .unwrap();

        assert_eq!(parsed.kind, ChainEventKind::MintRequested);
        assert_eq!(parsed.request_id, U256::from(42));
        assert_eq!(parsed.party, requester);
        assert_eq!(parsed.block_number, Some(12345));
    }

    #[test]
    fn test_event_parser_reads_audit_type() {
        let mut data = vec![0u8; 64];
        data[63] = 1;
        let kind = ChainEventKind::AuditSubmitted { audit_type: 0 };
        let parsed = EventParser::parse(&log(kind, 3, Address::ZERO, data)).unwrap();

        assert_eq!(parsed.kind, ChainEventKind::AuditSubmitted { audit_type: 1 });
    }

    #[test]
    fn test_event_parser_rejects_truncated_logs() {
        let kind = ChainEventKind::AuditSubmitted { audit_type: 0 };
        assert!(EventParser::parse(&log(kind, 3, Address::ZERO, vec![0u8; 32])).is_none());

        let mut short = log(ChainEventKind::AuditRejected, 3, Address::ZERO, vec![]);
        short.topics.truncate(2);
        assert!(EventParser::parse(&short).is_none());
    }

    #[test]
    fn test_event_parser_ignores_foreign_events() {
        let mut foreign = log(ChainEventKind::NftMinted, 1, Address::ZERO, vec![]);
        foreign.topics[0] = B256::repeat_byte(0xfe);
        assert!(EventParser::parse(&foreign).is_none());
        assert!(EventParser::parse_all(&[foreign]).is_empty());
    }
}
