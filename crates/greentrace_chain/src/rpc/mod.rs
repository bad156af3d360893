//! # Read and Subscribe Collaborators
//!
//! The two chain services the engine consumes, expressed as traits so the
//! engine never sees a transport:
//!
//! - [`BatchReader`]: a list of `(target, method, calldata)` descriptors in,
//!   one `Ok(return data) | Err(ReadError)` per descriptor out, order preserved.
//! - [`EventSource`]: `(target, event, sink)` in, a [`Subscription`] out. The
//!   sink receives each batch of matching logs until the subscription is dropped.

use std::fmt;
use std::sync::Arc;

use alloy_primitives::{Address, B256};
use alloy_sol_types::{SolCall, SolError};
use async_trait::async_trait;
use thiserror::Error;

use crate::contracts::IGreenTalesNFT;
use crate::events::{ChainEventKind, RawLog};

/// Revert reasons node clients report for a burned or never-minted ERC-721 token.
const NOT_FOUND_REASONS: [&str; 4] = [
    "nonexistent token",
    "invalid token id",
    "erc721nonexistenttoken",
    "owner query for nonexistent",
];

/// Errors a contract read can produce.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReadError {
    /// The call executed and reverted.
    #[error("execution reverted: {reason}")]
    Reverted {
        /// Revert reason as reported by the node, possibly empty.
        reason: String,
        /// Raw revert data (custom error selector + args).
        data: Vec<u8>,
    },

    /// The node could not be reached or did not answer.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The call returned data that does not match the expected ABI.
    #[error("undecodable return data for {method}: {detail}")]
    Decode {
        /// Solidity signature of the call.
        method: &'static str,
        /// Decoder message.
        detail: String,
    },
}

impl ReadError {
    /// Whether the error proves the target token does not exist.
    ///
    /// Only reverts qualify. A transport or decode failure says nothing
    /// about the token.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Reverted { reason, data } => {
                if data.len() >= 4
                    && data[..4] == IGreenTalesNFT::ERC721NonexistentToken::SELECTOR
                {
                    return true;
                }
                let reason = reason.to_ascii_lowercase();
                NOT_FOUND_REASONS.iter().any(|known| reason.contains(known))
            }
            Self::Transport(_) | Self::Decode { .. } => false,
        }
    }

    /// Whether retrying the same read later may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// One entry of a batched read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContractCall {
    /// Contract to call.
    pub target: Address,
    /// Solidity signature, kept for logging.
    pub method: &'static str,
    /// ABI-encoded calldata including the selector.
    pub input: Vec<u8>,
}

impl ContractCall {
    /// Builds a descriptor from a typed call.
    #[must_use]
    pub fn new<C: SolCall>(target: Address, call: &C) -> Self {
        Self {
            target,
            method: C::SIGNATURE,
            input: call.abi_encode(),
        }
    }

    /// Returns the 4-byte selector, if the calldata has one.
    #[must_use]
    pub fn selector(&self) -> Option<[u8; 4]> {
        self.input.get(..4).and_then(|s| s.try_into().ok())
    }
}

/// Result of one entry of a batched read.
pub type CallOutcome = Result<Vec<u8>, ReadError>;

/// Decodes the return data of a typed call.
///
/// # Errors
///
/// Passes the read error through, or returns [`ReadError::Decode`] if the
/// data does not match the call's return type.
pub fn decode_returns<C: SolCall>(outcome: CallOutcome) -> Result<C::Return, ReadError> {
    let data = outcome?;
    C::abi_decode_returns(&data, true).map_err(|e| ReadError::Decode {
        method: C::SIGNATURE,
        detail: e.to_string(),
    })
}

/// Batched contract-read service.
#[async_trait]
pub trait BatchReader: Send + Sync {
    /// Executes every call and returns one outcome per call, in order.
    ///
    /// Implementations may execute the calls concurrently or as one multicall;
    /// a failing entry must not fail its neighbours.
    async fn read_batch(&self, calls: &[ContractCall]) -> Vec<CallOutcome>;
}

/// What a subscription listens for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogFilter {
    /// Emitting contract.
    pub address: Address,
    /// Event signature hash (topic 0).
    pub topic0: B256,
    /// Event name, kept for logging.
    pub event: &'static str,
}

impl LogFilter {
    /// Filter for one registry event on `address`.
    #[must_use]
    pub fn registry_event(address: Address, kind: ChainEventKind) -> Self {
        Self {
            address,
            topic0: kind.signature_hash(),
            event: kind.name(),
        }
    }

    /// Whether a log matches this filter.
    #[must_use]
    pub fn matches(&self, log: &RawLog) -> bool {
        log.address == self.address && log.topics.first() == Some(&self.topic0)
    }
}

/// Callback invoked with each batch of matching logs.
pub type LogSink = Arc<dyn Fn(Vec<RawLog>) + Send + Sync>;

/// Event subscription service.
pub trait EventSource: Send + Sync {
    /// Starts delivering logs matching `filter` to `sink`.
    ///
    /// Delivery stops when the returned [`Subscription`] is dropped.
    fn subscribe(&self, filter: LogFilter, sink: LogSink) -> Subscription;
}

/// Handle to a live subscription. Dropping it unsubscribes.
pub struct Subscription {
    filter: LogFilter,
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Creates a handle that runs `cancel` when dropped.
    #[must_use]
    pub fn new(filter: LogFilter, cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            filter,
            cancel: Some(Box::new(cancel)),
        }
    }

    /// The filter this subscription was opened with.
    #[must_use]
    pub const fn filter(&self) -> &LogFilter {
        &self.filter
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("event", &self.filter.event)
            .field("address", &self.filter.address)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_not_found_classification() {
        let custom = ReadError::Reverted {
            reason: String::new(),
            data: IGreenTalesNFT::ERC721NonexistentToken {
                tokenId: U256::from(9),
            }
            .abi_encode(),
        };
        assert!(custom.is_not_found());

        let legacy = ReadError::Reverted {
            reason: "ERC721: owner query for nonexistent token".to_string(),
            data: Vec::new(),
        };
        assert!(legacy.is_not_found());

        let other_revert = ReadError::Reverted {
            reason: "Pausable: paused".to_string(),
            data: Vec::new(),
        };
        assert!(!other_revert.is_not_found());

        let transport = ReadError::Transport("connection reset".to_string());
        assert!(!transport.is_not_found());
        assert!(transport.is_transient());
    }

    #[test]
    fn test_decode_returns_reports_method() {
        let err = decode_returns::<IGreenTalesNFT::ownerOfCall>(Ok(vec![1, 2, 3])).unwrap_err();
        match err {
            ReadError::Decode { method, .. } => assert_eq!(method, "ownerOf(uint256)"),
            other => panic!("Wrong error: {other:?}"),
        }
    }

    #[test]
    fn test_subscription_cancels_on_drop() {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let filter = LogFilter::registry_event(Address::ZERO, ChainEventKind::AuditRejected);

        let subscription = Subscription::new(filter, move || flag.store(true, Ordering::SeqCst));
        assert_eq!(subscription.filter().event, "AuditRejected");
        drop(subscription);

        assert!(cancelled.load(Ordering::SeqCst));
    }
}
