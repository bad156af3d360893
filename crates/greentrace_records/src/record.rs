//! # Record Model
//!
//! One user submission (mint request or exchange request) tracked through
//! its lifecycle.
//!
//! `status` holds the lifecycle stage derived from contract state. The
//! terminal `Exchanged` stage is never stored: it is computed by
//! [`Record::display_status`] from the existence probe result kept in
//! `presence`, so a retired asset relabels a record without touching its
//! fields.

use std::fmt;

use greentrace_chain::{Address, TokenAmount, U256};
use serde::{Deserialize, Serialize};

use crate::lifecycle;

/// Which registry queue a record comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    /// Request to mint an NFT for a carbon reduction claim.
    Mint,
    /// Request to exchange a minted NFT for tokens.
    Exchange,
}

impl RecordKind {
    /// Audit type carried by `AuditSubmitted` for this kind.
    #[must_use]
    pub const fn audit_type(self) -> u8 {
        match self {
            Self::Mint => 0,
            Self::Exchange => 1,
        }
    }

    /// Prefix of the deterministic transaction reference.
    #[must_use]
    pub const fn reference_prefix(self) -> &'static str {
        match self {
            Self::Mint => "request_",
            Self::Exchange => "exchange_request_",
        }
    }
}

/// Whose records an engine tracks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Scope {
    /// The connected account's own requests.
    Owner(Address),
    /// Every request, as seen by the connected auditor account.
    AuditQueue(Address),
}

impl Scope {
    /// The connected account.
    #[must_use]
    pub const fn account(self) -> Address {
        match self {
            Self::Owner(account) | Self::AuditQueue(account) => account,
        }
    }
}

/// Lifecycle stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Status {
    /// Submitted, not yet reviewed.
    Pending,
    /// Approved, artifact not produced yet.
    Approved,
    /// Rejected by the auditor.
    Rejected,
    /// Approved and the NFT exists.
    Minted,
    /// The NFT was burned in an exchange.
    Exchanged,
}

impl Status {
    /// Every stage, in lifecycle order.
    pub const ALL: [Self; 5] = [
        Self::Pending,
        Self::Approved,
        Self::Rejected,
        Self::Minted,
        Self::Exchanged,
    ];

    /// Lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Minted => "minted",
            Self::Exchanged => "exchanged",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a record came from. Decides merge precedence only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    /// Synthesized from an event notification.
    Event,
    /// Read from contract state.
    Contract,
}

/// Result of the last existence probe of the record's secondary asset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetPresence {
    /// Not probed, or every probe so far failed transiently.
    #[default]
    Unchecked,
    /// The asset has an owner.
    Present,
    /// The asset contract reported the token as nonexistent.
    Retired,
}

/// A tracked request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Queue the request belongs to.
    pub kind: RecordKind,
    /// Registry-assigned id.
    pub id: U256,
    /// Deduplication key.
    pub identity_key: String,
    /// Request title.
    pub title: String,
    /// Free-text description.
    pub details: String,
    /// Claimed carbon reduction (mint) or base price (exchange).
    pub quantity: TokenAmount,
    /// Fee paid with the request.
    pub fee_paid: TokenAmount,
    /// Lifecycle stage derived from contract state.
    pub status: Status,
    /// Reviewing auditor.
    pub auditor: Option<Address>,
    /// Value assigned by the auditor.
    pub audited_value: Option<TokenAmount>,
    /// Auditor comment or rejection reason.
    pub audit_comment: Option<String>,
    /// Review time, seconds.
    pub audited_at: Option<u64>,
    /// Minted NFT (mint) or NFT being exchanged (exchange).
    pub secondary_asset_id: Option<U256>,
    /// Metadata URI of the minted NFT.
    pub token_uri: Option<String>,
    /// Submitting account.
    pub requester: Option<Address>,
    /// Provenance.
    pub source: Source,
    /// Submission time, seconds.
    pub created_at: u64,
    /// Existence probe result for `secondary_asset_id`.
    #[serde(default)]
    pub presence: AssetPresence,
}

impl Record {
    /// Deterministic transaction reference shared by event and contract records.
    #[must_use]
    pub fn transaction_ref(kind: RecordKind, id: U256) -> String {
        format!("{}{id}", kind.reference_prefix())
    }

    /// Identity key for a record: the transaction reference when the id is
    /// known, `{id}_{created_at}` otherwise.
    #[must_use]
    pub fn identity_key_for(kind: RecordKind, id: U256, created_at: u64) -> String {
        if id.is_zero() {
            format!("{id}_{created_at}")
        } else {
            Self::transaction_ref(kind, id)
        }
    }

    /// Status shown to consumers.
    #[must_use]
    pub fn display_status(&self) -> Status {
        lifecycle::display_status(self.kind, self.status, self.presence)
    }

    /// Whether the existence oracle should probe this record.
    #[must_use]
    pub fn needs_probe(&self) -> bool {
        lifecycle::is_probe_candidate(self.kind, self.status, self.secondary_asset_id)
    }
}

/// A set of records, as cached and served.
pub type RecordSet = Vec<Record>;
