//! # Lifecycle Derivation
//!
//! Maps the registry's raw status code plus the secondary asset id onto a
//! [`Status`]:
//!
//! | code | asset id      | mint       | exchange   |
//! |------|---------------|------------|------------|
//! | 0    | any           | `Pending`  | `Pending`  |
//! | 1    | none / zero   | `Approved` | `Approved` |
//! | 1    | valid (> 0)   | `Minted`   | `Approved` |
//! | 2    | any           | `Rejected` | `Rejected` |
//!
//! `Exchanged` is layered on top for display only, from the existence probe.

use greentrace_chain::U256;

use crate::record::{AssetPresence, RecordKind, Status};

/// Raw code for a request awaiting review.
pub const CODE_PENDING: u8 = 0;
/// Raw code for an approved request.
pub const CODE_APPROVED: u8 = 1;
/// Raw code for a rejected request.
pub const CODE_REJECTED: u8 = 2;

/// Whether an asset id refers to a produced artifact. Zero means unset.
#[inline]
#[must_use]
pub fn is_valid_asset_id(asset_id: Option<U256>) -> bool {
    asset_id.is_some_and(|id| id > U256::ZERO)
}

/// Drops the zero sentinel.
#[inline]
#[must_use]
pub fn asset_id_from_raw(raw: U256) -> Option<U256> {
    (!raw.is_zero()).then_some(raw)
}

/// Derives the stored lifecycle stage.
///
/// # Returns
///
/// `None` for a status code the registry does not define.
#[must_use]
pub fn derive_status(kind: RecordKind, code: u8, asset_id: Option<U256>) -> Option<Status> {
    match code {
        CODE_PENDING => Some(Status::Pending),
        CODE_REJECTED => Some(Status::Rejected),
        CODE_APPROVED => match kind {
            RecordKind::Mint if is_valid_asset_id(asset_id) => Some(Status::Minted),
            RecordKind::Mint | RecordKind::Exchange => Some(Status::Approved),
        },
        _ => None,
    }
}

/// Whether the record's asset should be probed for existence.
///
/// Minted NFTs are probed to spot a later exchange. Approved exchanges are
/// probed to spot the burn that completes them.
#[must_use]
pub fn is_probe_candidate(kind: RecordKind, status: Status, asset_id: Option<U256>) -> bool {
    let stage_matches = match kind {
        RecordKind::Mint => status == Status::Minted,
        RecordKind::Exchange => status == Status::Approved,
    };
    stage_matches && is_valid_asset_id(asset_id)
}

/// Status shown to consumers.
#[must_use]
pub fn display_status(kind: RecordKind, status: Status, presence: AssetPresence) -> Status {
    match (kind, status, presence) {
        (RecordKind::Mint, Status::Minted, AssetPresence::Retired)
        | (RecordKind::Exchange, Status::Approved, AssetPresence::Retired) => Status::Exchanged,
        _ => status,
    }
}

/// Whether moving from `from` to `to` is a forward lifecycle step.
#[must_use]
pub fn is_forward(from: Status, to: Status) -> bool {
    matches!(
        (from, to),
        (Status::Pending, Status::Approved | Status::Rejected | Status::Minted)
            | (Status::Approved, Status::Minted | Status::Exchanged)
            | (Status::Minted, Status::Exchanged)
    )
}
