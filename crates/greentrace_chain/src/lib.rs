//! # GreenTrace Chain Boundary
//!
//! Everything the record engine knows about the chain, and nothing about transports.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐  read_batch   ┌─────────────────┐
//! │  Registry /     │ ◀──────────── │  BatchReader    │ ◀── fetcher, oracle
//! │  NFT contracts  │               └─────────────────┘
//! │                 │  logs         ┌─────────────────┐
//! │                 │ ────────────▶ │  EventSource    │ ──▶ EventParser ──▶ listener
//! └─────────────────┘               └─────────────────┘
//! ```
//!
//! Adapters for a real node implement [`BatchReader`] and [`EventSource`];
//! [`ChainSimulator`] implements both in memory.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod contracts;
pub mod events;
pub mod rpc;
pub mod simulator;
pub mod units;

pub use contracts::{CashRequest, IGreenTalesNFT, IGreenTrace, MintRequest, RequestData};
pub use events::{ChainEvent, ChainEventKind, EventParser, RawLog};
pub use rpc::{
    decode_returns, BatchReader, CallOutcome, ContractCall, EventSource, LogFilter, LogSink,
    ReadError, Subscription,
};
pub use simulator::ChainSimulator;
pub use units::TokenAmount;

pub use alloy_primitives::{Address, B256, U256};
