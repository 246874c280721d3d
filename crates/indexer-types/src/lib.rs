//! Canonical types for the NFT order indexing core.
//!
//! Every marketplace protocol is normalized into the order, event and cache
//! models defined here. The rest of the workspace only ever speaks these
//! types; protocol-specific payloads survive solely as opaque `raw_data`.

pub mod events;
pub mod jobs;
pub mod onchain;
pub mod order;
pub mod ordering;
pub mod token_set;

pub use events::*;
pub use jobs::*;
pub use onchain::*;
pub use order::*;
pub use ordering::*;
pub use token_set::*;

pub use alloy::primitives::{keccak256, Address, Bytes, B256, U256};

/// Deterministic order identifier (keccak of protocol tag + immutable fields).
pub type OrderId = B256;
