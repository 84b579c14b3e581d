//! Snapshot body for one market's book
//!
//! The persistence layer stores these bytes opaquely; only the matching
//! engine knows how to read them back.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use types::ids::MarketId;
use types::order::Order;

/// Full point-in-time state of a market's book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookState {
    pub market: MarketId,
    /// Resting orders, bids best-first then asks best-first
    pub orders: Vec<Order>,
    /// Last engine-assigned order timestamp
    pub last_timestamp: i64,
    /// Sequence the next trade will carry
    pub next_trade_sequence: u64,
}

impl BookState {
    pub fn encode(&self) -> Result<Vec<u8>, StateError> {
        bincode::serialize(self).map_err(|e| StateError::Encode(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, StateError> {
        bincode::deserialize(bytes).map_err(|e| StateError::Decode(e.to_string()))
    }
}

/// Errors raised while restoring or replaying book state
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StateError {
    #[error("Failed to encode book state: {0}")]
    Encode(String),

    #[error("Failed to decode book state: {0}")]
    Decode(String),

    #[error("State belongs to market {found}, expected {expected}")]
    ForeignMarket { expected: String, found: String },

    #[error("Restored order {order_id} is invalid: {reason}")]
    InvalidOrder { order_id: String, reason: String },

    #[error("Restored book is crossed")]
    Crossed,

    #[error("Replay diverged: {0}")]
    Replay(String),
}
