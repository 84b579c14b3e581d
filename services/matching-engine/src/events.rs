//! Journal events for a market's book
//!
//! Each state-changing operation is recorded as one event. Replaying the
//! events in order from a snapshot reconstructs the exact book, including
//! trade sequences, because placed orders carry their assigned id and
//! timestamp plus the slippage limit they were matched under.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::ids::OrderId;
use types::order::Order;

use crate::state::StateError;

/// A state-changing book operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BookEvent {
    /// An order was accepted and matched
    OrderPlaced { order: Order, slippage_limit: Decimal },
    /// A resting order was canceled
    OrderCanceled { order_id: OrderId },
    /// Every resting order was dropped
    BookCleared,
}

impl BookEvent {
    /// Label stored alongside the payload in the journal
    pub fn event_type(&self) -> &'static str {
        match self {
            BookEvent::OrderPlaced { .. } => "OrderPlaced",
            BookEvent::OrderCanceled { .. } => "OrderCanceled",
            BookEvent::BookCleared => "BookCleared",
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, StateError> {
        bincode::serialize(self).map_err(|e| StateError::Encode(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, StateError> {
        bincode::deserialize(bytes).map_err(|e| StateError::Decode(e.to_string()))
    }
}
