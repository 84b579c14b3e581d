//! Trade execution types

use crate::ids::{MarketId, OrderId};
use crate::numeric::{Price, Quantity};
use crate::order::Side;
use serde::{Deserialize, Serialize};

/// An immutable record of one match
///
/// The maker is the order that was resting longer; its price sets the print.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Per-market monotonic sequence
    pub sequence: u64,
    pub market: MarketId,

    pub taker_order_id: OrderId,
    pub maker_order_id: OrderId,

    /// Side of the taker
    pub taker_side: Side,
    pub price: Price,
    pub quantity: Quantity,

    /// Unix nanos; the taker's acceptance time
    pub executed_at: i64,
}
