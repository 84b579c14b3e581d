//! Trade execution logic
//!
//! Stamps trade records with a per-market monotonic sequence.

use types::ids::{MarketId, OrderId};
use types::numeric::{Price, Quantity};
use types::order::Side;
use types::trade::Trade;

/// Match executor for handling trade generation
#[derive(Debug, Clone)]
pub struct MatchExecutor {
    sequence_counter: u64,
}

impl MatchExecutor {
    /// Create a new match executor with starting sequence number
    pub fn new(starting_sequence: u64) -> Self {
        Self {
            sequence_counter: starting_sequence,
        }
    }

    /// Sequence the next trade will carry
    pub fn peek_sequence(&self) -> u64 {
        self.sequence_counter
    }

    /// Get next sequence number (monotonically increasing)
    fn next_sequence(&mut self) -> u64 {
        let seq = self.sequence_counter;
        self.sequence_counter += 1;
        seq
    }

    /// Execute a trade between maker and taker orders
    ///
    /// `price` is the maker's price; `timestamp` is the taker's acceptance
    /// time so that replaying the same orders reproduces the same record.
    #[allow(clippy::too_many_arguments)]
    pub fn execute_trade(
        &mut self,
        market: MarketId,
        maker_order_id: OrderId,
        taker_order_id: OrderId,
        taker_side: Side,
        price: Price,
        quantity: Quantity,
        timestamp: i64,
    ) -> Trade {
        Trade {
            sequence: self.next_sequence(),
            market,
            taker_order_id,
            maker_order_id,
            taker_side,
            price,
            quantity,
            executed_at: timestamp,
        }
    }
}

impl Default for MatchExecutor {
    fn default() -> Self {
        Self::new(1)
    }
}
