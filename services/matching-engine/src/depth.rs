//! Depth view
//!
//! Read-only aggregation of a book into price levels for external
//! consumption. Always recomputed from the book, never stored.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::numeric::{Price, Quantity};

/// Number of levels returned when the caller does not ask for a count
pub const DEFAULT_DEPTH_LEVELS: usize = 20;

/// Aggregated `(price, total remaining size)` levels, best first on each side
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthView {
    /// Highest price first
    pub bids: Vec<(Price, Quantity)>,
    /// Lowest price first
    pub asks: Vec<(Price, Quantity)>,
}

impl DepthView {
    pub fn empty() -> Self {
        Self {
            bids: Vec::new(),
            asks: Vec::new(),
        }
    }

    pub fn best_bid(&self) -> Option<(Price, Quantity)> {
        self.bids.first().copied()
    }

    pub fn best_ask(&self) -> Option<(Price, Quantity)> {
        self.asks.first().copied()
    }

    /// Best ask minus best bid, when both sides are present
    pub fn spread(&self) -> Option<Decimal> {
        let (bid, _) = self.best_bid()?;
        let (ask, _) = self.best_ask()?;
        Some(ask.as_decimal() - bid.as_decimal())
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }
}

impl Default for DepthView {
    fn default() -> Self {
        Self::empty()
    }
}
