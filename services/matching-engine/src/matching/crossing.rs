//! Crossing detection logic
//!
//! Determines when a bid and ask can match based on price compatibility,
//! and when a market order has walked too far from its first fill.

use rust_decimal::Decimal;
use types::numeric::Price;

/// Check if a bid and ask can match at given prices
///
/// For a buy order to match with a sell order the buy price must be >= the
/// sell price.
pub fn can_match(bid_price: Price, ask_price: Price) -> bool {
    bid_price >= ask_price
}

/// Check whether `candidate` lies further than `limit` (a fraction) from
/// the first fill price of a market order
///
/// `|candidate - first| / first > limit`. Exactly at the limit still trades.
/// A deviation too large to represent counts as exceeding any limit.
pub fn exceeds_slippage(first: Price, candidate: Price, limit: Decimal) -> bool {
    let first = first.as_decimal();
    candidate
        .as_decimal()
        .checked_sub(first)
        .and_then(|delta| delta.abs().checked_div(first))
        .map_or(true, |deviation| deviation > limit)
}
