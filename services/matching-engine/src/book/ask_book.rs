//! Ask (sell-side) order book
//!
//! Maintains sell orders sorted by price ascending (best ask first).
//! Uses BTreeMap for deterministic iteration order.

use std::collections::BTreeMap;
use types::ids::OrderId;
use types::numeric::{Price, Quantity};
use types::order::Order;

use super::price_level::PriceLevel;

/// Ask (sell) side order book
///
/// Orders are sorted by price ascending, so the lowest ask is first.
/// At each price level, orders are kept in timestamp order.
#[derive(Debug, Clone)]
pub struct AskBook {
    /// Price levels sorted ascending (lowest price first)
    levels: BTreeMap<Price, PriceLevel>,
}

impl AskBook {
    /// Create a new empty ask book
    pub fn new() -> Self {
        Self {
            levels: BTreeMap::new(),
        }
    }

    /// Insert an order into the ask book at `price`
    ///
    /// Hands the order back when the level total would overflow.
    pub fn insert(&mut self, price: Price, order: Order) -> Result<(), Order> {
        self.levels.entry(price).or_default().insert(order)
    }

    /// Whether the level at `price` can take `quantity` more
    pub fn can_absorb(&self, price: Price, quantity: Quantity) -> bool {
        self.levels
            .get(&price)
            .map_or(true, |level| level.can_absorb(quantity))
    }

    /// Remove an order from the ask book
    pub fn remove(&mut self, order_id: &OrderId, price: Price) -> Option<Order> {
        let level = self.levels.get_mut(&price)?;
        let removed = level.remove(order_id)?;
        if level.is_empty() {
            self.levels.remove(&price);
        }
        Some(removed)
    }

    /// Look up a resting order at a known price
    pub fn get(&self, order_id: &OrderId, price: Price) -> Option<&Order> {
        self.levels
            .get(&price)?
            .iter()
            .find(|order| &order.order_id == order_id)
    }

    /// Get the best ask (front order of the lowest price level)
    pub fn best_ask(&self) -> Option<&Order> {
        self.levels.values().next().and_then(PriceLevel::front)
    }

    /// Get the best ask price
    pub fn best_ask_price(&self) -> Option<Price> {
        self.levels.keys().next().copied()
    }

    /// Fill the best ask by `quantity`, dropping the level once it empties
    pub(crate) fn fill_best(&mut self, quantity: Quantity, timestamp: i64) -> Option<(Order, bool)> {
        let mut entry = self.levels.first_entry()?;
        let outcome = entry.get_mut().fill_front(quantity, timestamp);
        if entry.get().is_empty() {
            entry.remove();
        }
        outcome
    }

    /// Get depth snapshot (top N price levels)
    pub fn depth_snapshot(&self, depth: usize) -> Vec<(Price, Quantity)> {
        self.levels
            .iter()
            .take(depth)
            .map(|(price, level)| (*price, level.total_quantity()))
            .collect()
    }

    /// Iterate resting orders in priority order (price asc, time asc)
    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.levels.values().flat_map(PriceLevel::iter)
    }

    /// Remove every resting order, returning how many were dropped
    pub fn clear(&mut self) -> usize {
        let count = self.order_count();
        self.levels.clear();
        count
    }

    /// Check if the ask book is empty
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Get the total number of price levels
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Get the total number of resting orders
    pub fn order_count(&self) -> usize {
        self.levels.values().map(PriceLevel::order_count).sum()
    }
}

impl Default for AskBook {
    fn default() -> Self {
        Self::new()
    }
}
