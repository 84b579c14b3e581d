//! Order book infrastructure module
//!
//! Contains price levels, bid book, and ask book implementations, and the
//! per-market [`OrderBook`] that ties both sides together with an id index.

pub mod ask_book;
pub mod bid_book;
pub mod price_level;

pub use ask_book::AskBook;
pub use bid_book::BidBook;
pub use price_level::PriceLevel;

use std::collections::HashMap;
use types::errors::OrderError;
use types::ids::{MarketId, OrderId};
use types::numeric::{Price, Quantity};
use types::order::{Order, Side};

use crate::depth::DepthView;

/// Resting orders of one market, split into bid and ask sides
#[derive(Debug, Clone)]
pub struct OrderBook {
    market: MarketId,
    bids: BidBook,
    asks: AskBook,
    /// Where each resting order lives, so cancels need only the id
    index: HashMap<OrderId, (Side, Price)>,
}

impl OrderBook {
    pub fn new(market: MarketId) -> Self {
        Self {
            market,
            bids: BidBook::new(),
            asks: AskBook::new(),
            index: HashMap::new(),
        }
    }

    pub fn market(&self) -> &MarketId {
        &self.market
    }

    /// Insert a priced order on its side at time priority
    ///
    /// Orders without a price (market orders) never rest.
    pub fn insert(&mut self, order: Order) -> Result<(), OrderError> {
        let price = order
            .price
            .ok_or_else(|| OrderError::InvalidPrice("market orders never rest".to_string()))?;
        if self.index.contains_key(&order.order_id) {
            return Err(OrderError::DuplicateOrderId {
                order_id: order.order_id.to_string(),
            });
        }

        let order_id = order.order_id.clone();
        let side = order.side;
        let inserted = match side {
            Side::Buy => self.bids.insert(price, order),
            Side::Sell => self.asks.insert(price, order),
        };
        inserted.map_err(|rejected| level_overflow(&rejected, price))?;
        self.index.insert(order_id, (side, price));
        Ok(())
    }

    /// Whether the level at `price` on `side` can take `quantity` more
    pub fn can_absorb(&self, side: Side, price: Price, quantity: Quantity) -> bool {
        match side {
            Side::Buy => self.bids.can_absorb(price, quantity),
            Side::Sell => self.asks.can_absorb(price, quantity),
        }
    }

    /// Remove an order from whichever side it rests on
    ///
    /// `None` means no such order; callers treat that as a no-op.
    pub fn remove(&mut self, order_id: &OrderId) -> Option<Order> {
        let (side, price) = self.index.remove(order_id)?;
        match side {
            Side::Buy => self.bids.remove(order_id, price),
            Side::Sell => self.asks.remove(order_id, price),
        }
    }

    pub fn get(&self, order_id: &OrderId) -> Option<&Order> {
        let (side, price) = self.index.get(order_id)?;
        match side {
            Side::Buy => self.bids.get(order_id, *price),
            Side::Sell => self.asks.get(order_id, *price),
        }
    }

    pub fn contains(&self, order_id: &OrderId) -> bool {
        self.index.contains_key(order_id)
    }

    pub fn best_bid(&self) -> Option<&Order> {
        self.bids.best_bid()
    }

    pub fn best_ask(&self) -> Option<&Order> {
        self.asks.best_ask()
    }

    /// Best order resting on `side`
    pub fn best(&self, side: Side) -> Option<&Order> {
        match side {
            Side::Buy => self.best_bid(),
            Side::Sell => self.best_ask(),
        }
    }

    /// True when the best bid is priced at or above the best ask
    pub fn is_crossed(&self) -> bool {
        match (self.bids.best_bid_price(), self.asks.best_ask_price()) {
            (Some(bid), Some(ask)) => bid >= ask,
            _ => false,
        }
    }

    /// Fill the best order on `side`, unindexing it once fully filled
    pub(crate) fn fill_best(
        &mut self,
        side: Side,
        quantity: Quantity,
        timestamp: i64,
    ) -> Option<(Order, bool)> {
        let outcome = match side {
            Side::Buy => self.bids.fill_best(quantity, timestamp),
            Side::Sell => self.asks.fill_best(quantity, timestamp),
        }?;
        if outcome.1 {
            self.index.remove(&outcome.0.order_id);
        }
        Some(outcome)
    }

    /// Aggregate the top `max_levels` price levels of each side
    pub fn depth(&self, max_levels: usize) -> DepthView {
        DepthView {
            bids: self.bids.depth_snapshot(max_levels),
            asks: self.asks.depth_snapshot(max_levels),
        }
    }

    /// All resting orders: bids best-first, then asks best-first
    pub fn resting_orders(&self) -> impl Iterator<Item = &Order> {
        self.bids.orders().chain(self.asks.orders())
    }

    pub fn bids(&self) -> &BidBook {
        &self.bids
    }

    pub fn asks(&self) -> &AskBook {
        &self.asks
    }

    /// Drop every resting order, returning how many were removed
    pub fn clear(&mut self) -> usize {
        self.index.clear();
        self.bids.clear() + self.asks.clear()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

fn level_overflow(order: &Order, price: Price) -> OrderError {
    OrderError::InvalidQuantity(format!(
        "size {} would overflow the total resting at {price}",
        order.remaining_quantity
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn limit(id: &str, side: Side, price: u64, qty: &str, ts: i64) -> Order {
        Order::limit(
            OrderId::from(id),
            MarketId::new("BTC-USDC"),
            side,
            Price::from_u64(price),
            Quantity::from_str(qty).unwrap(),
            ts,
        )
    }

    #[test]
    fn test_remove_scans_both_sides() {
        let mut book = OrderBook::new(MarketId::new("BTC-USDC"));
        book.insert(limit("bid", Side::Buy, 99, "1", 1)).unwrap();
        book.insert(limit("ask", Side::Sell, 101, "1", 2)).unwrap();

        let removed = book.remove(&OrderId::from("ask")).unwrap();
        assert_eq!(removed.side, Side::Sell);
        assert!(book.best_ask().is_none());
        assert_eq!(book.len(), 1);

        assert!(book.remove(&OrderId::from("nope")).is_none());
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn test_insert_rejects_duplicates_and_unpriced() {
        let mut book = OrderBook::new(MarketId::new("BTC-USDC"));
        book.insert(limit("a", Side::Buy, 99, "1", 1)).unwrap();

        let dup = book.insert(limit("a", Side::Sell, 120, "1", 2));
        assert!(matches!(dup, Err(OrderError::DuplicateOrderId { .. })));

        let market = Order::market(
            OrderId::from("m"),
            MarketId::new("BTC-USDC"),
            Side::Buy,
            Quantity::from_u64(1),
            3,
        );
        assert!(matches!(book.insert(market), Err(OrderError::InvalidPrice(_))));
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn test_level_overflow_leaves_book_unchanged() {
        let mut book = OrderBook::new(MarketId::new("BTC-USDC"));
        let big = "50000000000000000000000000000";
        book.insert(limit("a", Side::Buy, 100, big, 1)).unwrap();
        assert!(!book.can_absorb(Side::Buy, Price::from_u64(100), Quantity::from_str(big).unwrap()));
        assert!(book.can_absorb(Side::Buy, Price::from_u64(99), Quantity::from_str(big).unwrap()));

        let overflow = book.insert(limit("b", Side::Buy, 100, big, 2));
        assert!(matches!(overflow, Err(OrderError::InvalidQuantity(_))));
        assert!(!book.contains(&OrderId::from("b")));
        assert_eq!(book.len(), 1);
        assert_eq!(book.bids().order_count(), 1);
    }

    #[test]
    fn test_crossed_detection() {
        let mut book = OrderBook::new(MarketId::new("BTC-USDC"));
        book.insert(limit("bid", Side::Buy, 100, "1", 1)).unwrap();
        assert!(!book.is_crossed());
        book.insert(limit("ask", Side::Sell, 100, "1", 2)).unwrap();
        assert!(book.is_crossed());
    }

    #[test]
    fn test_depth_aggregates_same_price() {
        let mut book = OrderBook::new(MarketId::new("BTC-USDC"));
        book.insert(limit("a", Side::Sell, 50, "5", 1)).unwrap();
        book.insert(limit("b", Side::Sell, 50, "3", 2)).unwrap();
        book.insert(limit("c", Side::Sell, 51, "1", 3)).unwrap();

        let view = book.depth(20);
        assert_eq!(
            view.asks,
            vec![
                (Price::from_u64(50), Quantity::from_u64(8)),
                (Price::from_u64(51), Quantity::from_u64(1)),
            ]
        );
        assert!(view.bids.is_empty());
        assert!(book.depth(0).is_empty());
    }

    #[test]
    fn test_fill_best_unindexes_filled_orders() {
        let mut book = OrderBook::new(MarketId::new("BTC-USDC"));
        book.insert(limit("a", Side::Buy, 100, "2", 1)).unwrap();

        let (_, done) = book.fill_best(Side::Buy, Quantity::from_u64(2), 5).unwrap();
        assert!(done);
        assert!(!book.contains(&OrderId::from("a")));
        assert!(book.is_empty());
    }

    #[test]
    fn test_clear() {
        let mut book = OrderBook::new(MarketId::new("BTC-USDC"));
        book.insert(limit("a", Side::Buy, 99, "1", 1)).unwrap();
        book.insert(limit("b", Side::Sell, 101, "1", 2)).unwrap();

        assert_eq!(book.clear(), 2);
        assert!(book.is_empty());
        assert!(book.get(&OrderId::from("a")).is_none());
    }
}
