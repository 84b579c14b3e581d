//! Order lifecycle types

use crate::ids::{MarketId, OrderId};
use crate::numeric::{Price, Quantity};
use serde::{Deserialize, Serialize};

/// Order side (buyer or seller)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Buy order (bid)
    Buy,
    /// Sell order (ask)
    Sell,
}

impl Side {
    /// Get the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// How an incoming order is executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    /// Rests at its price until filled or canceled
    Limit,
    /// Takes liquidity immediately; any remainder is dropped, never rests
    Market,
}

/// Order status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Accepted, nothing filled yet
    Open,
    /// Partially matched
    Partial,
    /// Completely matched (terminal)
    Filled,
    /// Removed from the book before filling (terminal)
    Canceled,
}

impl OrderStatus {
    /// Check if status is terminal (no further transitions possible)
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Filled | OrderStatus::Canceled)
    }
}

/// One resting or incoming instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: OrderId,
    pub market: MarketId,
    pub side: Side,
    pub order_type: OrderType,
    /// Limit price; None for market orders
    pub price: Option<Price>,
    pub quantity: Quantity,
    pub filled_quantity: Quantity,
    pub remaining_quantity: Quantity,
    pub status: OrderStatus,
    /// Acceptance time (Unix nanos), strictly increasing per market
    pub timestamp: i64,
    pub updated_at: i64,
}

impl Order {
    /// Create a new open limit order
    pub fn limit(
        order_id: OrderId,
        market: MarketId,
        side: Side,
        price: Price,
        quantity: Quantity,
        timestamp: i64,
    ) -> Self {
        Self::new(order_id, market, side, OrderType::Limit, Some(price), quantity, timestamp)
    }

    /// Create a new market order
    pub fn market(
        order_id: OrderId,
        market: MarketId,
        side: Side,
        quantity: Quantity,
        timestamp: i64,
    ) -> Self {
        Self::new(order_id, market, side, OrderType::Market, None, quantity, timestamp)
    }

    fn new(
        order_id: OrderId,
        market: MarketId,
        side: Side,
        order_type: OrderType,
        price: Option<Price>,
        quantity: Quantity,
        timestamp: i64,
    ) -> Self {
        Self {
            order_id,
            market,
            side,
            order_type,
            price,
            quantity,
            filled_quantity: Quantity::zero(),
            remaining_quantity: quantity,
            status: OrderStatus::Open,
            timestamp,
            updated_at: timestamp,
        }
    }

    /// Check quantity invariant: filled + remaining = total
    pub fn check_invariant(&self) -> bool {
        self.filled_quantity.checked_add(self.remaining_quantity) == Some(self.quantity)
    }

    /// Check if order is completely filled
    pub fn is_filled(&self) -> bool {
        self.remaining_quantity.is_zero()
    }

    /// Check if order has any fills
    pub fn has_fills(&self) -> bool {
        !self.filled_quantity.is_zero()
    }

    /// Update filled quantity and adjust status
    ///
    /// A fill larger than the remaining quantity is clamped to it.
    pub fn add_fill(&mut self, fill_quantity: Quantity, timestamp: i64) {
        self.remaining_quantity = self.remaining_quantity.saturating_sub(fill_quantity);
        self.filled_quantity = self.quantity.saturating_sub(self.remaining_quantity);

        if self.is_filled() {
            self.status = OrderStatus::Filled;
        } else if self.has_fills() {
            self.status = OrderStatus::Partial;
        }

        self.updated_at = timestamp;

        debug_assert!(self.check_invariant(), "Invariant violated after fill");
    }

    /// Mark the order canceled
    pub fn cancel(&mut self, timestamp: i64) {
        if !self.status.is_terminal() {
            self.status = OrderStatus::Canceled;
            self.updated_at = timestamp;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn sample_order(qty: &str) -> Order {
        Order::limit(
            OrderId::from("ord-1"),
            MarketId::new("BTC-USDC"),
            Side::Buy,
            Price::from_u64(50000),
            Quantity::from_str(qty).unwrap(),
            1708123456789000000,
        )
    }

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::Buy.opposite(), Side::Sell);
        assert_eq!(Side::Sell.opposite(), Side::Buy);
    }

    #[test]
    fn test_order_creation() {
        let order = sample_order("1.0");

        assert_eq!(order.status, OrderStatus::Open);
        assert_eq!(order.order_type, OrderType::Limit);
        assert!(order.check_invariant());
        assert!(!order.has_fills());
    }

    #[test]
    fn test_market_order_has_no_price() {
        let order = Order::market(
            OrderId::from("m-1"),
            MarketId::new("ETH-USDC"),
            Side::Sell,
            Quantity::from_u64(3),
            1,
        );
        assert_eq!(order.price, None);
        assert_eq!(order.order_type, OrderType::Market);
    }

    #[test]
    fn test_order_fill() {
        let mut order = sample_order("1.0");

        order.add_fill(Quantity::from_str("0.3").unwrap(), 1708123456790000000);
        assert_eq!(order.status, OrderStatus::Partial);
        assert_eq!(order.remaining_quantity, Quantity::from_str("0.7").unwrap());
        assert!(order.check_invariant());

        order.add_fill(Quantity::from_str("0.7").unwrap(), 1708123456791000000);
        assert_eq!(order.status, OrderStatus::Filled);
        assert!(order.is_filled());
        assert!(order.check_invariant());
    }

    #[test]
    fn test_order_overfill_is_clamped() {
        let mut order = sample_order("1.0");
        order.add_fill(Quantity::from_str("1.5").unwrap(), 1708123456790000000);
        assert!(order.is_filled());
        assert_eq!(order.filled_quantity, order.quantity);
        assert!(order.check_invariant());
    }

    #[test]
    fn test_cancel_terminal_is_noop() {
        let mut order = sample_order("1.0");
        order.add_fill(Quantity::from_str("1.0").unwrap(), 2);
        order.cancel(3);
        assert_eq!(order.status, OrderStatus::Filled);

        let mut open = sample_order("2.0");
        open.cancel(4);
        assert_eq!(open.status, OrderStatus::Canceled);
        assert_eq!(open.updated_at, 4);
    }

    #[test]
    fn test_order_serialization() {
        let order = sample_order("2.5");

        let json = serde_json::to_string(&order).unwrap();
        assert!(json.contains("\"side\":\"buy\""));
        assert!(json.contains("\"order_type\":\"limit\""));
        let deserialized: Order = serde_json::from_str(&json).unwrap();
        assert_eq!(order, deserialized);

        let bytes = bincode::serialize(&order).unwrap();
        let decoded: Order = bincode::deserialize(&bytes).unwrap();
        assert_eq!(order, decoded);
    }
}
