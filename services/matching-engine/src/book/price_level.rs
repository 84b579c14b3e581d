//! Price level implementation with a time-ordered queue
//!
//! A price level contains all resting orders at one price point, kept in
//! timestamp order so the earliest submission is always at the front.

use std::collections::VecDeque;
use types::ids::OrderId;
use types::numeric::Quantity;
use types::order::Order;

/// A price level containing orders at a specific price
#[derive(Debug, Clone)]
pub struct PriceLevel {
    /// Queue of orders at this price level, timestamp ascending
    orders: VecDeque<Order>,
    /// Total remaining quantity available at this level
    total_quantity: Quantity,
}

impl PriceLevel {
    /// Create a new empty price level
    pub fn new() -> Self {
        Self {
            orders: VecDeque::new(),
            total_quantity: Quantity::zero(),
        }
    }

    /// Insert an order at its time-priority position
    ///
    /// Engine-assigned timestamps only increase, so the common case is a
    /// push to the back. Restored orders may arrive out of order. The order
    /// is handed back untouched when the level total would overflow.
    pub fn insert(&mut self, order: Order) -> Result<(), Order> {
        let Some(total) = self.total_quantity.checked_add(order.remaining_quantity) else {
            return Err(order);
        };
        self.total_quantity = total;
        match self.orders.back() {
            Some(last) if last.timestamp > order.timestamp => {
                let position = self
                    .orders
                    .iter()
                    .position(|resting| resting.timestamp > order.timestamp)
                    .unwrap_or(self.orders.len());
                self.orders.insert(position, order);
            }
            _ => self.orders.push_back(order),
        }
        Ok(())
    }

    /// Whether `quantity` more fits in the level total
    pub fn can_absorb(&self, quantity: Quantity) -> bool {
        self.total_quantity.checked_add(quantity).is_some()
    }

    /// Remove an order from the queue by OrderId
    pub fn remove(&mut self, order_id: &OrderId) -> Option<Order> {
        let position = self.orders.iter().position(|o| &o.order_id == order_id)?;
        let order = self.orders.remove(position)?;
        self.total_quantity = self.total_quantity.saturating_sub(order.remaining_quantity);
        Some(order)
    }

    /// Peek at the front order without removing it
    pub fn front(&self) -> Option<&Order> {
        self.orders.front()
    }

    /// Fill the front order by `quantity`
    ///
    /// Returns the order after the fill and whether it was fully filled (and
    /// therefore popped). `quantity` is clamped to the order's remainder.
    pub fn fill_front(&mut self, quantity: Quantity, timestamp: i64) -> Option<(Order, bool)> {
        let front = self.orders.front_mut()?;
        let fill = quantity.min(front.remaining_quantity);
        front.add_fill(fill, timestamp);
        self.total_quantity = self.total_quantity.saturating_sub(fill);

        if front.is_filled() {
            let filled = self.orders.pop_front()?;
            Some((filled, true))
        } else {
            Some((front.clone(), false))
        }
    }

    /// Iterate orders in time priority
    pub fn iter(&self) -> impl Iterator<Item = &Order> {
        self.orders.iter()
    }

    /// Check if the price level is empty
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Get the total quantity at this price level
    pub fn total_quantity(&self) -> Quantity {
        self.total_quantity
    }

    /// Get the number of orders at this level
    pub fn order_count(&self) -> usize {
        self.orders.len()
    }
}

impl Default for PriceLevel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use types::ids::MarketId;
    use types::numeric::Price;
    use types::order::Side;

    fn order(id: &str, qty: &str, ts: i64) -> Order {
        Order::limit(
            OrderId::from(id),
            MarketId::new("BTC-USDC"),
            Side::Buy,
            Price::from_u64(100),
            Quantity::from_str(qty).unwrap(),
            ts,
        )
    }

    #[test]
    fn test_price_level_insert() {
        let mut level = PriceLevel::new();
        level.insert(order("a", "1.5", 1)).unwrap();

        assert_eq!(level.order_count(), 1);
        assert_eq!(level.total_quantity(), Quantity::from_str("1.5").unwrap());
        assert!(!level.is_empty());
    }

    #[test]
    fn test_price_level_fifo_order() {
        let mut level = PriceLevel::new();
        level.insert(order("a", "1.0", 1)).unwrap();
        level.insert(order("b", "2.0", 2)).unwrap();
        level.insert(order("c", "3.0", 3)).unwrap();

        let front = level.front().unwrap();
        assert_eq!(front.order_id, OrderId::from("a"));
    }

    #[test]
    fn test_out_of_order_insert_keeps_time_priority() {
        let mut level = PriceLevel::new();
        level.insert(order("late", "1.0", 30)).unwrap();
        level.insert(order("early", "1.0", 10)).unwrap();
        level.insert(order("middle", "1.0", 20)).unwrap();

        let ids: Vec<_> = level.iter().map(|o| o.order_id.as_str().to_string()).collect();
        assert_eq!(ids, vec!["early", "middle", "late"]);
    }

    #[test]
    fn test_price_level_remove() {
        let mut level = PriceLevel::new();
        level.insert(order("a", "1.0", 1)).unwrap();
        level.insert(order("b", "2.0", 2)).unwrap();

        let removed = level.remove(&OrderId::from("a")).unwrap();
        assert_eq!(removed.remaining_quantity, Quantity::from_str("1.0").unwrap());
        assert_eq!(level.order_count(), 1);
        assert_eq!(level.total_quantity(), Quantity::from_str("2.0").unwrap());
        assert!(level.remove(&OrderId::from("missing")).is_none());
    }

    #[test]
    fn test_fill_front_partial_then_full() {
        let mut level = PriceLevel::new();
        level.insert(order("a", "5.0", 1)).unwrap();
        level.insert(order("b", "1.0", 2)).unwrap();

        let (after, done) = level.fill_front(Quantity::from_str("2.0").unwrap(), 9).unwrap();
        assert!(!done);
        assert_eq!(after.remaining_quantity, Quantity::from_str("3.0").unwrap());
        assert_eq!(level.total_quantity(), Quantity::from_str("4.0").unwrap());

        let (after, done) = level.fill_front(Quantity::from_str("3.0").unwrap(), 10).unwrap();
        assert!(done);
        assert!(after.is_filled());
        assert_eq!(level.order_count(), 1);
        assert_eq!(level.front().unwrap().order_id, OrderId::from("b"));
    }

    #[test]
    fn test_price_level_total_quantity_invariant() {
        let mut level = PriceLevel::new();
        level.insert(order("a", "1.5", 1)).unwrap();
        level.insert(order("b", "2.5", 2)).unwrap();
        level.insert(order("c", "3.0", 3)).unwrap();

        let sum = level
            .iter()
            .map(|o| o.remaining_quantity)
            .try_fold(Quantity::zero(), Quantity::checked_add);
        assert_eq!(Some(level.total_quantity()), sum);
        assert_eq!(level.total_quantity(), Quantity::from_str("7.0").unwrap());
    }

    #[test]
    fn test_insert_rejects_total_overflow() {
        let mut level = PriceLevel::new();
        level.insert(order("a", "50000000000000000000000000000", 1)).unwrap();
        assert!(!level.can_absorb(Quantity::from_str("50000000000000000000000000000").unwrap()));

        let rejected = level
            .insert(order("b", "50000000000000000000000000000", 2))
            .unwrap_err();
        assert_eq!(rejected.order_id, OrderId::from("b"));
        assert_eq!(level.order_count(), 1);
        assert_eq!(
            level.total_quantity(),
            Quantity::from_str("50000000000000000000000000000").unwrap()
        );
    }
}
