//! Matching engine core
//!
//! One `MatchingCore` per market: validates incoming orders, crosses them
//! against the book and reports trades and fill updates.

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;
use types::errors::OrderError;
use types::ids::{MarketId, OrderId};
use types::numeric::{Price, Quantity};
use types::order::{Order, OrderType, Side};
use types::trade::Trade;

use crate::book::OrderBook;
use crate::depth::DepthView;
use crate::events::BookEvent;
use crate::matching::{crossing, MatchExecutor};
use crate::state::{BookState, StateError};

/// Matching policy for one market
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchingConfig {
    /// Largest fractional distance from a market order's first fill price
    /// at which it may keep matching
    pub slippage_limit: Decimal,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            slippage_limit: Decimal::new(5, 2),
        }
    }
}

/// An order as submitted by a caller, before validation
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    /// Caller-chosen order id; generated when absent
    pub client_id: Option<String>,
    pub side: Side,
    pub order_type: OrderType,
    /// Required for limit orders, ignored for market orders
    pub price: Option<Decimal>,
    pub size: Decimal,
}

impl NewOrder {
    pub fn limit(side: Side, price: Decimal, size: Decimal) -> Self {
        Self {
            client_id: None,
            side,
            order_type: OrderType::Limit,
            price: Some(price),
            size,
        }
    }

    pub fn market(side: Side, size: Decimal) -> Self {
        Self {
            client_id: None,
            side,
            order_type: OrderType::Market,
            price: None,
            size,
        }
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }
}

/// A resting order that was reduced but stays on the book
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartialFill {
    pub order_id: OrderId,
    pub filled_quantity: Quantity,
    pub remaining_quantity: Quantity,
}

/// Outcome of placing one order
///
/// No trades means the order rested untouched (or a market order found
/// nothing to match). `pending` set means a partial or no fill. Neither
/// means the order filled completely.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaceResult {
    pub order_id: OrderId,
    pub trades: Vec<Trade>,
    /// The placed order if it is still resting
    pub pending: Option<Order>,
    /// Resting orders reduced by this placement
    pub partial_fills: Vec<PartialFill>,
    /// Resting orders consumed by this placement
    pub filled_orders: Vec<OrderId>,
    /// Unfilled size of the placed order; dropped for market orders
    pub remaining_size: Quantity,
}

/// Head-of-side details copied out of the book before mutating it
struct Resting {
    order_id: OrderId,
    price: Price,
    remaining: Quantity,
    timestamp: i64,
}

impl Resting {
    fn of(order: &Order) -> Option<Self> {
        Some(Self {
            order_id: order.order_id.clone(),
            price: order.price?,
            remaining: order.remaining_quantity,
            timestamp: order.timestamp,
        })
    }
}

/// Accumulates what one placement did to the book
struct FillReport {
    order_id: OrderId,
    trades: Vec<Trade>,
    partial_fills: Vec<PartialFill>,
    filled_orders: Vec<OrderId>,
}

impl FillReport {
    fn new(order_id: OrderId) -> Self {
        Self {
            order_id,
            trades: Vec::new(),
            partial_fills: Vec::new(),
            filled_orders: Vec::new(),
        }
    }

    fn record_fill(&mut self, order: &Order, done: bool) {
        if order.order_id == self.order_id {
            return;
        }
        self.partial_fills.retain(|fill| fill.order_id != order.order_id);
        if done {
            self.filled_orders.push(order.order_id.clone());
        } else {
            self.partial_fills.push(PartialFill {
                order_id: order.order_id.clone(),
                filled_quantity: order.filled_quantity,
                remaining_quantity: order.remaining_quantity,
            });
        }
    }

    fn finish(self, pending: Option<Order>, remaining_size: Quantity) -> PlaceResult {
        PlaceResult {
            order_id: self.order_id,
            trades: self.trades,
            pending,
            partial_fills: self.partial_fills,
            filled_orders: self.filled_orders,
            remaining_size,
        }
    }
}

/// Matching core for a single market
#[derive(Debug, Clone)]
pub struct MatchingCore {
    market: MarketId,
    book: OrderBook,
    /// Trade executor with sequence generation
    executor: MatchExecutor,
    config: MatchingConfig,
    /// Last assigned order timestamp (Unix nanos)
    last_timestamp: i64,
}

impl MatchingCore {
    pub fn new(market: MarketId, config: MatchingConfig) -> Self {
        Self {
            book: OrderBook::new(market.clone()),
            market,
            executor: MatchExecutor::default(),
            config,
            last_timestamp: 0,
        }
    }

    pub fn market(&self) -> &MarketId {
        &self.market
    }

    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    pub fn last_timestamp(&self) -> i64 {
        self.last_timestamp
    }

    pub fn next_trade_sequence(&self) -> u64 {
        self.executor.peek_sequence()
    }

    /// Validate, match and (for limit orders) rest one order
    pub fn place(&mut self, request: NewOrder, now: i64) -> Result<PlaceResult, OrderError> {
        self.place_with_event(request, now).map(|(result, _)| result)
    }

    /// Like [`place`](Self::place), also returning the journal event that
    /// reproduces the placement on replay
    pub fn place_with_event(
        &mut self,
        request: NewOrder,
        now: i64,
    ) -> Result<(PlaceResult, BookEvent), OrderError> {
        let order = self.accept(request, now)?;
        let slippage_limit = self.config.slippage_limit;
        let event = BookEvent::OrderPlaced {
            order: order.clone(),
            slippage_limit,
        };
        let result = self.execute(order, slippage_limit)?;
        Ok((result, event))
    }

    /// Validate a request and build the order it describes, with its id and
    /// timestamp assigned. Nothing is mutated.
    pub fn accept(&self, request: NewOrder, now: i64) -> Result<Order, OrderError> {
        let quantity = Quantity::try_new(request.size)
            .filter(|quantity| !quantity.is_zero())
            .ok_or_else(|| {
                OrderError::InvalidQuantity(format!("size must be > 0, got {}", request.size))
            })?;

        let price = match request.order_type {
            OrderType::Limit => {
                let raw = request.price.ok_or_else(|| {
                    OrderError::InvalidPrice("limit orders require a price".to_string())
                })?;
                let price = Price::try_new(raw).ok_or_else(|| {
                    OrderError::InvalidPrice(format!("price must be > 0, got {raw}"))
                })?;
                Some(price)
            }
            OrderType::Market => None,
        };

        let order_id = match request.client_id {
            Some(client_id) => OrderId::try_new(client_id)?,
            None => OrderId::generate(),
        };
        if self.book.contains(&order_id) {
            return Err(OrderError::DuplicateOrderId {
                order_id: order_id.to_string(),
            });
        }
        if let Some(price) = price {
            if !self.book.can_absorb(request.side, price, quantity) {
                return Err(OrderError::InvalidQuantity(format!(
                    "size {quantity} would overflow the total resting at {price}"
                )));
            }
        }

        let timestamp = self.next_timestamp(now);
        let order = match price {
            Some(price) => Order::limit(
                order_id,
                self.market.clone(),
                request.side,
                price,
                quantity,
                timestamp,
            ),
            None => Order::market(order_id, self.market.clone(), request.side, quantity, timestamp),
        };
        Ok(order)
    }

    /// Match an accepted order against the book
    ///
    /// Used both for live placements and for journal replay, so everything
    /// it does depends only on the order and the current book.
    pub fn execute(&mut self, order: Order, slippage_limit: Decimal) -> Result<PlaceResult, OrderError> {
        debug!(
            market = %self.market,
            order_id = %order.order_id,
            side = ?order.side,
            order_type = ?order.order_type,
            price = ?order.price.map(|p| p.to_string()),
            size = %order.quantity,
            "Order accepted"
        );

        let result = match order.order_type {
            OrderType::Limit => self.execute_limit(order)?,
            OrderType::Market => self.execute_market(order, slippage_limit),
        };

        for trade in &result.trades {
            debug!(
                market = %self.market,
                sequence = trade.sequence,
                maker_order_id = %trade.maker_order_id,
                taker_order_id = %trade.taker_order_id,
                price = %trade.price,
                quantity = %trade.quantity,
                "Trade executed"
            );
        }
        Ok(result)
    }

    fn execute_limit(&mut self, order: Order) -> Result<PlaceResult, OrderError> {
        let order_id = order.order_id.clone();
        let timestamp = order.timestamp;
        self.book.insert(order)?;
        self.last_timestamp = self.last_timestamp.max(timestamp);

        let mut fills = FillReport::new(order_id.clone());
        self.cross(timestamp, &mut fills);

        let pending = self.book.get(&order_id).cloned();
        let remaining_size = pending
            .as_ref()
            .map_or(Quantity::zero(), |order| order.remaining_quantity);
        Ok(fills.finish(pending, remaining_size))
    }

    /// Match the best bid against the best ask until the book no longer
    /// crosses. The earlier-timestamped order of each pair is the maker and
    /// sets the price.
    fn cross(&mut self, timestamp: i64, fills: &mut FillReport) {
        loop {
            let (bid, ask) = match (
                self.book.best_bid().and_then(Resting::of),
                self.book.best_ask().and_then(Resting::of),
            ) {
                (Some(bid), Some(ask)) => (bid, ask),
                _ => break,
            };
            if !crossing::can_match(bid.price, ask.price) {
                break;
            }

            let quantity = bid.remaining.min(ask.remaining);
            let (maker, taker, taker_side) = if bid.timestamp <= ask.timestamp {
                (&bid, &ask, Side::Sell)
            } else {
                (&ask, &bid, Side::Buy)
            };
            let trade = self.executor.execute_trade(
                self.market.clone(),
                maker.order_id.clone(),
                taker.order_id.clone(),
                taker_side,
                maker.price,
                quantity,
                timestamp,
            );

            for side in [Side::Buy, Side::Sell] {
                if let Some((order, done)) = self.book.fill_best(side, quantity, timestamp) {
                    fills.record_fill(&order, done);
                }
            }
            fills.trades.push(trade);
        }
    }

    /// Walk the opposing side until filled, exhausted, or the slippage guard
    /// trips. The remainder is dropped; market orders never rest.
    fn execute_market(&mut self, mut order: Order, slippage_limit: Decimal) -> PlaceResult {
        self.last_timestamp = self.last_timestamp.max(order.timestamp);
        let opposite = order.side.opposite();
        let mut fills = FillReport::new(order.order_id.clone());
        let mut first_price: Option<Price> = None;

        while !order.is_filled() {
            let Some(maker) = self.book.best(opposite).and_then(Resting::of) else {
                break;
            };
            match first_price {
                Some(first) if crossing::exceeds_slippage(first, maker.price, slippage_limit) => {
                    debug!(
                        market = %self.market,
                        order_id = %order.order_id,
                        first_price = %first,
                        candidate_price = %maker.price,
                        remaining = %order.remaining_quantity,
                        "Slippage guard stopped market order"
                    );
                    break;
                }
                Some(_) => {}
                None => first_price = Some(maker.price),
            }

            let quantity = order.remaining_quantity.min(maker.remaining);
            let trade = self.executor.execute_trade(
                self.market.clone(),
                maker.order_id,
                order.order_id.clone(),
                order.side,
                maker.price,
                quantity,
                order.timestamp,
            );
            if let Some((resting, done)) = self.book.fill_best(opposite, quantity, order.timestamp) {
                fills.record_fill(&resting, done);
            }
            order.add_fill(quantity, order.timestamp);
            fills.trades.push(trade);
        }

        fills.finish(None, order.remaining_quantity)
    }

    /// Remove a resting order; `None` when no such order rests here
    pub fn cancel(&mut self, order_id: &OrderId, now: i64) -> Option<Order> {
        let mut order = self.book.remove(order_id)?;
        order.cancel(now);
        debug!(market = %self.market, order_id = %order_id, "Order canceled");
        Some(order)
    }

    /// Drop every resting order, returning how many were removed
    pub fn clear(&mut self) -> usize {
        self.book.clear()
    }

    pub fn depth(&self, levels: usize) -> DepthView {
        self.book.depth(levels)
    }

    pub fn best_bid(&self) -> Option<&Order> {
        self.book.best_bid()
    }

    pub fn best_ask(&self) -> Option<&Order> {
        self.book.best_ask()
    }

    /// Capture the full book for a snapshot
    pub fn state(&self) -> BookState {
        BookState {
            market: self.market.clone(),
            orders: self.book.resting_orders().cloned().collect(),
            last_timestamp: self.last_timestamp,
            next_trade_sequence: self.executor.peek_sequence(),
        }
    }

    /// Rebuild a core from a snapshot body
    ///
    /// Rejects state for another market, unpriced or exhausted orders,
    /// duplicated ids and crossed books.
    pub fn restore(
        market: MarketId,
        state: BookState,
        config: MatchingConfig,
    ) -> Result<Self, StateError> {
        if state.market != market {
            return Err(StateError::ForeignMarket {
                expected: market.to_string(),
                found: state.market.to_string(),
            });
        }

        let mut core = Self::new(market, config);
        let mut last_timestamp = state.last_timestamp;
        for order in state.orders {
            let problem = if order.market != core.market {
                Some("belongs to another market")
            } else if order.order_type != OrderType::Limit || order.price.is_none() {
                Some("only priced limit orders can rest")
            } else if order.remaining_quantity.is_zero() || order.status.is_terminal() {
                Some("order is no longer live")
            } else if !order.check_invariant() {
                Some("filled and remaining quantities do not add up")
            } else {
                None
            };
            if let Some(reason) = problem {
                return Err(StateError::InvalidOrder {
                    order_id: order.order_id.to_string(),
                    reason: reason.to_string(),
                });
            }

            last_timestamp = last_timestamp.max(order.timestamp);
            let order_id = order.order_id.to_string();
            core.book
                .insert(order)
                .map_err(|e| StateError::InvalidOrder {
                    order_id,
                    reason: e.to_string(),
                })?;
        }

        if core.book.is_crossed() {
            return Err(StateError::Crossed);
        }
        core.last_timestamp = last_timestamp;
        core.executor = MatchExecutor::new(state.next_trade_sequence.max(1));
        Ok(core)
    }

    /// Re-apply one journaled event during recovery
    ///
    /// `timestamp` is the journal entry's timestamp.
    pub fn apply(&mut self, event: BookEvent, timestamp: i64) -> Result<(), StateError> {
        match event {
            BookEvent::OrderPlaced {
                order,
                slippage_limit,
            } => {
                if order.market != self.market {
                    return Err(StateError::ForeignMarket {
                        expected: self.market.to_string(),
                        found: order.market.to_string(),
                    });
                }
                self.execute(order, slippage_limit)
                    .map_err(|e| StateError::Replay(e.to_string()))?;
            }
            BookEvent::OrderCanceled { order_id } => {
                self.cancel(&order_id, timestamp).ok_or_else(|| {
                    StateError::Replay(format!("canceled order {order_id} is not resting"))
                })?;
            }
            BookEvent::BookCleared => {
                self.clear();
            }
        }
        Ok(())
    }

    /// Timestamp for the next accepted order: strictly after the last one
    fn next_timestamp(&self, now: i64) -> i64 {
        now.max(self.last_timestamp.saturating_add(1))
    }
}
