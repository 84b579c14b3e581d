//! Market registry
//!
//! Owns every configured market. The market map is built once in
//! [`MarketRegistry::open`] and never changes afterwards, so the registry is
//! shared by reference across threads; each market serializes its own
//! mutations behind its lock.
//!
//! **Key Invariants:**
//! - A mutation is matched, journaled and snapshotted under one write lock
//! - Journal order equals apply order per market
//! - A market that failed recovery rejects every operation
//! - Memory state is authoritative when persistence fails

use crate::config::{ConfigError, EngineConfig};
use crate::market::{Durability, Market, MarketState, MarketStatus};
use chrono::Utc;
use matching_engine::{BookEvent, DepthView, MatchingConfig, NewOrder, PlaceResult};
use persistence::{FileStore, StoreProvider};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use types::errors::EngineError;
use types::ids::{MarketId, OrderId};
use types::numeric::Price;
use types::order::{Order, OrderType, Side};

#[derive(Error, Debug)]
pub enum OpenError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Cannot create data directory: {0}")]
    DataDir(#[from] std::io::Error),
}

/// An order as submitted by a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub side: Side,
    pub order_type: OrderType,
    /// Required for limit orders, ignored for market orders
    pub price: Option<Decimal>,
    pub size: Decimal,
    /// Caller-chosen order id; generated when absent
    pub client_id: Option<String>,
}

impl OrderRequest {
    pub fn limit(side: Side, price: Decimal, size: Decimal) -> Self {
        Self {
            side,
            order_type: OrderType::Limit,
            price: Some(price),
            size,
            client_id: None,
        }
    }

    pub fn market(side: Side, size: Decimal) -> Self {
        Self {
            side,
            order_type: OrderType::Market,
            price: None,
            size,
            client_id: None,
        }
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }
}

impl From<OrderRequest> for NewOrder {
    fn from(req: OrderRequest) -> Self {
        NewOrder {
            client_id: req.client_id,
            side: req.side,
            order_type: req.order_type,
            price: req.price,
            size: req.size,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaceOutcome {
    #[serde(flatten)]
    pub result: PlaceResult,
    pub durability: Durability,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CancelOutcome {
    Canceled { order: Order, durability: Durability },
    NotFound,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClearOutcome {
    pub removed: usize,
    pub durability: Durability,
}

/// Registry view of one market, for listings
#[derive(Debug, Clone, Serialize)]
pub struct MarketInfo {
    pub symbol: MarketId,
    pub id: u32,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub persistent: bool,
    pub resting_orders: usize,
}

pub struct MarketRegistry {
    markets: HashMap<MarketId, Market>,
    /// Configuration order, for listings
    symbols: Vec<MarketId>,
    by_numeric_id: HashMap<u32, MarketId>,
    default_market: MarketId,
}

impl MarketRegistry {
    /// Open every configured market, with file persistence when enabled
    pub fn open(config: EngineConfig) -> Result<Self, OpenError> {
        if config.persistence.enabled {
            std::fs::create_dir_all(&config.persistence.data_dir)?;
            let provider = FileStore::new(config.persistence.store_config());
            Self::build(config, Some(&provider as &dyn StoreProvider))
        } else {
            Self::build(config, None)
        }
    }

    /// Open every configured market through `provider`
    pub fn open_with_provider(
        config: EngineConfig,
        provider: &dyn StoreProvider,
    ) -> Result<Self, OpenError> {
        Self::build(config, Some(provider))
    }

    fn build(config: EngineConfig, provider: Option<&dyn StoreProvider>) -> Result<Self, OpenError> {
        config.validate()?;
        let matching = MatchingConfig {
            slippage_limit: config.slippage_limit,
        };

        let mut markets = HashMap::with_capacity(config.markets.len());
        let mut symbols = Vec::with_capacity(config.markets.len());
        let mut by_numeric_id = HashMap::with_capacity(config.markets.len());

        for market_config in &config.markets {
            let id = MarketId::try_new(market_config.symbol.as_str()).ok_or_else(|| {
                ConfigError::Invalid(format!("invalid market symbol {:?}", market_config.symbol))
            })?;
            let status = Self::open_market(&id, provider, &matching, config.snapshot_interval);

            by_numeric_id.insert(market_config.id, id.clone());
            symbols.push(id.clone());
            markets.insert(
                id.clone(),
                Market {
                    id,
                    numeric_id: market_config.id,
                    status,
                },
            );
        }

        let default_market = MarketId::try_new(config.default_market.as_str()).ok_or_else(|| {
            ConfigError::Invalid(format!("invalid default market {:?}", config.default_market))
        })?;

        let available = markets.values().filter(|m| m.is_available()).count();
        info!(
            markets = markets.len(),
            available,
            persistent = provider.is_some(),
            "market registry open"
        );

        Ok(Self {
            markets,
            symbols,
            by_numeric_id,
            default_market,
        })
    }

    fn open_market(
        id: &MarketId,
        provider: Option<&dyn StoreProvider>,
        matching: &MatchingConfig,
        snapshot_interval: u64,
    ) -> MarketStatus {
        let store = match provider.map(|p| p.open(id.as_str())).transpose() {
            Ok(store) => store,
            Err(e) => {
                error!(market = %id, error = %e, "market unavailable: store failed to open");
                return MarketStatus::Unavailable {
                    reason: e.to_string(),
                };
            }
        };

        match MarketState::recover(id.clone(), store, *matching, snapshot_interval) {
            Ok((state, summary)) => {
                info!(
                    market = %id,
                    snapshot_sequence = ?summary.snapshot_sequence,
                    replayed = summary.replayed,
                    torn_tail_bytes = summary.torn_tail_bytes,
                    resting = state.core.book().len(),
                    "market recovered"
                );
                MarketStatus::Available(RwLock::new(state))
            }
            Err(e) => {
                error!(market = %id, error = %e, "market unavailable: recovery failed");
                MarketStatus::Unavailable {
                    reason: e.to_string(),
                }
            }
        }
    }

    // ── Operations ──────────────────────────────────────────────────

    /// Match an order and rest any limit remainder
    pub fn place_order(
        &self,
        market: &str,
        request: OrderRequest,
    ) -> Result<PlaceOutcome, EngineError> {
        let mut state = self.write(market)?;
        let (result, event) = state.core.place_with_event(request.into(), now_nanos())?;
        let timestamp = state.core.last_timestamp();
        let durability = state.record(&event, timestamp);
        Ok(PlaceOutcome { result, durability })
    }

    /// Remove a resting order
    ///
    /// A miss is [`CancelOutcome::NotFound`] and leaves no journal entry.
    pub fn cancel_order(
        &self,
        market: &str,
        order_id: &OrderId,
    ) -> Result<CancelOutcome, EngineError> {
        let mut state = self.write(market)?;
        let now = now_nanos();
        let Some(order) = state.core.cancel(order_id, now) else {
            debug!(market, order_id = %order_id, "cancel missed: order not resting");
            return Ok(CancelOutcome::NotFound);
        };
        let event = BookEvent::OrderCanceled {
            order_id: order_id.clone(),
        };
        let durability = state.record(&event, now);
        Ok(CancelOutcome::Canceled { order, durability })
    }

    /// Aggregated book, at most `levels` per side
    pub fn depth(&self, market: &str, levels: usize) -> Result<DepthView, EngineError> {
        let state = self.read(market)?;
        Ok(state.core.depth(levels))
    }

    /// Best bid and ask prices
    pub fn best_bid_ask(
        &self,
        market: &str,
    ) -> Result<(Option<Price>, Option<Price>), EngineError> {
        let state = self.read(market)?;
        let bid = state.core.best_bid().and_then(|o| o.price);
        let ask = state.core.best_ask().and_then(|o| o.price);
        Ok((bid, ask))
    }

    /// Drop every resting order in a market
    pub fn clear_market(&self, market: &str) -> Result<ClearOutcome, EngineError> {
        let mut state = self.write(market)?;
        let now = now_nanos();
        let removed = state.core.clear();
        let durability = state.record(&BookEvent::BookCleared, now);
        info!(market, removed, "book cleared");
        Ok(ClearOutcome {
            removed,
            durability,
        })
    }

    /// Write a snapshot of one market now
    ///
    /// Returns the journal sequence it covers, or `None` without persistence.
    pub fn checkpoint(&self, market: &str) -> Result<Option<u64>, EngineError> {
        let mut state = self.write(market)?;
        state.checkpoint(now_nanos()).map_err(|e| EngineError::System {
            message: format!("snapshot of {market} failed: {e}"),
        })
    }

    /// [`checkpoint`](Self::checkpoint) every available market
    pub fn checkpoint_all(&self) -> Vec<(MarketId, Result<Option<u64>, EngineError>)> {
        self.symbols
            .iter()
            .filter(|id| self.is_available(id.as_str()))
            .map(|id| (id.clone(), self.checkpoint(id.as_str())))
            .collect()
    }

    /// Map a numeric market id to its symbol, falling back to the default
    pub fn resolve_market(&self, numeric_id: u32) -> &MarketId {
        match self.by_numeric_id.get(&numeric_id) {
            Some(id) => id,
            None => {
                warn!(
                    numeric_id,
                    fallback = %self.default_market,
                    "unknown numeric market id"
                );
                &self.default_market
            }
        }
    }

    /// All configured markets, in configuration order
    pub fn markets(&self) -> Vec<MarketInfo> {
        self.symbols
            .iter()
            .filter_map(|id| self.markets.get(id))
            .map(|market| {
                let (persistent, resting_orders) = match &market.status {
                    MarketStatus::Available(lock) => lock
                        .read()
                        .map(|s| (s.is_persistent(), s.core.book().len()))
                        .unwrap_or((false, 0)),
                    MarketStatus::Unavailable { .. } => (false, 0),
                };
                MarketInfo {
                    symbol: market.id.clone(),
                    id: market.numeric_id,
                    available: market.is_available(),
                    reason: market.unavailable_reason().map(str::to_string),
                    persistent,
                    resting_orders,
                }
            })
            .collect()
    }

    pub fn market(&self, market: &str) -> Option<&Market> {
        let id = MarketId::try_new(market)?;
        self.markets.get(&id)
    }

    pub fn is_available(&self, market: &str) -> bool {
        self.market(market).map(Market::is_available).unwrap_or(false)
    }

    pub fn default_market(&self) -> &MarketId {
        &self.default_market
    }

    // ── Internal ────────────────────────────────────────────────────

    fn lookup(&self, market: &str) -> Result<&RwLock<MarketState>, EngineError> {
        let entry = self.market(market).ok_or_else(|| EngineError::UnknownMarket {
            symbol: market.to_string(),
        })?;
        match &entry.status {
            MarketStatus::Available(lock) => Ok(lock),
            MarketStatus::Unavailable { reason } => Err(EngineError::MarketUnavailable {
                symbol: market.to_string(),
                reason: reason.clone(),
            }),
        }
    }

    fn read(&self, market: &str) -> Result<RwLockReadGuard<'_, MarketState>, EngineError> {
        self.lookup(market)?.read().map_err(|_| poisoned(market))
    }

    fn write(&self, market: &str) -> Result<RwLockWriteGuard<'_, MarketState>, EngineError> {
        self.lookup(market)?.write().map_err(|_| poisoned(market))
    }
}

fn poisoned(market: &str) -> EngineError {
    EngineError::System {
        message: format!("market {market} lock poisoned"),
    }
}

/// Wall-clock time in Unix nanoseconds
fn now_nanos() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MarketConfig;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn volatile_config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.persistence.enabled = false;
        config
    }

    fn registry() -> MarketRegistry {
        MarketRegistry::open(volatile_config()).unwrap()
    }

    #[test]
    fn test_place_and_depth() {
        let registry = registry();
        let outcome = registry
            .place_order("BTC-USDC", OrderRequest::limit(Side::Buy, dec("100"), dec("10")))
            .unwrap();

        assert!(outcome.result.trades.is_empty());
        assert_eq!(outcome.durability, Durability::Volatile);
        let depth = registry.depth("BTC-USDC", 20).unwrap();
        assert_eq!(depth.bids.len(), 1);
        assert!(depth.asks.is_empty());
    }

    #[test]
    fn test_unknown_market() {
        let registry = registry();
        let err = registry
            .place_order("XRP-USDC", OrderRequest::limit(Side::Buy, dec("1"), dec("1")))
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownMarket { .. }));
        assert!(matches!(
            registry.depth("not a symbol", 5),
            Err(EngineError::UnknownMarket { .. })
        ));
    }

    #[test]
    fn test_invalid_order_leaves_book_untouched() {
        let registry = registry();
        let err = registry
            .place_order("ETH-USDC", OrderRequest::limit(Side::Sell, dec("-1"), dec("1")))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidOrder(_)));
        assert!(registry.depth("ETH-USDC", 20).unwrap().is_empty());
    }

    #[test]
    fn test_cancel_not_found() {
        let registry = registry();
        registry
            .place_order("SOL-USDC", OrderRequest::limit(Side::Sell, dec("20"), dec("3")))
            .unwrap();
        let before = registry.depth("SOL-USDC", 20).unwrap();

        let outcome = registry
            .cancel_order("SOL-USDC", &OrderId::from("missing"))
            .unwrap();
        assert!(matches!(outcome, CancelOutcome::NotFound));
        assert_eq!(registry.depth("SOL-USDC", 20).unwrap(), before);
    }

    #[test]
    fn test_cancel_resting_order() {
        let registry = registry();
        let placed = registry
            .place_order(
                "TSLA",
                OrderRequest::limit(Side::Buy, dec("250"), dec("2")).with_client_id("t-1"),
            )
            .unwrap();
        assert_eq!(placed.result.order_id.as_str(), "t-1");

        match registry.cancel_order("TSLA", &OrderId::from("t-1")).unwrap() {
            CancelOutcome::Canceled { order, durability } => {
                assert_eq!(order.order_id.as_str(), "t-1");
                assert_eq!(durability, Durability::Volatile);
            }
            CancelOutcome::NotFound => panic!("order should have been resting"),
        }
        assert!(registry.depth("TSLA", 20).unwrap().is_empty());
    }

    #[test]
    fn test_clear_market() {
        let registry = registry();
        for price in ["10", "11", "12"] {
            registry
                .place_order("NVDA", OrderRequest::limit(Side::Sell, dec(price), dec("1")))
                .unwrap();
        }
        let outcome = registry.clear_market("NVDA").unwrap();
        assert_eq!(outcome.removed, 3);
        assert!(registry.depth("NVDA", 20).unwrap().is_empty());
    }

    #[test]
    fn test_resolve_market_with_fallback() {
        let registry = registry();
        assert_eq!(registry.resolve_market(3).as_str(), "ETH-USDC");
        assert_eq!(registry.resolve_market(15).as_str(), "ABNB");
        assert_eq!(registry.resolve_market(999).as_str(), "BTC-USDC");
    }

    #[test]
    fn test_best_bid_ask() {
        let registry = registry();
        registry
            .place_order("META", OrderRequest::limit(Side::Buy, dec("99"), dec("1")))
            .unwrap();
        registry
            .place_order("META", OrderRequest::limit(Side::Sell, dec("101"), dec("1")))
            .unwrap();

        let (bid, ask) = registry.best_bid_ask("META").unwrap();
        assert_eq!(bid.map(|p| p.as_decimal()), Some(dec("99")));
        assert_eq!(ask.map(|p| p.as_decimal()), Some(dec("101")));
    }

    #[test]
    fn test_markets_in_configuration_order() {
        let mut config = volatile_config();
        config.markets = vec![MarketConfig::new("TSLA", 8), MarketConfig::new("BTC-USDC", 4)];
        let registry = MarketRegistry::open(config).unwrap();

        let listed: Vec<String> = registry
            .markets()
            .into_iter()
            .map(|m| m.symbol.to_string())
            .collect();
        assert_eq!(listed, vec!["TSLA", "BTC-USDC"]);
        assert!(registry.is_available("TSLA"));
        assert!(!registry.is_available("ETH-USDC"));
    }

    #[test]
    fn test_invalid_config_refused() {
        let mut config = volatile_config();
        config.markets.push(MarketConfig::new("BTC-USDC", 77));
        assert!(matches!(
            MarketRegistry::open(config),
            Err(OpenError::Config(_))
        ));
    }

    #[test]
    fn test_checkpoint_without_persistence() {
        let registry = registry();
        assert_eq!(registry.checkpoint("BTC-USDC").unwrap(), None);
        assert_eq!(registry.checkpoint_all().len(), 13);
    }

    #[test]
    fn test_configured_slippage_limit_applies() {
        let mut config = volatile_config();
        config.slippage_limit = dec("0.5");
        let registry = MarketRegistry::open(config).unwrap();

        registry
            .place_order("HOOD", OrderRequest::limit(Side::Sell, dec("100"), dec("1")))
            .unwrap();
        registry
            .place_order("HOOD", OrderRequest::limit(Side::Sell, dec("120"), dec("1")))
            .unwrap();

        let outcome = registry
            .place_order("HOOD", OrderRequest::market(Side::Buy, dec("2")))
            .unwrap();
        assert_eq!(outcome.result.trades.len(), 2, "20% move is inside a 50% limit");
    }
}
