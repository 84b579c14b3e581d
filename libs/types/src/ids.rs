//! Identifier types for engine entities
//!
//! Order ids are opaque strings: callers may bring their own (synthetic
//! liquidity workers tag theirs) or let the engine generate a UUID v7, which
//! keeps generated ids time-sortable.

use crate::errors::OrderError;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Longest accepted caller-supplied order id.
pub const MAX_ORDER_ID_LEN: usize = 128;

/// Longest accepted market symbol.
pub const MAX_MARKET_SYMBOL_LEN: usize = 32;

/// Unique identifier for an order
///
/// Unique within the life of a market's book. The engine never interprets
/// the contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    /// Generate a fresh id from a UUID v7
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Wrap a caller-supplied id, rejecting empty or oversized values
    pub fn try_new(id: impl Into<String>) -> Result<Self, OrderError> {
        let id = id.into();
        if id.is_empty() || id.len() > MAX_ORDER_ID_LEN || id.chars().any(char::is_control) {
            return Err(OrderError::InvalidOrderId(id));
        }
        Ok(Self(id))
    }

    /// Get the id string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OrderId {
    /// # Panics
    /// Panics if the id is empty; use [`OrderId::try_new`] for untrusted input.
    fn from(s: &str) -> Self {
        match Self::try_new(s) {
            Ok(id) => id,
            Err(e) => panic!("{e}"),
        }
    }
}

/// Market identifier (trading symbol)
///
/// Examples: "BTC-USDC", "TSLA". Restricted to `[A-Za-z0-9._-]` because the
/// symbol doubles as the market's on-disk directory name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarketId(String);

impl MarketId {
    /// Create a new MarketId from a string
    ///
    /// # Panics
    /// Panics if the symbol is invalid
    pub fn new(symbol: impl Into<String>) -> Self {
        let s = symbol.into();
        assert!(Self::is_valid(&s), "invalid market symbol: {s:?}");
        Self(s)
    }

    /// Try to create a MarketId, returning None if invalid
    pub fn try_new(symbol: impl Into<String>) -> Option<Self> {
        let s = symbol.into();
        if Self::is_valid(&s) {
            Some(Self(s))
        } else {
            None
        }
    }

    /// Get the symbol string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn is_valid(s: &str) -> bool {
        !s.is_empty()
            && s.len() <= MAX_MARKET_SYMBOL_LEN
            && s != "."
            && s != ".."
            && s
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    }
}

impl fmt::Display for MarketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MarketId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_order_ids_are_unique() {
        let id1 = OrderId::generate();
        let id2 = OrderId::generate();
        assert_ne!(id1, id2, "OrderIds should be unique");
    }

    #[test]
    fn test_order_id_try_new_rejects_empty() {
        assert!(OrderId::try_new("").is_err());
        assert!(OrderId::try_new("x".repeat(MAX_ORDER_ID_LEN + 1)).is_err());
        assert!(OrderId::try_new("MOCK-BID-BTC-USDC-1").is_ok());
    }

    #[test]
    fn test_order_id_serialization() {
        let id = OrderId::from("client-42");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"client-42\"");
        let deserialized: OrderId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, deserialized);
    }

    #[test]
    fn test_market_id_creation() {
        let market = MarketId::new("BTC-USDC");
        assert_eq!(market.as_str(), "BTC-USDC");
        assert_eq!(market.to_string(), "BTC-USDC");
    }

    #[test]
    fn test_market_id_try_new() {
        assert!(MarketId::try_new("TSLA").is_some());
        assert!(MarketId::try_new("ETH-USDC").is_some());
        assert!(MarketId::try_new("").is_none());
        assert!(MarketId::try_new("BTC/USDT").is_none());
        assert!(MarketId::try_new("..").is_none());
        assert!(MarketId::try_new("A".repeat(MAX_MARKET_SYMBOL_LEN + 1)).is_none());
    }

    #[test]
    #[should_panic(expected = "invalid market symbol")]
    fn test_market_id_invalid_format() {
        MarketId::new("../etc");
    }

    #[test]
    fn test_market_id_serialization() {
        let market = MarketId::new("SOL-USDC");
        let json = serde_json::to_string(&market).unwrap();
        assert_eq!(json, "\"SOL-USDC\"");

        let deserialized: MarketId = serde_json::from_str(&json).unwrap();
        assert_eq!(market, deserialized);
    }
}
