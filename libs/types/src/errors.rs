//! Error types for the matching engine
//!
//! Caller errors (`InvalidOrder`, `UnknownMarket`) are never retried by the
//! engine. Cancel misses are a value, not an error; persistence failures are
//! reported alongside a successful result.

use rust_decimal::Decimal;
use thiserror::Error;

/// Top-level engine error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Invalid order: {0}")]
    InvalidOrder(#[from] OrderError),

    #[error("Unknown market: {symbol}")]
    UnknownMarket { symbol: String },

    #[error("Market {symbol} is unavailable: {reason}")]
    MarketUnavailable { symbol: String, reason: String },

    #[error("System error: {message}")]
    System { message: String },
}

/// Order validation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrderError {
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("Invalid order id: {0:?}")]
    InvalidOrderId(String),

    #[error("Order id already resting on the book: {order_id}")]
    DuplicateOrderId { order_id: String },
}

/// Numeric parse and range errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NumericError {
    #[error("Not a decimal number: {0:?}")]
    Parse(String),

    #[error("Value must be positive, got {0}")]
    NotPositive(Decimal),

    #[error("Value must not be negative, got {0}")]
    Negative(Decimal),
}
