//! End-to-end order flow through the registry
//!
//! Runs the reference scenarios against a volatile registry (persistence
//! disabled) and checks the book shape after each call.

use exchange::{CancelOutcome, Durability, EngineConfig, MarketRegistry, OrderRequest};
use rust_decimal::Decimal;
use std::str::FromStr;
use types::errors::EngineError;
use types::ids::OrderId;
use types::numeric::{Price, Quantity};
use types::order::Side;

const MARKET: &str = "BTC-USDC";

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn level(price: u64, size: &str) -> (Price, Quantity) {
    (Price::from_u64(price), Quantity::try_new(dec(size)).unwrap())
}

fn registry() -> MarketRegistry {
    let mut config = EngineConfig::default();
    config.persistence.enabled = false;
    MarketRegistry::open(config).unwrap()
}

fn limit(registry: &MarketRegistry, side: Side, price: &str, size: &str) -> exchange::PlaceOutcome {
    registry
        .place_order(MARKET, OrderRequest::limit(side, dec(price), dec(size)))
        .unwrap()
}

#[test]
fn test_scenario_a_limit_rests_on_empty_book() {
    let registry = registry();
    let outcome = limit(&registry, Side::Buy, "100", "10");

    assert!(outcome.result.trades.is_empty());
    assert!(outcome.result.pending.is_some());
    let depth = registry.depth(MARKET, 20).unwrap();
    assert_eq!(depth.bids, vec![level(100, "10")]);
    assert!(depth.asks.is_empty());
}

#[test]
fn test_scenario_b_crossing_limit_prints_at_maker_price() {
    let registry = registry();
    let bid = limit(&registry, Side::Buy, "100", "10");
    let outcome = limit(&registry, Side::Sell, "99", "4");

    assert_eq!(outcome.result.trades.len(), 1);
    let trade = &outcome.result.trades[0];
    assert_eq!(trade.price, Price::from_u64(100));
    assert_eq!(trade.quantity, Quantity::from_u64(4));
    assert_eq!(trade.maker_order_id, bid.result.order_id);
    assert_eq!(trade.taker_order_id, outcome.result.order_id);
    assert!(outcome.result.pending.is_none());
    assert_eq!(outcome.result.partial_fills.len(), 1);

    let depth = registry.depth(MARKET, 20).unwrap();
    assert_eq!(depth.bids, vec![level(100, "6")]);
    assert!(depth.asks.is_empty());
}

#[test]
fn test_scenario_c_market_order_drops_remainder() {
    let registry = registry();
    limit(&registry, Side::Buy, "100", "10");
    let outcome = registry
        .place_order(MARKET, OrderRequest::market(Side::Sell, dec("15")))
        .unwrap();

    assert_eq!(outcome.result.trades.len(), 1);
    assert_eq!(outcome.result.trades[0].quantity, Quantity::from_u64(10));
    assert_eq!(outcome.result.remaining_size, Quantity::from_u64(5));
    assert!(registry.depth(MARKET, 20).unwrap().is_empty());
}

#[test]
fn test_scenario_d_time_priority_within_level() {
    let registry = registry();
    let first = limit(&registry, Side::Sell, "50", "5");
    limit(&registry, Side::Sell, "50", "3");
    let outcome = limit(&registry, Side::Buy, "50", "6");

    let trades = &outcome.result.trades;
    assert_eq!(trades.len(), 2);
    assert_eq!(trades[0].maker_order_id, first.result.order_id);
    assert_eq!(trades[0].quantity, Quantity::from_u64(5));
    let total: Decimal = trades.iter().map(|t| t.quantity.as_decimal()).sum();
    assert_eq!(total, dec("6"));
    assert_eq!(outcome.result.filled_orders, vec![first.result.order_id]);
    assert_eq!(registry.depth(MARKET, 20).unwrap().asks, vec![level(50, "2")]);
}

#[test]
fn test_scenario_e_cancel_unknown_is_benign() {
    let registry = registry();
    limit(&registry, Side::Buy, "100", "10");
    let before = registry.depth(MARKET, 20).unwrap();

    let outcome = registry
        .cancel_order(MARKET, &OrderId::from("nope"))
        .unwrap();
    assert!(matches!(outcome, CancelOutcome::NotFound));
    assert_eq!(registry.depth(MARKET, 20).unwrap(), before);
}

#[test]
fn test_scenario_f_slippage_guard_stops_sweep() {
    let registry = registry();
    limit(&registry, Side::Sell, "100", "1");
    limit(&registry, Side::Sell, "103", "1");
    limit(&registry, Side::Sell, "120", "10");

    let outcome = registry
        .place_order(MARKET, OrderRequest::market(Side::Buy, dec("5")))
        .unwrap();

    assert_eq!(outcome.result.trades.len(), 2);
    assert!(outcome.result.remaining_size.as_decimal() > Decimal::ZERO);
    assert_eq!(outcome.result.remaining_size, Quantity::from_u64(3));
    assert_eq!(registry.depth(MARKET, 20).unwrap().asks, vec![level(120, "10")]);
}

#[test]
fn test_trade_sequences_are_per_market() {
    let registry = registry();
    limit(&registry, Side::Sell, "10", "1");
    limit(&registry, Side::Sell, "10", "1");
    let btc = limit(&registry, Side::Buy, "10", "2");
    assert_eq!(
        btc.result.trades.iter().map(|t| t.sequence).collect::<Vec<_>>(),
        vec![1, 2]
    );

    registry
        .place_order("ETH-USDC", OrderRequest::limit(Side::Sell, dec("5"), dec("1")))
        .unwrap();
    let eth = registry
        .place_order("ETH-USDC", OrderRequest::market(Side::Buy, dec("1")))
        .unwrap();
    assert_eq!(eth.result.trades[0].sequence, 1);
}

#[test]
fn test_depth_respects_level_limit_and_order() {
    let registry = registry();
    for price in ["101", "105", "103", "102"] {
        limit(&registry, Side::Sell, price, "1");
    }
    for price in ["95", "99", "97"] {
        limit(&registry, Side::Buy, price, "2");
    }

    let depth = registry.depth(MARKET, 2).unwrap();
    assert_eq!(depth.asks, vec![level(101, "1"), level(102, "1")]);
    assert_eq!(depth.bids, vec![level(99, "2"), level(97, "2")]);
    assert_eq!(depth.spread(), Some(dec("2")));
    assert_eq!(registry.depth(MARKET, 2).unwrap(), depth);
}

#[test]
fn test_invalid_orders_are_rejected() {
    let registry = registry();
    let cases = [
        OrderRequest::limit(Side::Buy, dec("100"), dec("0")),
        OrderRequest::limit(Side::Buy, dec("0"), dec("1")),
        OrderRequest::market(Side::Sell, dec("-2")),
        OrderRequest {
            price: None,
            ..OrderRequest::limit(Side::Buy, dec("1"), dec("1"))
        },
    ];
    for request in cases {
        let err = registry.place_order(MARKET, request).unwrap_err();
        assert!(matches!(err, EngineError::InvalidOrder(_)), "{err:?}");
    }
    assert!(registry.depth(MARKET, 20).unwrap().is_empty());
}

#[test]
fn test_volatile_registry_reports_volatile_durability() {
    let registry = registry();
    let outcome = limit(&registry, Side::Buy, "1", "1");
    assert_eq!(outcome.durability, Durability::Volatile);
    assert_eq!(registry.clear_market(MARKET).unwrap().durability, Durability::Volatile);
}

#[test]
fn test_extreme_sizes_and_prices_keep_market_usable() {
    let registry = registry();
    let big = "50000000000000000000000000000";

    limit(&registry, Side::Buy, "100", big);
    let err = registry
        .place_order(MARKET, OrderRequest::limit(Side::Buy, dec("100"), dec(big)))
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidOrder(_)), "{err:?}");
    assert_eq!(registry.depth(MARKET, 20).unwrap().bids, vec![level(100, big)]);

    let eth = "ETH-USDC";
    for price in ["0.0000000000000000000000000001", "70000000000000000000000000000"] {
        registry
            .place_order(eth, OrderRequest::limit(Side::Sell, dec(price), dec("1")))
            .unwrap();
    }
    let sweep = registry
        .place_order(eth, OrderRequest::market(Side::Buy, dec("2")))
        .unwrap();
    assert_eq!(sweep.result.trades.len(), 1);
    assert_eq!(sweep.result.remaining_size.as_decimal(), dec("1"));
    assert_eq!(registry.depth(eth, 20).unwrap().asks.len(), 1);
    assert!(registry.is_available(MARKET) && registry.is_available(eth));
}
