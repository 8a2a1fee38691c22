//! End-to-end pipeline: ticks in, mean-reversion signal, order, risk pass,
//! slipped fill, position and cash updated.

use std::time::Duration;

use chrono::Utc;
use tkd_config::AppConfig;
use tkd_runtime::TradingRuntime;
use tkd_schemas::{EventKind, EventPayload, Micros, OrderStatus, Side, Tick};

fn pipeline_cfg() -> AppConfig {
    let mut cfg = AppConfig::defaults();
    cfg.use_synthetic_feed = false;
    cfg.feed_symbols = vec!["ACME".to_string()];
    cfg.risk_wait_ms = 20;
    cfg
}

fn tick(symbol: &str, last_units: i64) -> EventPayload {
    EventPayload::Tick(Tick {
        symbol: symbol.to_string(),
        last: Micros::from_units(last_units),
        bid: Micros::ZERO,
        ask: Micros::ZERO,
        volume: 1,
        ts: Utc::now(),
    })
}

#[tokio::test]
async fn dip_after_flat_window_buys_100_shares_with_slippage() {
    let mut runtime = TradingRuntime::build(&pipeline_cfg(), None);
    runtime.start();
    let bus = runtime.bus();

    // 19 flat ticks, then a 10% dip: z ≈ -4.25 at window fill.
    for _ in 0..19 {
        bus.publish_payload(tick("ACME", 100)).await;
    }
    bus.publish_payload(tick("ACME", 90)).await;

    // One full-strength buy signal and one order for 100 shares are already
    // on the bus; the fill lands after the 20 ms decision window.
    let signals = bus.history_of(EventKind::Signal);
    assert_eq!(signals.len(), 1);
    match &signals[0].payload {
        EventPayload::Signal(s) => {
            assert_eq!(s.side, Side::Buy);
            assert_eq!(s.strength, 1.0);
        }
        other => panic!("unexpected payload {other:?}"),
    }

    let requests = bus.history_of(EventKind::OrderRequest);
    assert_eq!(requests.len(), 1);
    let order_id = match &requests[0].payload {
        EventPayload::OrderRequest(o) => {
            assert_eq!(o.qty, 100);
            o.id
        }
        other => panic!("unexpected payload {other:?}"),
    };

    tokio::time::sleep(Duration::from_millis(200)).await;

    // No risk noise for a passing order.
    assert!(bus.history_of(EventKind::RiskBreach).is_empty());

    let fills = bus.history_of(EventKind::Fill);
    assert_eq!(fills.len(), 1);
    match &fills[0].payload {
        EventPayload::Fill(f) => {
            assert_eq!(f.order_id, order_id);
            assert_eq!(f.qty, 100);
            // 90 · 1.0005 = 90.045
            assert_eq!(f.price, Micros::new(90_045_000));
        }
        other => panic!("unexpected payload {other:?}"),
    }

    assert_eq!(
        runtime.orders().get_order(order_id).unwrap().status,
        OrderStatus::Filled
    );

    let view = runtime.view();
    let position = view.position("ACME").expect("position exists");
    assert_eq!(position.qty, 100);
    assert_eq!(position.avg_entry_price, Micros::new(90_045_000));
    // cash = 100000 - 100 · 90.045 = 90995.50
    assert_eq!(view.cash(), Micros::new(90_995_500_000));

    assert_eq!(bus.history_of(EventKind::PositionUpdate).len(), 1);

    runtime.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn rejected_order_never_fills_and_leaves_state_untouched() {
    let mut cfg = pipeline_cfg();
    cfg.feed_symbols = vec!["FOO".to_string()];
    cfg.max_order_value = Micros::from_units(5_000);
    let mut runtime = TradingRuntime::build(&cfg, None);
    runtime.start();
    let bus = runtime.bus();

    bus.publish_payload(tick("FOO", 100)).await;

    // Inject a full-strength signal directly: 100 shares at ~100 is a 10000
    // notional against the 5000 limit.
    bus.publish_payload(EventPayload::Signal(tkd_schemas::Signal {
        strategy_id: "mean-reversion".to_string(),
        symbol: "FOO".to_string(),
        side: Side::Buy,
        strength: 1.0,
        ts: Utc::now(),
    }))
    .await;

    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(bus.history_of(EventKind::RiskBreach).len(), 1);
    assert!(bus.history_of(EventKind::Fill).is_empty());
    assert!(bus.history_of(EventKind::PositionUpdate).is_empty());

    let order_id = match &bus.history_of(EventKind::OrderRequest)[0].payload {
        EventPayload::OrderRequest(o) => o.id,
        other => panic!("unexpected payload {other:?}"),
    };
    assert_eq!(
        runtime.orders().get_order(order_id).unwrap().status,
        OrderStatus::Rejected
    );

    let view = runtime.view();
    assert_eq!(view.cash(), Micros::from_units(100_000));
    assert!(view.position("FOO").map_or(true, |p| p.is_flat()));

    runtime.shutdown(Duration::from_secs(1)).await;
}
