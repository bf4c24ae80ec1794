//! End-to-end scenarios through the public API: detection on a sideways
//! market, confirmation of the bar that leaves it, cooldowns and the router.

use std::f64::consts::PI;

use breakout_sentinel::analysis::{BreakoutConfirmer, ConfirmMode, build_strategy};
use breakout_sentinel::config::{Pct, SentinelSettings};
use breakout_sentinel::engine::{AlertBus, AlertDeduplicator, IngestionRouter};
use breakout_sentinel::{BreakoutEvent, Candle, CandleWindow, Direction, PairInterval, StructuralRange};

const MIN: i64 = 60_000;

/// Mid oscillates around 100 so that every bar sits inside [99.5, 100.5].
fn sideways(n: usize) -> Vec<Candle> {
    let mid = |i: usize| 100.0 + 0.4 * (2.0 * PI * i as f64 / 8.0).sin();
    (0..n)
        .map(|i| {
            let open = if i == 0 { mid(0) } else { mid(i - 1) };
            let close = mid(i);
            Candle::new(
                i as i64 * MIN,
                MIN,
                open,
                open.max(close) + 0.1,
                open.min(close) - 0.1,
                close,
                10.0,
                true,
            )
        })
        .collect()
}

fn best_range(history: &[Candle]) -> StructuralRange {
    let detector = build_strategy(&SentinelSettings::default().detection);
    let ranges = detector.detect(history);
    assert!(!ranges.is_empty(), "sideways market must yield a range");
    ranges[0].clone()
}

fn confirm(range: &StructuralRange, candle: &Candle, history: &[Candle]) -> Option<BreakoutEvent> {
    let settings = SentinelSettings::default();
    BreakoutConfirmer::new(settings.breakout, MIN).confirm(
        "BTCUSDT",
        range,
        candle,
        history,
        ConfirmMode::Live,
    )
}

fn breakout_candle(volume: f64) -> Candle {
    Candle::new(100 * MIN, MIN, 100.3, 102.1, 100.2, 102.0, volume, true)
}

#[test]
fn sideways_market_is_detected_as_a_range() {
    let range = best_range(&sideways(100));
    assert!(range.upper_bound > range.lower_bound);
    assert!((range.upper_bound - 100.5).abs() < 0.1);
    assert!((range.lower_bound - 99.5).abs() < 0.1);
    assert!(range.score.total >= 50.0);
    assert!(range.score.total <= 100.0);
}

#[test]
fn heavy_close_above_range_is_an_up_breakout() {
    let history = sideways(100);
    let range = best_range(&history);

    let event = confirm(&range, &breakout_candle(20.0), &history).expect("breakout");
    assert_eq!(event.direction, Direction::Up);
    assert!(event.confirmed.amplitude);
    assert!(event.confirmed.volume);
    assert!(event.magnitude_pct.value() > 0.0);
    assert!((event.volume_ratio.value() - 2.0).abs() < 1e-9);
}

#[test]
fn light_volume_close_is_not_confirmed() {
    let history = sideways(100);
    let range = best_range(&history);
    assert!(confirm(&range, &breakout_candle(11.0), &history).is_none());
}

#[test]
fn shallow_close_fails_amplitude() {
    let history = sideways(100);
    let range = best_range(&history);
    let nudge = Candle::new(100 * MIN, MIN, 100.3, 100.7, 100.2, 100.6, 30.0, true);
    assert!(confirm(&range, &nudge, &history).is_none());
}

#[test]
fn bullish_candle_never_breaks_down() {
    let history = sideways(100);
    let range = best_range(&history);
    // Closes below the range but with an up body.
    let candle = Candle::new(100 * MIN, MIN, 97.0, 98.6, 96.9, 98.5, 30.0, true);
    assert!(candle.is_bullish());
    assert!(confirm(&range, &candle, &history).is_none());
}

#[test]
fn repeat_alert_inside_cooldown_is_suppressed_unless_more_extreme() {
    let history = sideways(100);
    let range = best_range(&history);
    let first = confirm(&range, &breakout_candle(20.0), &history).expect("breakout");

    let mut dedup = AlertDeduplicator::new(SentinelSettings::default().alerts);
    assert!(dedup.should_emit(&first));
    dedup.record(&first);

    let mut repeat = first.clone();
    repeat.detected_at += 5 * MIN;
    assert!(!dedup.should_emit(&repeat));

    let mut stronger = repeat.clone();
    stronger.magnitude_pct = Pct::new(first.magnitude_pct.value() * 2.0);
    assert!(dedup.should_emit(&stronger));

    let mut later = repeat;
    later.detected_at = first.detected_at + 31 * MIN;
    assert!(dedup.should_emit(&later));
}

#[test]
fn window_holds_capacity_plus_forming_bar() {
    let capacity = SentinelSettings::default().detection.window.capacity;
    let mut window = CandleWindow::from_history(capacity, sideways(capacity + 20));
    assert_eq!(window.len(), capacity);
    assert_eq!(window.iter().next().map(|c| c.open_time), Some(20 * MIN));

    let next = (capacity + 20) as i64 * MIN;
    window.upsert(Candle::new(next, MIN, 100.0, 100.1, 99.9, 100.0, 1.0, false));
    assert_eq!(window.len(), capacity + 1);

    window.upsert(Candle::new(next, MIN, 100.0, 100.1, 99.9, 100.05, 2.0, true));
    assert_eq!(window.len(), capacity);
    assert_eq!(window.iter().next().map(|c| c.open_time), Some(21 * MIN));
}

fn kline_json(open_time: i64, close: &str, volume: &str, is_final: bool) -> String {
    format!(
        r#"{{"stream":"btcusdt@kline_1m","data":{{"e":"kline","E":{e},"s":"BTCUSDT","k":{{"t":{t},"T":{ct},"s":"BTCUSDT","i":"1m","o":"100.3","c":"{c}","h":"102.1","l":"100.2","v":"{v}","x":{x}}}}}}}"#,
        e = open_time + 1,
        t = open_time,
        ct = open_time + MIN - 1,
        c = close,
        v = volume,
        x = is_final
    )
}

#[test]
fn router_publishes_one_alert_for_a_feed_breakout() {
    let settings = SentinelSettings::default();
    let bus = AlertBus::new(8);
    let mut alerts = bus.subscribe();

    let mut router = IngestionRouter::new(&settings, MIN, bus, None);
    router.insert_window(
        PairInterval::new("BTCUSDT", MIN),
        CandleWindow::from_history(settings.detection.window.capacity, sideways(100)),
    );

    // Forming updates never alert.
    assert!(router.handle_text(&kline_json(100 * MIN, "101.0", "5", false)).is_empty());
    assert!(router.handle_text(&kline_json(100 * MIN, "102.0", "15", false)).is_empty());

    let emitted = router.handle_text(&kline_json(100 * MIN, "102.0", "20", true));
    assert_eq!(emitted.len(), 1);

    let envelope = alerts.try_recv().expect("published");
    assert_eq!(envelope.symbol, "BTCUSDT");
    assert_eq!(envelope.event.direction, Direction::Up);

    let stats = router.stats();
    assert_eq!(stats.ticks, 3);
    assert_eq!(stats.finalized_bars, 1);
    assert_eq!(stats.alerts_emitted, 1);
    assert_eq!(stats.malformed, 0);
}
