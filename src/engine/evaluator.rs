// =============================================================================
// Trigger Evaluator (spec.md §4.E)
// =============================================================================
//
// Dedups on candle timestamp, computes the OHLC average, and checks both
// sides of the market's trigger rules under a single writer-lock critical
// section so a sell fire and a buy fire on the same candle are atomic with
// respect to the lifecycle controller. Grounded on the teacher's `risk.rs`
// lock-scoped check-and-mutate pattern.
// =============================================================================

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::exchange::candle_stream::CandleData;
use crate::model::{Market, Order, Side};
use crate::registry::trade::TradeRecord;

/// Run the evaluator loop until the candle channel closes. Emits zero, one,
/// or two orders per candle onto `order_tx`, then closes it and returns.
pub async fn run(
    market: Market,
    record: Arc<TradeRecord>,
    mut candle_rx: mpsc::Receiver<CandleData>,
    order_tx: mpsc::Sender<Order>,
) {
    let mut ts: f64 = 0.0;

    while let Some(candle) = candle_rx.recv().await {
        if candle.time == ts {
            continue; // dedup: exchange may redeliver the same candle.
        }
        ts = candle.time;

        let (close, open, high, low) = match parse_ohlc(&candle) {
            Ok(values) => values,
            Err(e) => {
                warn!(market = %market, error = %e, "failed to parse candle, skipping");
                continue;
            }
        };

        let avg = (close + open + high + low) / 4.0;
        let now = chrono::Utc::now().timestamp_millis();

        let mut orders = Vec::with_capacity(2);
        {
            let mut inner = record.write();
            if inner.sell.armed && avg >= inner.sell.price {
                orders.push(Order {
                    market: market.clone(),
                    side: Side::Sell,
                    price: avg,
                    size: inner.sell.size,
                    time: Some(now),
                });
                inner.sell.disarm();
            }
            if inner.buy.armed && avg <= inner.buy.price {
                orders.push(Order {
                    market: market.clone(),
                    side: Side::Buy,
                    price: avg,
                    size: inner.buy.size,
                    time: Some(now),
                });
                inner.buy.disarm();
            }
        }

        for order in orders {
            info!(market = %market, side = %order.side, price = order.price, "trigger fired");
            if order_tx.send(order).await.is_err() {
                // Dispatcher has gone away; nothing left to feed.
                return;
            }
        }
    }

    // candle_rx closed: drop order_tx to close the order channel, the single
    // authority rule for this channel (spec.md invariant 7).
}

fn parse_ohlc(candle: &CandleData) -> Result<(f64, f64, f64, f64), std::num::ParseFloatError> {
    Ok((
        candle.close.parse()?,
        candle.open.parse()?,
        candle.high.parse()?,
        candle.low.parse()?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::trade::TradeRecord;

    fn candle(time: f64, close: &str, open: &str, high: &str, low: &str) -> CandleData {
        CandleData {
            close: close.to_string(),
            open: open.to_string(),
            high: high.to_string(),
            low: low.to_string(),
            time,
        }
    }

    #[tokio::test]
    async fn scenario_s4_trigger_correctness() {
        let record = Arc::new(TradeRecord::default());
        {
            let mut inner = record.write();
            inner.sell.arm(42.0, 1);
            inner.buy.arm(21.0, 2);
        }

        let (candle_tx, candle_rx) = mpsc::channel(4);
        let (order_tx, mut order_rx) = mpsc::channel(4);

        let market = "pi_ethusd".to_string();
        let handle = tokio::spawn(run(market.clone(), record.clone(), candle_rx, order_tx));

        candle_tx
            .send(candle(42.2, "42.2", "42.2", "42.2", "42.2"))
            .await
            .unwrap();
        candle_tx
            .send(candle(21.1, "21.4", "21.4", "21.4", "21.4"))
            .await
            .unwrap();
        candle_tx
            .send(candle(21.1, "24.1", "24.1", "24.1", "24.1"))
            .await
            .unwrap();
        drop(candle_tx);

        let first = order_rx.recv().await.unwrap();
        assert_eq!(first.side, Side::Sell);
        assert_eq!(first.price, 42.2);
        assert_eq!(first.size, 1);

        let second = order_rx.recv().await.unwrap();
        assert_eq!(second.side, Side::Buy);
        assert_eq!(second.price, 21.4);
        assert_eq!(second.size, 2);

        assert!(order_rx.recv().await.is_none());
        handle.await.unwrap();

        let inner = record.read();
        assert!(!inner.sell.armed);
        assert!(!inner.buy.armed);
    }

    #[tokio::test]
    async fn dedup_skips_repeated_timestamp() {
        let record = Arc::new(TradeRecord::default());
        record.write().sell.arm(0.0, 1); // always fires if evaluated

        let (candle_tx, candle_rx) = mpsc::channel(4);
        let (order_tx, mut order_rx) = mpsc::channel(4);

        let handle = tokio::spawn(run("m".to_string(), record.clone(), candle_rx, order_tx));

        candle_tx.send(candle(1.0, "1", "1", "1", "1")).await.unwrap();
        candle_tx.send(candle(1.0, "2", "2", "2", "2")).await.unwrap();
        drop(candle_tx);

        let first = order_rx.recv().await.unwrap();
        assert_eq!(first.price, 1.0);
        assert!(order_rx.recv().await.is_none());
        handle.await.unwrap();
    }
}
