// =============================================================================
// Candle Reader / Keep-Alive (spec.md §4.D)
// =============================================================================
//
// Two cooperating tasks per running market, both registered in the
// ConnectionRecord's worker group. The Reader is the sole authority that
// decides "this subscription is over": it alone closes the candle channel
// and it alone owns tearing down stop_signal. Keep-Alive only pings; it has
// no say over the socket's lifetime, matching the rationale in spec.md §4.D.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tracing::{error, info, warn};

use crate::exchange::client::FuturesExchangeClient;
use crate::exchange::subscription::subscribe;
use crate::model::Market;
use crate::notifier::{notify, Notifier};
use crate::registry::connection::{ConnectionRegistry, WsSource};

/// Period between keep-alive pings: 0.9 * pong wait (spec.md §4.D).
const PING_PERIOD: Duration = Duration::from_secs(54);
const PING_WRITE_DEADLINE: Duration = Duration::from_secs(10);
/// Pong wait: the window within which a frame must arrive or the read fails.
const PONG_WAIT: Duration = Duration::from_secs(60);

#[derive(Deserialize)]
struct CandleFrame {
    candle: CandleData,
}

/// A single candle frame from the exchange's candle feed.
#[derive(Debug, Clone, Deserialize)]
pub struct CandleData {
    pub close: String,
    pub open: String,
    pub high: String,
    pub low: String,
    pub time: f64,
}

/// Spawn the Reader and Keep-Alive tasks for `market`, registering both in
/// the connection's worker group. Returns the receiving half of the candle
/// channel for the Trigger Evaluator to consume.
pub async fn spawn_pipeline(
    market: Market,
    source: WsSource,
    exchange: Arc<dyn FuturesExchangeClient>,
    conn_registry: Arc<ConnectionRegistry>,
    notifier: Arc<dyn Notifier>,
) -> mpsc::Receiver<CandleData> {
    let record = conn_registry.set_market(&market);
    let (candle_tx, candle_rx) = mpsc::channel(1);
    let (stop_tx, stop_rx) = oneshot::channel();

    {
        let market = market.clone();
        let conn_registry = conn_registry.clone();
        let notifier = notifier.clone();
        record
            .workers
            .spawn(async move {
                run_reader(market, source, exchange, conn_registry, candle_tx, stop_tx, notifier).await;
            })
            .await;
    }

    {
        let market = market.clone();
        let record = record.clone();
        record
            .workers
            .spawn(async move {
                run_keep_alive(market, record, stop_rx).await;
            })
            .await;
    }

    candle_rx
}

async fn run_reader(
    market: Market,
    mut source: WsSource,
    exchange: Arc<dyn FuturesExchangeClient>,
    conn_registry: Arc<ConnectionRegistry>,
    candle_tx: mpsc::Sender<CandleData>,
    stop_tx: oneshot::Sender<()>,
    notifier: Arc<dyn Notifier>,
) {
    notify(&notifier, &market, "start subscription".to_string());
    info!(market = %market, "candle reader started");

    loop {
        match tokio::time::timeout(PONG_WAIT, source.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => match serde_json::from_str::<CandleFrame>(&text) {
                Ok(frame) => {
                    if candle_tx.send(frame.candle).await.is_err() {
                        // Evaluator has gone away; nothing left to feed.
                        break;
                    }
                }
                Err(e) => {
                    warn!(market = %market, error = %e, "failed to parse candle frame");
                }
            },
            Ok(Some(Ok(Message::Pong(_)))) | Ok(Some(Ok(Message::Ping(_)))) => {
                // Any frame, including pong/ping, re-arms liveness; handled by
                // the outer timeout simply looping again.
            }
            Ok(Some(Ok(Message::Close(_)))) => {
                // A close frame is, by definition, not abnormal closure
                // (code 1006 covers the no-close-frame case). spec.md §4.D:
                // exit the loop on anything but abnormal closure.
                info!(market = %market, "close frame received, exiting reader");
                break;
            }
            Ok(Some(Ok(_))) => {}
            Ok(Some(Err(e))) => {
                if !is_stopping(&conn_registry, &market) && is_abnormal_closure(&e) {
                    warn!(market = %market, error = %e, "abnormal closure, reconnecting");
                    match subscribe(&market, &conn_registry, exchange.as_ref()).await {
                        Ok(new_source) => {
                            source = new_source;
                            continue;
                        }
                        Err(e) => {
                            error!(market = %market, error = %e, "reconnect failed, exiting reader");
                            break;
                        }
                    }
                }
                error!(market = %market, error = %e, "candle reader error, exiting");
                break;
            }
            Ok(None) => {
                // Stream ended without a close frame, and with no transport
                // error to classify as abnormal closure — exit.
                info!(market = %market, "candle stream ended, exiting reader");
                break;
            }
            Err(_) => {
                // Read-deadline expiry is the authoritative liveness check
                // (spec.md §4.D): a dead subscription, not abnormal closure.
                // Tear the pipeline down rather than reconnect.
                warn!(market = %market, "read deadline expired, exiting reader");
                break;
            }
        }
    }

    // Single authority for teardown: wake Keep-Alive, then close the candle
    // channel by dropping candle_tx (happens implicitly when this task ends).
    let _ = stop_tx.send(());
    notify(&notifier, &market, "stop subscription".to_string());
    info!(market = %market, "candle reader stopped");
}

fn is_stopping(conn_registry: &ConnectionRegistry, market: &Market) -> bool {
    conn_registry
        .get(market)
        .map(|record| record.is_stopping())
        .unwrap_or(false)
}

fn is_abnormal_closure(err: &tokio_tungstenite::tungstenite::Error) -> bool {
    use tokio_tungstenite::tungstenite::Error;
    matches!(
        err,
        Error::ConnectionClosed | Error::AlreadyClosed | Error::Io(_) | Error::Protocol(_)
    )
}

async fn run_keep_alive(
    market: Market,
    record: Arc<crate::registry::connection::ConnectionRecord>,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(PING_PERIOD);
    ticker.tick().await; // first tick fires immediately; discard it.

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = send_ping(&record).await {
                    warn!(market = %market, error = %e, "keep-alive ping failed");
                }
            }
            _ = &mut stop_rx => {
                break;
            }
        }
    }

    info!(market = %market, "keep-alive stopped");
}

async fn send_ping(record: &crate::registry::connection::ConnectionRecord) -> anyhow::Result<()> {
    match record.ping(PING_WRITE_DEADLINE).await {
        Some(Ok(())) => Ok(()),
        Some(Err(e)) => Err(anyhow::anyhow!("ping write failed: {e}")),
        None => Ok(()), // no socket currently installed; nothing to ping.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_candle_frame() {
        let json = r#"{"candle":{"close":"42.2","open":"42.2","high":"42.2","low":"42.2","time":42.2}}"#;
        let frame: CandleFrame = serde_json::from_str(json).unwrap();
        assert_eq!(frame.candle.close, "42.2");
        assert_eq!(frame.candle.time, 42.2);
    }
}
