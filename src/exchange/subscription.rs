// =============================================================================
// Subscription Protocol (spec.md §4.C)
// =============================================================================
//
// Dial + handshake + read the two expected frames + validate. Retries the
// dial up to 3 times with a 5 s sleep between attempts; deadlines on the
// write/read steps are realised with tokio::time::timeout (the idiomatic
// replacement for the source's socket-level SetReadDeadline/SetWriteDeadline).
// Grounded on the teacher's market_data/trade_stream.rs connect_async usage.
// =============================================================================

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{info, warn};

use crate::exchange::client::FuturesExchangeClient;
use crate::model::Market;
use crate::registry::connection::{ConnectionRegistry, WsSource};

const DIAL_ATTEMPTS: u32 = 3;
const DIAL_BACKOFF: Duration = Duration::from_secs(5);
const WRITE_DEADLINE: Duration = Duration::from_secs(10);
const READ_DEADLINE: Duration = Duration::from_secs(60);

/// Subscribe failed permanently: the dial budget was exhausted, or the
/// handshake itself failed or was rejected.
#[derive(Debug, Clone)]
pub struct PermanentSubscribeError(pub String);

impl std::fmt::Display for PermanentSubscribeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for PermanentSubscribeError {}

#[derive(Serialize)]
struct SubscribeFrame<'a> {
    event: &'static str,
    feed: &'static str,
    product_ids: [&'a str; 1],
}

#[derive(Deserialize)]
struct HandshakeFrame {
    event: Option<String>,
    message: Option<String>,
}

/// Ensure a connection, dial the exchange's websocket, complete the
/// subscribe handshake, and install the write half into the
/// `ConnectionRegistry`. Returns the read half for the Reader task to
/// consume candle frames from.
pub async fn subscribe(
    market: &Market,
    conn_registry: &ConnectionRegistry,
    exchange: &dyn FuturesExchangeClient,
) -> Result<WsSource, PermanentSubscribeError> {
    let record = conn_registry.set_market(market);

    // Step 2: dial with bounded retry.
    let mut last_err = None;
    let mut stream = None;
    for attempt in 1..=DIAL_ATTEMPTS {
        match connect_async(exchange.ws_url()).await {
            Ok((ws, _response)) => {
                stream = Some(ws);
                break;
            }
            Err(e) => {
                warn!(market = %market, attempt, error = %e, "websocket dial failed");
                last_err = Some(e.to_string());
                if attempt < DIAL_ATTEMPTS {
                    tokio::time::sleep(DIAL_BACKOFF).await;
                }
            }
        }
    }

    let stream = stream.ok_or_else(|| {
        PermanentSubscribeError(last_err.unwrap_or_else(|| "dial exhausted".to_string()))
    })?;

    let (mut sink, mut source) = stream.split();

    // Step 3: write the subscribe frame under a 10 s deadline.
    let frame = SubscribeFrame {
        event: "subscribe",
        feed: "candles_trade_1m",
        product_ids: [market.as_str()],
    };
    let text = serde_json::to_string(&frame)
        .map_err(|e| PermanentSubscribeError(format!("failed to encode subscribe frame: {e}")))?;

    let write_result = tokio::time::timeout(WRITE_DEADLINE, sink.send(Message::Text(text))).await;
    match write_result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(PermanentSubscribeError(format!("subscribe write failed: {e}"))),
        Err(_) => return Err(PermanentSubscribeError("subscribe write timed out".to_string())),
    }

    // Step 4: read exactly two frames under a 60 s deadline.
    let mut last_frame: Option<HandshakeFrame> = None;
    for _ in 0..2 {
        let read_result = tokio::time::timeout(READ_DEADLINE, source.next()).await;
        let msg = match read_result {
            Ok(Some(Ok(Message::Text(text)))) => text,
            Ok(Some(Ok(_))) => continue,
            Ok(Some(Err(e))) => {
                return Err(PermanentSubscribeError(format!("handshake read failed: {e}")))
            }
            Ok(None) => {
                return Err(PermanentSubscribeError(
                    "socket closed during handshake".to_string(),
                ))
            }
            Err(_) => return Err(PermanentSubscribeError("handshake read timed out".to_string())),
        };

        let frame: HandshakeFrame = serde_json::from_str(&msg).map_err(|e| {
            PermanentSubscribeError(format!("failed to parse handshake frame: {e}"))
        })?;
        last_frame = Some(frame);
    }

    // Step 5: validate the final frame.
    let final_frame = last_frame
        .ok_or_else(|| PermanentSubscribeError("handshake produced no frames".to_string()))?;

    if final_frame.event.as_deref() != Some("subscribed") {
        let reason = final_frame
            .message
            .unwrap_or_else(|| "subscribe rejected".to_string());
        return Err(PermanentSubscribeError(reason));
    }

    record.set_sink(sink).await;
    info!(market = %market, "subscribed to candle feed");
    Ok(source)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permanent_error_display_carries_reason() {
        let err = PermanentSubscribeError("bad request: unknown product".to_string());
        assert_eq!(err.to_string(), "bad request: unknown product");
    }

    #[test]
    fn subscribe_frame_serializes_to_expected_shape() {
        let frame = SubscribeFrame {
            event: "subscribe",
            feed: "candles_trade_1m",
            product_ids: ["pi_ethusd"],
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert_eq!(
            json,
            r#"{"event":"subscribe","feed":"candles_trade_1m","product_ids":["pi_ethusd"]}"#
        );
    }
}
