// =============================================================================
// Connection Registry (spec.md §4.B) — market -> ConnectionRecord
// =============================================================================
//
// Unlike the Trade Registry, a ConnectionRecord has no separate per-record
// lock: only the lifecycle controller ever mutates the socket handle, and it
// does so serialized by a market's `running` flag. The socket itself lives
// behind a small async mutex purely so Subscribe (writer) and Stop (closer)
// can't step on each other mid-swap.
// =============================================================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use parking_lot::RwLock;
use tokio::net::TcpStream;
use tokio_tungstenite::{tungstenite::Message, MaybeTlsStream, WebSocketStream};

use crate::model::Market;
use crate::worker_group::WorkerGroup;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
pub type WsSink = SplitSink<WsStream, Message>;
pub type WsSource = SplitStream<WsStream>;

/// Per-market websocket connection state: the current write-half handle (if
/// connected) and the worker group tracking the Reader + Keep-Alive tasks.
#[derive(Default)]
pub struct ConnectionRecord {
    sink: tokio::sync::Mutex<Option<WsSink>>,
    /// Set by a deliberate `close()` (StopMarket). The Reader checks this
    /// before treating a closed-socket error as an abnormal closure to
    /// reconnect from — otherwise StopMarket's close would just trigger an
    /// immediate resubscribe instead of tearing the pipeline down.
    stopping: AtomicBool,
    pub workers: WorkerGroup,
}

impl ConnectionRecord {
    /// Install a freshly-dialed socket's write half, replacing any previous
    /// one (a Subscribe call rotates the handle per spec.md invariants).
    pub async fn set_sink(&self, sink: WsSink) {
        self.stopping.store(false, Ordering::SeqCst);
        *self.sink.lock().await = Some(sink);
    }

    /// Close and clear the socket handle, if any. Breaking the underlying
    /// connection is what causes the Reader's blocking read to fail, which
    /// cascades the rest of the pipeline's teardown (spec.md §4.D, §9).
    pub async fn close(&self) {
        use futures_util::SinkExt;
        self.stopping.store(true, Ordering::SeqCst);
        let mut guard = self.sink.lock().await;
        if let Some(mut sink) = guard.take() {
            let _ = sink.close().await;
        }
    }

    /// Whether the current (or most recent) close was requested by
    /// StopMarket rather than observed from the server.
    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    /// Access the sink for sending a frame (subscribe request, ping). Returns
    /// `None` if there is currently no connected socket.
    pub async fn with_sink<F, R>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&mut WsSink) -> R,
    {
        let mut guard = self.sink.lock().await;
        guard.as_mut().map(f)
    }

    /// Send a ping frame under `deadline`, if a socket is currently installed.
    /// `None` means there is nothing to ping right now.
    pub async fn ping(
        &self,
        deadline: Duration,
    ) -> Option<Result<(), tokio_tungstenite::tungstenite::Error>> {
        use futures_util::SinkExt;
        let mut guard = self.sink.lock().await;
        let sink = guard.as_mut()?;
        Some(
            match tokio::time::timeout(deadline, sink.send(Message::Ping(Vec::new()))).await {
                Ok(result) => result,
                Err(_) => Err(tokio_tungstenite::tungstenite::Error::Io(
                    std::io::Error::new(std::io::ErrorKind::TimedOut, "ping write timed out"),
                )),
            },
        )
    }
}

/// Map from market to its `ConnectionRecord`. Same insert-only, never-removed
/// lifetime as the Trade Registry.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<Market, Arc<ConnectionRecord>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent: ensure a `ConnectionRecord` exists for `market`.
    pub fn set_market(&self, market: &Market) -> Arc<ConnectionRecord> {
        if let Some(rec) = self.connections.read().get(market) {
            return rec.clone();
        }
        self.connections
            .write()
            .entry(market.clone())
            .or_insert_with(|| Arc::new(ConnectionRecord::default()))
            .clone()
    }

    pub fn get(&self, market: &Market) -> Option<Arc<ConnectionRecord>> {
        self.connections.read().get(market).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_market_is_idempotent_and_shares_the_same_record() {
        let registry = ConnectionRegistry::new();
        let a = registry.set_market(&"pi_ethusd".to_string());
        let b = registry.set_market(&"pi_ethusd".to_string());
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn close_on_unconnected_record_is_a_no_op() {
        let record = ConnectionRecord::default();
        record.close().await;
    }
}
