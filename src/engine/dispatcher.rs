// =============================================================================
// Order Dispatcher (spec.md §4.F)
// =============================================================================
//
// Classifies the exchange's send-order response and decides persist/notify
// accordingly. Grounded on the teacher's `execution.rs` classify-then-act
// shape.
// =============================================================================

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::exchange::client::FuturesExchangeClient;
use crate::model::{Market, Order, PersistedOrder};
use crate::notifier::{notify, Notifier};
use crate::store::OrderStore;

/// Run the dispatcher loop until the order channel closes.
pub async fn run(
    market: Market,
    mut order_rx: mpsc::Receiver<Order>,
    exchange: Arc<dyn FuturesExchangeClient>,
    store: Arc<dyn OrderStore>,
    notifier: Arc<dyn Notifier>,
) {
    while let Some(order) = order_rx.recv().await {
        let response = exchange
            .send_order(&order.market, order.side, order.size, order.price)
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                warn!(market = %market, error = %e, "send_order transport error");
                notify(&notifier, &market, "server error".to_string());
                continue;
            }
        };

        if response.result != "success" {
            warn!(market = %market, result = %response.result, "send_order reported failure");
            notify(&notifier, &market, "server error".to_string());
            continue;
        }

        let status = response.send_status.as_ref().map(|s| s.status.as_str());
        match status {
            Some("insufficientAvailableFunds") => {
                warn!(market = %market, "insufficient funds");
                notify(&notifier, &market, "insufficient funds".to_string());
            }
            Some("placed") => {
                let persisted = PersistedOrder {
                    ts: order.time.unwrap_or(0),
                    market: order.market.clone(),
                    kind: order.side,
                    price: order.price,
                    size: order.size,
                };
                if let Err(e) = store.insert(&persisted).await {
                    warn!(market = %market, error = %e, "failed to persist order");
                }
                info!(market = %market, side = %order.side, price = order.price, "order placed");
                notify(
                    &notifier,
                    &market,
                    format!("\u{1F4CC} Make {} order on {}. Price: {:.2}", order.side, market, order.price),
                );
            }
            _ => {
                warn!(market = %market, status = ?status, "order not placed");
                notify(&notifier, &market, "fail to execute".to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{OrderResponse, SendStatus, Side};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct StubExchange {
        response: OrderResponse,
    }

    #[async_trait]
    impl FuturesExchangeClient for StubExchange {
        async fn send_order(
            &self,
            _market: &Market,
            _side: Side,
            _size: u64,
            _limit_price: f64,
        ) -> anyhow::Result<crate::model::OrderResponse> {
            Ok(self.response.clone())
        }

        async fn get_accounts(&self) -> anyhow::Result<crate::model::AccountsResp> {
            unimplemented!()
        }

        fn ws_url(&self) -> &str {
            "wss://unused"
        }
    }

    #[derive(Default)]
    struct RecordingStore {
        inserted: Mutex<Vec<PersistedOrder>>,
    }

    #[async_trait]
    impl OrderStore for RecordingStore {
        async fn insert(&self, order: &PersistedOrder) -> anyhow::Result<()> {
            self.inserted.lock().push(order.clone());
            Ok(())
        }

        async fn scan(&self) -> anyhow::Result<Vec<PersistedOrder>> {
            Ok(self.inserted.lock().clone())
        }
    }

    #[derive(Default)]
    struct NullNotifier;

    #[async_trait]
    impl Notifier for NullNotifier {
        async fn send(&self, _market: &Market, _message: String) {}
    }

    async fn run_one(response: OrderResponse) -> Vec<PersistedOrder> {
        let exchange: Arc<dyn FuturesExchangeClient> = Arc::new(StubExchange { response });
        let store = Arc::new(RecordingStore::default());
        let notifier: Arc<dyn Notifier> = Arc::new(NullNotifier);

        let (tx, rx) = mpsc::channel(1);
        tx.send(Order {
            market: "pi_ethusd".to_string(),
            side: Side::Sell,
            price: 42.2,
            size: 1,
            time: Some(1),
        })
        .await
        .unwrap();
        drop(tx);

        run("pi_ethusd".to_string(), rx, exchange, store.clone(), notifier).await;
        store.inserted.lock().clone()
    }

    #[tokio::test]
    async fn scenario_s5_only_success_placed_persists() {
        let persisted = run_one(OrderResponse {
            result: "fail".to_string(),
            send_status: None,
            error: String::new(),
        })
        .await;
        assert!(persisted.is_empty());

        let persisted = run_one(OrderResponse {
            result: "success".to_string(),
            send_status: Some(SendStatus {
                status: "insufficientAvailableFunds".to_string(),
            }),
            error: String::new(),
        })
        .await;
        assert!(persisted.is_empty());

        let persisted = run_one(OrderResponse {
            result: "success".to_string(),
            send_status: Some(SendStatus {
                status: "not placed".to_string(),
            }),
            error: String::new(),
        })
        .await;
        assert!(persisted.is_empty());

        let persisted = run_one(OrderResponse {
            result: "success".to_string(),
            send_status: Some(SendStatus {
                status: "placed".to_string(),
            }),
            error: String::new(),
        })
        .await;
        assert_eq!(persisted.len(), 1);
    }
}
