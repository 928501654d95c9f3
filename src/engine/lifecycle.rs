// =============================================================================
// Lifecycle Controller (spec.md §4.G)
// =============================================================================
//
// Owns Set*/Unset*/Start*/Stop* and the bulk variants. StartMarket validates
// and flips `running` under a single writer-lock critical section — this is
// the fix for the Observable Race spec.md §9 calls out as an open question
// (the source's own reader-then-writer sequence leaves a window where two
// concurrent StartMarket calls can both pass validation).
//
// Grounded on the teacher's `app_state.rs` + `execution.rs` composition
// style: one controller owning both registries and the collaborator trait
// objects, with each public method doing one lifecycle operation.
// =============================================================================

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;

use crate::engine::{dispatcher, evaluator};
use crate::error::EngineError;
use crate::exchange::candle_stream::spawn_pipeline;
use crate::exchange::client::FuturesExchangeClient;
use crate::exchange::subscription::subscribe;
use crate::model::{Market, MarketStatus, RuleView, Side};
use crate::notifier::Notifier;
use crate::registry::connection::ConnectionRegistry;
use crate::registry::trade::TradeRegistry;
use crate::store::OrderStore;

#[derive(Clone)]
pub struct LifecycleController {
    trade_registry: Arc<TradeRegistry>,
    conn_registry: Arc<ConnectionRegistry>,
    exchange: Arc<dyn FuturesExchangeClient>,
    store: Arc<dyn OrderStore>,
    notifier: Arc<dyn Notifier>,
}

impl LifecycleController {
    pub fn new(
        trade_registry: Arc<TradeRegistry>,
        conn_registry: Arc<ConnectionRegistry>,
        exchange: Arc<dyn FuturesExchangeClient>,
        store: Arc<dyn OrderStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            trade_registry,
            conn_registry,
            exchange,
            store,
            notifier,
        }
    }

    pub fn set_market(&self, market: &Market) {
        self.trade_registry.set_market(market);
    }

    pub fn set_sell(&self, market: &Market, price: f64, size: u64) -> Result<RuleView, EngineError> {
        let record = self
            .trade_registry
            .get(market)
            .ok_or_else(|| EngineError::NoMarket(market.clone()))?;
        record.write().sell.arm(price, size);
        Ok(RuleView {
            market: market.clone(),
            kind: Side::Sell,
            price,
            size,
        })
    }

    pub fn set_buy(&self, market: &Market, price: f64, size: u64) -> Result<RuleView, EngineError> {
        let record = self
            .trade_registry
            .get(market)
            .ok_or_else(|| EngineError::NoMarket(market.clone()))?;
        record.write().buy.arm(price, size);
        Ok(RuleView {
            market: market.clone(),
            kind: Side::Buy,
            price,
            size,
        })
    }

    pub fn unset_sell(&self, market: &Market) -> Result<(), EngineError> {
        let record = self
            .trade_registry
            .get(market)
            .ok_or_else(|| EngineError::NoMarket(market.clone()))?;
        record.write().sell.disarm();
        Ok(())
    }

    pub fn unset_buy(&self, market: &Market) -> Result<(), EngineError> {
        let record = self
            .trade_registry
            .get(market)
            .ok_or_else(|| EngineError::NoMarket(market.clone()))?;
        record.write().buy.disarm();
        Ok(())
    }

    pub fn unset_all(&self) -> Vec<MarketStatus> {
        self.trade_registry
            .snapshot()
            .into_iter()
            .map(|(market, record)| {
                let mut inner = record.write();
                inner.sell.disarm();
                inner.buy.disarm();
                MarketStatus {
                    market,
                    status: "ok".to_string(),
                }
            })
            .collect()
    }

    pub fn active(&self, market: &Market) -> Result<Vec<RuleView>, EngineError> {
        let record = self
            .trade_registry
            .get(market)
            .ok_or_else(|| EngineError::NoMarket(market.clone()))?;
        Ok(rule_views(market, &record.read()))
    }

    pub fn active_all(&self) -> Vec<RuleView> {
        self.trade_registry
            .snapshot()
            .into_iter()
            .flat_map(|(market, record)| rule_views(&market, &record.read()))
            .collect()
    }

    pub fn running(&self) -> Vec<Market> {
        self.trade_registry
            .snapshot()
            .into_iter()
            .filter_map(|(market, record)| record.read().running.then_some(market))
            .collect()
    }

    /// GET /accounts: 500 plain-text "Internal Server Error" on failure per
    /// spec.md §6, so this returns the bare collaborator error for the
    /// caller to flatten into that literal response.
    pub async fn accounts(&self) -> anyhow::Result<crate::model::AccountsResp> {
        self.exchange.get_accounts().await
    }

    /// GET /orders: same 500 plain-text convention as `accounts`.
    pub async fn orders(&self) -> anyhow::Result<Vec<crate::model::PersistedOrder>> {
        self.store.scan().await
    }

    /// spec.md §4.G StartMarket.
    pub async fn start_market(&self, market: &Market) -> Result<(), EngineError> {
        let record = self.trade_registry.get(market).ok_or_else(|| {
            EngineError::NotSet(market.clone(), format!("No market was set: {market}"))
        })?;

        // Steps 1-2 combined into a single writer-lock critical section: this
        // is what closes the Observable Race (spec.md §9) that a separate
        // reader-then-writer sequence would leave open.
        {
            let mut inner = record.write();
            if !inner.can_start() {
                let reason = if inner.running {
                    format!("{market} is already running")
                } else {
                    format!("no trigger rule is armed for {market}")
                };
                return Err(EngineError::NotSet(market.clone(), reason));
            }
            inner.running = true;
        }

        match subscribe(market, &self.conn_registry, self.exchange.as_ref()).await {
            Ok(candle_source) => {
                let candle_rx = spawn_pipeline(
                    market.clone(),
                    candle_source,
                    self.exchange.clone(),
                    self.conn_registry.clone(),
                    self.notifier.clone(),
                )
                .await;

                let (order_tx, order_rx) = mpsc::channel(1);

                {
                    let market = market.clone();
                    let record = record.clone();
                    record
                        .workers
                        .spawn(async move {
                            evaluator::run(market, record.clone(), candle_rx, order_tx).await;
                        })
                        .await;
                }
                {
                    let market = market.clone();
                    let exchange = self.exchange.clone();
                    let store = self.store.clone();
                    let notifier = self.notifier.clone();
                    record
                        .workers
                        .spawn(async move {
                            dispatcher::run(market, order_rx, exchange, store, notifier).await;
                        })
                        .await;
                }

                info!(market = %market, "market started");
                Ok(())
            }
            Err(e) => {
                if let Some(conn) = self.conn_registry.get(market) {
                    conn.close().await;
                }
                record.write().running = false;
                Err(EngineError::PermanentSubscribe(market.clone(), e.to_string()))
            }
        }
    }

    /// spec.md §4.G StopMarket.
    pub async fn stop_market(&self, market: &Market) -> Result<(), EngineError> {
        let record = self
            .trade_registry
            .get(market)
            .ok_or_else(|| EngineError::NoMarket(market.clone()))?;

        let running = record.read().running;
        if !running {
            return Ok(());
        }

        // Closing the socket breaks the reader's blocking read, cascading
        // channel closure down the pipeline (spec.md §9 pipeline teardown).
        if let Some(conn) = self.conn_registry.get(market) {
            conn.close().await;
            conn.workers.join_all().await;
        }

        record.workers.join_all().await;
        record.write().running = false;
        info!(market = %market, "market stopped");
        Ok(())
    }

    pub async fn start_all(&self) -> Vec<MarketStatus> {
        let markets: Vec<Market> = self.trade_registry.snapshot().into_iter().map(|(m, _)| m).collect();
        let mut results = Vec::with_capacity(markets.len());
        for market in markets {
            let status = match self.start_market(&market).await {
                Ok(()) => "ok".to_string(),
                Err(e) => e.to_string(),
            };
            results.push(MarketStatus { market, status });
        }
        results
    }

    /// Also the shutdown hook invoked by the HTTP server's `ctrl_c` handler.
    pub async fn stop_all(&self) -> Vec<MarketStatus> {
        let markets: Vec<Market> = self.trade_registry.snapshot().into_iter().map(|(m, _)| m).collect();
        let mut results = Vec::with_capacity(markets.len());
        for market in markets {
            let status = match self.stop_market(&market).await {
                Ok(()) => "ok".to_string(),
                Err(e) => e.to_string(),
            };
            results.push(MarketStatus { market, status });
        }
        results
    }
}

fn rule_views(market: &Market, inner: &crate::registry::trade::TradeRecordInner) -> Vec<RuleView> {
    let mut views = Vec::with_capacity(2);
    if inner.sell.armed {
        views.push(RuleView {
            market: market.clone(),
            kind: Side::Sell,
            price: inner.sell.price,
            size: inner.sell.size,
        });
    }
    if inner.buy.armed {
        views.push(RuleView {
            market: market.clone(),
            kind: Side::Buy,
            price: inner.buy.price,
            size: inner.buy.size,
        });
    }
    views
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{OrderResponse, SendStatus};
    use async_trait::async_trait;

    struct StubExchange;

    #[async_trait]
    impl FuturesExchangeClient for StubExchange {
        async fn send_order(
            &self,
            _market: &Market,
            _side: Side,
            _size: u64,
            _limit_price: f64,
        ) -> anyhow::Result<OrderResponse> {
            Ok(OrderResponse {
                result: "success".to_string(),
                send_status: Some(SendStatus {
                    status: "placed".to_string(),
                }),
                error: String::new(),
            })
        }

        async fn get_accounts(&self) -> anyhow::Result<crate::model::AccountsResp> {
            Ok(crate::model::AccountsResp {
                fi_xbtusd: 0.0,
                fi_bchusd: 0.0,
                fi_ethusd: 0.0,
                fi_ltcusd: 0.0,
                fi_xrpusd: 0.0,
                fv_xrpxbt: 0.0,
            })
        }

        fn ws_url(&self) -> &str {
            "wss://unreachable.invalid/ws"
        }
    }

    #[derive(Default)]
    struct NullStore;

    #[async_trait]
    impl OrderStore for NullStore {
        async fn insert(&self, _order: &crate::model::PersistedOrder) -> anyhow::Result<()> {
            Ok(())
        }
        async fn scan(&self) -> anyhow::Result<Vec<crate::model::PersistedOrder>> {
            Ok(vec![])
        }
    }

    #[derive(Default)]
    struct NullNotifier;

    #[async_trait]
    impl Notifier for NullNotifier {
        async fn send(&self, _market: &Market, _message: String) {}
    }

    fn controller() -> LifecycleController {
        LifecycleController::new(
            Arc::new(TradeRegistry::new()),
            Arc::new(ConnectionRegistry::new()),
            Arc::new(StubExchange),
            Arc::new(NullStore),
            Arc::new(NullNotifier),
        )
    }

    #[test]
    fn scenario_s1_set_market_then_set_sell_roundtrip() {
        let ctl = controller();
        let market = "pi_ethusd".to_string();
        ctl.set_market(&market);
        let rule = ctl.set_sell(&market, 4000.0, 5).unwrap();
        assert_eq!(rule.price, 4000.0);
        assert_eq!(rule.size, 5);
    }

    #[test]
    fn scenario_s2_unset_sell_on_unknown_market_is_no_market() {
        let ctl = controller();
        let err = ctl.unset_sell(&"not_set".to_string()).unwrap_err();
        assert_eq!(err.to_string(), "No market was set: not_set");
    }

    #[test]
    fn scenario_s3_active_lists_both_sides() {
        let ctl = controller();
        let market = "pi_ethusd".to_string();
        ctl.set_market(&market);
        ctl.set_sell(&market, 4000.0, 5).unwrap();
        ctl.set_buy(&market, 4000.0, 5).unwrap();
        let active = ctl.active(&market).unwrap();
        assert_eq!(active.len(), 2);
    }

    #[tokio::test]
    async fn start_is_rejected_when_nothing_is_armed() {
        let ctl = controller();
        let market = "pi_ethusd".to_string();
        ctl.set_market(&market);
        let err = ctl.start_market(&market).await.unwrap_err();
        assert!(matches!(err, EngineError::NotSet(..)));
    }

    #[tokio::test]
    async fn start_is_rejected_for_unknown_market() {
        let ctl = controller();
        let err = ctl.start_market(&"nope".to_string()).await.unwrap_err();
        assert!(matches!(err, EngineError::NotSet(..)));
    }

    #[tokio::test]
    async fn stop_on_never_started_market_is_ok() {
        let ctl = controller();
        let market = "pi_ethusd".to_string();
        ctl.set_market(&market);
        ctl.stop_market(&market).await.unwrap();
    }

    #[test]
    fn unset_all_covers_every_registered_market() {
        let ctl = controller();
        ctl.set_market(&"a".to_string());
        ctl.set_market(&"b".to_string());
        let results = ctl.unset_all();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.status == "ok"));
    }
}
