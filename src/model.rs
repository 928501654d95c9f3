// =============================================================================
// Shared data model for the per-market trading engine
// =============================================================================

use serde::{Deserialize, Serialize};

/// Opaque market identifier (e.g. `pi_ethusd`). Equality is byte-exact.
pub type Market = String;

/// Which side of a trigger rule fired / which side an order is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Sell,
    Buy,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sell => write!(f, "sell"),
            Self::Buy => write!(f, "buy"),
        }
    }
}

/// A single arm-once trigger rule (either the sell side or the buy side of
/// a market).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TriggerRule {
    pub armed: bool,
    pub price: f64,
    pub size: u64,
}

impl TriggerRule {
    /// Arm (or re-arm) this rule with a new price/size, unconditionally.
    pub fn arm(&mut self, price: f64, size: u64) {
        self.armed = true;
        self.price = price;
        self.size = size;
    }

    pub fn disarm(&mut self) {
        self.armed = false;
    }
}

/// An order emitted by the Trigger Evaluator and consumed by the Order
/// Dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub market: Market,
    pub side: Side,
    pub price: f64,
    pub size: u64,
    /// Set by the evaluator at emission time (ms since epoch).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<i64>,
}

/// The exchange's response to a submitted order.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderResponse {
    pub result: String,
    #[serde(rename = "sendStatus")]
    pub send_status: Option<SendStatus>,
    #[serde(default)]
    pub error: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendStatus {
    pub status: String,
}

/// GET /accounts' 2xx body (spec.md §6): available funds for each of the
/// exchange's six fixed futures markets, flattened out of the wallet's
/// nested `accounts.<market>.auxiliary.af`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AccountsResp {
    pub fi_xbtusd: f64,
    pub fi_bchusd: f64,
    pub fi_ethusd: f64,
    pub fi_ltcusd: f64,
    pub fi_xrpusd: f64,
    pub fv_xrpxbt: f64,
}

/// A trigger rule as rendered to HTTP callers: the response to SetSell/SetBuy
/// and the entries of /active, /activeall. Distinct from `Order` (no `time`,
/// and the side field is named `type` on the wire).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleView {
    pub market: Market,
    #[serde(rename = "type")]
    pub kind: Side,
    pub price: f64,
    pub size: u64,
}

/// `{market, status}` — the shape returned by bulk lifecycle operations
/// (UnsetAll/StartAll/StopAll) for each market they touch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketStatus {
    pub market: Market,
    pub status: String,
}

/// A persisted fill, as recorded in the order log (spec.md §6:
/// `orders(ts, market, type, price, size)`). GET /orders renders the `ts`
/// column as `time`, matching the `[Order]` wire contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedOrder {
    #[serde(rename = "time")]
    pub ts: i64,
    pub market: Market,
    #[serde(rename = "type")]
    pub kind: Side,
    pub price: f64,
    pub size: u64,
}
