//! Engine error taxonomy (spec.md §7) and its HTTP rendering.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::model::Market;

/// The engine's error taxonomy. Each variant carries exactly the context its
/// HTTP rendering needs.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    /// Fatal at boot: a required environment variable is missing.
    #[error("missing required configuration: {0}")]
    ConfigMissing(&'static str),

    /// Malformed or missing HTTP query parameter (400, plain text).
    #[error("Wrong query parameter: {0}")]
    WrongQuery(String),

    /// Parameter present but wrong type after middleware (500, generic).
    #[error("internal error handling request parameters")]
    FailedQuery,

    /// Operation referenced an unknown market (400).
    #[error("No market was set: {0}")]
    NoMarket(Market),

    /// Start precondition violated: unarmed or already running (400).
    #[error("{1}")]
    NotSet(Market, String),

    /// Subscribe exhausted its retry budget or failed the handshake (500).
    #[error("{1}")]
    PermanentSubscribe(Market, String),
}

impl EngineError {
    fn status(&self) -> StatusCode {
        match self {
            Self::ConfigMissing(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::WrongQuery(_) => StatusCode::BAD_REQUEST,
            Self::FailedQuery => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NoMarket(_) => StatusCode::BAD_REQUEST,
            Self::NotSet(..) => StatusCode::BAD_REQUEST,
            Self::PermanentSubscribe(..) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// `{market, status}` body shape used by most of the control plane (spec.md
/// §6). `market` is omitted where the error has none (e.g. `WrongQuery`).
#[derive(Serialize)]
struct MarketStatusBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    market: Option<Market>,
    status: String,
}

impl IntoResponse for EngineError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();

        // WrongQuery and FailedQuery render as plain text, matching the
        // source's "Wrong query parameter: ..." literal responses.
        match &self {
            Self::WrongQuery(_) | Self::FailedQuery => {
                return (status, self.to_string()).into_response();
            }
            _ => {}
        }

        let market = match &self {
            Self::NoMarket(m) => Some(m.clone()),
            Self::NotSet(m, _) => Some(m.clone()),
            Self::PermanentSubscribe(m, _) => Some(m.clone()),
            _ => None,
        };

        let body = MarketStatusBody {
            market,
            status: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_market_message_matches_scenario_s2() {
        let err = EngineError::NoMarket("not_set".to_string());
        assert_eq!(err.to_string(), "No market was set: not_set");
    }
}
