// =============================================================================
// Query parameter extraction/validation (spec.md §6)
// =============================================================================
//
// market required non-empty; price parsed as real, must be > 0; size parsed
// as integer, must be > 0. Grounded on the teacher's `api/auth.rs` custom-
// extractor-with-rejection pattern, generalized from a bearer token to a
// typed query bag.
// =============================================================================

use async_trait::async_trait;
use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use serde::Deserialize;

use crate::error::EngineError;
use crate::model::Market;

#[derive(Debug, Deserialize)]
pub struct RawQuery {
    pub market: Option<String>,
    pub price: Option<String>,
    pub size: Option<String>,
}

/// Raw, unvalidated query parameters. A malformed query string itself (not a
/// missing/invalid field, which is `WrongQuery`) is a middleware-layer
/// failure — `FailedQuery` (spec.md §7).
pub struct RawParams(pub RawQuery);

#[async_trait]
impl<S> FromRequestParts<S> for RawParams
where
    S: Send + Sync,
{
    type Rejection = EngineError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(query) = Query::<RawQuery>::from_request_parts(parts, state)
            .await
            .map_err(|_| EngineError::FailedQuery)?;
        Ok(RawParams(query))
    }
}

pub fn require_market(q: &RawQuery) -> Result<Market, EngineError> {
    match q.market.as_deref() {
        Some(m) if !m.is_empty() => Ok(m.to_string()),
        _ => Err(EngineError::WrongQuery("no market".to_string())),
    }
}

pub fn require_price(q: &RawQuery) -> Result<f64, EngineError> {
    match &q.price {
        Some(raw) => {
            let value: f64 = raw
                .parse()
                .map_err(|_| EngineError::WrongQuery(format!("price: {raw}")))?;
            if value > 0.0 {
                Ok(value)
            } else {
                Err(EngineError::WrongQuery(format!("price: {raw}")))
            }
        }
        None => Err(EngineError::WrongQuery("no price".to_string())),
    }
}

pub fn require_size(q: &RawQuery) -> Result<u64, EngineError> {
    match &q.size {
        Some(raw) => {
            let value: u64 = raw
                .parse()
                .map_err(|_| EngineError::WrongQuery(format!("size: {raw}")))?;
            if value > 0 {
                Ok(value)
            } else {
                Err(EngineError::WrongQuery(format!("size: {raw}")))
            }
        }
        None => Err(EngineError::WrongQuery("no size".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_market_is_wrong_query() {
        let q = RawQuery {
            market: None,
            price: None,
            size: None,
        };
        let err = require_market(&q).unwrap_err();
        assert_eq!(err.to_string(), "Wrong query parameter: no market");
    }

    #[test]
    fn empty_market_is_wrong_query() {
        let q = RawQuery {
            market: Some(String::new()),
            price: None,
            size: None,
        };
        assert!(require_market(&q).is_err());
    }

    #[test]
    fn zero_price_is_rejected() {
        let q = RawQuery {
            market: None,
            price: Some("0".to_string()),
            size: None,
        };
        let err = require_price(&q).unwrap_err();
        assert_eq!(err.to_string(), "Wrong query parameter: price: 0");
    }

    #[test]
    fn unparseable_size_is_rejected() {
        let q = RawQuery {
            market: None,
            price: None,
            size: Some("abc".to_string()),
        };
        let err = require_size(&q).unwrap_err();
        assert_eq!(err.to_string(), "Wrong query parameter: size: abc");
    }

    #[test]
    fn valid_price_and_size_parse() {
        let q = RawQuery {
            market: Some("pi_ethusd".to_string()),
            price: Some("4000".to_string()),
            size: Some("5".to_string()),
        };
        assert_eq!(require_market(&q).unwrap(), "pi_ethusd");
        assert_eq!(require_price(&q).unwrap(), 4000.0);
        assert_eq!(require_size(&q).unwrap(), 5);
    }
}
