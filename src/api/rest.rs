// =============================================================================
// HTTP control plane — Axum 0.7 (spec.md §6)
// =============================================================================
//
// No authentication on any route (spec.md Non-goals: "authentication/
// authorization on the control plane"). Router construction and the CORS
// layer follow the teacher's `api/rest.rs` shape.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::api::extract::{require_market, require_price, require_size, RawParams};
use crate::engine::lifecycle::LifecycleController;
use crate::error::EngineError;
use crate::model::MarketStatus;

/// Build the control-plane router, bound to a shared `LifecycleController`.
pub fn router(controller: Arc<LifecycleController>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/accounts", get(accounts))
        .route("/orders", get(orders))
        .route("/active", get(active))
        .route("/activeall", get(active_all))
        .route("/running", get(running))
        .route("/setmarket", post(set_market))
        .route("/setsell", post(set_sell))
        .route("/setbuy", post(set_buy))
        .route("/unsetsell", post(unset_sell))
        .route("/unsetbuy", post(unset_buy))
        .route("/unsetall", post(unset_all))
        .route("/start", post(start_market))
        .route("/stop", post(stop_market))
        .route("/startall", post(start_all))
        .route("/stopall", post(stop_all))
        .layer(cors)
        .with_state(controller)
}

async fn accounts(State(ctl): State<Arc<LifecycleController>>) -> impl IntoResponse {
    match ctl.accounts().await {
        Ok(body) => Json(body).into_response(),
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response(),
    }
}

async fn orders(State(ctl): State<Arc<LifecycleController>>) -> impl IntoResponse {
    match ctl.orders().await {
        Ok(body) => Json(body).into_response(),
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response(),
    }
}

async fn active(
    State(ctl): State<Arc<LifecycleController>>,
    RawParams(q): RawParams,
) -> Result<impl IntoResponse, EngineError> {
    let market = require_market(&q)?;
    Ok(Json(ctl.active(&market)?))
}

async fn active_all(State(ctl): State<Arc<LifecycleController>>) -> impl IntoResponse {
    Json(ctl.active_all())
}

async fn running(State(ctl): State<Arc<LifecycleController>>) -> impl IntoResponse {
    let body: Vec<MarketStatus> = ctl
        .running()
        .into_iter()
        .map(|market| MarketStatus {
            market,
            status: "running".to_string(),
        })
        .collect();
    Json(body)
}

async fn set_market(
    State(ctl): State<Arc<LifecycleController>>,
    RawParams(q): RawParams,
) -> Result<impl IntoResponse, EngineError> {
    let market = require_market(&q)?;
    ctl.set_market(&market);
    Ok((
        StatusCode::CREATED,
        Json(MarketStatus {
            market,
            status: "ok".to_string(),
        }),
    ))
}

async fn set_sell(
    State(ctl): State<Arc<LifecycleController>>,
    RawParams(q): RawParams,
) -> Result<impl IntoResponse, EngineError> {
    let market = require_market(&q)?;
    let price = require_price(&q)?;
    let size = require_size(&q)?;
    let rule = ctl.set_sell(&market, price, size)?;
    Ok((StatusCode::CREATED, Json(rule)))
}

async fn set_buy(
    State(ctl): State<Arc<LifecycleController>>,
    RawParams(q): RawParams,
) -> Result<impl IntoResponse, EngineError> {
    let market = require_market(&q)?;
    let price = require_price(&q)?;
    let size = require_size(&q)?;
    let rule = ctl.set_buy(&market, price, size)?;
    Ok((StatusCode::CREATED, Json(rule)))
}

async fn unset_sell(
    State(ctl): State<Arc<LifecycleController>>,
    RawParams(q): RawParams,
) -> Result<impl IntoResponse, EngineError> {
    let market = require_market(&q)?;
    ctl.unset_sell(&market)?;
    Ok(Json(MarketStatus {
        market,
        status: "ok".to_string(),
    }))
}

async fn unset_buy(
    State(ctl): State<Arc<LifecycleController>>,
    RawParams(q): RawParams,
) -> Result<impl IntoResponse, EngineError> {
    let market = require_market(&q)?;
    ctl.unset_buy(&market)?;
    Ok(Json(MarketStatus {
        market,
        status: "ok".to_string(),
    }))
}

async fn unset_all(State(ctl): State<Arc<LifecycleController>>) -> impl IntoResponse {
    Json(ctl.unset_all())
}

async fn start_market(
    State(ctl): State<Arc<LifecycleController>>,
    RawParams(q): RawParams,
) -> Result<impl IntoResponse, EngineError> {
    let market = require_market(&q)?;
    ctl.start_market(&market).await?;
    Ok(Json(MarketStatus {
        market,
        status: "ok".to_string(),
    }))
}

async fn stop_market(
    State(ctl): State<Arc<LifecycleController>>,
    RawParams(q): RawParams,
) -> Result<impl IntoResponse, EngineError> {
    let market = require_market(&q)?;
    ctl.stop_market(&market).await?;
    Ok(Json(MarketStatus {
        market,
        status: "ok".to_string(),
    }))
}

async fn start_all(State(ctl): State<Arc<LifecycleController>>) -> impl IntoResponse {
    Json(ctl.start_all().await)
}

async fn stop_all(State(ctl): State<Arc<LifecycleController>>) -> impl IntoResponse {
    Json(ctl.stop_all().await)
}
