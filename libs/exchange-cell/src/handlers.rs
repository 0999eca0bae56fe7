// libs/exchange-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::error::AppError;

use crate::models::{CreateExchangeRequest, ExchangeError, ExchangeStatus, ReviewExchangeRequest};
use crate::services::exchange::ShiftExchangeService;

fn map_exchange_error(err: ExchangeError) -> AppError {
    match err {
        ExchangeError::SelfSwap
        | ExchangeError::SpecialtyMismatch
        | ExchangeError::ExchangeDateRequired
        | ExchangeError::PermanentSwapNotFuture
        | ExchangeError::ShiftNotHeld { .. } => AppError::BadRequest(err.to_string()),
        ExchangeError::ValidationError(msg) => AppError::ValidationError(msg),
        ExchangeError::DuplicatePending
        | ExchangeError::AlreadyProcessed
        | ExchangeError::LockContended => AppError::Conflict(err.to_string()),
        ExchangeError::NotFound
        | ExchangeError::DoctorNotFound
        | ExchangeError::AssignmentNotFound => AppError::NotFound(err.to_string()),
        ExchangeError::DatabaseError(msg) => AppError::Database(msg),
    }
}

#[derive(Debug, Deserialize)]
pub struct ExchangeListQuery {
    pub status: Option<ExchangeStatus>,
}

#[axum::debug_handler]
pub async fn create_exchange(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Json(request): Json<CreateExchangeRequest>,
) -> Result<Json<Value>, AppError> {
    let service = ShiftExchangeService::new(&state);

    let exchange = service.create_exchange(request, auth.token()).await
        .map_err(map_exchange_error)?;

    Ok(Json(json!({
        "success": true,
        "exchange": exchange
    })))
}

#[axum::debug_handler]
pub async fn get_exchanges(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(query): Query<ExchangeListQuery>,
) -> Result<Json<Value>, AppError> {
    let service = ShiftExchangeService::new(&state);

    let exchanges = service.list_exchanges(query.status, auth.token()).await
        .map_err(map_exchange_error)?;

    Ok(Json(json!({
        "success": true,
        "exchanges": exchanges
    })))
}

#[axum::debug_handler]
pub async fn get_exchange(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(exchange_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = ShiftExchangeService::new(&state);

    let exchange = service.get_exchange(exchange_id, auth.token()).await
        .map_err(map_exchange_error)?;

    Ok(Json(json!({
        "success": true,
        "exchange": exchange
    })))
}

#[axum::debug_handler]
pub async fn review_exchange(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(exchange_id): Path<Uuid>,
    Json(request): Json<ReviewExchangeRequest>,
) -> Result<Json<Value>, AppError> {
    let service = ShiftExchangeService::new(&state);

    let exchange = service.review_exchange(exchange_id, request.decision, auth.token()).await
        .map_err(map_exchange_error)?;

    Ok(Json(json!({
        "success": true,
        "exchange": exchange
    })))
}

#[axum::debug_handler]
pub async fn get_doctor_exchanges(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = ShiftExchangeService::new(&state);

    let exchanges = service.list_for_doctor(doctor_id, auth.token()).await
        .map_err(map_exchange_error)?;

    Ok(Json(json!({
        "success": true,
        "exchanges": exchanges
    })))
}
