// libs/schedule-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::error::AppError;

use crate::models::{
    ConflictCheckQuery, CreateScheduleRequest, ScheduleError, ScheduleRangeQuery,
    UpdateScheduleRangeRequest,
};
use crate::services::assigner::ScheduleAssignerService;
use crate::services::catalog::ShiftCatalogService;

fn map_schedule_error(e: ScheduleError) -> AppError {
    match e {
        ScheduleError::ShiftNotFound => AppError::NotFound("Shift not found".to_string()),
        ScheduleError::RangeNotFound => {
            AppError::NotFound("No schedule group matches the given shift and date range".to_string())
        }
        ScheduleError::InvalidBookingWindow => {
            AppError::BadRequest("Timestamp falls outside every shift window".to_string())
        }
        ScheduleError::InvalidDateRange(msg) => AppError::BadRequest(msg),
        ScheduleError::ValidationError(msg) => AppError::ValidationError(msg),
        ScheduleError::DatabaseError(msg) => AppError::Database(msg),
    }
}

#[axum::debug_handler]
pub async fn create_schedule(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Json(request): Json<CreateScheduleRequest>,
) -> Result<Json<Value>, AppError> {
    let assigner = ScheduleAssignerService::new(&state);

    let response = assigner.create_schedule(request, auth.token()).await
        .map_err(map_schedule_error)?;

    Ok(Json(json!({
        "success": true,
        "created_count": response.created_count,
        "skipped": response.skipped
    })))
}

#[axum::debug_handler]
pub async fn create_daily_schedule(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Json(request): Json<CreateScheduleRequest>,
) -> Result<Json<Value>, AppError> {
    let assigner = ScheduleAssignerService::new(&state);

    let response = assigner.create_daily_schedule(request, auth.token()).await
        .map_err(map_schedule_error)?;

    Ok(Json(json!({
        "success": true,
        "created_count": response.created_count,
        "skipped": response.skipped
    })))
}

#[axum::debug_handler]
pub async fn get_schedules(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(query): Query<ScheduleRangeQuery>,
) -> Result<Json<Value>, AppError> {
    let assigner = ScheduleAssignerService::new(&state);

    let schedules = assigner.list_schedules(query.from, query.to, auth.token()).await
        .map_err(map_schedule_error)?;

    Ok(Json(json!({
        "success": true,
        "schedules": schedules
    })))
}

#[axum::debug_handler]
pub async fn get_schedule_board(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(query): Query<ScheduleRangeQuery>,
) -> Result<Json<Value>, AppError> {
    let assigner = ScheduleAssignerService::new(&state);

    let board = assigner.get_schedule_board(query.from, query.to, auth.token()).await
        .map_err(map_schedule_error)?;

    Ok(Json(json!({
        "success": true,
        "board": board
    })))
}

#[axum::debug_handler]
pub async fn update_schedule_range(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(shift_id): Path<Uuid>,
    Json(request): Json<UpdateScheduleRangeRequest>,
) -> Result<Json<Value>, AppError> {
    let assigner = ScheduleAssignerService::new(&state);

    let response = assigner.update_range(shift_id, request, auth.token()).await
        .map_err(map_schedule_error)?;

    Ok(Json(json!({
        "success": true,
        "regrouped": response.regrouped,
        "created_count": response.created_count,
        "deactivated_count": response.deactivated_count,
        "skipped": response.skipped
    })))
}

#[axum::debug_handler]
pub async fn check_doctor_conflict(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(query): Query<ConflictCheckQuery>,
) -> Result<Json<Value>, AppError> {
    let assigner = ScheduleAssignerService::new(&state);

    let has_conflict = assigner.check_conflict(
        query.doctor_id,
        query.shift_id,
        query.from,
        query.to,
        auth.token(),
    ).await.map_err(map_schedule_error)?;

    Ok(Json(json!({
        "success": true,
        "has_conflict": has_conflict
    })))
}

#[axum::debug_handler]
pub async fn list_shifts(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let catalog = ShiftCatalogService::new(Arc::new(SupabaseClient::new(&state)));

    let shifts = catalog.list_shifts(auth.token()).await
        .map_err(map_schedule_error)?;

    Ok(Json(json!({
        "success": true,
        "shifts": shifts
    })))
}
