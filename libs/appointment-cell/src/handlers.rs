// libs/appointment-cell/src/handlers.rs
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
use shared_models::error::AppError;

use crate::models::{
    AppointmentError, AppointmentSearchQuery, BookAppointmentRequest, CancelAppointmentRequest,
    ConfirmReappointmentRequest, CreateReappointmentRequest, ReappointmentListQuery,
    RescheduleAppointmentRequest,
};
use crate::services::booking::AppointmentBookingService;
use crate::services::reappointment::ReappointmentService;

fn map_appointment_error(err: AppointmentError) -> AppError {
    match err {
        AppointmentError::InvalidBookingWindow
        | AppointmentError::PastAppointmentDate
        | AppointmentError::CancellationWindowPassed
        | AppointmentError::InvalidStatusTransition(_) => AppError::BadRequest(err.to_string()),
        AppointmentError::ValidationError(msg) => AppError::ValidationError(msg),
        AppointmentError::DoctorFullyBooked
        | AppointmentError::PatientAlreadyBooked
        | AppointmentError::PatientDoctorLimitReached
        | AppointmentError::ReappointmentAlreadyCompleted
        | AppointmentError::LockContended => AppError::Conflict(err.to_string()),
        AppointmentError::AppointmentNotFound
        | AppointmentError::PatientNotFound
        | AppointmentError::DoctorNotFound
        | AppointmentError::ReappointmentNotFound => AppError::NotFound(err.to_string()),
        AppointmentError::DatabaseError(msg) => AppError::Database(msg),
    }
}

// ==============================================================================
// APPOINTMENT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentBookingService::new(&state);

    let appointment = service.book_appointment(request, auth.token()).await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment
    })))
}

#[axum::debug_handler]
pub async fn search_appointments(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(query): Query<AppointmentSearchQuery>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentBookingService::new(&state);

    let appointments = service.search_appointments(&query, auth.token()).await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointments": appointments
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentBookingService::new(&state);

    let appointment = service.get_appointment(appointment_id, auth.token()).await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment
    })))
}

#[axum::debug_handler]
pub async fn reschedule_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<RescheduleAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentBookingService::new(&state);

    let appointment = service
        .reschedule_appointment(appointment_id, request.new_date, auth.token()).await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment
    })))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<CancelAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentBookingService::new(&state);

    let appointment = service
        .cancel_appointment(appointment_id, request.reason, auth.token()).await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment
    })))
}

#[axum::debug_handler]
pub async fn restore_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentBookingService::new(&state);

    let appointment = service.restore_appointment(appointment_id, auth.token()).await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment
    })))
}

// ==============================================================================
// REAPPOINTMENT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_reappointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Json(request): Json<CreateReappointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let service = ReappointmentService::new(&state);

    let reappointment = service.create_reappointment(request, auth.token()).await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "reappointment": reappointment
    })))
}

#[axum::debug_handler]
pub async fn get_reappointments(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(query): Query<ReappointmentListQuery>,
) -> Result<Json<Value>, AppError> {
    let service = ReappointmentService::new(&state);

    let reappointments = service.list_reappointments(&query, auth.token()).await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "reappointments": reappointments
    })))
}

#[axum::debug_handler]
pub async fn get_reappointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(reappointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = ReappointmentService::new(&state);

    let reappointment = service.get_reappointment(reappointment_id, auth.token()).await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "reappointment": reappointment
    })))
}

#[axum::debug_handler]
pub async fn confirm_reappointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(reappointment_id): Path<Uuid>,
    Json(request): Json<ConfirmReappointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let service = ReappointmentService::new(&state);

    let appointment = service
        .confirm_reappointment(reappointment_id, request.appointment_date, auth.token()).await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment
    })))
}
