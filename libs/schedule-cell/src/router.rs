// libs/schedule-cell/src/router.rs
use std::sync::Arc;

use axum::{
    routing::{get, patch, post},
    Router,
};

use shared_config::AppConfig;

use crate::handlers;

pub fn schedule_routes(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", post(handlers::create_schedule).get(handlers::get_schedules))
        .route("/daily", post(handlers::create_daily_schedule))
        .route("/board", get(handlers::get_schedule_board))
        .route("/{shift_id}/range", patch(handlers::update_schedule_range))
        .route("/conflicts/check", get(handlers::check_doctor_conflict))
        .with_state(state)
}

pub fn shift_routes(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(handlers::list_shifts))
        .with_state(state)
}
