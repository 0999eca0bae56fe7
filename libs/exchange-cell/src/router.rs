// libs/exchange-cell/src/router.rs
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;

use crate::handlers;

pub fn exchange_routes(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", post(handlers::create_exchange).get(handlers::get_exchanges))
        .route("/{exchange_id}", get(handlers::get_exchange))
        .route("/{exchange_id}/review", post(handlers::review_exchange))
        .route("/doctors/{doctor_id}", get(handlers::get_doctor_exchanges))
        .with_state(state)
}
