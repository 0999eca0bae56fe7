use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use appointment_cell::router::{appointment_routes, reappointment_routes};
use exchange_cell::router::exchange_routes;
use notification_cell::router::notification_routes;
use schedule_cell::router::{schedule_routes, shift_routes};
use shared_config::AppConfig;

pub fn create_router(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(|| async { "Clinic scheduling API is running!" }))
        .nest("/shifts", shift_routes(state.clone()))
        .nest("/schedules", schedule_routes(state.clone()))
        .nest("/shift-exchanges", exchange_routes(state.clone()))
        .nest("/appointments", appointment_routes(state.clone()))
        .nest("/reappointments", reappointment_routes(state.clone()))
        .nest("/notifications", notification_routes(state))
}
