// libs/notification-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::error::AppError;

use crate::models::NotificationError;
use crate::services::notify::NotificationService;

#[axum::debug_handler]
pub async fn get_user_notifications(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = NotificationService::new(Arc::new(SupabaseClient::new(&state)));

    let notifications = service.list_for_user(user_id, auth.token()).await
        .map_err(|NotificationError::DatabaseError(msg)| AppError::Database(msg))?;

    Ok(Json(json!({
        "success": true,
        "notifications": notifications
    })))
}
