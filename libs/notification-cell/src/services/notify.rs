// libs/notification-cell/src/services/notify.rs
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::models::{Notification, NotificationError};

/// Notification sink: "send to a user or to everyone holding a role".
/// Callers treat delivery failures as log-worthy, never as business
/// failures.
pub struct NotificationService {
    supabase: Arc<SupabaseClient>,
}

impl NotificationService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    pub async fn notify_user(
        &self,
        user_id: Uuid,
        title: &str,
        body: &str,
        auth_token: &str,
    ) -> Result<(), NotificationError> {
        debug!("Sending notification to user {}: {}", user_id, title);
        self.insert_notification(json!({
            "recipient_user_id": user_id,
            "recipient_role": Value::Null,
            "title": title,
            "body": body,
            "is_read": false,
            "created_at": chrono::Utc::now().to_rfc3339()
        }), auth_token).await
    }

    pub async fn notify_role(
        &self,
        role: &str,
        title: &str,
        body: &str,
        auth_token: &str,
    ) -> Result<(), NotificationError> {
        debug!("Sending notification to role {}: {}", role, title);
        self.insert_notification(json!({
            "recipient_user_id": Value::Null,
            "recipient_role": role,
            "title": title,
            "body": body,
            "is_read": false,
            "created_at": chrono::Utc::now().to_rfc3339()
        }), auth_token).await
    }

    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<Notification>, NotificationError> {
        let path = format!(
            "/rest/v1/notifications?recipient_user_id=eq.{}&order=created_at.desc",
            user_id
        );

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| NotificationError::DatabaseError(e.to_string()))?;

        result.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Notification>, _>>()
            .map_err(|e| NotificationError::DatabaseError(format!("Failed to parse notifications: {}", e)))
    }

    async fn insert_notification(&self, data: Value, auth_token: &str) -> Result<(), NotificationError> {
        self.supabase.insert_returning("notifications", Some(auth_token), data)
            .await
            .map_err(|e| NotificationError::DatabaseError(e.to_string()))?;
        Ok(())
    }
}
