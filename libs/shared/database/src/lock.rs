use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::supabase::SupabaseClient;

/// Keyed advisory locks backed by a `scheduling_locks` table with a unique
/// constraint on `lock_key`. A lock is held for the duration of one
/// check-then-commit unit so no interleaving write can slip between the
/// check and the commit for the same key.
pub struct SchedulingLockService {
    supabase: Arc<SupabaseClient>,
    lock_timeout_seconds: i64,
    max_retry_attempts: u32,
}

impl SchedulingLockService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self {
            supabase,
            lock_timeout_seconds: 30,
            max_retry_attempts: 3,
        }
    }

    /// Try to take the lock, retrying with backoff while another holder is
    /// active. Returns false when the key stayed contended through all
    /// attempts.
    pub async fn acquire_with_retry(&self, lock_key: &str, auth_token: &str) -> Result<bool> {
        for attempt in 1..=self.max_retry_attempts {
            if self.try_acquire(lock_key, auth_token).await? {
                debug!("Scheduling lock acquired: {}", lock_key);
                return Ok(true);
            }

            // The row may belong to a crashed holder; reap it and retry.
            if self.reap_if_expired(lock_key, auth_token).await? {
                continue;
            }

            warn!("Scheduling lock contended ({}), attempt {}/{}",
                  lock_key, attempt, self.max_retry_attempts);
            tokio::time::sleep(std::time::Duration::from_millis(100 * attempt as u64)).await;
        }

        Ok(false)
    }

    pub async fn release(&self, lock_key: &str, auth_token: &str) -> Result<()> {
        let _: Value = self.supabase.request(
            Method::DELETE,
            &format!("/rest/v1/scheduling_locks?lock_key=eq.{}", lock_key),
            Some(auth_token),
            None,
        ).await?;

        debug!("Scheduling lock released: {}", lock_key);
        Ok(())
    }

    /// Delete every expired lock row. Meant to be called opportunistically;
    /// a stale row only ever delays acquisition until its `expires_at`.
    pub async fn cleanup_expired(&self, auth_token: &str) -> Result<u32> {
        let now = Utc::now();

        let response: Value = self.supabase.request(
            Method::DELETE,
            &format!("/rest/v1/scheduling_locks?expires_at=lt.{}", now.to_rfc3339()),
            Some(auth_token),
            None,
        ).await?;

        let cleaned = response.as_array().map(|arr| arr.len() as u32).unwrap_or(0);
        if cleaned > 0 {
            info!("Cleaned up {} expired scheduling locks", cleaned);
        }

        Ok(cleaned)
    }

    async fn try_acquire(&self, lock_key: &str, auth_token: &str) -> Result<bool> {
        let lock_data = json!({
            "lock_key": lock_key,
            "acquired_at": Utc::now().to_rfc3339(),
            "expires_at": (Utc::now() + Duration::seconds(self.lock_timeout_seconds)).to_rfc3339(),
            "process_id": format!("scheduler_{}", Uuid::new_v4())
        });

        // The unique constraint on lock_key makes the insert the arbiter:
        // exactly one concurrent caller wins.
        match self.supabase.request::<Value>(
            Method::POST,
            "/rest/v1/scheduling_locks",
            Some(auth_token),
            Some(lock_data),
        ).await {
            Ok(_) => Ok(true),
            Err(_) => Ok(false),
        }
    }

    async fn reap_if_expired(&self, lock_key: &str, auth_token: &str) -> Result<bool> {
        let response: Value = self.supabase.request(
            Method::GET,
            &format!("/rest/v1/scheduling_locks?lock_key=eq.{}&select=*", lock_key),
            Some(auth_token),
            None,
        ).await?;

        let Some(lock) = response.as_array().and_then(|locks| locks.first()) else {
            // Holder released between our insert attempt and this read.
            return Ok(true);
        };

        if let Some(expires_at) = lock.get("expires_at")
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        {
            if expires_at.with_timezone(&Utc) < Utc::now() {
                self.release(lock_key, auth_token).await?;
                return Ok(true);
            }
        }

        Ok(false)
    }
}
