// libs/schedule-cell/src/services/catalog.rs
use chrono::NaiveTime;
use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::models::{ScheduleError, ShiftDefinition};

/// Read-only lookup over the fixed shift catalog. Shift windows are
/// non-overlapping, so at most one definition can cover a given time.
pub struct ShiftCatalogService {
    supabase: Arc<SupabaseClient>,
}

impl ShiftCatalogService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    pub async fn list_shifts(&self, auth_token: &str) -> Result<Vec<ShiftDefinition>, ScheduleError> {
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            "/rest/v1/shifts?order=start_time.asc",
            Some(auth_token),
            None,
        ).await.map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        result.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<ShiftDefinition>, _>>()
            .map_err(|e| ScheduleError::DatabaseError(format!("Failed to parse shifts: {}", e)))
    }

    pub async fn get_shift(&self, shift_id: Uuid, auth_token: &str) -> Result<ShiftDefinition, ScheduleError> {
        let path = format!("/rest/v1/shifts?id=eq.{}", shift_id);
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        let Some(row) = result.into_iter().next() else {
            return Err(ScheduleError::ShiftNotFound);
        };

        serde_json::from_value(row)
            .map_err(|e| ScheduleError::DatabaseError(format!("Failed to parse shift: {}", e)))
    }

    /// Resolve the shift whose window contains the given time of day.
    /// A time outside every window is a booking-window validation failure.
    pub async fn find_shift_covering(
        &self,
        time_of_day: NaiveTime,
        auth_token: &str,
    ) -> Result<ShiftDefinition, ScheduleError> {
        debug!("Resolving shift window for {}", time_of_day);

        let shifts = self.list_shifts(auth_token).await?;

        shifts.into_iter()
            .find(|shift| shift.covers(time_of_day))
            .ok_or(ScheduleError::InvalidBookingWindow)
    }
}
