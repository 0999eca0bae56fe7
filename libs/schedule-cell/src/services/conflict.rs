// libs/schedule-cell/src/services/conflict.rs
use chrono::NaiveDate;
use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::models::{DoctorShiftAssignment, ScheduleError};

/// Inclusive date-range overlap, with a missing end treated as unbounded:
/// from1 <= to2 AND from2 <= to1.
pub fn ranges_overlap(
    a_from: NaiveDate,
    a_to: Option<NaiveDate>,
    b_from: NaiveDate,
    b_to: Option<NaiveDate>,
) -> bool {
    a_from <= b_to.unwrap_or(NaiveDate::MAX) && b_from <= a_to.unwrap_or(NaiveDate::MAX)
}

/// Pure read over active assignments. Must be called before any assignment
/// mutation that could violate the no-overlap invariant for a fixed
/// doctor + shift.
pub struct ConflictCheckerService {
    supabase: Arc<SupabaseClient>,
}

impl ConflictCheckerService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    pub async fn has_conflict(
        &self,
        doctor_id: Uuid,
        shift_id: Uuid,
        from: NaiveDate,
        to: Option<NaiveDate>,
        auth_token: &str,
    ) -> Result<bool, ScheduleError> {
        debug!("Checking assignment conflicts for doctor {} on shift {} from {} to {:?}",
               doctor_id, shift_id, from, to);

        let path = format!(
            "/rest/v1/doctor_shifts?doctor_id=eq.{}&shift_id=eq.{}&status=eq.active",
            doctor_id, shift_id
        );

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        let assignments: Vec<DoctorShiftAssignment> = result.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<DoctorShiftAssignment>, _>>()
            .map_err(|e| ScheduleError::DatabaseError(format!("Failed to parse assignments: {}", e)))?;

        let conflict = assignments.iter()
            .any(|a| ranges_overlap(from, to, a.effective_from, a.effective_to));

        if conflict {
            warn!("Assignment conflict for doctor {} on shift {} in [{}, {:?}]",
                  doctor_id, shift_id, from, to);
        }

        Ok(conflict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn overlapping_ranges_are_detected() {
        // June assignment vs. a single day inside it
        assert!(ranges_overlap(
            d(2024, 6, 15), Some(d(2024, 6, 15)),
            d(2024, 6, 1), Some(d(2024, 6, 30)),
        ));

        // Partial overlap at the boundary day
        assert!(ranges_overlap(
            d(2024, 6, 30), Some(d(2024, 7, 5)),
            d(2024, 6, 1), Some(d(2024, 6, 30)),
        ));
    }

    #[test]
    fn disjoint_ranges_do_not_overlap() {
        assert!(!ranges_overlap(
            d(2024, 7, 1), Some(d(2024, 7, 10)),
            d(2024, 6, 1), Some(d(2024, 6, 30)),
        ));
    }

    #[test]
    fn open_ended_range_overlaps_everything_after_its_start() {
        assert!(ranges_overlap(
            d(2030, 1, 1), Some(d(2030, 1, 2)),
            d(2024, 6, 1), None,
        ));
        assert!(!ranges_overlap(
            d(2024, 5, 1), Some(d(2024, 5, 31)),
            d(2024, 6, 1), None,
        ));
    }

    #[test]
    fn both_open_ended_always_overlap() {
        assert!(ranges_overlap(d(2024, 6, 1), None, d(2030, 1, 1), None));
    }
}
