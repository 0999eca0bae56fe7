// libs/schedule-cell/src/models.rs
use chrono::{Months, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ==============================================================================
// SHIFT CATALOG MODELS
// ==============================================================================

/// Immutable catalog entry describing a clinic-wide time-of-day window
/// (e.g. Morning 08:00-12:00). Never mutated by this cell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftDefinition {
    pub id: Uuid,
    pub shift_type: String,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

impl ShiftDefinition {
    /// Whether a time of day falls inside this shift's window.
    /// Windows are half-open so adjacent shifts never both claim a boundary.
    pub fn covers(&self, time_of_day: NaiveTime) -> bool {
        self.start_time <= time_of_day && time_of_day < self.end_time
    }
}

// ==============================================================================
// ASSIGNMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Active,
    Inactive,
}

impl fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssignmentStatus::Active => write!(f, "active"),
            AssignmentStatus::Inactive => write!(f, "inactive"),
        }
    }
}

/// "Doctor D works shift S from `effective_from` to `effective_to`."
/// A null `effective_to` means open-ended. Rows are deactivated, never
/// deleted, once appointments may reference the period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorShiftAssignment {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub shift_id: Uuid,
    pub effective_from: NaiveDate,
    pub effective_to: Option<NaiveDate>,
    pub status: AssignmentStatus,
}

impl DoctorShiftAssignment {
    /// Whether this assignment is active and its date range contains `date`.
    pub fn covers_date(&self, date: NaiveDate) -> bool {
        self.status == AssignmentStatus::Active
            && self.effective_from <= date
            && self.effective_to.map_or(true, |to| date <= to)
    }

    /// End date used for presentation: open-ended ranges display as one
    /// month from their start.
    pub fn display_effective_to(&self) -> NaiveDate {
        self.effective_to.unwrap_or_else(|| {
            self.effective_from
                .checked_add_months(Months::new(1))
                .unwrap_or(self.effective_from)
        })
    }
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftGroup {
    pub shift_id: Uuid,
    pub doctor_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateScheduleRequest {
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    pub shift_groups: Vec<ShiftGroup>,
}

/// A (doctor, shift, range) triple the batch create declined to persist.
/// Batch creation is best-effort by contract: conflicting triples are
/// skipped, not surfaced as individual errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedAssignment {
    pub doctor_id: Uuid,
    pub shift_id: Uuid,
    pub effective_from: NaiveDate,
    pub effective_to: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateScheduleResponse {
    pub created_count: usize,
    pub skipped: Vec<SkippedAssignment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateScheduleRangeRequest {
    pub old_from: NaiveDate,
    pub old_to: Option<NaiveDate>,
    pub new_to: Option<NaiveDate>,
    #[serde(default)]
    pub add_doctor_ids: Vec<Uuid>,
    #[serde(default)]
    pub remove_doctor_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateScheduleRangeResponse {
    /// True when the end date changed and the whole group was re-created.
    pub regrouped: bool,
    pub created_count: usize,
    pub deactivated_count: usize,
    pub skipped: Vec<SkippedAssignment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleRangeQuery {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConflictCheckQuery {
    pub doctor_id: Uuid,
    pub shift_id: Uuid,
    pub from: NaiveDate,
    pub to: Option<NaiveDate>,
}

// ==============================================================================
// READ VIEWS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledDoctor {
    pub assignment_id: Uuid,
    pub doctor_id: Uuid,
    pub effective_from: NaiveDate,
    pub effective_to: NaiveDate,
}

/// Assignments grouped under their shift window for presentation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftScheduleView {
    pub shift: ShiftDefinition,
    pub doctors: Vec<ScheduledDoctor>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum ScheduleError {
    #[error("Shift not found")]
    ShiftNotFound,

    #[error("No schedule group matches the given shift and date range")]
    RangeNotFound,

    #[error("Timestamp falls outside every shift window")]
    InvalidBookingWindow,

    #[error("Invalid date range: {0}")]
    InvalidDateRange(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shift(start: (u32, u32), end: (u32, u32)) -> ShiftDefinition {
        ShiftDefinition {
            id: Uuid::new_v4(),
            shift_type: "Morning".to_string(),
            start_time: NaiveTime::from_hms_opt(start.0, start.1, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(end.0, end.1, 0).unwrap(),
        }
    }

    #[test]
    fn shift_window_covers_interior_and_start_but_not_end() {
        let morning = shift((8, 0), (12, 0));

        assert!(morning.covers(NaiveTime::from_hms_opt(8, 0, 0).unwrap()));
        assert!(morning.covers(NaiveTime::from_hms_opt(9, 30, 0).unwrap()));
        assert!(!morning.covers(NaiveTime::from_hms_opt(12, 0, 0).unwrap()));
        assert!(!morning.covers(NaiveTime::from_hms_opt(13, 0, 0).unwrap()));
    }

    #[test]
    fn assignment_covers_date_respects_status_and_bounds() {
        let mut assignment = DoctorShiftAssignment {
            id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            shift_id: Uuid::new_v4(),
            effective_from: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            effective_to: Some(NaiveDate::from_ymd_opt(2024, 6, 30).unwrap()),
            status: AssignmentStatus::Active,
        };

        assert!(assignment.covers_date(NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()));
        assert!(assignment.covers_date(NaiveDate::from_ymd_opt(2024, 6, 30).unwrap()));
        assert!(!assignment.covers_date(NaiveDate::from_ymd_opt(2024, 7, 1).unwrap()));

        assignment.status = AssignmentStatus::Inactive;
        assert!(!assignment.covers_date(NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()));
    }

    #[test]
    fn open_ended_assignment_covers_far_future_and_displays_one_month() {
        let assignment = DoctorShiftAssignment {
            id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            shift_id: Uuid::new_v4(),
            effective_from: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            effective_to: None,
            status: AssignmentStatus::Active,
        };

        assert!(assignment.covers_date(NaiveDate::from_ymd_opt(2030, 1, 1).unwrap()));
        assert_eq!(
            assignment.display_effective_to(),
            NaiveDate::from_ymd_opt(2024, 7, 1).unwrap()
        );
    }
}
