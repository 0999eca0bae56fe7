// libs/appointment-cell/src/models.rs
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ==============================================================================
// APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    /// Cancelled appointments stop counting against every capacity rule;
    /// all other statuses keep their slot.
    pub fn is_countable(&self) -> bool {
        !matches!(self, AppointmentStatus::Cancelled)
    }

    /// Only appointments that have not yet run their course can be moved
    /// or cancelled.
    pub fn is_open(&self) -> bool {
        matches!(self, AppointmentStatus::Pending | AppointmentStatus::Confirmed)
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Pending => write!(f, "pending"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::NoShow => write!(f, "no_show"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub appointment_date: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

// ==============================================================================
// CAPACITY RULES
// ==============================================================================

/// Hard limits the capacity guard enforces before any appointment write.
#[derive(Debug, Clone)]
pub struct CapacityRules {
    /// Non-cancelled appointments one doctor may hold per shift per day.
    pub shift_capacity: usize,
    /// Non-cancelled appointments one patient may hold per calendar day.
    pub patient_daily_limit: usize,
    /// All-time non-cancelled appointments per (patient, doctor) pair.
    pub patient_doctor_limit: usize,
    /// Minimum notice before the appointment for a cancellation to be allowed.
    pub cancellation_notice_hours: i64,
}

impl Default for CapacityRules {
    fn default() -> Self {
        Self {
            shift_capacity: 5,
            patient_daily_limit: 1,
            patient_doctor_limit: 5,
            cancellation_notice_hours: 4,
        }
    }
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub appointment_date: DateTime<Utc>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleAppointmentRequest {
    pub new_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelAppointmentRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppointmentSearchQuery {
    pub doctor_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    /// Free-text match against the notes column.
    pub notes: Option<String>,
}

// ==============================================================================
// REAPPOINTMENT MODELS
// ==============================================================================

/// A doctor's instruction that a patient should come back, tracked until
/// the front desk books the follow-up visit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReappointmentRequest {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub preferred_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateReappointmentRequest {
    pub appointment_id: Uuid,
    pub preferred_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmReappointmentRequest {
    pub appointment_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReappointmentListQuery {
    pub completed: Option<bool>,
    pub doctor_id: Option<Uuid>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum AppointmentError {
    #[error("Doctor is fully booked for this shift on this date")]
    DoctorFullyBooked,

    #[error("Patient already has an appointment on this date")]
    PatientAlreadyBooked,

    #[error("Patient has reached the appointment limit with this doctor")]
    PatientDoctorLimitReached,

    #[error("Appointment time falls outside every clinic shift")]
    InvalidBookingWindow,

    #[error("Appointment date must be in the future")]
    PastAppointmentDate,

    #[error("Cancellation window has passed for this appointment")]
    CancellationWindowPassed,

    #[error("Appointment status does not allow this operation: {0}")]
    InvalidStatusTransition(String),

    #[error("Appointment not found")]
    AppointmentNotFound,

    #[error("Patient not found")]
    PatientNotFound,

    #[error("Doctor not found")]
    DoctorNotFound,

    #[error("Reappointment request not found")]
    ReappointmentNotFound,

    #[error("Reappointment request has already been completed")]
    ReappointmentAlreadyCompleted,

    #[error("The booking slot is being processed by another caller, retry shortly")]
    LockContended,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
