// libs/appointment-cell/src/services/capacity.rs
use chrono::{DateTime, Duration, NaiveDate, Utc};
use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use schedule_cell::{ScheduleError, ShiftCatalogService, ShiftDefinition};
use shared_database::supabase::SupabaseClient;

use crate::models::{Appointment, AppointmentError, CapacityRules};

/// Enforces the clinic's booking limits before any appointment write.
/// Callers are expected to hold the slot's advisory lock while checking,
/// otherwise two concurrent bookings can both pass.
pub struct AppointmentCapacityGuard {
    supabase: Arc<SupabaseClient>,
    catalog: ShiftCatalogService,
    rules: CapacityRules,
}

impl AppointmentCapacityGuard {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self {
            catalog: ShiftCatalogService::new(supabase.clone()),
            supabase,
            rules: CapacityRules::default(),
        }
    }

    pub fn rules(&self) -> &CapacityRules {
        &self.rules
    }

    /// Resolve the shift window an appointment time falls into.
    pub async fn resolve_shift(
        &self,
        when: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<ShiftDefinition, AppointmentError> {
        self.catalog
            .find_shift_covering(when.time(), auth_token)
            .await
            .map_err(|e| match e {
                ScheduleError::InvalidBookingWindow => AppointmentError::InvalidBookingWindow,
                other => AppointmentError::DatabaseError(other.to_string()),
            })
    }

    /// Run every capacity rule for a prospective (patient, doctor, time)
    /// booking. `exclude` removes one appointment from all counts, so a
    /// reschedule never collides with itself.
    pub async fn check_booking(
        &self,
        patient_id: Uuid,
        doctor_id: Uuid,
        when: DateTime<Utc>,
        shift: &ShiftDefinition,
        exclude: Option<Uuid>,
        auth_token: &str,
    ) -> Result<(), AppointmentError> {
        self.check_shift_capacity(doctor_id, when, shift, exclude, auth_token).await?;
        self.check_patient_daily_limit(patient_id, when.date_naive(), exclude, auth_token).await?;
        self.check_patient_doctor_limit(patient_id, doctor_id, exclude, auth_token).await?;
        Ok(())
    }

    /// At most `shift_capacity` non-cancelled appointments per
    /// (doctor, shift, date). Appointments carry timestamps, not shift ids,
    /// so the day's rows are filtered through the shift window here.
    async fn check_shift_capacity(
        &self,
        doctor_id: Uuid,
        when: DateTime<Utc>,
        shift: &ShiftDefinition,
        exclude: Option<Uuid>,
        auth_token: &str,
    ) -> Result<(), AppointmentError> {
        let day = when.date_naive();
        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&status=neq.cancelled{}{}",
            doctor_id,
            day_bounds_filter(day),
            exclude_filter(exclude),
        );

        let day_appointments = self.fetch_appointments(&path, auth_token).await?;
        let in_shift = day_appointments
            .iter()
            .filter(|appt| shift.covers(appt.appointment_date.time()))
            .count();

        debug!(
            "Doctor {} holds {}/{} appointments in shift {} on {}",
            doctor_id, in_shift, self.rules.shift_capacity, shift.shift_type, day
        );

        if in_shift >= self.rules.shift_capacity {
            return Err(AppointmentError::DoctorFullyBooked);
        }
        Ok(())
    }

    /// At most one non-cancelled appointment per patient per calendar day,
    /// across all doctors.
    async fn check_patient_daily_limit(
        &self,
        patient_id: Uuid,
        day: NaiveDate,
        exclude: Option<Uuid>,
        auth_token: &str,
    ) -> Result<(), AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?patient_id=eq.{}&status=neq.cancelled{}{}",
            patient_id,
            day_bounds_filter(day),
            exclude_filter(exclude),
        );

        let existing = self.fetch_appointments(&path, auth_token).await?;
        if existing.len() >= self.rules.patient_daily_limit {
            return Err(AppointmentError::PatientAlreadyBooked);
        }
        Ok(())
    }

    /// All-time cap of non-cancelled appointments per (patient, doctor) pair.
    async fn check_patient_doctor_limit(
        &self,
        patient_id: Uuid,
        doctor_id: Uuid,
        exclude: Option<Uuid>,
        auth_token: &str,
    ) -> Result<(), AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?patient_id=eq.{}&doctor_id=eq.{}&status=neq.cancelled{}",
            patient_id,
            doctor_id,
            exclude_filter(exclude),
        );

        let existing = self.fetch_appointments(&path, auth_token).await?;
        if existing.len() >= self.rules.patient_doctor_limit {
            return Err(AppointmentError::PatientDoctorLimitReached);
        }
        Ok(())
    }

    async fn fetch_appointments(
        &self,
        path: &str,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        rows.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Appointment>, _>>()
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse appointments: {}", e)))
    }
}

/// PostgREST filter clause selecting one calendar day of timestamps.
fn day_bounds_filter(day: NaiveDate) -> String {
    let next_day = day.succ_opt().unwrap_or(day);
    format!(
        "&appointment_date=gte.{}T00:00:00Z&appointment_date=lt.{}T00:00:00Z",
        day, next_day
    )
}

fn exclude_filter(exclude: Option<Uuid>) -> String {
    exclude.map_or(String::new(), |id| format!("&id=neq.{}", id))
}

/// Whether a cancellation placed at `now` gives enough notice before the
/// appointment. Pure so the boundary cases stay testable.
pub fn cancellation_window_open(
    now: DateTime<Utc>,
    appointment_date: DateTime<Utc>,
    notice_hours: i64,
) -> bool {
    appointment_date - now >= Duration::hours(notice_hours)
}
