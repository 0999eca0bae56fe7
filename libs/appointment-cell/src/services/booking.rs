// libs/appointment-cell/src/services/booking.rs
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::lock::SchedulingLockService;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    Appointment, AppointmentError, AppointmentSearchQuery, AppointmentStatus,
    BookAppointmentRequest,
};
use crate::services::capacity::{cancellation_window_open, AppointmentCapacityGuard};

/// Appointment lifecycle: book, reschedule, cancel, restore. Every write
/// that consumes capacity runs its checks under the slot's advisory lock.
pub struct AppointmentBookingService {
    supabase: Arc<SupabaseClient>,
    guard: AppointmentCapacityGuard,
    locks: SchedulingLockService,
}

impl AppointmentBookingService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        Self {
            guard: AppointmentCapacityGuard::new(supabase.clone()),
            locks: SchedulingLockService::new(supabase.clone()),
            supabase,
        }
    }

    pub async fn book_appointment(
        &self,
        request: BookAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        if request.appointment_date <= Utc::now() {
            return Err(AppointmentError::PastAppointmentDate);
        }

        self.verify_patient_exists(request.patient_id, auth_token).await?;
        self.verify_doctor_exists(request.doctor_id, auth_token).await?;

        let shift = self.guard.resolve_shift(request.appointment_date, auth_token).await?;

        let lock_key = capacity_lock_key(
            request.doctor_id,
            shift.id,
            request.appointment_date.date_naive(),
        );
        self.with_slot_lock(&lock_key, auth_token, async {
            self.guard.check_booking(
                request.patient_id,
                request.doctor_id,
                request.appointment_date,
                &shift,
                None,
                auth_token,
            ).await?;

            let appointment = self.insert_appointment(&request, auth_token).await?;
            info!(
                "Appointment {} booked: patient {} with doctor {} at {}",
                appointment.id, appointment.patient_id, appointment.doctor_id,
                appointment.appointment_date
            );
            Ok(appointment)
        }).await
    }

    pub async fn reschedule_appointment(
        &self,
        appointment_id: Uuid,
        new_date: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        if new_date <= Utc::now() {
            return Err(AppointmentError::PastAppointmentDate);
        }

        let existing = self.get_appointment(appointment_id, auth_token).await?;
        if !existing.status.is_open() {
            return Err(AppointmentError::InvalidStatusTransition(
                existing.status.to_string(),
            ));
        }

        let shift = self.guard.resolve_shift(new_date, auth_token).await?;

        let lock_key = capacity_lock_key(existing.doctor_id, shift.id, new_date.date_naive());
        self.with_slot_lock(&lock_key, auth_token, async {
            // The appointment being moved must not count against its own
            // target slot.
            self.guard.check_booking(
                existing.patient_id,
                existing.doctor_id,
                new_date,
                &shift,
                Some(appointment_id),
                auth_token,
            ).await?;

            let updated = self.patch_appointment(
                appointment_id,
                json!({
                    "appointment_date": new_date.to_rfc3339(),
                    "updated_at": Utc::now().to_rfc3339()
                }),
                auth_token,
            ).await?;

            info!("Appointment {} rescheduled to {}", appointment_id, new_date);
            Ok(updated)
        }).await
    }

    pub async fn cancel_appointment(
        &self,
        appointment_id: Uuid,
        reason: Option<String>,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let existing = self.get_appointment(appointment_id, auth_token).await?;
        if !existing.status.is_open() {
            return Err(AppointmentError::InvalidStatusTransition(
                existing.status.to_string(),
            ));
        }

        if !cancellation_window_open(
            Utc::now(),
            existing.appointment_date,
            self.guard.rules().cancellation_notice_hours,
        ) {
            return Err(AppointmentError::CancellationWindowPassed);
        }

        let cancelled = self.patch_appointment(
            appointment_id,
            json!({
                "status": AppointmentStatus::Cancelled.to_string(),
                "cancellation_reason": reason,
                "updated_at": Utc::now().to_rfc3339()
            }),
            auth_token,
        ).await?;

        info!("Appointment {} cancelled", appointment_id);
        Ok(cancelled)
    }

    /// Un-cancel an appointment. The slot may have been taken in the
    /// meantime, so every capacity rule runs again under the lock.
    pub async fn restore_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let existing = self.get_appointment(appointment_id, auth_token).await?;
        if existing.status != AppointmentStatus::Cancelled {
            return Err(AppointmentError::InvalidStatusTransition(
                existing.status.to_string(),
            ));
        }
        if existing.appointment_date <= Utc::now() {
            return Err(AppointmentError::PastAppointmentDate);
        }

        let shift = self.guard.resolve_shift(existing.appointment_date, auth_token).await?;

        let lock_key = capacity_lock_key(
            existing.doctor_id,
            shift.id,
            existing.appointment_date.date_naive(),
        );
        self.with_slot_lock(&lock_key, auth_token, async {
            self.guard.check_booking(
                existing.patient_id,
                existing.doctor_id,
                existing.appointment_date,
                &shift,
                Some(appointment_id),
                auth_token,
            ).await?;

            let restored = self.patch_appointment(
                appointment_id,
                json!({
                    "status": AppointmentStatus::Pending.to_string(),
                    "cancellation_reason": Value::Null,
                    "updated_at": Utc::now().to_rfc3339()
                }),
                auth_token,
            ).await?;

            info!("Appointment {} restored", appointment_id);
            Ok(restored)
        }).await
    }

    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let rows = self.fetch_appointments(&path, auth_token).await?;
        rows.into_iter()
            .next()
            .ok_or(AppointmentError::AppointmentNotFound)
    }

    pub async fn search_appointments(
        &self,
        query: &AppointmentSearchQuery,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let path = build_search_path(query);
        self.fetch_appointments(&path, auth_token).await
    }

    // ==========================================================================
    // INTERNAL HELPERS
    // ==========================================================================

    /// Run `op` while holding an advisory lock, releasing it on both paths.
    async fn with_slot_lock<T>(
        &self,
        lock_key: &str,
        auth_token: &str,
        op: impl std::future::Future<Output = Result<T, AppointmentError>>,
    ) -> Result<T, AppointmentError> {
        let acquired = self
            .locks
            .acquire_with_retry(lock_key, auth_token)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;
        if !acquired {
            return Err(AppointmentError::LockContended);
        }

        let outcome = op.await;

        if let Err(e) = self.locks.release(lock_key, auth_token).await {
            warn!("Failed to release booking lock {}: {}", lock_key, e);
        }

        outcome
    }

    async fn insert_appointment(
        &self,
        request: &BookAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let rows = self
            .supabase
            .insert_returning(
                "appointments",
                Some(auth_token),
                json!({
                    "patient_id": request.patient_id,
                    "doctor_id": request.doctor_id,
                    "appointment_date": request.appointment_date.to_rfc3339(),
                    "status": AppointmentStatus::Pending.to_string(),
                    "notes": request.notes,
                    "created_at": Utc::now().to_rfc3339()
                }),
            )
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| AppointmentError::DatabaseError("Insert returned no row".to_string()))?;

        serde_json::from_value(row)
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse appointment: {}", e)))
    }

    async fn patch_appointment(
        &self,
        appointment_id: Uuid,
        body: Value,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let filter = format!("id=eq.{}", appointment_id);
        let rows = self
            .supabase
            .update_returning("appointments", &filter, Some(auth_token), body)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let row = rows
            .into_iter()
            .next()
            .ok_or(AppointmentError::AppointmentNotFound)?;

        serde_json::from_value(row)
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse appointment: {}", e)))
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

    async fn verify_patient_exists(
        &self,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<(), AppointmentError> {
        let path = format!("/rest/v1/patients?id=eq.{}&select=id", patient_id);
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        if rows.is_empty() {
            return Err(AppointmentError::PatientNotFound);
        }
        Ok(())
    }

    async fn verify_doctor_exists(
        &self,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<(), AppointmentError> {
        let path = format!("/rest/v1/doctors?id=eq.{}&select=id", doctor_id);
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        if rows.is_empty() {
            return Err(AppointmentError::DoctorNotFound);
        }
        Ok(())
    }
}

fn capacity_lock_key(doctor_id: Uuid, shift_id: Uuid, day: NaiveDate) -> String {
    format!("cap_{}_{}_{}", doctor_id, shift_id, day)
}

fn build_search_path(query: &AppointmentSearchQuery) -> String {
    let mut path = "/rest/v1/appointments?order=appointment_date.asc".to_string();

    if let Some(doctor_id) = query.doctor_id {
        path.push_str(&format!("&doctor_id=eq.{}", doctor_id));
    }
    if let Some(patient_id) = query.patient_id {
        path.push_str(&format!("&patient_id=eq.{}", patient_id));
    }
    if let Some(status) = &query.status {
        path.push_str(&format!("&status=eq.{}", status));
    }
    if let Some(from) = query.from_date {
        path.push_str(&format!("&appointment_date=gte.{}T00:00:00Z", from));
    }
    if let Some(to) = query.to_date {
        let upper = to.succ_opt().unwrap_or(to);
        path.push_str(&format!("&appointment_date=lt.{}T00:00:00Z", upper));
    }
    if let Some(notes) = &query.notes {
        path.push_str(&format!("&notes=ilike.{}", urlencoding::encode(&format!("*{}*", notes))));
    }

    path
}
