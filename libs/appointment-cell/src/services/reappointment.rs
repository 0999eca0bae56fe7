// libs/appointment-cell/src/services/reappointment.rs
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use notification_cell::NotificationService;
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    Appointment, AppointmentError, BookAppointmentRequest, CreateReappointmentRequest,
    ReappointmentListQuery, ReappointmentRequest,
};
use crate::services::booking::AppointmentBookingService;

/// Bridges a doctor's "come back" instruction to an actual follow-up
/// booking. Requests stay open until the front desk confirms them, and
/// confirmation goes through the normal booking pipeline so every capacity
/// rule applies.
pub struct ReappointmentService {
    supabase: Arc<SupabaseClient>,
    booking: AppointmentBookingService,
    notifications: NotificationService,
}

impl ReappointmentService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        Self {
            booking: AppointmentBookingService::new(config),
            notifications: NotificationService::new(supabase.clone()),
            supabase,
        }
    }

    /// Record a reappointment request against an existing appointment.
    /// Patient and doctor are taken from that appointment, never from the
    /// caller.
    pub async fn create_reappointment(
        &self,
        request: CreateReappointmentRequest,
        auth_token: &str,
    ) -> Result<ReappointmentRequest, AppointmentError> {
        let source = self.booking.get_appointment(request.appointment_id, auth_token).await?;

        let rows = self
            .supabase
            .insert_returning(
                "reappointment_requests",
                Some(auth_token),
                json!({
                    "appointment_id": source.id,
                    "patient_id": source.patient_id,
                    "doctor_id": source.doctor_id,
                    "preferred_date": request.preferred_date,
                    "notes": request.notes,
                    "completed": false,
                    "created_at": Utc::now().to_rfc3339()
                }),
            )
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| AppointmentError::DatabaseError("Insert returned no row".to_string()))?;

        let created: ReappointmentRequest = serde_json::from_value(row)
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse reappointment: {}", e)))?;

        info!(
            "Reappointment request {} created for patient {} by doctor {}",
            created.id, created.patient_id, created.doctor_id
        );

        if let Err(e) = self.notifications.notify_role(
            "front_desk",
            "Follow-up visit requested",
            "A doctor has requested a follow-up visit for a patient",
            auth_token,
        ).await {
            warn!("Failed to notify front desk about reappointment {}: {}", created.id, e);
        }

        Ok(created)
    }

    /// Book the follow-up appointment and close the request. Booking runs
    /// first; a request is only marked completed once the appointment exists.
    pub async fn confirm_reappointment(
        &self,
        reappointment_id: Uuid,
        appointment_date: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let request = self.get_reappointment(reappointment_id, auth_token).await?;
        if request.completed {
            return Err(AppointmentError::ReappointmentAlreadyCompleted);
        }

        let appointment = self.booking.book_appointment(
            BookAppointmentRequest {
                patient_id: request.patient_id,
                doctor_id: request.doctor_id,
                appointment_date,
                notes: request.notes.clone(),
            },
            auth_token,
        ).await?;

        let filter = format!("id=eq.{}&completed=eq.false", reappointment_id);
        let updated = self
            .supabase
            .update_returning(
                "reappointment_requests",
                &filter,
                Some(auth_token),
                json!({ "completed": true }),
            )
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        if updated.is_empty() {
            // A racing confirm closed the request after our read; the
            // appointment we just booked stands either way.
            warn!("Reappointment {} was completed concurrently", reappointment_id);
        }

        info!(
            "Reappointment {} confirmed as appointment {}",
            reappointment_id, appointment.id
        );

        if let Err(e) = self.notifications.notify_user(
            request.patient_id,
            "Follow-up visit booked",
            &format!("Your follow-up visit is booked for {}", appointment_date),
            auth_token,
        ).await {
            warn!("Failed to notify patient {} about reappointment {}: {}",
                  request.patient_id, reappointment_id, e);
        }

        Ok(appointment)
    }

    pub async fn get_reappointment(
        &self,
        reappointment_id: Uuid,
        auth_token: &str,
    ) -> Result<ReappointmentRequest, AppointmentError> {
        let path = format!("/rest/v1/reappointment_requests?id=eq.{}", reappointment_id);
        let rows = self.fetch_reappointments(&path, auth_token).await?;
        rows.into_iter()
            .next()
            .ok_or(AppointmentError::ReappointmentNotFound)
    }

    pub async fn list_reappointments(
        &self,
        query: &ReappointmentListQuery,
        auth_token: &str,
    ) -> Result<Vec<ReappointmentRequest>, AppointmentError> {
        let mut path = "/rest/v1/reappointment_requests?order=created_at.desc".to_string();
        if let Some(completed) = query.completed {
            path.push_str(&format!("&completed=eq.{}", completed));
        }
        if let Some(doctor_id) = query.doctor_id {
            path.push_str(&format!("&doctor_id=eq.{}", doctor_id));
        }
        self.fetch_reappointments(&path, auth_token).await
    }

    async fn fetch_reappointments(
        &self,
        path: &str,
        auth_token: &str,
    ) -> Result<Vec<ReappointmentRequest>, AppointmentError> {
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        rows.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<ReappointmentRequest>, _>>()
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse reappointments: {}", e)))
    }
}
