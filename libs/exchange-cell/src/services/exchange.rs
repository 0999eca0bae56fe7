// libs/exchange-cell/src/services/exchange.rs
use chrono::{NaiveDate, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use notification_cell::NotificationService;
use schedule_cell::DoctorShiftAssignment;
use shared_config::AppConfig;
use shared_database::lock::SchedulingLockService;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    first_day_of_next_month, CreateExchangeRequest, ExchangeError, ExchangeStatus,
    ReviewDecision, ShiftExchangeRequest, SwapType,
};

/// Lifecycle of a shift trade between two doctors: validated create,
/// single terminal review, notifications on both transitions.
pub struct ShiftExchangeService {
    supabase: Arc<SupabaseClient>,
    locks: SchedulingLockService,
    notifications: NotificationService,
}

impl ShiftExchangeService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        Self {
            locks: SchedulingLockService::new(supabase.clone()),
            notifications: NotificationService::new(supabase.clone()),
            supabase,
        }
    }

    /// Validate and persist a new exchange request as Pending.
    ///
    /// Validation order is fixed: self-swap, specialty match,
    /// duplicate-pending for the pair and date, then the swap-type date
    /// rules against both referenced assignments. The duplicate check and
    /// the insert run under a pair lock so two simultaneous submissions
    /// cannot both pass it.
    pub async fn create_exchange(
        &self,
        request: CreateExchangeRequest,
        auth_token: &str,
    ) -> Result<ShiftExchangeRequest, ExchangeError> {
        if request.doctor1_id == request.doctor2_id {
            return Err(ExchangeError::SelfSwap);
        }

        let specialty1 = self.fetch_doctor_specialty(request.doctor1_id, auth_token).await?;
        let specialty2 = self.fetch_doctor_specialty(request.doctor2_id, auth_token).await?;
        if !specialty1.eq_ignore_ascii_case(&specialty2) {
            debug!(
                "Rejecting exchange: specialty mismatch ({} vs {})",
                specialty1, specialty2
            );
            return Err(ExchangeError::SpecialtyMismatch);
        }

        // Permanent trades take effect on the next month boundary; temporary
        // ones need an explicit date.
        let exchange_date = match request.swap_type {
            SwapType::Permanent => first_day_of_next_month(Utc::now().date_naive()),
            SwapType::Temporary => request
                .exchange_date
                .ok_or(ExchangeError::ExchangeDateRequired)?,
        };

        let lock_key = exchange_lock_key(request.doctor1_id, request.doctor2_id, exchange_date);
        let acquired = self
            .locks
            .acquire_with_retry(&lock_key, auth_token)
            .await
            .map_err(|e| ExchangeError::DatabaseError(e.to_string()))?;
        if !acquired {
            return Err(ExchangeError::LockContended);
        }

        let outcome = self
            .validate_and_create(&request, exchange_date, auth_token)
            .await;

        if let Err(e) = self.locks.release(&lock_key, auth_token).await {
            warn!("Failed to release exchange lock {}: {}", lock_key, e);
        }

        let created = outcome?;
        info!(
            "Exchange request {} created: {} <-> {} ({}) on {}",
            created.id, created.doctor1_id, created.doctor2_id, created.swap_type, exchange_date
        );

        // Reviewers learn about new requests via the notification sink;
        // delivery failures never undo the create.
        if let Err(e) = self.notifications.notify_role(
            "scheduler",
            "Shift exchange requested",
            &format!(
                "A {} shift exchange between two doctors awaits review for {}",
                created.swap_type, exchange_date
            ),
            auth_token,
        ).await {
            warn!("Failed to notify reviewers about exchange {}: {}", created.id, e);
        }

        Ok(created)
    }

    /// Apply a terminal review decision to a pending request.
    ///
    /// Approval records the decision; materializing the swap (rewriting the
    /// two doctor_shifts rows) is the schedule assigner's job, driven off
    /// approved requests.
    pub async fn review_exchange(
        &self,
        exchange_id: Uuid,
        decision: ReviewDecision,
        auth_token: &str,
    ) -> Result<ShiftExchangeRequest, ExchangeError> {
        let existing = self.get_exchange(exchange_id, auth_token).await?;
        if existing.status.is_terminal() {
            return Err(ExchangeError::AlreadyProcessed);
        }

        // The pending filter makes the update conditional: a racing reviewer
        // leaves us with zero updated rows instead of a double transition.
        let filter = format!("id=eq.{}&status=eq.pending", exchange_id);
        let updated = self
            .supabase
            .update_returning(
                "shift_exchange_requests",
                &filter,
                Some(auth_token),
                json!({ "status": decision.to_string() }),
            )
            .await
            .map_err(|e| ExchangeError::DatabaseError(e.to_string()))?;

        let Some(row) = updated.into_iter().next() else {
            return Err(ExchangeError::AlreadyProcessed);
        };

        let reviewed: ShiftExchangeRequest = serde_json::from_value(row)
            .map_err(|e| ExchangeError::DatabaseError(format!("Failed to parse exchange request: {}", e)))?;

        info!("Exchange request {} reviewed: {}", exchange_id, decision);

        let title = "Shift exchange reviewed";
        let body = format!("Your shift exchange request was {}", decision);
        for doctor_id in [reviewed.doctor1_id, reviewed.doctor2_id] {
            if let Err(e) = self.notifications
                .notify_user(doctor_id, title, &body, auth_token)
                .await
            {
                warn!("Failed to notify doctor {} about exchange {}: {}", doctor_id, exchange_id, e);
            }
        }

        Ok(reviewed)
    }

    pub async fn get_exchange(
        &self,
        exchange_id: Uuid,
        auth_token: &str,
    ) -> Result<ShiftExchangeRequest, ExchangeError> {
        let path = format!("/rest/v1/shift_exchange_requests?id=eq.{}", exchange_id);
        let rows = self.fetch_exchanges(&path, auth_token).await?;
        rows.into_iter().next().ok_or(ExchangeError::NotFound)
    }

    pub async fn list_exchanges(
        &self,
        status: Option<ExchangeStatus>,
        auth_token: &str,
    ) -> Result<Vec<ShiftExchangeRequest>, ExchangeError> {
        let mut path = "/rest/v1/shift_exchange_requests?order=exchange_date.asc".to_string();
        if let Some(status) = status {
            path.push_str(&format!("&status=eq.{}", status));
        }
        self.fetch_exchanges(&path, auth_token).await
    }

    /// Every request a doctor is involved in, on either side of the trade.
    pub async fn list_for_doctor(
        &self,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<ShiftExchangeRequest>, ExchangeError> {
        let path = format!(
            "/rest/v1/shift_exchange_requests?or=(doctor1_id.eq.{},doctor2_id.eq.{})&order=exchange_date.asc",
            doctor_id, doctor_id
        );
        self.fetch_exchanges(&path, auth_token).await
    }

    // ==========================================================================
    // INTERNAL HELPERS
    // ==========================================================================

    async fn validate_and_create(
        &self,
        request: &CreateExchangeRequest,
        exchange_date: NaiveDate,
        auth_token: &str,
    ) -> Result<ShiftExchangeRequest, ExchangeError> {
        let path = format!(
            "/rest/v1/shift_exchange_requests?doctor1_id=eq.{}&doctor2_id=eq.{}&exchange_date=eq.{}&status=eq.pending",
            request.doctor1_id, request.doctor2_id, exchange_date
        );
        let pending = self.fetch_exchanges(&path, auth_token).await?;
        if !pending.is_empty() {
            return Err(ExchangeError::DuplicatePending);
        }

        let assignment1 = self
            .fetch_assignment(request.doctor1_shift_ref, request.doctor1_id, auth_token)
            .await?;
        let assignment2 = self
            .fetch_assignment(request.doctor2_shift_ref, request.doctor2_id, auth_token)
            .await?;

        match request.swap_type {
            SwapType::Permanent => {
                // Both periods must not have started yet.
                if assignment1.effective_from < exchange_date
                    || assignment2.effective_from < exchange_date
                {
                    return Err(ExchangeError::PermanentSwapNotFuture);
                }
            }
            SwapType::Temporary => {
                if !assignment1.covers_date(exchange_date) {
                    return Err(ExchangeError::ShiftNotHeld {
                        doctor_id: request.doctor1_id,
                    });
                }
                if !assignment2.covers_date(exchange_date) {
                    return Err(ExchangeError::ShiftNotHeld {
                        doctor_id: request.doctor2_id,
                    });
                }
            }
        }

        let rows = self
            .supabase
            .insert_returning(
                "shift_exchange_requests",
                Some(auth_token),
                json!({
                    "doctor1_id": request.doctor1_id,
                    "doctor2_id": request.doctor2_id,
                    "doctor1_shift_ref": request.doctor1_shift_ref,
                    "doctor2_shift_ref": request.doctor2_shift_ref,
                    "exchange_date": exchange_date,
                    "swap_type": request.swap_type.to_string(),
                    "status": ExchangeStatus::Pending.to_string(),
                    "created_at": Utc::now().to_rfc3339()
                }),
            )
            .await
            .map_err(|e| ExchangeError::DatabaseError(e.to_string()))?;

        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| ExchangeError::DatabaseError("Insert returned no row".to_string()))?;

        serde_json::from_value(row)
            .map_err(|e| ExchangeError::DatabaseError(format!("Failed to parse exchange request: {}", e)))
    }

    async fn fetch_exchanges(
        &self,
        path: &str,
        auth_token: &str,
    ) -> Result<Vec<ShiftExchangeRequest>, ExchangeError> {
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, path, Some(auth_token), None)
            .await
            .map_err(|e| ExchangeError::DatabaseError(e.to_string()))?;

        rows.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<ShiftExchangeRequest>, _>>()
            .map_err(|e| ExchangeError::DatabaseError(format!("Failed to parse exchange requests: {}", e)))
    }

    async fn fetch_doctor_specialty(
        &self,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<String, ExchangeError> {
        let path = format!("/rest/v1/doctors?id=eq.{}&select=id,specialty", doctor_id);
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ExchangeError::DatabaseError(e.to_string()))?;

        rows.first()
            .and_then(|row| row.get("specialty"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or(ExchangeError::DoctorNotFound)
    }

    /// Fetch an assignment by id and confirm it belongs to the given doctor.
    async fn fetch_assignment(
        &self,
        assignment_id: Uuid,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<DoctorShiftAssignment, ExchangeError> {
        let path = format!(
            "/rest/v1/doctor_shifts?id=eq.{}&doctor_id=eq.{}",
            assignment_id, doctor_id
        );
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ExchangeError::DatabaseError(e.to_string()))?;

        let row = rows.into_iter().next().ok_or(ExchangeError::AssignmentNotFound)?;
        serde_json::from_value(row)
            .map_err(|e| ExchangeError::DatabaseError(format!("Failed to parse assignment: {}", e)))
    }
}

fn exchange_lock_key(doctor1_id: Uuid, doctor2_id: Uuid, exchange_date: NaiveDate) -> String {
    format!("exchange_{}_{}_{}", doctor1_id, doctor2_id, exchange_date)
}
