// libs/schedule-cell/src/services/assigner.rs
use chrono::{NaiveDate, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::lock::SchedulingLockService;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    AssignmentStatus, CreateScheduleRequest, CreateScheduleResponse, DoctorShiftAssignment,
    ScheduleError, ScheduledDoctor, ShiftScheduleView, SkippedAssignment,
    UpdateScheduleRangeRequest, UpdateScheduleRangeResponse,
};
use crate::services::catalog::ShiftCatalogService;
use crate::services::conflict::ConflictCheckerService;

/// Creates and regroups doctor-shift assignments. Every conflict check and
/// its write run under a keyed lock on (doctor, shift) so concurrent
/// administrators cannot both pass the check before either persists.
pub struct ScheduleAssignerService {
    supabase: Arc<SupabaseClient>,
    catalog: ShiftCatalogService,
    conflict_checker: ConflictCheckerService,
    locks: SchedulingLockService,
}

impl ScheduleAssignerService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));

        Self {
            catalog: ShiftCatalogService::new(Arc::clone(&supabase)),
            conflict_checker: ConflictCheckerService::new(Arc::clone(&supabase)),
            locks: SchedulingLockService::new(Arc::clone(&supabase)),
            supabase,
        }
    }

    /// Batch create: one assignment spanning the whole range per
    /// (shift, doctor) pair. Conflicting pairs are skipped, not failed;
    /// the response reports how many rows were actually created plus the
    /// skipped triples for observability.
    pub async fn create_schedule(
        &self,
        request: CreateScheduleRequest,
        auth_token: &str,
    ) -> Result<CreateScheduleResponse, ScheduleError> {
        self.validate_range(request.from_date, request.to_date)?;

        info!("Creating schedule from {} to {} across {} shift groups",
              request.from_date, request.to_date, request.shift_groups.len());

        let mut created_count = 0;
        let mut skipped = Vec::new();

        for group in &request.shift_groups {
            for &doctor_id in &group.doctor_ids {
                let created = self.try_create_assignment(
                    doctor_id,
                    group.shift_id,
                    request.from_date,
                    Some(request.to_date),
                    auth_token,
                ).await?;

                if created {
                    created_count += 1;
                } else {
                    skipped.push(SkippedAssignment {
                        doctor_id,
                        shift_id: group.shift_id,
                        effective_from: request.from_date,
                        effective_to: Some(request.to_date),
                    });
                }
            }
        }

        info!("Schedule creation finished: {} created, {} skipped",
              created_count, skipped.len());

        Ok(CreateScheduleResponse { created_count, skipped })
    }

    /// Day-granularity variant: one single-day assignment per
    /// (date, shift, doctor) triple. The (doctor, shift) lock is held across
    /// the whole date loop so the per-day checks stay serializable.
    pub async fn create_daily_schedule(
        &self,
        request: CreateScheduleRequest,
        auth_token: &str,
    ) -> Result<CreateScheduleResponse, ScheduleError> {
        self.validate_range(request.from_date, request.to_date)?;

        let mut created_count = 0;
        let mut skipped = Vec::new();

        for group in &request.shift_groups {
            for &doctor_id in &group.doctor_ids {
                let lock_key = assignment_lock_key(doctor_id, group.shift_id);

                let acquired = self.locks.acquire_with_retry(&lock_key, auth_token)
                    .await
                    .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

                if !acquired {
                    warn!("Lock contended for doctor {} shift {}, skipping pair",
                          doctor_id, group.shift_id);
                    skipped.push(SkippedAssignment {
                        doctor_id,
                        shift_id: group.shift_id,
                        effective_from: request.from_date,
                        effective_to: Some(request.to_date),
                    });
                    continue;
                }

                let outcome = self.create_days_for_pair(
                    doctor_id,
                    group.shift_id,
                    request.from_date,
                    request.to_date,
                    auth_token,
                    &mut created_count,
                    &mut skipped,
                ).await;

                self.release_lock(&lock_key, auth_token).await;
                outcome?;
            }
        }

        info!("Daily schedule creation finished: {} created, {} skipped",
              created_count, skipped.len());

        Ok(CreateScheduleResponse { created_count, skipped })
    }

    /// Update an existing group identified by the exact (shift, old range).
    ///
    /// When the end date changes, the whole group is retired and re-created
    /// over (max(today, old_from), new_to) for the updated roster. When it
    /// stays the same, removed doctors are trimmed to yesterday and added
    /// doctors get a fresh assignment over the unchanged range.
    pub async fn update_range(
        &self,
        shift_id: Uuid,
        request: UpdateScheduleRangeRequest,
        auth_token: &str,
    ) -> Result<UpdateScheduleRangeResponse, ScheduleError> {
        let group_filter = group_filter(shift_id, request.old_from, request.old_to);
        let group = self.fetch_assignments(&group_filter, auth_token).await?;

        if group.is_empty() {
            return Err(ScheduleError::RangeNotFound);
        }

        debug!("Updating schedule range for shift {}: {} existing assignments",
               shift_id, group.len());

        if request.new_to != request.old_to {
            let deactivated_count = self.deactivate_group(&group_filter, auth_token).await?;

            let today = Utc::now().date_naive();
            let new_from = request.old_from.max(today);

            let mut roster: Vec<Uuid> = group.iter().map(|a| a.doctor_id).collect();
            for id in &request.add_doctor_ids {
                if !roster.contains(id) {
                    roster.push(*id);
                }
            }
            roster.retain(|id| !request.remove_doctor_ids.contains(id));

            let mut created_count = 0;
            let mut skipped = Vec::new();

            for doctor_id in roster {
                if self.try_create_assignment(doctor_id, shift_id, new_from, request.new_to, auth_token).await? {
                    created_count += 1;
                } else {
                    skipped.push(SkippedAssignment {
                        doctor_id,
                        shift_id,
                        effective_from: new_from,
                        effective_to: request.new_to,
                    });
                }
            }

            return Ok(UpdateScheduleRangeResponse {
                regrouped: true,
                created_count,
                deactivated_count,
                skipped,
            });
        }

        let yesterday = Utc::now().date_naive().pred_opt()
            .ok_or_else(|| ScheduleError::InvalidDateRange("date underflow".to_string()))?;

        let mut deactivated_count = 0;
        for assignment in group.iter().filter(|a| request.remove_doctor_ids.contains(&a.doctor_id)) {
            self.trim_assignment(assignment.id, yesterday, auth_token).await?;
            deactivated_count += 1;
        }

        let existing: Vec<Uuid> = group.iter().map(|a| a.doctor_id).collect();
        let mut created_count = 0;
        let mut skipped = Vec::new();

        for &doctor_id in request.add_doctor_ids.iter().filter(|id| !existing.contains(id)) {
            if self.try_create_assignment(doctor_id, shift_id, request.old_from, request.old_to, auth_token).await? {
                created_count += 1;
            } else {
                skipped.push(SkippedAssignment {
                    doctor_id,
                    shift_id,
                    effective_from: request.old_from,
                    effective_to: request.old_to,
                });
            }
        }

        Ok(UpdateScheduleRangeResponse {
            regrouped: false,
            created_count,
            deactivated_count,
            skipped,
        })
    }

    /// Active assignments whose range overlaps [from, to].
    pub async fn list_schedules(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<DoctorShiftAssignment>, ScheduleError> {
        let filter = format!(
            "status=eq.active&effective_from=lte.{}&or=(effective_to.is.null,effective_to.gte.{})&order=effective_from.asc",
            to, from
        );
        self.fetch_assignments(&filter, auth_token).await
    }

    /// Presentation view: assignments grouped under their shift window,
    /// open-ended ranges displayed as one month from their start.
    pub async fn get_schedule_board(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<ShiftScheduleView>, ScheduleError> {
        let shifts = self.catalog.list_shifts(auth_token).await?;
        let assignments = self.list_schedules(from, to, auth_token).await?;

        Ok(shifts.into_iter()
            .map(|shift| {
                let doctors = assignments.iter()
                    .filter(|a| a.shift_id == shift.id)
                    .map(|a| ScheduledDoctor {
                        assignment_id: a.id,
                        doctor_id: a.doctor_id,
                        effective_from: a.effective_from,
                        effective_to: a.display_effective_to(),
                    })
                    .collect();
                ShiftScheduleView { shift, doctors }
            })
            .collect())
    }

    pub async fn check_conflict(
        &self,
        doctor_id: Uuid,
        shift_id: Uuid,
        from: NaiveDate,
        to: Option<NaiveDate>,
        auth_token: &str,
    ) -> Result<bool, ScheduleError> {
        self.conflict_checker.has_conflict(doctor_id, shift_id, from, to, auth_token).await
    }

    pub fn catalog(&self) -> &ShiftCatalogService {
        &self.catalog
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    fn validate_range(&self, from: NaiveDate, to: NaiveDate) -> Result<(), ScheduleError> {
        if from > to {
            return Err(ScheduleError::InvalidDateRange(
                format!("from date {} is after to date {}", from, to)
            ));
        }
        Ok(())
    }

    /// Conflict check + insert as one unit under the (doctor, shift) lock.
    /// Returns false when the pair was skipped (overlap or lock contention).
    async fn try_create_assignment(
        &self,
        doctor_id: Uuid,
        shift_id: Uuid,
        from: NaiveDate,
        to: Option<NaiveDate>,
        auth_token: &str,
    ) -> Result<bool, ScheduleError> {
        let lock_key = assignment_lock_key(doctor_id, shift_id);

        let acquired = self.locks.acquire_with_retry(&lock_key, auth_token)
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        if !acquired {
            warn!("Lock contended for doctor {} shift {}, skipping", doctor_id, shift_id);
            return Ok(false);
        }

        let outcome = self.create_if_free(doctor_id, shift_id, from, to, auth_token).await;
        self.release_lock(&lock_key, auth_token).await;
        outcome
    }

    async fn create_if_free(
        &self,
        doctor_id: Uuid,
        shift_id: Uuid,
        from: NaiveDate,
        to: Option<NaiveDate>,
        auth_token: &str,
    ) -> Result<bool, ScheduleError> {
        if self.conflict_checker.has_conflict(doctor_id, shift_id, from, to, auth_token).await? {
            return Ok(false);
        }

        self.create_assignment_record(doctor_id, shift_id, from, to, auth_token).await?;
        Ok(true)
    }

    async fn create_days_for_pair(
        &self,
        doctor_id: Uuid,
        shift_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
        auth_token: &str,
        created_count: &mut usize,
        skipped: &mut Vec<SkippedAssignment>,
    ) -> Result<(), ScheduleError> {
        let mut date = from;
        loop {
            if self.create_if_free(doctor_id, shift_id, date, Some(date), auth_token).await? {
                *created_count += 1;
            } else {
                skipped.push(SkippedAssignment {
                    doctor_id,
                    shift_id,
                    effective_from: date,
                    effective_to: Some(date),
                });
            }

            if date >= to {
                break;
            }
            date = date.succ_opt()
                .ok_or_else(|| ScheduleError::InvalidDateRange("date overflow".to_string()))?;
        }

        Ok(())
    }

    async fn create_assignment_record(
        &self,
        doctor_id: Uuid,
        shift_id: Uuid,
        from: NaiveDate,
        to: Option<NaiveDate>,
        auth_token: &str,
    ) -> Result<DoctorShiftAssignment, ScheduleError> {
        let now = Utc::now();
        let assignment_data = json!({
            "doctor_id": doctor_id,
            "shift_id": shift_id,
            "effective_from": from,
            "effective_to": to,
            "status": AssignmentStatus::Active.to_string(),
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339()
        });

        let result = self.supabase.insert_returning("doctor_shifts", Some(auth_token), assignment_data)
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        let Some(row) = result.into_iter().next() else {
            return Err(ScheduleError::DatabaseError("Failed to create assignment".to_string()));
        };

        serde_json::from_value(row)
            .map_err(|e| ScheduleError::DatabaseError(format!("Failed to parse created assignment: {}", e)))
    }

    async fn fetch_assignments(
        &self,
        filter: &str,
        auth_token: &str,
    ) -> Result<Vec<DoctorShiftAssignment>, ScheduleError> {
        let path = format!("/rest/v1/doctor_shifts?{}", filter);

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        result.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<DoctorShiftAssignment>, _>>()
            .map_err(|e| ScheduleError::DatabaseError(format!("Failed to parse assignments: {}", e)))
    }

    async fn deactivate_group(&self, filter: &str, auth_token: &str) -> Result<usize, ScheduleError> {
        let update_data = json!({
            "status": AssignmentStatus::Inactive.to_string(),
            "updated_at": Utc::now().to_rfc3339()
        });

        let result = self.supabase.update_returning("doctor_shifts", filter, Some(auth_token), update_data)
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        Ok(result.len())
    }

    /// Shorten an assignment so its range ends before today, then retire it.
    async fn trim_assignment(
        &self,
        assignment_id: Uuid,
        new_to: NaiveDate,
        auth_token: &str,
    ) -> Result<(), ScheduleError> {
        let update_data = json!({
            "effective_to": new_to,
            "status": AssignmentStatus::Inactive.to_string(),
            "updated_at": Utc::now().to_rfc3339()
        });

        let filter = format!("id=eq.{}", assignment_id);
        let result = self.supabase.update_returning("doctor_shifts", &filter, Some(auth_token), update_data)
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(ScheduleError::DatabaseError(
                format!("Failed to trim assignment {}", assignment_id)
            ));
        }

        Ok(())
    }

    async fn release_lock(&self, lock_key: &str, auth_token: &str) {
        if let Err(e) = self.locks.release(lock_key, auth_token).await {
            warn!("Failed to release scheduling lock {}: {}", lock_key, e);
        }
    }
}

fn assignment_lock_key(doctor_id: Uuid, shift_id: Uuid) -> String {
    format!("assign_{}_{}", doctor_id, shift_id)
}

fn group_filter(shift_id: Uuid, old_from: NaiveDate, old_to: Option<NaiveDate>) -> String {
    match old_to {
        Some(to) => format!(
            "shift_id=eq.{}&effective_from=eq.{}&effective_to=eq.{}&status=eq.active",
            shift_id, old_from, to
        ),
        None => format!(
            "shift_id=eq.{}&effective_from=eq.{}&effective_to=is.null&status=eq.active",
            shift_id, old_from
        ),
    }
}
