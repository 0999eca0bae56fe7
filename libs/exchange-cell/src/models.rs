// libs/exchange-cell/src/models.rs
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ==============================================================================
// EXCHANGE REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum SwapType {
    /// One-day trade tied to a specific exchange date.
    Temporary,
    /// Trade effective from the first day of the following month onward.
    Permanent,
}

impl fmt::Display for SwapType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwapType::Temporary => write!(f, "temporary"),
            SwapType::Permanent => write!(f, "permanent"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeStatus {
    Pending,
    Approved,
    Rejected,
}

impl ExchangeStatus {
    /// Approved and Rejected are terminal; a request is never re-opened.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExchangeStatus::Approved | ExchangeStatus::Rejected)
    }
}

impl fmt::Display for ExchangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExchangeStatus::Pending => write!(f, "pending"),
            ExchangeStatus::Approved => write!(f, "approved"),
            ExchangeStatus::Rejected => write!(f, "rejected"),
        }
    }
}

/// A proposed trade of one doctor's assignment slot with another's.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftExchangeRequest {
    pub id: Uuid,
    pub doctor1_id: Uuid,
    pub doctor2_id: Uuid,
    /// References into doctor_shifts for each side of the trade.
    pub doctor1_shift_ref: Uuid,
    pub doctor2_shift_ref: Uuid,
    pub exchange_date: Option<NaiveDate>,
    pub swap_type: SwapType,
    pub status: ExchangeStatus,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateExchangeRequest {
    pub doctor1_id: Uuid,
    pub doctor2_id: Uuid,
    pub doctor1_shift_ref: Uuid,
    pub doctor2_shift_ref: Uuid,
    pub exchange_date: Option<NaiveDate>,
    pub swap_type: SwapType,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approved,
    Rejected,
}

impl fmt::Display for ReviewDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReviewDecision::Approved => write!(f, "approved"),
            ReviewDecision::Rejected => write!(f, "rejected"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewExchangeRequest {
    pub decision: ReviewDecision,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum ExchangeError {
    #[error("A doctor cannot swap a shift with themselves")]
    SelfSwap,

    #[error("Doctors must share the same specialty to swap shifts")]
    SpecialtyMismatch,

    #[error("A pending exchange request already exists for this pair and date")]
    DuplicatePending,

    #[error("Temporary swaps require an exchange date")]
    ExchangeDateRequired,

    #[error("Permanent swaps are only allowed for assignments starting next month or later")]
    PermanentSwapNotFuture,

    #[error("Doctor {doctor_id} does not hold the referenced shift on the exchange date")]
    ShiftNotHeld { doctor_id: Uuid },

    #[error("Exchange request not found")]
    NotFound,

    #[error("Exchange request has already been processed")]
    AlreadyProcessed,

    #[error("Doctor not found")]
    DoctorNotFound,

    #[error("Referenced shift assignment not found")]
    AssignmentNotFound,

    #[error("Exchange request is being processed by another caller, retry shortly")]
    LockContended,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

/// First day of the calendar month after `date`. Permanent swaps take effect
/// on this boundary and may only reference assignments starting on or after it.
pub fn first_day_of_next_month(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };

    // The first of a month always exists.
    NaiveDate::from_ymd_opt(year, month, 1).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn next_month_boundary_mid_year() {
        assert_eq!(first_day_of_next_month(d(2024, 6, 15)), d(2024, 7, 1));
        assert_eq!(first_day_of_next_month(d(2024, 6, 1)), d(2024, 7, 1));
        assert_eq!(first_day_of_next_month(d(2024, 6, 30)), d(2024, 7, 1));
    }

    #[test]
    fn next_month_boundary_rolls_over_december() {
        assert_eq!(first_day_of_next_month(d(2024, 12, 31)), d(2025, 1, 1));
    }

    #[test]
    fn terminal_statuses() {
        assert!(!ExchangeStatus::Pending.is_terminal());
        assert!(ExchangeStatus::Approved.is_terminal());
        assert!(ExchangeStatus::Rejected.is_terminal());
    }
}
