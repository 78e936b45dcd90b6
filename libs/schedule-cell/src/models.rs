// libs/schedule-cell/src/models.rs
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_models::timefmt::{hhmm, hhmm_option};

// ==============================================================================
// SCHEDULE MODELS
// ==============================================================================

/// A doctor's recurring weekly availability template for one day of the week.
/// Retired schedules are kept with `is_active = false`; generated time slots
/// keep referencing them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub organization_id: Uuid,
    /// 0 = Sunday .. 6 = Saturday
    pub day_of_week: i32,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    pub slot_duration_minutes: i32,
    pub is_active: bool,
    pub effective_from: NaiveDate,
    pub effective_until: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateScheduleRequest {
    pub doctor_id: Uuid,
    pub day_of_week: i32,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    pub slot_duration_minutes: i32,
    pub effective_from: NaiveDate,
    pub effective_until: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateScheduleRequest {
    pub day_of_week: Option<i32>,
    #[serde(default, with = "hhmm_option")]
    pub start_time: Option<NaiveTime>,
    #[serde(default, with = "hhmm_option")]
    pub end_time: Option<NaiveTime>,
    pub slot_duration_minutes: Option<i32>,
    pub effective_from: Option<NaiveDate>,
    pub effective_until: Option<NaiveDate>,
}

// ==============================================================================
// SCHEDULE EXCEPTION MODELS
// ==============================================================================

/// One-off blackout overriding a doctor's schedules on a specific date.
/// A missing time window means the whole day is blocked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleException {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub organization_id: Uuid,
    pub exception_date: NaiveDate,
    #[serde(default, with = "hhmm_option")]
    pub start_time: Option<NaiveTime>,
    #[serde(default, with = "hhmm_option")]
    pub end_time: Option<NaiveTime>,
    pub reason: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateScheduleExceptionRequest {
    pub doctor_id: Uuid,
    pub exception_date: NaiveDate,
    #[serde(default, with = "hhmm_option")]
    pub start_time: Option<NaiveTime>,
    #[serde(default, with = "hhmm_option")]
    pub end_time: Option<NaiveTime>,
    pub reason: Option<String>,
}

/// An appointment caught inside a new exception's window. The engine only
/// reports these; cancelling or rebooking them is a human decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AffectedAppointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub appointment_date: NaiveDate,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    pub status: String,
    #[serde(default)]
    pub requires_notification: bool,
}

/// Result of creating an exception: the persisted record plus every active
/// appointment the caller must renegotiate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExceptionImpact {
    pub exception: ScheduleException,
    pub affected_appointments: Vec<AffectedAppointment>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Schedule not found")]
    NotFound,

    #[error("Schedule exception not found")]
    ExceptionNotFound,

    #[error("Schedule conflicts with an existing schedule")]
    Conflict,

    #[error("Database error: {0}")]
    Database(String),
}

impl From<shared_database::DbError> for ScheduleError {
    fn from(e: shared_database::DbError) -> Self {
        ScheduleError::Database(e.to_string())
    }
}
