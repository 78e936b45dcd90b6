// libs/timeslot-cell/src/models.rs
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use shared_models::timefmt::hhmm;

/// One discrete bookable unit of time derived from a schedule.
/// `(doctor_id, slot_date, start_time)` is unique at the persistence layer;
/// the generator relies on that key to reject re-generation of a range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSlot {
    pub id: Uuid,
    pub schedule_id: Uuid,
    pub doctor_id: Uuid,
    pub organization_id: Uuid,
    pub slot_date: NaiveDate,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    pub status: TimeSlotStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeSlotStatus {
    Available,
    Booked,
    Blocked,
    Expired,
}

impl fmt::Display for TimeSlotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeSlotStatus::Available => write!(f, "available"),
            TimeSlotStatus::Booked => write!(f, "booked"),
            TimeSlotStatus::Blocked => write!(f, "blocked"),
            TimeSlotStatus::Expired => write!(f, "expired"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateSlotsRequest {
    pub schedule_id: Uuid,
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSlotQuery {
    pub doctor_id: Uuid,
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    pub only_available: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum TimeSlotError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Time slot not found")]
    NotFound,

    #[error("Schedule not found")]
    ScheduleNotFound,

    #[error("Schedule is inactive")]
    ScheduleInactive,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<shared_database::DbError> for TimeSlotError {
    fn from(e: shared_database::DbError) -> Self {
        match e {
            shared_database::DbError::Conflict(msg) => TimeSlotError::Conflict(msg),
            other => TimeSlotError::Database(other.to_string()),
        }
    }
}
