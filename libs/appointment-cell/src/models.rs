// libs/appointment-cell/src/models.rs
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use shared_models::timefmt::hhmm;
use shared_models::{Pagination, SortDirection};

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

/// A patient's claim on exactly one time slot. Date and times are copied
/// from the slot at booking and never change afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub organization_id: Uuid,
    pub time_slot_id: Uuid,
    /// Set exactly once, when the visit starts.
    pub encounter_id: Option<Uuid>,
    pub appointment_date: NaiveDate,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    pub status: AppointmentStatus,
    pub reason_for_visit: Option<String>,
    pub cancellation_reason: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    /// Scheduled start as an instant, used for the cancellation window
    /// and past-appointment checks.
    pub fn starts_at(&self) -> DateTime<Utc> {
        self.appointment_date.and_time(self.start_time).and_utc()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    CheckedIn,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "scheduled"),
            AppointmentStatus::CheckedIn => write!(f, "checked_in"),
            AppointmentStatus::InProgress => write!(f, "in_progress"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::NoShow => write!(f, "no_show"),
        }
    }
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub patient_id: Uuid,
    pub time_slot_id: Uuid,
    pub reason_for_visit: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelAppointmentRequest {
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentSearchQuery {
    pub patient_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    /// Case-insensitive match over the reason for visit.
    pub search_text: Option<String>,
    #[serde(default)]
    pub pagination: Pagination,
    #[serde(default)]
    pub sort_by: AppointmentSortKey,
    #[serde(default)]
    pub sort_direction: SortDirection,
}

impl Default for AppointmentSearchQuery {
    fn default() -> Self {
        Self {
            patient_id: None,
            doctor_id: None,
            status: None,
            from_date: None,
            to_date: None,
            search_text: None,
            pagination: Pagination::default(),
            sort_by: AppointmentSortKey::default(),
            sort_direction: SortDirection::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentSortKey {
    AppointmentDate,
    CreatedAt,
    Status,
}

impl AppointmentSortKey {
    pub fn as_column(&self) -> &'static str {
        match self {
            AppointmentSortKey::AppointmentDate => "appointment_date",
            AppointmentSortKey::CreatedAt => "created_at",
            AppointmentSortKey::Status => "status",
        }
    }
}

impl Default for AppointmentSortKey {
    fn default() -> Self {
        AppointmentSortKey::AppointmentDate
    }
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Time slot not found")]
    SlotNotFound,

    #[error("Time slot is no longer available")]
    SlotNotAvailable,

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Encounter creation failed: {0}")]
    EncounterCreation(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<shared_database::DbError> for AppointmentError {
    fn from(e: shared_database::DbError) -> Self {
        AppointmentError::Database(e.to_string())
    }
}
