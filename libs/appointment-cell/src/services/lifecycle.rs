// libs/appointment-cell/src/services/lifecycle.rs
//
// The appointment status graph as data. Every status write in the cell
// funnels through validate_transition immediately before the update, and
// callers can use valid_transitions to discover what a record may do next.

use tracing::warn;

use crate::models::{AppointmentError, AppointmentStatus};

/// Allowed next statuses for a given current status. Completed, Cancelled
/// and NoShow are terminal.
pub fn valid_transitions(current: AppointmentStatus) -> &'static [AppointmentStatus] {
    match current {
        AppointmentStatus::Scheduled => &[
            AppointmentStatus::CheckedIn,
            AppointmentStatus::Cancelled,
            AppointmentStatus::NoShow,
        ],
        AppointmentStatus::CheckedIn => &[
            AppointmentStatus::InProgress,
            AppointmentStatus::Cancelled,
            AppointmentStatus::NoShow,
        ],
        AppointmentStatus::InProgress => &[AppointmentStatus::Completed],
        AppointmentStatus::Completed
        | AppointmentStatus::Cancelled
        | AppointmentStatus::NoShow => &[],
    }
}

pub fn can_transition(from: AppointmentStatus, to: AppointmentStatus) -> bool {
    valid_transitions(from).contains(&to)
}

pub fn validate_transition(
    from: AppointmentStatus,
    to: AppointmentStatus,
) -> Result<(), AppointmentError> {
    if !can_transition(from, to) {
        warn!("Invalid status transition attempted: {} -> {}", from, to);
        return Err(AppointmentError::InvalidTransition { from, to });
    }
    Ok(())
}
