use chrono::{DateTime, Duration, Utc};
use tracing::warn;

use shared_models::SchedulingError;

use crate::models::AppointmentStatus;

/// Validate that a status transition is allowed.
pub fn validate_status_transition(
    current: AppointmentStatus,
    next: AppointmentStatus,
) -> Result<(), SchedulingError> {
    if !valid_transitions(current).contains(&next) {
        warn!("Invalid appointment transition attempted: {} -> {}", current, next);
        return Err(SchedulingError::invalid_state(format!(
            "appointment cannot move from {} to {}",
            current, next
        )));
    }
    Ok(())
}

/// All valid next statuses for a given current status.
pub fn valid_transitions(current: AppointmentStatus) -> Vec<AppointmentStatus> {
    match current {
        AppointmentStatus::Scheduled => vec![
            AppointmentStatus::Confirmed,
            AppointmentStatus::Cancelled,
            AppointmentStatus::Rescheduled,
        ],
        AppointmentStatus::Confirmed => vec![
            AppointmentStatus::CheckedIn,
            AppointmentStatus::Cancelled,
            AppointmentStatus::Rescheduled,
        ],
        AppointmentStatus::CheckedIn => vec![AppointmentStatus::Completed],
        // Terminal states.
        AppointmentStatus::Completed
        | AppointmentStatus::Cancelled
        | AppointmentStatus::Rescheduled => vec![],
    }
}

/// Enforce the minimum-cancellation-notice policy for a non-privileged
/// caller. `now` is explicit so policy checks stay reproducible in tests.
pub fn validate_cancellation_notice(
    start: DateTime<Utc>,
    now: DateTime<Utc>,
    min_notice_hours: i64,
) -> Result<(), SchedulingError> {
    if start - now < Duration::hours(min_notice_hours) {
        return Err(SchedulingError::PolicyViolation(format!(
            "appointments must be cancelled at least {} hours in advance",
            min_notice_hours
        )));
    }
    Ok(())
}
