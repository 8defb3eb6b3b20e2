use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A booked visit. Never physically deleted; cancellation and rescheduling
/// are statuses, and the record keeps its full audit metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub provider_id: Uuid,
    pub type_id: Uuid,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub cancellation_reason: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<Uuid>,
    /// Set on the replacement when this booking was created by a reschedule.
    pub rescheduled_from: Option<Uuid>,
    /// Set on the original when a reschedule replaced it.
    pub rescheduled_to: Option<Uuid>,
    /// Client-supplied idempotency token for the creating request.
    pub request_token: Option<Uuid>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    /// Whether this booking still occupies its `[start, end)` interval.
    /// Cancelled bookings free the slot; so do rescheduled ones, whose
    /// replacement occupies its own interval.
    pub fn occupies_interval(&self) -> bool {
        !matches!(
            self.status,
            AppointmentStatus::Cancelled | AppointmentStatus::Rescheduled
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    CheckedIn,
    Completed,
    Cancelled,
    Rescheduled,
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "scheduled"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::CheckedIn => write!(f, "checked_in"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::Rescheduled => write!(f, "rescheduled"),
        }
    }
}

/// Arguments for creating a booking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleRequest {
    pub patient_id: Uuid,
    pub provider_id: Uuid,
    pub type_id: Uuid,
    pub start: DateTime<Utc>,
    /// Client-supplied token; replays with the same token return the
    /// original booking instead of creating a second one.
    pub request_token: Option<Uuid>,
}

/// Metadata applied alongside a status transition.
#[derive(Debug, Clone, Default)]
pub struct StatusMeta {
    pub reason: Option<String>,
    pub actor: Option<Uuid>,
    /// Reschedule link: the replacement (on the original) or the original
    /// (on the replacement).
    pub linked_appointment: Option<Uuid>,
    pub at: Option<DateTime<Utc>>,
}

impl StatusMeta {
    pub fn at(at: DateTime<Utc>) -> Self {
        Self {
            at: Some(at),
            ..Self::default()
        }
    }
}
