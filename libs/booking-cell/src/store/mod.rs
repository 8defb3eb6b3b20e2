pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use shared_models::SchedulingError;

use crate::models::{Appointment, AppointmentStatus, StatusMeta};

/// Write side of the booking store.
///
/// Contract for implementors: `insert_if_free` must atomically reject any
/// appointment whose `[start, end)` interval overlaps an interval-occupying
/// booking for the same provider — re-validation in the coordinator narrows
/// the race window but only this insert closes it. Implementations may use
/// a per-provider exclusive section (as the in-memory store does) or a
/// storage-level overlap constraint.
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Atomic conditional insert.
    ///
    /// When the appointment carries a `request_token` already seen by the
    /// store, the previously created booking is returned unchanged
    /// (idempotent retry). An overlap fails with `Conflict`.
    /// `exclude` ignores one existing booking during the overlap check,
    /// used when a reschedule replaces it.
    async fn insert_if_free(
        &self,
        appointment: Appointment,
        exclude: Option<Uuid>,
    ) -> Result<Appointment, SchedulingError>;

    async fn get_appointment(&self, id: Uuid) -> Result<Appointment, SchedulingError>;

    /// The booking previously created under this request token, if any.
    async fn find_by_request_token(
        &self,
        token: Uuid,
    ) -> Result<Option<Appointment>, SchedulingError>;

    /// Apply a status transition atomically, validating it against the
    /// appointment state machine, and stamp the associated metadata.
    async fn update_booking_status(
        &self,
        id: Uuid,
        next: AppointmentStatus,
        meta: StatusMeta,
    ) -> Result<Appointment, SchedulingError>;

    async fn list_bookings_in_range(
        &self,
        provider_id: Uuid,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, SchedulingError>;

    /// Number of the patient's own cancellations since `since`; feeds the
    /// waitlist cancellation-history penalty.
    async fn count_recent_cancellations(
        &self,
        patient_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<u32, SchedulingError>;
}
