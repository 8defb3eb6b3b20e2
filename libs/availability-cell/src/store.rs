use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use shared_models::SchedulingError;

use crate::models::{BookedInterval, ProviderSchedule};

/// Read-only view of the scheduling store, as consumed by slot computation.
///
/// `booked_intervals_in_range` must return intervals for every booking that
/// still occupies its slot (cancellation frees the interval; every other
/// status keeps it occupied).
#[async_trait]
pub trait ScheduleReader: Send + Sync {
    /// Fails with `NotFound` when the provider/resource is unknown.
    async fn get_provider_schedule(
        &self,
        provider_id: Uuid,
    ) -> Result<ProviderSchedule, SchedulingError>;

    /// `exclude` omits one booking from the result, used when checking
    /// whether a reschedule target is free of everything but the booking
    /// being moved.
    async fn booked_intervals_in_range(
        &self,
        provider_id: Uuid,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
        exclude: Option<Uuid>,
    ) -> Result<Vec<BookedInterval>, SchedulingError>;

    /// All known provider/resource ids; used by the waitlist matcher when an
    /// entry has no preferred provider.
    async fn list_provider_ids(&self) -> Result<Vec<Uuid>, SchedulingError>;
}
