use chrono::{DateTime, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One recurring weekly working window for a provider or resource.
///
/// The window contributes availability on every date whose weekday matches,
/// restricted to the `effective_from..=effective_until` date range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityWindow {
    pub id: Uuid,
    pub day_of_week: Weekday,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub effective_from: NaiveDate,
    /// Open-ended when `None`.
    pub effective_until: Option<NaiveDate>,
}

impl AvailabilityWindow {
    pub fn applies_on(&self, date: NaiveDate) -> bool {
        self.day_of_week == chrono::Datelike::weekday(&date)
            && date >= self.effective_from
            && self.effective_until.map_or(true, |until| date <= until)
    }
}

/// A time-off exception (vacation, training, sick leave). Subtracted from
/// any recurring window it overlaps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeOffException {
    pub id: Uuid,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub reason: String,
}

/// A provider's full schedule definition, read-only to this core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSchedule {
    pub provider_id: Uuid,
    pub windows: Vec<AvailabilityWindow>,
    pub time_off: Vec<TimeOffException>,
}

/// A candidate open interval of exactly the requested duration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenSlot {
    pub provider_id: Uuid,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl OpenSlot {
    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

/// An already-booked interval, reduced to what slot computation needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookedInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}
