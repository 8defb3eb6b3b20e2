use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A template-driven recurring set of group sessions with shared enrollment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupSeries {
    pub id: Uuid,
    /// Group appointment type; carries duration and participant bounds.
    pub type_id: Uuid,
    /// Provider or resource hosting the sessions.
    pub provider_id: Uuid,
    pub name: String,
    /// Start time of day for every session.
    pub start_time: NaiveTime,
    pub interval_days: i64,
    /// Total sessions to generate. When `None`, `end_date` bounds the series.
    pub session_count: Option<u32>,
    pub end_date: Option<NaiveDate>,
    pub holiday_policy: HolidayPolicy,
    pub status: SeriesStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// How session generation treats organization holidays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HolidayPolicy {
    /// Shift the affected session forward one day at a time until it lands
    /// on a working day. Later sessions keep the original cadence; shifts
    /// never compound across the series.
    #[default]
    ShiftForward,
    /// Schedule on the holiday anyway.
    Ignore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesStatus {
    Active,
    Completed,
    /// Soft-deleted: no further generation or enrollment; past sessions are
    /// left untouched.
    Deleted,
}

/// Arguments for defining a series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSeries {
    pub type_id: Uuid,
    pub provider_id: Uuid,
    pub name: String,
    pub start_time: NaiveTime,
    pub interval_days: i64,
    pub session_count: Option<u32>,
    pub end_date: Option<NaiveDate>,
    pub holiday_policy: HolidayPolicy,
}

/// One concrete session generated from a series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupSession {
    pub id: Uuid,
    pub series_id: Uuid,
    pub provider_id: Uuid,
    pub type_id: Uuid,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub status: SessionStatus,
    /// Participants confirmed into this session; bounded by the type's
    /// `max_participants`.
    pub confirmed_participants: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Scheduled,
    Completed,
    Cancelled,
}

/// A subject's enrollment in a series, with attendance counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesParticipant {
    pub id: Uuid,
    pub series_id: Uuid,
    pub patient_id: Uuid,
    pub status: ParticipantStatus,
    pub enrolled_at: DateTime<Utc>,
    pub sessions_attended: u32,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantStatus {
    Enrolled,
    Active,
    Waitlisted,
    Withdrawn,
    Completed,
}

impl ParticipantStatus {
    /// Enrollment state machine. `Withdrawn` and `Completed` are terminal
    /// for the series; waitlisted participants rejoin through promotion.
    pub fn can_transition(self, next: ParticipantStatus) -> bool {
        use ParticipantStatus::*;
        match self {
            Enrolled => matches!(next, Active | Waitlisted),
            Active => matches!(next, Waitlisted | Withdrawn | Completed),
            Waitlisted => matches!(next, Active | Withdrawn | Completed),
            Withdrawn | Completed => false,
        }
    }

    /// Whether the participant counts toward session capacity.
    pub fn counts_toward_capacity(self) -> bool {
        matches!(self, ParticipantStatus::Active)
    }
}
