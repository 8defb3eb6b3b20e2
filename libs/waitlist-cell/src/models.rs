use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A subject's standing request for an appointment type.
///
/// At most one `Active` entry may exist per (patient, type) pair; enrolling
/// again refreshes the existing entry's constraints instead of duplicating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitlistEntry {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub type_id: Uuid,
    pub preferred_provider_id: Option<Uuid>,
    /// Earliest acceptable slot start.
    pub earliest_start: DateTime<Utc>,
    /// Latest acceptable slot start. Open-ended when `None`; the matcher
    /// bounds its search at the configured horizon instead.
    pub latest_start: Option<DateTime<Utc>>,
    pub priority: i64,
    /// Per-factor breakdown of the last computed priority, kept for audit.
    pub priority_factors: Vec<PriorityFactor>,
    pub status: WaitlistStatus,
    pub declines: u32,
    pub expiries: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitlistStatus {
    Active,
    Offered,
    Accepted,
    Declined,
    Expired,
    Completed,
}

impl WaitlistStatus {
    /// Allowed transitions. `Completed` is terminal: an entry never returns
    /// to circulation once fulfilled. Declined/expired offers re-queue the
    /// entry as `Active`.
    pub fn can_transition(self, next: WaitlistStatus) -> bool {
        use WaitlistStatus::*;
        match self {
            Active => matches!(next, Offered),
            Offered => matches!(next, Accepted | Declined | Expired | Active),
            Accepted => matches!(next, Completed | Active),
            Declined | Expired => matches!(next, Active),
            Completed => false,
        }
    }
}

impl fmt::Display for WaitlistStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WaitlistStatus::Active => "active",
            WaitlistStatus::Offered => "offered",
            WaitlistStatus::Accepted => "accepted",
            WaitlistStatus::Declined => "declined",
            WaitlistStatus::Expired => "expired",
            WaitlistStatus::Completed => "completed",
        };
        write!(f, "{}", name)
    }
}

/// One scoring component of a computed priority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityFactor {
    pub factor: String,
    pub points: i64,
}

impl PriorityFactor {
    pub fn new(factor: &str, points: i64) -> Self {
        Self {
            factor: factor.to_string(),
            points,
        }
    }
}

/// A computed priority with its retained breakdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorityScore {
    pub score: i64,
    pub factors: Vec<PriorityFactor>,
}

/// A time-bounded proposal of a specific slot to a specific entry.
/// At most one open offer may exist per entry at any instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitlistOffer {
    pub id: Uuid,
    pub entry_id: Uuid,
    pub provider_id: Uuid,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: OfferStatus,
    pub created_at: DateTime<Utc>,
}

impl WaitlistOffer {
    /// Unresolved and not yet past its expiry.
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.status == OfferStatus::Open && now < self.expires_at
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferStatus {
    Open,
    Accepted,
    Declined,
    Expired,
}

/// Arguments for waitlist enrollment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollRequest {
    pub patient_id: Uuid,
    pub type_id: Uuid,
    pub preferred_provider_id: Option<Uuid>,
    pub earliest_start: DateTime<Utc>,
    pub latest_start: Option<DateTime<Utc>>,
}

/// Outcome of one matcher sweep.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SweepReport {
    /// True when another sweep was already running and this one backed off.
    pub skipped: bool,
    pub entries_examined: usize,
    pub offers_made: usize,
    pub offers_expired: usize,
    /// Entries whose processing failed; each failure is isolated and logged.
    pub failures: usize,
}
