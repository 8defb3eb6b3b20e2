use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::error::SchedulingError;

/// External clinical-risk scoring. The core does not compute clinical
/// urgency itself; it caps and sums whatever this collaborator returns.
#[async_trait]
pub trait ClinicalRiskScorer: Send + Sync {
    async fn score(&self, subject_id: Uuid, type_id: Uuid) -> Result<i64, SchedulingError>;
}

/// Organization holiday calendar.
#[async_trait]
pub trait HolidayCalendar: Send + Sync {
    async fn is_holiday(&self, date: NaiveDate) -> Result<bool, SchedulingError>;
}

/// Holiday calendar backed by a fixed date set.
#[derive(Debug, Default, Clone)]
pub struct FixedHolidayCalendar {
    holidays: HashSet<NaiveDate>,
}

impl FixedHolidayCalendar {
    pub fn new(holidays: impl IntoIterator<Item = NaiveDate>) -> Arc<Self> {
        Arc::new(Self {
            holidays: holidays.into_iter().collect(),
        })
    }
}

#[async_trait]
impl HolidayCalendar for FixedHolidayCalendar {
    async fn is_holiday(&self, date: NaiveDate) -> Result<bool, SchedulingError> {
        Ok(self.holidays.contains(&date))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Acting subject, when known. Background sweeps act without one.
    pub actor: Option<Uuid>,
    pub action: String,
    pub entity: String,
    pub entity_id: String,
    pub detail: Value,
    pub at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        actor: Option<Uuid>,
        action: &str,
        entity: &str,
        entity_id: impl ToString,
        detail: Value,
    ) -> Self {
        Self {
            actor,
            action: action.to_string(),
            entity: entity.to_string(),
            entity_id: entity_id.to_string(),
            detail,
            at: Utc::now(),
        }
    }
}

/// Audit trail sink. Recording is best-effort; the core never fails an
/// operation because the audit collaborator did.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent);
}

/// Audit sink that emits structured log lines.
#[derive(Debug, Default)]
pub struct TracingAuditSink;

impl TracingAuditSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self)
    }
}

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: AuditEvent) {
        info!(
            action = %event.action,
            entity = %event.entity,
            entity_id = %event.entity_id,
            actor = ?event.actor,
            detail = %event.detail,
            "audit"
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Sms,
    Portal,
}

/// Outbound notification delivery. Best-effort; failures are logged by the
/// caller and never abort the operation that triggered them.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, recipient: Uuid, message: &str, channel: Channel);
}

/// Decides whether an actor may bypass the cancellation-notice policy.
#[async_trait]
pub trait CancellationAuthorizer: Send + Sync {
    async fn is_privileged(&self, actor_id: Uuid) -> bool;
}

/// Authorizer that privileges nobody; the safe default.
#[derive(Debug, Default)]
pub struct NoPrivileges;

impl NoPrivileges {
    pub fn new() -> Arc<Self> {
        Arc::new(Self)
    }
}

#[async_trait]
impl CancellationAuthorizer for NoPrivileges {
    async fn is_privileged(&self, _actor_id: Uuid) -> bool {
        false
    }
}
