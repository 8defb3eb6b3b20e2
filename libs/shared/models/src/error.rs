use thiserror::Error;

/// Failure kinds surfaced by every core operation.
///
/// Retry semantics: `SlotUnavailable` may be retried by the caller with a
/// fresh slot query; `Conflict` is retried once internally by the booking
/// coordinator before being surfaced as `SlotUnavailable`; the remaining
/// kinds are terminal for the request that produced them.
#[derive(Error, Debug)]
pub enum SchedulingError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Requested slot is no longer available")]
    SlotUnavailable,

    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Collaborator error: {0}")]
    Collaborator(String),
}

impl SchedulingError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Short machine-readable kind, used in audit records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::SlotUnavailable => "slot_unavailable",
            Self::PolicyViolation(_) => "policy_violation",
            Self::InvalidState(_) => "invalid_state",
            Self::Conflict(_) => "conflict",
            Self::Collaborator(_) => "collaborator",
        }
    }
}
