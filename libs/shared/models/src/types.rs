use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SchedulingError;

/// Appointment-type reference data. Immutable; owned by the surrounding
/// records platform and consumed read-only here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentTypeInfo {
    pub id: Uuid,
    pub name: String,
    pub duration_minutes: i64,
    /// Set for urgent / pre-authorization-gated visit types; feeds the
    /// waitlist urgency bonus.
    pub requires_pre_auth: bool,
    /// Group-session bounds. `None` for individual visit types.
    pub min_participants: Option<u32>,
    pub max_participants: Option<u32>,
}

impl AppointmentTypeInfo {
    pub fn individual(id: Uuid, name: &str, duration_minutes: i64, requires_pre_auth: bool) -> Self {
        Self {
            id,
            name: name.to_string(),
            duration_minutes,
            requires_pre_auth,
            min_participants: None,
            max_participants: None,
        }
    }

    pub fn group(
        id: Uuid,
        name: &str,
        duration_minutes: i64,
        min_participants: u32,
        max_participants: u32,
    ) -> Self {
        Self {
            id,
            name: name.to_string(),
            duration_minutes,
            requires_pre_auth: false,
            min_participants: Some(min_participants),
            max_participants: Some(max_participants),
        }
    }
}

/// Lookup of appointment-type reference data.
#[async_trait]
pub trait AppointmentTypeDirectory: Send + Sync {
    async fn get_type(&self, type_id: Uuid) -> Result<AppointmentTypeInfo, SchedulingError>;
}

/// Fixed in-memory directory, suitable for tests and embedding.
#[derive(Debug, Default, Clone)]
pub struct StaticTypeDirectory {
    types: HashMap<Uuid, AppointmentTypeInfo>,
}

impl StaticTypeDirectory {
    pub fn new(types: impl IntoIterator<Item = AppointmentTypeInfo>) -> Arc<Self> {
        Arc::new(Self {
            types: types.into_iter().map(|t| (t.id, t)).collect(),
        })
    }
}

#[async_trait]
impl AppointmentTypeDirectory for StaticTypeDirectory {
    async fn get_type(&self, type_id: Uuid) -> Result<AppointmentTypeInfo, SchedulingError> {
        self.types
            .get(&type_id)
            .cloned()
            .ok_or_else(|| SchedulingError::not_found(format!("appointment type {}", type_id)))
    }
}
