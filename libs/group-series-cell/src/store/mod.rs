pub mod memory;

use async_trait::async_trait;
use uuid::Uuid;

use shared_models::SchedulingError;

use crate::models::{GroupSeries, GroupSession, SeriesParticipant};

/// Storage contract for series, their generated sessions, and enrollment.
#[async_trait]
pub trait SeriesStore: Send + Sync {
    async fn insert_series(&self, series: GroupSeries) -> Result<GroupSeries, SchedulingError>;

    async fn get_series(&self, id: Uuid) -> Result<GroupSeries, SchedulingError>;

    async fn save_series(&self, series: GroupSeries) -> Result<GroupSeries, SchedulingError>;

    async fn insert_sessions(
        &self,
        sessions: Vec<GroupSession>,
    ) -> Result<Vec<GroupSession>, SchedulingError>;

    /// All sessions of a series, ordered by start.
    async fn list_sessions(&self, series_id: Uuid) -> Result<Vec<GroupSession>, SchedulingError>;

    async fn get_session(&self, id: Uuid) -> Result<GroupSession, SchedulingError>;

    async fn save_session(&self, session: GroupSession) -> Result<GroupSession, SchedulingError>;

    /// Remove generated sessions. Only regeneration deletes, and only
    /// future sessions; history is never removed.
    async fn delete_sessions(&self, ids: &[Uuid]) -> Result<(), SchedulingError>;

    async fn insert_participant(
        &self,
        participant: SeriesParticipant,
    ) -> Result<SeriesParticipant, SchedulingError>;

    async fn find_participant(
        &self,
        series_id: Uuid,
        patient_id: Uuid,
    ) -> Result<Option<SeriesParticipant>, SchedulingError>;

    /// All participants of a series, ordered by enrollment time.
    async fn list_participants(
        &self,
        series_id: Uuid,
    ) -> Result<Vec<SeriesParticipant>, SchedulingError>;

    async fn save_participant(
        &self,
        participant: SeriesParticipant,
    ) -> Result<SeriesParticipant, SchedulingError>;
}
