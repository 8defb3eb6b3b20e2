use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use shared_models::SchedulingError;

use crate::models::{GroupSeries, GroupSession, SeriesParticipant};
use crate::store::SeriesStore;

/// In-process series store.
#[derive(Default)]
pub struct MemorySeriesStore {
    series: RwLock<HashMap<Uuid, GroupSeries>>,
    sessions: RwLock<HashMap<Uuid, GroupSession>>,
    participants: RwLock<HashMap<Uuid, SeriesParticipant>>,
}

impl MemorySeriesStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl SeriesStore for MemorySeriesStore {
    async fn insert_series(&self, series: GroupSeries) -> Result<GroupSeries, SchedulingError> {
        self.series.write().await.insert(series.id, series.clone());
        Ok(series)
    }

    async fn get_series(&self, id: Uuid) -> Result<GroupSeries, SchedulingError> {
        self.series
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| SchedulingError::not_found(format!("group series {}", id)))
    }

    async fn save_series(&self, series: GroupSeries) -> Result<GroupSeries, SchedulingError> {
        let mut all = self.series.write().await;
        if !all.contains_key(&series.id) {
            return Err(SchedulingError::not_found(format!("group series {}", series.id)));
        }
        all.insert(series.id, series.clone());
        Ok(series)
    }

    async fn insert_sessions(
        &self,
        sessions: Vec<GroupSession>,
    ) -> Result<Vec<GroupSession>, SchedulingError> {
        let mut all = self.sessions.write().await;
        for session in &sessions {
            all.insert(session.id, session.clone());
        }
        Ok(sessions)
    }

    async fn list_sessions(&self, series_id: Uuid) -> Result<Vec<GroupSession>, SchedulingError> {
        let mut sessions: Vec<GroupSession> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.series_id == series_id)
            .cloned()
            .collect();
        sessions.sort_by_key(|s| s.start);
        Ok(sessions)
    }

    async fn get_session(&self, id: Uuid) -> Result<GroupSession, SchedulingError> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| SchedulingError::not_found(format!("group session {}", id)))
    }

    async fn save_session(&self, session: GroupSession) -> Result<GroupSession, SchedulingError> {
        let mut all = self.sessions.write().await;
        if !all.contains_key(&session.id) {
            return Err(SchedulingError::not_found(format!("group session {}", session.id)));
        }
        all.insert(session.id, session.clone());
        Ok(session)
    }

    async fn delete_sessions(&self, ids: &[Uuid]) -> Result<(), SchedulingError> {
        let mut all = self.sessions.write().await;
        for id in ids {
            all.remove(id);
        }
        Ok(())
    }

    async fn insert_participant(
        &self,
        participant: SeriesParticipant,
    ) -> Result<SeriesParticipant, SchedulingError> {
        self.participants
            .write()
            .await
            .insert(participant.id, participant.clone());
        Ok(participant)
    }

    async fn find_participant(
        &self,
        series_id: Uuid,
        patient_id: Uuid,
    ) -> Result<Option<SeriesParticipant>, SchedulingError> {
        // A re-enrollment after withdrawal leaves the withdrawn record
        // behind; the live enrollment wins, otherwise the most recent one.
        let participants = self.participants.read().await;
        let mut matching: Vec<&SeriesParticipant> = participants
            .values()
            .filter(|p| p.series_id == series_id && p.patient_id == patient_id)
            .collect();
        matching.sort_by_key(|p| p.enrolled_at);
        let chosen = matching
            .iter()
            .rev()
            .find(|p| p.status != crate::models::ParticipantStatus::Withdrawn)
            .or(matching.last());
        Ok(chosen.map(|p| (*p).clone()))
    }

    async fn list_participants(
        &self,
        series_id: Uuid,
    ) -> Result<Vec<SeriesParticipant>, SchedulingError> {
        let mut participants: Vec<SeriesParticipant> = self
            .participants
            .read()
            .await
            .values()
            .filter(|p| p.series_id == series_id)
            .cloned()
            .collect();
        participants.sort_by_key(|p| p.enrolled_at);
        Ok(participants)
    }

    async fn save_participant(
        &self,
        participant: SeriesParticipant,
    ) -> Result<SeriesParticipant, SchedulingError> {
        let mut all = self.participants.write().await;
        if !all.contains_key(&participant.id) {
            return Err(SchedulingError::not_found(format!(
                "series participant {}",
                participant.id
            )));
        }
        all.insert(participant.id, participant.clone());
        Ok(participant)
    }
}
