use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use shared_models::{
    AppointmentTypeDirectory, AuditEvent, AuditSink, Channel, NotificationSink, SchedulingError,
};

use crate::models::{
    GroupSession, ParticipantStatus, SeriesParticipant, SeriesStatus, SessionStatus,
};
use crate::store::SeriesStore;

/// Manages series enrollment, per-session confirmation, and waitlist
/// promotion. Group waitlisting is first-come-first-served by enrollment
/// time, unlike the score-ranked individual waitlist.
pub struct EnrollmentService {
    store: Arc<dyn SeriesStore>,
    types: Arc<dyn AppointmentTypeDirectory>,
    notifications: Arc<dyn NotificationSink>,
    audit: Arc<dyn AuditSink>,
}

impl EnrollmentService {
    pub fn new(
        store: Arc<dyn SeriesStore>,
        types: Arc<dyn AppointmentTypeDirectory>,
        notifications: Arc<dyn NotificationSink>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            store,
            types,
            notifications,
            audit,
        }
    }

    /// Enroll a subject into a series. Lands `Active` (confirmed into all
    /// future sessions) while capacity allows, `Waitlisted` otherwise.
    pub async fn enroll_participant(
        &self,
        series_id: Uuid,
        patient_id: Uuid,
    ) -> Result<SeriesParticipant, SchedulingError> {
        let series = self.store.get_series(series_id).await?;
        if series.status != SeriesStatus::Active {
            return Err(SchedulingError::invalid_state(format!(
                "group series {} is not open for enrollment",
                series_id
            )));
        }
        if let Some(existing) = self.store.find_participant(series_id, patient_id).await? {
            if existing.status != ParticipantStatus::Withdrawn {
                return Err(SchedulingError::conflict(format!(
                    "patient {} is already enrolled in series {}",
                    patient_id, series_id
                )));
            }
        }

        let type_info = self.types.get_type(series.type_id).await?;
        let now = Utc::now();
        let mut participant = SeriesParticipant {
            id: Uuid::new_v4(),
            series_id,
            patient_id,
            status: ParticipantStatus::Enrolled,
            enrolled_at: now,
            sessions_attended: 0,
            updated_at: now,
        };

        let active_count = self
            .store
            .list_participants(series_id)
            .await?
            .iter()
            .filter(|p| p.status.counts_toward_capacity())
            .count() as u32;
        let has_capacity = type_info
            .max_participants
            .map_or(true, |max| active_count < max);

        let next = if has_capacity {
            ParticipantStatus::Active
        } else {
            ParticipantStatus::Waitlisted
        };
        self.set_status(&mut participant, next, now)?;
        let participant = self.store.insert_participant(participant).await?;

        if participant.status == ParticipantStatus::Active {
            self.confirm_into_future_sessions(&participant, now).await?;
        }

        info!(
            "Enrolled patient {} in series {} as {:?}",
            patient_id, series_id, participant.status
        );
        self.audit
            .record(AuditEvent::new(
                Some(patient_id),
                "series.participant_enrolled",
                "series_participant",
                participant.id,
                json!({ "series_id": series_id, "status": participant.status }),
            ))
            .await;
        self.notifications
            .notify(
                patient_id,
                &format!("You are enrolled in {}", series.name),
                Channel::Portal,
            )
            .await;
        Ok(participant)
    }

    /// Withdraw from a series (terminal). Freed capacity promotes the
    /// oldest waitlisted participants session by session.
    pub async fn withdraw_participant(
        &self,
        series_id: Uuid,
        patient_id: Uuid,
    ) -> Result<SeriesParticipant, SchedulingError> {
        let mut participant = self
            .store
            .find_participant(series_id, patient_id)
            .await?
            .ok_or_else(|| {
                SchedulingError::not_found(format!(
                    "participant {} in series {}",
                    patient_id, series_id
                ))
            })?;

        let now = Utc::now();
        self.set_status(&mut participant, ParticipantStatus::Withdrawn, now)?;
        let participant = self.store.save_participant(participant).await?;

        // Drop the withdrawn participant from sessions still ahead, then
        // fill the seats they vacated.
        let mut affected = Vec::new();
        for session in self.future_sessions(series_id, now).await? {
            if session.confirmed_participants.contains(&participant.id) {
                let mut updated = session;
                updated.confirmed_participants.retain(|id| *id != participant.id);
                let updated = self.store.save_session(updated).await?;
                affected.push(updated.id);
            }
        }
        for session_id in affected {
            self.promote_waitlisted(session_id).await?;
        }

        self.audit
            .record(AuditEvent::new(
                Some(patient_id),
                "series.participant_withdrawn",
                "series_participant",
                participant.id,
                json!({ "series_id": series_id }),
            ))
            .await;
        Ok(participant)
    }

    /// Fill a session's free capacity from the series waitlist, oldest
    /// enrollment first. Returns the participants promoted.
    pub async fn promote_waitlisted(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<SeriesParticipant>, SchedulingError> {
        let session = self.store.get_session(session_id).await?;
        let type_info = self.types.get_type(session.type_id).await?;
        let Some(max) = type_info.max_participants else {
            return Ok(vec![]);
        };

        let confirmed = session.confirmed_participants.len() as u32;
        if confirmed >= max {
            return Ok(vec![]);
        }
        let freed = (max - confirmed) as usize;

        // list_participants is ordered by enrollment time.
        let waitlisted: Vec<SeriesParticipant> = self
            .store
            .list_participants(session.series_id)
            .await?
            .into_iter()
            .filter(|p| p.status == ParticipantStatus::Waitlisted)
            .take(freed)
            .collect();
        if waitlisted.is_empty() {
            return Ok(vec![]);
        }

        let now = Utc::now();
        let mut session = session;
        let mut promoted = Vec::with_capacity(waitlisted.len());
        for mut participant in waitlisted {
            self.set_status(&mut participant, ParticipantStatus::Active, now)?;
            let participant = self.store.save_participant(participant).await?;
            session.confirmed_participants.push(participant.id);

            debug!(
                "Promoted participant {} into session {}",
                participant.id, session_id
            );
            self.notifications
                .notify(
                    participant.patient_id,
                    "A place opened up in your group series; you are now confirmed",
                    Channel::Portal,
                )
                .await;
            self.audit
                .record(AuditEvent::new(
                    Some(participant.patient_id),
                    "series.participant_promoted",
                    "series_participant",
                    participant.id,
                    json!({ "session_id": session_id }),
                ))
                .await;
            promoted.push(participant);
        }
        self.store.save_session(session).await?;
        Ok(promoted)
    }

    /// Record attendance for a confirmed participant at a session.
    pub async fn confirm_attendance(
        &self,
        session_id: Uuid,
        patient_id: Uuid,
    ) -> Result<SeriesParticipant, SchedulingError> {
        let session = self.store.get_session(session_id).await?;
        let mut participant = self
            .store
            .find_participant(session.series_id, patient_id)
            .await?
            .ok_or_else(|| {
                SchedulingError::not_found(format!(
                    "participant {} in series {}",
                    patient_id, session.series_id
                ))
            })?;

        if !session.confirmed_participants.contains(&participant.id) {
            return Err(SchedulingError::invalid_state(format!(
                "patient {} is not confirmed for session {}",
                patient_id, session_id
            )));
        }
        participant.sessions_attended += 1;
        participant.updated_at = Utc::now();
        self.store.save_participant(participant.clone()).await?;
        Ok(participant)
    }

    /// Close out a finished series: remaining Active and Waitlisted
    /// participants are marked Completed.
    pub async fn complete_series(&self, series_id: Uuid) -> Result<(), SchedulingError> {
        let mut series = self.store.get_series(series_id).await?;
        if series.status == SeriesStatus::Deleted {
            return Err(SchedulingError::invalid_state(format!(
                "group series {} is deleted",
                series_id
            )));
        }
        let now = Utc::now();
        for mut participant in self.store.list_participants(series_id).await? {
            if matches!(
                participant.status,
                ParticipantStatus::Active | ParticipantStatus::Waitlisted
            ) {
                self.set_status(&mut participant, ParticipantStatus::Completed, now)?;
                self.store.save_participant(participant).await?;
            }
        }
        series.status = SeriesStatus::Completed;
        series.updated_at = now;
        self.store.save_series(series).await?;

        self.audit
            .record(AuditEvent::new(
                None,
                "series.completed",
                "group_series",
                series_id,
                json!({}),
            ))
            .await;
        Ok(())
    }

    async fn confirm_into_future_sessions(
        &self,
        participant: &SeriesParticipant,
        now: DateTime<Utc>,
    ) -> Result<(), SchedulingError> {
        for session in self.future_sessions(participant.series_id, now).await? {
            if !session.confirmed_participants.contains(&participant.id) {
                let mut updated = session;
                updated.confirmed_participants.push(participant.id);
                self.store.save_session(updated).await?;
            }
        }
        Ok(())
    }

    async fn future_sessions(
        &self,
        series_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<GroupSession>, SchedulingError> {
        Ok(self
            .store
            .list_sessions(series_id)
            .await?
            .into_iter()
            .filter(|s| s.start > now && s.status == SessionStatus::Scheduled)
            .collect())
    }

    fn set_status(
        &self,
        participant: &mut SeriesParticipant,
        next: ParticipantStatus,
        at: DateTime<Utc>,
    ) -> Result<(), SchedulingError> {
        if !participant.status.can_transition(next) {
            return Err(SchedulingError::invalid_state(format!(
                "participant cannot move from {:?} to {:?}",
                participant.status, next
            )));
        }
        participant.status = next;
        participant.updated_at = at;
        Ok(())
    }
}
