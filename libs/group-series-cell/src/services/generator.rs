use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_models::{
    AppointmentTypeDirectory, AuditEvent, AuditSink, HolidayCalendar, SchedulingError,
};

use crate::models::{
    GroupSeries, GroupSession, HolidayPolicy, NewSeries, SeriesStatus, SessionStatus,
};
use crate::store::SeriesStore;

/// Expands series definitions into concrete sessions and keeps future
/// sessions in step with series edits.
pub struct SeriesGenerator {
    store: Arc<dyn SeriesStore>,
    types: Arc<dyn AppointmentTypeDirectory>,
    holidays: Arc<dyn HolidayCalendar>,
    audit: Arc<dyn AuditSink>,
}

impl SeriesGenerator {
    pub fn new(
        store: Arc<dyn SeriesStore>,
        types: Arc<dyn AppointmentTypeDirectory>,
        holidays: Arc<dyn HolidayCalendar>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            store,
            types,
            holidays,
            audit,
        }
    }

    pub async fn create_series(&self, definition: NewSeries) -> Result<GroupSeries, SchedulingError> {
        if definition.interval_days <= 0 {
            return Err(SchedulingError::invalid_state(
                "series interval must be positive",
            ));
        }
        if definition.session_count.is_none() && definition.end_date.is_none() {
            return Err(SchedulingError::invalid_state(
                "series needs a session count or an end date",
            ));
        }
        // The type must exist and be a group type.
        let type_info = self.types.get_type(definition.type_id).await?;
        if type_info.max_participants.is_none() {
            return Err(SchedulingError::invalid_state(format!(
                "appointment type {} is not a group type",
                type_info.name
            )));
        }

        let now = Utc::now();
        let series = GroupSeries {
            id: Uuid::new_v4(),
            type_id: definition.type_id,
            provider_id: definition.provider_id,
            name: definition.name,
            start_time: definition.start_time,
            interval_days: definition.interval_days,
            session_count: definition.session_count,
            end_date: definition.end_date,
            holiday_policy: definition.holiday_policy,
            status: SeriesStatus::Active,
            created_at: now,
            updated_at: now,
        };
        let series = self.store.insert_series(series).await?;
        info!("Created group series {} ({})", series.id, series.name);
        self.audit
            .record(AuditEvent::new(
                None,
                "series.created",
                "group_series",
                series.id,
                json!({ "name": series.name, "interval_days": series.interval_days }),
            ))
            .await;
        Ok(series)
    }

    /// Generate `count` sessions spaced by the series interval, starting at
    /// `start_date`.
    ///
    /// Candidate `i` is anchored at `start_date + i * interval`; a candidate
    /// falling on a holiday is shifted forward one day at a time until it
    /// clears, without moving later candidates off the original cadence.
    pub async fn generate_sessions(
        &self,
        series_id: Uuid,
        start_date: NaiveDate,
        count: u32,
    ) -> Result<Vec<GroupSession>, SchedulingError> {
        let series = self.store.get_series(series_id).await?;
        if series.status == SeriesStatus::Deleted {
            return Err(SchedulingError::invalid_state(format!(
                "group series {} is deleted",
                series_id
            )));
        }
        let type_info = self.types.get_type(series.type_id).await?;

        // New sessions start with the currently active cohort confirmed.
        let active_participants: Vec<Uuid> = self
            .store
            .list_participants(series_id)
            .await?
            .into_iter()
            .filter(|p| p.status.counts_toward_capacity())
            .map(|p| p.id)
            .collect();

        let now = Utc::now();
        let mut sessions = Vec::with_capacity(count as usize);
        for i in 0..count {
            let anchor = start_date + Duration::days(i as i64 * series.interval_days);
            let date = self.clear_holidays(anchor, series.holiday_policy).await?;
            let start = date.and_time(series.start_time).and_utc();
            sessions.push(GroupSession {
                id: Uuid::new_v4(),
                series_id,
                provider_id: series.provider_id,
                type_id: series.type_id,
                start,
                end: start + Duration::minutes(type_info.duration_minutes),
                status: SessionStatus::Scheduled,
                confirmed_participants: active_participants.clone(),
                created_at: now,
            });
        }

        let sessions = self.store.insert_sessions(sessions).await?;
        info!(
            "Generated {} sessions for series {} starting {}",
            sessions.len(),
            series_id,
            start_date
        );
        self.audit
            .record(AuditEvent::new(
                None,
                "series.sessions_generated",
                "group_series",
                series_id,
                json!({ "count": sessions.len(), "start_date": start_date }),
            ))
            .await;
        Ok(sessions)
    }

    /// Replace only the not-yet-occurred sessions, recomputing them from
    /// the most recent kept session. Past sessions are preserved.
    pub async fn regenerate_sessions(
        &self,
        series_id: Uuid,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<GroupSession>, SchedulingError> {
        let series = self.store.get_series(series_id).await?;
        if series.status == SeriesStatus::Deleted {
            return Err(SchedulingError::invalid_state(format!(
                "group series {} is deleted",
                series_id
            )));
        }

        let sessions = self.store.list_sessions(series_id).await?;
        let (past, future): (Vec<_>, Vec<_>) = sessions.into_iter().partition(|s| s.start <= as_of);

        let future_ids: Vec<Uuid> = future.iter().map(|s| s.id).collect();
        self.store.delete_sessions(&future_ids).await?;
        debug!(
            "Regenerating series {}: kept {} past sessions, dropped {} future",
            series_id,
            past.len(),
            future_ids.len()
        );

        let next_date = match past.last() {
            Some(last) => last.start.date_naive() + Duration::days(series.interval_days),
            None => as_of.date_naive(),
        };

        let remaining = match (series.session_count, series.end_date) {
            (Some(total), _) => (total as usize).saturating_sub(past.len()) as u32,
            (None, Some(end_date)) => {
                if end_date < next_date {
                    0
                } else {
                    ((end_date - next_date).num_days() / series.interval_days + 1) as u32
                }
            }
            (None, None) => 0,
        };

        if remaining == 0 {
            return Ok(vec![]);
        }
        self.generate_sessions(series_id, next_date, remaining).await
    }

    /// Soft-delete a series: no further generation or enrollment, future
    /// sessions are cancelled, past sessions stay untouched.
    pub async fn delete_series(&self, series_id: Uuid) -> Result<GroupSeries, SchedulingError> {
        let mut series = self.store.get_series(series_id).await?;
        if series.status == SeriesStatus::Deleted {
            return Ok(series);
        }
        series.status = SeriesStatus::Deleted;
        series.updated_at = Utc::now();
        let series = self.store.save_series(series).await?;

        let now = Utc::now();
        for session in self.store.list_sessions(series_id).await? {
            if session.start > now && session.status == SessionStatus::Scheduled {
                let mut cancelled = session;
                cancelled.status = SessionStatus::Cancelled;
                if let Err(err) = self.store.save_session(cancelled).await {
                    warn!("Could not cancel future session of deleted series: {}", err);
                }
            }
        }

        self.audit
            .record(AuditEvent::new(
                None,
                "series.deleted",
                "group_series",
                series_id,
                json!({}),
            ))
            .await;
        Ok(series)
    }

    async fn clear_holidays(
        &self,
        mut date: NaiveDate,
        policy: HolidayPolicy,
    ) -> Result<NaiveDate, SchedulingError> {
        if policy == HolidayPolicy::Ignore {
            return Ok(date);
        }
        while self.holidays.is_holiday(date).await? {
            date = date
                .succ_opt()
                .ok_or_else(|| SchedulingError::invalid_state("date overflow while shifting past holidays"))?;
        }
        Ok(date)
    }
}

/// Whether a session has enough confirmed participants to run, per the
/// type's minimum.
pub fn meets_minimum(session: &GroupSession, min_participants: Option<u32>) -> bool {
    match min_participants {
        Some(min) => session.confirmed_participants.len() as u32 >= min,
        None => true,
    }
}
