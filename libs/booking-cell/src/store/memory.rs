use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

use availability_cell::models::{BookedInterval, ProviderSchedule};
use availability_cell::store::ScheduleReader;
use shared_models::SchedulingError;

use crate::models::{Appointment, AppointmentStatus, StatusMeta};
use crate::services::lifecycle;
use crate::store::BookingStore;

/// Single-writer in-process scheduling store.
///
/// Serves both the write side (`BookingStore`) and the read side consumed
/// by slot computation (`ScheduleReader`). The no-double-booking guarantee
/// lives here: `insert_if_free` holds the owning provider's mutex across
/// the overlap check and the insert, so two racing writers for the same
/// provider are serialized and exactly one wins.
#[derive(Default)]
pub struct MemorySchedulingStore {
    appointments: RwLock<HashMap<Uuid, Appointment>>,
    schedules: RwLock<HashMap<Uuid, ProviderSchedule>>,
    tokens: RwLock<HashMap<Uuid, Uuid>>,
    provider_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl MemorySchedulingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Install or replace a provider's schedule definition. Availability is
    /// owned by the wider platform; this mirrors it into the store.
    pub async fn upsert_provider_schedule(&self, schedule: ProviderSchedule) {
        self.schedules
            .write()
            .await
            .insert(schedule.provider_id, schedule);
    }

    async fn provider_lock(&self, provider_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.provider_locks.lock().await;
        locks
            .entry(provider_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn overlaps_existing(
        &self,
        candidate: &Appointment,
        exclude: Option<Uuid>,
    ) -> bool {
        let appointments = self.appointments.read().await;
        appointments.values().any(|existing| {
            existing.provider_id == candidate.provider_id
                && Some(existing.id) != exclude
                && existing.occupies_interval()
                && existing.start < candidate.end
                && candidate.start < existing.end
        })
    }
}

#[async_trait]
impl BookingStore for MemorySchedulingStore {
    async fn insert_if_free(
        &self,
        appointment: Appointment,
        exclude: Option<Uuid>,
    ) -> Result<Appointment, SchedulingError> {
        if !self
            .schedules
            .read()
            .await
            .contains_key(&appointment.provider_id)
        {
            return Err(SchedulingError::not_found(format!(
                "provider {}",
                appointment.provider_id
            )));
        }

        let lock = self.provider_lock(appointment.provider_id).await;
        let _guard = lock.lock().await;

        // Idempotent replay: a token the store has already honored returns
        // the booking it created, checked inside the exclusive section so
        // concurrent replays cannot both insert.
        if let Some(token) = appointment.request_token {
            if let Some(existing_id) = self.tokens.read().await.get(&token) {
                let appointments = self.appointments.read().await;
                if let Some(existing) = appointments.get(existing_id) {
                    debug!("Request token {} replayed, returning booking {}", token, existing.id);
                    return Ok(existing.clone());
                }
            }
        }

        if self.overlaps_existing(&appointment, exclude).await {
            return Err(SchedulingError::conflict(format!(
                "interval [{}, {}) already booked for provider {}",
                appointment.start, appointment.end, appointment.provider_id
            )));
        }

        if let Some(token) = appointment.request_token {
            self.tokens.write().await.insert(token, appointment.id);
        }
        self.appointments
            .write()
            .await
            .insert(appointment.id, appointment.clone());

        Ok(appointment)
    }

    async fn get_appointment(&self, id: Uuid) -> Result<Appointment, SchedulingError> {
        self.appointments
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| SchedulingError::not_found(format!("appointment {}", id)))
    }

    async fn find_by_request_token(
        &self,
        token: Uuid,
    ) -> Result<Option<Appointment>, SchedulingError> {
        let tokens = self.tokens.read().await;
        let Some(id) = tokens.get(&token) else {
            return Ok(None);
        };
        Ok(self.appointments.read().await.get(id).cloned())
    }

    async fn update_booking_status(
        &self,
        id: Uuid,
        next: AppointmentStatus,
        meta: StatusMeta,
    ) -> Result<Appointment, SchedulingError> {
        let mut appointments = self.appointments.write().await;
        let appointment = appointments
            .get_mut(&id)
            .ok_or_else(|| SchedulingError::not_found(format!("appointment {}", id)))?;

        lifecycle::validate_status_transition(appointment.status, next)?;

        let now = meta.at.unwrap_or_else(Utc::now);
        appointment.status = next;
        appointment.updated_at = now;
        match next {
            AppointmentStatus::Cancelled => {
                appointment.cancellation_reason = meta.reason;
                appointment.cancelled_at = Some(now);
                appointment.cancelled_by = meta.actor;
            }
            AppointmentStatus::Confirmed => {
                appointment.confirmed_at = Some(now);
            }
            AppointmentStatus::Rescheduled => {
                appointment.rescheduled_to = meta.linked_appointment;
            }
            _ => {}
        }

        Ok(appointment.clone())
    }

    async fn list_bookings_in_range(
        &self,
        provider_id: Uuid,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, SchedulingError> {
        let mut bookings: Vec<Appointment> = self
            .appointments
            .read()
            .await
            .values()
            .filter(|a| {
                a.provider_id == provider_id && a.start < range_end && a.end > range_start
            })
            .cloned()
            .collect();
        bookings.sort_by_key(|a| a.start);
        Ok(bookings)
    }

    async fn count_recent_cancellations(
        &self,
        patient_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<u32, SchedulingError> {
        Ok(self
            .appointments
            .read()
            .await
            .values()
            .filter(|a| {
                a.patient_id == patient_id
                    && a.status == AppointmentStatus::Cancelled
                    && a.cancelled_at.map_or(false, |at| at >= since)
            })
            .count() as u32)
    }
}

#[async_trait]
impl ScheduleReader for MemorySchedulingStore {
    async fn get_provider_schedule(
        &self,
        provider_id: Uuid,
    ) -> Result<ProviderSchedule, SchedulingError> {
        self.schedules
            .read()
            .await
            .get(&provider_id)
            .cloned()
            .ok_or_else(|| SchedulingError::not_found(format!("provider {}", provider_id)))
    }

    async fn booked_intervals_in_range(
        &self,
        provider_id: Uuid,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
        exclude: Option<Uuid>,
    ) -> Result<Vec<BookedInterval>, SchedulingError> {
        Ok(self
            .list_bookings_in_range(provider_id, range_start, range_end)
            .await?
            .into_iter()
            .filter(|a| a.occupies_interval() && Some(a.id) != exclude)
            .map(|a| BookedInterval {
                start: a.start,
                end: a.end,
            })
            .collect())
    }

    async fn list_provider_ids(&self) -> Result<Vec<Uuid>, SchedulingError> {
        Ok(self.schedules.read().await.keys().copied().collect())
    }
}
