use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use availability_cell::services::slots::SlotCalculator;
use availability_cell::store::ScheduleReader;
use shared_config::SchedulingConfig;
use shared_models::{
    AppointmentTypeDirectory, AuditEvent, AuditSink, CancellationAuthorizer, SchedulingError,
};

use crate::models::{Appointment, AppointmentStatus, ScheduleRequest, StatusMeta};
use crate::services::lifecycle;
use crate::store::BookingStore;

/// Receives freed-interval events after a successful cancellation. The
/// waitlist matcher registers itself here so cancellations trigger backfill.
#[async_trait]
pub trait FreedSlotObserver: Send + Sync {
    async fn slot_freed(&self, provider_id: Uuid, start: DateTime<Utc>, end: DateTime<Utc>);
}

/// Coordinates booking creation and the appointment state machine.
pub struct BookingService {
    store: Arc<dyn BookingStore>,
    slots: SlotCalculator,
    types: Arc<dyn AppointmentTypeDirectory>,
    authorizer: Arc<dyn CancellationAuthorizer>,
    audit: Arc<dyn AuditSink>,
    config: SchedulingConfig,
    freed_slot_observer: tokio::sync::RwLock<Option<Arc<dyn FreedSlotObserver>>>,
}

impl BookingService {
    pub fn new(
        store: Arc<dyn BookingStore>,
        reader: Arc<dyn ScheduleReader>,
        types: Arc<dyn AppointmentTypeDirectory>,
        authorizer: Arc<dyn CancellationAuthorizer>,
        audit: Arc<dyn AuditSink>,
        config: SchedulingConfig,
    ) -> Self {
        Self {
            store,
            slots: SlotCalculator::new(reader),
            types,
            authorizer,
            audit,
            config,
            freed_slot_observer: tokio::sync::RwLock::new(None),
        }
    }

    /// Register the observer notified when a cancellation frees an interval.
    pub async fn set_freed_slot_observer(&self, observer: Arc<dyn FreedSlotObserver>) {
        *self.freed_slot_observer.write().await = Some(observer);
    }

    pub fn slot_calculator(&self) -> &SlotCalculator {
        &self.slots
    }

    /// Book a visit at `request.start`.
    ///
    /// The requested start is re-validated against the current open slots,
    /// then inserted through the store's atomic conditional insert. Losing
    /// the insert race is retried once against a fresh slot query before
    /// surfacing `SlotUnavailable`.
    pub async fn schedule(&self, request: ScheduleRequest) -> Result<Appointment, SchedulingError> {
        info!(
            "Scheduling appointment for patient {} with provider {} at {}",
            request.patient_id, request.provider_id, request.start
        );
        match self.try_schedule(&request).await {
            Ok(appointment) => {
                self.audit
                    .record(AuditEvent::new(
                        Some(request.patient_id),
                        "appointment.scheduled",
                        "appointment",
                        appointment.id,
                        json!({ "provider_id": appointment.provider_id, "start": appointment.start }),
                    ))
                    .await;
                Ok(appointment)
            }
            Err(err) => {
                self.audit_failure(Some(request.patient_id), "appointment.schedule", &err)
                    .await;
                Err(err)
            }
        }
    }

    async fn try_schedule(&self, request: &ScheduleRequest) -> Result<Appointment, SchedulingError> {
        // A replayed request token short-circuits before slot validation,
        // since the original booking now occupies the requested interval.
        if let Some(token) = request.request_token {
            if let Some(existing) = self.store.find_by_request_token(token).await? {
                debug!("Request token {} replayed, returning booking {}", token, existing.id);
                return Ok(existing);
            }
        }

        let type_info = self.types.get_type(request.type_id).await?;
        let end = request.start + Duration::minutes(type_info.duration_minutes);

        if !self
            .slots
            .is_slot_open(request.provider_id, request.start, end, None)
            .await?
        {
            return Err(SchedulingError::SlotUnavailable);
        }

        let appointment = self.build_appointment(request, end);
        match self.store.insert_if_free(appointment.clone(), None).await {
            Ok(created) => Ok(created),
            Err(SchedulingError::Conflict(msg)) => {
                // Lost the race between re-validation and insert. Requery
                // once; if the interval is somehow still open, try again.
                warn!("Booking insert rejected ({}), retrying with fresh slot query", msg);
                if !self
                    .slots
                    .is_slot_open(request.provider_id, request.start, end, None)
                    .await?
                {
                    return Err(SchedulingError::SlotUnavailable);
                }
                self.store
                    .insert_if_free(appointment, None)
                    .await
                    .map_err(|err| match err {
                        SchedulingError::Conflict(_) => SchedulingError::SlotUnavailable,
                        other => other,
                    })
            }
            Err(other) => Err(other),
        }
    }

    /// Cancel a booking, enforcing the minimum-notice policy for
    /// non-privileged actors, and hand the freed interval to the registered
    /// observer.
    pub async fn cancel(
        &self,
        appointment_id: Uuid,
        reason: String,
        actor: Uuid,
    ) -> Result<Appointment, SchedulingError> {
        debug!("Cancelling appointment {}", appointment_id);
        match self.try_cancel(appointment_id, reason, actor).await {
            Ok(cancelled) => {
                self.audit
                    .record(AuditEvent::new(
                        Some(actor),
                        "appointment.cancelled",
                        "appointment",
                        cancelled.id,
                        json!({
                            "reason": cancelled.cancellation_reason,
                            "start": cancelled.start,
                        }),
                    ))
                    .await;
                Ok(cancelled)
            }
            Err(err) => {
                self.audit_failure(Some(actor), "appointment.cancel", &err).await;
                Err(err)
            }
        }
    }

    async fn try_cancel(
        &self,
        appointment_id: Uuid,
        reason: String,
        actor: Uuid,
    ) -> Result<Appointment, SchedulingError> {
        let appointment = self.store.get_appointment(appointment_id).await?;
        lifecycle::validate_status_transition(appointment.status, AppointmentStatus::Cancelled)?;

        let now = Utc::now();
        if !self.authorizer.is_privileged(actor).await {
            lifecycle::validate_cancellation_notice(
                appointment.start,
                now,
                self.config.min_cancellation_notice_hours,
            )?;
        }

        let cancelled = self
            .store
            .update_booking_status(
                appointment_id,
                AppointmentStatus::Cancelled,
                StatusMeta {
                    reason: Some(reason),
                    actor: Some(actor),
                    linked_appointment: None,
                    at: Some(now),
                },
            )
            .await?;

        if let Some(observer) = self.freed_slot_observer.read().await.clone() {
            observer
                .slot_freed(cancelled.provider_id, cancelled.start, cancelled.end)
                .await;
        }

        Ok(cancelled)
    }

    /// Move a booking to a new start as an atomic cancel-old/create-new
    /// pair. On any failure placing the replacement, the original is left
    /// untouched.
    pub async fn reschedule(
        &self,
        appointment_id: Uuid,
        new_start: DateTime<Utc>,
        actor: Uuid,
    ) -> Result<Appointment, SchedulingError> {
        debug!("Rescheduling appointment {} to {}", appointment_id, new_start);
        match self.try_reschedule(appointment_id, new_start, actor).await {
            Ok(replacement) => {
                self.audit
                    .record(AuditEvent::new(
                        Some(actor),
                        "appointment.rescheduled",
                        "appointment",
                        appointment_id,
                        json!({ "replacement_id": replacement.id, "new_start": replacement.start }),
                    ))
                    .await;
                Ok(replacement)
            }
            Err(err) => {
                self.audit_failure(Some(actor), "appointment.reschedule", &err)
                    .await;
                Err(err)
            }
        }
    }

    async fn try_reschedule(
        &self,
        appointment_id: Uuid,
        new_start: DateTime<Utc>,
        actor: Uuid,
    ) -> Result<Appointment, SchedulingError> {
        let original = self.store.get_appointment(appointment_id).await?;
        lifecycle::validate_status_transition(original.status, AppointmentStatus::Rescheduled)?;

        let type_info = self.types.get_type(original.type_id).await?;
        let new_end = new_start + Duration::minutes(type_info.duration_minutes);

        // The original's own interval does not block its replacement.
        if !self
            .slots
            .is_slot_open(original.provider_id, new_start, new_end, Some(appointment_id))
            .await?
        {
            return Err(SchedulingError::SlotUnavailable);
        }

        let now = Utc::now();
        let replacement = Appointment {
            id: Uuid::new_v4(),
            patient_id: original.patient_id,
            provider_id: original.provider_id,
            type_id: original.type_id,
            start: new_start,
            end: new_end,
            status: AppointmentStatus::Scheduled,
            cancellation_reason: None,
            cancelled_at: None,
            cancelled_by: None,
            rescheduled_from: Some(original.id),
            rescheduled_to: None,
            request_token: None,
            confirmed_at: None,
            created_at: now,
            updated_at: now,
        };

        let inserted = match self
            .store
            .insert_if_free(replacement, Some(appointment_id))
            .await
        {
            Ok(created) => created,
            Err(SchedulingError::Conflict(_)) => return Err(SchedulingError::SlotUnavailable),
            Err(other) => return Err(other),
        };

        // Terminate the original. If it raced into a terminal state in the
        // meantime, compensate by cancelling the replacement we just placed.
        match self
            .store
            .update_booking_status(
                appointment_id,
                AppointmentStatus::Rescheduled,
                StatusMeta {
                    reason: None,
                    actor: Some(actor),
                    linked_appointment: Some(inserted.id),
                    at: Some(now),
                },
            )
            .await
        {
            Ok(_) => Ok(inserted),
            Err(err) => {
                warn!(
                    "Original appointment {} changed state mid-reschedule, reverting replacement {}",
                    appointment_id, inserted.id
                );
                let _ = self
                    .store
                    .update_booking_status(
                        inserted.id,
                        AppointmentStatus::Cancelled,
                        StatusMeta {
                            reason: Some("reschedule reverted".to_string()),
                            actor: Some(actor),
                            linked_appointment: None,
                            at: Some(Utc::now()),
                        },
                    )
                    .await;
                Err(err)
            }
        }
    }

    /// Confirm a scheduled booking.
    pub async fn confirm(&self, appointment_id: Uuid, actor: Uuid) -> Result<Appointment, SchedulingError> {
        self.transition(appointment_id, AppointmentStatus::Confirmed, actor, "appointment.confirmed")
            .await
    }

    /// Mark the patient as arrived.
    pub async fn check_in(&self, appointment_id: Uuid, actor: Uuid) -> Result<Appointment, SchedulingError> {
        self.transition(appointment_id, AppointmentStatus::CheckedIn, actor, "appointment.checked_in")
            .await
    }

    /// Close out a checked-in visit.
    pub async fn complete(&self, appointment_id: Uuid, actor: Uuid) -> Result<Appointment, SchedulingError> {
        self.transition(appointment_id, AppointmentStatus::Completed, actor, "appointment.completed")
            .await
    }

    pub async fn get_appointment(&self, appointment_id: Uuid) -> Result<Appointment, SchedulingError> {
        self.store.get_appointment(appointment_id).await
    }

    async fn transition(
        &self,
        appointment_id: Uuid,
        next: AppointmentStatus,
        actor: Uuid,
        action: &str,
    ) -> Result<Appointment, SchedulingError> {
        let result = self
            .store
            .update_booking_status(appointment_id, next, StatusMeta::at(Utc::now()))
            .await;
        match result {
            Ok(appointment) => {
                self.audit
                    .record(AuditEvent::new(
                        Some(actor),
                        action,
                        "appointment",
                        appointment.id,
                        json!({ "status": appointment.status.to_string() }),
                    ))
                    .await;
                Ok(appointment)
            }
            Err(err) => {
                self.audit_failure(Some(actor), action, &err).await;
                Err(err)
            }
        }
    }

    fn build_appointment(&self, request: &ScheduleRequest, end: DateTime<Utc>) -> Appointment {
        let now = Utc::now();
        Appointment {
            id: Uuid::new_v4(),
            patient_id: request.patient_id,
            provider_id: request.provider_id,
            type_id: request.type_id,
            start: request.start,
            end,
            status: AppointmentStatus::Scheduled,
            cancellation_reason: None,
            cancelled_at: None,
            cancelled_by: None,
            rescheduled_from: None,
            rescheduled_to: None,
            request_token: request.request_token,
            confirmed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    async fn audit_failure(&self, actor: Option<Uuid>, action: &str, err: &SchedulingError) {
        self.audit
            .record(AuditEvent::new(
                actor,
                &format!("{}.failed", action),
                "appointment",
                "-",
                json!({ "kind": err.kind(), "message": err.to_string() }),
            ))
            .await;
    }
}
