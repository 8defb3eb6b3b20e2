use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use availability_cell::services::slots::SlotCalculator;
use availability_cell::store::ScheduleReader;
use booking_cell::models::{Appointment, ScheduleRequest};
use booking_cell::services::booking::{BookingService, FreedSlotObserver};
use shared_config::SchedulingConfig;
use shared_models::{
    AppointmentTypeDirectory, AuditEvent, AuditSink, Channel, NotificationSink, SchedulingError,
};

use crate::models::{
    EnrollRequest, OfferStatus, SweepReport, WaitlistEntry, WaitlistOffer, WaitlistStatus,
};
use crate::services::priority::PriorityEngine;
use crate::store::WaitlistStore;

/// Walks active waitlist entries in priority order and manages the
/// offer lifecycle. Runs on two triggers: freed-slot events (via
/// `FreedSlotObserver`) and a periodic sweep driven by the embedder.
pub struct WaitlistMatcher {
    store: Arc<dyn WaitlistStore>,
    priority: PriorityEngine,
    booking: Arc<BookingService>,
    reader: Arc<dyn ScheduleReader>,
    slots: SlotCalculator,
    types: Arc<dyn AppointmentTypeDirectory>,
    notifications: Arc<dyn NotificationSink>,
    audit: Arc<dyn AuditSink>,
    config: SchedulingConfig,
    /// Single-flight guard: two sweeps never walk the entry set at once.
    sweep_guard: Mutex<()>,
}

impl WaitlistMatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn WaitlistStore>,
        priority: PriorityEngine,
        booking: Arc<BookingService>,
        reader: Arc<dyn ScheduleReader>,
        types: Arc<dyn AppointmentTypeDirectory>,
        notifications: Arc<dyn NotificationSink>,
        audit: Arc<dyn AuditSink>,
        config: SchedulingConfig,
    ) -> Self {
        Self {
            store,
            priority,
            booking,
            slots: SlotCalculator::new(reader.clone()),
            reader,
            types,
            notifications,
            audit,
            config,
            sweep_guard: Mutex::new(()),
        }
    }

    /// Enroll a subject for an appointment type. Re-enrolling while an
    /// Active entry exists refreshes its constraints instead of creating a
    /// duplicate, preserving the entry's accrued wait time.
    pub async fn enroll(&self, request: EnrollRequest) -> Result<WaitlistEntry, SchedulingError> {
        let now = Utc::now();

        if let Some(mut existing) = self
            .store
            .find_active_entry(request.patient_id, request.type_id)
            .await?
        {
            debug!(
                "Refreshing active waitlist entry {} for patient {}",
                existing.id, request.patient_id
            );
            existing.preferred_provider_id = request.preferred_provider_id;
            existing.earliest_start = request.earliest_start;
            existing.latest_start = request.latest_start;
            existing.updated_at = now;
            return self.store.save_entry(existing).await;
        }

        let mut entry = WaitlistEntry {
            id: Uuid::new_v4(),
            patient_id: request.patient_id,
            type_id: request.type_id,
            preferred_provider_id: request.preferred_provider_id,
            earliest_start: request.earliest_start,
            latest_start: request.latest_start,
            priority: 1,
            priority_factors: vec![],
            status: WaitlistStatus::Active,
            declines: 0,
            expiries: 0,
            created_at: now,
            updated_at: now,
        };
        let score = self.priority.compute_priority(&entry, now).await?;
        entry.priority = score.score;
        entry.priority_factors = score.factors;

        let entry = self.store.insert_entry(entry).await?;
        info!(
            "Enrolled patient {} on waitlist for type {} (priority {})",
            entry.patient_id, entry.type_id, entry.priority
        );
        self.audit
            .record(AuditEvent::new(
                Some(entry.patient_id),
                "waitlist.enrolled",
                "waitlist_entry",
                entry.id,
                json!({ "type_id": entry.type_id, "priority": entry.priority }),
            ))
            .await;
        Ok(entry)
    }

    /// Run one matching sweep.
    ///
    /// Reclaims expired offers, recomputes priorities, then walks Active
    /// entries best-first, offering each its first matching open slot. A
    /// concurrent sweep backs off immediately and reports `skipped`. One
    /// entry's failure never aborts the sweep.
    pub async fn run_sweep(&self, as_of: DateTime<Utc>) -> Result<SweepReport, SchedulingError> {
        let _guard = match self.sweep_guard.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                debug!("Waitlist sweep already running, backing off");
                return Ok(SweepReport {
                    skipped: true,
                    ..SweepReport::default()
                });
            }
        };

        let mut report = SweepReport::default();
        report.offers_expired = self.reclaim_expired_offers(as_of).await;

        let mut entries = self
            .store
            .list_entries_by_status(WaitlistStatus::Active)
            .await?;
        for entry in &mut entries {
            match self.priority.compute_priority(entry, as_of).await {
                Ok(score) => {
                    entry.priority = score.score;
                    entry.priority_factors = score.factors;
                    entry.updated_at = as_of;
                    if let Err(err) = self.store.save_entry(entry.clone()).await {
                        warn!("Failed to persist priority for entry {}: {}", entry.id, err);
                    }
                }
                Err(err) => {
                    warn!(
                        "Priority computation failed for entry {}, keeping last score: {}",
                        entry.id, err
                    );
                }
            }
        }

        // Earlier registration wins ties.
        entries.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        report.entries_examined = entries.len();

        for entry in entries {
            match self.offer_first_match(&entry, as_of).await {
                Ok(true) => report.offers_made += 1,
                Ok(false) => {}
                Err(err) => {
                    warn!("Matching failed for waitlist entry {}: {}", entry.id, err);
                    report.failures += 1;
                    self.audit
                        .record(AuditEvent::new(
                            Some(entry.patient_id),
                            "waitlist.match_failed",
                            "waitlist_entry",
                            entry.id,
                            json!({ "kind": err.kind(), "message": err.to_string() }),
                        ))
                        .await;
                }
            }
        }

        info!(
            "Waitlist sweep complete: {} examined, {} offered, {} expired, {} failures",
            report.entries_examined, report.offers_made, report.offers_expired, report.failures
        );
        Ok(report)
    }

    /// Accept an open offer: books the slot through the coordinator and
    /// completes the entry. If the slot was lost in the meantime the entry
    /// is re-queued as Active.
    pub async fn accept_offer(&self, offer_id: Uuid) -> Result<Appointment, SchedulingError> {
        let now = Utc::now();
        let mut offer = self.store.get_offer(offer_id).await?;
        if !offer.is_open(now) {
            return Err(SchedulingError::invalid_state(format!(
                "offer {} is no longer open",
                offer_id
            )));
        }
        let mut entry = self.store.get_entry(offer.entry_id).await?;
        self.set_entry_status(&mut entry, WaitlistStatus::Accepted, now)?;
        self.store.save_entry(entry.clone()).await?;

        // The offer id doubles as the idempotency token, so a retried
        // accept cannot double-book.
        let request = ScheduleRequest {
            patient_id: entry.patient_id,
            provider_id: offer.provider_id,
            type_id: entry.type_id,
            start: offer.start,
            request_token: Some(offer.id),
        };

        match self.booking.schedule(request).await {
            Ok(appointment) => {
                offer.status = OfferStatus::Accepted;
                self.store.save_offer(offer.clone()).await?;
                self.set_entry_status(&mut entry, WaitlistStatus::Completed, now)?;
                self.store.save_entry(entry.clone()).await?;
                self.audit
                    .record(AuditEvent::new(
                        Some(entry.patient_id),
                        "waitlist.offer_accepted",
                        "waitlist_offer",
                        offer.id,
                        json!({ "appointment_id": appointment.id }),
                    ))
                    .await;
                Ok(appointment)
            }
            Err(err) => {
                warn!(
                    "Booking for accepted offer {} failed ({}), re-queuing entry {}",
                    offer.id, err, entry.id
                );
                offer.status = OfferStatus::Expired;
                self.store.save_offer(offer).await?;
                self.set_entry_status(&mut entry, WaitlistStatus::Active, now)?;
                self.store.save_entry(entry).await?;
                match err {
                    SchedulingError::Conflict(_) => Err(SchedulingError::SlotUnavailable),
                    other => Err(other),
                }
            }
        }
    }

    /// Decline an open offer. The entry returns to Active with a small
    /// priority adjustment so repeated declines do not keep blocking the
    /// slot for other subjects.
    pub async fn decline_offer(&self, offer_id: Uuid) -> Result<WaitlistEntry, SchedulingError> {
        let now = Utc::now();
        let mut offer = self.store.get_offer(offer_id).await?;
        if offer.status != OfferStatus::Open {
            return Err(SchedulingError::invalid_state(format!(
                "offer {} is already resolved",
                offer_id
            )));
        }
        offer.status = OfferStatus::Declined;
        self.store.save_offer(offer.clone()).await?;

        let mut entry = self.store.get_entry(offer.entry_id).await?;
        if entry.status == WaitlistStatus::Offered {
            entry.declines += 1;
            self.set_entry_status(&mut entry, WaitlistStatus::Active, now)?;
            match self.priority.compute_priority(&entry, now).await {
                Ok(score) => {
                    entry.priority = score.score;
                    entry.priority_factors = score.factors;
                }
                Err(err) => warn!(
                    "Priority recompute after decline failed for entry {}: {}",
                    entry.id, err
                ),
            }
            entry = self.store.save_entry(entry).await?;
        }

        self.audit
            .record(AuditEvent::new(
                Some(entry.patient_id),
                "waitlist.offer_declined",
                "waitlist_offer",
                offer.id,
                json!({ "declines": entry.declines }),
            ))
            .await;
        Ok(entry)
    }

    // ==========================================================================
    // PRIVATE HELPERS
    // ==========================================================================

    /// Flip expired-but-open offers to Expired and re-queue their entries.
    /// Failures are isolated per offer.
    async fn reclaim_expired_offers(&self, as_of: DateTime<Utc>) -> usize {
        let expired = match self.store.list_expired_open_offers(as_of).await {
            Ok(offers) => offers,
            Err(err) => {
                warn!("Could not list expired offers: {}", err);
                return 0;
            }
        };

        let mut reclaimed = 0;
        for mut offer in expired {
            offer.status = OfferStatus::Expired;
            if let Err(err) = self.store.save_offer(offer.clone()).await {
                warn!("Could not expire offer {}: {}", offer.id, err);
                continue;
            }
            match self.store.get_entry(offer.entry_id).await {
                Ok(mut entry) if entry.status == WaitlistStatus::Offered => {
                    entry.expiries += 1;
                    entry.status = WaitlistStatus::Active;
                    entry.updated_at = as_of;
                    if let Err(err) = self.store.save_entry(entry).await {
                        warn!("Could not re-queue entry {}: {}", offer.entry_id, err);
                    }
                }
                Ok(_) => {}
                Err(err) => warn!("Entry lookup failed for offer {}: {}", offer.id, err),
            }
            reclaimed += 1;
        }
        reclaimed
    }

    /// Offer the entry its first matching open slot, if any. Intervals
    /// already out on an open offer are treated as held.
    async fn offer_first_match(
        &self,
        entry: &WaitlistEntry,
        as_of: DateTime<Utc>,
    ) -> Result<bool, SchedulingError> {
        let type_info = self.types.get_type(entry.type_id).await?;
        let window_start = entry.earliest_start.max(as_of);
        let window_end = entry
            .latest_start
            .unwrap_or_else(|| as_of + Duration::days(self.config.match_horizon_days));
        if window_start >= window_end {
            return Ok(false);
        }

        let providers = match entry.preferred_provider_id {
            Some(provider_id) => vec![provider_id],
            None => self.reader.list_provider_ids().await?,
        };

        for provider_id in providers {
            let open_slots = self
                .slots
                .find_open_slots(
                    provider_id,
                    window_start,
                    window_end,
                    type_info.duration_minutes,
                )
                .await?;
            if open_slots.is_empty() {
                continue;
            }

            let holds = self
                .store
                .list_open_offers_for_provider(provider_id, as_of)
                .await?;
            let slot = open_slots.into_iter().find(|slot| {
                !holds
                    .iter()
                    .any(|held| held.start < slot.end && slot.start < held.end)
            });

            if let Some(slot) = slot {
                self.make_offer(entry, provider_id, slot.start, slot.end, as_of)
                    .await?;
                return Ok(true);
            }
        }

        Ok(false)
    }

    async fn make_offer(
        &self,
        entry: &WaitlistEntry,
        provider_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        as_of: DateTime<Utc>,
    ) -> Result<(), SchedulingError> {
        let offer = WaitlistOffer {
            id: Uuid::new_v4(),
            entry_id: entry.id,
            provider_id,
            start,
            end,
            expires_at: as_of + Duration::hours(self.config.offer_expiry_hours),
            status: OfferStatus::Open,
            created_at: as_of,
        };
        let offer = self.store.insert_offer(offer).await?;

        let mut entry = entry.clone();
        self.set_entry_status(&mut entry, WaitlistStatus::Offered, as_of)?;
        self.store.save_entry(entry.clone()).await?;

        info!(
            "Offered slot {} - {} with provider {} to waitlist entry {}",
            start, end, provider_id, entry.id
        );
        self.notifications
            .notify(
                entry.patient_id,
                &format!("An appointment slot on {} is available for you", start),
                Channel::Portal,
            )
            .await;
        self.audit
            .record(AuditEvent::new(
                Some(entry.patient_id),
                "waitlist.offer_created",
                "waitlist_offer",
                offer.id,
                json!({ "provider_id": provider_id, "start": start, "expires_at": offer.expires_at }),
            ))
            .await;
        Ok(())
    }

    fn set_entry_status(
        &self,
        entry: &mut WaitlistEntry,
        next: WaitlistStatus,
        at: DateTime<Utc>,
    ) -> Result<(), SchedulingError> {
        if !entry.status.can_transition(next) {
            return Err(SchedulingError::invalid_state(format!(
                "waitlist entry cannot move from {} to {}",
                entry.status, next
            )));
        }
        entry.status = next;
        entry.updated_at = at;
        Ok(())
    }
}

#[async_trait]
impl FreedSlotObserver for WaitlistMatcher {
    async fn slot_freed(&self, provider_id: Uuid, start: DateTime<Utc>, end: DateTime<Utc>) {
        debug!(
            "Interval {} - {} freed for provider {}, running waitlist sweep",
            start, end, provider_id
        );
        if let Err(err) = self.run_sweep(Utc::now()).await {
            warn!("Waitlist sweep after freed slot failed: {}", err);
        }
    }
}
