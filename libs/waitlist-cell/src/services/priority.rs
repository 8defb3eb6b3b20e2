use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use booking_cell::store::BookingStore;
use shared_config::SchedulingConfig;
use shared_models::{AppointmentTypeDirectory, ClinicalRiskScorer, SchedulingError};

use crate::models::{PriorityFactor, PriorityScore, WaitlistEntry};

/// Computes waitlist priority scores.
///
/// The score is a sum of independently capped components; each component is
/// retained in the breakdown for audit. Given identical inputs the result
/// is identical — `as_of` is explicit and nothing here draws on ambient
/// state.
pub struct PriorityEngine {
    scorer: Arc<dyn ClinicalRiskScorer>,
    types: Arc<dyn AppointmentTypeDirectory>,
    bookings: Arc<dyn BookingStore>,
    config: SchedulingConfig,
}

impl PriorityEngine {
    pub fn new(
        scorer: Arc<dyn ClinicalRiskScorer>,
        types: Arc<dyn AppointmentTypeDirectory>,
        bookings: Arc<dyn BookingStore>,
        config: SchedulingConfig,
    ) -> Self {
        Self {
            scorer,
            types,
            bookings,
            config,
        }
    }

    pub async fn compute_priority(
        &self,
        entry: &WaitlistEntry,
        as_of: DateTime<Utc>,
    ) -> Result<PriorityScore, SchedulingError> {
        let mut factors = Vec::new();

        let clinical = self
            .scorer
            .score(entry.patient_id, entry.type_id)
            .await?
            .clamp(0, self.config.clinical_score_cap);
        factors.push(PriorityFactor::new("clinical", clinical));

        let days_waited = (as_of - entry.created_at).num_days().max(0);
        let wait_score =
            (days_waited * self.config.wait_points_per_day).min(self.config.wait_score_cap);
        factors.push(PriorityFactor::new("wait_time", wait_score));

        let type_info = self.types.get_type(entry.type_id).await?;
        if type_info.requires_pre_auth {
            factors.push(PriorityFactor::new(
                "type_urgency",
                self.config.preauth_urgency_bonus,
            ));
        }

        let lookback_start = as_of - Duration::days(self.config.cancellation_lookback_days);
        let recent_cancellations = self
            .bookings
            .count_recent_cancellations(entry.patient_id, lookback_start)
            .await? as i64;
        if recent_cancellations > 0 {
            factors.push(PriorityFactor::new(
                "cancellation_history",
                -(self.config.cancellation_penalty * recent_cancellations),
            ));
        }

        // Declined and lapsed offers nudge the entry down so one subject
        // cannot hold a popular slot hostage, without zeroing their standing.
        let declined_offers = (entry.declines + entry.expiries) as i64;
        if declined_offers > 0 {
            factors.push(PriorityFactor::new(
                "offer_declines",
                -(self.config.decline_penalty * declined_offers),
            ));
        }

        let total: i64 = factors.iter().map(|f| f.points).sum();
        let score = total.max(1);

        debug!(
            "Priority for waitlist entry {}: {} ({} factors)",
            entry.id,
            score,
            factors.len()
        );
        Ok(PriorityScore { score, factors })
    }
}
