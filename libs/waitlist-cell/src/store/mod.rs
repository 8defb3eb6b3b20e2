pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use shared_models::SchedulingError;

use crate::models::{WaitlistEntry, WaitlistOffer, WaitlistStatus};

/// Storage contract for waitlist entries and offers.
///
/// Implementors must enforce offer exclusivity: `insert_offer` fails with
/// `Conflict` while the entry already has an open, unexpired offer.
#[async_trait]
pub trait WaitlistStore: Send + Sync {
    async fn insert_entry(&self, entry: WaitlistEntry) -> Result<WaitlistEntry, SchedulingError>;

    async fn get_entry(&self, id: Uuid) -> Result<WaitlistEntry, SchedulingError>;

    /// The single Active entry for a (patient, type) pair, if any.
    async fn find_active_entry(
        &self,
        patient_id: Uuid,
        type_id: Uuid,
    ) -> Result<Option<WaitlistEntry>, SchedulingError>;

    async fn list_entries_by_status(
        &self,
        status: WaitlistStatus,
    ) -> Result<Vec<WaitlistEntry>, SchedulingError>;

    /// Persist an updated entry record.
    async fn save_entry(&self, entry: WaitlistEntry) -> Result<WaitlistEntry, SchedulingError>;

    async fn insert_offer(&self, offer: WaitlistOffer) -> Result<WaitlistOffer, SchedulingError>;

    async fn get_offer(&self, id: Uuid) -> Result<WaitlistOffer, SchedulingError>;

    async fn save_offer(&self, offer: WaitlistOffer) -> Result<WaitlistOffer, SchedulingError>;

    /// Offers still marked open whose expiry has passed; any worker may
    /// reclaim these, so a crashed matcher never strands a slot.
    async fn list_expired_open_offers(
        &self,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<WaitlistOffer>, SchedulingError>;

    /// Open, unexpired offers for a provider. These act as holds: the
    /// matcher will not offer an interval that is already out on offer.
    async fn list_open_offers_for_provider(
        &self,
        provider_id: Uuid,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<WaitlistOffer>, SchedulingError>;
}
