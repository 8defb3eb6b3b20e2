use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use shared_models::SchedulingError;

use crate::models::{OfferStatus, WaitlistEntry, WaitlistOffer, WaitlistStatus};
use crate::store::WaitlistStore;

/// In-process waitlist store.
#[derive(Default)]
pub struct MemoryWaitlistStore {
    entries: RwLock<HashMap<Uuid, WaitlistEntry>>,
    offers: RwLock<HashMap<Uuid, WaitlistOffer>>,
}

impl MemoryWaitlistStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl WaitlistStore for MemoryWaitlistStore {
    async fn insert_entry(&self, entry: WaitlistEntry) -> Result<WaitlistEntry, SchedulingError> {
        let mut entries = self.entries.write().await;
        if entry.status == WaitlistStatus::Active
            && entries.values().any(|e| {
                e.patient_id == entry.patient_id
                    && e.type_id == entry.type_id
                    && e.status == WaitlistStatus::Active
            })
        {
            return Err(SchedulingError::conflict(format!(
                "patient {} already has an active waitlist entry for type {}",
                entry.patient_id, entry.type_id
            )));
        }
        entries.insert(entry.id, entry.clone());
        Ok(entry)
    }

    async fn get_entry(&self, id: Uuid) -> Result<WaitlistEntry, SchedulingError> {
        self.entries
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| SchedulingError::not_found(format!("waitlist entry {}", id)))
    }

    async fn find_active_entry(
        &self,
        patient_id: Uuid,
        type_id: Uuid,
    ) -> Result<Option<WaitlistEntry>, SchedulingError> {
        Ok(self
            .entries
            .read()
            .await
            .values()
            .find(|e| {
                e.patient_id == patient_id
                    && e.type_id == type_id
                    && e.status == WaitlistStatus::Active
            })
            .cloned())
    }

    async fn list_entries_by_status(
        &self,
        status: WaitlistStatus,
    ) -> Result<Vec<WaitlistEntry>, SchedulingError> {
        let mut matching: Vec<WaitlistEntry> = self
            .entries
            .read()
            .await
            .values()
            .filter(|e| e.status == status)
            .cloned()
            .collect();
        matching.sort_by_key(|e| e.created_at);
        Ok(matching)
    }

    async fn save_entry(&self, entry: WaitlistEntry) -> Result<WaitlistEntry, SchedulingError> {
        let mut entries = self.entries.write().await;
        if !entries.contains_key(&entry.id) {
            return Err(SchedulingError::not_found(format!(
                "waitlist entry {}",
                entry.id
            )));
        }
        entries.insert(entry.id, entry.clone());
        Ok(entry)
    }

    async fn insert_offer(&self, offer: WaitlistOffer) -> Result<WaitlistOffer, SchedulingError> {
        let mut offers = self.offers.write().await;
        let has_open = offers.values().any(|existing| {
            existing.entry_id == offer.entry_id && existing.is_open(offer.created_at)
        });
        if has_open {
            return Err(SchedulingError::conflict(format!(
                "waitlist entry {} already has an open offer",
                offer.entry_id
            )));
        }
        offers.insert(offer.id, offer.clone());
        Ok(offer)
    }

    async fn get_offer(&self, id: Uuid) -> Result<WaitlistOffer, SchedulingError> {
        self.offers
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| SchedulingError::not_found(format!("waitlist offer {}", id)))
    }

    async fn save_offer(&self, offer: WaitlistOffer) -> Result<WaitlistOffer, SchedulingError> {
        let mut offers = self.offers.write().await;
        if !offers.contains_key(&offer.id) {
            return Err(SchedulingError::not_found(format!(
                "waitlist offer {}",
                offer.id
            )));
        }
        offers.insert(offer.id, offer.clone());
        Ok(offer)
    }

    async fn list_expired_open_offers(
        &self,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<WaitlistOffer>, SchedulingError> {
        Ok(self
            .offers
            .read()
            .await
            .values()
            .filter(|o| o.status == OfferStatus::Open && o.expires_at <= as_of)
            .cloned()
            .collect())
    }

    async fn list_open_offers_for_provider(
        &self,
        provider_id: Uuid,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<WaitlistOffer>, SchedulingError> {
        Ok(self
            .offers
            .read()
            .await
            .values()
            .filter(|o| o.provider_id == provider_id && o.is_open(as_of))
            .cloned()
            .collect())
    }
}
