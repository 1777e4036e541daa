//! Tier capacity reservation.
//!
//! Manages the limited-inventory side of signup: each capped tier holds a
//! fixed number of subscription slots, and concurrent signups race for the
//! last ones. The counter check and increment are delegated to the store's
//! atomic primitive so that the cap holds under arbitrary interleavings.

use std::sync::Arc;

use crate::club::error::MembershipError;
use crate::club::storage::{LedgerStore, ReservationOutcome};
use crate::club::tiers::TierAvailability;
use crate::club::validation::{validate_customer_id, validate_tier_id};
use crate::error::Result;

/// Default retries for reservation attempts that hit transient conflicts.
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Service for reserving and releasing tier subscription slots.
pub struct ReservationService<S: LedgerStore> {
    store: Arc<S>,
    max_retries: u32,
}

impl<S: LedgerStore> Clone for ReservationService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            max_retries: self.max_retries,
        }
    }
}

impl<S: LedgerStore> ReservationService<S> {
    /// Create a new reservation service.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Override the retry budget for conflicted reservation attempts.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Attempt to reserve a subscription slot on a tier.
    ///
    /// Returns the reservation outcome; `reserved: false` with a full tier is
    /// an expected result the caller branches on, not an error. The tier must
    /// exist and be open for signup.
    ///
    /// Transient conflicts from optimistic stores are retried up to the
    /// configured retry budget before giving up.
    ///
    /// # Errors
    ///
    /// Returns an error if either ID is invalid, the tier does not exist,
    /// the tier is inactive, or the store fails.
    pub async fn reserve_slot(
        &self,
        tier_id: &str,
        requester_id: &str,
    ) -> Result<ReservationOutcome> {
        validate_tier_id(tier_id)?;
        validate_customer_id(requester_id)?;

        let tier = self
            .store
            .get_tier(tier_id)
            .await?
            .ok_or_else(|| MembershipError::TierNotFound {
                tier_id: tier_id.to_string(),
            })?;

        if !tier.is_active {
            return Err(MembershipError::TierInactive {
                tier_id: tier_id.to_string(),
            }
            .into());
        }

        let mut attempts = 0;
        loop {
            match self.store.try_reserve_slot(tier_id).await {
                Ok(outcome) => {
                    if outcome.reserved {
                        tracing::info!(
                            tier_id = %tier_id,
                            requester_id = %requester_id,
                            current = outcome.current,
                            max = ?outcome.max,
                            "reserved subscription slot"
                        );
                    } else {
                        tracing::info!(
                            tier_id = %tier_id,
                            requester_id = %requester_id,
                            current = outcome.current,
                            max = ?outcome.max,
                            "tier sold out, reservation refused"
                        );
                    }
                    return Ok(outcome);
                }
                Err(err) if err.is_conflict() && attempts < self.max_retries => {
                    attempts += 1;
                    tracing::debug!(
                        tier_id = %tier_id,
                        attempt = attempts,
                        "reservation conflict, retrying"
                    );
                }
                Err(err) if err.is_conflict() => {
                    return Err(MembershipError::RetryLimitExceeded {
                        operation: format!("reserve_slot({})", tier_id),
                    }
                    .into());
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Release a previously reserved slot.
    ///
    /// The compensating half of reservation: called when a signup fails after
    /// the slot was taken, so the slot returns to the pool. Saturates at zero.
    ///
    /// # Errors
    ///
    /// Returns an error if the tier ID is invalid or the tier does not exist.
    pub async fn release_slot(&self, tier_id: &str) -> Result<()> {
        validate_tier_id(tier_id)?;
        self.store.release_slot(tier_id).await?;
        tracing::info!(tier_id = %tier_id, "released subscription slot");
        Ok(())
    }

    /// Get availability for all active tiers, ordered for display.
    ///
    /// Availability is computed from live counters at read time; it can be
    /// stale by the time a signup is attempted, which is why signup always
    /// goes through [`reserve_slot`](Self::reserve_slot) rather than trusting
    /// this snapshot.
    pub async fn get_availability(&self) -> Result<Vec<TierAvailability>> {
        let tiers = self.store.list_tiers().await?;
        Ok(tiers.iter().map(TierAvailability::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::club::memory::InMemoryLedgerStore;
    use crate::club::tiers::{AvailabilityBand, StoredTier};
    use crate::error::ClubError;

    fn tier(id: &str, max: Option<u32>) -> StoredTier {
        let mut t = StoredTier::new(id, id.to_uppercase());
        t.max_subscriptions = max;
        t
    }

    fn service_with(tiers: Vec<StoredTier>) -> ReservationService<InMemoryLedgerStore> {
        let store = InMemoryLedgerStore::new();
        store.seed_tiers(tiers);
        ReservationService::new(Arc::new(store))
    }

    #[tokio::test]
    async fn test_reserve_until_sold_out() {
        let service = service_with(vec![tier("elite", Some(2))]);

        assert!(service.reserve_slot("elite", "user_1").await.unwrap().reserved);
        assert!(service.reserve_slot("elite", "user_1").await.unwrap().reserved);

        let full = service.reserve_slot("elite", "user_1").await.unwrap();
        assert!(!full.reserved);
        assert_eq!(full.current, 2);
    }

    #[tokio::test]
    async fn test_reserve_unknown_tier() {
        let service = service_with(vec![]);
        let err = service.reserve_slot("ghost", "user_1").await.unwrap_err();
        assert!(matches!(err, ClubError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_reserve_invalid_tier_id() {
        let service = service_with(vec![]);
        let err = service.reserve_slot("elite; DROP TABLE", "user_1").await.unwrap_err();
        assert!(matches!(err, ClubError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_reserve_inactive_tier() {
        let mut legacy = tier("legacy", Some(10));
        legacy.is_active = false;
        let service = service_with(vec![legacy]);

        let err = service.reserve_slot("legacy", "user_1").await.unwrap_err();
        assert!(matches!(err, ClubError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_release_returns_slot() {
        let service = service_with(vec![tier("elite", Some(1))]);

        assert!(service.reserve_slot("elite", "user_1").await.unwrap().reserved);
        assert!(!service.reserve_slot("elite", "user_1").await.unwrap().reserved);

        service.release_slot("elite").await.unwrap();
        assert!(service.reserve_slot("elite", "user_1").await.unwrap().reserved);
    }

    #[tokio::test]
    async fn test_concurrent_reservations_respect_cap() {
        let service = service_with(vec![tier("elite", Some(5))]);

        let mut handles = Vec::new();
        for _ in 0..20 {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                service.reserve_slot("elite", "user_1").await.unwrap().reserved
            }));
        }

        let mut reserved = 0;
        for handle in handles {
            if handle.await.unwrap() {
                reserved += 1;
            }
        }
        assert_eq!(reserved, 5);
    }

    #[tokio::test]
    async fn test_availability_snapshot() {
        let mut select = tier("select", None);
        select.sort_order = 1;
        let mut reserve = tier("reserve", Some(4));
        reserve.sort_order = 2;
        let service = service_with(vec![select, reserve]);

        service.reserve_slot("reserve", "user_1").await.unwrap();
        service.reserve_slot("reserve", "user_1").await.unwrap();
        service.reserve_slot("reserve", "user_1").await.unwrap();

        let availability = service.get_availability().await.unwrap();
        assert_eq!(availability.len(), 2);
        assert_eq!(availability[0].tier_id, "select");
        assert_eq!(availability[0].status_band, AvailabilityBand::Available);
        assert_eq!(availability[1].tier_id, "reserve");
        assert_eq!(availability[1].current_subscriptions, 3);
        assert!(availability[1].available);
        assert_eq!(availability[1].status_band, AvailabilityBand::Limited);
    }
}
