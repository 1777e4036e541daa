//! In-memory ledger store for development and testing.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::customer::{Customer, Membership, MembershipStatus};
use super::error::MembershipError;
use super::pour::{Pour, PourStatus};
use super::storage::{
    LedgerStore, NewPour, PourInsertOutcome, ReservationOutcome, ReversalOutcome,
};
use super::tiers::StoredTier;
use crate::error::Result;

/// In-memory ledger store.
///
/// All tables live behind a single lock so the quota-checked insert and the
/// capacity reservation are atomic with respect to each other, matching the
/// transactional guarantees a database-backed store provides. Wraps data in
/// `Arc` for cheap cloning.
#[derive(Default, Clone)]
pub struct InMemoryLedgerStore {
    inner: Arc<RwLock<Ledger>>,
}

#[derive(Default)]
struct Ledger {
    tiers: HashMap<String, StoredTier>,
    customers: HashMap<String, Customer>,
    memberships: Vec<Membership>,
    pours: Vec<Pour>,
    // idempotency reference -> pour id
    references: HashMap<Uuid, Uuid>,
}

impl Ledger {
    fn sum_redeemed(
        &self,
        customer_id: &str,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> u32 {
        self.pours
            .iter()
            .filter(|p| {
                p.customer_id == customer_id
                    && p.status == PourStatus::Redeemed
                    && p.created_at >= period_start
                    && p.created_at < period_end
            })
            .map(|p| p.quantity)
            .sum()
    }
}

impl InMemoryLedgerStore {
    /// Create a new in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed tiers for development or testing.
    pub fn seed_tiers(&self, tiers: Vec<StoredTier>) {
        let mut ledger = self.inner.write().unwrap();
        for tier in tiers {
            ledger.tiers.insert(tier.id.clone(), tier);
        }
    }

    /// Get all recorded pours (for testing).
    #[must_use]
    pub fn all_pours(&self) -> Vec<Pour> {
        self.inner.read().unwrap().pours.clone()
    }

    /// Get all memberships (for testing).
    #[must_use]
    pub fn all_memberships(&self) -> Vec<Membership> {
        self.inner.read().unwrap().memberships.clone()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn get_tier(&self, tier_id: &str) -> Result<Option<StoredTier>> {
        Ok(self.inner.read().unwrap().tiers.get(tier_id).cloned())
    }

    async fn list_tiers(&self) -> Result<Vec<StoredTier>> {
        let ledger = self.inner.read().unwrap();
        let mut active: Vec<StoredTier> = ledger
            .tiers
            .values()
            .filter(|t| t.is_active)
            .cloned()
            .collect();
        active.sort_by_key(|t| t.sort_order);
        Ok(active)
    }

    async fn list_all_tiers(&self) -> Result<Vec<StoredTier>> {
        let ledger = self.inner.read().unwrap();
        let mut all: Vec<StoredTier> = ledger.tiers.values().cloned().collect();
        all.sort_by_key(|t| t.sort_order);
        Ok(all)
    }

    async fn create_tier(&self, tier: &StoredTier) -> Result<()> {
        self.inner
            .write()
            .unwrap()
            .tiers
            .insert(tier.id.clone(), tier.clone());
        Ok(())
    }

    async fn update_tier(&self, tier: &StoredTier) -> Result<()> {
        let mut ledger = self.inner.write().unwrap();
        if let Some(existing) = ledger.tiers.get_mut(&tier.id) {
            // The counter is owned by reserve/release; keep the live value.
            let current = existing.current_subscriptions;
            *existing = tier.clone();
            existing.current_subscriptions = current;
            existing.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn set_tier_active(&self, tier_id: &str, is_active: bool) -> Result<()> {
        let mut ledger = self.inner.write().unwrap();
        if let Some(tier) = ledger.tiers.get_mut(tier_id) {
            tier.is_active = is_active;
            tier.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn try_reserve_slot(&self, tier_id: &str) -> Result<ReservationOutcome> {
        let mut ledger = self.inner.write().unwrap();
        let tier = ledger.tiers.get_mut(tier_id).ok_or_else(|| {
            MembershipError::TierNotFound {
                tier_id: tier_id.to_string(),
            }
        })?;

        if !tier.is_active {
            return Ok(ReservationOutcome {
                reserved: false,
                current: tier.current_subscriptions,
                max: tier.max_subscriptions,
            });
        }

        // Check and increment under the same lock: this is the sole
        // serialization point for the cap invariant.
        let reserved = match tier.max_subscriptions {
            Some(max) if tier.current_subscriptions >= max => false,
            _ => {
                tier.current_subscriptions += 1;
                tier.updated_at = Utc::now();
                true
            }
        };

        Ok(ReservationOutcome {
            reserved,
            current: tier.current_subscriptions,
            max: tier.max_subscriptions,
        })
    }

    async fn release_slot(&self, tier_id: &str) -> Result<()> {
        let mut ledger = self.inner.write().unwrap();
        let tier = ledger.tiers.get_mut(tier_id).ok_or_else(|| {
            MembershipError::TierNotFound {
                tier_id: tier_id.to_string(),
            }
        })?;

        tier.current_subscriptions = tier.current_subscriptions.saturating_sub(1);
        tier.updated_at = Utc::now();
        Ok(())
    }

    async fn get_customer(&self, customer_id: &str) -> Result<Option<Customer>> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .customers
            .get(customer_id)
            .cloned())
    }

    async fn save_customer(&self, customer: &Customer) -> Result<()> {
        self.inner
            .write()
            .unwrap()
            .customers
            .insert(customer.id.clone(), customer.clone());
        Ok(())
    }

    async fn get_active_membership(&self, customer_id: &str) -> Result<Option<Membership>> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .memberships
            .iter()
            .find(|m| m.customer_id == customer_id && m.is_active())
            .cloned())
    }

    async fn save_membership(&self, membership: &Membership) -> Result<()> {
        let mut ledger = self.inner.write().unwrap();

        if membership.is_active() {
            // At most one active membership per customer: supersede in the
            // same step as the save.
            for existing in ledger
                .memberships
                .iter_mut()
                .filter(|m| m.customer_id == membership.customer_id && m.is_active())
            {
                existing.status = MembershipStatus::Expired;
                existing.updated_at = Utc::now();
            }
        }

        if let Some(existing) = ledger.memberships.iter_mut().find(|m| m.id == membership.id) {
            *existing = membership.clone();
        } else {
            ledger.memberships.push(membership.clone());
        }
        Ok(())
    }

    async fn sum_redeemed_pours(
        &self,
        customer_id: &str,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<u32> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .sum_redeemed(customer_id, period_start, period_end))
    }

    async fn insert_pour_within_quota(
        &self,
        pour: &NewPour,
        quota: u32,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<PourInsertOutcome> {
        let mut ledger = self.inner.write().unwrap();

        // Idempotency: a replayed reference returns the original pour.
        if let Some(pour_id) = ledger.references.get(&pour.reference).copied() {
            if let Some(existing) = ledger.pours.iter().find(|p| p.id == pour_id) {
                return Ok(PourInsertOutcome::DuplicateReference(existing.clone()));
            }
        }

        if ledger.customers.get(&pour.customer_id).is_none() {
            return Err(MembershipError::CustomerNotFound {
                customer_id: pour.customer_id.clone(),
            }
            .into());
        }

        // Quota check and insert under the same lock acquisition.
        let used = ledger.sum_redeemed(&pour.customer_id, period_start, period_end);
        let available = quota.saturating_sub(used);
        if pour.quantity > available {
            return Ok(PourInsertOutcome::QuotaExceeded {
                requested: pour.quantity,
                available,
            });
        }

        let now = Utc::now();
        let record = Pour {
            id: Uuid::new_v4(),
            customer_id: pour.customer_id.clone(),
            quantity: pour.quantity,
            location: pour.location,
            status: PourStatus::Redeemed,
            recorded_by: pour.recorded_by.clone(),
            notes: pour.notes.clone(),
            reference: pour.reference,
            created_at: now,
        };

        ledger.references.insert(record.reference, record.id);
        ledger.pours.push(record.clone());

        if let Some(customer) = ledger.customers.get_mut(&pour.customer_id) {
            customer.lifetime_pours += u64::from(pour.quantity);
            customer.last_activity_at = Some(now);
        }

        Ok(PourInsertOutcome::Inserted(record))
    }

    async fn get_pour(&self, pour_id: Uuid) -> Result<Option<Pour>> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .pours
            .iter()
            .find(|p| p.id == pour_id)
            .cloned())
    }

    async fn reverse_pour(&self, pour_id: Uuid) -> Result<ReversalOutcome> {
        let mut ledger = self.inner.write().unwrap();

        let Some(index) = ledger.pours.iter().position(|p| p.id == pour_id) else {
            return Ok(ReversalOutcome::NotFound);
        };

        if ledger.pours[index].status != PourStatus::Redeemed {
            return Ok(ReversalOutcome::NotReversible(ledger.pours[index].clone()));
        }

        ledger.pours[index].status = PourStatus::Reversed;
        let reversed = ledger.pours[index].clone();

        if let Some(customer) = ledger.customers.get_mut(&reversed.customer_id) {
            customer.lifetime_pours =
                customer.lifetime_pours.saturating_sub(u64::from(reversed.quantity));
        }

        Ok(ReversalOutcome::Reversed(reversed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::club::pour::PourLocation;
    use chrono::Duration;

    fn capped_tier(id: &str, max: u32) -> StoredTier {
        let mut tier = StoredTier::new(id, id.to_uppercase());
        tier.max_subscriptions = Some(max);
        tier.monthly_pours = 4;
        tier
    }

    async fn active_member(
        store: &InMemoryLedgerStore,
        customer_id: &str,
    ) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = Utc::now() - Duration::days(1);
        let end = start + Duration::days(30);
        let customer = Customer::new(customer_id, format!("user_{}", customer_id), "select");
        let membership = Membership {
            id: Uuid::new_v4(),
            customer_id: customer_id.to_string(),
            tier_id: "select".to_string(),
            monthly_price_cents: 4900,
            status: MembershipStatus::Active,
            period_start: start,
            period_end: end,
            external_subscription_id: None,
            updated_at: start,
        };
        store.save_customer(&customer).await.unwrap();
        store.save_membership(&membership).await.unwrap();
        (start, end)
    }

    #[tokio::test]
    async fn test_reserve_and_release() {
        let store = InMemoryLedgerStore::new();
        store.seed_tiers(vec![capped_tier("elite", 2)]);

        let first = store.try_reserve_slot("elite").await.unwrap();
        assert!(first.reserved);
        assert_eq!(first.current, 1);

        let second = store.try_reserve_slot("elite").await.unwrap();
        assert!(second.reserved);
        assert_eq!(second.current, 2);

        let third = store.try_reserve_slot("elite").await.unwrap();
        assert!(!third.reserved);
        assert_eq!(third.current, 2);
        assert_eq!(third.max, Some(2));

        store.release_slot("elite").await.unwrap();
        let after_release = store.try_reserve_slot("elite").await.unwrap();
        assert!(after_release.reserved);
        assert_eq!(after_release.current, 2);
    }

    #[tokio::test]
    async fn test_reserve_unknown_tier() {
        let store = InMemoryLedgerStore::new();
        assert!(store.try_reserve_slot("ghost").await.is_err());
        assert!(store.release_slot("ghost").await.is_err());
    }

    #[tokio::test]
    async fn test_reserve_inactive_tier_refuses() {
        let store = InMemoryLedgerStore::new();
        let mut tier = capped_tier("legacy", 10);
        tier.is_active = false;
        store.seed_tiers(vec![tier]);

        let outcome = store.try_reserve_slot("legacy").await.unwrap();
        assert!(!outcome.reserved);
        assert_eq!(outcome.current, 0);
    }

    #[tokio::test]
    async fn test_unlimited_tier_still_counts() {
        let store = InMemoryLedgerStore::new();
        store.seed_tiers(vec![StoredTier::new("select", "Select")]);

        for expected in 1..=5 {
            let outcome = store.try_reserve_slot("select").await.unwrap();
            assert!(outcome.reserved);
            assert_eq!(outcome.current, expected);
            assert_eq!(outcome.max, None);
        }
    }

    #[tokio::test]
    async fn test_insert_pour_within_quota() {
        let store = InMemoryLedgerStore::new();
        store.seed_tiers(vec![capped_tier("select", 100)]);
        let (start, end) = active_member(&store, "cust_1").await;

        let pour = NewPour {
            customer_id: "cust_1".to_string(),
            quantity: 3,
            location: PourLocation::MainBar,
            recorded_by: "staff_1".to_string(),
            notes: None,
            reference: Uuid::new_v4(),
        };

        let outcome = store
            .insert_pour_within_quota(&pour, 4, start, end)
            .await
            .unwrap();
        assert!(matches!(outcome, PourInsertOutcome::Inserted(_)));

        let used = store
            .sum_redeemed_pours("cust_1", start, end)
            .await
            .unwrap();
        assert_eq!(used, 3);

        let customer = store.get_customer("cust_1").await.unwrap().unwrap();
        assert_eq!(customer.lifetime_pours, 3);
        assert!(customer.last_activity_at.is_some());
    }

    #[tokio::test]
    async fn test_insert_pour_quota_exceeded() {
        let store = InMemoryLedgerStore::new();
        store.seed_tiers(vec![capped_tier("select", 100)]);
        let (start, end) = active_member(&store, "cust_2").await;

        let first = NewPour {
            customer_id: "cust_2".to_string(),
            quantity: 3,
            location: PourLocation::MainBar,
            recorded_by: "staff_1".to_string(),
            notes: None,
            reference: Uuid::new_v4(),
        };
        store
            .insert_pour_within_quota(&first, 4, start, end)
            .await
            .unwrap();

        let second = NewPour {
            quantity: 2,
            reference: Uuid::new_v4(),
            ..first.clone()
        };
        let outcome = store
            .insert_pour_within_quota(&second, 4, start, end)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            PourInsertOutcome::QuotaExceeded {
                requested: 2,
                available: 1
            }
        );

        // Nothing was written
        assert_eq!(
            store.sum_redeemed_pours("cust_2", start, end).await.unwrap(),
            3
        );
        let customer = store.get_customer("cust_2").await.unwrap().unwrap();
        assert_eq!(customer.lifetime_pours, 3);
    }

    #[tokio::test]
    async fn test_duplicate_reference_not_double_counted() {
        let store = InMemoryLedgerStore::new();
        store.seed_tiers(vec![capped_tier("select", 100)]);
        let (start, end) = active_member(&store, "cust_3").await;

        let reference = Uuid::new_v4();
        let pour = NewPour {
            customer_id: "cust_3".to_string(),
            quantity: 1,
            location: PourLocation::Patio,
            recorded_by: "staff_1".to_string(),
            notes: None,
            reference,
        };

        let first = store
            .insert_pour_within_quota(&pour, 4, start, end)
            .await
            .unwrap();
        let PourInsertOutcome::Inserted(original) = first else {
            panic!("expected insert");
        };

        let replay = store
            .insert_pour_within_quota(&pour, 4, start, end)
            .await
            .unwrap();
        assert_eq!(replay, PourInsertOutcome::DuplicateReference(original));

        assert_eq!(
            store.sum_redeemed_pours("cust_3", start, end).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_reverse_pour() {
        let store = InMemoryLedgerStore::new();
        store.seed_tiers(vec![capped_tier("select", 100)]);
        let (start, end) = active_member(&store, "cust_4").await;

        let pour = NewPour {
            customer_id: "cust_4".to_string(),
            quantity: 2,
            location: PourLocation::TastingRoom,
            recorded_by: "staff_1".to_string(),
            notes: None,
            reference: Uuid::new_v4(),
        };
        let PourInsertOutcome::Inserted(recorded) = store
            .insert_pour_within_quota(&pour, 4, start, end)
            .await
            .unwrap()
        else {
            panic!("expected insert");
        };

        let outcome = store.reverse_pour(recorded.id).await.unwrap();
        let ReversalOutcome::Reversed(reversed) = outcome else {
            panic!("expected reversal");
        };
        assert_eq!(reversed.status, PourStatus::Reversed);

        // Reversed pours leave the period sum and the lifetime counter
        assert_eq!(
            store.sum_redeemed_pours("cust_4", start, end).await.unwrap(),
            0
        );
        let customer = store.get_customer("cust_4").await.unwrap().unwrap();
        assert_eq!(customer.lifetime_pours, 0);

        // Reversing twice is not permitted
        let again = store.reverse_pour(recorded.id).await.unwrap();
        assert!(matches!(again, ReversalOutcome::NotReversible(_)));

        let missing = store.reverse_pour(Uuid::new_v4()).await.unwrap();
        assert_eq!(missing, ReversalOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_save_membership_supersedes_active() {
        let store = InMemoryLedgerStore::new();
        let (_, _) = active_member(&store, "cust_5").await;

        let renewal = Membership {
            id: Uuid::new_v4(),
            customer_id: "cust_5".to_string(),
            tier_id: "select".to_string(),
            monthly_price_cents: 4900,
            status: MembershipStatus::Active,
            period_start: Utc::now(),
            period_end: Utc::now() + Duration::days(30),
            external_subscription_id: Some("sub_ext_1".to_string()),
            updated_at: Utc::now(),
        };
        store.save_membership(&renewal).await.unwrap();

        let active = store
            .get_active_membership("cust_5")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(active.id, renewal.id);

        // The old row was superseded, not deleted
        let all = store.all_memberships();
        assert_eq!(all.len(), 2);
        assert_eq!(
            all.iter().filter(|m| m.is_active()).count(),
            1
        );
    }
}
