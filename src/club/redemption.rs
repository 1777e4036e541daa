//! Pour redemption recording.
//!
//! Staff-facing write path: validates the request, resolves the member's
//! current billing period, then hands the quota check and insert to the
//! store's atomic primitive so two staff racing on the same member's balance
//! cannot both slip past the quota.

use std::sync::Arc;

use uuid::Uuid;

use crate::club::error::MembershipError;
use crate::club::pour::{Pour, PourRequest};
use crate::club::storage::{LedgerStore, NewPour, PourInsertOutcome, ReversalOutcome};
use crate::club::validation::validate_customer_id;
use crate::error::Result;

/// Service for recording and reversing pour redemptions.
pub struct RedemptionRecorder<S: LedgerStore> {
    store: Arc<S>,
}

impl<S: LedgerStore> Clone for RedemptionRecorder<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: LedgerStore> RedemptionRecorder<S> {
    /// Create a new redemption recorder.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Record a pour redemption against the customer's period balance.
    ///
    /// A request without an idempotency reference gets a fresh one. Replaying
    /// a reference returns the originally recorded pour without counting it
    /// again, so point-of-sale retries are safe.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails, the customer is unknown, the
    /// customer has no active membership (reported as a zero-balance quota
    /// rejection), or the redemption would exceed the remaining balance.
    pub async fn record_pour(&self, request: &PourRequest) -> Result<Pour> {
        validate_customer_id(&request.customer_id)?;

        if request.quantity < 1 {
            return Err(MembershipError::InvalidQuantity {
                quantity: request.quantity,
            }
            .into());
        }

        self.store
            .get_customer(&request.customer_id)
            .await?
            .ok_or_else(|| MembershipError::CustomerNotFound {
                customer_id: request.customer_id.clone(),
            })?;

        // No active membership means no entitlement: the request is rejected
        // the same way an exhausted balance is.
        let Some(membership) = self.store.get_active_membership(&request.customer_id).await?
        else {
            return Err(MembershipError::QuotaExceeded {
                requested: request.quantity,
                available: 0,
            }
            .into());
        };

        let tier = self
            .store
            .get_tier(&membership.tier_id)
            .await?
            .ok_or_else(|| MembershipError::Internal {
                message: format!(
                    "membership {} references missing tier '{}'",
                    membership.id, membership.tier_id
                ),
            })?;

        let new_pour = NewPour {
            customer_id: request.customer_id.clone(),
            quantity: request.quantity,
            location: request.location,
            recorded_by: request.recorded_by.clone(),
            notes: request.notes.clone(),
            reference: request.reference.unwrap_or_else(Uuid::new_v4),
        };

        let outcome = self
            .store
            .insert_pour_within_quota(
                &new_pour,
                tier.monthly_pours,
                membership.period_start,
                membership.period_end,
            )
            .await?;

        match outcome {
            PourInsertOutcome::Inserted(pour) => {
                tracing::info!(
                    customer_id = %pour.customer_id,
                    pour_id = %pour.id,
                    quantity = pour.quantity,
                    location = %pour.location,
                    recorded_by = %pour.recorded_by,
                    "recorded pour redemption"
                );
                Ok(pour)
            }
            PourInsertOutcome::QuotaExceeded {
                requested,
                available,
            } => Err(MembershipError::QuotaExceeded {
                requested,
                available,
            }
            .into()),
            PourInsertOutcome::DuplicateReference(pour) => {
                tracing::debug!(
                    customer_id = %pour.customer_id,
                    pour_id = %pour.id,
                    reference = %pour.reference,
                    "duplicate redemption reference, returning original pour"
                );
                Ok(pour)
            }
        }
    }

    /// Look up a recorded pour.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no pour with that ID exists.
    pub async fn get_pour(&self, pour_id: Uuid) -> Result<Pour> {
        self.store
            .get_pour(pour_id)
            .await?
            .ok_or_else(|| {
                MembershipError::PourNotFound {
                    pour_id: pour_id.to_string(),
                }
                .into()
            })
    }

    /// Reverse a redeemed pour, returning its quantity to the period balance.
    ///
    /// Only `redeemed` pours are reversible; reversing twice is rejected.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown pour and `BadRequest` when the pour
    /// is not in a reversible state.
    pub async fn reverse_pour(&self, pour_id: Uuid) -> Result<Pour> {
        match self.store.reverse_pour(pour_id).await? {
            ReversalOutcome::Reversed(pour) => {
                tracing::info!(
                    customer_id = %pour.customer_id,
                    pour_id = %pour.id,
                    quantity = pour.quantity,
                    "reversed pour redemption"
                );
                Ok(pour)
            }
            ReversalOutcome::NotReversible(pour) => Err(MembershipError::PourNotReversible {
                pour_id: pour.id.to_string(),
                status: pour.status.to_string(),
            }
            .into()),
            ReversalOutcome::NotFound => Err(MembershipError::PourNotFound {
                pour_id: pour_id.to_string(),
            }
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::club::customer::{Customer, Membership, MembershipStatus};
    use crate::club::memory::InMemoryLedgerStore;
    use crate::club::pour::{PourLocation, PourStatus};
    use crate::club::tiers::StoredTier;
    use crate::error::ClubError;
    use chrono::{Duration, Utc};

    async fn recorder_with_member(
        monthly_pours: u32,
    ) -> (RedemptionRecorder<InMemoryLedgerStore>, Arc<InMemoryLedgerStore>) {
        let store = Arc::new(InMemoryLedgerStore::new());
        let mut tier = StoredTier::new("select", "Select");
        tier.monthly_pours = monthly_pours;
        store.seed_tiers(vec![tier]);

        store
            .save_customer(&Customer::new("cust_1", "user_1", "select"))
            .await
            .unwrap();

        let start = Utc::now() - Duration::days(5);
        store
            .save_membership(&Membership {
                id: Uuid::new_v4(),
                customer_id: "cust_1".to_string(),
                tier_id: "select".to_string(),
                monthly_price_cents: 4900,
                status: MembershipStatus::Active,
                period_start: start,
                period_end: start + Duration::days(30),
                external_subscription_id: None,
                updated_at: start,
            })
            .await
            .unwrap();

        (RedemptionRecorder::new(Arc::clone(&store)), store)
    }

    fn request(quantity: u32) -> PourRequest {
        PourRequest {
            customer_id: "cust_1".to_string(),
            quantity,
            location: PourLocation::MainBar,
            recorded_by: "staff_1".to_string(),
            notes: None,
            reference: None,
        }
    }

    #[tokio::test]
    async fn test_record_pour() {
        let (recorder, _store) = recorder_with_member(4).await;

        let pour = recorder.record_pour(&request(2)).await.unwrap();
        assert_eq!(pour.quantity, 2);
        assert_eq!(pour.status, PourStatus::Redeemed);
        assert_eq!(pour.recorded_by, "staff_1");
    }

    #[tokio::test]
    async fn test_zero_quantity_rejected() {
        let (recorder, _store) = recorder_with_member(4).await;

        let err = recorder.record_pour(&request(0)).await.unwrap_err();
        assert!(matches!(err, ClubError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_unknown_customer_rejected() {
        let (recorder, _store) = recorder_with_member(4).await;

        let mut req = request(1);
        req.customer_id = "ghost".to_string();
        let err = recorder.record_pour(&req).await.unwrap_err();
        assert!(matches!(err, ClubError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_no_membership_reads_as_zero_balance() {
        let store = Arc::new(InMemoryLedgerStore::new());
        store.seed_tiers(vec![StoredTier::new("select", "Select")]);
        store
            .save_customer(&Customer::new("cust_1", "user_1", "select"))
            .await
            .unwrap();
        let recorder = RedemptionRecorder::new(store);

        let err = recorder.record_pour(&request(1)).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot redeem 1 pours, only 0 remain this period"
        );
    }

    #[tokio::test]
    async fn test_quota_enforced_across_requests() {
        let (recorder, _store) = recorder_with_member(4).await;

        // 4-pour quota: 3 succeeds, 2 is refused, the last 1 still fits
        recorder.record_pour(&request(3)).await.unwrap();

        let err = recorder.record_pour(&request(2)).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot redeem 2 pours, only 1 remain this period"
        );

        recorder.record_pour(&request(1)).await.unwrap();

        let err = recorder.record_pour(&request(1)).await.unwrap_err();
        assert!(matches!(err, ClubError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_duplicate_reference_returns_original() {
        let (recorder, store) = recorder_with_member(4).await;

        let mut req = request(2);
        req.reference = Some(Uuid::new_v4());

        let first = recorder.record_pour(&req).await.unwrap();
        let replay = recorder.record_pour(&req).await.unwrap();
        assert_eq!(first.id, replay.id);

        // Only one pour was written
        assert_eq!(store.all_pours().len(), 1);
    }

    #[tokio::test]
    async fn test_reverse_restores_balance() {
        let (recorder, _store) = recorder_with_member(4).await;

        recorder.record_pour(&request(3)).await.unwrap();
        let pour = recorder.record_pour(&request(1)).await.unwrap();

        // Balance exhausted
        assert!(recorder.record_pour(&request(1)).await.is_err());

        let reversed = recorder.reverse_pour(pour.id).await.unwrap();
        assert_eq!(reversed.status, PourStatus::Reversed);

        // The reversed quantity is redeemable again
        recorder.record_pour(&request(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_reverse_twice_rejected() {
        let (recorder, _store) = recorder_with_member(4).await;

        let pour = recorder.record_pour(&request(1)).await.unwrap();
        recorder.reverse_pour(pour.id).await.unwrap();

        let err = recorder.reverse_pour(pour.id).await.unwrap_err();
        assert!(matches!(err, ClubError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_reverse_unknown_pour() {
        let (recorder, _store) = recorder_with_member(4).await;

        let err = recorder.reverse_pour(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ClubError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_get_pour() {
        let (recorder, _store) = recorder_with_member(4).await;

        let pour = recorder.record_pour(&request(1)).await.unwrap();
        let fetched = recorder.get_pour(pour.id).await.unwrap();
        assert_eq!(fetched, pour);

        let err = recorder.get_pour(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ClubError::NotFound(_)));
    }
}
