//! Monthly pour allowance calculation.
//!
//! Answers "how many pours does this member have left this period". The
//! entitlement comes from the tier's monthly quota, usage from the sum of
//! redeemed pours within the membership's current billing period.

use std::sync::Arc;

use crate::club::error::MembershipError;
use crate::club::pour::PourAllowance;
use crate::club::storage::LedgerStore;
use crate::club::validation::validate_customer_id;
use crate::error::Result;

/// Service for computing a member's remaining pour balance.
pub struct AllowanceCalculator<S: LedgerStore> {
    store: Arc<S>,
}

impl<S: LedgerStore> Clone for AllowanceCalculator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: LedgerStore> AllowanceCalculator<S> {
    /// Create a new allowance calculator.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Get the customer's remaining pour balance for the current billing
    /// period.
    ///
    /// A customer without an active membership gets the zero allowance, not
    /// an error: dashboards render that as "no entitlement". The balance is
    /// clamped at zero even when usage exceeds the quota (a quota edit can
    /// leave past usage above the new ceiling).
    ///
    /// This read is advisory. Redemption re-checks the balance atomically at
    /// write time, so a stale read here can never cause over-redemption.
    ///
    /// # Errors
    ///
    /// Returns an error if the customer ID is invalid, the customer does not
    /// exist, or the membership references a missing tier.
    pub async fn get_available_pours(&self, customer_id: &str) -> Result<PourAllowance> {
        validate_customer_id(customer_id)?;

        self.store
            .get_customer(customer_id)
            .await?
            .ok_or_else(|| MembershipError::CustomerNotFound {
                customer_id: customer_id.to_string(),
            })?;

        let Some(membership) = self.store.get_active_membership(customer_id).await? else {
            return Ok(PourAllowance::none());
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

        let used = self
            .store
            .sum_redeemed_pours(customer_id, membership.period_start, membership.period_end)
            .await?;

        Ok(PourAllowance {
            available_pours: tier.monthly_pours.saturating_sub(used),
            pours_used: used,
            tier_max_pours: tier.monthly_pours,
            billing_period_start: membership.period_start,
            billing_period_end: membership.period_end,
        })
    }
}
