//! Storage trait for the membership ledger.
//!
//! The ledger store is the single shared mutable resource: all cross-request
//! coordination happens through its atomic primitives, never through an
//! in-process lock, since the services run across stateless request handlers.
//!
//! Implementations must make [`try_reserve_slot`](LedgerStore::try_reserve_slot),
//! [`insert_pour_within_quota`](LedgerStore::insert_pour_within_quota), and
//! [`reverse_pour`](LedgerStore::reverse_pour) genuinely atomic:
//!
//! - **PostgreSQL**: `UPDATE tiers SET current_subscriptions =
//!   current_subscriptions + 1 WHERE ... AND current_subscriptions <
//!   max_subscriptions RETURNING ...` for reservation, and a transaction with
//!   `SELECT ... FOR UPDATE` on the customer row for redemption.
//! - **In-memory**: perform the check and the write under one lock
//!   acquisition.
//!
//! A check in application code followed by a separate write is never
//! acceptable: two concurrent signups must not both observe "one slot left".

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::customer::{Customer, Membership};
use super::pour::{Pour, PourLocation};
use super::tiers::StoredTier;
use crate::error::Result;

/// Result of an atomic capacity reservation attempt.
///
/// Not persisted as its own entity: it exists only transiently during the
/// signup transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct ReservationOutcome {
    /// Whether a slot was reserved.
    pub reserved: bool,
    /// The tier's subscription count after the attempt.
    pub current: u32,
    /// The tier's cap (None = unlimited).
    pub max: Option<u32>,
}

/// Fields for a pour row about to be inserted.
#[derive(Debug, Clone)]
pub struct NewPour {
    pub customer_id: String,
    pub quantity: u32,
    pub location: PourLocation,
    pub recorded_by: String,
    pub notes: Option<String>,
    pub reference: Uuid,
}

/// Result of the atomic quota-checked pour insert.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum PourInsertOutcome {
    /// The pour was recorded and counters updated.
    Inserted(Pour),
    /// The redemption would exceed the remaining period balance. Nothing was
    /// written.
    QuotaExceeded { requested: u32, available: u32 },
    /// The idempotency reference was already used; the previously recorded
    /// pour is returned and nothing was written.
    DuplicateReference(Pour),
}

/// Result of an atomic pour reversal.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum ReversalOutcome {
    /// The pour was flipped to `reversed` and the lifetime counter decremented.
    Reversed(Pour),
    /// The pour exists but is not in a reversible state.
    NotReversible(Pour),
    /// No pour with that ID exists.
    NotFound,
}

/// Trait for storing membership ledger data.
///
/// Implement this trait to persist tiers, customers, memberships, and pours
/// to your database. An in-memory implementation
/// ([`InMemoryLedgerStore`](super::memory::InMemoryLedgerStore)) is provided
/// for development and testing, and a PostgreSQL implementation is available
/// behind the `postgres` feature.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    // Tier management

    /// Get a tier by ID.
    async fn get_tier(&self, tier_id: &str) -> Result<Option<StoredTier>>;

    /// Get all active tiers, ordered by sort_order.
    async fn list_tiers(&self) -> Result<Vec<StoredTier>>;

    /// Get all tiers (including inactive), ordered by sort_order.
    async fn list_all_tiers(&self) -> Result<Vec<StoredTier>>;

    /// Create a new tier.
    async fn create_tier(&self, tier: &StoredTier) -> Result<()>;

    /// Update an existing tier's definition (price, quota, cap edits).
    ///
    /// The subscription counter is not written through this method; it is
    /// owned by the reserve/release operations.
    async fn update_tier(&self, tier: &StoredTier) -> Result<()>;

    /// Activate or deactivate a tier.
    async fn set_tier_active(&self, tier_id: &str, is_active: bool) -> Result<()>;

    // Capacity reservation

    /// Atomically test-and-increment a tier's subscription counter.
    ///
    /// For capped tiers the test `current < max` and the increment happen in
    /// one indivisible step. Uncapped tiers always succeed and still
    /// increment the counter for reporting. Inactive tiers never reserve.
    ///
    /// Returns the outcome with the post-attempt count; a missing tier is a
    /// `NotFound` error.
    async fn try_reserve_slot(&self, tier_id: &str) -> Result<ReservationOutcome>;

    /// Release a previously reserved slot (compensating decrement).
    ///
    /// Saturates at zero; releasing against a missing tier is a `NotFound`
    /// error.
    async fn release_slot(&self, tier_id: &str) -> Result<()>;

    // Customers and memberships

    /// Get a customer by ID.
    async fn get_customer(&self, customer_id: &str) -> Result<Option<Customer>>;

    /// Create or update a customer record.
    async fn save_customer(&self, customer: &Customer) -> Result<()>;

    /// Get the customer's current active membership, if any.
    async fn get_active_membership(&self, customer_id: &str) -> Result<Option<Membership>>;

    /// Save a membership row.
    ///
    /// When the saved membership is `active`, any existing active membership
    /// for the same customer is superseded (flipped to `expired`) in the same
    /// step, preserving the at-most-one-active invariant.
    async fn save_membership(&self, membership: &Membership) -> Result<()>;

    // Pours

    /// Sum the quantities of `redeemed` pours for a customer within
    /// `[period_start, period_end)`.
    async fn sum_redeemed_pours(
        &self,
        customer_id: &str,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<u32>;

    /// Atomically verify the period quota and insert a pour.
    ///
    /// In one critical section: re-check the idempotency reference, re-sum
    /// the period's redeemed quantities, reject if `used + quantity > quota`,
    /// otherwise insert the `redeemed` pour, bump the customer's lifetime
    /// counter, and touch their last-activity timestamp. Two staff racing on
    /// the same customer's balance must not both succeed past the quota.
    async fn insert_pour_within_quota(
        &self,
        pour: &NewPour,
        quota: u32,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<PourInsertOutcome>;

    /// Get a pour by ID.
    async fn get_pour(&self, pour_id: Uuid) -> Result<Option<Pour>>;

    /// Atomically flip a `redeemed` pour to `reversed` and decrement the
    /// customer's lifetime counter by its quantity.
    async fn reverse_pour(&self, pour_id: Uuid) -> Result<ReversalOutcome>;
}
