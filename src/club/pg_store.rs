//! PostgreSQL-backed ledger store.
//!
//! The capacity check rides a single conditional `UPDATE ... RETURNING`, and
//! the quota-checked pour insert runs in a transaction that locks the
//! customer row. Both rely on the database for atomicity rather than any
//! in-process coordination, so the invariants hold across replicas.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::Row;
use uuid::Uuid;

use super::customer::{Customer, CustomerStatus, Membership, MembershipStatus};
use super::error::MembershipError;
use super::pour::{Pour, PourLocation, PourStatus};
use super::storage::{
    LedgerStore, NewPour, PourInsertOutcome, ReservationOutcome, ReversalOutcome,
};
use super::tiers::StoredTier;
use crate::error::{ClubError, Result};

/// PostgreSQL implementation of [`LedgerStore`].
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    /// Create a store backed by the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run pending schema migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| ClubError::Storage(format!("migration failed: {}", e)))?;
        Ok(())
    }

    fn tier_from_row(row: &sqlx::postgres::PgRow) -> Result<StoredTier> {
        Ok(StoredTier {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            monthly_price_cents: row.try_get("monthly_price_cents")?,
            currency: row.try_get("currency")?,
            monthly_pours: row.try_get::<i32, _>("monthly_pours")? as u32,
            max_subscriptions: row
                .try_get::<Option<i32>, _>("max_subscriptions")?
                .map(|n| n as u32),
            current_subscriptions: row.try_get::<i32, _>("current_subscriptions")? as u32,
            provider_price_id: row.try_get("provider_price_id")?,
            is_active: row.try_get("is_active")?,
            sort_order: row.try_get("sort_order")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn customer_from_row(row: &sqlx::postgres::PgRow) -> Result<Customer> {
        let status: String = row.try_get("status")?;
        Ok(Customer {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            tier_id: row.try_get("tier_id")?,
            status: CustomerStatus::parse(&status)
                .map_err(|e| ClubError::Storage(format!("bad customer row: {}", e)))?,
            lifetime_pours: row.try_get::<i64, _>("lifetime_pours")? as u64,
            member_since: row.try_get("member_since")?,
            household_partner_id: row.try_get("household_partner_id")?,
            last_activity_at: row.try_get("last_activity_at")?,
        })
    }

    fn membership_from_row(row: &sqlx::postgres::PgRow) -> Result<Membership> {
        let status: String = row.try_get("status")?;
        Ok(Membership {
            id: row.try_get("id")?,
            customer_id: row.try_get("customer_id")?,
            tier_id: row.try_get("tier_id")?,
            monthly_price_cents: row.try_get("monthly_price_cents")?,
            status: MembershipStatus::parse(&status)
                .map_err(|e| ClubError::Storage(format!("bad membership row: {}", e)))?,
            period_start: row.try_get("period_start")?,
            period_end: row.try_get("period_end")?,
            external_subscription_id: row.try_get("external_subscription_id")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn pour_from_row(row: &sqlx::postgres::PgRow) -> Result<Pour> {
        let status: String = row.try_get("status")?;
        let location: String = row.try_get("location")?;
        Ok(Pour {
            id: row.try_get("id")?,
            customer_id: row.try_get("customer_id")?,
            quantity: row.try_get::<i32, _>("quantity")? as u32,
            location: PourLocation::parse(&location)
                .map_err(|e| ClubError::Storage(format!("bad pour row: {}", e)))?,
            status: PourStatus::parse(&status)
                .map_err(|e| ClubError::Storage(format!("bad pour row: {}", e)))?,
            recorded_by: row.try_get("recorded_by")?,
            notes: row.try_get("notes")?,
            reference: row.try_get("reference")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

const POUR_COLUMNS: &str =
    "id, customer_id, quantity, location, status, recorded_by, notes, reference, created_at";

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn get_tier(&self, tier_id: &str) -> Result<Option<StoredTier>> {
        let row = sqlx::query("SELECT * FROM tiers WHERE id = $1")
            .bind(tier_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::tier_from_row).transpose()
    }

    async fn list_tiers(&self) -> Result<Vec<StoredTier>> {
        let rows = sqlx::query("SELECT * FROM tiers WHERE is_active ORDER BY sort_order")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::tier_from_row).collect()
    }

    async fn list_all_tiers(&self) -> Result<Vec<StoredTier>> {
        let rows = sqlx::query("SELECT * FROM tiers ORDER BY sort_order")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::tier_from_row).collect()
    }

    async fn create_tier(&self, tier: &StoredTier) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tiers
                (id, name, description, monthly_price_cents, currency, monthly_pours,
                 max_subscriptions, current_subscriptions, provider_price_id, is_active,
                 sort_order, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(&tier.id)
        .bind(&tier.name)
        .bind(&tier.description)
        .bind(tier.monthly_price_cents)
        .bind(&tier.currency)
        .bind(tier.monthly_pours as i32)
        .bind(tier.max_subscriptions.map(|n| n as i32))
        .bind(tier.current_subscriptions as i32)
        .bind(&tier.provider_price_id)
        .bind(tier.is_active)
        .bind(tier.sort_order)
        .bind(tier.created_at)
        .bind(tier.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_tier(&self, tier: &StoredTier) -> Result<()> {
        // current_subscriptions is deliberately absent: the counter is owned
        // by reserve/release.
        sqlx::query(
            r#"
            UPDATE tiers SET
                name = $2, description = $3, monthly_price_cents = $4, currency = $5,
                monthly_pours = $6, max_subscriptions = $7, provider_price_id = $8,
                is_active = $9, sort_order = $10, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(&tier.id)
        .bind(&tier.name)
        .bind(&tier.description)
        .bind(tier.monthly_price_cents)
        .bind(&tier.currency)
        .bind(tier.monthly_pours as i32)
        .bind(tier.max_subscriptions.map(|n| n as i32))
        .bind(&tier.provider_price_id)
        .bind(tier.is_active)
        .bind(tier.sort_order)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_tier_active(&self, tier_id: &str, is_active: bool) -> Result<()> {
        sqlx::query("UPDATE tiers SET is_active = $2, updated_at = NOW() WHERE id = $1")
            .bind(tier_id)
            .bind(is_active)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn try_reserve_slot(&self, tier_id: &str) -> Result<ReservationOutcome> {
        // Conditional increment: the row lock taken by UPDATE serializes
        // concurrent signups, so at most `max` of them see the predicate hold.
        let row = sqlx::query(
            r#"
            UPDATE tiers
            SET current_subscriptions = current_subscriptions + 1, updated_at = NOW()
            WHERE id = $1
              AND is_active
              AND (max_subscriptions IS NULL OR current_subscriptions < max_subscriptions)
            RETURNING current_subscriptions, max_subscriptions
            "#,
        )
        .bind(tier_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return Ok(ReservationOutcome {
                reserved: true,
                current: row.try_get::<i32, _>("current_subscriptions")? as u32,
                max: row
                    .try_get::<Option<i32>, _>("max_subscriptions")?
                    .map(|n| n as u32),
            });
        }

        // Predicate failed: distinguish sold-out/inactive from missing.
        let row = sqlx::query(
            "SELECT current_subscriptions, max_subscriptions FROM tiers WHERE id = $1",
        )
        .bind(tier_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| MembershipError::TierNotFound {
            tier_id: tier_id.to_string(),
        })?;

        Ok(ReservationOutcome {
            reserved: false,
            current: row.try_get::<i32, _>("current_subscriptions")? as u32,
            max: row
                .try_get::<Option<i32>, _>("max_subscriptions")?
                .map(|n| n as u32),
        })
    }

    async fn release_slot(&self, tier_id: &str) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE tiers
            SET current_subscriptions = GREATEST(current_subscriptions - 1, 0),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(tier_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(MembershipError::TierNotFound {
                tier_id: tier_id.to_string(),
            }
            .into());
        }
        Ok(())
    }

    async fn get_customer(&self, customer_id: &str) -> Result<Option<Customer>> {
        let row = sqlx::query("SELECT * FROM customers WHERE id = $1")
            .bind(customer_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::customer_from_row).transpose()
    }

    async fn save_customer(&self, customer: &Customer) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO customers
                (id, user_id, tier_id, status, lifetime_pours, member_since,
                 household_partner_id, last_activity_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                user_id = EXCLUDED.user_id,
                tier_id = EXCLUDED.tier_id,
                status = EXCLUDED.status,
                household_partner_id = EXCLUDED.household_partner_id
            "#,
        )
        .bind(&customer.id)
        .bind(&customer.user_id)
        .bind(&customer.tier_id)
        .bind(customer.status.as_str())
        .bind(customer.lifetime_pours as i64)
        .bind(customer.member_since)
        .bind(&customer.household_partner_id)
        .bind(customer.last_activity_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_active_membership(&self, customer_id: &str) -> Result<Option<Membership>> {
        let row = sqlx::query(
            "SELECT * FROM memberships WHERE customer_id = $1 AND status = 'active'",
        )
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::membership_from_row).transpose()
    }

    async fn save_membership(&self, membership: &Membership) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        if membership.status == MembershipStatus::Active {
            sqlx::query(
                r#"
                UPDATE memberships SET status = 'expired', updated_at = NOW()
                WHERE customer_id = $1 AND status = 'active' AND id <> $2
                "#,
            )
            .bind(&membership.customer_id)
            .bind(membership.id)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO memberships
                (id, customer_id, tier_id, monthly_price_cents, status,
                 period_start, period_end, external_subscription_id, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW())
            ON CONFLICT (id) DO UPDATE SET
                tier_id = EXCLUDED.tier_id,
                monthly_price_cents = EXCLUDED.monthly_price_cents,
                status = EXCLUDED.status,
                period_start = EXCLUDED.period_start,
                period_end = EXCLUDED.period_end,
                external_subscription_id = EXCLUDED.external_subscription_id,
                updated_at = NOW()
            "#,
        )
        .bind(membership.id)
        .bind(&membership.customer_id)
        .bind(&membership.tier_id)
        .bind(membership.monthly_price_cents)
        .bind(membership.status.as_str())
        .bind(membership.period_start)
        .bind(membership.period_end)
        .bind(&membership.external_subscription_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn sum_redeemed_pours(
        &self,
        customer_id: &str,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<u32> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(quantity), 0) AS used
            FROM pours
            WHERE customer_id = $1
              AND status = 'redeemed'
              AND created_at >= $2 AND created_at < $3
            "#,
        )
        .bind(customer_id)
        .bind(period_start)
        .bind(period_end)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get::<i64, _>("used")? as u32)
    }

    async fn insert_pour_within_quota(
        &self,
        pour: &NewPour,
        quota: u32,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<PourInsertOutcome> {
        let mut tx = self.pool.begin().await?;

        // Lock the customer row: concurrent redemptions for the same member
        // serialize here, so the quota re-check below is authoritative.
        let locked = sqlx::query("SELECT id FROM customers WHERE id = $1 FOR UPDATE")
            .bind(&pour.customer_id)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Err(MembershipError::CustomerNotFound {
                customer_id: pour.customer_id.clone(),
            }
            .into());
        }

        let existing = sqlx::query(&format!(
            "SELECT {} FROM pours WHERE reference = $1",
            POUR_COLUMNS
        ))
        .bind(pour.reference)
        .fetch_optional(&mut *tx)
        .await?;
        if let Some(row) = existing {
            let original = Self::pour_from_row(&row)?;
            tx.commit().await?;
            return Ok(PourInsertOutcome::DuplicateReference(original));
        }

        let used_row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(quantity), 0) AS used
            FROM pours
            WHERE customer_id = $1
              AND status = 'redeemed'
              AND created_at >= $2 AND created_at < $3
            "#,
        )
        .bind(&pour.customer_id)
        .bind(period_start)
        .bind(period_end)
        .fetch_one(&mut *tx)
        .await?;
        let used = used_row.try_get::<i64, _>("used")? as u32;

        let available = quota.saturating_sub(used);
        if pour.quantity > available {
            tx.rollback().await?;
            return Ok(PourInsertOutcome::QuotaExceeded {
                requested: pour.quantity,
                available,
            });
        }

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO pours
                (id, customer_id, quantity, location, status, recorded_by, notes,
                 reference, created_at)
            VALUES ($1, $2, $3, $4, 'redeemed', $5, $6, $7, NOW())
            RETURNING {}
            "#,
            POUR_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&pour.customer_id)
        .bind(pour.quantity as i32)
        .bind(pour.location.as_str())
        .bind(&pour.recorded_by)
        .bind(&pour.notes)
        .bind(pour.reference)
        .fetch_one(&mut *tx)
        .await?;
        let inserted = Self::pour_from_row(&row)?;

        sqlx::query(
            r#"
            UPDATE customers
            SET lifetime_pours = lifetime_pours + $2, last_activity_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(&pour.customer_id)
        .bind(i64::from(pour.quantity))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(PourInsertOutcome::Inserted(inserted))
    }

    async fn get_pour(&self, pour_id: Uuid) -> Result<Option<Pour>> {
        let row = sqlx::query(&format!("SELECT {} FROM pours WHERE id = $1", POUR_COLUMNS))
            .bind(pour_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::pour_from_row).transpose()
    }

    async fn reverse_pour(&self, pour_id: Uuid) -> Result<ReversalOutcome> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            "SELECT {} FROM pours WHERE id = $1 FOR UPDATE",
            POUR_COLUMNS
        ))
        .bind(pour_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            return Ok(ReversalOutcome::NotFound);
        };
        let pour = Self::pour_from_row(&row)?;

        if pour.status != PourStatus::Redeemed {
            tx.rollback().await?;
            return Ok(ReversalOutcome::NotReversible(pour));
        }

        let row = sqlx::query(&format!(
            "UPDATE pours SET status = 'reversed' WHERE id = $1 RETURNING {}",
            POUR_COLUMNS
        ))
        .bind(pour_id)
        .fetch_one(&mut *tx)
        .await?;
        let reversed = Self::pour_from_row(&row)?;

        sqlx::query(
            r#"
            UPDATE customers
            SET lifetime_pours = GREATEST(lifetime_pours - $2, 0)
            WHERE id = $1
            "#,
        )
        .bind(&reversed.customer_id)
        .bind(i64::from(reversed.quantity))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(ReversalOutcome::Reversed(reversed))
    }
}
