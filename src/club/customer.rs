//! Customer and membership records.
//!
//! A customer is one member of the club (current or former). Their current
//! billing entitlement lives on a membership row: at most one `active`
//! membership exists per customer at a time, and renewals or cancellations
//! supersede the old row rather than deleting it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A club member.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Customer {
    /// Unique customer identifier.
    pub id: String,
    /// Linked auth user identity.
    pub user_id: String,
    /// Current tier.
    pub tier_id: String,
    /// Lifecycle status.
    pub status: CustomerStatus,
    /// Total pours redeemed over the customer's lifetime.
    pub lifetime_pours: u64,
    /// When the membership started.
    pub member_since: DateTime<Utc>,
    /// Linked household member, if any.
    pub household_partner_id: Option<String>,
    /// Last redemption or profile activity.
    pub last_activity_at: Option<DateTime<Utc>>,
}

impl Customer {
    /// Create a new active customer.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        user_id: impl Into<String>,
        tier_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            tier_id: tier_id.into(),
            status: CustomerStatus::Active,
            lifetime_pours: 0,
            member_since: Utc::now(),
            household_partner_id: None,
            last_activity_at: None,
        }
    }

    /// Check if the customer is an active member.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == CustomerStatus::Active
    }
}

/// Customer lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomerStatus {
    /// Membership is current and in good standing.
    Active,
    /// Subscription cancelled or lapsed on non-payment.
    Inactive,
    /// Suspended by staff/admin action.
    Suspended,
}

impl CustomerStatus {
    /// Parse from a status string. Unknown values are rejected.
    pub fn parse(s: &str) -> Result<Self, String> {
        match s {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            "suspended" => Ok(Self::Suspended),
            other => Err(format!("unknown customer status: {}", other)),
        }
    }

    /// Convert to string for storage and API payloads.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Suspended => "suspended",
        }
    }
}

impl std::fmt::Display for CustomerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A billing-period record for a customer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Membership {
    /// Unique membership identifier.
    pub id: Uuid,
    /// The customer this membership belongs to.
    pub customer_id: String,
    /// Tier at the time the period was opened.
    pub tier_id: String,
    /// Monthly price in cents at activation.
    pub monthly_price_cents: i64,
    /// Membership status.
    pub status: MembershipStatus,
    /// Start of the billing period (inclusive).
    pub period_start: DateTime<Utc>,
    /// End of the billing period (exclusive).
    pub period_end: DateTime<Utc>,
    /// External subscription reference at the payment provider.
    pub external_subscription_id: Option<String>,
    /// Last updated timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Membership {
    /// Check if the membership is the customer's current active one.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == MembershipStatus::Active
    }

    /// Check whether a timestamp falls within the billing period `[start, end)`.
    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.period_start && at < self.period_end
    }
}

/// Membership billing-period status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipStatus {
    /// Current billing period.
    Active,
    /// Superseded by a renewal.
    Expired,
    /// Cancelled before period end.
    Cancelled,
}

impl MembershipStatus {
    /// Parse from a status string. Unknown values are rejected.
    pub fn parse(s: &str) -> Result<Self, String> {
        match s {
            "active" => Ok(Self::Active),
            "expired" => Ok(Self::Expired),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown membership status: {}", other)),
        }
    }

    /// Convert to string for storage and API payloads.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for MembershipStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
