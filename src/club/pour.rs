//! Pour redemption records.
//!
//! A pour is an immutable append-only event: once recorded with status
//! `redeemed`, the only permitted mutation is the transition to `reversed`
//! (refund case), which hands the quantity back to the period balance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A recorded pour redemption.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pour {
    /// Unique pour identifier.
    pub id: Uuid,
    /// The customer who redeemed.
    pub customer_id: String,
    /// Number of pours redeemed in this event (>= 1).
    pub quantity: u32,
    /// Where the pour was served.
    pub location: PourLocation,
    /// Redemption status.
    pub status: PourStatus,
    /// Staff member who recorded the redemption.
    pub recorded_by: String,
    /// Free-form notes from the recording staff member.
    pub notes: Option<String>,
    /// Idempotency reference: retries of the same logical redemption carry
    /// the same token and are not double-counted.
    pub reference: Uuid,
    /// When the pour was recorded.
    pub created_at: DateTime<Utc>,
}

/// Pour redemption status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PourStatus {
    /// Counted against the period quota.
    Redeemed,
    /// Awaiting confirmation; not yet counted.
    Pending,
    /// Refunded; excluded from the period sum and the lifetime counter.
    Reversed,
}

impl PourStatus {
    /// Parse from a status string. Unknown values are rejected.
    pub fn parse(s: &str) -> Result<Self, String> {
        match s {
            "redeemed" => Ok(Self::Redeemed),
            "pending" => Ok(Self::Pending),
            "reversed" => Ok(Self::Reversed),
            other => Err(format!("unknown pour status: {}", other)),
        }
    }

    /// Convert to string for storage and API payloads.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Redeemed => "redeemed",
            Self::Pending => "pending",
            Self::Reversed => "reversed",
        }
    }
}

impl std::fmt::Display for PourStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Recognized redemption locations.
///
/// This is a closed set: unrecognized location strings are a validation
/// error, never silently mapped to a default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PourLocation {
    MainBar,
    Patio,
    TastingRoom,
    PrivateEvent,
}

impl PourLocation {
    /// Parse a location string. Unknown values are rejected.
    pub fn parse(s: &str) -> Result<Self, String> {
        match s {
            "main_bar" => Ok(Self::MainBar),
            "patio" => Ok(Self::Patio),
            "tasting_room" => Ok(Self::TastingRoom),
            "private_event" => Ok(Self::PrivateEvent),
            other => Err(format!("unknown pour location: {}", other)),
        }
    }

    /// Convert to string for storage and API payloads.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MainBar => "main_bar",
            Self::Patio => "patio",
            Self::TastingRoom => "tasting_room",
            Self::PrivateEvent => "private_event",
        }
    }
}

impl std::fmt::Display for PourLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PourLocation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Request to record a pour redemption.
#[derive(Debug, Clone)]
pub struct PourRequest {
    /// The customer redeeming.
    pub customer_id: String,
    /// Number of pours (>= 1).
    pub quantity: u32,
    /// Where the pour is being served.
    pub location: PourLocation,
    /// Staff member recording the redemption.
    pub recorded_by: String,
    /// Optional notes.
    pub notes: Option<String>,
    /// Caller-supplied idempotency reference. A fresh token is generated
    /// server-side when absent.
    pub reference: Option<Uuid>,
}

/// Remaining pour balance for a customer's current billing period.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PourAllowance {
    /// Pours remaining this period (clamped at zero).
    pub available_pours: u32,
    /// Pours already redeemed this period.
    pub pours_used: u32,
    /// The tier's monthly quota.
    pub tier_max_pours: u32,
    /// Start of the billing period (inclusive).
    pub billing_period_start: DateTime<Utc>,
    /// End of the billing period (exclusive).
    pub billing_period_end: DateTime<Utc>,
}

impl PourAllowance {
    /// The zero allowance returned when a customer has no active membership.
    ///
    /// Dashboards render this as "no entitlement" rather than an error.
    #[must_use]
    pub fn none() -> Self {
        let epoch = DateTime::<Utc>::UNIX_EPOCH;
        Self {
            available_pours: 0,
            pours_used: 0,
            tier_max_pours: 0,
            billing_period_start: epoch,
            billing_period_end: epoch,
        }
    }
}
