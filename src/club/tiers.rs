//! Tier configuration and definitions.
//!
//! A tier is a named membership level with a monthly price, a monthly pour
//! quota, and an optional cap on concurrent subscriptions. Tiers can be
//! defined in code with the builder, or managed by admins through the
//! [`LedgerStore`](super::storage::LedgerStore).
//!
//! # Code-configured tiers
//!
//! ```rust,ignore
//! use pourhouse::club::Tiers;
//!
//! let tiers = Tiers::builder()
//!     .tier("select")
//!         .display_name("Select")
//!         .monthly_price(4900)
//!         .monthly_pours(2)
//!         .done()
//!     .tier("elite")
//!         .display_name("Elite")
//!         .monthly_price(19900)
//!         .monthly_pours(8)
//!         .max_subscriptions(25)
//!         .done()
//!     .build();
//! ```
//!
//! # Database-backed tiers
//!
//! ```rust,ignore
//! let stored = store.list_all_tiers().await?;
//! let tiers = Tiers::from_stored(stored);
//! ```

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Band thresholds on the remaining/max ratio, checked low to high.
const CRITICAL_RATIO: f64 = 0.10;
const LOW_RATIO: f64 = 0.25;
const LIMITED_RATIO: f64 = 0.50;

/// A tier stored in the ledger.
///
/// `current_subscriptions` is only ever mutated through the store's atomic
/// reserve/release operations, never by reading and writing the count back.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredTier {
    /// Unique tier identifier (e.g., "select", "premier", "elite", "household").
    pub id: String,
    /// Display name shown to members.
    pub name: String,
    /// Description of the tier.
    pub description: Option<String>,
    /// Monthly price in cents.
    pub monthly_price_cents: i64,
    /// Currency code (e.g., "usd", "gbp").
    pub currency: String,
    /// Pours included per billing period.
    pub monthly_pours: u32,
    /// Maximum concurrent subscriptions (None = unlimited).
    pub max_subscriptions: Option<u32>,
    /// Current number of subscriptions (including reserved slots).
    pub current_subscriptions: u32,
    /// Payment-provider price reference for checkout sessions.
    pub provider_price_id: Option<String>,
    /// Whether the tier is active and available for signup.
    pub is_active: bool,
    /// Sort order for display.
    pub sort_order: i32,
    /// Created timestamp.
    pub created_at: DateTime<Utc>,
    /// Updated timestamp.
    pub updated_at: DateTime<Utc>,
}

impl StoredTier {
    /// Create a new StoredTier with minimal required fields.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            monthly_price_cents: 0,
            currency: "usd".to_string(),
            monthly_pours: 0,
            max_subscriptions: None,
            current_subscriptions: 0,
            provider_price_id: None,
            is_active: true,
            sort_order: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Remaining capacity, or None for unlimited tiers.
    #[must_use]
    pub fn remaining(&self) -> Option<u32> {
        self.max_subscriptions
            .map(|max| max.saturating_sub(self.current_subscriptions))
    }

    /// Check if the tier has no remaining capacity.
    #[must_use]
    pub fn is_sold_out(&self) -> bool {
        self.remaining() == Some(0)
    }

    /// Get the price formatted for display (e.g., "$49.00").
    #[must_use]
    pub fn formatted_price(&self) -> String {
        let symbol = match self.currency.as_str() {
            "usd" => "$",
            "gbp" => "£",
            "eur" => "€",
            _ => &self.currency,
        };
        let dollars = self.monthly_price_cents as f64 / 100.0;
        format!("{}{:.2}", symbol, dollars)
    }
}

/// Urgency band for a tier's remaining capacity.
///
/// Derived purely from the remaining/max ratio. Advisory only: the atomic
/// reservation in the store is the sole write-time gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AvailabilityBand {
    /// No capacity remains.
    SoldOut,
    /// Less than 10% of capacity remains.
    Critical,
    /// Less than 25% of capacity remains.
    Low,
    /// Less than 50% of capacity remains.
    Limited,
    /// Plenty of capacity (or no cap at all).
    Available,
}

impl AvailabilityBand {
    /// Derive the band from a subscription count and optional cap.
    #[must_use]
    pub fn from_counts(current: u32, max: Option<u32>) -> Self {
        let Some(max) = max else {
            return Self::Available;
        };
        if max == 0 {
            return Self::SoldOut;
        }

        let remaining = max.saturating_sub(current);
        if remaining == 0 {
            return Self::SoldOut;
        }

        let ratio = f64::from(remaining) / f64::from(max);
        if ratio < CRITICAL_RATIO {
            Self::Critical
        } else if ratio < LOW_RATIO {
            Self::Low
        } else if ratio < LIMITED_RATIO {
            Self::Limited
        } else {
            Self::Available
        }
    }

    /// User-facing urgency message for this band, if any.
    #[must_use]
    pub fn urgency_message(&self, remaining: Option<u32>) -> Option<String> {
        match self {
            Self::SoldOut => Some("This tier is sold out".to_string()),
            Self::Critical => remaining.map(|n| {
                if n == 1 {
                    "Only 1 membership left!".to_string()
                } else {
                    format!("Only {} memberships left!", n)
                }
            }),
            Self::Low => remaining.map(|n| format!("Just {} spots remaining", n)),
            Self::Limited => Some("Limited availability".to_string()),
            Self::Available => None,
        }
    }

    /// Convert to string for API payloads.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SoldOut => "sold_out",
            Self::Critical => "critical",
            Self::Low => "low",
            Self::Limited => "limited",
            Self::Available => "available",
        }
    }
}

impl std::fmt::Display for AvailabilityBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Advisory availability snapshot for one tier.
///
/// Rendered by signup pages and admin inventory views.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierAvailability {
    pub tier_id: String,
    pub display_name: String,
    pub description: Option<String>,
    pub monthly_price_cents: i64,
    pub monthly_pours: u32,
    pub max_subscriptions: Option<u32>,
    pub current_subscriptions: u32,
    /// Whether at least one slot remains.
    pub available: bool,
    pub status_band: AvailabilityBand,
    pub urgency_message: Option<String>,
}

impl From<&StoredTier> for TierAvailability {
    fn from(tier: &StoredTier) -> Self {
        let band = AvailabilityBand::from_counts(tier.current_subscriptions, tier.max_subscriptions);
        Self {
            tier_id: tier.id.clone(),
            display_name: tier.name.clone(),
            description: tier.description.clone(),
            monthly_price_cents: tier.monthly_price_cents,
            monthly_pours: tier.monthly_pours,
            max_subscriptions: tier.max_subscriptions,
            current_subscriptions: tier.current_subscriptions,
            available: !tier.is_sold_out(),
            status_band: band,
            urgency_message: band.urgency_message(tier.remaining()),
        }
    }
}

/// A collection of tier configurations.
#[derive(Clone, Debug, Default)]
pub struct Tiers {
    tiers: HashMap<String, TierConfig>,
}

impl Tiers {
    /// Create a new empty tier collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder for constructing tiers.
    #[must_use]
    pub fn builder() -> TiersBuilder {
        TiersBuilder::new()
    }

    /// Create a Tiers collection from ledger-stored tiers.
    #[must_use]
    pub fn from_stored(stored: Vec<StoredTier>) -> Self {
        let tiers = stored
            .into_iter()
            .map(|st| {
                let config = TierConfig::from(st);
                (config.id.clone(), config)
            })
            .collect();
        Self { tiers }
    }

    /// Get a tier by ID.
    #[must_use]
    pub fn get(&self, tier_id: &str) -> Option<&TierConfig> {
        self.tiers.get(tier_id)
    }

    /// Check if a tier exists.
    #[must_use]
    pub fn contains(&self, tier_id: &str) -> bool {
        self.tiers.contains_key(tier_id)
    }

    /// Get all tier IDs.
    #[must_use]
    pub fn tier_ids(&self) -> Vec<&str> {
        self.tiers.keys().map(|s| s.as_str()).collect()
    }

    /// Get the number of tiers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    /// Check if there are no tiers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    /// Iterate over all tiers.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TierConfig)> {
        self.tiers.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Configuration for a single tier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TierConfig {
    /// Tier identifier (e.g., "select", "elite").
    pub id: String,
    /// Display name for the tier.
    pub display_name: Option<String>,
    /// Description of the tier.
    pub description: Option<String>,
    /// Monthly price in cents.
    pub monthly_price_cents: i64,
    /// Currency code.
    pub currency: String,
    /// Pours included per billing period.
    pub monthly_pours: u32,
    /// Maximum concurrent subscriptions (None = unlimited).
    pub max_subscriptions: Option<u32>,
    /// Payment-provider price reference.
    pub provider_price_id: Option<String>,
    /// Sort order for display.
    pub sort_order: i32,
}

impl From<StoredTier> for TierConfig {
    fn from(stored: StoredTier) -> Self {
        Self {
            id: stored.id,
            display_name: Some(stored.name),
            description: stored.description,
            monthly_price_cents: stored.monthly_price_cents,
            currency: stored.currency,
            monthly_pours: stored.monthly_pours,
            max_subscriptions: stored.max_subscriptions,
            provider_price_id: stored.provider_price_id,
            sort_order: stored.sort_order,
        }
    }
}

/// Builder for a Tiers collection.
#[must_use = "builder does nothing until you call build()"]
pub struct TiersBuilder {
    tiers: Vec<TierConfig>,
}

impl TiersBuilder {
    fn new() -> Self {
        Self { tiers: Vec::new() }
    }

    /// Start configuring a new tier.
    pub fn tier(self, id: impl Into<String>) -> TierBuilder {
        TierBuilder {
            parent: self,
            config: TierConfig {
                id: id.into(),
                display_name: None,
                description: None,
                monthly_price_cents: 0,
                currency: "usd".to_string(),
                monthly_pours: 0,
                max_subscriptions: None,
                provider_price_id: None,
                sort_order: 0,
            },
        }
    }

    /// Finish building the collection.
    pub fn build(self) -> Tiers {
        let tiers = self
            .tiers
            .into_iter()
            .map(|t| (t.id.clone(), t))
            .collect();
        Tiers { tiers }
    }
}

/// Builder for a single tier within a TiersBuilder.
#[must_use = "call done() to add the tier to the collection"]
pub struct TierBuilder {
    parent: TiersBuilder,
    config: TierConfig,
}

impl TierBuilder {
    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.config.display_name = Some(name.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.config.description = Some(description.into());
        self
    }

    /// Monthly price in cents.
    pub fn monthly_price(mut self, cents: i64) -> Self {
        self.config.monthly_price_cents = cents;
        self
    }

    pub fn currency(mut self, currency: impl Into<String>) -> Self {
        self.config.currency = currency.into();
        self
    }

    /// Pours included per billing period.
    pub fn monthly_pours(mut self, pours: u32) -> Self {
        self.config.monthly_pours = pours;
        self
    }

    /// Cap the number of concurrent subscriptions.
    pub fn max_subscriptions(mut self, max: u32) -> Self {
        self.config.max_subscriptions = Some(max);
        self
    }

    pub fn provider_price(mut self, price_id: impl Into<String>) -> Self {
        self.config.provider_price_id = Some(price_id.into());
        self
    }

    pub fn sort_order(mut self, order: i32) -> Self {
        self.config.sort_order = order;
        self
    }

    /// Finish this tier and return to the collection builder.
    pub fn done(mut self) -> TiersBuilder {
        self.parent.tiers.push(self.config);
        self.parent
    }
}
