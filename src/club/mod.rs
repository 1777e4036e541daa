//! Membership club module: tier inventory, pour allowances, and redemptions.
//!
//! Provides the reservation, allowance, redemption, and signup services for a
//! subscription membership club with limited-inventory tiers and a monthly
//! pour quota per member.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use pourhouse::club::{
//!     InMemoryLedgerStore, RedemptionRecorder, ReservationService, SignupManager,
//! };
//!
//! let store = Arc::new(InMemoryLedgerStore::new());
//!
//! // Reserve a slot during signup
//! let reservations = ReservationService::new(Arc::clone(&store));
//! let outcome = reservations.reserve_slot("elite", &user.id).await?;
//! if !outcome.reserved {
//!     return Err(SignupPageError::TierSoldOut);
//! }
//!
//! // Record a pour at the bar
//! let recorder = RedemptionRecorder::new(store);
//! let pour = recorder.record_pour(&request).await?;
//! ```

pub mod allowance;
pub mod customer;
pub mod error;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod pg_store;
pub mod pour;
pub mod redemption;
pub mod reservation;
pub mod signup;
pub mod storage;
pub mod tiers;
pub mod validation;

// Tier exports
pub use tiers::{
    AvailabilityBand, StoredTier, TierAvailability, TierBuilder, TierConfig, Tiers, TiersBuilder,
};

// Storage exports
pub use storage::{
    LedgerStore, NewPour, PourInsertOutcome, ReservationOutcome, ReversalOutcome,
};
pub use memory::InMemoryLedgerStore;
#[cfg(feature = "postgres")]
pub use pg_store::PgLedgerStore;

// Customer exports
pub use customer::{Customer, CustomerStatus, Membership, MembershipStatus};

// Pour exports
pub use pour::{Pour, PourAllowance, PourLocation, PourRequest, PourStatus};

// Service exports
pub use allowance::AllowanceCalculator;
pub use redemption::RedemptionRecorder;
pub use reservation::ReservationService;
pub use signup::{
    BillingSessionClient, CheckoutSession, CreateSessionRequest, SignupManager, SignupOutcome,
    SignupRequest,
};

// Error exports
pub use error::MembershipError;
