//! Pourhouse - membership-club subscription and redemption core
//!
//! Pourhouse implements the two money-adjacent subsystems of a membership
//! club: reserving limited tier capacity at signup time, and accounting for
//! the monthly pour allowance that gates redemptions at the counter. Both are
//! built around atomic conditional updates in the ledger store, so concurrent
//! signups can never oversell a capped tier and concurrent redemptions can
//! never overspend a member's quota.
//!
//! # Features
//!
//! - **Reservation**: atomic test-and-increment of tier capacity
//! - **Allowance**: derived remaining-pour balance per billing period
//! - **Redemption**: quota-checked, idempotent pour recording with reversal
//! - **Signup**: checkout-session orchestration with compensating release
//! - **Storage**: pluggable [`LedgerStore`](club::LedgerStore) with in-memory
//!   and PostgreSQL (feature `postgres`) implementations
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pourhouse::club::{InMemoryLedgerStore, ReservationService};
//!
//! #[tokio::main]
//! async fn main() {
//!     pourhouse::init_tracing();
//!
//!     let store = Arc::new(InMemoryLedgerStore::new());
//!     let reservations = ReservationService::new(store);
//!
//!     let outcome = reservations.reserve_slot("elite", "user_42").await.unwrap();
//!     if !outcome.reserved {
//!         // tier is sold out; surface "choose another tier" to the caller
//!     }
//! }
//! ```

pub mod api;
pub mod club;
mod config;
mod error;

// Re-exports for public API
pub use api::{ApiState, router};
pub use config::{ClubConfig, ClubConfigBuilder, LoggingConfig, ServerConfig, SignupConfig};
pub use error::{ClubError, Result};

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging with sensible defaults.
///
/// This should be called early in your application, typically in main()
/// before constructing any services.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Set log level (e.g., "info", "debug", "pourhouse=debug")
/// - `POURHOUSE_LOG_JSON`: Set to "true" for JSON formatted logs
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json_logs = std::env::var("POURHOUSE_LOG_JSON")
        .map(|v| v.parse::<bool>().unwrap_or(false))
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Initialize tracing with a custom configuration.
pub fn init_tracing_with_config(config: &ClubConfig) {
    let env_filter = EnvFilter::new(&config.logging.level);

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
