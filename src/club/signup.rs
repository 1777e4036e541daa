//! Signup flow: slot reservation plus hosted checkout.
//!
//! Signup bridges the inventory side (a reserved subscription slot) and the
//! payment side (a hosted checkout session at the billing provider). The slot
//! is reserved first so a sold-out tier is refused before any provider call;
//! if session creation then fails, the slot is released again so a payment
//! outage cannot leak inventory.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Months, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::club::customer::{Customer, Membership, MembershipStatus};
use crate::club::error::MembershipError;
use crate::club::reservation::ReservationService;
use crate::club::storage::LedgerStore;
use crate::error::Result;

/// Client for the billing provider's hosted checkout API.
///
/// Implement this trait against your payment provider. A mock implementation
/// is available in the [`test`] module.
#[async_trait]
pub trait BillingSessionClient: Send + Sync {
    /// Create a hosted checkout session and return its redirect URL.
    async fn create_checkout_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<CheckoutSession>;
}

/// Parameters sent to the provider when opening a checkout session.
#[derive(Debug, Clone)]
pub struct CreateSessionRequest {
    /// The prospective member's email address.
    pub customer_email: String,
    /// Provider-side price identifier for the tier.
    pub price_id: String,
    /// The tier being purchased, echoed back in provider webhooks.
    pub tier_id: String,
    /// URL to redirect to after successful payment.
    pub success_url: String,
    /// URL to redirect to if the customer abandons checkout.
    pub cancel_url: String,
}

/// A hosted checkout session at the billing provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckoutSession {
    /// Provider-side session identifier.
    pub session_id: String,
    /// URL to redirect the customer to.
    pub checkout_url: String,
}

/// Request to begin signup for a tier.
#[derive(Debug, Clone)]
pub struct SignupRequest {
    /// The authenticated user starting signup.
    pub user_id: String,
    /// Email for the checkout session.
    pub email: String,
    /// The tier to sign up for.
    pub tier_id: String,
    /// URL to redirect to on successful payment.
    pub success_url: String,
    /// URL to redirect to on abandoned checkout.
    pub cancel_url: String,
}

/// Outcome of a signup attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum SignupOutcome {
    /// A slot was reserved and checkout opened; redirect the customer.
    CheckoutStarted(CheckoutSession),
    /// The tier sold out; no slot was taken and no session was created.
    TierFull { current: u32, max: u32 },
}

/// Manages the signup flow from slot reservation through checkout.
pub struct SignupManager<S: LedgerStore, C: BillingSessionClient> {
    store: Arc<S>,
    reservations: ReservationService<S>,
    client: Arc<C>,
    /// Allowed domains for redirect URLs (empty = allow any HTTPS URL).
    /// Prevents open redirects through the checkout flow.
    allowed_redirect_domains: Vec<String>,
}

impl<S: LedgerStore, C: BillingSessionClient> Clone for SignupManager<S, C> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            reservations: self.reservations.clone(),
            client: Arc::clone(&self.client),
            allowed_redirect_domains: self.allowed_redirect_domains.clone(),
        }
    }
}

impl<S: LedgerStore, C: BillingSessionClient> SignupManager<S, C> {
    /// Create a new signup manager.
    pub fn new(store: Arc<S>, client: Arc<C>) -> Self {
        let reservations = ReservationService::new(Arc::clone(&store));
        Self {
            store,
            reservations,
            client,
            allowed_redirect_domains: Vec::new(),
        }
    }

    /// Create a signup manager from a [`SignupConfig`](crate::SignupConfig).
    pub fn from_config(store: Arc<S>, client: Arc<C>, config: &crate::SignupConfig) -> Self {
        let mut manager = Self::new(store, client)
            .allowed_redirect_domains(config.allowed_redirect_domains.iter().cloned());
        manager.reservations = manager
            .reservations
            .with_max_retries(config.max_reserve_retries);
        manager
    }

    /// Restrict redirect URLs to the given domains (and their subdomains).
    #[must_use]
    pub fn allowed_redirect_domains<I, D>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = D>,
        D: Into<String>,
    {
        self.allowed_redirect_domains = domains.into_iter().map(Into::into).collect();
        self
    }

    /// Begin signup for a tier.
    ///
    /// Reserves a subscription slot, then opens a hosted checkout session.
    /// A sold-out tier is reported as [`SignupOutcome::TierFull`], not an
    /// error. If the provider call fails after the slot was reserved, the
    /// slot is released before the error propagates.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid tier IDs or redirect URLs, unknown or
    /// inactive tiers, and provider failures.
    pub async fn begin_signup(&self, request: SignupRequest) -> Result<SignupOutcome> {
        self.validate_redirect_url(&request.success_url)?;
        self.validate_redirect_url(&request.cancel_url)?;

        // reserve_slot validates the tier id and checks existence/activity
        let outcome = self.reservations
            .reserve_slot(&request.tier_id, &request.user_id)
            .await?;
        if !outcome.reserved {
            return Ok(SignupOutcome::TierFull {
                current: outcome.current,
                // reserved=false only happens on capped tiers
                max: outcome.max.unwrap_or(outcome.current),
            });
        }

        // Everything past this point holds a reserved slot: any failure must
        // release it before propagating.
        match self.open_session(&request).await {
            Ok(session) => {
                tracing::info!(
                    tier_id = %request.tier_id,
                    user_id = %request.user_id,
                    session_id = %session.session_id,
                    "checkout session opened"
                );
                Ok(SignupOutcome::CheckoutStarted(session))
            }
            Err(err) => {
                // Hand the slot back; the signup never happened.
                tracing::warn!(
                    tier_id = %request.tier_id,
                    user_id = %request.user_id,
                    error = %err,
                    "checkout session failed, releasing reserved slot"
                );
                if let Err(release_err) = self.reservations.release_slot(&request.tier_id).await {
                    // Keep the checkout error as the caller-visible failure;
                    // the leaked slot needs operator attention.
                    tracing::error!(
                        tier_id = %request.tier_id,
                        error = %release_err,
                        "failed to release reserved slot after checkout failure"
                    );
                }
                Err(err)
            }
        }
    }

    async fn open_session(&self, request: &SignupRequest) -> Result<CheckoutSession> {
        let tier = self
            .store
            .get_tier(&request.tier_id)
            .await?
            .ok_or_else(|| MembershipError::TierNotFound {
                tier_id: request.tier_id.clone(),
            })?;

        let price_id =
            tier.provider_price_id
                .clone()
                .ok_or_else(|| MembershipError::Internal {
                    message: format!(
                        "tier '{}' has no provider price configured",
                        request.tier_id
                    ),
                })?;

        self.client
            .create_checkout_session(CreateSessionRequest {
                customer_email: request.email.clone(),
                price_id,
                tier_id: request.tier_id.clone(),
                success_url: request.success_url.clone(),
                cancel_url: request.cancel_url.clone(),
            })
            .await
    }

    /// Activate a membership after the provider confirms payment.
    ///
    /// Called from the payment-completion webhook. Creates (or refreshes) the
    /// customer record and opens a one-month billing period starting now. Any
    /// previously active membership for the customer is superseded.
    ///
    /// # Errors
    ///
    /// Returns an error if the tier does not exist or the store fails.
    pub async fn activate_membership(
        &self,
        customer_id: &str,
        user_id: &str,
        tier_id: &str,
        external_subscription_id: Option<String>,
    ) -> Result<Membership> {
        let tier = self
            .store
            .get_tier(tier_id)
            .await?
            .ok_or_else(|| MembershipError::TierNotFound {
                tier_id: tier_id.to_string(),
            })?;

        let customer = match self.store.get_customer(customer_id).await? {
            Some(mut existing) => {
                existing.tier_id = tier_id.to_string();
                existing
            }
            None => Customer::new(customer_id, user_id, tier_id),
        };
        self.store.save_customer(&customer).await?;

        let period_start = Utc::now();
        let period_end = period_start
            .checked_add_months(Months::new(1))
            .ok_or_else(|| MembershipError::Internal {
                message: "billing period end overflows the calendar".to_string(),
            })?;

        let membership = Membership {
            id: Uuid::new_v4(),
            customer_id: customer_id.to_string(),
            tier_id: tier_id.to_string(),
            monthly_price_cents: tier.monthly_price_cents,
            status: MembershipStatus::Active,
            period_start,
            period_end,
            external_subscription_id,
            updated_at: period_start,
        };
        self.store.save_membership(&membership).await?;

        tracing::info!(
            customer_id = %customer_id,
            tier_id = %tier_id,
            membership_id = %membership.id,
            "membership activated"
        );
        Ok(membership)
    }

    /// Validate a redirect URL: must parse, must be HTTPS, and when a domain
    /// allowlist is configured the host must match one of its entries or a
    /// subdomain of one.
    fn validate_redirect_url(&self, url: &str) -> Result<()> {
        let parsed = Url::parse(url).map_err(|e| MembershipError::InvalidRedirectUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        if parsed.scheme() != "https" {
            return Err(MembershipError::InvalidRedirectUrl {
                url: url.to_string(),
                reason: "redirect URL must use HTTPS".to_string(),
            }
            .into());
        }

        if !self.allowed_redirect_domains.is_empty() {
            let host = parsed
                .host_str()
                .ok_or_else(|| MembershipError::InvalidRedirectUrl {
                    url: url.to_string(),
                    reason: "redirect URL must have a host".to_string(),
                })?;

            let allowed = self.allowed_redirect_domains.iter().any(|domain| {
                host == domain || host.ends_with(&format!(".{}", domain))
            });
            if !allowed {
                return Err(MembershipError::RedirectDomainNotAllowed {
                    domain: host.to_string(),
                }
                .into());
            }
        }

        Ok(())
    }
}

/// Test utilities for the signup flow.
pub mod test {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::RwLock;

    /// Mock billing session client for testing.
    #[derive(Default)]
    pub struct MockBillingSessionClient {
        session_counter: AtomicU64,
        fail_next: AtomicBool,
        requests: RwLock<Vec<CreateSessionRequest>>,
    }

    impl MockBillingSessionClient {
        /// Create a new mock client.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Make the next session creation fail with a provider error.
        pub fn fail_next_session(&self) {
            self.fail_next.store(true, Ordering::SeqCst);
        }

        /// Get all session requests seen so far (for test assertions).
        pub fn requests(&self) -> Vec<CreateSessionRequest> {
            self.requests.read().unwrap().clone()
        }
    }

    #[async_trait]
    impl BillingSessionClient for MockBillingSessionClient {
        async fn create_checkout_session(
            &self,
            request: CreateSessionRequest,
        ) -> Result<CheckoutSession> {
            self.requests.write().unwrap().push(request);

            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(MembershipError::ProviderApiError {
                    operation: "create_checkout_session".to_string(),
                    message: "simulated provider outage".to_string(),
                }
                .into());
            }

            let n = self.session_counter.fetch_add(1, Ordering::SeqCst);
            Ok(CheckoutSession {
                session_id: format!("cs_test_{}", n),
                checkout_url: format!("https://checkout.example.com/session/cs_test_{}", n),
            })
        }
    }
}
