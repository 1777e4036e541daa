//! HTTP API for the membership club.
//!
//! Thin axum handlers over the club services. All concurrency control lives
//! in the services and the store; handlers only translate between JSON and
//! domain types and let [`ClubError`](crate::error::ClubError) render typed
//! failures.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::club::allowance::AllowanceCalculator;
use crate::club::error::MembershipError;
use crate::club::pour::{Pour, PourAllowance, PourLocation, PourRequest};
use crate::club::redemption::RedemptionRecorder;
use crate::club::reservation::ReservationService;
use crate::club::signup::{BillingSessionClient, SignupManager, SignupOutcome, SignupRequest};
use crate::club::storage::LedgerStore;
use crate::club::tiers::TierAvailability;
use crate::error::Result;

/// Shared state for the club API.
pub struct ApiState<S: LedgerStore, C: BillingSessionClient> {
    pub reservations: ReservationService<S>,
    pub allowances: AllowanceCalculator<S>,
    pub redemptions: RedemptionRecorder<S>,
    pub signups: SignupManager<S, C>,
}

impl<S: LedgerStore, C: BillingSessionClient> Clone for ApiState<S, C> {
    fn clone(&self) -> Self {
        Self {
            reservations: self.reservations.clone(),
            allowances: self.allowances.clone(),
            redemptions: self.redemptions.clone(),
            signups: self.signups.clone(),
        }
    }
}

impl<S: LedgerStore, C: BillingSessionClient> ApiState<S, C> {
    /// Build API state over a store and a billing session client.
    pub fn new(store: Arc<S>, signups: SignupManager<S, C>) -> Self {
        Self {
            reservations: ReservationService::new(Arc::clone(&store)),
            allowances: AllowanceCalculator::new(Arc::clone(&store)),
            redemptions: RedemptionRecorder::new(store),
            signups,
        }
    }
}

/// Build the club API router.
pub fn router<S, C>(state: ApiState<S, C>) -> Router
where
    S: LedgerStore + 'static,
    C: BillingSessionClient + 'static,
{
    Router::new()
        .route("/tiers/availability", get(get_availability))
        .route("/tiers/{tier_id}/reserve", post(reserve_slot))
        .route("/signup", post(begin_signup))
        .route(
            "/customers/{customer_id}/pours/available",
            get(get_available_pours),
        )
        .route("/customers/{customer_id}/pours", post(record_pour))
        .route("/pours/{pour_id}/reverse", post(reverse_pour))
        .with_state(state)
}

#[derive(Serialize)]
struct AvailabilityResponse {
    tiers: Vec<TierAvailability>,
}

async fn get_availability<S, C>(
    State(state): State<ApiState<S, C>>,
) -> Result<Json<AvailabilityResponse>>
where
    S: LedgerStore,
    C: BillingSessionClient,
{
    let tiers = state.reservations.get_availability().await?;
    Ok(Json(AvailabilityResponse { tiers }))
}

#[derive(Deserialize)]
struct ReserveRequest {
    user_id: String,
}

#[derive(Serialize)]
struct ReserveResponse {
    success: bool,
    current: u32,
    max: Option<u32>,
}

async fn reserve_slot<S, C>(
    State(state): State<ApiState<S, C>>,
    Path(tier_id): Path<String>,
    Json(request): Json<ReserveRequest>,
) -> Result<Json<ReserveResponse>>
where
    S: LedgerStore,
    C: BillingSessionClient,
{
    let outcome = state
        .reservations
        .reserve_slot(&tier_id, &request.user_id)
        .await?;
    Ok(Json(ReserveResponse {
        success: outcome.reserved,
        current: outcome.current,
        max: outcome.max,
    }))
}

#[derive(Deserialize)]
struct SignupBody {
    tier_id: String,
    user_id: String,
    email: String,
    success_url: String,
    cancel_url: String,
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum SignupResponse {
    CheckoutStarted {
        session_id: String,
        checkout_url: String,
    },
    TierFull {
        current: u32,
        max: u32,
    },
}

async fn begin_signup<S, C>(
    State(state): State<ApiState<S, C>>,
    Json(body): Json<SignupBody>,
) -> Result<Json<SignupResponse>>
where
    S: LedgerStore,
    C: BillingSessionClient,
{
    let outcome = state
        .signups
        .begin_signup(SignupRequest {
            user_id: body.user_id,
            email: body.email,
            tier_id: body.tier_id,
            success_url: body.success_url,
            cancel_url: body.cancel_url,
        })
        .await?;

    let response = match outcome {
        SignupOutcome::CheckoutStarted(session) => SignupResponse::CheckoutStarted {
            session_id: session.session_id,
            checkout_url: session.checkout_url,
        },
        SignupOutcome::TierFull { current, max } => SignupResponse::TierFull { current, max },
    };
    Ok(Json(response))
}

async fn get_available_pours<S, C>(
    State(state): State<ApiState<S, C>>,
    Path(customer_id): Path<String>,
) -> Result<Json<PourAllowance>>
where
    S: LedgerStore,
    C: BillingSessionClient,
{
    let allowance = state.allowances.get_available_pours(&customer_id).await?;
    Ok(Json(allowance))
}

#[derive(Deserialize)]
struct RecordPourBody {
    quantity: u32,
    location: String,
    recorded_by: String,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    reference: Option<Uuid>,
}

async fn record_pour<S, C>(
    State(state): State<ApiState<S, C>>,
    Path(customer_id): Path<String>,
    Json(body): Json<RecordPourBody>,
) -> Result<Json<Pour>>
where
    S: LedgerStore,
    C: BillingSessionClient,
{
    let location =
        PourLocation::parse(&body.location).map_err(|_| MembershipError::UnknownLocation {
            value: body.location.clone(),
        })?;

    let pour = state
        .redemptions
        .record_pour(&PourRequest {
            customer_id,
            quantity: body.quantity,
            location,
            recorded_by: body.recorded_by,
            notes: body.notes,
            reference: body.reference,
        })
        .await?;
    Ok(Json(pour))
}

async fn reverse_pour<S, C>(
    State(state): State<ApiState<S, C>>,
    Path(pour_id): Path<Uuid>,
) -> Result<Json<Pour>>
where
    S: LedgerStore,
    C: BillingSessionClient,
{
    let pour = state.redemptions.reverse_pour(pour_id).await?;
    Ok(Json(pour))
}
