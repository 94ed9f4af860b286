use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use tranzit_core::Booking;
use tranzit_dispatch::request::parse_id;
use tranzit_dispatch::{Actor, TransitionOutcome};
use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub driver_id: String,
    pub vehicle_id: String,
    pub dispatcher_id: String,
}

/// Body for accept, start and complete.
#[derive(Debug, Deserialize)]
pub struct DriverRequest {
    pub driver_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub actor_kind: String,
    pub actor_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransitionResponse {
    pub booking_id: Uuid,
    pub booking_number: i64,
    pub status: String,
    pub previous_status: String,
    pub resources_synchronized: bool,
}

impl From<TransitionOutcome> for TransitionResponse {
    fn from(outcome: TransitionOutcome) -> Self {
        Self {
            booking_id: outcome.booking.id,
            booking_number: outcome.booking.booking_number,
            status: outcome.booking.status.to_string(),
            previous_status: outcome.previous_status.to_string(),
            resources_synchronized: outcome.resources_synchronized,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BookingResponse {
    pub booking_id: Uuid,
    pub reference: String,
    pub customer_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub vehicle_id: Option<Uuid>,
    pub status: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<Booking> for BookingResponse {
    fn from(booking: Booking) -> Self {
        Self {
            reference: booking.reference(),
            booking_id: booking.id,
            customer_id: booking.customer_id,
            driver_id: booking.driver_id,
            vehicle_id: booking.vehicle_id,
            status: booking.status.to_string(),
            created_at: booking.created_at,
            updated_at: booking.updated_at,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings/{id}", get(get_booking))
        .route("/v1/bookings/{id}/assign", post(assign_booking))
        .route("/v1/bookings/{id}/accept", post(accept_booking))
        .route("/v1/bookings/{id}/start", post(start_trip))
        .route("/v1/bookings/{id}/complete", post(complete_trip))
        .route("/v1/bookings/{id}/cancel", post(cancel_booking))
}

pub async fn get_booking(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BookingResponse>, AppError> {
    let booking_id = parse_id("booking_id", &id)?;
    let booking = state.machine.get_booking(booking_id).await?;
    Ok(Json(booking.into()))
}

pub async fn assign_booking(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<AssignRequest>,
) -> Result<Json<TransitionResponse>, AppError> {
    let booking_id = parse_id("booking_id", &id)?;
    let driver_id = parse_id("driver_id", &req.driver_id)?;
    let vehicle_id = parse_id("vehicle_id", &req.vehicle_id)?;
    let dispatcher_id = parse_id("dispatcher_id", &req.dispatcher_id)?;

    let outcome = state
        .machine
        .assign(booking_id, driver_id, vehicle_id, dispatcher_id)
        .await?;
    Ok(Json(outcome.into()))
}

pub async fn accept_booking(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<DriverRequest>,
) -> Result<Json<TransitionResponse>, AppError> {
    let booking_id = parse_id("booking_id", &id)?;
    let driver_id = parse_id("driver_id", &req.driver_id)?;
    let outcome = state.machine.accept(booking_id, driver_id).await?;
    Ok(Json(outcome.into()))
}

pub async fn start_trip(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<DriverRequest>,
) -> Result<Json<TransitionResponse>, AppError> {
    let booking_id = parse_id("booking_id", &id)?;
    let driver_id = parse_id("driver_id", &req.driver_id)?;
    let outcome = state.machine.start(booking_id, driver_id).await?;
    Ok(Json(outcome.into()))
}

pub async fn complete_trip(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<DriverRequest>,
) -> Result<Json<TransitionResponse>, AppError> {
    let booking_id = parse_id("booking_id", &id)?;
    let driver_id = parse_id("driver_id", &req.driver_id)?;
    let outcome = state.machine.complete(booking_id, driver_id).await?;
    Ok(Json(outcome.into()))
}

pub async fn cancel_booking(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<CancelRequest>,
) -> Result<Json<TransitionResponse>, AppError> {
    let booking_id = parse_id("booking_id", &id)?;
    let actor = Actor::parse(&req.actor_kind, &req.actor_id)?;
    let outcome = state.machine.cancel(booking_id, actor).await?;
    Ok(Json(outcome.into()))
}
