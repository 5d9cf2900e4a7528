//! Load posting and booking endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use loadboard_common::id::{prefix, prefixed_ulid};
use loadboard_common::{distance_miles, GeoPoint};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::middleware::AuthUser;
use crate::booking::BookingRequest;
use crate::error::{ApiError, ApiErrorBody, FieldError};
use crate::models::load::{is_interstate, BillingStatus, Load, LoadStatus, NewLoad, RateType};
use crate::models::user::AccountType;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/loads", post(create_load))
        .route("/loads/{id}/book", post(book_load))
}

// ---------------------------------------------------------------------------
// POST /api/v1/loads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Deserialize, ToSchema)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl From<Coordinates> for GeoPoint {
    fn from(c: Coordinates) -> Self {
        GeoPoint::new(c.latitude, c.longitude)
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateLoadRequest {
    pub title: String,
    pub rate: f64,
    #[serde(default)]
    pub rate_type: RateType,
    pub origin_state: String,
    pub destination_state: String,
    pub origin: Option<Coordinates>,
    pub destination: Option<Coordinates>,
}

impl CreateLoadRequest {
    fn validate(&self) -> Result<(), ApiError> {
        let mut errors = Vec::new();
        if self.title.trim().is_empty() {
            errors.push(FieldError::new("title", "Title is required"));
        }
        if !self.rate.is_finite() || self.rate <= 0.0 {
            errors.push(FieldError::new("rate", "Rate must be a positive number"));
        }
        if self.origin_state.trim().is_empty() {
            errors.push(FieldError::new("originState", "Origin state is required"));
        }
        if self.destination_state.trim().is_empty() {
            errors.push(FieldError::new(
                "destinationState",
                "Destination state is required",
            ));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::validation(errors))
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/loads",
    tag = "Loads",
    security(("bearer" = [])),
    request_body = CreateLoadRequest,
    responses(
        (status = 201, description = "Load posted", body = Load),
        (status = 400, description = "Validation error", body = ApiErrorBody),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Not a broker, or MC authority missing", body = ApiErrorBody),
    ),
)]
pub async fn create_load(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(body): Json<CreateLoadRequest>,
) -> Result<(StatusCode, Json<Load>), ApiError> {
    if auth.account_type != AccountType::Broker && !auth.role.is_admin() {
        return Err(ApiError::forbidden("Only brokers can post loads"));
    }
    body.validate()?;

    let origin_state = body.origin_state.trim().to_uppercase();
    let destination_state = body.destination_state.trim().to_uppercase();
    let interstate = is_interstate(&origin_state, &destination_state);

    if interstate {
        let poster = state
            .users
            .find_user(&auth.user_id)
            .await?
            .ok_or_else(|| ApiError::unauthorized("User not found"))?;
        if !poster.has_mc {
            return Err(ApiError::forbidden(
                "MC number required to post interstate loads",
            ));
        }
    }

    let distance = distance_miles(
        body.origin.map(GeoPoint::from),
        body.destination.map(GeoPoint::from),
    )
    .and_then(|miles| i32::try_from(miles).ok());

    let now = Utc::now();
    let load = state
        .loads
        .insert_load(NewLoad {
            id: prefixed_ulid(prefix::LOAD),
            title: body.title.trim().to_string(),
            posted_by: auth.user_id.clone(),
            status: LoadStatus::Available.as_str().to_string(),
            rate: body.rate,
            rate_type: body.rate_type.as_str().to_string(),
            distance,
            origin_state,
            destination_state,
            is_interstate: interstate,
            billing_status: BillingStatus::Pending.as_str().to_string(),
            created_at: now,
            updated_at: now,
        })
        .await?;

    tracing::info!(load_id = %load.id, posted_by = %auth.user_id, interstate, "load posted");
    state.gateway.dispatcher().notify_new_load(&load);

    Ok((StatusCode::CREATED, Json(load)))
}

// ---------------------------------------------------------------------------
// POST /api/v1/loads/:id/book
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookLoadRequest {
    pub proposed_rate: Option<f64>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookLoadResponse {
    pub success: bool,
    pub message: String,
    pub load: Load,
    /// Line-haul amount due at the agreed rate.
    pub total_due: f64,
}

#[utoipa::path(
    post,
    path = "/api/v1/loads/{id}/book",
    tag = "Loads",
    security(("bearer" = [])),
    params(("id" = String, Path, description = "Load ID")),
    request_body = BookLoadRequest,
    responses(
        (status = 200, description = "Load booked", body = BookLoadResponse),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Not a carrier, or MC authority missing", body = ApiErrorBody),
        (status = 404, description = "Load not found", body = ApiErrorBody),
        (status = 409, description = "Load already booked or not available", body = ApiErrorBody),
    ),
)]
pub async fn book_load(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(load_id): Path<String>,
    Json(body): Json<BookLoadRequest>,
) -> Result<Json<BookLoadResponse>, ApiError> {
    let load = state
        .booking
        .book_load(BookingRequest {
            load_id,
            carrier_id: auth.user_id,
            account_type: auth.account_type,
            role: auth.role,
            proposed_rate: body.proposed_rate,
            notes: body.notes,
        })
        .await?;

    Ok(Json(BookLoadResponse {
        success: true,
        message: "Load booked successfully".to_string(),
        total_due: load.line_haul_total(),
        load,
    }))
}
