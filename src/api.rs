//! HTTP API handlers.
//!
//! - `GET /health`: liveness probe
//! - `POST /evaluate`: run one evaluation cycle, optionally as of a given instant
//! - `GET /state`: the stored alert state for the configured user
//! - `PUT /profile`: create or replace the configured user's profile

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{info, instrument, warn};

use crate::model::{AlertRecord, Profile, ProfileRequest};
use crate::service::{AlertService, CycleResponse};
use crate::timeutil::{QuietHours, parse_instant};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<AlertService>,
}

/// Body of `POST /evaluate`. Every field is optional.
#[derive(Debug, Default, Deserialize)]
pub struct EvaluateRequest {
    /// RFC 3339 instant to evaluate at instead of the current time.
    pub now: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub ok: bool,
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            ok: false,
            error: message.into(),
        }),
    )
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/evaluate", post(post_evaluate))
        .route("/state", get(get_state))
        .route("/profile", put(put_profile))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - Simple health check endpoint.
pub async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

/// POST /evaluate - Run one evaluation cycle.
///
/// # Request Body
///
/// ```json
/// { "now": "2026-02-16T07:03:31Z" }
/// ```
///
/// The body may be omitted entirely, in which case the cycle runs as of the
/// current time.
#[instrument(skip(state, request))]
pub async fn post_evaluate(
    State(state): State<AppState>,
    request: Option<Json<EvaluateRequest>>,
) -> Result<Json<CycleResponse>, ApiError> {
    let request = request.map(|Json(r)| r).unwrap_or_default();

    let now = match request.now.as_deref() {
        None => Utc::now(),
        Some(raw) => parse_instant(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| {
                warn!(now = %raw, "Rejected evaluation with invalid instant");
                api_error(StatusCode::BAD_REQUEST, format!("invalid now: {raw}"))
            })?,
    };

    match state.service.run_cycle(now).await {
        Ok(response) => {
            info!(now = %now, "Evaluation completed");
            Ok(Json(response))
        }
        Err(e) => {
            warn!(now = %now, error = %e, "Evaluation failed");
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}")))
        }
    }
}

/// GET /state - The alert record left behind by the latest evaluation.
///
/// Returns `404 Not Found` until the first evaluation has completed.
#[instrument(skip(state))]
pub async fn get_state(State(state): State<AppState>) -> Result<Json<AlertRecord>, StatusCode> {
    let user_id = &state.service.config().user_id;

    match state.service.storage().get_alert_record(user_id).await {
        Ok(Some(record)) => Ok(Json(record)),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            warn!(user_id = %user_id, error = %e, "Failed to load alert state");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// PUT /profile - Create or replace the profile.
///
/// # Request Body
///
/// ```json
/// {
///     "lat": 1.3521,
///     "lng": 103.8198,
///     "chatId": "123456",
///     "quietStart": "23:00",
///     "quietEnd": "07:00"
/// }
/// ```
#[instrument(skip(state, request))]
pub async fn put_profile(
    State(state): State<AppState>,
    Json(request): Json<ProfileRequest>,
) -> Result<Json<Profile>, ApiError> {
    if !request.lat.is_finite() || !request.lng.is_finite() {
        return Err(api_error(StatusCode::BAD_REQUEST, "lat and lng must be finite"));
    }

    let config = state.service.config();
    let quiet_start = request.quiet_start.as_deref().unwrap_or(&config.quiet_start);
    let quiet_end = request.quiet_end.as_deref().unwrap_or(&config.quiet_end);
    if let Err(e) = QuietHours::parse(quiet_start, quiet_end) {
        return Err(api_error(StatusCode::BAD_REQUEST, e.to_string()));
    }

    let profile = Profile {
        lat: request.lat,
        lng: request.lng,
        chat_id: request.chat_id,
        alert_style: request.alert_style,
        quiet_start: request.quiet_start,
        quiet_end: request.quiet_end,
        enabled: request.enabled,
        updated_at: Utc::now(),
    };

    match state.service.storage().put_profile(&config.user_id, &profile).await {
        Ok(()) => {
            info!(user_id = %config.user_id, "Profile updated");
            Ok(Json(profile))
        }
        Err(e) => {
            warn!(user_id = %config.user_id, error = %e, "Failed to store profile");
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to store profile"))
        }
    }
}
