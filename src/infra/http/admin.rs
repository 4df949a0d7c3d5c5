//! Privileged admin surface behind a shared-secret check.

use axum::Json;
use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::Serialize;
use subtle::ConstantTimeEq;
use tracing::error;

use crate::cache::{CacheStatus, ForcedRefresh};

use super::AppState;
use super::error::ApiError;

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/refresh", post(refresh))
        .route("/status", get(status))
        .layer(middleware::from_fn_with_state(state, admin_auth))
}

/// Shared-secret gate. The secret is compared in constant time; a missing
/// server-side secret is a configuration error, not an auth failure.
async fn admin_auth(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(secret) = state.admin_secret.as_deref() else {
        error!(
            target = "infra::http::admin",
            "Admin endpoint hit but no admin secret is configured"
        );
        return ApiError::admin_not_configured().into_response();
    };

    let provided = bearer_token(request.headers().get(axum::http::header::AUTHORIZATION))
        .or_else(|| {
            request
                .headers()
                .get("x-admin-secret")
                .and_then(|value| value.to_str().ok().map(|s| s.to_string()))
        });

    match provided {
        Some(token) if token.as_bytes().ct_eq(secret.as_bytes()).into() => {
            next.run(request).await
        }
        _ => ApiError::unauthorized().into_response(),
    }
}

fn bearer_token(header: Option<&axum::http::HeaderValue>) -> Option<String> {
    let raw = header?.to_str().ok()?;
    let bearer = raw.strip_prefix("Bearer ")?;
    Some(bearer.to_string())
}

#[derive(Debug, Serialize)]
struct RefreshResponse {
    outcome: &'static str,
    #[serde(flatten)]
    status: CacheStatus,
}

async fn refresh(State(state): State<AppState>) -> Result<Json<RefreshResponse>, ApiError> {
    let response = match state.controller.refresh_now().await? {
        ForcedRefresh::Refreshed(status) => RefreshResponse {
            outcome: "refreshed",
            status,
        },
        ForcedRefresh::AlreadyRunning(status) => RefreshResponse {
            outcome: "already_running",
            status,
        },
    };
    Ok(Json(response))
}

async fn status(State(state): State<AppState>) -> Json<CacheStatus> {
    Json(state.controller.status())
}
