use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::share::ShareError;
use crate::cache::RefreshError;
use crate::scrape::ScrapeError;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorMessage,
}

pub mod codes {
    pub const NOT_FOUND: &str = "not_found";
    pub const UNAUTHORIZED: &str = "unauthorized";
    pub const ORIGIN_UNAVAILABLE: &str = "origin_unavailable";
    pub const SHARE_INPUT_MISSING: &str = "share_input_missing";
    pub const ADMIN_NOT_CONFIGURED: &str = "admin_not_configured";
    pub const INTERNAL: &str = "internal_error";
}

#[derive(Debug, Serialize)]
pub struct ApiErrorMessage {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: &'static str,
    hint: Option<String>,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        code: &'static str,
        message: &'static str,
        hint: Option<String>,
    ) -> Self {
        Self {
            status,
            code,
            message,
            hint,
        }
    }

    pub fn not_found(message: &'static str) -> Self {
        Self::new(StatusCode::NOT_FOUND, codes::NOT_FOUND, message, None)
    }

    pub fn unauthorized() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            codes::UNAUTHORIZED,
            "Admin secret required",
            None,
        )
    }

    pub fn admin_not_configured() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::ADMIN_NOT_CONFIGURED,
            "Admin surface has no configured secret",
            None,
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            error: ApiErrorMessage {
                code: self.code.to_string(),
                message: self.message.to_string(),
                hint: self.hint,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<RefreshError> for ApiError {
    fn from(error: RefreshError) -> Self {
        match &error {
            RefreshError::Scrape(ScrapeError::OriginUnavailable { .. }) => ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                codes::ORIGIN_UNAVAILABLE,
                "Origin unavailable and no cached snapshot exists",
                Some(error.to_string()),
            ),
            RefreshError::Cache(_) => ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::INTERNAL,
                "Cache failure",
                Some(error.to_string()),
            ),
        }
    }
}

impl From<ShareError> for ApiError {
    fn from(error: ShareError) -> Self {
        match &error {
            ShareError::NoImages => ApiError::new(
                StatusCode::NOT_FOUND,
                codes::SHARE_INPUT_MISSING,
                "No share images available for this scope",
                None,
            ),
            ShareError::Encode(_) | ShareError::Io(_) => ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::INTERNAL,
                "Share card rendering failed",
                Some(error.to_string()),
            ),
        }
    }
}
