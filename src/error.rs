//! Error type returned by every handler.
//!
//! `ApiError` implements [`actix_web::ResponseError`], so handlers can use `?`
//! and the client always receives `{"error": "..."}` with a matching status.
//! Store and internal failures are logged in full but only a generic message
//! leaves the server.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::capture::CaptureError;
use crate::llm::ModelError;

pub const RATE_LIMIT_MESSAGE: &str = "Rate limit exceeded. Please try again later.";
pub const QUOTA_MESSAGE: &str = "AI credits depleted. Please add credits to continue.";
pub const UPSTREAM_MESSAGE: &str = "Failed to get AI response";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    /// A required setting (e.g. the model API key) is missing.
    #[error("{0}")]
    Config(String),

    #[error("{}", RATE_LIMIT_MESSAGE)]
    RateLimited,

    #[error("{}", QUOTA_MESSAGE)]
    QuotaExhausted,

    #[error("{}", UPSTREAM_MESSAGE)]
    Upstream,

    #[error("internal server error")]
    Internal(String),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::QuotaExhausted => StatusCode::PAYMENT_REQUIRED,
            ApiError::Config(_) | ApiError::Upstream | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "error": self.to_string() }))
    }
}

impl From<ModelError> for ApiError {
    fn from(e: ModelError) -> Self {
        match e {
            ModelError::MissingApiKey => ApiError::Config(ModelError::MissingApiKey.to_string()),
            ModelError::RateLimited => ApiError::RateLimited,
            ModelError::QuotaExhausted => ApiError::QuotaExhausted,
            other => {
                error!(error = %other, "model request failed");
                ApiError::Upstream
            }
        }
    }
}

impl From<CaptureError> for ApiError {
    fn from(e: CaptureError) -> Self {
        match e {
            CaptureError::Model(model_error) => model_error.into(),
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        error!(error = ?e, "internal error");
        ApiError::Internal(e.to_string())
    }
}
