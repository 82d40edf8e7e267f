use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::domain::error::DomainError;

/// json body of every error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
}

/// Error returned by handlers, rendered as `{ "error", "code" }`.
#[derive(Debug)]
pub struct ApiError(DomainError);

pub type ApiResult<T> = Result<T, ApiError>;

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0.code() {
            "VALIDATION_FAILED" | "INVALID_PHONE_NUMBER" | "WEAK_PASSWORD" => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            "STEP_OUT_OF_ORDER" | "ROLE_MISMATCH" | "PHONE_NOT_VERIFIED"
            | "INVALID_OR_EXPIRED_CODE" => StatusCode::BAD_REQUEST,
            "SESSION_NOT_FOUND" => StatusCode::NOT_FOUND,
            "ROLE_CONFLICT" | "REGISTRATION_INCOMPLETE" | "PHONE_ALREADY_REGISTERED" => {
                StatusCode::CONFLICT
            }
            "TRANSIENT_STORE_FAILURE" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            error!(error = %self.0, code = self.0.code(), "request failed");
            match status {
                StatusCode::SERVICE_UNAVAILABLE => {
                    "Service temporarily unavailable, retry later".to_string()
                }
                _ => "An internal error occurred".to_string(),
            }
        } else {
            debug!(error = %self.0, code = self.0.code(), "request rejected");
            self.0.to_string()
        };

        let body = ErrorBody {
            error: message,
            code: self.0.code().to_string(),
        };
        (status, Json(body)).into_response()
    }
}
