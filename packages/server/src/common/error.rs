//! The HTTP error envelope and the typed error that produces it.
//!
//! Domain code (Admission, Lifecycle, ScheduleOracle) never returns this type
//! directly — it returns its own typed outcomes. `AppError` lives at the HTTP
//! boundary: route handlers convert domain outcomes into it, and it alone
//! knows how to render itself as `{error: {code, message, details?}}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    TooManyRequests,
    InternalServerError,
    ServiceUnavailable,
}

impl ErrorCode {
    fn status(self) -> StatusCode {
        match self {
            ErrorCode::BadRequest => StatusCode::BAD_REQUEST,
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::Conflict => StatusCode::CONFLICT,
            ErrorCode::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{message}")]
    BadRequest { message: String },

    #[error("unauthorized")]
    Unauthorized,

    #[error("{message}")]
    NotFound { message: String },

    #[error("{message}")]
    TooManyRequests { message: String },

    #[error("{message}, retry after {retry_after_secs}s")]
    ServiceUnavailable {
        message: String,
        retry_after_secs: u64,
    },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        AppError::BadRequest {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        AppError::NotFound {
            message: message.into(),
        }
    }

    pub fn too_many_requests(message: impl Into<String>) -> Self {
        AppError::TooManyRequests {
            message: message.into(),
        }
    }

    pub fn service_unavailable(message: impl Into<String>, retry_after_secs: u64) -> Self {
        AppError::ServiceUnavailable {
            message: message.into(),
            retry_after_secs,
        }
    }

    fn code(&self) -> ErrorCode {
        match self {
            AppError::BadRequest { .. } => ErrorCode::BadRequest,
            AppError::Unauthorized => ErrorCode::Unauthorized,
            AppError::NotFound { .. } => ErrorCode::NotFound,
            AppError::TooManyRequests { .. } => ErrorCode::TooManyRequests,
            AppError::ServiceUnavailable { .. } => ErrorCode::ServiceUnavailable,
            AppError::Internal(_) => ErrorCode::InternalServerError,
        }
    }
}

#[derive(Serialize)]
struct ErrorDetails {
    code: ErrorCode,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct ErrorEnvelope {
    error: ErrorDetails,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.code();
        let status = code.status();

        if let AppError::Internal(ref err) = self {
            tracing::error!(error = %err, "internal error");
        }

        let details = if let AppError::ServiceUnavailable {
            retry_after_secs, ..
        } = &self
        {
            Some(serde_json::json!({ "retry_after": retry_after_secs }))
        } else {
            None
        };

        let body = ErrorEnvelope {
            error: ErrorDetails {
                code,
                message: self.to_string(),
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_request_maps_to_400() {
        assert_eq!(
            AppError::bad_request("nope").code().status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn service_unavailable_maps_to_503() {
        let err = AppError::service_unavailable("db down", 30);
        assert_eq!(err.code().status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn internal_maps_to_500() {
        let err = AppError::Internal(anyhow::anyhow!("boom"));
        assert_eq!(err.code().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
