//! API error taxonomy, grounded on `vex-api::error::ApiError`, remapped
//! onto the closed taxonomy in spec §7.

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde::Serialize;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("authentication required: {0}")]
    Auth(String),

    #[error("forbidden: {0}")]
    Authorization(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("payload too large")]
    PayloadTooLarge,

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, "validation", msg.clone()),
            ApiError::Auth(msg) => (StatusCode::UNAUTHORIZED, "auth", msg.clone()),
            ApiError::Authorization(msg) => (StatusCode::FORBIDDEN, "authorization", msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone()),
            ApiError::RateLimited { .. } => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                "rate limit exceeded".to_string(),
            ),
            ApiError::PayloadTooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "payload_too_large",
                "request body exceeds the configured limit".to_string(),
            ),
            ApiError::StoreUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", msg.clone())
            }
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    "an internal error occurred".to_string(),
                )
            }
        };

        let mut response = (status, Json(ErrorBody {
            error: ErrorDetail { code, message },
        }))
            .into_response();

        if let ApiError::RateLimited { retry_after_secs } = &self {
            response
                .headers_mut()
                .insert("Retry-After", retry_after_secs.to_string().parse().unwrap());
        }

        response
    }
}

impl From<agentlens_store::StoreError> for ApiError {
    fn from(e: agentlens_store::StoreError) -> Self {
        use agentlens_store::StoreError::*;
        match e {
            NotFound(msg) => ApiError::NotFound(msg),
            AlreadyExists(msg) => ApiError::Conflict(msg),
            Validation(msg) => ApiError::Validation(msg),
            Unavailable(msg) => ApiError::StoreUnavailable(msg),
            Serialization(err) => ApiError::Internal(err.to_string()),
            Sql(err) => ApiError::Internal(err.to_string()),
            Internal(msg) => ApiError::Internal(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn rate_limited_carries_retry_after_header() {
        let response = ApiError::RateLimited { retry_after_secs: 42 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get("Retry-After").unwrap(), "42");
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["code"], "rate_limited");
    }
}
