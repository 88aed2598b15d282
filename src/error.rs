use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Upstream authentication failed: {0}")]
    UpstreamAuth(String),

    #[error("{service} returned status {status}")]
    UpstreamUnavailable { service: &'static str, status: u16 },

    #[error("{0}")]
    NotFound(String),

    #[error("Malformed upstream payload: {0}")]
    MalformedPayload(String),

    #[error("Too many requests")]
    RateLimited,

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

/// An upstream payload that could not be parsed into the expected shape.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct Malformed(pub String);

impl From<Malformed> for AppError {
    fn from(m: Malformed) -> Self {
        AppError::MalformedPayload(m.0)
    }
}

impl AppError {
    /// Errors that end a single target's resolution without aborting a batch.
    pub fn is_target_miss(&self) -> bool {
        matches!(self, AppError::NotFound(_) | AppError::MalformedPayload(_))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::UpstreamAuth(_)
            | AppError::UpstreamUnavailable { .. }
            | AppError::MalformedPayload(_) => StatusCode::BAD_GATEWAY,
            AppError::Database(_) | AppError::Redis(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let details = match self {
            AppError::Database(ref e) => {
                tracing::error!("Database error: {:?}", e);
                "Database error".to_string()
            }
            AppError::Redis(ref e) => {
                tracing::error!("Redis error: {:?}", e);
                "Cache error".to_string()
            }
            AppError::Internal(ref e) => {
                tracing::error!("Internal error: {:?}", e);
                "Internal server error".to_string()
            }
            AppError::UpstreamAuth(ref msg) => {
                tracing::error!("Upstream auth error: {}", msg);
                self.to_string()
            }
            AppError::InvalidRequest(msg) | AppError::NotFound(msg) => msg,
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": true,
            "status": status.as_u16(),
            "details": details,
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taxonomy_status_codes() {
        assert_eq!(
            AppError::InvalidRequest("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AppError::NotFound("x".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::UpstreamUnavailable { service: "catalog", status: 503 }.status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(AppError::RateLimited.status_code(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn test_malformed_is_a_target_miss() {
        let err: AppError = Malformed("bad json".into()).into();
        assert!(err.is_target_miss());
        assert!(!AppError::UpstreamAuth("rejected".into()).is_target_miss());
    }
}
