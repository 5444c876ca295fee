use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Reasons a presented bearer token was refused. Rendered verbatim as the
/// `detail` field of a 401 response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    InvalidToken,
    TokenExpired,
    InvalidAuthHeader,
    AuthError,
}

impl AuthFailure {
    pub fn code(self) -> &'static str {
        match self {
            AuthFailure::InvalidToken => "INVALID_TOKEN",
            AuthFailure::TokenExpired => "TOKEN_EXPIRED",
            AuthFailure::InvalidAuthHeader => "INVALID_AUTH_HEADER",
            AuthFailure::AuthError => "AUTH_ERROR",
        }
    }
}

impl std::fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Authentication error: {0}")]
    Auth(AuthFailure),

    #[error("Guest question limit reached")]
    GuestLimit,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("External service error: {0}")]
    ExternalService(String),
}

impl AppError {
    /// Short machine code stored in the analytics tables.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "NO_DB_DATA",
            AppError::Redis(_) => "CACHE_ERROR",
            AppError::Auth(failure) => failure.code(),
            AppError::GuestLimit => "GUEST_LIMIT_REACHED",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Internal(_) => "INTERNAL_ERROR",
            AppError::ExternalService(_) => "EXTERNAL_SERVICE_ERROR",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            AppError::Database(ref e) => {
                tracing::error!("Database error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error occurred".to_string())
            }
            AppError::Redis(ref e) => {
                tracing::error!("Redis error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Cache error occurred".to_string())
            }
            AppError::Auth(failure) => (StatusCode::UNAUTHORIZED, failure.code().to_string()),
            AppError::GuestLimit => (
                StatusCode::TOO_MANY_REQUESTS,
                "GUEST_LIMIT_REACHED".to_string(),
            ),
            AppError::Validation(ref message) => (StatusCode::BAD_REQUEST, message.clone()),
            AppError::NotFound(ref message) => (StatusCode::NOT_FOUND, message.clone()),
            AppError::Internal(ref message) => {
                tracing::error!("Internal error: {}", message);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            AppError::ExternalService(ref message) => {
                tracing::error!("External service error: {}", message);
                (StatusCode::BAD_GATEWAY, "External service error".to_string())
            }
        };

        let body = Json(json!({
            "detail": detail,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_failures_render_401_with_detail_code() {
        let response = AppError::Auth(AuthFailure::TokenExpired).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthFailure::TokenExpired.to_string(), "TOKEN_EXPIRED");
    }

    #[test]
    fn database_errors_map_to_no_db_data() {
        let err = AppError::Database(sqlx::Error::RowNotFound);
        assert_eq!(err.code(), "NO_DB_DATA");
    }
}
