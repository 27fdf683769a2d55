use aegis_core::CoreError;
use aegis_store::StoreError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps the domain and store errors and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain validation error from `aegis-core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A store error from `aegis-store`.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The caller may not see this resource (unregistered agent).
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // Domain validation failures are the caller's fault.
            AppError::Core(core) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                core.to_string(),
            ),

            AppError::Store(store) => match store {
                StoreError::UnknownClient(_)
                | StoreError::UnknownUser(_)
                | StoreError::UnknownRequest(_) => {
                    (StatusCode::NOT_FOUND, "NOT_FOUND", store.to_string())
                }
                StoreError::DuplicateUser(_) => {
                    (StatusCode::CONFLICT, "CONFLICT", store.to_string())
                }
                StoreError::Io(_) | StoreError::Encode(_) => {
                    tracing::error!(error = %store, "Store persistence error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "An internal error occurred".to_string(),
                    )
                }
            },

            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
