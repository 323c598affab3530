//! Error type shared by the workflow, the store and the HTTP layer.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    DatabaseError(sqlx::Error),
    /// Unknown id, or a relationship that belongs to another user.
    NotFound(String),
    /// Invalid input or an ineligible state transition. Raised before any
    /// registry call or write.
    BadRequest(String),
    /// Transport-level failure talking to the BACEN registry (network, timeout,
    /// unexpected status or unparseable body).
    ExternalApiError(String),
    InternalError(String),
    Unauthorized(String),
    WithContext {
        source: Box<AppError>,
        context: String,
    },
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::DatabaseError(e) => write!(f, "storage failure: {}", e),
            AppError::NotFound(msg) => write!(f, "not found: {}", msg),
            AppError::BadRequest(msg) => write!(f, "invalid request: {}", msg),
            AppError::ExternalApiError(msg) => write!(f, "BACEN registry failure: {}", msg),
            AppError::InternalError(msg) => write!(f, "internal failure: {}", msg),
            AppError::Unauthorized(msg) => write!(f, "unauthorized: {}", msg),
            AppError::WithContext { source, context } => write!(f, "{}: {}", context, source),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::DatabaseError(e) => Some(e),
            AppError::WithContext { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl AppError {
    /// The innermost error, past every context layer.
    pub fn root(&self) -> &AppError {
        match self {
            AppError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self.root() {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::ExternalApiError(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable category returned to clients next to the message.
    ///
    /// `validation` means nothing was sent to BACEN and nothing was stored;
    /// `registry_unavailable` means BACEN could not be reached and the
    /// relationship kept its status, so the call can be retried.
    pub fn kind(&self) -> &'static str {
        match self.root() {
            AppError::BadRequest(_) => "validation",
            AppError::NotFound(_) => "not_found",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::ExternalApiError(_) => "registry_unavailable",
            AppError::DatabaseError(_) => "storage",
            AppError::InternalError(_) | AppError::WithContext { .. } => "internal",
        }
    }

    /// Message safe to show to the caller. Validation and lookup messages are
    /// passed through; registry and storage details stay in the logs.
    fn public_message(&self) -> String {
        match self.root() {
            AppError::BadRequest(msg) | AppError::NotFound(msg) => msg.clone(),
            AppError::Unauthorized(_) => "Unauthorized".to_string(),
            AppError::ExternalApiError(_) => "BACEN registry unavailable".to_string(),
            AppError::DatabaseError(_) => "Database error".to_string(),
            _ => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    /// Logs the full context chain once, then answers with the status and
    /// public message of the innermost error.
    fn into_response(self) -> Response {
        let status = self.status_code();
        match self.root() {
            AppError::BadRequest(_) | AppError::NotFound(_) => {
                tracing::debug!("Rejected request: {}", self)
            }
            AppError::Unauthorized(_) => tracing::warn!("Unauthorized access: {}", self),
            AppError::ExternalApiError(_) => tracing::error!("Registry error: {}", self),
            _ => tracing::error!("{}", self),
        }

        let body = Json(json!({
            "error": self.public_message(),
            "kind": self.kind(),
        }));

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::DatabaseError(err)
    }
}

/// Adds a context layer to any error convertible into [`AppError`], in the
/// manner of `anyhow::Context`.
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError>;

    /// Lazy variant; `f` only runs on error.
    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String;
}

impl<T, E: Into<AppError>> ResultExt<T> for Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e.into()),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e.into()),
            context: f(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_and_kinds() {
        let cases = [
            (AppError::NotFound("x".into()), StatusCode::NOT_FOUND, "not_found"),
            (AppError::BadRequest("x".into()), StatusCode::BAD_REQUEST, "validation"),
            (
                AppError::ExternalApiError("x".into()),
                StatusCode::BAD_GATEWAY,
                "registry_unavailable",
            ),
            (AppError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED, "unauthorized"),
            (
                AppError::DatabaseError(sqlx::Error::RowNotFound),
                StatusCode::INTERNAL_SERVER_ERROR,
                "storage",
            ),
        ];

        for (err, status, kind) in cases {
            assert_eq!(err.kind(), kind);
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn test_context_keeps_root_category() {
        let err: Result<(), AppError> = Err(AppError::BadRequest("bad id".into()));
        let wrapped = err.context("requesting detailing").unwrap_err();

        assert_eq!(
            wrapped.to_string(),
            "requesting detailing: invalid request: bad id"
        );
        assert_eq!(wrapped.kind(), "validation");
        assert_eq!(wrapped.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_registry_details_stay_out_of_the_body() {
        let err: Result<(), AppError> =
            Err(AppError::ExternalApiError("connect to 10.0.0.1 refused".into()));
        let response = err.context("requesting detailing").unwrap_err().into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "BACEN registry unavailable");
        assert_eq!(body["kind"], "registry_unavailable");
    }

    #[tokio::test]
    async fn test_validation_message_is_returned() {
        let response = AppError::BadRequest("motivo must be at most 255 characters".into())
            .into_response();

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "motivo must be at most 255 characters");
        assert_eq!(body["kind"], "validation");
    }
}
