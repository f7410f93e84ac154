use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use sqlx::Error as SqlxError;
use thiserror::Error as ThisError;
use tracing::error;

#[derive(Debug, ThisError)]
pub enum LaasError {
    #[error("could not connect to database after {attempts} attempts: {source}")]
    Connection {
        attempts: usize,
        #[source]
        source: SqlxError,
    },

    #[error("{0} already exists")]
    DuplicateKey(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("database queue saturated ({capacity} operations in flight)")]
    QueueSaturated { capacity: usize },

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("verification code is wrong, expired or unknown")]
    VerificationFailed,

    #[error("missing or invalid session")]
    Unauthorized,

    #[error("mail dispatch failed: {0}")]
    Mail(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] SqlxError),

    #[error("could not decode {column}: {reason}")]
    Decode { column: &'static str, reason: String },

    #[error("Ractor error: {0}")]
    RactorError(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LaasError {
    /// True when the store rejected a write because a UNIQUE / PRIMARY KEY already holds the value.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            LaasError::DatabaseError(SqlxError::Database(db)) => {
                db.is_unique_violation() || db.message().starts_with("UNIQUE constraint failed")
            }
            _ => false,
        }
    }
}

impl IntoResponse for LaasError {
    fn into_response(self) -> axum::response::Response {
        let (status, code, message) = match &self {
            LaasError::DuplicateKey(_) => (
                StatusCode::CONFLICT,
                "ALREADY_EXISTS",
                "The resource already exists.",
            ),
            LaasError::NotFound(_) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                "The resource was not found.",
            ),
            LaasError::QueueSaturated { .. } => (
                StatusCode::SERVICE_UNAVAILABLE,
                "QUEUE_SATURATED",
                "The server is busy; retry later.",
            ),
            LaasError::Validation(_) | LaasError::Json(_) => (
                StatusCode::BAD_REQUEST,
                "BAD_REQUEST",
                "The request was malformed.",
            ),
            LaasError::VerificationFailed => (
                StatusCode::FORBIDDEN,
                "VERIFICATION_FAILED",
                "The verification code is invalid or expired.",
            ),
            LaasError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Authentication error.",
            ),
            LaasError::Mail(_) => (
                StatusCode::BAD_GATEWAY,
                "MAIL_UNAVAILABLE",
                "The verification email could not be sent.",
            ),
            LaasError::Connection { .. }
            | LaasError::DatabaseError(_)
            | LaasError::Decode { .. }
            | LaasError::RactorError(_) => {
                error!(error = %self, "internal error while serving request");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred.",
                )
            }
        };
        // Validation messages are the caller's own input; everything else stays generic.
        let message = match &self {
            LaasError::Validation(reason) => reason.clone(),
            _ => message.to_string(),
        };
        let body = ApiErrorBody {
            code: code.to_string(),
            message,
        };
        (status, Json(ApiErrorResponse { error: body })).into_response()
    }
}

/// Standardized API error response body
#[derive(Serialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorBody,
}
