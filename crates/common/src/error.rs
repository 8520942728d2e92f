//! Error types for votebot.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Application result type.
pub type AppResult<T> = Result<T, AppError>;

/// Application error type.
#[derive(Debug, Error)]
pub enum AppError {
    // === Validation Errors ===
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Poll not found: {0}")]
    PollNotFound(String),

    #[error("Poll is closed: {0}")]
    PollClosed(String),

    #[error("Unknown option: {label}")]
    UnknownOption {
        /// The label the user asked for.
        label: String,
        /// Labels the poll actually offers.
        valid: Vec<String>,
    },

    #[error("Already voted in poll: {0}")]
    AlreadyVoted(String),

    #[error("Only the poll creator may do this")]
    NotCreator,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized")]
    Unauthorized,

    // === Store Errors ===
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Store write failed: {0}")]
    StoreWriteFailed(String),

    #[error("Store read failed: {0}")]
    StoreReadFailed(String),

    #[error("Corrupt record: {0}")]
    CorruptRecord(String),

    // === Server Errors ===
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AppError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            // 4xx Client Errors
            Self::InvalidArguments(_) | Self::UnknownOption { .. } => StatusCode::BAD_REQUEST,
            Self::PollNotFound(_) => StatusCode::NOT_FOUND,
            Self::PollClosed(_) | Self::AlreadyVoted(_) | Self::Conflict(_) => {
                StatusCode::CONFLICT
            }
            Self::NotCreator => StatusCode::FORBIDDEN,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,

            // 5xx Server Errors
            Self::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::StoreWriteFailed(_)
            | Self::StoreReadFailed(_)
            | Self::CorruptRecord(_)
            | Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the stable error code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidArguments(_) => "INVALID_ARGUMENTS",
            Self::PollNotFound(_) => "POLL_NOT_FOUND",
            Self::PollClosed(_) => "POLL_CLOSED",
            Self::UnknownOption { .. } => "UNKNOWN_OPTION",
            Self::AlreadyVoted(_) => "ALREADY_VOTED",
            Self::NotCreator => "NOT_CREATOR",
            Self::Conflict(_) => "CONFLICT",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            Self::StoreWriteFailed(_) => "STORE_WRITE_FAILED",
            Self::StoreReadFailed(_) => "STORE_READ_FAILED",
            Self::CorruptRecord(_) => "CORRUPT_RECORD",
            Self::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Whether the failed store call may be attempted again.
    ///
    /// Only transport-level failures qualify. A corrupt record stays corrupt.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }

    /// Returns whether this error should be logged at error level.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();

        // Log server errors
        if self.is_server_error() {
            tracing::error!(error = %self, code = code, "Server error occurred");
        } else {
            tracing::debug!(error = %self, code = code, "Client error occurred");
        }

        let body = Json(json!({
            "error": {
                "code": code,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

// === From implementations ===

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
