//! Error types for the reporting Lambda functions.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Message shown to end users when the real cause must stay server-side.
pub const GENERIC_SERVER_ERROR: &str = "sunucu hatası";

/// Errors that can occur in the reporting Lambda functions.
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// AWS SDK error
    #[error("AWS error: {0}")]
    Aws(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Authentication error
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Authorization error
    #[error("Authorization error: {0}")]
    Unauthorized(String),

    /// Not found error
    #[error("Not found: {0}")]
    NotFound(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The connector proxy could not be reached or timed out.
    #[error("Connector error: {0}")]
    Connector(String),

    /// The connector proxy answered with a non-2xx status.
    #[error("Connector returned {status}: {}", .message.as_deref().unwrap_or("no message"))]
    Upstream { status: u16, message: Option<String> },

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Get HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Validation(_) => 400,
            Error::Auth(_) => 401,
            Error::Unauthorized(_) => 403,
            Error::NotFound(_) => 404,
            Error::Upstream { status, .. } if (400..=599).contains(status) => *status,
            _ => 500,
        }
    }

    /// Message safe to return to the caller.
    ///
    /// Client-side errors carry their own text. Upstream failures surface the
    /// connector's message when it sent one; everything else is generic.
    pub fn public_message(&self) -> String {
        match self {
            Error::Validation(msg)
            | Error::Auth(msg)
            | Error::Unauthorized(msg)
            | Error::NotFound(msg) => msg.clone(),
            Error::Upstream {
                message: Some(msg), ..
            } if !msg.trim().is_empty() => msg.clone(),
            _ => GENERIC_SERVER_ERROR.to_string(),
        }
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<String> = errors
            .field_errors()
            .into_iter()
            .map(|(field, errs)| {
                let detail = errs
                    .iter()
                    .filter_map(|e| e.message.as_ref().map(|m| m.to_string()))
                    .next()
                    .unwrap_or_else(|| "geçersiz değer".to_string());
                format!("{}: {}", field, detail)
            })
            .collect();
        fields.sort();
        Error::Validation(fields.join(", "))
    }
}
