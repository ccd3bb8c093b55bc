//! Error types for the sync client and the REST collaborator.

/// Failure returned by an [`ApiClient`](crate::api::ApiClient) call.
///
/// `status` carries the HTTP status when the server answered; transport
/// and decode failures leave it empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: Option<u16>,
    pub message: String,
}

impl ApiError {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(Some(404), message)
    }

    /// A 404 means "no such resource yet", not a failure.
    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "API error {status}: {}", self.message),
            None => write!(f, "API error: {}", self.message),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        Self::new(e.status().map(|s| s.as_u16()), e.to_string())
    }
}

/// Errors surfaced by the connection manager and the stores built on it.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The transport could not be opened, or closed before the server
    /// acknowledged the handshake.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The server answered the handshake with an `error` event.
    #[error("authentication rejected{}", auth_reason(.code, .message))]
    AuthRejected {
        code: Option<String>,
        message: Option<String>,
    },

    /// No `connected` acknowledgement within the configured timeout.
    #[error("no acknowledgement from server within {0:?}")]
    Timeout(std::time::Duration),

    #[error("not connected")]
    NotConnected,

    /// `disconnect()` was called while a connect attempt was in flight.
    #[error("connect cancelled by local disconnect")]
    Cancelled,

    #[error(transparent)]
    Api(#[from] ApiError),

    /// A frame could not be understood.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

fn auth_reason(code: &Option<String>, message: &Option<String>) -> String {
    let message = message.as_deref().unwrap_or("no reason given");
    match code {
        Some(code) => format!(" ({code}): {message}"),
        None => format!(": {message}"),
    }
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_discriminated_by_status() {
        assert!(ApiError::not_found("gone").is_not_found());
        assert!(!ApiError::new(Some(500), "boom").is_not_found());
        assert!(!ApiError::new(None, "dns").is_not_found());
    }

    #[test]
    fn display_includes_status_and_auth_details() {
        assert_eq!(
            ApiError::new(Some(503), "unavailable").to_string(),
            "API error 503: unavailable"
        );
        let err = SyncError::AuthRejected {
            code: Some("UNAUTHORIZED".into()),
            message: Some("token expired".into()),
        };
        assert_eq!(
            err.to_string(),
            "authentication rejected (UNAUTHORIZED): token expired"
        );
    }
}
