//! Error taxonomy for the job board client.

use thiserror::Error;

use crate::validate::ValidationErrors;

/// Result type for controller and gateway operations.
pub type BoardResult<T> = Result<T, BoardError>;

#[derive(Debug, Error)]
pub enum BoardError {
    #[error("Not authenticated: {0}")]
    Auth(String),

    #[error("Invalid input: {0}")]
    Validation(ValidationErrors),

    #[error("Request failed{}: {message}", status_suffix(.status))]
    Network { status: Option<u16>, message: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Profile update failed: {0}")]
    ProfileUpdate(#[source] Box<BoardError>),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BoardError {
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network {
            status: None,
            message: msg.into(),
        }
    }

    /// Map a non-2xx backend status onto the taxonomy.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => Self::Auth(message),
            400 | 409 => Self::Conflict(message),
            404 => Self::NotFound(message),
            _ => Self::Network {
                status: Some(status),
                message,
            },
        }
    }

    /// HTTP status this error was built from, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Network { status, .. } => *status,
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            Self::ProfileUpdate(inner) => inner.status(),
            _ => None,
        }
    }

    /// True for failures the user can fix by retrying the same action.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network { .. } | Self::Http(_) => true,
            Self::ProfileUpdate(inner) => inner.is_transient(),
            _ => false,
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({s})")).unwrap_or_default()
}

impl From<ValidationErrors> for BoardError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_unauthorized() {
        let err = BoardError::from_status(401, "Invalid credentials");
        assert!(matches!(err, BoardError::Auth(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_from_status_bad_request_is_conflict() {
        let err = BoardError::from_status(400, "You have already applied for this job.");
        assert!(matches!(err, BoardError::Conflict(ref m) if m.contains("already applied")));
    }

    #[test]
    fn test_from_status_not_found() {
        assert!(matches!(
            BoardError::from_status(404, "missing"),
            BoardError::NotFound(_)
        ));
    }

    #[test]
    fn test_from_status_server_error() {
        let err = BoardError::from_status(502, "bad gateway");
        assert_eq!(err.status(), Some(502));
        assert!(err.is_transient());
        assert_eq!(err.to_string(), "Request failed (502): bad gateway");
    }

    #[test]
    fn test_profile_update_keeps_inner_classification() {
        let err = BoardError::ProfileUpdate(Box::new(BoardError::from_status(503, "down")));
        assert_eq!(err.status(), Some(503));
        assert!(err.is_transient());
    }

    #[test]
    fn test_network_without_status_display() {
        assert_eq!(
            BoardError::network("connection refused").to_string(),
            "Request failed: connection refused"
        );
    }
}
