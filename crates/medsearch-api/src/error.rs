use medsearch_common::MedsearchError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("API error [{status}]: {message}")]
    Status { status: u16, message: String },
    #[error("User not authenticated")]
    Unauthenticated,
    #[error("Upload failed: {0}")]
    Upload(String),
    #[error(transparent)]
    Client(#[from] MedsearchError),
}

impl ApiError {
    /// A 404 while polling means the thread record has not propagated yet.
    pub fn is_transient_poll_error(&self) -> bool {
        matches!(self, ApiError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ApiError::Conflict(_))
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::NotFound(_) => Some(404),
            ApiError::Conflict(_) => Some(409),
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_not_found_is_transient() {
        assert!(ApiError::NotFound("thread".into()).is_transient_poll_error());
        assert!(!ApiError::Status { status: 500, message: "boom".into() }.is_transient_poll_error());
        assert!(!ApiError::Conflict("dup".into()).is_transient_poll_error());
        assert!(!ApiError::Unauthenticated.is_transient_poll_error());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ApiError::Conflict("x".into()).status_code(), Some(409));
        assert_eq!(ApiError::Status { status: 502, message: String::new() }.status_code(), Some(502));
        assert_eq!(ApiError::Unauthenticated.status_code(), None);
    }
}
