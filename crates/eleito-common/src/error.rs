//! Error types for eleito
//!
//! This module defines `EleitoError`, the application-specific error enum.
//! Conflicts are part of the protocol (a lost compare-and-swap race), store
//! errors are transient and retried by the election engine, configuration
//! errors are fatal at startup.

/// Application-specific error types
#[derive(thiserror::Error, Debug)]
pub enum EleitoError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("lock record conflict: {0}")]
    Conflict(String),

    #[error("lock record '{0}' not found")]
    RecordNotFound(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl EleitoError {
    /// A lost optimistic-concurrency race. Expected during normal operation,
    /// it means another replica won the write.
    pub fn is_conflict(&self) -> bool {
        matches!(self, EleitoError::Conflict(_))
    }

    /// A transient store failure, retried by the election engine on its
    /// normal schedule.
    pub fn is_transient(&self) -> bool {
        matches!(self, EleitoError::Store(_))
    }
}

pub type Result<T> = std::result::Result<T, EleitoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EleitoError::Config("renew deadline must be shorter".to_string());
        assert_eq!(
            format!("{}", err),
            "configuration error: renew deadline must be shorter"
        );

        let err = EleitoError::RecordNotFound("default::eleito-leader".to_string());
        assert_eq!(
            format!("{}", err),
            "lock record 'default::eleito-leader' not found"
        );

        let err = EleitoError::Store("connection refused".to_string());
        assert_eq!(format!("{}", err), "store error: connection refused");
    }

    #[test]
    fn test_error_classification() {
        assert!(EleitoError::Conflict("version changed".to_string()).is_conflict());
        assert!(!EleitoError::Conflict("version changed".to_string()).is_transient());
        assert!(EleitoError::Store("timeout".to_string()).is_transient());
        assert!(!EleitoError::Config("bad".to_string()).is_transient());
    }
}
