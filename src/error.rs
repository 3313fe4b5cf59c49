use thiserror::Error;

pub type Result<T> = std::result::Result<T, HlaviError>;

#[derive(Debug, Error)]
pub enum HlaviError {
    #[error("Section not found: {0}")]
    SectionNotFound(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Invalid drag token: {0}")]
    InvalidToken(String),

    #[error("Dragged item no longer exists on the board: {0}")]
    StaleSubject(String),

    #[error("Drop target no longer exists on the board: {0}")]
    StaleTarget(String),

    #[error("A previous change to {0} is still being saved")]
    SubjectBusy(String),

    #[error("Persistence gateway failure: {0:#}")]
    Gateway(anyhow::Error),

    #[error("Board not initialized for project {0}")]
    BoardNotInitialized(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[cfg(feature = "sqlite-storage")]
    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("{0}")]
    Other(String),
}

impl HlaviError {
    /// True for failures of the persistence transport, as opposed to
    /// problems with local board state.
    pub fn is_transport(&self) -> bool {
        match self {
            Self::Gateway(_) | Self::IoError(_) | Self::SerializationError(_) => true,
            #[cfg(feature = "sqlite-storage")]
            Self::SqliteError(_) => true,
            _ => false,
        }
    }

    /// True when local state referenced something that has since disappeared.
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::StaleSubject(_) | Self::StaleTarget(_))
    }
}

impl From<anyhow::Error> for HlaviError {
    fn from(err: anyhow::Error) -> Self {
        Self::Gateway(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_gateway_error_keeps_context_chain() {
        let err: HlaviError = anyhow!("connection reset")
            .context("moveTask HLA1")
            .into();

        assert!(err.is_transport());
        assert!(!err.is_stale());
        let message = err.to_string();
        assert!(message.contains("moveTask HLA1"));
        assert!(message.contains("connection reset"));
    }

    #[test]
    fn test_stale_errors_are_not_transport() {
        let err = HlaviError::StaleSubject("t1".to_string());
        assert!(err.is_stale());
        assert!(!err.is_transport());
    }
}
