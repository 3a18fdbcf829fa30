//! Error types for preset librarian operations.

use thiserror::Error;

/// Primary error type for librarian operations.
#[derive(Error, Debug)]
pub enum LibrarianError {
    // Command errors
    #[error("Unsupported command: {verb}")]
    UnsupportedCommand { verb: String },

    #[error("Unknown option '{key}' for command '{verb}'")]
    UnknownOption { verb: String, key: String },

    #[error("Bad option: {detail}")]
    BadOption { detail: String },

    #[error("Command '{verb}' requires at least one filter")]
    MissingFilter { verb: String },

    // Data-integrity errors
    #[error("No record with lid {lid}")]
    RecordNotFound { lid: i64 },

    #[error("Invalid preset number {value}: must be 0-250")]
    InvalidPresetNumber { value: i64 },

    // Resource errors
    #[error("Failed to read '{path}': {reason}")]
    DocumentRead { path: String, reason: String },

    #[error("Invalid JSON in {context}: {reason}")]
    InvalidJson { context: String, reason: String },

    #[error("Export document failed validation: {0}")]
    ExportInvalid(String),

    // Device errors
    #[error("Device unreachable: {url} ({attempts} attempts)")]
    DeviceUnreachable { url: String, attempts: u32 },

    #[error("Device returned HTTP {status} for {url}")]
    DeviceStatus { url: String, status: u16 },

    // Datastore errors
    #[error("Datastore at '{path}' is missing the expected schema")]
    SchemaMissing { path: String },

    #[error("Database error: {0}")]
    Sql(#[from] rusqlite::Error),

    // General errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl LibrarianError {
    /// Returns true if the error is recoverable by the user within the
    /// session: the triggering command is discarded and the loop continues.
    /// Covers the input, resource, and data-integrity classes; only datastore
    /// and IO failures are fatal.
    pub const fn is_user_recoverable(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedCommand { .. }
                | Self::UnknownOption { .. }
                | Self::BadOption { .. }
                | Self::MissingFilter { .. }
                | Self::RecordNotFound { .. }
                | Self::InvalidPresetNumber { .. }
                | Self::DocumentRead { .. }
                | Self::InvalidJson { .. }
                | Self::ExportInvalid(_)
        )
    }

    /// Returns a suggestion for how to fix the error.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::UnsupportedCommand { .. } | Self::UnknownOption { .. } => {
                Some("Type 'help' for the command table")
            }
            Self::MissingFilter { .. } => {
                Some("Narrow the command with a filter such as lid: or tag:")
            }
            Self::InvalidPresetNumber { .. } => Some("Use a preset number between 0 and 250"),
            Self::DeviceUnreachable { .. } => {
                Some("Check --host and that the controller is reachable on the network")
            }
            Self::SchemaMissing { .. } => {
                Some("Accept schema creation at startup, or point --db at an existing library")
            }
            _ => None,
        }
    }
}

/// Convenience type alias for Results using LibrarianError.
pub type Result<T> = std::result::Result<T, LibrarianError>;

/// Extension trait for adding context to errors.
pub trait ResultExt<T> {
    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T, E: std::error::Error> ResultExt<T> for std::result::Result<T, E> {
    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| LibrarianError::Other(format!("{}: {e}", f().into())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_context_wraps_source_error() {
        let result: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "gone",
        ));
        let err = result.with_context(|| "opening library").unwrap_err();
        assert_eq!(err.to_string(), "opening library: gone");
    }

    #[test]
    fn test_resource_errors_survive_the_session() {
        let invalid = LibrarianError::InvalidJson {
            context: "bad.json".to_string(),
            reason: "truncated".to_string(),
        };
        assert!(invalid.is_user_recoverable());
        assert!(LibrarianError::ExportInvalid("oops".to_string()).is_user_recoverable());
        // Datastore failures stay fatal
        assert!(!LibrarianError::Sql(rusqlite::Error::InvalidQuery).is_user_recoverable());
    }
}
