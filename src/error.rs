//! Error types for registry and storage operations.
//!
//! The first four variants describe conditions that restore and
//! get-or-create recover from on their own: they are logged and never
//! returned to callers. The rest propagate.

/// Result type for persistor operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Nothing is stored under the registry key yet.
    #[error("structure does not exist")]
    StructureNonExistent,

    /// A blob exists under the registry key but is not a registry snapshot.
    #[error("structure is invalid: {reason}")]
    StructureInvalid { reason: String },

    /// An expiration field could not be parsed.
    #[error("date is invalid: {value:?}")]
    DateInvalid { value: String },

    /// A whole storage instance outlived its expiration.
    #[error("storage '{name}' expired")]
    StorageExpired { name: String },

    /// A value could not be converted to or from JSON.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backing store failed.
    #[error("backing store {operation} failed: {source:#}")]
    Backend {
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl Error {
    pub(crate) fn structure_invalid(reason: impl ToString) -> Self {
        Self::StructureInvalid {
            reason: reason.to_string(),
        }
    }

    pub(crate) fn date_invalid(value: impl Into<String>) -> Self {
        Self::DateInvalid {
            value: value.into(),
        }
    }

    pub(crate) fn storage_expired(name: impl Into<String>) -> Self {
        Self::StorageExpired { name: name.into() }
    }

    pub(crate) fn backend(operation: &'static str, source: anyhow::Error) -> Self {
        Self::Backend { operation, source }
    }

    /// Whether this condition is handled internally instead of surfacing.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::StructureNonExistent
                | Self::StructureInvalid { .. }
                | Self::DateInvalid { .. }
                | Self::StorageExpired { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_kinds() {
        assert!(Error::StructureNonExistent.is_recoverable());
        assert!(Error::structure_invalid("not an array").is_recoverable());
        assert!(Error::date_invalid("yesterday").is_recoverable());
        assert!(Error::storage_expired("session").is_recoverable());

        let write = Error::backend("write", anyhow::anyhow!("disk full"));
        assert!(!write.is_recoverable());
    }

    #[test]
    fn test_backend_message_includes_cause_chain() {
        let source = anyhow::anyhow!("disk full").context("Failed to write store file");
        let err = Error::backend("write", source);
        assert_eq!(
            err.to_string(),
            "backing store write failed: Failed to write store file: disk full"
        );
    }
}
