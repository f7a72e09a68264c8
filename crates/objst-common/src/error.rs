//! Error types for objst
//!
//! This module defines the common error type returned by every layer of the
//! object store, from the storage binding up to the HTTP facade.

use std::fmt;
use thiserror::Error;

/// Common result type for objst operations
pub type Result<T> = std::result::Result<T, Error>;

/// Step of a multi-store create/delete sequence.
///
/// Carried by [`Error::IndexInconsistency`] so that a repair pass or a
/// retrying caller knows which store was left behind. The payload store is
/// always written or deleted first, so it never appears here.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IndexStep {
    /// (name, owner) -> id
    NameIndex,
    /// id -> metadata
    MetaIndex,
}

impl fmt::Display for IndexStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NameIndex => f.write_str("name index"),
            Self::MetaIndex => f.write_str("meta index"),
        }
    }
}

/// Reasons an object is not fit to be persisted
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing content type metadata")]
    MissingContentType,

    #[error("object doesn't contain any payload")]
    EmptyPayload,

    #[error("object name `{0}` does not match the allowed pattern")]
    InvalidNamePattern(String),
}

/// Common error type for objst
#[derive(Debug, Error)]
pub enum Error {
    // Argument and validation errors
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("empty query: at least one parameter must be set")]
    EmptyQuery,

    #[error("query sets a name without an owner")]
    NameWithoutOwner,

    // Object lifecycle errors
    #[error("object with the name `{name}` already exists for owner `{owner}`")]
    NameAlreadyExists { name: String, owner: String },

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("object is immutable, create a new object instead")]
    ObjectImmutable,

    // Multi-store consistency errors
    #[error("index inconsistency for object {id}: {step} step failed: {source}")]
    IndexInconsistency {
        id: String,
        step: IndexStep,
        #[source]
        source: Box<Error>,
    },

    #[error("scan delete stopped after removing {removed} objects: {source}")]
    ScanDeleteIncomplete {
        removed: usize,
        #[source]
        source: Box<Error>,
    },

    // Engine and runtime errors
    #[error("storage temporarily unavailable: {0}")]
    StorageUnavailable(String),

    #[error("operation cancelled after removing {removed} objects")]
    Cancelled { removed: usize },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a not found error
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Wrap a failure of one step of a multi-store sequence
    pub fn inconsistency(id: impl Into<String>, step: IndexStep, source: Self) -> Self {
        Self::IndexInconsistency {
            id: id.into(),
            step,
            source: Box::new(source),
        }
    }

    /// Check if this is a not found error
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this is a cancellation, possibly wrapped by a scan delete
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled { .. } => true,
            Self::ScanDeleteIncomplete { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// Check if this is a retryable error
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_))
    }

    /// Get HTTP status code for the facade
    #[must_use]
    pub fn http_status_code(&self) -> u16 {
        match self {
            // 400 Bad Request
            Self::InvalidArgument(_)
            | Self::Validation(_)
            | Self::EmptyQuery
            | Self::NameWithoutOwner => 400,

            // 403 Forbidden
            Self::Unauthorized => 403,

            // 404 Not Found
            Self::NotFound(_) => 404,

            // 409 Conflict
            Self::NameAlreadyExists { .. } | Self::ObjectImmutable => 409,

            // 499 Client Closed Request
            Self::Cancelled { .. } => 499,

            // 500 Internal Server Error
            Self::IndexInconsistency { .. }
            | Self::ScanDeleteIncomplete { .. }
            | Self::Storage(_)
            | Self::Serialization(_)
            | Self::Deserialization(_)
            | Self::Configuration(_)
            | Self::Io(_) => 500,

            // 503 Service Unavailable
            Self::StorageUnavailable(_) => 503,
        }
    }

    /// Message that is safe to hand to a remote caller.
    ///
    /// Store paths and engine error text never leave the process; server-side
    /// failures collapse into a generic sentence.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::InvalidArgument(_)
            | Self::Validation(_)
            | Self::EmptyQuery
            | Self::NameWithoutOwner
            | Self::NameAlreadyExists { .. }
            | Self::NotFound(_)
            | Self::Unauthorized
            | Self::ObjectImmutable
            | Self::Cancelled { .. } => self.to_string(),
            Self::StorageUnavailable(_) => "storage temporarily unavailable, retry later".into(),
            Self::IndexInconsistency { id, .. } => {
                format!("object {id} was only partially written or removed")
            }
            Self::ScanDeleteIncomplete { removed, .. } => {
                format!("delete stopped after removing {removed} objects")
            }
            Self::Storage(_)
            | Self::Serialization(_)
            | Self::Deserialization(_)
            | Self::Configuration(_)
            | Self::Io(_) => "internal storage error".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        assert!(Error::StorageUnavailable("compaction".into()).is_retryable());
        assert!(!Error::Unauthorized.is_retryable());
        assert!(!Error::storage("disk").is_retryable());
    }

    #[test]
    fn test_error_not_found() {
        assert!(Error::not_found("id").is_not_found());
        assert!(!Error::EmptyQuery.is_not_found());
    }

    #[test]
    fn test_error_http_status() {
        assert_eq!(Error::Unauthorized.http_status_code(), 403);
        assert_eq!(Error::not_found("x").http_status_code(), 404);
        assert_eq!(
            Error::Validation(ValidationError::EmptyPayload).http_status_code(),
            400
        );
        assert_eq!(
            Error::NameAlreadyExists {
                name: "a.txt".into(),
                owner: "u1".into()
            }
            .http_status_code(),
            409
        );
        assert_eq!(Error::storage("boom").http_status_code(), 500);
        assert_eq!(
            Error::StorageUnavailable("busy".into()).http_status_code(),
            503
        );
    }

    #[test]
    fn test_public_message_hides_engine_detail() {
        let err = Error::storage("/var/lib/objst/payload/data.redb: corrupted page");
        assert!(!err.public_message().contains("/var/lib"));

        let err = Error::inconsistency(
            "abc",
            IndexStep::NameIndex,
            Error::storage("/tmp/names: io"),
        );
        let msg = err.public_message();
        assert!(msg.contains("abc"));
        assert!(!msg.contains("/tmp/names"));
    }

    #[test]
    fn test_inconsistency_names_step() {
        let err = Error::inconsistency("abc", IndexStep::MetaIndex, Error::storage("io"));
        assert!(err.to_string().contains("meta index"));
        assert!(matches!(
            err,
            Error::IndexInconsistency {
                step: IndexStep::MetaIndex,
                ..
            }
        ));
    }

    #[test]
    fn test_cancelled_through_scan_delete() {
        let err = Error::ScanDeleteIncomplete {
            removed: 3,
            source: Box::new(Error::Cancelled { removed: 3 }),
        };
        assert!(err.is_cancelled());
        assert!(!Error::EmptyQuery.is_cancelled());
    }
}
