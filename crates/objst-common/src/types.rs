//! Core type definitions for objst
//!
//! Identifiers and the validation rules for object names and owners.

use crate::error::Error;
use derive_more::{From, Into};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use uuid::Uuid;

/// Pattern every persisted object name must match: path-like segments
/// ending in a lowercase dotted extension.
pub const OBJECT_NAME_PATTERN: &str = r"^([a-zA-Z0-9_./-]+)(\.[a-z]+)$";

/// Maximum length of an owner identifier
pub const MAX_OWNER_LEN: usize = 256;

static OBJECT_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(OBJECT_NAME_PATTERN).unwrap_or_else(|e| panic!("invalid name pattern: {e}"))
});

/// Unique identifier for an object
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, From, Into)]
pub struct ObjectId(Uuid);

impl ObjectId {
    /// Generate a new random object ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from existing UUID
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the underlying UUID
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Hyphenated lowercase form, used as the store key
    #[must_use]
    pub fn to_key(&self) -> String {
        self.0.hyphenated().to_string()
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ObjectId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| Error::invalid_argument(format!("invalid uuid for the field `id`: {s}")))
    }
}

/// Errors that can occur when validating an owner identifier
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OwnerError {
    #[error("owner cannot be empty")]
    Empty,
    #[error("owner cannot exceed {MAX_OWNER_LEN} characters")]
    TooLong,
    #[error("owner contains invalid character: {0:?}")]
    InvalidChar(char),
}

impl From<OwnerError> for Error {
    fn from(e: OwnerError) -> Self {
        Self::InvalidArgument(e.to_string())
    }
}

/// Validate an owner identifier.
///
/// Owners are opaque principal ids (user ids, UUIDs, e-mail style handles).
/// They take part in the name index key, so separators and whitespace are
/// rejected.
pub fn validate_owner(owner: &str) -> Result<(), OwnerError> {
    if owner.is_empty() {
        return Err(OwnerError::Empty);
    }
    if owner.chars().count() > MAX_OWNER_LEN {
        return Err(OwnerError::TooLong);
    }
    for c in owner.chars() {
        if !c.is_ascii_alphanumeric() && !matches!(c, '_' | '.' | '@' | ':' | '+' | '-') {
            return Err(OwnerError::InvalidChar(c));
        }
    }
    Ok(())
}

/// Check an object name against [`OBJECT_NAME_PATTERN`]
#[must_use]
pub fn is_valid_object_name(name: &str) -> bool {
    OBJECT_NAME_RE.is_match(name)
}
