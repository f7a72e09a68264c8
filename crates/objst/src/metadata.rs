//! Object metadata: string key/value pairs with a protected system subset.

use crate::query::Action;
use objst_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// User key every persisted object must carry
pub const CONTENT_TYPE: &str = "contentType";

/// Keys only the object and bucket internals may write
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SystemKey {
    Id,
    Name,
    Owner,
    CreatedAt,
}

impl SystemKey {
    pub const ALL: [Self; 4] = [Self::Id, Self::Name, Self::Owner, Self::CreatedAt];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::Owner => "owner",
            Self::CreatedAt => "createdAt",
        }
    }

    #[must_use]
    pub fn parse(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == key)
    }
}

impl fmt::Display for SystemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A metadata key, classified into the system or user namespace
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetaKey<'a> {
    System(SystemKey),
    User(&'a str),
}

impl<'a> MetaKey<'a> {
    #[must_use]
    pub fn classify(key: &'a str) -> Self {
        SystemKey::parse(key).map_or(MetaKey::User(key), MetaKey::System)
    }

    #[must_use]
    pub const fn is_system(&self) -> bool {
        matches!(self, Self::System(_))
    }
}

/// Ordered string map attached to an object.
///
/// [`Metadata::set`] and [`Metadata::del`] silently ignore system keys;
/// those are written through [`Metadata::set_system`], which is private to
/// the crate.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(BTreeMap<String, String>);

impl Metadata {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a user key. Returns false if `key` is a system
    /// key and nothing was written.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> bool {
        let key = key.into();
        if MetaKey::classify(&key).is_system() {
            return false;
        }
        self.0.insert(key, value.into());
        true
    }

    pub(crate) fn set_system(&mut self, key: SystemKey, value: impl Into<String>) {
        self.0.insert(key.as_str().to_string(), value.into());
    }

    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn get_system(&self, key: SystemKey) -> Option<&str> {
        self.get(key.as_str())
    }

    /// Remove a user key. System keys are left untouched.
    pub fn del(&mut self, key: &str) -> Option<String> {
        if MetaKey::classify(key).is_system() {
            return None;
        }
        self.0.remove(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Entries outside the system namespace
    pub fn user_entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.iter()
            .filter(|(k, _)| !MetaKey::classify(k).is_system())
    }

    /// Key-presence comparison against `other`.
    ///
    /// `Or`: at least one of our keys exists in `other`.
    /// `And`: every one of our keys exists in `other`.
    #[must_use]
    pub fn compare(&self, other: &Self, action: Action) -> bool {
        match action {
            Action::Or => self.0.keys().any(|k| other.has(k)),
            Action::And => self.0.keys().all(|k| other.has(k)),
        }
    }

    /// Value-equality match of `predicates` against this record.
    ///
    /// An empty predicate set matches every record.
    #[must_use]
    pub fn matches(&self, predicates: &Self, action: Action) -> bool {
        if predicates.is_empty() {
            return true;
        }
        let mut hits = predicates.iter().map(|(k, v)| self.get(k) == Some(v));
        match action {
            Action::Or => hits.any(|hit| hit),
            Action::And => hits.all(|hit| hit),
        }
    }

    pub fn marshal(&self) -> Result<Vec<u8>> {
        bincode::serialize(&self.0).map_err(|e| Error::Serialization(e.to_string()))
    }

    pub fn unmarshal(data: &[u8]) -> Result<Self> {
        bincode::deserialize(data)
            .map(Self)
            .map_err(|e| Error::Deserialization(format!("metadata: {e}")))
    }
}

impl FromIterator<(String, String)> for Metadata {
    /// Collects user entries; system keys are dropped
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut meta = Self::new();
        for (k, v) in iter {
            meta.set(k, v);
        }
        meta
    }
}

impl From<Metadata> for BTreeMap<String, String> {
    fn from(meta: Metadata) -> Self {
        meta.0
    }
}
