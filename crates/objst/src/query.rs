//! Query description: point lookup or metadata predicate scan.

use crate::metadata::{MetaKey, Metadata, SystemKey};
use objst_common::{Error, ObjectId, Result, validate_owner};
use serde::{Deserialize, Serialize};

/// How metadata predicates combine
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Every predicate must hold
    And,
    /// At least one predicate must hold
    #[default]
    Or,
}

/// What to do with the matched objects
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    #[default]
    Get,
    Delete,
}

/// Resolved access path of a validated query
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Plan {
    ById(ObjectId),
    ByName { name: String, owner: String },
    Scan,
}

/// Query built with chained setters.
///
/// ```
/// use objst::{Action, Operation, Query};
///
/// let q = Query::new()
///     .owner("u2")
///     .param("invalid", "true")
///     .param("foo", "bar")
///     .action(Action::And)
///     .operation(Operation::Delete);
/// assert!(q.validate().is_ok());
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Query {
    owner: Option<String>,
    id: Option<String>,
    name: Option<String>,
    params: Metadata,
    action: Action,
    operation: Operation,
}

impl Query {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scope the query to an owner
    #[must_use]
    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// Point lookup by id
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Point lookup by name; needs an owner
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Add a metadata predicate.
    ///
    /// The keys `id`, `name` and `owner` select the matching point lookup
    /// field instead of becoming a predicate.
    #[must_use]
    pub fn param(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        match MetaKey::classify(&key) {
            MetaKey::System(SystemKey::Id) => self.id(value),
            MetaKey::System(SystemKey::Name) => self.name(value),
            MetaKey::System(SystemKey::Owner) => self.owner(value),
            MetaKey::System(SystemKey::CreatedAt) => {
                let mut q = self;
                q.params.set_system(SystemKey::CreatedAt, value);
                q
            }
            MetaKey::User(_) => {
                let mut q = self;
                q.params.set(key, value);
                q
            }
        }
    }

    #[must_use]
    pub const fn action(mut self, action: Action) -> Self {
        self.action = action;
        self
    }

    #[must_use]
    pub const fn operation(mut self, operation: Operation) -> Self {
        self.operation = operation;
        self
    }

    #[must_use]
    pub fn owner_filter(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    #[must_use]
    pub fn id_filter(&self) -> Option<&str> {
        self.id.as_deref()
    }

    #[must_use]
    pub fn name_filter(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[must_use]
    pub const fn params(&self) -> &Metadata {
        &self.params
    }

    #[must_use]
    pub const fn get_action(&self) -> Action {
        self.action
    }

    #[must_use]
    pub const fn get_operation(&self) -> Operation {
        self.operation
    }

    /// Check the query is executable
    pub fn validate(&self) -> Result<()> {
        self.plan().map(|_| ())
    }

    pub(crate) fn plan(&self) -> Result<Plan> {
        if self.owner.is_none() && self.id.is_none() && self.name.is_none() && self.params.is_empty()
        {
            return Err(Error::EmptyQuery);
        }
        if let Some(owner) = &self.owner {
            validate_owner(owner)
                .map_err(|e| Error::invalid_argument(format!("invalid owner `{owner}`: {e}")))?;
        }
        let id = self.id.as_deref().map(str::parse::<ObjectId>).transpose()?;
        if self.name.is_some() && self.owner.is_none() {
            return Err(Error::NameWithoutOwner);
        }

        Ok(match (id, &self.name, &self.owner) {
            (Some(id), _, _) => Plan::ById(id),
            (None, Some(name), Some(owner)) => Plan::ByName {
                name: name.clone(),
                owner: owner.clone(),
            },
            _ => Plan::Scan,
        })
    }

    /// Whether a stored metadata record satisfies the scan predicates.
    ///
    /// The owner, when set, is an extra mandatory equality predicate.
    #[must_use]
    pub fn matches(&self, record: &Metadata) -> bool {
        if let Some(owner) = &self.owner
            && record.get_system(SystemKey::Owner) != Some(owner.as_str())
        {
            return false;
        }
        record.matches(&self.params, self.action)
    }
}
