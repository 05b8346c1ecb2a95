//! Common newtypes for the optimist engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Prefix carried by every locally fabricated identifier.
pub const TEMPORARY_ID_PREFIX: &str = "tmp-";

/// Data domain a cache key belongs to.
///
/// A domain is usually an entity collection ("clients", "professionals")
/// or a cross-cutting aggregate ("dashboard"). Entity types used by the
/// invalidation graph are domains too.
///
/// # Example
///
/// ```
/// use optimist_core::Domain;
///
/// let domain = Domain::new("clients");
/// assert_eq!(domain.as_str(), "clients");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Domain(String);

impl Domain {
    /// Creates a new Domain.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the domain name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The client collection.
    pub fn clients() -> Self {
        Self::new("clients")
    }

    /// The professional collection.
    pub fn professionals() -> Self {
        Self::new("professionals")
    }

    /// The appointment collection.
    pub fn appointments() -> Self {
        Self::new("appointments")
    }

    /// Dashboard aggregates.
    pub fn dashboard() -> Self {
        Self::new("dashboard")
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Domain {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Domain {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifier of a single entity.
///
/// Server-issued identifiers are opaque strings. Identifiers fabricated
/// locally for optimistic creates start with [`TEMPORARY_ID_PREFIX`].
///
/// # Example
///
/// ```
/// use optimist_core::EntityId;
///
/// let id = EntityId::temporary();
/// assert!(id.is_temporary());
/// assert!(!EntityId::new("client-7").is_temporary());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Creates a new EntityId.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fabricates a unique temporary identifier.
    pub fn temporary() -> Self {
        Self(format!("{}{}", TEMPORARY_ID_PREFIX, Uuid::now_v7()))
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the identifier was fabricated locally.
    pub fn is_temporary(&self) -> bool {
        self.0.starts_with(TEMPORARY_ID_PREFIX)
    }

    /// Returns true if the identifier is empty or only whitespace.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}
