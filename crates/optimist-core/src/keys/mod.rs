//! Structured cache keys.
//!
//! A key is made of a [`Domain`], a [`KeyKind`] and a [`KeyParams`]
//! payload. Keys are immutable values: a new key is built for each distinct
//! query shape, and two keys are equal iff all three parts are equal.

mod params;
mod prefix;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{Domain, EntityId};

pub use params::{DEFAULT_IGNORED_PARAMS, DEFAULT_PAGINATION_PARAMS, KeyParams, ParamValue};
pub use prefix::{KeyMatcher, KeyPrefix};

/// Parameter under which detail keys store the entity id.
pub const ID_PARAM: &str = "id";

/// Parameter under which stats keys store the aggregate name.
pub const STATS_PARAM: &str = "name";

/// Shape of a cached query result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyKind {
    /// A collection of records (array, or an `{items, total}` envelope).
    List,
    /// A single record.
    Detail,
    /// A number (or `{count}` object) paired with a list of the same params.
    Count,
    /// A cross-cutting aggregate object with named counters.
    Stats,
}

impl KeyKind {
    /// Returns the lowercase name used in key rendering.
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyKind::List => "list",
            KeyKind::Detail => "detail",
            KeyKind::Count => "count",
            KeyKind::Stats => "stats",
        }
    }
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key of a cached query result.
///
/// # Examples
///
/// ```
/// use optimist_core::{keys, Domain, KeyParams};
///
/// let a = keys::list(Domain::clients(), KeyParams::new().with("status", "active"));
/// let b = keys::list(Domain::clients(), KeyParams::new().with("status", "active"));
/// assert_eq!(a, b);
/// assert_eq!(a.to_string(), "clients:list:{status=active}");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    domain: Domain,
    kind: KeyKind,
    params: KeyParams,
}

impl CacheKey {
    /// Creates a key from its three parts.
    pub fn new(domain: impl Into<Domain>, kind: KeyKind, params: KeyParams) -> Self {
        Self {
            domain: domain.into(),
            kind,
            params,
        }
    }

    /// Returns the domain segment.
    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    /// Returns the kind segment.
    pub fn kind(&self) -> KeyKind {
        self.kind
    }

    /// Returns the parameter payload.
    pub fn params(&self) -> &KeyParams {
        &self.params
    }

    /// Returns the count key paired with this list key (same domain and params).
    pub fn paired_count(&self) -> Option<CacheKey> {
        (self.kind == KeyKind::List).then(|| count(self.domain.clone(), self.params.clone()))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.domain, self.kind, self.params)
    }
}

/// Key of a filtered/paginated collection.
pub fn list(domain: impl Into<Domain>, params: KeyParams) -> CacheKey {
    CacheKey::new(domain, KeyKind::List, params)
}

/// Key of a single entity.
pub fn detail(domain: impl Into<Domain>, id: &EntityId) -> CacheKey {
    CacheKey::new(
        domain,
        KeyKind::Detail,
        KeyParams::new().with(ID_PARAM, id.as_str()),
    )
}

/// Key of the count paired with `list(domain, params)`.
pub fn count(domain: impl Into<Domain>, params: KeyParams) -> CacheKey {
    CacheKey::new(domain, KeyKind::Count, params)
}

/// Key of a named aggregate (e.g. dashboard statistics).
pub fn stats(domain: impl Into<Domain>, name: &str) -> CacheKey {
    CacheKey::new(domain, KeyKind::Stats, KeyParams::new().with(STATS_PARAM, name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_key_equality_is_structural() {
        let a = list("clients", KeyParams::new().with("page", 1).with("q", "ann"));
        let b = list("clients", KeyParams::new().with("q", "ann").with("page", 1));

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_kind_distinguishes_keys() {
        let params = KeyParams::new();
        assert_ne!(list("clients", params.clone()), count("clients", params));
    }

    #[test]
    fn test_detail_key_display() {
        let key = detail("clients", &EntityId::new("client-7"));
        assert_eq!(key.kind(), KeyKind::Detail);
        assert_eq!(key.to_string(), "clients:detail:{id=client-7}");
    }

    #[test]
    fn test_paired_count() {
        let params = KeyParams::new().with("status", "active");
        let key = list("clients", params.clone());

        assert_eq!(key.paired_count(), Some(count("clients", params)));
        assert_eq!(stats("dashboard", "summary").paired_count(), None);
    }
}
