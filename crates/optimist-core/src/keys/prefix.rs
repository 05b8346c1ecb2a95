//! Prefix matching over structured keys.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{CacheKey, KeyKind, KeyParams};
use crate::types::Domain;

/// Anything that can select a region of the cache.
///
/// Implemented for [`KeyPrefix`], for exact [`CacheKey`]s and for closures
/// `Fn(&CacheKey) -> bool`.
pub trait KeyMatcher {
    /// Returns true if `key` belongs to the selected region.
    fn matches(&self, key: &CacheKey) -> bool;
}

impl<F> KeyMatcher for F
where
    F: Fn(&CacheKey) -> bool,
{
    fn matches(&self, key: &CacheKey) -> bool {
        self(key)
    }
}

impl KeyMatcher for CacheKey {
    fn matches(&self, key: &CacheKey) -> bool {
        self == key
    }
}

/// A structural key prefix: a domain, optionally narrowed to a kind and
/// then to an exact parameter payload.
///
/// # Examples
///
/// ```
/// use optimist_core::{keys, Domain, KeyKind, KeyMatcher, KeyParams, KeyPrefix};
///
/// let all_lists = KeyPrefix::kind(Domain::clients(), KeyKind::List);
/// let key = keys::list(Domain::clients(), KeyParams::new().with("page", 3));
///
/// assert!(all_lists.matches(&key));
/// assert!(KeyPrefix::domain(Domain::clients()).matches(&key));
/// assert!(!KeyPrefix::domain(Domain::dashboard()).matches(&key));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyPrefix {
    domain: Domain,
    kind: Option<KeyKind>,
    params: Option<KeyParams>,
}

impl KeyPrefix {
    /// Every key of a domain.
    pub fn domain(domain: impl Into<Domain>) -> Self {
        Self {
            domain: domain.into(),
            kind: None,
            params: None,
        }
    }

    /// Every key of a domain with the given kind.
    pub fn kind(domain: impl Into<Domain>, kind: KeyKind) -> Self {
        Self {
            domain: domain.into(),
            kind: Some(kind),
            params: None,
        }
    }

    /// Exactly one key.
    pub fn exact(key: &CacheKey) -> Self {
        Self {
            domain: key.domain().clone(),
            kind: Some(key.kind()),
            params: Some(key.params().clone()),
        }
    }

    /// Returns true if this prefix selects a region wider or equal to `other`.
    pub fn covers(&self, other: &KeyPrefix) -> bool {
        if self.domain != other.domain {
            return false;
        }
        match (self.kind, other.kind) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(a), Some(b)) if a != b => false,
            (Some(_), Some(_)) => match (&self.params, &other.params) {
                (None, _) => true,
                (Some(_), None) => false,
                (Some(a), Some(b)) => a == b,
            },
        }
    }
}

impl KeyMatcher for KeyPrefix {
    fn matches(&self, key: &CacheKey) -> bool {
        if &self.domain != key.domain() {
            return false;
        }
        if let Some(kind) = self.kind
            && kind != key.kind()
        {
            return false;
        }
        match &self.params {
            Some(params) => params == key.params(),
            None => true,
        }
    }
}

impl fmt::Display for KeyPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.kind, &self.params) {
            (None, _) => write!(f, "{}:*", self.domain),
            (Some(kind), None) => write!(f, "{}:{}:*", self.domain, kind),
            (Some(kind), Some(params)) => write!(f, "{}:{}:{}", self.domain, kind, params),
        }
    }
}
