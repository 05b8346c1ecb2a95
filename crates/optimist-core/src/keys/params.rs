//! Query parameter payloads carried by cache keys.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Parameter names treated as pagination rather than filters by default.
pub const DEFAULT_PAGINATION_PARAMS: &[&str] = &["page", "pageSize", "limit", "offset", "cursor"];

/// Parameter names that shape a list (ordering, search) but are not record
/// fields, so they never act as filters.
pub const DEFAULT_IGNORED_PARAMS: &[&str] = &["sort", "sortBy", "sortOrder", "orderBy", "order", "search", "q"];

/// A scalar parameter value.
///
/// Floats are deliberately absent so that keys stay `Eq + Hash`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
}

impl ParamValue {
    /// Returns true if a record field holds the same value.
    ///
    /// A missing field only matches `Null`. Text parameters also match
    /// numeric fields with the same textual form (`"5"` matches `5`).
    pub fn matches_json(&self, field: Option<&Value>) -> bool {
        match (self, field) {
            (ParamValue::Null, None | Some(Value::Null)) => true,
            (ParamValue::Bool(b), Some(Value::Bool(v))) => b == v,
            (ParamValue::Int(i), Some(Value::Number(n))) => n.as_i64() == Some(*i),
            (ParamValue::Text(s), Some(Value::String(v))) => s == v,
            (ParamValue::Text(s), Some(Value::Number(n))) => s == &n.to_string(),
            _ => false,
        }
    }

    /// Returns the value as i64 if it is an integer or a numeric string.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(i) => Some(*i),
            ParamValue::Text(s) => s.parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Null => write!(f, "null"),
            ParamValue::Bool(b) => write!(f, "{}", b),
            ParamValue::Int(i) => write!(f, "{}", i),
            ParamValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Text(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::Text(s)
    }
}

impl From<i64> for ParamValue {
    fn from(i: i64) -> Self {
        ParamValue::Int(i)
    }
}

impl From<i32> for ParamValue {
    fn from(i: i32) -> Self {
        ParamValue::Int(i64::from(i))
    }
}

impl From<u32> for ParamValue {
    fn from(i: u32) -> Self {
        ParamValue::Int(i64::from(i))
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        ParamValue::Bool(b)
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(ParamValue::Null, Into::into)
    }
}

/// Canonical parameter payload of a cache key (filters, pagination, id).
///
/// Parameters are kept in a sorted map, so two payloads built in different
/// insertion orders compare and hash equal.
///
/// # Example
///
/// ```
/// use optimist_core::KeyParams;
///
/// let a = KeyParams::new().with("status", "active").with("page", 1);
/// let b = KeyParams::new().with("page", 1).with("status", "active");
/// assert_eq!(a, b);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyParams(BTreeMap<String, ParamValue>);

impl KeyParams {
    /// Creates an empty payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    /// Inserts a parameter.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        self.0.insert(name.into(), value.into());
    }

    /// Returns the value of a parameter.
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    /// Returns true if there are no parameters.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of parameters.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterates over parameters in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns true if every filter parameter equals the record's field of
    /// the same name. Parameters listed in `non_filters` (pagination,
    /// ordering, search) are skipped.
    pub fn filters_match<S: AsRef<str>>(&self, record: &Value, non_filters: &[S]) -> bool {
        self.0
            .iter()
            .filter(|(name, _)| !is_listed(name, non_filters))
            .all(|(name, value)| value.matches_json(record.get(name)))
    }

    /// Returns true if the parameters point at the first page: `page` absent
    /// or 1, `offset` absent or 0 and no `cursor`. Other pagination
    /// parameters (page size, limit) never exclude a record.
    pub fn is_first_page<S: AsRef<str>>(&self, pagination: &[S]) -> bool {
        self.0
            .iter()
            .filter(|(name, _)| is_listed(name, pagination))
            .all(|(name, value)| match name.as_str() {
                "page" => matches!(value.as_i64(), Some(1)) || *value == ParamValue::Null,
                "offset" => matches!(value.as_i64(), Some(0)) || *value == ParamValue::Null,
                "cursor" => *value == ParamValue::Null,
                _ => true,
            })
    }

    /// Decides whether a freshly created record belongs in a list with these
    /// parameters: filters match and the list is the first page.
    pub fn admits<S: AsRef<str>>(&self, record: &Value, non_filters: &[S]) -> bool {
        self.filters_match(record, non_filters) && self.is_first_page(non_filters)
    }
}

fn is_listed<S: AsRef<str>>(name: &str, names: &[S]) -> bool {
    names.iter().any(|p| p.as_ref() == name)
}

impl fmt::Display for KeyParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}={}", name, value)?;
        }
        write!(f, "}}")
    }
}

impl<K: Into<String>, V: Into<ParamValue>> FromIterator<(K, V)> for KeyParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
