//! Cache entries and their lifecycle states.

use std::time::{Duration, Instant};

use optimist_core::CacheKey;
use serde::Serialize;
use serde_json::Value;

use crate::error::FetchError;

/// Lifecycle state of a cache entry.
///
/// `Idle → Fetching → Fresh → Stale → Fresh | Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryState {
    /// Referenced but never fetched.
    Idle,
    /// A fetch is outstanding.
    Fetching,
    /// Data is current.
    Fresh,
    /// Data is readable but must be refetched on next read.
    Stale,
    /// The last fetch failed; previous data may still be present.
    Error,
}

/// A cached query result.
///
/// Invariants, enforced by the store:
/// - `Fresh` implies `data` is present and `error` is absent;
/// - `Error` implies `error` is present.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    key: CacheKey,
    data: Option<Value>,
    state: EntryState,
    error: Option<FetchError>,
    updated_at: Instant,
}

impl CacheEntry {
    pub(crate) fn idle(key: CacheKey) -> Self {
        Self {
            key,
            data: None,
            state: EntryState::Idle,
            error: None,
            updated_at: Instant::now(),
        }
    }

    pub(crate) fn fresh(key: CacheKey, data: Value) -> Self {
        Self {
            key,
            data: Some(data),
            state: EntryState::Fresh,
            error: None,
            updated_at: Instant::now(),
        }
    }

    /// Returns the key of this entry.
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Returns the cached data, if any.
    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    /// Returns the lifecycle state.
    pub fn state(&self) -> EntryState {
        self.state
    }

    /// Returns the last fetch error.
    pub fn error(&self) -> Option<&FetchError> {
        self.error.as_ref()
    }

    /// Returns when the entry last changed state or data.
    pub fn updated_at(&self) -> Instant {
        self.updated_at
    }

    /// Returns true if the entry can be served without fetching under the
    /// given staleness policy (`None`: fresh data never expires).
    pub fn is_fresh_within(&self, stale_time: Option<Duration>) -> bool {
        if self.state != EntryState::Fresh {
            return false;
        }
        match stale_time {
            Some(limit) => self.updated_at.elapsed() < limit,
            None => true,
        }
    }

    pub(crate) fn data_mut(&mut self) -> Option<&mut Value> {
        self.data.as_mut()
    }

    pub(crate) fn set_data(&mut self, data: Value) {
        self.data = Some(data);
        self.state = EntryState::Fresh;
        self.error = None;
        self.updated_at = Instant::now();
    }

    pub(crate) fn set_error(&mut self, error: FetchError, discard_data: bool) {
        if discard_data {
            self.data = None;
        }
        self.state = EntryState::Error;
        self.error = Some(error);
        self.updated_at = Instant::now();
    }

    pub(crate) fn set_state(&mut self, state: EntryState) {
        self.state = state;
    }
}
