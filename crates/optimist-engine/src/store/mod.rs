//! In-memory cache store.
//!
//! The store is the only shared mutable resource of the engine. Every write
//! goes through `set`, `set_error`, `patch_many`, `restore`, `invalidate`
//! or `remove`, which keeps the entry invariants in one place. Operations
//! are synchronous; the lock is never held across an await point.

mod entry;
mod token;

use std::collections::BTreeMap;
use std::sync::Arc;

use indexmap::IndexMap;
use optimist_core::{CacheKey, KeyMatcher};
use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use crate::error::FetchError;

pub use entry::{CacheEntry, EntryState};
pub use token::RestoreToken;

struct Slot {
    entry: CacheEntry,
    /// Bumped on every write; lets a fetch detect that it was superseded.
    revision: u64,
}

#[derive(Default)]
struct StoreInner {
    slots: IndexMap<CacheKey, Slot>,
    next_revision: u64,
}

impl StoreInner {
    fn bump(&mut self) -> u64 {
        self.next_revision += 1;
        self.next_revision
    }

    fn put(&mut self, key: CacheKey, entry: CacheEntry) -> u64 {
        let revision = self.bump();
        self.slots.insert(key, Slot { entry, revision });
        revision
    }
}

/// Cache de resultados de queries, compartido por executor y coordinator.
///
/// Cloning is cheap and yields a handle to the same store. The store is
/// built once per session and torn down with [`clear`](Self::clear).
///
/// # Examples
///
/// ```
/// use optimist_core::{keys, Domain, KeyParams, KeyPrefix, KeyKind};
/// use optimist_engine::store::{CacheStore, EntryState};
/// use serde_json::json;
///
/// let store = CacheStore::new();
/// let key = keys::list(Domain::clients(), KeyParams::new());
/// store.set(key.clone(), json!([{"id": "1", "name": "A"}]));
///
/// let token = store.patch_many(&KeyPrefix::kind(Domain::clients(), KeyKind::List), |_, data| {
///     data[0]["name"] = json!("B");
///     true
/// });
/// assert_eq!(store.get(&key).unwrap().data().unwrap()[0]["name"], json!("B"));
///
/// store.restore(token);
/// assert_eq!(store.get(&key).unwrap().data().unwrap()[0]["name"], json!("A"));
/// assert_eq!(store.get(&key).unwrap().state(), EntryState::Fresh);
/// ```
#[derive(Clone, Default)]
pub struct CacheStore {
    inner: Arc<RwLock<StoreInner>>,
}

impl CacheStore {
    /// Crea un store vacio.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the entry for `key`. No side effects.
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.inner.read().slots.get(key).map(|slot| slot.entry.clone())
    }

    /// Returns a copy of the data for `key`.
    pub fn data(&self, key: &CacheKey) -> Option<Value> {
        self.inner
            .read()
            .slots
            .get(key)
            .and_then(|slot| slot.entry.data().cloned())
    }

    /// Stores fetched or canonical data: `state=fresh`, `updated_at=now`,
    /// error cleared.
    pub fn set(&self, key: CacheKey, data: Value) {
        let mut inner = self.inner.write();
        debug!(key = %key, "Cache entry set");
        let revision = inner.bump();
        match inner.slots.get_mut(&key) {
            Some(slot) => {
                slot.entry.set_data(data);
                slot.revision = revision;
            },
            None => {
                let entry = CacheEntry::fresh(key.clone(), data);
                inner.slots.insert(key, Slot { entry, revision });
            },
        }
    }

    /// Marks an entry as failed, keeping its previous data.
    pub fn set_error(&self, key: CacheKey, error: FetchError) {
        self.write_error(key, error, false);
    }

    /// Marks an entry as failed and discards its previous data.
    pub fn set_error_discarding(&self, key: CacheKey, error: FetchError) {
        self.write_error(key, error, true);
    }

    /// Applies `transform` to the data of every stored entry matched by
    /// `matcher`.
    ///
    /// The transform edits a copy of the data and returns whether it changed
    /// anything; only changed entries are written back and captured in the
    /// returned token. Entries without data are never touched. The state of
    /// a patched entry is left as it was.
    pub fn patch_many<M, F>(&self, matcher: &M, mut transform: F) -> RestoreToken
    where
        M: KeyMatcher + ?Sized,
        F: FnMut(&CacheKey, &mut Value) -> bool,
    {
        let mut inner = self.inner.write();
        let mut captured = Vec::new();
        let mut touched = Vec::new();

        for (key, slot) in inner.slots.iter_mut() {
            if !matcher.matches(key) {
                continue;
            }
            let Some(data) = slot.entry.data() else {
                continue;
            };
            let mut patched = data.clone();
            if !transform(key, &mut patched) {
                continue;
            }
            captured.push((key.clone(), slot.entry.clone()));
            if let Some(data) = slot.entry.data_mut() {
                *data = patched;
            }
            touched.push(key.clone());
        }

        for key in &touched {
            let revision = inner.bump();
            if let Some(slot) = inner.slots.get_mut(key) {
                slot.revision = revision;
            }
        }

        debug!(count = captured.len(), "Cache entries patched");
        RestoreToken::new(captured)
    }

    /// Puts back every entry captured by `token`, in reverse order.
    pub fn restore(&self, token: RestoreToken) {
        let mut inner = self.inner.write();
        let entries = token.into_entries();
        let count = entries.len();

        for (key, entry) in entries.into_iter().rev() {
            inner.put(key, entry);
        }

        debug!(count = count, "Cache entries restored");
    }

    /// Marks every matched entry `stale`, or removes it if it has no data
    /// yet. Does not fetch. Invalidating an already stale entry is a no-op.
    ///
    /// Returns the number of entries that changed.
    pub fn invalidate<M>(&self, matcher: &M) -> usize
    where
        M: KeyMatcher + ?Sized,
    {
        let mut inner = self.inner.write();
        let mut to_stale = Vec::new();
        let mut to_remove = Vec::new();

        for (key, slot) in inner.slots.iter() {
            if !matcher.matches(key) {
                continue;
            }
            if slot.entry.data().is_none() {
                to_remove.push(key.clone());
            } else if slot.entry.state() != EntryState::Stale {
                to_stale.push(key.clone());
            }
        }

        for key in &to_stale {
            let revision = inner.bump();
            if let Some(slot) = inner.slots.get_mut(key) {
                slot.entry.set_state(EntryState::Stale);
                slot.revision = revision;
            }
        }
        for key in &to_remove {
            inner.slots.shift_remove(key);
        }

        let changed = to_stale.len() + to_remove.len();
        if changed > 0 {
            debug!(
                stale = to_stale.len(),
                removed = to_remove.len(),
                "Cache entries invalidated"
            );
        }
        changed
    }

    /// Deletes an entry entirely.
    pub fn remove(&self, key: &CacheKey) -> Option<CacheEntry> {
        let removed = self.inner.write().slots.shift_remove(key);
        if removed.is_some() {
            debug!(key = %key, "Cache entry removed");
        }
        removed.map(|slot| slot.entry)
    }

    /// Returns the keys currently matched by `matcher`.
    pub fn keys_matching<M>(&self, matcher: &M) -> Vec<CacheKey>
    where
        M: KeyMatcher + ?Sized,
    {
        self.inner
            .read()
            .slots
            .keys()
            .filter(|key| matcher.matches(key))
            .cloned()
            .collect()
    }

    /// Returns a snapshot of every entry, ordered by key.
    pub fn entries(&self) -> BTreeMap<CacheKey, CacheEntry> {
        self.inner
            .read()
            .slots
            .iter()
            .map(|(key, slot)| (key.clone(), slot.entry.clone()))
            .collect()
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.inner.read().slots.len()
    }

    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.read().slots.is_empty()
    }

    /// Drops every entry (session teardown).
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        let count = inner.slots.len();
        inner.slots.clear();
        debug!(count = count, "Cache cleared");
    }

    /// Moves the entry to `fetching`, creating it (`idle`) on first
    /// reference. Returns the revision the fetch must still observe when
    /// it completes.
    pub(crate) fn begin_fetch(&self, key: &CacheKey) -> u64 {
        let mut inner = self.inner.write();
        let revision = inner.bump();
        let slot = inner.slots.entry(key.clone()).or_insert_with(|| Slot {
            entry: CacheEntry::idle(key.clone()),
            revision,
        });
        slot.entry.set_state(EntryState::Fetching);
        slot.revision = revision;
        revision
    }

    /// Writes a fetch result if nothing else wrote the entry since
    /// `begin_fetch`. Returns false if the result was discarded.
    pub(crate) fn complete_fetch(
        &self,
        key: &CacheKey,
        revision: u64,
        result: &Result<Value, FetchError>,
        discard_on_error: bool,
    ) -> bool {
        let mut inner = self.inner.write();
        let current = inner.slots.get(key).map(|slot| slot.revision);
        if current != Some(revision) {
            return false;
        }
        let next = inner.bump();
        let Some(slot) = inner.slots.get_mut(key) else {
            return false;
        };
        match result {
            Ok(data) => slot.entry.set_data(data.clone()),
            Err(error) => slot.entry.set_error(error.clone(), discard_on_error),
        }
        slot.revision = next;
        true
    }

    /// Settles an entry left in `fetching` by a superseded fetch: back to
    /// `stale` if it has data, removed otherwise.
    pub(crate) fn release_fetch(&self, key: &CacheKey) {
        let mut inner = self.inner.write();
        let has_data = match inner.slots.get(key) {
            Some(slot) if slot.entry.state() == EntryState::Fetching => {
                slot.entry.data().is_some()
            },
            _ => return,
        };
        if has_data {
            let revision = inner.bump();
            if let Some(slot) = inner.slots.get_mut(key) {
                slot.entry.set_state(EntryState::Stale);
                slot.revision = revision;
            }
        } else {
            inner.slots.shift_remove(key);
        }
    }

    fn write_error(&self, key: CacheKey, error: FetchError, discard_data: bool) {
        let mut inner = self.inner.write();
        debug!(key = %key, error = %error, "Cache entry marked as error");
        let revision = inner.bump();
        let slot = inner.slots.entry(key.clone()).or_insert_with(|| Slot {
            entry: CacheEntry::idle(key),
            revision,
        });
        slot.entry.set_error(error, discard_data);
        slot.revision = revision;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use optimist_core::{Domain, EntityId, KeyKind, KeyParams, KeyPrefix, keys};
    use serde_json::json;

    fn clients_list() -> CacheKey {
        keys::list(Domain::clients(), KeyParams::new())
    }

    #[test]
    fn test_set_and_get() {
        let store = CacheStore::new();
        store.set(clients_list(), json!([{"id": "1"}]));

        let entry = store.get(&clients_list()).unwrap();
        assert_eq!(entry.state(), EntryState::Fresh);
        assert_eq!(entry.data(), Some(&json!([{"id": "1"}])));
    }

    #[test]
    fn test_miss_returns_none() {
        let store = CacheStore::new();
        assert!(store.get(&clients_list()).is_none());
    }

    #[test]
    fn test_set_error_retains_data() {
        let store = CacheStore::new();
        store.set(clients_list(), json!([1]));
        store.set_error(clients_list(), FetchError::failed("boom"));

        let entry = store.get(&clients_list()).unwrap();
        assert_eq!(entry.state(), EntryState::Error);
        assert_eq!(entry.data(), Some(&json!([1])));
        assert_eq!(entry.error(), Some(&FetchError::failed("boom")));

        store.set_error_discarding(clients_list(), FetchError::failed("boom"));
        assert!(store.data(&clients_list()).is_none());
    }

    #[test]
    fn test_patch_many_only_touches_changed_entries() {
        let store = CacheStore::new();
        store.set(clients_list(), json!([{"id": "1"}]));
        store.set(
            keys::list(Domain::clients(), KeyParams::new().with("page", 2)),
            json!([{"id": "9"}]),
        );

        let token = store.patch_many(&KeyPrefix::kind(Domain::clients(), KeyKind::List), |_, data| {
            let Some(items) = data.as_array_mut() else {
                return false;
            };
            let before = items.len();
            items.retain(|item| item["id"] != json!("1"));
            items.len() != before
        });

        assert_eq!(token.len(), 1);
        assert_eq!(store.data(&clients_list()), Some(json!([])));
    }

    #[test]
    fn test_patch_many_skips_entries_without_data() {
        let store = CacheStore::new();
        store.begin_fetch(&clients_list());

        let token = store.patch_many(&clients_list(), |_, _| true);
        assert!(token.is_empty());
    }

    #[test]
    fn test_restore_is_exact() {
        let store = CacheStore::new();
        store.set(clients_list(), json!([{"id": "1", "name": "A"}]));
        store.invalidate(&clients_list());
        let before = store.entries();

        let token = store.patch_many(&clients_list(), |_, data| {
            data[0]["name"] = json!("B");
            true
        });
        assert_ne!(store.entries(), before);

        store.restore(token);
        assert_eq!(store.entries(), before);
    }

    #[test]
    fn test_invalidate_marks_stale_and_removes_empty() {
        let store = CacheStore::new();
        let detail = keys::detail(Domain::clients(), &EntityId::new("1"));
        store.set(clients_list(), json!([]));
        store.begin_fetch(&detail);

        let changed = store.invalidate(&KeyPrefix::domain(Domain::clients()));

        assert_eq!(changed, 2);
        assert_eq!(store.get(&clients_list()).unwrap().state(), EntryState::Stale);
        assert!(store.get(&detail).is_none());
    }

    #[test]
    fn test_invalidate_is_idempotent() {
        let store = CacheStore::new();
        store.set(clients_list(), json!([]));

        assert_eq!(store.invalidate(&clients_list()), 1);
        let once = store.entries();
        assert_eq!(store.invalidate(&clients_list()), 0);
        assert_eq!(store.entries(), once);
    }

    #[test]
    fn test_superseded_fetch_is_discarded() {
        let store = CacheStore::new();
        let revision = store.begin_fetch(&clients_list());

        // Un write posterior invalida el resultado del fetch
        store.set(clients_list(), json!(["newer"]));

        let written = store.complete_fetch(&clients_list(), revision, &Ok(json!(["older"])), false);
        assert!(!written);
        assert_eq!(store.data(&clients_list()), Some(json!(["newer"])));
    }

    #[test]
    fn test_release_fetch() {
        let store = CacheStore::new();
        store.set(clients_list(), json!([]));
        store.begin_fetch(&clients_list());
        store.release_fetch(&clients_list());
        assert_eq!(store.get(&clients_list()).unwrap().state(), EntryState::Stale);

        let detail = keys::detail(Domain::clients(), &EntityId::new("1"));
        store.begin_fetch(&detail);
        store.release_fetch(&detail);
        assert!(store.get(&detail).is_none());
    }

    #[test]
    fn test_remove_and_clear() {
        let store = CacheStore::new();
        store.set(clients_list(), json!([]));
        assert!(store.remove(&clients_list()).is_some());
        assert!(store.is_empty());

        store.set(clients_list(), json!([]));
        store.clear();
        assert_eq!(store.len(), 0);
    }
}
