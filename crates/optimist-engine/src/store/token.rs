//! Restore tokens returned by `patch_many`.

use optimist_core::CacheKey;

use super::entry::CacheEntry;

/// Pre-patch copies of every entry a `patch_many` call touched.
///
/// Owned by the mutation that requested the patch; handing it back to
/// [`CacheStore::restore`](super::CacheStore::restore) puts every entry
/// back exactly as it was, in reverse order of capture.
#[derive(Debug, Clone, PartialEq, Default)]
#[must_use = "a RestoreToken is the only way to undo the patch"]
pub struct RestoreToken {
    entries: Vec<(CacheKey, CacheEntry)>,
}

impl RestoreToken {
    pub(crate) fn new(entries: Vec<(CacheKey, CacheEntry)>) -> Self {
        Self { entries }
    }

    /// Returns true if the patch touched nothing.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the number of entries captured.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns the keys captured, in application order.
    pub fn keys(&self) -> impl Iterator<Item = &CacheKey> {
        self.entries.iter().map(|(key, _)| key)
    }

    pub(crate) fn into_entries(self) -> Vec<(CacheKey, CacheEntry)> {
        self.entries
    }
}
