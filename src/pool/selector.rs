use std::collections::HashSet;

use super::SuggestionPool;
use crate::models::ContentItem;

/// First pool item whose id was not served yet, in the pool's stored
/// (shuffled) order. When everything was served, the pool's first item is
/// returned again; the caller recognizes the repeated id as the cycle
/// signal and resets its tracking.
pub(super) fn select<'a>(
    pool: &'a SuggestionPool,
    exclude_ids: &HashSet<i32>,
) -> Option<&'a ContentItem> {
    pool.items
        .iter()
        .find(|item| !exclude_ids.contains(&item.id))
        .or_else(|| pool.items.first())
}

/// Ids already served from the current pool. An immutable value the
/// display layer threads through its calls and replaces with the result of
/// `record`; it must be cleared whenever the active filter set changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServedState {
    ids: HashSet<i32>,
}

impl ServedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ids(&self) -> &HashSet<i32> {
        &self.ids
    }

    /// Fold in a served id. A repeated id means the pool cycled, so
    /// tracking restarts with just that id.
    pub fn record(self, id: i32) -> Self {
        let mut ids = self.ids;
        if ids.contains(&id) {
            ids.clear();
        }
        ids.insert(id);
        Self { ids }
    }
}
