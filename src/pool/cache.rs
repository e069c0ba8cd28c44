use super::SuggestionPool;

/// Single-slot memo for the active filter set: exactly one `(key, pool)`
/// pair is retained, so building under a new key discards the old pool.
#[derive(Debug, Default)]
pub(super) struct PoolCache {
    entry: Option<(String, SuggestionPool)>,
}

impl PoolCache {
    pub(super) fn key(&self) -> Option<&str> {
        self.entry.as_ref().map(|(key, _)| key.as_str())
    }

    pub(super) fn get(&self, key: &str) -> Option<&SuggestionPool> {
        self.entry
            .as_ref()
            .filter(|(cached, _)| cached == key)
            .map(|(_, pool)| pool)
    }

    pub(super) fn set(&mut self, key: String, pool: SuggestionPool) {
        self.entry = Some((key, pool));
    }

    pub(super) fn invalidate(&mut self) {
        self.entry = None;
    }
}
