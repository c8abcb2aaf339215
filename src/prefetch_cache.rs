use std::collections::HashMap;

use serde_json::Value;

/// Last-fetched content per mbox name.
///
/// The cache only grows through [`PrefetchCache::merge`]: entries missing from an incoming batch
/// are kept. Nothing expires on its own; [`PrefetchCache::clear`] is the only way to drop content.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PrefetchCache {
    mboxes: HashMap<String, Value>,
}

impl PrefetchCache {
    pub fn new() -> PrefetchCache {
        PrefetchCache::default()
    }

    /// Overwrite each incoming entry, keeping entries the batch does not mention.
    pub fn merge(&mut self, incoming: impl IntoIterator<Item = (String, Value)>) {
        self.mboxes.extend(incoming);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.mboxes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.mboxes.contains_key(name)
    }

    pub fn clear(&mut self) {
        self.mboxes.clear();
    }

    pub fn len(&self) -> usize {
        self.mboxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mboxes.is_empty()
    }

    /// Names of cached mboxes, in no particular order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.mboxes.keys().map(String::as_str)
    }
}
