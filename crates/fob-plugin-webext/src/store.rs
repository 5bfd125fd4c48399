//! In-memory store for synthesized modules.
//!
//! Holds sources that have no file on disk (the V2 background page built from
//! `background.scripts`). One store belongs to one manifest parser; clones
//! share the same map so the plugin hooks and the dev builder see the same
//! entries.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct ModuleStore {
    inner: Arc<RwLock<FxHashMap<String, String>>>,
}

impl ModuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, id: impl Into<String>, source: impl Into<String>) {
        self.inner.write().insert(id.into(), source.into());
    }

    pub fn get(&self, id: &str) -> Option<String> {
        self.inner.read().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.read().contains_key(id)
    }

    pub fn clear(&self) {
        self.inner.write().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_entries() {
        let store = ModuleStore::new();
        let shared = store.clone();
        store.set("/project/background.html", "<html></html>");

        assert!(shared.contains("/project/background.html"));
        assert_eq!(shared.get("/project/background.html").as_deref(), Some("<html></html>"));
        assert!(shared.get("/project/other.html").is_none());

        shared.clear();
        assert!(store.is_empty());
    }
}
