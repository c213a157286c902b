use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Two-level lookup table: a shared, immutable class-default layer and a
/// per-instance layer that is consulted first. Writes only touch the instance layer.
#[derive(Debug, Clone)]
pub struct LayeredTable<T> {
    base: Arc<BTreeMap<String, T>>,
    local: BTreeMap<String, T>,
}

impl<T> Default for LayeredTable<T> {
    fn default() -> Self {
        Self {
            base: Arc::new(BTreeMap::new()),
            local: BTreeMap::new(),
        }
    }
}

impl<T> LayeredTable<T> {
    pub fn new(base: Arc<BTreeMap<String, T>>) -> Self {
        Self {
            base,
            local: BTreeMap::new(),
        }
    }

    pub fn get(&self, tag: &str) -> Option<&T> {
        self.local.get(tag).or_else(|| self.base.get(tag))
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.local.contains_key(tag) || self.base.contains_key(tag)
    }

    /// Inserts into the instance layer. Returns `false` when the tag is already
    /// present (in either layer) and `overwrite` is not set.
    pub fn insert(&mut self, tag: impl Into<String>, value: T, overwrite: bool) -> bool {
        let tag = tag.into();
        if self.contains(&tag) && !overwrite {
            return false;
        }
        self.local.insert(tag, value);
        true
    }

    pub fn tags(&self) -> BTreeSet<&str> {
        self.base
            .keys()
            .chain(self.local.keys())
            .map(String::as_str)
            .collect()
    }

    pub fn is_local(&self, tag: &str) -> bool {
        self.local.contains_key(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Arc<BTreeMap<String, u32>> {
        Arc::new(BTreeMap::from([("BIDS".to_string(), 1)]))
    }

    #[test]
    fn instance_writes_do_not_leak() {
        let shared = base();
        let mut first = LayeredTable::new(shared.clone());
        let second = LayeredTable::new(shared.clone());

        assert!(first.insert("UPENN", 7, false));
        assert!(first.insert("BIDS", 2, true));

        assert_eq!(first.get("BIDS"), Some(&2));
        assert_eq!(second.get("BIDS"), Some(&1));
        assert!(second.get("UPENN").is_none());
        assert_eq!(shared.get("BIDS"), Some(&1));
    }

    #[test]
    fn insert_without_overwrite_keeps_existing() {
        let mut table = LayeredTable::new(base());
        assert!(!table.insert("BIDS", 9, false));
        assert_eq!(table.get("BIDS"), Some(&1));
        assert!(!table.is_local("BIDS"));
        assert_eq!(table.tags().into_iter().collect::<Vec<_>>(), vec!["BIDS"]);
    }
}
