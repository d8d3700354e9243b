#![forbid(unsafe_code)]

//! Alias lookup owned by a component.
//!
//! Each component carries a scope mapping local aliases to the children it
//! has indexed. Scopes only store keys; liveness is checked by the arena on
//! lookup, so a stale entry can never surface a destroyed component.

use std::collections::BTreeMap;

use crate::component::ComponentKey;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupScope {
    entries: BTreeMap<String, ComponentKey>,
}

impl LookupScope {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Index `key` under `alias`, returning the key it replaced.
    pub fn register(&mut self, alias: impl Into<String>, key: ComponentKey) -> Option<ComponentKey> {
        self.entries.insert(alias.into(), key)
    }

    #[must_use]
    pub fn find(&self, alias: &str) -> Option<ComponentKey> {
        self.entries.get(alias).copied()
    }

    pub fn unregister(&mut self, alias: &str) -> Option<ComponentKey> {
        self.entries.remove(alias)
    }

    /// Drop every alias pointing at `key`.
    pub fn forget(&mut self, key: ComponentKey) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, k| *k != key);
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn aliases(&self) -> impl Iterator<Item = (&str, ComponentKey)> {
        self.entries.iter().map(|(a, k)| (a.as_str(), *k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    #[test]
    fn register_find_unregister() {
        let mut keys: SlotMap<ComponentKey, ()> = SlotMap::with_key();
        let a = keys.insert(());
        let b = keys.insert(());

        let mut scope = LookupScope::new();
        assert_eq!(scope.register("receiver", a), None);
        assert_eq!(scope.register("receiver", b), Some(a));
        assert_eq!(scope.find("receiver"), Some(b));
        assert_eq!(scope.unregister("receiver"), Some(b));
        assert!(scope.find("receiver").is_none());
        assert!(scope.is_empty());
    }

    #[test]
    fn forget_drops_every_alias_of_key() {
        let mut keys: SlotMap<ComponentKey, ()> = SlotMap::with_key();
        let a = keys.insert(());
        let b = keys.insert(());

        let mut scope = LookupScope::new();
        scope.register("one", a);
        scope.register("two", a);
        scope.register("three", b);
        assert_eq!(scope.forget(a), 2);
        assert_eq!(scope.aliases().collect::<Vec<_>>(), vec![("three", b)]);
    }
}
