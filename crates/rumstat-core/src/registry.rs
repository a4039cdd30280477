//! # Registry Module
//!
//! Named extractor storage shared by the facet and series registries.
//!
//! A registry belongs to one engine instance. Registering a name twice
//! replaces the earlier extractor: the last registration wins.

use std::collections::BTreeMap;
use std::fmt;

/// Name → extractor mapping, iterated in name order.
pub struct Registry<E: ?Sized> {
    entries: BTreeMap<String, Box<E>>,
}

impl<E: ?Sized> Default for Registry<E> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<E: ?Sized> Registry<E> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an extractor under a name.
    ///
    /// Returns the extractor previously registered under that name, if any.
    pub fn register(&mut self, name: impl Into<String>, extractor: Box<E>) -> Option<Box<E>> {
        self.entries.insert(name.into(), extractor)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&E> {
        self.entries.get(name).map(Box::as_ref)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &E)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_ref()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<E: ?Sized> fmt::Debug for Registry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Named {
        fn label(&self) -> &'static str;
    }

    struct A;
    struct B;

    impl Named for A {
        fn label(&self) -> &'static str {
            "a"
        }
    }

    impl Named for B {
        fn label(&self) -> &'static str {
            "b"
        }
    }

    #[test]
    fn last_registration_wins() {
        let mut registry: Registry<dyn Named> = Registry::new();
        assert!(registry.register("x", Box::new(A)).is_none());
        let previous = registry.register("x", Box::new(B));

        assert_eq!(previous.map(|p| p.label()), Some("a"));
        assert_eq!(registry.get("x").map(|e| e.label()), Some("b"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn names_are_ordered() {
        let mut registry: Registry<dyn Named> = Registry::new();
        registry.register("zeta", Box::new(A));
        registry.register("alpha", Box::new(B));

        let names: Vec<_> = registry.names().collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
        assert!(registry.get("missing").is_none());
    }
}
