#![forbid(unsafe_code)]

//! Parent-chained key/value scopes.
//!
//! [`ScopeChain`] is an explicit replacement for prototype-style context
//! inheritance: a layer holds its own entries plus a parent pointer, lookup
//! walks toward the root and stops at the nearest layer defining the key,
//! and writes always land in the local layer. Ancestors are read-shared and
//! never mutated through a child.
//!
//! # Invariants
//!
//! 1. Lookup returns the nearest binding; a local write shadows without
//!    touching the ancestor's entry.
//! 2. `child()` is O(1); derived layers share ancestor storage.
//! 3. `collect()` visits every layer's *local* binding nearest-first, which
//!    is what ancestor scans (cycle detection) iterate.

use std::cell::RefCell;
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

use ahash::AHashMap;

struct Layer<K, V> {
    entries: RefCell<AHashMap<K, V>>,
    parent: Option<Rc<Layer<K, V>>>,
}

/// A shared handle to one layer of a scope chain.
pub struct ScopeChain<K, V> {
    layer: Rc<Layer<K, V>>,
}

impl<K, V> Clone for ScopeChain<K, V> {
    fn clone(&self) -> Self {
        Self {
            layer: Rc::clone(&self.layer),
        }
    }
}

impl<K, V> Default for ScopeChain<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> ScopeChain<K, V> {
    /// A fresh root layer with no parent.
    #[must_use]
    pub fn new() -> Self {
        Self {
            layer: Rc::new(Layer {
                entries: RefCell::new(AHashMap::new()),
                parent: None,
            }),
        }
    }

    /// Derive an empty child layer whose lookups fall through to `self`.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            layer: Rc::new(Layer {
                entries: RefCell::new(AHashMap::new()),
                parent: Some(Rc::clone(&self.layer)),
            }),
        }
    }

    /// The parent layer, if this is not the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        self.layer.parent.as_ref().map(|p| Self {
            layer: Rc::clone(p),
        })
    }

    /// Same layer identity (not structural equality).
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.layer, &other.layer)
    }

    /// Number of layers from here to the root, inclusive.
    #[must_use]
    pub fn depth(&self) -> usize {
        let mut n = 1;
        let mut current = self.layer.parent.clone();
        while let Some(layer) = current {
            n += 1;
            current = layer.parent.clone();
        }
        n
    }
}

impl<K: Eq + Hash, V: Clone> ScopeChain<K, V> {
    /// Write into the local layer, shadowing any ancestor binding.
    pub fn set(&self, key: K, value: V) {
        self.layer.entries.borrow_mut().insert(key, value);
    }

    /// Nearest binding for `key`, walking toward the root.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        let mut current = Some(&self.layer);
        while let Some(layer) = current {
            if let Some(value) = layer.entries.borrow().get(key) {
                return Some(value.clone());
            }
            current = layer.parent.as_ref();
        }
        None
    }

    /// The local layer's own binding, ignoring ancestors.
    #[must_use]
    pub fn get_local(&self, key: &K) -> Option<V> {
        self.layer.entries.borrow().get(key).cloned()
    }

    /// Remove the local binding, exposing the ancestor's again.
    pub fn remove_local(&self, key: &K) -> Option<V> {
        self.layer.entries.borrow_mut().remove(key)
    }

    /// Every layer's local binding for `key`, nearest-first.
    #[must_use]
    pub fn collect(&self, key: &K) -> Vec<V> {
        let mut out = Vec::new();
        let mut current = Some(&self.layer);
        while let Some(layer) = current {
            if let Some(value) = layer.entries.borrow().get(key) {
                out.push(value.clone());
            }
            current = layer.parent.as_ref();
        }
        out
    }

    /// Visit each local entry of this layer only.
    pub fn for_each_local(&self, mut f: impl FnMut(&K, &V)) {
        for (key, value) in self.layer.entries.borrow().iter() {
            f(key, value);
        }
    }
}

impl<K: fmt::Debug + Eq + Hash, V: fmt::Debug> fmt::Debug for ScopeChain<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeChain")
            .field("depth", &self.depth())
            .field("local", &self.layer.entries.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn lookup_walks_to_nearest() {
        let root = ScopeChain::new();
        root.set("a", 1);
        let mid = root.child();
        mid.set("b", 2);
        let leaf = mid.child();

        assert_eq!(leaf.get(&"a"), Some(1));
        assert_eq!(leaf.get(&"b"), Some(2));
        assert_eq!(leaf.get(&"c"), None);
    }

    #[test]
    fn writes_are_local_and_shadow() {
        let root = ScopeChain::new();
        root.set("k", 1);
        let child = root.child();
        child.set("k", 2);

        assert_eq!(child.get(&"k"), Some(2));
        assert_eq!(root.get(&"k"), Some(1), "ancestor binding untouched");

        child.remove_local(&"k");
        assert_eq!(child.get(&"k"), Some(1), "shadow removed, ancestor visible");
    }

    #[test]
    fn get_local_ignores_ancestors() {
        let root = ScopeChain::new();
        root.set("k", 1);
        let child = root.child();
        assert_eq!(child.get_local(&"k"), None);
        assert_eq!(child.get(&"k"), Some(1));
    }

    #[test]
    fn collect_is_nearest_first() {
        let root = ScopeChain::new();
        root.set("k", 1);
        let mid = root.child();
        mid.set("k", 2);
        let leaf = mid.child();
        leaf.set("k", 3);

        assert_eq!(leaf.collect(&"k"), vec![3, 2, 1]);
        let unset = leaf.child();
        assert_eq!(unset.collect(&"k"), vec![3, 2, 1]);
    }

    #[test]
    fn ptr_eq_tracks_layer_identity() {
        let root: ScopeChain<&str, i32> = ScopeChain::new();
        let child = root.child();
        assert!(root.ptr_eq(&root.clone()));
        assert!(!root.ptr_eq(&child));
        assert!(child.parent().is_some_and(|p| p.ptr_eq(&root)));
    }

    #[test]
    fn depth_counts_layers() {
        let root: ScopeChain<&str, i32> = ScopeChain::new();
        assert_eq!(root.depth(), 1);
        assert_eq!(root.child().child().depth(), 3);
    }

    proptest! {
        /// A child sees exactly its own writes where present, else the
        /// parent's, regardless of write interleaving.
        #[test]
        fn nearest_wins(
            parent_writes in proptest::collection::vec((0u8..8, 0i32..100), 0..16),
            child_writes in proptest::collection::vec((0u8..8, 0i32..100), 0..16),
        ) {
            let parent = ScopeChain::new();
            for (k, v) in &parent_writes {
                parent.set(*k, *v);
            }
            let child = parent.child();
            for (k, v) in &child_writes {
                child.set(*k, *v);
            }

            for key in 0u8..8 {
                let expect_child = child_writes.iter().rev().find(|(k, _)| *k == key);
                let expect_parent = parent_writes.iter().rev().find(|(k, _)| *k == key);
                let expected = expect_child.or(expect_parent).map(|(_, v)| *v);
                prop_assert_eq!(child.get(&key), expected);
            }
        }
    }
}
