//! Scoped tree values — inherited defaults with per-node overrides.
//!
//! A [`ScopedValue`] is a node in a forest. Reading walks parent links until
//! a node carrying a value is found, so children inherit whatever their
//! nearest ancestor set, and setting a value on a node shadows the ancestors
//! for that node's subtree only. Shells use this to carry per-scope defaults
//! (working directory, environment snapshot, loggers, the print-command
//! flag) so that a child shell sees later changes to its parent unless it
//! overrode the value itself.

use std::sync::{Arc, RwLock};

struct Node<T> {
    slot: RwLock<Option<T>>,
    parent: Option<Arc<Node<T>>>,
}

/// A value slot with structural inheritance.
///
/// Cloning a `ScopedValue` yields another handle to the *same* node; use
/// [`ScopedValue::child`] to create a new node that inherits from this one.
pub struct ScopedValue<T> {
    node: Arc<Node<T>>,
}

impl<T> Clone for ScopedValue<T> {
    fn clone(&self) -> Self {
        Self {
            node: self.node.clone(),
        }
    }
}

impl<T: Clone> ScopedValue<T> {
    /// Create a root node carrying `value`.
    pub fn new(value: T) -> Self {
        Self {
            node: Arc::new(Node {
                slot: RwLock::new(Some(value)),
                parent: None,
            }),
        }
    }

    /// Create a root node with no value.
    pub fn empty() -> Self {
        Self {
            node: Arc::new(Node {
                slot: RwLock::new(None),
                parent: None,
            }),
        }
    }

    /// Create a child node that inherits from this one until it sets its
    /// own value.
    pub fn child(&self) -> Self {
        Self {
            node: Arc::new(Node {
                slot: RwLock::new(None),
                parent: Some(self.node.clone()),
            }),
        }
    }

    /// The nearest ancestor-or-self value, if any node on the path to the
    /// root carries one.
    pub fn get(&self) -> Option<T> {
        let mut current: &Arc<Node<T>> = &self.node;
        loop {
            let slot = current.slot.read().expect("scoped value lock poisoned");
            if let Some(value) = slot.as_ref() {
                return Some(value.clone());
            }
            drop(slot);
            match &current.parent {
                Some(parent) => current = parent,
                None => return None,
            }
        }
    }

    /// Set the value on this node only. Descendants without their own value
    /// observe the change; ancestors and siblings do not.
    pub fn set(&self, value: T) {
        *self.node.slot.write().expect("scoped value lock poisoned") = Some(value);
    }
}

impl<T: Clone + Default> ScopedValue<T> {
    /// Like [`ScopedValue::get`] but falls back to `T::default()`.
    pub fn get_or_default(&self) -> T {
        self.get().unwrap_or_default()
    }
}

impl<T: Clone + std::fmt::Debug> std::fmt::Debug for ScopedValue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedValue").field("value", &self.get()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_value_is_visible() {
        let root = ScopedValue::new(5);
        assert_eq!(root.get(), Some(5));
    }

    #[test]
    fn child_inherits_from_distant_ancestor() {
        // C -> B -> A -> N with only C set.
        let c = ScopedValue::new("v");
        let b = c.child();
        let a = b.child();
        let n = a.child();
        assert_eq!(n.get(), Some("v"));
    }

    #[test]
    fn override_shadows_without_touching_siblings() {
        let root = ScopedValue::new(1);
        let left = root.child();
        let right = root.child();

        left.set(2);
        assert_eq!(left.get(), Some(2));
        assert_eq!(right.get(), Some(1));
        assert_eq!(root.get(), Some(1));
    }

    #[test]
    fn ancestor_mutation_visible_through_child() {
        let root = ScopedValue::new(1);
        let child = root.child();
        root.set(7);
        assert_eq!(child.get(), Some(7));
    }

    #[test]
    fn ancestor_mutation_hidden_behind_override() {
        let root = ScopedValue::new(1);
        let child = root.child();
        child.set(3);
        root.set(7);
        assert_eq!(child.get(), Some(3));
    }

    #[test]
    fn empty_chain_yields_none() {
        let root: ScopedValue<i32> = ScopedValue::empty();
        let child = root.child();
        assert_eq!(child.get(), None);
        assert_eq!(child.get_or_default(), 0);
    }

    #[test]
    fn clone_is_a_handle_to_the_same_node() {
        let a = ScopedValue::new(1);
        let b = a.clone();
        b.set(9);
        assert_eq!(a.get(), Some(9));
    }
}
