//! Deterministic orderings and the insertion-ordered set used by the engine.
//!
//! Every selection and entry/exit computation in the interpreter must be
//! reproducible, so nothing here depends on hash iteration order. States are
//! compared through the [`DocumentNode`] trait, which exposes the two values
//! assigned once by the document builder: nesting depth and document order.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A node that carries a position in the document.
///
/// `depth` is the distance from the synthetic root (the root itself is `-1`)
/// and `document_order` is the global pre-order index assigned at build time.
pub trait DocumentNode {
    /// Distance from the synthetic root.
    fn depth(&self) -> i32;

    /// Global pre-order index, unique across the whole document.
    fn document_order(&self) -> u32;
}

/// Compare two nodes by document order.
///
/// # Example
///
/// ```rust
/// use statecharts::core::{document_order, DocumentNode};
/// use std::cmp::Ordering;
///
/// struct Node(i32, u32);
///
/// impl DocumentNode for Node {
///     fn depth(&self) -> i32 { self.0 }
///     fn document_order(&self) -> u32 { self.1 }
/// }
///
/// assert_eq!(document_order(&Node(3, 1), &Node(0, 2)), Ordering::Less);
/// ```
pub fn document_order<N: DocumentNode + ?Sized>(a: &N, b: &N) -> Ordering {
    a.document_order().cmp(&b.document_order())
}

/// Compare two nodes in entry order: shallower first, then document order.
///
/// # Example
///
/// ```rust
/// use statecharts::core::{entry_order, DocumentNode};
/// use std::cmp::Ordering;
///
/// struct Node(i32, u32);
///
/// impl DocumentNode for Node {
///     fn depth(&self) -> i32 { self.0 }
///     fn document_order(&self) -> u32 { self.1 }
/// }
///
/// // A shallow node is entered before a deep one, whatever its position.
/// assert_eq!(entry_order(&Node(0, 9), &Node(1, 2)), Ordering::Less);
/// // Same depth falls back to document order.
/// assert_eq!(entry_order(&Node(1, 4), &Node(1, 2)), Ordering::Greater);
/// ```
pub fn entry_order<N: DocumentNode + ?Sized>(a: &N, b: &N) -> Ordering {
    a.depth()
        .cmp(&b.depth())
        .then_with(|| document_order(a, b))
}

/// Compare two nodes in exit order, the exact reverse of [`entry_order`].
pub fn exit_order<N: DocumentNode + ?Sized>(a: &N, b: &N) -> Ordering {
    entry_order(a, b).reverse()
}

/// Set that remembers insertion order.
///
/// The engine's sets are small (an active configuration, the states entered
/// by one microstep) so membership is a linear scan over a vector. Iteration
/// always yields elements in the order they were first inserted.
///
/// # Example
///
/// ```rust
/// use statecharts::core::OrderedSet;
///
/// let mut set = OrderedSet::new();
/// assert!(set.insert(3));
/// assert!(set.insert(1));
/// assert!(!set.insert(3));
///
/// assert_eq!(set.iter().copied().collect::<Vec<_>>(), vec![3, 1]);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderedSet<T> {
    items: Vec<T>,
}

impl<T> Default for OrderedSet<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: PartialEq> OrderedSet<T> {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an element, returning `false` if it was already present.
    pub fn insert(&mut self, item: T) -> bool {
        if self.items.contains(&item) {
            false
        } else {
            self.items.push(item);
            true
        }
    }

    /// Remove an element, returning `true` if it was present.
    pub fn remove(&mut self, item: &T) -> bool {
        match self.items.iter().position(|i| i == item) {
            Some(index) => {
                self.items.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, item: &T) -> bool {
        self.items.contains(item)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Add every element of `other` that is not already present.
    pub fn union<I: IntoIterator<Item = T>>(&mut self, other: I) {
        for item in other {
            self.insert(item);
        }
    }

    /// True when at least one element is shared with `other`.
    pub fn intersects(&self, other: &OrderedSet<T>) -> bool {
        self.items.iter().any(|item| other.contains(item))
    }

    /// True when any element satisfies the predicate.
    pub fn any<F: FnMut(&T) -> bool>(&self, predicate: F) -> bool {
        self.items.iter().any(predicate)
    }

    /// Return the elements sorted with `compare`, leaving the set untouched.
    pub fn sorted_by<F>(&self, mut compare: F) -> Vec<T>
    where
        T: Clone,
        F: FnMut(&T, &T) -> Ordering,
    {
        let mut sorted = self.items.clone();
        sorted.sort_by(|a, b| compare(a, b));
        sorted
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }
}

impl<T: PartialEq> FromIterator<T> for OrderedSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut set = Self::new();
        set.union(iter);
        set
    }
}

impl<T> IntoIterator for OrderedSet<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a OrderedSet<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Node {
        depth: i32,
        order: u32,
    }

    impl DocumentNode for Node {
        fn depth(&self) -> i32 {
            self.depth
        }

        fn document_order(&self) -> u32 {
            self.order
        }
    }

    fn node(depth: i32, order: u32) -> Node {
        Node { depth, order }
    }

    #[test]
    fn document_order_ignores_depth() {
        assert_eq!(document_order(&node(5, 1), &node(0, 2)), Ordering::Less);
        assert_eq!(document_order(&node(0, 2), &node(0, 2)), Ordering::Equal);
    }

    #[test]
    fn entry_order_sorts_shallow_first_then_document_order() {
        let mut nodes = vec![node(2, 3), node(0, 7), node(1, 5), node(1, 4)];
        nodes.sort_by(entry_order);

        let orders: Vec<u32> = nodes.iter().map(|n| n.order).collect();
        assert_eq!(orders, vec![7, 4, 5, 3]);
    }

    #[test]
    fn exit_order_is_reverse_of_entry_order() {
        let mut entry = vec![node(2, 3), node(0, 7), node(1, 5), node(1, 4)];
        let mut exit = vec![node(2, 3), node(0, 7), node(1, 5), node(1, 4)];
        entry.sort_by(entry_order);
        exit.sort_by(exit_order);

        let entry: Vec<u32> = entry.iter().map(|n| n.order).collect();
        let mut exit: Vec<u32> = exit.iter().map(|n| n.order).collect();
        exit.reverse();
        assert_eq!(entry, exit);
    }

    #[test]
    fn ordered_set_keeps_first_insertion_position() {
        let mut set = OrderedSet::new();
        set.insert("b");
        set.insert("a");
        set.insert("b");

        assert_eq!(set.len(), 2);
        assert_eq!(set.as_slice(), &["b", "a"]);
    }

    #[test]
    fn ordered_set_remove_and_contains() {
        let mut set: OrderedSet<u32> = [1, 2, 3].into_iter().collect();

        assert!(set.remove(&2));
        assert!(!set.remove(&2));
        assert!(!set.contains(&2));
        assert_eq!(set.as_slice(), &[1, 3]);
    }

    #[test]
    fn intersects_detects_shared_members() {
        let a: OrderedSet<u32> = [1, 2].into_iter().collect();
        let b: OrderedSet<u32> = [2, 9].into_iter().collect();
        let c: OrderedSet<u32> = [7].into_iter().collect();

        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        assert!(!OrderedSet::<u32>::new().intersects(&a));
    }

    #[test]
    fn sorted_by_does_not_reorder_the_set() {
        let set: OrderedSet<u32> = [3, 1, 2].into_iter().collect();
        let sorted = set.sorted_by(|a, b| a.cmp(b));

        assert_eq!(sorted, vec![1, 2, 3]);
        assert_eq!(set.as_slice(), &[3, 1, 2]);
    }
}
