//! Trie Module
//!
//! Ordered, concurrent index from byte-string keys to values.
//!
//! ## Responsibilities
//! - Point get/put/remove keyed by arbitrary bytes
//! - O(1) count of live values
//! - Ordered traversal with early exit
//!
//! ## Locking
//! Every node has its own lock, held only while reading or editing that
//! node's value and edges, never while descending. Nodes are created lazily
//! along a key's path and never pruned.
//!
//! `range` copies each node's value and edge list under its lock and releases
//! the lock before visiting, so it runs alongside writers. Keys are always
//! visited in ascending byte order and never twice; whether a concurrent
//! put/remove is observed depends on where the traversal is when it lands.

mod node;

use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;

use node::Node;

/// Byte-keyed trie
pub struct Trie<T> {
    root: Arc<Node<T>>,
}

impl<T> Trie<T> {
    /// Create an empty trie
    pub fn new() -> Self {
        Self {
            root: Arc::new(Node::new()),
        }
    }

    /// Number of live values
    pub fn count(&self) -> usize {
        self.root.count()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Store `value` under `key`, returning the value it replaced
    ///
    /// Subtree counts along the path only change when the key had no value.
    pub fn put(&self, key: &[u8], value: T) -> Option<T> {
        let mut path = Vec::with_capacity(key.len() + 1);
        let mut node = Arc::clone(&self.root);
        for &byte in key {
            let next = node.child_or_insert(byte);
            path.push(node);
            node = next;
        }

        let old = node.replace(Some(value));
        path.push(node);

        if old.is_none() {
            for node in &path {
                node.increment();
            }
        }
        old
    }

    /// Clear the value under `key`, returning it
    ///
    /// The path stays allocated.
    pub fn remove(&self, key: &[u8]) -> Option<T> {
        let path = self.path(key)?;
        let old = path.last()?.replace(None);
        if old.is_some() {
            for node in &path {
                node.decrement();
            }
        }
        old
    }

    /// Nodes from the root to the node for `key`, if every edge exists
    fn path(&self, key: &[u8]) -> Option<Vec<Arc<Node<T>>>> {
        let mut path = Vec::with_capacity(key.len() + 1);
        let mut node = Arc::clone(&self.root);
        for &byte in key {
            let next = node.child(byte)?;
            path.push(node);
            node = next;
        }
        path.push(node);
        Some(path)
    }
}

impl<T: Clone> Trie<T> {
    /// Look up the value stored under `key`
    pub fn get(&self, key: &[u8]) -> Option<T> {
        let mut node = Arc::clone(&self.root);
        for &byte in key {
            node = node.child(byte)?;
        }
        node.value()
    }

    /// Visit every key/value in ascending key order
    ///
    /// Returning `ControlFlow::Break(())` from `f` ends the traversal with
    /// `Ok(())`; an `Err` ends it and is returned as is.
    pub fn range<E, F>(&self, mut f: F) -> Result<(), E>
    where
        F: FnMut(&[u8], &T) -> Result<ControlFlow<()>, E>,
    {
        let mut key: Vec<u8> = Vec::with_capacity(64);
        // (depth of the node's key, edge byte leading to it, node)
        let mut stack: Vec<(usize, Option<u8>, Arc<Node<T>>)> =
            vec![(0, None, Arc::clone(&self.root))];

        while let Some((depth, byte, node)) = stack.pop() {
            key.truncate(depth);
            if let Some(byte) = byte {
                key.push(byte);
            }

            let snapshot = node.snapshot();
            if let Some(value) = &snapshot.value {
                if f(key.as_slice(), value)?.is_break() {
                    return Ok(());
                }
            }

            // Reversed so the smallest byte is popped first
            for (byte, child) in snapshot.children.into_iter().rev() {
                stack.push((key.len(), Some(byte), child));
            }
        }
        Ok(())
    }
}

impl<T> Default for Trie<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for Trie<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.root)
    }
}
