//! Trie node
//!
//! A node holds at most one value, its outgoing edges sorted by byte, and the
//! number of live values in its subtree (itself included).

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

pub(super) struct Node<T> {
    inner: Mutex<NodeInner<T>>,
    count: AtomicUsize,
}

struct NodeInner<T> {
    value: Option<T>,
    /// Sorted ascending by edge byte
    children: Vec<(u8, Arc<Node<T>>)>,
}

/// What a range traversal sees of a node: its value and edges at one instant
pub(super) struct Snapshot<T> {
    pub value: Option<T>,
    pub children: Vec<(u8, Arc<Node<T>>)>,
}

impl<T> Node<T> {
    pub(super) fn new() -> Self {
        Self {
            inner: Mutex::new(NodeInner {
                value: None,
                children: Vec::new(),
            }),
            count: AtomicUsize::new(0),
        }
    }

    pub(super) fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    pub(super) fn increment(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    pub(super) fn decrement(&self) {
        self.count.fetch_sub(1, Ordering::SeqCst);
    }

    /// Follow the edge labeled `byte`, if it exists
    pub(super) fn child(&self, byte: u8) -> Option<Arc<Node<T>>> {
        let inner = self.inner.lock();
        inner
            .children
            .binary_search_by_key(&byte, |(b, _)| *b)
            .ok()
            .map(|i| Arc::clone(&inner.children[i].1))
    }

    /// Follow the edge labeled `byte`, creating it (in sorted position) if missing
    pub(super) fn child_or_insert(&self, byte: u8) -> Arc<Node<T>> {
        let mut inner = self.inner.lock();
        match inner.children.binary_search_by_key(&byte, |(b, _)| *b) {
            Ok(i) => Arc::clone(&inner.children[i].1),
            Err(i) => {
                let node = Arc::new(Node::new());
                inner.children.insert(i, (byte, Arc::clone(&node)));
                node
            }
        }
    }

    /// Swap the stored value, returning the previous one
    pub(super) fn replace(&self, value: Option<T>) -> Option<T> {
        let mut inner = self.inner.lock();
        std::mem::replace(&mut inner.value, value)
    }
}

impl<T: Clone> Node<T> {
    pub(super) fn value(&self) -> Option<T> {
        self.inner.lock().value.clone()
    }

    /// Copy value and edges under the lock; the lock is released on return
    pub(super) fn snapshot(&self) -> Snapshot<T> {
        let inner = self.inner.lock();
        Snapshot {
            value: inner.value.clone(),
            children: inner.children.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Node<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        match &inner.value {
            Some(value) => write!(f, "{{«{:?}»", value)?,
            None => write!(f, "{{<none>")?,
        }
        for (byte, child) in &inner.children {
            write!(f, ", {:?}: {:?}", *byte as char, child)?;
        }
        write!(f, "}}")
    }
}
