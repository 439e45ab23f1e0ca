//! Doubly linked recency list stored in a slab.
//!
//! Nodes are addressed by [`ConnectionKey`], which carries a generation so a
//! key kept past its node's removal never aliases a later node in the same
//! slot.

use std::fmt;

/// Stable handle to a connection held by a
/// [`ConnectionManager`](super::ConnectionManager).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionKey {
    index: usize,
    generation: u64,
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectionKey({}v{})", self.index, self.generation)
    }
}

struct Node<V> {
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

struct Entry<V> {
    generation: u64,
    node: Option<Node<V>>,
}

pub(crate) struct RecencyList<V> {
    entries: Vec<Entry<V>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl<V> Default for RecencyList<V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }
}

impl<V> RecencyList<V> {
    pub(crate) fn len(&self) -> usize { self.len }

    pub(crate) fn is_empty(&self) -> bool { self.len == 0 }

    pub(crate) fn contains(&self, key: ConnectionKey) -> bool { self.node(key).is_some() }

    pub(crate) fn get(&self, key: ConnectionKey) -> Option<&V> { self.node(key).map(|node| &node.value) }

    pub(crate) fn get_mut(&mut self, key: ConnectionKey) -> Option<&mut V> {
        let entry = self.entries.get_mut(key.index)?;
        if entry.generation != key.generation {
            return None;
        }
        entry.node.as_mut().map(|node| &mut node.value)
    }

    pub(crate) fn front(&self) -> Option<ConnectionKey> { self.head.map(|index| self.key_at(index)) }

    /// Key of the node after `key`, toward the back.
    pub(crate) fn next(&self, key: ConnectionKey) -> Option<ConnectionKey> {
        self.node(key)?.next.map(|index| self.key_at(index))
    }

    pub(crate) fn push_front(&mut self, value: V) -> ConnectionKey {
        let index = self.allocate(value);
        self.link_front(index);
        self.key_at(index)
    }

    pub(crate) fn push_back(&mut self, value: V) -> ConnectionKey {
        let index = self.allocate(value);
        self.link_back(index);
        self.key_at(index)
    }

    pub(crate) fn remove(&mut self, key: ConnectionKey) -> Option<V> {
        self.node(key)?;
        self.unlink(key.index);
        let entry = &mut self.entries[key.index];
        let node = entry.node.take()?;
        entry.generation += 1;
        self.free.push(key.index);
        self.len -= 1;
        Some(node.value)
    }

    pub(crate) fn move_to_front(&mut self, key: ConnectionKey) -> bool {
        if self.node(key).is_none() {
            return false;
        }
        self.unlink(key.index);
        self.link_front(key.index);
        true
    }

    pub(crate) fn move_to_back(&mut self, key: ConnectionKey) -> bool {
        if self.node(key).is_none() {
            return false;
        }
        self.unlink(key.index);
        self.link_back(key.index);
        true
    }

    /// Iterate from front to back.
    pub(crate) fn iter(&self) -> Iter<'_, V> {
        Iter {
            list: self,
            cursor: self.head,
        }
    }

    fn node(&self, key: ConnectionKey) -> Option<&Node<V>> {
        let entry = self.entries.get(key.index)?;
        if entry.generation != key.generation {
            return None;
        }
        entry.node.as_ref()
    }

    fn key_at(&self, index: usize) -> ConnectionKey {
        ConnectionKey {
            index,
            generation: self.entries[index].generation,
        }
    }

    fn allocate(&mut self, value: V) -> usize {
        let node = Node {
            value,
            prev: None,
            next: None,
        };
        self.len += 1;
        if let Some(index) = self.free.pop() {
            self.entries[index].node = Some(node);
            index
        } else {
            self.entries.push(Entry {
                generation: 0,
                node: Some(node),
            });
            self.entries.len() - 1
        }
    }

    fn links_mut(&mut self, index: usize) -> Option<&mut Node<V>> { self.entries.get_mut(index)?.node.as_mut() }

    fn unlink(&mut self, index: usize) {
        let Some(node) = self.links_mut(index) else {
            return;
        };
        let (prev, next) = (node.prev.take(), node.next.take());
        match prev {
            Some(prev) => {
                if let Some(node) = self.links_mut(prev) {
                    node.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(next) => {
                if let Some(node) = self.links_mut(next) {
                    node.prev = prev;
                }
            }
            None => self.tail = prev,
        }
    }

    fn link_front(&mut self, index: usize) {
        let old_head = self.head;
        if let Some(node) = self.links_mut(index) {
            node.prev = None;
            node.next = old_head;
        }
        match old_head {
            Some(head) => {
                if let Some(node) = self.links_mut(head) {
                    node.prev = Some(index);
                }
            }
            None => self.tail = Some(index),
        }
        self.head = Some(index);
    }

    fn link_back(&mut self, index: usize) {
        let old_tail = self.tail;
        if let Some(node) = self.links_mut(index) {
            node.next = None;
            node.prev = old_tail;
        }
        match old_tail {
            Some(tail) => {
                if let Some(node) = self.links_mut(tail) {
                    node.next = Some(index);
                }
            }
            None => self.head = Some(index),
        }
        self.tail = Some(index);
    }
}

pub(crate) struct Iter<'a, V> {
    list: &'a RecencyList<V>,
    cursor: Option<usize>,
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = (ConnectionKey, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.cursor?;
        let node = self.list.entries.get(index)?.node.as_ref()?;
        self.cursor = node.next;
        Some((self.list.key_at(index), &node.value))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn values(list: &RecencyList<u32>) -> Vec<u32> { list.iter().map(|(_, v)| *v).collect() }

    #[rstest]
    fn pushes_and_moves_preserve_links() {
        let mut list = RecencyList::default();
        let a = list.push_back(1);
        let b = list.push_back(2);
        let c = list.push_front(0);
        assert_eq!(values(&list), [0, 1, 2]);

        assert!(list.move_to_front(b));
        assert_eq!(values(&list), [2, 0, 1]);
        assert!(list.move_to_back(c));
        assert_eq!(values(&list), [2, 1, 0]);
        assert_eq!(list.front(), Some(b));
        assert_eq!(list.iter().last().map(|(key, _)| key), Some(c));
        assert_eq!(list.next(b), Some(a));
        assert_eq!(list.next(c), None);
    }

    #[rstest]
    fn stale_keys_do_not_alias_reused_slots() {
        let mut list = RecencyList::default();
        let a = list.push_back(1);
        assert_eq!(list.remove(a), Some(1));
        let b = list.push_back(2);

        assert_ne!(a, b);
        assert!(!list.contains(a));
        assert_eq!(list.get(a), None);
        assert_eq!(list.remove(a), None);
        assert!(!list.move_to_front(a));
        assert_eq!(list.get(b), Some(&2));
        assert_eq!(list.len(), 1);
    }

    #[rstest]
    fn removing_every_node_empties_the_list() {
        let mut list = RecencyList::default();
        let keys: Vec<_> = (0..5).map(|v| list.push_back(v)).collect();
        for key in [keys[2], keys[0], keys[4], keys[1], keys[3]] {
            list.remove(key);
        }
        assert!(list.is_empty());
        assert_eq!(list.front(), None);
        assert_eq!(list.iter().count(), 0);
    }
}
