//! FIFO list of page keys with O(1) operations.
//
// Doubly-linked list over a slab of nodes:
// - push_front / push_back: O(1)
// - remove: O(1)
// - peek_tail: O(1)
//
// HashMap provides O(1) lookup from key to slab index.

use std::collections::{HashMap, TryReserveError};

const NIL: usize = usize::MAX;

struct Node {
    key: u64,
    prev: usize,
    next: usize,
}

/// Ordered page keys: new entries at the head, scans start at the tail.
pub struct KeyList {
    head: usize,
    tail: usize,
    nodes: Vec<Node>,
    free: Vec<usize>,
    index: HashMap<u64, usize>,
}

impl KeyList {
    pub fn new() -> Self {
        Self {
            head: NIL,
            tail: NIL,
            nodes: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.head == NIL
    }

    pub fn contains(&self, key: u64) -> bool {
        self.index.contains_key(&key)
    }

    /// Inserts at the head (scanned last). Existing keys are moved.
    pub fn push_front(&mut self, key: u64) -> Result<(), TryReserveError> {
        let idx = self.detach_or_alloc(key)?;
        self.link_front(idx);
        Ok(())
    }

    /// Inserts at the tail (scanned first). Existing keys are moved.
    pub fn push_back(&mut self, key: u64) -> Result<(), TryReserveError> {
        let idx = self.detach_or_alloc(key)?;
        self.link_back(idx);
        Ok(())
    }

    /// Removes a key, returning whether it was present.
    pub fn remove(&mut self, key: u64) -> bool {
        match self.index.remove(&key) {
            Some(idx) => {
                self.unlink(idx);
                self.free.push(idx);
                true
            }
            None => false,
        }
    }

    pub fn peek_tail(&self) -> Option<u64> {
        (self.tail != NIL).then(|| self.nodes[self.tail].key)
    }

    /// Keys in scan order, oldest insertion first.
    pub fn scan(&self) -> Vec<u64> {
        let mut out = Vec::with_capacity(self.len());
        let mut cur = self.tail;
        while cur != NIL {
            out.push(self.nodes[cur].key);
            cur = self.nodes[cur].prev;
        }
        out
    }

    pub fn clear(&mut self) {
        self.head = NIL;
        self.tail = NIL;
        self.nodes.clear();
        self.free.clear();
        self.index.clear();
    }

    fn detach_or_alloc(&mut self, key: u64) -> Result<usize, TryReserveError> {
        if let Some(&idx) = self.index.get(&key) {
            self.unlink(idx);
            return Ok(idx);
        }
        self.index.try_reserve(1)?;
        if self.free.is_empty() {
            self.nodes.try_reserve(1)?;
        }
        let node = Node {
            key,
            prev: NIL,
            next: NIL,
        };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.nodes[idx] = node;
                idx
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        };
        self.index.insert(key, idx);
        Ok(idx)
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = (self.nodes[idx].prev, self.nodes[idx].next);
        if prev == NIL {
            self.head = next;
        } else {
            self.nodes[prev].next = next;
        }
        if next == NIL {
            self.tail = prev;
        } else {
            self.nodes[next].prev = prev;
        }
        self.nodes[idx].prev = NIL;
        self.nodes[idx].next = NIL;
    }

    fn link_front(&mut self, idx: usize) {
        self.nodes[idx].next = self.head;
        self.nodes[idx].prev = NIL;
        if self.head != NIL {
            self.nodes[self.head].prev = idx;
        } else {
            self.tail = idx;
        }
        self.head = idx;
    }

    fn link_back(&mut self, idx: usize) {
        self.nodes[idx].prev = self.tail;
        self.nodes[idx].next = NIL;
        if self.tail != NIL {
            self.nodes[self.tail].next = idx;
        } else {
            self.head = idx;
        }
        self.tail = idx;
    }
}

impl Default for KeyList {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_is_fifo() {
        let mut l = KeyList::new();
        l.push_front(1).unwrap();
        l.push_front(2).unwrap();
        l.push_front(3).unwrap();
        assert_eq!(l.scan(), vec![1, 2, 3]);
        assert_eq!(l.peek_tail(), Some(1));
    }

    #[test]
    fn test_push_back_is_scanned_first() {
        let mut l = KeyList::new();
        l.push_front(1).unwrap();
        l.push_front(2).unwrap();
        l.push_back(9).unwrap();
        assert_eq!(l.scan(), vec![9, 1, 2]);
    }

    #[test]
    fn test_remove_middle_and_reuse_slot() {
        let mut l = KeyList::new();
        for k in 1..=4 {
            l.push_front(k).unwrap();
        }
        assert!(l.remove(2));
        assert!(!l.remove(2));
        l.push_front(5).unwrap();
        assert_eq!(l.scan(), vec![1, 3, 4, 5]);
        assert_eq!(l.len(), 4);
    }

    #[test]
    fn test_remove_last_empties_list() {
        let mut l = KeyList::new();
        l.push_front(7).unwrap();
        assert!(l.remove(7));
        assert!(l.is_empty());
        assert_eq!(l.peek_tail(), None);
        assert!(l.scan().is_empty());
    }
}
