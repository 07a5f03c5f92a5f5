//! Recency bookkeeping for LRU eviction.
//!
//! Every touch stamps the token with a fresh sequence number. The sequence
//! index gives oldest-first iteration; the token index gives O(log n)
//! removal of a prior position. Sequence numbers never repeat, so tokens
//! touched within the same clock tick keep their exact touch order.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
struct Stamp {
    seq: u64,
    at: Instant,
}

/// Least-recently-used ordering over a set of tokens.
#[derive(Debug)]
pub struct AccessTracker<K> {
    /// Oldest first.
    order: BTreeMap<u64, K>,
    stamps: HashMap<K, Stamp>,
    next_seq: u64,
}

impl<K> Default for AccessTracker<K> {
    fn default() -> Self {
        Self {
            order: BTreeMap::new(),
            stamps: HashMap::new(),
            next_seq: 0,
        }
    }
}

impl<K: Clone + Eq + Hash> AccessTracker<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move `token` to the most-recent end and record the access time.
    pub fn touch(&mut self, token: &K) {
        let seq = self.next_seq;
        self.next_seq += 1;
        let stamp = Stamp {
            seq,
            at: Instant::now(),
        };

        match self.stamps.get_mut(token) {
            Some(prev) => {
                self.order.remove(&prev.seq);
                *prev = stamp;
            }
            None => {
                self.stamps.insert(token.clone(), stamp);
            }
        }
        self.order.insert(seq, token.clone());
    }

    /// The `n` least-recently-touched tokens, oldest first. Nothing is removed.
    pub fn oldest(&self, n: usize) -> Vec<K> {
        self.order.values().take(n).cloned().collect()
    }

    /// Forget a token. Returns whether it was tracked.
    pub fn remove(&mut self, token: &K) -> bool {
        match self.stamps.remove(token) {
            Some(stamp) => {
                self.order.remove(&stamp.seq);
                true
            }
            None => false,
        }
    }

    pub fn last_access(&self, token: &K) -> Option<Instant> {
        self.stamps.get(token).map(|s| s.at)
    }

    pub fn len(&self) -> usize {
        debug_assert_eq!(self.order.len(), self.stamps.len());
        self.stamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.stamps.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oldest_follows_touch_order() {
        let mut tracker = AccessTracker::new();
        for t in ["a", "b", "c"] {
            tracker.touch(&t);
        }
        assert_eq!(tracker.oldest(2), vec!["a", "b"]);

        tracker.touch(&"a");
        assert_eq!(tracker.oldest(3), vec!["b", "c", "a"]);
    }

    #[test]
    fn test_touch_is_idempotent_on_size() {
        let mut tracker = AccessTracker::new();
        tracker.touch(&"x");
        tracker.touch(&"x");
        tracker.touch(&"x");
        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.oldest(5), vec!["x"]);
    }

    #[test]
    fn test_remove_keeps_indexes_consistent() {
        let mut tracker = AccessTracker::new();
        tracker.touch(&1u32);
        tracker.touch(&2u32);
        assert!(tracker.remove(&1));
        assert!(!tracker.remove(&1));
        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.oldest(10), vec![2]);
        assert!(tracker.last_access(&1).is_none());
    }

    #[test]
    fn test_oldest_does_not_remove() {
        let mut tracker = AccessTracker::new();
        tracker.touch(&"a");
        let _ = tracker.oldest(1);
        assert_eq!(tracker.len(), 1);
        assert!(tracker.last_access(&"a").is_some());
    }
}
