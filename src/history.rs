//! Bounded in-memory history replayed to late joiners.

use std::collections::VecDeque;

use time::{Duration, OffsetDateTime};

/// Entries that know when they were created.
pub trait Timestamped {
    fn created_at(&self) -> OffsetDateTime;
}

/// Entries that belong to a single author and can be deleted by them.
pub trait Authored {
    fn id(&self) -> &str;
    fn author_id(&self) -> &str;
}

/// Fixed-capacity FIFO. Inserting past capacity evicts from the head.
#[derive(Debug, Clone)]
pub struct BoundedHistory<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedHistory<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends at the tail and returns whatever fell off the head.
    pub fn append(&mut self, entry: T) -> Vec<T> {
        self.entries.push_back(entry);
        let overflow = self.entries.len().saturating_sub(self.capacity);
        self.entries.drain(..overflow).collect()
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    pub fn remove_if(&mut self, mut predicate: impl FnMut(&T) -> bool) -> Vec<T> {
        let mut removed = Vec::new();
        let mut kept = VecDeque::with_capacity(self.entries.len());
        for entry in self.entries.drain(..) {
            if predicate(&entry) {
                removed.push(entry);
            } else {
                kept.push_back(entry);
            }
        }
        self.entries = kept;
        removed
    }
}

impl<T: Clone> BoundedHistory<T> {
    pub fn list(&self) -> Vec<T> {
        self.entries.iter().cloned().collect()
    }
}

impl<T: Timestamped> BoundedHistory<T> {
    /// Drops everything at least `ttl` old relative to `now`.
    pub fn sweep_expired(&mut self, now: OffsetDateTime, ttl: Duration) -> usize {
        let expired = self.remove_if(|entry| now - entry.created_at() >= ttl);
        if !expired.is_empty() {
            tracing::debug!(expired = expired.len(), "Swept expired history entries");
        }
        expired.len()
    }
}

impl<T: Authored> BoundedHistory<T> {
    /// Removes entry `id` only if `requester` authored it.
    pub fn remove_owned(&mut self, id: &str, requester: &str) -> Option<T> {
        self.remove_if(|entry| entry.id() == id && entry.author_id() == requester)
            .into_iter()
            .next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Post {
        id: String,
        author: String,
        at: OffsetDateTime,
    }

    impl Timestamped for Post {
        fn created_at(&self) -> OffsetDateTime {
            self.at
        }
    }

    impl Authored for Post {
        fn id(&self) -> &str {
            &self.id
        }

        fn author_id(&self) -> &str {
            &self.author
        }
    }

    fn post(id: &str, author: &str, at: OffsetDateTime) -> Post {
        Post {
            id: id.into(),
            author: author.into(),
            at,
        }
    }

    #[test]
    fn keeps_last_capacity_entries_in_order() {
        for n in [0usize, 1, 3, 4, 5, 11] {
            let mut history = BoundedHistory::new(4);
            for i in 0..n {
                history.append(i);
            }
            let expected: Vec<usize> = (n.saturating_sub(4)..n).collect();
            assert_eq!(history.list(), expected, "after {n} appends");
            assert_eq!(history.len(), n.min(4));
        }
    }

    #[test]
    fn append_returns_evicted_head() {
        let mut history = BoundedHistory::new(2);
        assert!(history.append("a").is_empty());
        assert!(history.append("b").is_empty());
        assert_eq!(history.append("c"), vec!["a"]);
        assert_eq!(history.list(), vec!["b", "c"]);
    }

    #[test]
    fn capacity_is_not_preallocated() {
        let mut history = BoundedHistory::new(usize::MAX);
        assert!(history.append(1).is_empty());
        assert_eq!(history.list(), vec![1]);
    }

    #[test]
    fn sweep_uses_inclusive_ttl_boundary() {
        let now = OffsetDateTime::now_utc();
        let ttl = Duration::hours(24);
        let ms = Duration::milliseconds(1);

        let mut history = BoundedHistory::new(10);
        history.append(post("old", "u1", now - ttl - ms));
        history.append(post("edge", "u1", now - ttl));
        history.append(post("fresh", "u1", now - ttl + ms));

        assert_eq!(history.sweep_expired(now, ttl), 2);
        let ids: Vec<_> = history.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["fresh"]);
    }

    #[test]
    fn remove_owned_requires_matching_author() {
        let now = OffsetDateTime::now_utc();
        let mut history = BoundedHistory::new(10);
        history.append(post("s1", "u2", now));

        assert!(history.remove_owned("s1", "u1").is_none());
        assert!(history.remove_owned("missing", "u2").is_none());
        assert_eq!(history.len(), 1);

        let removed = history.remove_owned("s1", "u2").unwrap();
        assert_eq!(removed.id, "s1");
        assert!(history.is_empty());
    }
}
