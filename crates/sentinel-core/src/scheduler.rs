//! Delayed effects keyed by subject and fire time.
//!
//! Scheduling for a subject that already has a pending effect replaces it, so
//! at most one effect per subject is ever in flight.

use ordered_float::OrderedFloat;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

type QueueKey = (OrderedFloat<f64>, u64);

/// Time-ordered queue of delayed effects with one pending entry per subject.
#[derive(Debug, Clone)]
pub struct Scheduler<K, E> {
    queue: BTreeMap<QueueKey, (K, E)>,
    pending: HashMap<K, QueueKey>,
    next_seq: u64,
}

impl<K, E> Default for Scheduler<K, E> {
    fn default() -> Self {
        Self {
            queue: BTreeMap::new(),
            pending: HashMap::new(),
            next_seq: 0,
        }
    }
}

impl<K: Copy + Eq + Hash, E> Scheduler<K, E> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `event` for `subject` at `fire_at`, returning the effect it replaced.
    pub fn schedule(&mut self, subject: K, fire_at: f64, event: E) -> Option<E> {
        let replaced = self.cancel(&subject);
        let key = (OrderedFloat(fire_at), self.next_seq);
        self.next_seq += 1;
        self.queue.insert(key, (subject, event));
        self.pending.insert(subject, key);
        replaced
    }

    /// Drop the pending effect for `subject`, if any.
    pub fn cancel(&mut self, subject: &K) -> Option<E> {
        let key = self.pending.remove(subject)?;
        self.queue.remove(&key).map(|(_, event)| event)
    }

    #[must_use]
    pub fn is_pending(&self, subject: &K) -> bool {
        self.pending.contains_key(subject)
    }

    /// Fire time of the pending effect for `subject`.
    #[must_use]
    pub fn fire_time(&self, subject: &K) -> Option<f64> {
        self.pending.get(subject).map(|(at, _)| at.into_inner())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Remove and return every effect due at or before `now`, earliest first.
    pub fn drain_due(&mut self, now: f64) -> Vec<(K, E)> {
        let mut due = Vec::new();
        while let Some(entry) = self.queue.first_entry() {
            if entry.key().0.into_inner() > now {
                break;
            }
            let (subject, event) = entry.remove();
            self.pending.remove(&subject);
            due.push((subject, event));
        }
        due
    }
}
