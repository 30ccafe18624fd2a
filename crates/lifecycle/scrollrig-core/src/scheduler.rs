//! Keyed trailing-edge debouncer.
//!
//! Timers are plain data: the host advances time by calling [`Debouncer::pop_due`] from
//! its frame loop, and each pop re-reads the pending table, so a task cancelled by an
//! earlier task of the same batch is never returned. Timers armed after the batch's
//! [`Debouncer::watermark`] wait for the next batch, even with a zero delay.

use std::hash::Hash;

use hashbrown::HashMap;

struct Pending<T> {
    deadline: f64,
    seq: u64,
    task: T,
}

/// Coalesces bursts of `schedule(key, ..)` calls into one trailing task per key.
pub struct Debouncer<K, T> {
    pending: HashMap<K, Pending<T>>,
    seq: u64,
    fired: u64,
}

impl<K, T> Default for Debouncer<K, T> {
    fn default() -> Self {
        Self {
            pending: HashMap::new(),
            seq: 0,
            fired: 0,
        }
    }
}

impl<K: Eq + Hash + Clone, T> Debouncer<K, T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm (or re-arm) the timer for `key`. A pending timer under the same key is
    /// cancelled and its task replaced. Returns true when an existing timer was restarted.
    pub fn schedule(&mut self, key: K, task: T, delay_ms: f64, now: f64) -> bool {
        self.seq = self.seq.wrapping_add(1);
        let entry = Pending {
            deadline: now + delay_ms.max(0.0),
            seq: self.seq,
            task,
        };
        self.pending.insert(key, entry).is_some()
    }

    /// Remove a pending timer without firing it.
    pub fn cancel(&mut self, key: &K) -> Option<T> {
        self.pending.remove(key).map(|p| p.task)
    }

    /// Cancel every pending timer whose key matches `pred`. Returns how many were removed.
    pub fn cancel_where(&mut self, mut pred: impl FnMut(&K) -> bool) -> usize {
        let before = self.pending.len();
        self.pending.retain(|k, _| !pred(k));
        before - self.pending.len()
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.pending.contains_key(key)
    }

    pub fn next_deadline(&self) -> Option<f64> {
        self.pending
            .values()
            .map(|p| p.deadline)
            .min_by(|a, b| a.total_cmp(b))
    }

    /// Sequence number of the most recently armed timer. Pass it to `pop_due` to
    /// exclude timers armed while the batch runs.
    pub fn watermark(&self) -> u64 {
        self.seq
    }

    /// Take the earliest timer whose deadline has passed and that was armed at or before
    /// `watermark`. Ties fire in scheduling order.
    pub fn pop_due(&mut self, now: f64, watermark: u64) -> Option<(K, T)> {
        let key = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= now && p.seq <= watermark)
            .min_by(|(_, a), (_, b)| a.deadline.total_cmp(&b.deadline).then(a.seq.cmp(&b.seq)))
            .map(|(k, _)| k.clone())?;
        let pending = self.pending.remove(&key)?;
        self.fired += 1;
        Some((key, pending.task))
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Total number of tasks handed out by `pop_due`.
    pub fn fired(&self) -> u64 {
        self.fired
    }
}
