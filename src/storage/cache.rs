use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use uuid::Uuid;

use crate::model::Discussion;

/// Loaded aggregates keyed by discussion id, invalidated on every write to
/// that id.
///
/// Writers stamp the id with a fresh generation from a shared clock. A
/// reader takes a ticket before loading and only keeps its snapshot if no
/// write to that id landed after the ticket, so a slow reader can never
/// resurrect pre-write state. Old write stamps are folded into `floor`,
/// which is conservative for every id.
pub struct DiscussionCache {
    entries: DashMap<Uuid, Discussion>,
    written: DashMap<Uuid, u64>,
    clock: AtomicU64,
    floor: AtomicU64,
    capacity: usize,
}

impl DiscussionCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            written: DashMap::new(),
            clock: AtomicU64::new(0),
            floor: AtomicU64::new(0),
            capacity,
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<Discussion> {
        self.entries.get(id).map(|d| d.clone())
    }

    /// Ticket to pass to [`insert_if_current`](Self::insert_if_current)
    pub fn ticket(&self) -> u64 {
        self.clock.load(Ordering::SeqCst)
    }

    pub fn insert_if_current(&self, discussion: Discussion, ticket: u64) {
        if self.capacity == 0 || self.written_after(&discussion.id, ticket) {
            return;
        }

        let id = discussion.id;
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&id) {
            self.evict_one();
        }
        self.entries.insert(id, discussion);

        // A write may have stamped the id between the check and the insert;
        // it removed nothing then, so take the snapshot back out.
        if self.written_after(&id, ticket) {
            self.entries.remove(&id);
        }
    }

    pub fn invalidate(&self, id: &Uuid) {
        let generation = self.clock.fetch_add(1, Ordering::SeqCst) + 1;
        self.written.insert(*id, generation);
        self.entries.remove(id);

        if self.written.len() > self.capacity.max(1) * 2 {
            self.fold_write_stamps();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn written_after(&self, id: &Uuid, ticket: u64) -> bool {
        let stamp = self
            .written
            .get(id)
            .map(|g| *g)
            .unwrap_or_else(|| self.floor.load(Ordering::SeqCst));
        stamp > ticket
    }

    fn evict_one(&self) {
        let victim = self.entries.iter().next().map(|entry| *entry.key());
        if let Some(victim) = victim {
            self.entries.remove(&victim);
        }
    }

    fn fold_write_stamps(&self) {
        let cutoff = self.written.iter().map(|g| *g.value()).max().unwrap_or(0);
        // Raise the floor before dropping stamps so no check sees neither
        self.floor.fetch_max(cutoff, Ordering::SeqCst);
        self.written.retain(|_, generation| *generation > cutoff);
    }
}
