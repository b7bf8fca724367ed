//! Translation table: authoritative store of NAT entries and their
//! time-based status.
//!
//! Entries go through a two-phase lifecycle: Active until `entry_timeout`
//! after creation, then Expired (still visible to observers) until
//! `entry_timeout + grace_period`, then hard-deleted by the sweep. Only the
//! sweep mutates an entry's status; everything else reads it.

use super::endpoint::Endpoint;
use crate::{Error, Result};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_ENTRY_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Identifier of a translation entry, unique for the engine's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(pub u64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entry#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    Active,
    Expired,
}

/// A single private-to-public translation and the destination it was opened
/// for.
#[derive(Debug, Clone)]
pub struct TranslationEntry {
    pub id: EntryId,
    pub private: Endpoint,
    pub public: Endpoint,
    pub dest: Endpoint,
    pub created_at: Instant,
    pub status: EntryStatus,
    /// Observational highlight: an inbound response was delivered through
    /// this entry. Never affects status or lifetime.
    pub matched: bool,
}

impl TranslationEntry {
    /// Whether the entry's age is past `timeout`, regardless of whether a
    /// sweep has recorded that yet.
    pub fn expired_by(&self, now: Instant, timeout: Duration) -> bool {
        now.duration_since(self.created_at) > timeout
    }

    /// Time left until expiry, saturating at zero.
    pub fn remaining(&self, now: Instant, timeout: Duration) -> Duration {
        timeout.saturating_sub(now.duration_since(self.created_at))
    }
}

/// Result of one expiration sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepOutcome {
    /// Entries that transitioned Active -> Expired.
    pub expired: Vec<EntryId>,
    /// Entries hard-deleted after the grace period.
    pub evicted: Vec<EntryId>,
}

impl SweepOutcome {
    pub fn is_empty(&self) -> bool {
        self.expired.is_empty() && self.evicted.is_empty()
    }
}

/// Insertion-ordered store of translation entries.
#[derive(Debug)]
pub struct TranslationTable {
    entries: Vec<TranslationEntry>,
    next_id: u64,
    entry_timeout: Duration,
    grace_period: Duration,
}

impl TranslationTable {
    pub fn new(entry_timeout: Duration, grace_period: Duration) -> Self {
        Self {
            entries: Vec::new(),
            next_id: 0,
            entry_timeout,
            grace_period,
        }
    }

    /// Timeout shared by the sweep and the pipeline's fire-time re-check.
    pub fn entry_timeout(&self) -> Duration {
        self.entry_timeout
    }

    /// Insert a new Active entry for the given endpoints.
    ///
    /// A duplicate public port means the allocator contract was violated
    /// upstream; surfaced as `DuplicatePublicPort` rather than silently
    /// shadowing the older mapping.
    pub fn insert(
        &mut self,
        private: Endpoint,
        public: Endpoint,
        dest: Endpoint,
        now: Instant,
    ) -> Result<&TranslationEntry> {
        if self.entries.iter().any(|e| e.public.port == public.port) {
            return Err(Error::DuplicatePublicPort(public.port));
        }

        let id = EntryId(self.next_id);
        self.next_id += 1;

        self.entries.push(TranslationEntry {
            id,
            private,
            public,
            dest,
            created_at: now,
            status: EntryStatus::Active,
            matched: false,
        });
        Ok(self.entries.last().unwrap())
    }

    /// Entry by id, while still in the live set (Active or Expired but not
    /// yet evicted).
    pub fn lookup(&self, id: EntryId) -> Option<&TranslationEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Transition overdue Active entries to Expired and evict entries past
    /// the grace period. Idempotent for a fixed `now`.
    pub fn sweep(&mut self, now: Instant) -> SweepOutcome {
        let mut outcome = SweepOutcome::default();
        let evict_after = self.entry_timeout + self.grace_period;

        for entry in &mut self.entries {
            if entry.status == EntryStatus::Active && entry.expired_by(now, self.entry_timeout) {
                entry.status = EntryStatus::Expired;
                outcome.expired.push(entry.id);
            }
        }

        self.entries.retain(|entry| {
            if entry.expired_by(now, evict_after) {
                outcome.evicted.push(entry.id);
                false
            } else {
                true
            }
        });

        outcome
    }

    /// Manual eviction, independent of timers.
    pub fn remove(&mut self, id: EntryId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        self.entries.len() != before
    }

    /// Remove all entries, returning their ids for observer notification.
    /// The id counter is NOT reset: entry identity stays unique for the
    /// engine's lifetime.
    pub fn clear(&mut self) -> Vec<EntryId> {
        self.entries.drain(..).map(|e| e.id).collect()
    }

    /// Observational highlight on delivered inbound traffic.
    pub fn mark_matched(&mut self, id: EntryId) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) {
            entry.matched = true;
        }
    }

    /// All live entries in insertion order.
    pub fn entries(&self) -> &[TranslationEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for TranslationTable {
    fn default() -> Self {
        Self::new(DEFAULT_ENTRY_TIMEOUT, DEFAULT_GRACE_PERIOD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    fn endpoints() -> (Endpoint, Endpoint, Endpoint) {
        (
            Endpoint::new(Ipv4Addr::new(192, 168, 1, 100), 3456),
            Endpoint::new(Ipv4Addr::new(203, 0, 113, 5), 50000),
            Endpoint::new(Ipv4Addr::new(8, 8, 8, 8), 80),
        )
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut table = TranslationTable::default();
        let (private, public, dest) = endpoints();
        let now = Instant::now();

        let id = table.insert(private, public, dest, now).unwrap().id;

        let entry = table.lookup(id).expect("entry should be live");
        assert_eq!(entry.status, EntryStatus::Active);
        assert_eq!(entry.private, private);
        assert_eq!(entry.public, public);
        assert_eq!(entry.dest, dest);
        assert!(!entry.matched);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_duplicate_public_port_is_rejected() {
        let mut table = TranslationTable::default();
        let (private, public, dest) = endpoints();
        let now = Instant::now();

        table.insert(private, public, dest, now).unwrap();
        let result = table.insert(private, public, dest, now);
        assert!(matches!(result, Err(Error::DuplicatePublicPort(50000))));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_repeated_flow_gets_new_entry() {
        let mut table = TranslationTable::default();
        let (private, public, dest) = endpoints();
        let now = Instant::now();

        let first = table.insert(private, public, dest, now).unwrap().id;
        let second = table
            .insert(private, Endpoint::new(public.ip, 50001), dest, now)
            .unwrap()
            .id;

        // Same (private, dest) pair, distinct entries: per-flow NAT does not
        // coalesce repeated sends.
        assert_ne!(first, second);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_sweep_two_phase_lifecycle() {
        let mut table = TranslationTable::new(secs(30), secs(5));
        let (private, public, dest) = endpoints();
        let t0 = Instant::now();
        let id = table.insert(private, public, dest, t0).unwrap().id;

        // Before the timeout: untouched.
        let outcome = table.sweep(t0 + secs(29));
        assert!(outcome.is_empty());
        assert_eq!(table.lookup(id).unwrap().status, EntryStatus::Active);

        // Past the timeout: Expired but still visible.
        let outcome = table.sweep(t0 + secs(31));
        assert_eq!(outcome.expired, vec![id]);
        assert!(outcome.evicted.is_empty());
        assert_eq!(table.lookup(id).unwrap().status, EntryStatus::Expired);

        // Past timeout + grace: gone for good.
        let outcome = table.sweep(t0 + secs(36));
        assert!(outcome.expired.is_empty());
        assert_eq!(outcome.evicted, vec![id]);
        assert!(table.lookup(id).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_sweep_is_idempotent() {
        let mut table = TranslationTable::new(secs(30), secs(5));
        let (private, public, dest) = endpoints();
        let t0 = Instant::now();
        let id = table.insert(private, public, dest, t0).unwrap().id;

        let t1 = t0 + secs(31);
        let first = table.sweep(t1);
        assert_eq!(first.expired, vec![id]);

        let second = table.sweep(t1);
        assert!(second.is_empty());
        assert_eq!(table.lookup(id).unwrap().status, EntryStatus::Expired);
    }

    #[test]
    fn test_sweep_skips_entry_straight_to_eviction() {
        // A sweep that first runs long after creation both expires and
        // evicts in one pass.
        let mut table = TranslationTable::new(secs(30), secs(5));
        let (private, public, dest) = endpoints();
        let t0 = Instant::now();
        let id = table.insert(private, public, dest, t0).unwrap().id;

        let outcome = table.sweep(t0 + secs(40));
        assert_eq!(outcome.expired, vec![id]);
        assert_eq!(outcome.evicted, vec![id]);
        assert!(table.lookup(id).is_none());
    }

    #[test]
    fn test_remove_and_clear() {
        let mut table = TranslationTable::default();
        let (private, public, dest) = endpoints();
        let now = Instant::now();

        let a = table.insert(private, public, dest, now).unwrap().id;
        let b = table
            .insert(private, Endpoint::new(public.ip, 50001), dest, now)
            .unwrap()
            .id;

        assert!(table.remove(a));
        assert!(!table.remove(a));
        assert!(table.lookup(a).is_none());

        let cleared = table.clear();
        assert_eq!(cleared, vec![b]);
        assert!(table.is_empty());

        // Ids keep advancing after clear.
        let c = table.insert(private, public, dest, now).unwrap().id;
        assert!(c > b);
    }

    #[test]
    fn test_mark_matched_leaves_lifecycle_alone() {
        let mut table = TranslationTable::new(secs(30), secs(5));
        let (private, public, dest) = endpoints();
        let t0 = Instant::now();
        let id = table.insert(private, public, dest, t0).unwrap().id;

        table.mark_matched(id);
        let entry = table.lookup(id).unwrap();
        assert!(entry.matched);
        assert_eq!(entry.status, EntryStatus::Active);

        // Matched entries expire on the same schedule.
        let outcome = table.sweep(t0 + secs(31));
        assert_eq!(outcome.expired, vec![id]);
    }

    #[test]
    fn test_remaining_counts_down() {
        let mut table = TranslationTable::new(secs(30), secs(5));
        let (private, public, dest) = endpoints();
        let t0 = Instant::now();
        let id = table.insert(private, public, dest, t0).unwrap().id;

        let entry = table.lookup(id).unwrap();
        assert_eq!(entry.remaining(t0 + secs(10), secs(30)), secs(20));
        assert_eq!(entry.remaining(t0 + secs(31), secs(30)), Duration::ZERO);
    }

    #[test]
    fn test_entries_in_insertion_order() {
        let mut table = TranslationTable::default();
        let (private, public, dest) = endpoints();
        let now = Instant::now();

        for i in 0..5u16 {
            table
                .insert(private, Endpoint::new(public.ip, 50000 + i), dest, now)
                .unwrap();
        }

        let ids: Vec<u64> = table.entries().iter().map(|e| e.id.0).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    }
}
