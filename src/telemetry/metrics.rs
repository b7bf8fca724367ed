//! Metrics collection for the simulation engine.
//!
//! Thread-safe counters and gauges covering the translation-table lifecycle
//! and packet outcomes. Exported as key-value pairs so a presentation layer
//! (or a future Prometheus exporter) can render them directly.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counter for thread-safe increment operations.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    /// Creates a new counter initialized to zero.
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Increments the counter by 1.
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Adds a value to the counter.
    pub fn add(&self, val: u64) {
        self.0.fetch_add(val, Ordering::Relaxed);
    }

    /// Gets the current value of the counter.
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Global metrics registry for one engine instance.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// Translation entries created by outbound sends.
    pub entries_created: Counter,
    /// Entries the sweep transitioned Active -> Expired.
    pub entries_expired: Counter,
    /// Entries the sweep hard-deleted after the grace period.
    pub entries_evicted: Counter,
    /// Entries removed manually from the presentation boundary.
    pub entries_removed: Counter,
    /// Public ports handed out by the allocator.
    pub ports_allocated: Counter,
    /// Packets (either direction) that reached the Delivered stage.
    pub packets_delivered: Counter,
    /// Inbound responses dropped because their entry was gone or expired.
    pub connections_lost: Counter,
    /// Outbound requests rejected by validation.
    pub requests_rejected: Counter,
    /// Current number of live table entries.
    pub table_size: AtomicU64,
}

impl MetricsRegistry {
    /// Creates a new metrics registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Updates the table size gauge.
    pub fn set_table_size(&self, size: usize) {
        self.table_size.store(size as u64, Ordering::Relaxed);
    }

    /// Exports all metrics as key-value pairs.
    pub fn export(&self) -> Vec<(String, u64)> {
        vec![
            ("entries_created".into(), self.entries_created.get()),
            ("entries_expired".into(), self.entries_expired.get()),
            ("entries_evicted".into(), self.entries_evicted.get()),
            ("entries_removed".into(), self.entries_removed.get()),
            ("ports_allocated".into(), self.ports_allocated.get()),
            ("packets_delivered".into(), self.packets_delivered.get()),
            ("connections_lost".into(), self.connections_lost.get()),
            ("requests_rejected".into(), self.requests_rejected.get()),
            (
                "table_size".into(),
                self.table_size.load(Ordering::Relaxed),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_basic() {
        let counter = Counter::new();
        assert_eq!(counter.get(), 0);

        counter.inc();
        assert_eq!(counter.get(), 1);

        counter.add(10);
        assert_eq!(counter.get(), 11);
    }

    #[test]
    fn test_registry_export() {
        let registry = MetricsRegistry::new();

        registry.entries_created.inc();
        registry.entries_created.inc();
        registry.connections_lost.inc();
        registry.set_table_size(2);

        let metrics = registry.export();
        assert!(metrics.contains(&("entries_created".into(), 2)));
        assert!(metrics.contains(&("connections_lost".into(), 1)));
        assert!(metrics.contains(&("table_size".into(), 2)));
        assert!(metrics.contains(&("packets_delivered".into(), 0)));
    }
}
