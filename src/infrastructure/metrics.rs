//! Metrics collection
//!
//! Lock-free counters updated from the data path, snapshotted by the
//! health monitor for periodic logging.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::core::VenueId;

const VENUES: usize = VenueId::ALL.len();

/// Process-wide counters
pub struct Metrics {
    /// Feed events per venue
    messages: [AtomicU64; VENUES],
    /// Reconnect attempts per venue
    reconnects: [AtomicU64; VENUES],
    /// Snapshots accepted into the book store
    books_published: AtomicU64,
    cross_scans: AtomicU64,
    tri_scans: AtomicU64,
    cross_found: AtomicU64,
    tri_found: AtomicU64,
    alerts_sent: AtomicU64,
    alerts_suppressed: AtomicU64,
    /// Records displaced from bounded emitter queues
    queue_dropped: AtomicU64,
    start: Instant,
}

/// Point-in-time copy for logging and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub messages: [u64; VENUES],
    pub reconnects: [u64; VENUES],
    pub books_published: u64,
    pub cross_scans: u64,
    pub tri_scans: u64,
    pub cross_found: u64,
    pub tri_found: u64,
    pub alerts_sent: u64,
    pub alerts_suppressed: u64,
    pub queue_dropped: u64,
    pub uptime_secs: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            messages: Default::default(),
            reconnects: Default::default(),
            books_published: AtomicU64::new(0),
            cross_scans: AtomicU64::new(0),
            tri_scans: AtomicU64::new(0),
            cross_found: AtomicU64::new(0),
            tri_found: AtomicU64::new(0),
            alerts_sent: AtomicU64::new(0),
            alerts_suppressed: AtomicU64::new(0),
            queue_dropped: AtomicU64::new(0),
            start: Instant::now(),
        }
    }

    #[inline]
    pub fn record_message(&self, venue: VenueId) {
        self.messages[venue.index()].fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_reconnect(&self, venue: VenueId) {
        self.reconnects[venue.index()].fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_book_published(&self) {
        self.books_published.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_cross_scan(&self) {
        self.cross_scans.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_tri_scan(&self) {
        self.tri_scans.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_cross_found(&self) {
        self.cross_found.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_tri_found(&self) {
        self.tri_found.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_alert_sent(&self) {
        self.alerts_sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_alert_suppressed(&self) {
        self.alerts_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_queue_dropped(&self) {
        self.queue_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |arr: &[AtomicU64; VENUES]| {
            let mut out = [0u64; VENUES];
            for (slot, counter) in out.iter_mut().zip(arr.iter()) {
                *slot = counter.load(Ordering::Relaxed);
            }
            out
        };

        MetricsSnapshot {
            messages: load(&self.messages),
            reconnects: load(&self.reconnects),
            books_published: self.books_published.load(Ordering::Relaxed),
            cross_scans: self.cross_scans.load(Ordering::Relaxed),
            tri_scans: self.tri_scans.load(Ordering::Relaxed),
            cross_found: self.cross_found.load(Ordering::Relaxed),
            tri_found: self.tri_found.load(Ordering::Relaxed),
            alerts_sent: self.alerts_sent.load(Ordering::Relaxed),
            alerts_suppressed: self.alerts_suppressed.load(Ordering::Relaxed),
            queue_dropped: self.queue_dropped.load(Ordering::Relaxed),
            uptime_secs: self.start.elapsed().as_secs(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
