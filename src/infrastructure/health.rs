//! Venue health tracking
//!
//! Connectors report activity and state transitions here; a periodic
//! monitor task logs a summary and watches for total venue loss, which is
//! the one data-path fault that escalates to process exit.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::watch;

use crate::core::VenueId;
use crate::infrastructure::Metrics;

/// A venue with no activity for this long counts as lost
const VENUE_LOST_AFTER: Duration = Duration::from_secs(60);
/// Losing every venue for this long ends the process (exit code 3)
const TOTAL_LOSS_LIMIT: Duration = Duration::from_secs(60);
const SUMMARY_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy)]
struct VenueStatus {
    last_activity: Option<Instant>,
    state: &'static str,
}

/// Why the monitor loop returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorOutcome {
    Shutdown,
    AllVenuesLost,
}

/// Tracks per-venue liveness across the process
pub struct HealthMonitor {
    venues: RwLock<HashMap<VenueId, VenueStatus>>,
    metrics: Arc<Metrics>,
    started: Instant,
}

impl HealthMonitor {
    pub fn new(tracked: &[VenueId], metrics: Arc<Metrics>) -> Self {
        let venues = tracked
            .iter()
            .map(|v| {
                (
                    *v,
                    VenueStatus {
                        last_activity: None,
                        state: "init",
                    },
                )
            })
            .collect();

        Self {
            venues: RwLock::new(venues),
            metrics,
            started: Instant::now(),
        }
    }

    /// Called by connectors whenever a venue produces a feed event
    pub fn record_activity(&self, venue: VenueId) {
        if let Some(status) = self.venues.write().get_mut(&venue) {
            status.last_activity = Some(Instant::now());
        }
    }

    /// Called by connectors on state machine transitions
    pub fn set_state(&self, venue: VenueId, state: &'static str) {
        if let Some(status) = self.venues.write().get_mut(&venue) {
            status.state = state;
        }
    }

    /// A venue is healthy while it has produced an event recently
    pub fn healthy(&self, venue: VenueId) -> bool {
        self.venues
            .read()
            .get(&venue)
            .and_then(|s| s.last_activity)
            .map(|t| t.elapsed() < VENUE_LOST_AFTER)
            .unwrap_or(false)
    }

    pub fn healthy_count(&self) -> usize {
        let venues: Vec<VenueId> = self.venues.read().keys().copied().collect();
        venues.into_iter().filter(|v| self.healthy(*v)).count()
    }

    /// Time since any venue last produced an event; measured from monitor
    /// start while nothing has arrived yet
    pub fn time_since_any_activity(&self) -> Duration {
        let latest = self
            .venues
            .read()
            .values()
            .filter_map(|s| s.last_activity)
            .max();
        match latest {
            Some(t) => t.elapsed(),
            None => self.started.elapsed(),
        }
    }

    /// Periodic summary + total-loss watchdog
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> MonitorOutcome {
        let mut ticker = tokio::time::interval(SUMMARY_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.log_summary();
                    if self.time_since_any_activity() > TOTAL_LOSS_LIMIT {
                        tracing::error!(
                            "all venues silent for over {}s, giving up",
                            TOTAL_LOSS_LIMIT.as_secs()
                        );
                        return MonitorOutcome::AllVenuesLost;
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return MonitorOutcome::Shutdown;
                    }
                }
            }
        }
    }

    fn log_summary(&self) {
        let snap = self.metrics.snapshot();
        let venues = self.venues.read();
        let mut parts: Vec<String> = venues
            .iter()
            .map(|(venue, status)| {
                let age = status
                    .last_activity
                    .map(|t| format!("{}s", t.elapsed().as_secs()))
                    .unwrap_or_else(|| "never".to_string());
                format!("{}={}({})", venue, status.state, age)
            })
            .collect();
        parts.sort();

        tracing::info!(
            "health: {} | books={} cross={}/{} tri={}/{} alerts={} suppressed={} dropped={}",
            parts.join(" "),
            snap.books_published,
            snap.cross_found,
            snap.cross_scans,
            snap.tri_found,
            snap.tri_scans,
            snap.alerts_sent,
            snap.alerts_suppressed,
            snap.queue_dropped,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> HealthMonitor {
        HealthMonitor::new(&[VenueId::Binance, VenueId::Bybit], Arc::new(Metrics::new()))
    }

    #[test]
    fn test_initially_unhealthy() {
        let monitor = monitor();
        assert!(!monitor.healthy(VenueId::Binance));
        assert_eq!(monitor.healthy_count(), 0);
    }

    #[test]
    fn test_activity_marks_healthy() {
        let monitor = monitor();
        monitor.record_activity(VenueId::Binance);
        assert!(monitor.healthy(VenueId::Binance));
        assert!(!monitor.healthy(VenueId::Bybit));
        assert_eq!(monitor.healthy_count(), 1);
    }

    #[test]
    fn test_untracked_venue_ignored() {
        let monitor = monitor();
        monitor.record_activity(VenueId::Okx);
        assert!(!monitor.healthy(VenueId::Okx));
    }

    #[test]
    fn test_time_since_any_activity() {
        let monitor = monitor();
        assert!(monitor.time_since_any_activity() < Duration::from_secs(1));
        monitor.record_activity(VenueId::Bybit);
        assert!(monitor.time_since_any_activity() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_run_returns_on_shutdown() {
        let monitor = monitor();
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let monitor = monitor;
            monitor.run(rx).await
        });
        tx.send(true).unwrap();
        assert_eq!(handle.await.unwrap(), MonitorOutcome::Shutdown);
    }
}
