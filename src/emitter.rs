//! Opportunity emitter
//!
//! Terminal stage of the pipeline: deduplicates detections against a
//! cooldown window, assigns monotonic ids, and fans surviving
//! opportunities out to the persistence and notifier sinks. Both sinks
//! sit behind bounded drop-oldest queues so a slow Telegram call or disk
//! stall can never back up into the engines.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_queue::ArrayQueue;
use tokio::sync::{mpsc, watch, Notify};
use tokio::time::timeout;

use crate::core::Opportunity;
use crate::infrastructure::Metrics;
use crate::notify::{format_opportunity, Notifier};
use crate::persist::{OpportunityRecord, OpportunityStore};

/// Capacity of each sink queue
pub const SINK_CAPACITY: usize = 1024;
/// Per-attempt notifier timeout
const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);
/// Notifier delivery attempts before the alert is dropped
const NOTIFY_ATTEMPTS: u32 = 3;
/// Dedup map is pruned past this size
const DEDUP_PRUNE_LEN: usize = 4096;

/// Cooldown-keyed suppression of repeated detections
pub struct DedupCache {
    seen: HashMap<String, Instant>,
    cooldown: Duration,
}

impl DedupCache {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            seen: HashMap::new(),
            cooldown,
        }
    }

    /// True exactly when the key has not fired within the cooldown window
    pub fn allow(&mut self, key: &str) -> bool {
        let now = Instant::now();

        if let Some(last) = self.seen.get(key) {
            if now.duration_since(*last) < self.cooldown {
                return false;
            }
        }

        if self.seen.len() >= DEDUP_PRUNE_LEN {
            let cooldown = self.cooldown;
            self.seen.retain(|_, last| now.duration_since(*last) < cooldown);
        }

        self.seen.insert(key.to_string(), now);
        true
    }
}

/// Bounded drop-oldest queue between the emitter and one sink
pub struct SinkQueue<T> {
    queue: ArrayQueue<T>,
    ready: Notify,
    dropped: AtomicU64,
}

impl<T> SinkQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity),
            ready: Notify::new(),
            dropped: AtomicU64::new(0),
        }
    }

    /// Push, displacing the oldest entry when full; never blocks
    pub fn push(&self, item: T) -> bool {
        let displaced = self.queue.force_push(item).is_some();
        if displaced {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.ready.notify_one();
        displaced
    }

    pub fn try_pop(&self) -> Option<T> {
        self.queue.pop()
    }

    /// Wait for the next item
    pub async fn recv(&self) -> T {
        loop {
            if let Some(item) = self.queue.pop() {
                return item;
            }
            self.ready.notified().await;
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// Dedup + dispatch stage
pub struct Emitter {
    dedup: DedupCache,
    metrics: Arc<Metrics>,
    next_id: u64,
    persist_queue: Arc<SinkQueue<OpportunityRecord>>,
    notify_queue: Arc<SinkQueue<String>>,
}

impl Emitter {
    pub fn new(
        cooldown: Duration,
        metrics: Arc<Metrics>,
        persist_queue: Arc<SinkQueue<OpportunityRecord>>,
        notify_queue: Arc<SinkQueue<String>>,
    ) -> Self {
        Self {
            dedup: DedupCache::new(cooldown),
            metrics,
            next_id: 1,
            persist_queue,
            notify_queue,
        }
    }

    /// Consume engine output until shutdown
    pub async fn run(
        mut self,
        mut rx: mpsc::Receiver<Opportunity>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        tracing::info!("emitter started");
        loop {
            tokio::select! {
                opportunity = rx.recv() => {
                    match opportunity {
                        Some(opp) => self.handle(opp),
                        None => break,
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("emitter stopped");
    }

    /// Dedup one opportunity and enqueue it for both sinks
    pub fn handle(&mut self, opportunity: Opportunity) {
        let key = opportunity.dedup_key();
        if !self.dedup.allow(&key) {
            self.metrics.record_alert_suppressed();
            return;
        }

        let id = self.next_id;
        self.next_id += 1;

        tracing::info!(
            "opportunity #{}: {} net {} bps",
            id,
            key,
            opportunity.net_bps().round_dp(2)
        );

        let text = format_opportunity(&opportunity, id);
        if self.persist_queue.push(OpportunityRecord::new(id, opportunity)) {
            self.metrics.record_queue_dropped();
        }
        if self.notify_queue.push(text) {
            self.metrics.record_queue_dropped();
        }
    }
}

/// Drain the persistence queue into the store
///
/// Write errors are logged and the record dropped; the queue keeps
/// moving. On shutdown the backlog is flushed (the caller bounds the
/// flush with the grace timeout).
pub async fn persist_worker(
    queue: Arc<SinkQueue<OpportunityRecord>>,
    mut store: Box<dyn OpportunityStore>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            record = queue.recv() => {
                if let Err(e) = store.append(&record).await {
                    tracing::error!("persist failed for #{}: {}", record.id, e);
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    while let Some(record) = queue.try_pop() {
        if let Err(e) = store.append(&record).await {
            tracing::error!("persist failed for #{}: {}", record.id, e);
        }
    }
}

/// Drain the notify queue into the notifier, at-most-once per alert
pub async fn notify_worker(
    queue: Arc<SinkQueue<String>>,
    notifier: Arc<dyn Notifier>,
    metrics: Arc<Metrics>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let text = tokio::select! {
            text = queue.recv() => text,
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
                continue;
            }
        };

        if deliver(&*notifier, &text).await {
            metrics.record_alert_sent();
        }
    }
}

/// Up to three attempts with exponential spacing, then drop
async fn deliver(notifier: &dyn Notifier, text: &str) -> bool {
    for attempt in 0..NOTIFY_ATTEMPTS {
        if attempt > 0 {
            tokio::time::sleep(Duration::from_secs(1u64 << (attempt - 1))).await;
        }
        match timeout(NOTIFY_TIMEOUT, notifier.send(text)).await {
            Ok(Ok(())) => return true,
            Ok(Err(e)) => tracing::warn!("notify attempt {} failed: {}", attempt + 1, e),
            Err(_) => tracing::warn!("notify attempt {} timed out", attempt + 1),
        }
    }
    tracing::error!("alert dropped after {} attempts", NOTIFY_ATTEMPTS);
    false
}
