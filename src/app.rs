//! Application orchestrator
//!
//! Wires the store, registry, connectors, engines and emitter together,
//! spawns one task per component, and supervises shutdown: a signal or
//! total venue loss flips the shared watch channel, every loop drains its
//! current work unit, and stragglers are aborted after the grace period.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::timeout;

use crate::connectors::{feed_for, ConnectorDriver};
use crate::emitter::{notify_worker, persist_worker, Emitter, SinkQueue, SINK_CAPACITY};
use crate::engines::{CrossEngine, TriEngine};
use crate::infrastructure::health::MonitorOutcome;
use crate::infrastructure::{Config, HealthMonitor, Metrics};
use crate::notify::notifier_from_config;
use crate::persist::{JsonlStore, OpportunityStore};
use crate::registry::SymbolRegistry;
use crate::rest::RestClient;
use crate::store::BookStore;
use crate::{Error, Result};

/// How the process ended, mapped to an exit code by `main`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    Clean,
    AllVenuesLost,
}

pub struct App {
    config: Config,
}

impl App {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub async fn run(self) -> Result<ExitOutcome> {
        let config = self.config;

        let venues = config.enabled_venues();
        if venues.is_empty() {
            return Err(Error::NoVenues);
        }
        tracing::info!(
            "starting with venues: {}",
            venues.iter().map(|v| v.name()).collect::<Vec<_>>().join(",")
        );

        let metrics = Arc::new(Metrics::new());
        let store = Arc::new(BookStore::new(config.max_staleness));
        let registry = Arc::new(SymbolRegistry::new());
        let fees = Arc::new(config.fees.clone());
        let health = Arc::new(HealthMonitor::new(&venues, Arc::clone(&metrics)));
        let rest = RestClient::new();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (opp_tx, opp_rx) = mpsc::channel(SINK_CAPACITY);

        let mut tasks = JoinSet::new();

        for venue in &venues {
            let feed = feed_for(
                *venue,
                rest.clone(),
                Arc::clone(&registry),
                config.depth_levels,
            );
            let driver = ConnectorDriver::new(
                feed,
                Arc::clone(&store),
                Arc::clone(&registry),
                Arc::clone(&health),
                Arc::clone(&metrics),
                &config,
            );
            tasks.spawn(driver.run(shutdown_rx.clone()));
        }

        let cross = CrossEngine::new(
            Arc::clone(&store),
            Arc::clone(&fees),
            Arc::clone(&metrics),
            &config,
            opp_tx.clone(),
        );
        tasks.spawn(cross.run(shutdown_rx.clone()));

        let tri = TriEngine::new(
            Arc::clone(&store),
            Arc::clone(&fees),
            Arc::clone(&metrics),
            &config,
            opp_tx,
        );
        tasks.spawn(tri.run(shutdown_rx.clone()));

        let persist_queue = Arc::new(SinkQueue::new(SINK_CAPACITY));
        let notify_queue = Arc::new(SinkQueue::new(SINK_CAPACITY));
        let notifier = notifier_from_config(&config);
        let sink: Box<dyn OpportunityStore> = Box::new(JsonlStore::open(&config.db_path).await?);

        tasks.spawn(persist_worker(
            Arc::clone(&persist_queue),
            sink,
            shutdown_rx.clone(),
        ));
        tasks.spawn(notify_worker(
            Arc::clone(&notify_queue),
            Arc::clone(&notifier),
            Arc::clone(&metrics),
            shutdown_rx.clone(),
        ));

        let emitter = Emitter::new(
            config.alert_cooldown,
            Arc::clone(&metrics),
            persist_queue,
            notify_queue,
        );
        tasks.spawn(emitter.run(opp_rx, shutdown_rx.clone()));

        let _ = timeout(Duration::from_secs(10), notifier.send("arbscan started")).await;

        // Run until a signal arrives or every venue goes silent
        let outcome = tokio::select! {
            outcome = health.run(shutdown_rx.clone()) => match outcome {
                MonitorOutcome::AllVenuesLost => ExitOutcome::AllVenuesLost,
                MonitorOutcome::Shutdown => ExitOutcome::Clean,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown signal received");
                ExitOutcome::Clean
            }
        };

        let _ = shutdown_tx.send(true);
        let drained = timeout(config.grace_shutdown, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tracing::warn!(
                "tasks still running after {:?} grace, aborting",
                config.grace_shutdown
            );
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }

        let _ = timeout(Duration::from_secs(10), notifier.send("arbscan stopped")).await;
        Ok(outcome)
    }
}
