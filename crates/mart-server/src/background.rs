//! Persistence wiring and periodic background tasks.

use crate::config::PersistConfig;
use crate::handlers::{AppState, StatsResponse};
use crate::metrics;
use anyhow::{Context, Result};
use mart_core::{
    now_nanos, Durability, DurabilitySink, Registry, SinkQueue, SinkStats, SinkWorker,
};
use mart_store::SqliteSink;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// How often gauges are refreshed.
const METRICS_INTERVAL: Duration = Duration::from_secs(5);

/// The SQLite sink with its queue and writer task.
pub struct Persistence {
    sink: Arc<SqliteSink>,
    queue: Arc<SinkQueue>,
    worker: JoinHandle<SinkStats>,
    failures: Arc<AtomicU64>,
}

impl Persistence {
    /// Open the database and start the writer.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub async fn open(config: &PersistConfig) -> Result<Self> {
        let sink = Arc::new(
            SqliteSink::open(&config.path)
                .await
                .with_context(|| format!("Failed to open database: {}", config.path.display()))?,
        );
        let queue = Arc::new(SinkQueue::new(config.queue_capacity, config.overflow));
        let worker = SinkWorker::new(Arc::clone(&queue), sink.clone())
            .with_retry(config.retry.to_policy());
        let failures = worker.failures();

        info!(
            path = %config.path.display(),
            queue_capacity = queue.capacity(),
            overflow = ?queue.policy(),
            "Persistence enabled"
        );

        Ok(Self {
            sink,
            queue,
            worker: worker.spawn(),
            failures,
        })
    }

    /// Durability handle for the registry.
    #[must_use]
    pub fn durability(&self) -> Durability {
        Durability::new(Arc::clone(&self.queue))
    }

    /// Counter of events the writer gave up on.
    #[must_use]
    pub fn failures(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.failures)
    }

    /// Replay stored rows into `registry`, purging expired ones first.
    ///
    /// # Errors
    ///
    /// Returns an error if the rows cannot be read.
    pub async fn restore(&self, registry: &Registry) -> Result<usize> {
        let rows = self
            .sink
            .load(now_nanos())
            .await
            .context("Failed to load persisted channels")?;
        Ok(registry.restore(rows))
    }

    /// Stop accepting events and wait for queued ones to be written.
    pub async fn shutdown(self) -> SinkStats {
        self.queue.close();
        match self.worker.await {
            Ok(stats) => stats,
            Err(e) => {
                warn!(error = %e, "Durability worker did not finish cleanly");
                SinkStats::default()
            }
        }
    }
}

/// Spawn a task running `tick` every `every` until shutdown.
fn spawn_periodic<F>(every: Duration, mut shutdown: watch::Receiver<bool>, mut tick: F) -> JoinHandle<()>
where
    F: FnMut() + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => tick(),
                _ = shutdown.changed() => break,
            }
        }
    })
}

/// Periodically evict messages whose retention has elapsed.
pub fn spawn_sweeper(
    registry: Arc<Registry>,
    every: Duration,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    info!(?every, "Expiry sweeper enabled");
    spawn_periodic(every, shutdown, move || {
        let swept = registry.sweep_expired(now_nanos());
        if swept > 0 {
            debug!(swept, "Expiry sweep");
        }
    })
}

/// Periodically refresh registry gauges and the sink failure counter.
pub fn spawn_metrics_reporter(state: Arc<AppState>, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    let mut reported_failures = 0;
    spawn_periodic(METRICS_INTERVAL, shutdown, move || {
        metrics::record_registry(&state.registry.stats());
        let failures = StatsResponse::collect(&state).sink_failures;
        metrics::record_sink_failures(failures.saturating_sub(reported_failures));
        reported_failures = failures;
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mart_core::ChannelConfig;

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_evicts_and_stops() {
        let registry = Arc::new(Registry::new());
        let config = ChannelConfig::new(4).with_life(Duration::from_nanos(1));
        let channel = registry.get_or_create("old", config);
        channel.restore(mart_core::Message::new("stale", 1));

        let (shutdown, rx) = watch::channel(false);
        let task = spawn_sweeper(Arc::clone(&registry), Duration::from_millis(10), rx);

        tokio::time::sleep(Duration::from_millis(25)).await;
        assert!(channel.is_empty());

        shutdown.send_replace(true);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_persistence_round_trip() {
        let path = std::env::temp_dir().join(format!("martd-test-{}.db", std::process::id()));
        let _ = std::fs::remove_file(&path);
        let config = PersistConfig {
            path: path.clone(),
            ..PersistConfig::default()
        };

        let persistence = Persistence::open(&config).await.unwrap();
        let registry = Registry::with_durability(persistence.durability());
        let channel = registry.get_or_create("kept", ChannelConfig::new(2));
        let marker = channel.publish("payload").await.unwrap();
        let stats = persistence.shutdown().await;
        assert_eq!(stats.applied, 1);

        let reopened = Persistence::open(&config).await.unwrap();
        let restored = Registry::new();
        assert_eq!(reopened.restore(&restored).await.unwrap(), 1);
        assert_eq!(restored.lookup("kept").unwrap().latest_marker().unwrap(), marker);
        reopened.shutdown().await;
        let _ = std::fs::remove_file(&path);
    }
}
