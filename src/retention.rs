//! Retention pruning for check history and hourly aggregates.
//!
//! Raw history is kept for a short window, aggregates for a longer one, so
//! the database stays bounded no matter how many monitors run or for how
//! long. Pruning is idempotent; running it twice in a row deletes nothing
//! the second time.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

use crate::config::RetentionConfig;
use crate::storage::repository::Storage;

const PRUNE_PERIOD: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    pub history_days: i64,
    pub aggregate_days: i64,
}

impl From<&RetentionConfig> for RetentionPolicy {
    fn from(config: &RetentionConfig) -> Self {
        Self { history_days: config.history_days, aggregate_days: config.aggregate_days }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneOutcome {
    pub history_deleted: u64,
    pub aggregates_deleted: u64,
}

pub struct RetentionPruner {
    storage: Arc<dyn Storage>,
    policy: RetentionPolicy,
}

impl RetentionPruner {
    pub fn new(storage: Arc<dyn Storage>, policy: RetentionPolicy) -> Self {
        Self { storage, policy }
    }

    /// Delete everything older than the retention windows
    pub async fn prune_once(&self) -> anyhow::Result<PruneOutcome> {
        let now = Utc::now();
        let history_cutoff = now - chrono::Duration::days(self.policy.history_days);
        let aggregate_cutoff = now - chrono::Duration::days(self.policy.aggregate_days);

        let history_deleted = self.storage.prune_old_history(history_cutoff).await?;
        let aggregates_deleted = self.storage.prune_old_aggregates(aggregate_cutoff).await?;

        if history_deleted > 0 || aggregates_deleted > 0 {
            tracing::info!(
                history_deleted,
                aggregates_deleted,
                "pruned expired monitoring data"
            );
        }

        Ok(PruneOutcome { history_deleted, aggregates_deleted })
    }

    /// Spawn the hourly pruning loop. The first pass runs immediately so a
    /// long-stopped daemon catches up on startup.
    pub fn start_periodic(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut timer = interval(PRUNE_PERIOD);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                timer.tick().await;
                if let Err(e) = self.prune_once().await {
                    tracing::error!("retention pruning failed: {:#}", e);
                }
            }
        })
    }
}
