use tracing::instrument;

use crate::aggregate::Aggregator;
use crate::config::Config;
use crate::live::{LiveView, LiveViewHandle};
use crate::model::{EntityType, Record, TaskCounts};
use crate::partition::{Connector, PartitionSet};

/// Unified read and live-sync access to both partitions.
#[derive(Debug, Clone)]
pub struct DualSource {
    aggregator: Aggregator,
}

impl DualSource {
    pub fn new(partitions: PartitionSet) -> Self {
        Self {
            aggregator: Aggregator::new(partitions),
        }
    }

    /// Connects both partitions from `config`. Unconfigured or unreachable
    /// partitions are left absent.
    pub fn from_config(config: &Config, connector: &dyn Connector) -> Self {
        Self::new(PartitionSet::from_config(config, connector))
    }

    /// Connects both partitions from the process environment.
    pub fn from_env(connector: &dyn Connector) -> Self {
        Self::from_config(&Config::from_env(), connector)
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    /// Engineers managed by partition A followed by every engineer of
    /// partition B.
    pub async fn get_all_engineers(&self) -> Vec<Record> {
        self.aggregator.aggregate(EntityType::Engineers).await
    }

    /// Every task of both partitions, partition A first.
    pub async fn get_all_tasks(&self) -> Vec<Record> {
        self.aggregator.aggregate(EntityType::Tasks).await
    }

    /// Status counts per partition and in total.
    pub async fn get_task_counts(&self) -> TaskCounts {
        self.aggregator.tally(EntityType::Tasks).await
    }

    /// The 50 newest feed items across both partitions, newest first.
    pub async fn get_all_feed(&self) -> Vec<Record> {
        self.aggregator.aggregate(EntityType::Feed).await
    }

    /// Activates a live view over `entity`.
    #[instrument(level = "debug", skip(self, callback))]
    pub async fn subscribe<F>(&self, entity: EntityType, callback: F) -> LiveViewHandle
    where
        F: Fn(Vec<Record>) + Send + Sync + 'static,
    {
        LiveView::new(self.aggregator.clone(), entity, callback)
            .activate()
            .await
    }

    pub async fn subscribe_to_engineers<F>(&self, callback: F) -> LiveViewHandle
    where
        F: Fn(Vec<Record>) + Send + Sync + 'static,
    {
        self.subscribe(EntityType::Engineers, callback).await
    }

    pub async fn subscribe_to_tasks<F>(&self, callback: F) -> LiveViewHandle
    where
        F: Fn(Vec<Record>) + Send + Sync + 'static,
    {
        self.subscribe(EntityType::Tasks, callback).await
    }

    pub async fn subscribe_to_feed<F>(&self, callback: F) -> LiveViewHandle
    where
        F: Fn(Vec<Record>) + Send + Sync + 'static,
    {
        self.subscribe(EntityType::Feed, callback).await
    }
}
