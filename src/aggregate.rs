//! Runs one logical query across both partitions and combines the results.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tracing::{debug, info, instrument, warn};

use crate::model::{EntityType, Origin, Record, STATUS_FIELD, TaskCounts, TaskStatus};
use crate::partition::{Backend, PartitionSet, Query};
use crate::policy::EntityPolicy;

/// Aggregates entity collections across every present partition.
///
/// Cloning is cheap; clones share the same partition handles.
#[derive(Debug, Clone)]
pub struct Aggregator {
    partitions: Arc<PartitionSet>,
}

impl Aggregator {
    pub fn new(partitions: PartitionSet) -> Self {
        Self {
            partitions: Arc::new(partitions),
        }
    }

    pub fn partitions(&self) -> &PartitionSet {
        &self.partitions
    }

    /// Aggregates `entity` using its standard policy.
    #[instrument(level = "info", skip_all, fields(%entity))]
    pub async fn aggregate(&self, entity: EntityType) -> Vec<Record> {
        let policy = EntityPolicy::for_entity(entity);
        let records = self.aggregate_with(&policy).await;
        info!(record_count = records.len(), "aggregated records");
        records
    }

    /// Queries every present partition concurrently and combines the rows
    /// according to `policy`.
    ///
    /// Output is ordered by partition, never by completion. A partition whose
    /// query fails or panics contributes no records. Each partition's rows are
    /// re-sorted and capped locally as well, so a backend that ignores the
    /// requested order or limit cannot widen its share.
    pub async fn aggregate_with(&self, policy: &EntityPolicy) -> Vec<Record> {
        let fetches = self.partitions.present().map(|(origin, backend)| {
            let backend = Arc::clone(backend);
            let query = policy.query_for(origin);
            let table = query.table.clone();
            let task = tokio::spawn(async move { fetch_partition(origin, backend, query).await });
            async move {
                match task.await {
                    Ok(records) => cap_partition(policy, records),
                    Err(error) => {
                        warn!(%origin, %table, %error, "partition query aborted, contributing no records");
                        Vec::new()
                    }
                }
            }
        });

        let records = join_all(fetches).await.into_iter().flatten().collect();
        combine(policy, records)
    }

    /// Aggregates `entity` and folds each record's `status` into per-partition
    /// and total counters. Unrecognised or missing statuses are skipped.
    #[instrument(level = "info", skip_all, fields(%entity))]
    pub async fn tally(&self, entity: EntityType) -> TaskCounts {
        let records = self.aggregate(entity).await;
        tally_records(&records)
    }
}

async fn fetch_partition(origin: Origin, backend: Arc<dyn Backend>, query: Query) -> Vec<Record> {
    match backend.query(&query).await {
        Ok(rows) => {
            debug!(%origin, table = %query.table, row_count = rows.len(), "partition query returned");
            rows.into_iter()
                .map(|row| Record::tagged(row, origin))
                .collect()
        }
        Err(error) => {
            warn!(%origin, table = %query.table, %error, "partition query failed, contributing no records");
            Vec::new()
        }
    }
}

/// Applies the per-partition re-sort and cap of `policy` to one partition's
/// rows.
fn cap_partition(policy: &EntityPolicy, records: Vec<Record>) -> Vec<Record> {
    let Some(cap) = policy.cap_per_partition else {
        return records;
    };
    let mut records = match policy.sort_key {
        Some(key) => sort_newest_first(records, key),
        None => records,
    };
    records.truncate(cap);
    records
}

/// Applies the global re-sort and cap of `policy` to the concatenated rows.
fn combine(policy: &EntityPolicy, records: Vec<Record>) -> Vec<Record> {
    let mut records = match policy.sort_key {
        Some(key) => sort_newest_first(records, key),
        None => records,
    };
    if let Some(cap) = policy.cap_global {
        records.truncate(cap);
    }
    records
}

/// Stable sort by `key`, newest first. Records without a readable timestamp
/// are dropped from the result.
fn sort_newest_first(records: Vec<Record>, key: &str) -> Vec<Record> {
    let total = records.len();
    let mut keyed: Vec<(DateTime<Utc>, Record)> = records
        .into_iter()
        .filter_map(|record| record.timestamp(key).map(|at| (at, record)))
        .collect();
    if keyed.len() < total {
        debug!(skipped = total - keyed.len(), key, "records without timestamp excluded");
    }
    keyed.sort_by(|lhs, rhs| rhs.0.cmp(&lhs.0));
    keyed.into_iter().map(|(_, record)| record).collect()
}

/// Builds a status tally from already aggregated records.
pub fn tally_records(records: &[Record]) -> TaskCounts {
    let mut counts = TaskCounts::default();
    for record in records {
        let Some(origin) = record.origin() else {
            continue;
        };
        let status = record
            .get(STATUS_FIELD)
            .and_then(|value| value.as_str())
            .and_then(TaskStatus::parse);
        if let Some(status) = status {
            counts.record(origin, status);
        }
    }
    counts
}
