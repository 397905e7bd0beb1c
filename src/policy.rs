//! Per-entity-type combining policies consumed by the aggregator.

use crate::model::{EntityType, Origin};
use crate::partition::{Filter, Order, Query};

/// Number of feed items fetched per partition and kept overall.
pub const FEED_LIMIT: usize = 50;
/// Timestamp field the feed is ordered by.
pub const FEED_TIMESTAMP_FIELD: &str = "created_at";
/// Field and value selecting the engineers partition A manages.
pub const MANAGER_FIELD: &str = "manager";
pub const MANAGED_BY: &str = "jarvis";

/// How one entity type is queried per partition and combined afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityPolicy {
    pub entity: EntityType,
    /// Filter applied only to partition A.
    pub alec_filter: Option<Filter>,
    /// Field the combined collection is re-sorted by, newest first.
    pub sort_key: Option<&'static str>,
    pub cap_per_partition: Option<usize>,
    pub cap_global: Option<usize>,
}

impl EntityPolicy {
    pub fn for_entity(entity: EntityType) -> Self {
        match entity {
            EntityType::Engineers => Self {
                entity,
                alec_filter: Some(Filter::eq(MANAGER_FIELD, MANAGED_BY)),
                sort_key: None,
                cap_per_partition: None,
                cap_global: None,
            },
            EntityType::Tasks => Self {
                entity,
                alec_filter: None,
                sort_key: None,
                cap_per_partition: None,
                cap_global: None,
            },
            EntityType::Feed => Self {
                entity,
                alec_filter: None,
                sort_key: Some(FEED_TIMESTAMP_FIELD),
                cap_per_partition: Some(FEED_LIMIT),
                cap_global: Some(FEED_LIMIT),
            },
        }
    }

    pub fn filter_for(&self, origin: Origin) -> Option<&Filter> {
        match origin {
            Origin::Alec => self.alec_filter.as_ref(),
            Origin::Nate => None,
        }
    }

    /// Builds the query issued to `origin`'s partition.
    pub fn query_for(&self, origin: Origin) -> Query {
        let mut query = Query::table(self.entity.table());
        if let Some(filter) = self.filter_for(origin) {
            query = query.with_filter(filter.clone());
        }
        if let Some(key) = self.sort_key {
            query = query.with_order(Order::descending(key));
        }
        if let Some(limit) = self.cap_per_partition {
            query = query.with_limit(limit);
        }
        query
    }
}
