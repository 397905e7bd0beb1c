//! Partition handles and the capability each backend must provide.
//!
//! A partition is either [`PartitionHandle::Present`] with a [`Backend`] or
//! [`PartitionHandle::Absent`]. Absence is decided once from configuration and
//! every consumer treats it as "contributes nothing".

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::{Config, PartitionConfig};
use crate::error::Result;
use crate::model::Origin;

/// Comparison applied by a [`Filter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Neq,
}

/// Single-field row filter, `{field, op, value}`.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Eq,
            value: value.into(),
        }
    }

    pub fn neq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Neq,
            value: value.into(),
        }
    }

    /// Evaluates the filter against a raw row. A missing field never equals
    /// anything.
    pub fn matches(&self, row: &Map<String, Value>) -> bool {
        let equal = row.get(&self.field) == Some(&self.value);
        match self.op {
            FilterOp::Eq => equal,
            FilterOp::Neq => !equal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Ordering requested from a backend, `{field, direction}`.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub field: String,
    pub direction: Direction,
}

impl Order {
    pub fn descending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Descending,
        }
    }
}

/// A read against one table of one partition.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub table: String,
    pub filter: Option<Filter>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            filter: None,
            order: None,
            limit: None,
        }
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_order(mut self, order: Order) -> Self {
        self.order = Some(order);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Kind of change a backend observed. Live views do not distinguish them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Names the push channel and table a listener is registered on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRequest {
    pub channel: String,
    pub table: String,
}

impl SubscriptionRequest {
    /// Request for `table` on the channel `"{origin}-{table}"`.
    pub fn for_table(origin: Origin, table: &str) -> Self {
        Self {
            channel: format!("{origin}-{table}"),
            table: table.to_string(),
        }
    }
}

/// Sending half of a change listener. Backends call [`ChangeNotifier::notify`]
/// from whatever thread observes the change; it never blocks.
#[derive(Debug, Clone)]
pub struct ChangeNotifier {
    tx: mpsc::UnboundedSender<ChangeKind>,
}

impl ChangeNotifier {
    /// Creates a notifier together with the receiver the listener drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ChangeKind>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Signals a change. Returns `false` once the listener has gone away.
    pub fn notify(&self, kind: ChangeKind) -> bool {
        self.tx.send(kind).is_ok()
    }
}

/// A registered change listener. Unsubscribing more than once is harmless.
pub trait Subscription: Send {
    fn unsubscribe(&mut self);
}

/// Capability a partition backend exposes to the aggregation layer.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Runs a read and returns the matching rows in backend order.
    async fn query(&self, query: &Query) -> Result<Vec<Map<String, Value>>>;

    /// Registers `notifier` to be signalled on any change to `request.table`.
    async fn subscribe(
        &self,
        request: &SubscriptionRequest,
        notifier: ChangeNotifier,
    ) -> Result<Box<dyn Subscription>>;
}

/// Builds a backend from a partition's endpoint and key.
pub trait Connector {
    fn connect(&self, origin: Origin, endpoint: &str, key: &str) -> Result<Arc<dyn Backend>>;
}

/// Connection state of a partition, fixed for the lifetime of the process.
#[derive(Clone)]
pub enum PartitionHandle {
    Present(Arc<dyn Backend>),
    Absent,
}

impl PartitionHandle {
    /// Resolves a partition from configuration. Missing configuration and
    /// connector failures both yield [`PartitionHandle::Absent`].
    pub fn connect(origin: Origin, config: &PartitionConfig, connector: &dyn Connector) -> Self {
        if !config.is_configured() {
            debug!(%origin, "partition not configured");
            return PartitionHandle::Absent;
        }

        match connector.connect(origin, &config.endpoint, &config.key) {
            Ok(backend) => {
                debug!(%origin, "partition connected");
                PartitionHandle::Present(backend)
            }
            Err(error) => {
                warn!(%origin, %error, "partition unavailable, continuing without it");
                PartitionHandle::Absent
            }
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, PartitionHandle::Present(_))
    }
}

impl fmt::Debug for PartitionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionHandle::Present(_) => f.write_str("Present"),
            PartitionHandle::Absent => f.write_str("Absent"),
        }
    }
}

/// Both partitions, held in aggregation order.
#[derive(Debug, Clone)]
pub struct PartitionSet {
    handles: [(Origin, PartitionHandle); 2],
}

impl PartitionSet {
    pub fn new(alec: PartitionHandle, nate: PartitionHandle) -> Self {
        Self {
            handles: [(Origin::Alec, alec), (Origin::Nate, nate)],
        }
    }

    /// A set where neither partition is configured.
    pub fn empty() -> Self {
        Self::new(PartitionHandle::Absent, PartitionHandle::Absent)
    }

    pub fn from_config(config: &Config, connector: &dyn Connector) -> Self {
        Self::new(
            PartitionHandle::connect(Origin::Alec, &config.alec, connector),
            PartitionHandle::connect(Origin::Nate, &config.nate, connector),
        )
    }

    pub fn handle(&self, origin: Origin) -> &PartitionHandle {
        match origin {
            Origin::Alec => &self.handles[0].1,
            Origin::Nate => &self.handles[1].1,
        }
    }

    /// Present partitions in aggregation order.
    pub fn present(&self) -> impl Iterator<Item = (Origin, &Arc<dyn Backend>)> {
        self.handles.iter().filter_map(|(origin, handle)| match handle {
            PartitionHandle::Present(backend) => Some((*origin, backend)),
            PartitionHandle::Absent => None,
        })
    }
}
