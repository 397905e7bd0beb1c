//! In-process partition backend.
//!
//! Holds tables of JSON rows, evaluates [`Query`] filters, ordering and limits
//! the way a hosted backend would, and signals registered listeners on every
//! write. Failures and latency can be injected to exercise degraded paths.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use crate::error::{Result, SyncError};
use crate::model::{Origin, parse_timestamp};
use crate::partition::{
    Backend, ChangeKind, ChangeNotifier, Direction, Filter, Query, Subscription,
    SubscriptionRequest,
};

pub type Row = Map<String, Value>;

#[derive(Default)]
struct State {
    tables: BTreeMap<String, Vec<Row>>,
    listeners: HashMap<Uuid, Listener>,
    fail_queries: bool,
    fail_subscriptions: bool,
    query_delay: Option<Duration>,
    query_count: usize,
}

struct Listener {
    channel: String,
    table: String,
    notifier: ChangeNotifier,
}

/// Shared in-memory backend. Clones refer to the same tables and listeners.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    origin: Option<Origin>,
    state: Arc<Mutex<State>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Labels errors raised by this backend with `origin`.
    pub fn for_origin(origin: Origin) -> Self {
        Self {
            origin: Some(origin),
            state: Arc::default(),
        }
    }

    /// Replaces the contents of `table` without notifying listeners.
    pub fn with_rows(self, table: &str, rows: Vec<Row>) -> Self {
        self.lock().tables.insert(table.to_string(), rows);
        self
    }

    /// Appends a row and notifies listeners of `table`.
    pub fn insert(&self, table: &str, row: Row) {
        self.lock()
            .tables
            .entry(table.to_string())
            .or_default()
            .push(row);
        self.notify(table, ChangeKind::Insert);
    }

    /// Merges `patch` into every row matching `filter`. Returns the number of
    /// rows touched; listeners are notified only when it is non-zero.
    pub fn update_where(&self, table: &str, filter: &Filter, patch: &Row) -> usize {
        let touched = {
            let mut state = self.lock();
            let rows = state.tables.entry(table.to_string()).or_default();
            let mut touched = 0;
            for row in rows.iter_mut().filter(|row| filter.matches(row)) {
                for (field, value) in patch {
                    row.insert(field.clone(), value.clone());
                }
                touched += 1;
            }
            touched
        };
        if touched > 0 {
            self.notify(table, ChangeKind::Update);
        }
        touched
    }

    /// Removes every row matching `filter`, notifying listeners when any row
    /// was removed.
    pub fn delete_where(&self, table: &str, filter: &Filter) -> usize {
        let removed = {
            let mut state = self.lock();
            let rows = state.tables.entry(table.to_string()).or_default();
            let before = rows.len();
            rows.retain(|row| !filter.matches(row));
            before - rows.len()
        };
        if removed > 0 {
            self.notify(table, ChangeKind::Delete);
        }
        removed
    }

    /// Signals every listener on `table`. Listeners whose receiver is gone
    /// are dropped.
    pub fn notify(&self, table: &str, kind: ChangeKind) {
        let mut state = self.lock();
        state.listeners.retain(|_, listener| {
            if listener.table != table {
                return true;
            }
            listener.notifier.notify(kind)
        });
    }

    pub fn set_fail_queries(&self, fail: bool) {
        self.lock().fail_queries = fail;
    }

    pub fn set_fail_subscriptions(&self, fail: bool) {
        self.lock().fail_subscriptions = fail;
    }

    /// Delays every subsequent query by `delay`.
    pub fn set_query_delay(&self, delay: Option<Duration>) {
        self.lock().query_delay = delay;
    }

    pub fn query_count(&self) -> usize {
        self.lock().query_count
    }

    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    /// Channels of the registered listeners, sorted.
    pub fn channels(&self) -> Vec<String> {
        let mut channels: Vec<String> = self
            .lock()
            .listeners
            .values()
            .map(|listener| listener.channel.clone())
            .collect();
        channels.sort();
        channels
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run_query(&self, query: &Query) -> Result<Vec<Row>> {
        let mut state = self.lock();
        state.query_count += 1;
        if state.fail_queries {
            return Err(SyncError::Query {
                origin: self.origin.unwrap_or(Origin::Alec),
                table: query.table.clone(),
                reason: "backend unavailable".to_string(),
            });
        }

        let mut rows: Vec<Row> = state
            .tables
            .get(&query.table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| query.filter.as_ref().is_none_or(|filter| filter.matches(row)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        drop(state);

        if let Some(order) = &query.order {
            rows.sort_by(|lhs, rhs| {
                let ordering = compare_fields(lhs.get(&order.field), rhs.get(&order.field));
                match order.direction {
                    Direction::Ascending => ordering,
                    Direction::Descending => ordering.reverse(),
                }
            });
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }
}

impl fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("MemoryBackend")
            .field("origin", &self.origin)
            .field("tables", &state.tables.keys().collect::<Vec<_>>())
            .field("listeners", &state.listeners.len())
            .finish()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn query(&self, query: &Query) -> Result<Vec<Row>> {
        let delay = self.lock().query_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.run_query(query)
    }

    async fn subscribe(
        &self,
        request: &SubscriptionRequest,
        notifier: ChangeNotifier,
    ) -> Result<Box<dyn Subscription>> {
        let mut state = self.lock();
        if state.fail_subscriptions {
            return Err(SyncError::Subscribe {
                channel: request.channel.clone(),
                reason: "realtime unavailable".to_string(),
            });
        }
        let id = Uuid::new_v4();
        state.listeners.insert(
            id,
            Listener {
                channel: request.channel.clone(),
                table: request.table.clone(),
                notifier,
            },
        );
        debug!(channel = %request.channel, %id, "memory listener added");
        Ok(Box::new(MemorySubscription {
            id,
            state: Arc::downgrade(&self.state),
        }))
    }
}

struct MemorySubscription {
    id: Uuid,
    state: Weak<Mutex<State>>,
}

impl Subscription for MemorySubscription {
    fn unsubscribe(&mut self) {
        if let Some(state) = self.state.upgrade() {
            let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.listeners.remove(&self.id).is_some() {
                debug!(id = %self.id, "memory listener removed");
            }
        }
    }
}

/// Orders two optional field values. Timestamps compare chronologically,
/// numbers numerically, strings lexically; missing values sort first.
fn compare_fields(lhs: Option<&Value>, rhs: Option<&Value>) -> Ordering {
    match (lhs, rhs) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(lhs), Some(rhs)) => compare_values(lhs, rhs),
    }
}

fn compare_values(lhs: &Value, rhs: &Value) -> Ordering {
    if let (Some(lhs), Some(rhs)) = (parse_timestamp(lhs), parse_timestamp(rhs)) {
        return lhs.cmp(&rhs);
    }
    match (lhs, rhs) {
        (Value::Number(lhs), Value::Number(rhs)) => {
            let lhs = lhs.as_f64().unwrap_or(f64::NAN);
            let rhs = rhs.as_f64().unwrap_or(f64::NAN);
            lhs.partial_cmp(&rhs).unwrap_or(Ordering::Equal)
        }
        (Value::String(lhs), Value::String(rhs)) => lhs.cmp(rhs),
        (Value::Bool(lhs), Value::Bool(rhs)) => lhs.cmp(rhs),
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}
