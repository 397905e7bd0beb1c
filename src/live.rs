//! Live views: aggregated collections kept fresh by partition change
//! notifications.
//!
//! A [`LiveView`] starts `Idle`. [`LiveView::activate`] registers one listener
//! per present partition, schedules the initial snapshot, and returns a
//! [`LiveViewHandle`] in the `Active` state. Disposing the handle (explicitly
//! or by dropping it) releases every listener and moves it to `Disposed`.
//! There is no way back.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::aggregate::Aggregator;
use crate::model::{EntityType, Origin, Record};
use crate::partition::{ChangeKind, ChangeNotifier, Subscription, SubscriptionRequest};

/// Receives every snapshot a live view produces.
pub type SnapshotCallback = Arc<dyn Fn(Vec<Record>) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveViewState {
    Idle,
    Active,
    Disposed,
}

/// A live view that has not been activated yet.
pub struct LiveView {
    aggregator: Aggregator,
    entity: EntityType,
    callback: SnapshotCallback,
}

impl LiveView {
    pub fn new<F>(aggregator: Aggregator, entity: EntityType, callback: F) -> Self
    where
        F: Fn(Vec<Record>) + Send + Sync + 'static,
    {
        Self {
            aggregator,
            entity,
            callback: Arc::new(callback),
        }
    }

    pub fn state(&self) -> LiveViewState {
        LiveViewState::Idle
    }

    /// Registers change listeners on every present partition and schedules
    /// the initial snapshot.
    ///
    /// The initial snapshot is always delivered before any snapshot triggered
    /// by a notification. A partition whose subscribe call fails is skipped.
    pub async fn activate(self) -> LiveViewHandle {
        let entity = self.entity;
        let table = entity.table();
        let mut subscriptions: Vec<Box<dyn Subscription>> = Vec::new();
        let mut receivers = Vec::new();

        for (origin, backend) in self.aggregator.partitions().present() {
            let request = SubscriptionRequest::for_table(origin, table);
            let (notifier, receiver) = ChangeNotifier::channel();
            match backend.subscribe(&request, notifier).await {
                Ok(subscription) => {
                    debug!(%origin, channel = %request.channel, "listener registered");
                    subscriptions.push(subscription);
                    receivers.push((origin, receiver));
                }
                Err(error) => {
                    warn!(%origin, channel = %request.channel, %error, "listener registration failed, partition will not trigger refreshes");
                }
            }
        }

        let shared = Arc::new(Shared {
            aggregator: self.aggregator,
            entity,
            callback: self.callback,
            disposed: AtomicBool::new(false),
        });
        let driver = tokio::spawn(drive(Arc::clone(&shared), receivers));
        info!(%entity, listener_count = subscriptions.len(), "live view active");

        LiveViewHandle {
            shared,
            subscriptions,
            driver: Some(driver),
        }
    }
}

impl fmt::Debug for LiveView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveView")
            .field("entity", &self.entity)
            .finish_non_exhaustive()
    }
}

/// Disposal handle of an active live view.
///
/// Dropping the handle disposes the view.
pub struct LiveViewHandle {
    shared: Arc<Shared>,
    subscriptions: Vec<Box<dyn Subscription>>,
    driver: Option<JoinHandle<()>>,
}

impl LiveViewHandle {
    pub fn entity(&self) -> EntityType {
        self.shared.entity
    }

    pub fn state(&self) -> LiveViewState {
        if self.shared.is_disposed() {
            LiveViewState::Disposed
        } else {
            LiveViewState::Active
        }
    }

    /// Number of partition listeners currently held.
    pub fn listener_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Releases every partition listener and stops further refreshes.
    ///
    /// A recomputation already running may finish, but its snapshot is
    /// discarded.
    pub fn dispose(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.shared.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let released = self.subscriptions.len();
        for mut subscription in self.subscriptions.drain(..) {
            subscription.unsubscribe();
        }
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
        info!(entity = %self.shared.entity, released, "live view disposed");
    }
}

impl Drop for LiveViewHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for LiveViewHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveViewHandle")
            .field("entity", &self.shared.entity)
            .field("state", &self.state())
            .field("listeners", &self.subscriptions.len())
            .finish()
    }
}

struct Shared {
    aggregator: Aggregator,
    entity: EntityType,
    callback: SnapshotCallback,
    disposed: AtomicBool,
}

impl Shared {
    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    async fn refresh(&self) {
        let records = self.aggregator.aggregate(self.entity).await;
        if self.is_disposed() {
            debug!(entity = %self.entity, "discarding snapshot computed after disposal");
            return;
        }
        (self.callback)(records);
    }
}

/// Delivers the initial snapshot, then starts one pump per partition.
///
/// The initial snapshot runs in its own task so a panicking callback cannot
/// keep the pumps from starting. Pumps live in a [`JoinSet`], so aborting the
/// driver aborts them too.
async fn drive(shared: Arc<Shared>, receivers: Vec<(Origin, UnboundedReceiver<ChangeKind>)>) {
    let initial = tokio::spawn({
        let shared = Arc::clone(&shared);
        async move { shared.refresh().await }
    });
    if let Err(error) = initial.await {
        warn!(entity = %shared.entity, %error, "initial snapshot failed");
    }

    let mut pumps = JoinSet::new();
    for (origin, receiver) in receivers {
        pumps.spawn(pump(Arc::clone(&shared), origin, receiver));
    }
    while pumps.join_next().await.is_some() {}
}

/// Spawns an independent full recompute for every notification from one
/// partition. No coalescing; the last snapshot delivered wins.
async fn pump(shared: Arc<Shared>, origin: Origin, mut receiver: UnboundedReceiver<ChangeKind>) {
    while let Some(kind) = receiver.recv().await {
        if shared.is_disposed() {
            break;
        }
        debug!(%origin, ?kind, entity = %shared.entity, "change notification");
        let task = Arc::clone(&shared);
        tokio::spawn(async move { task.refresh().await });
    }
    debug!(%origin, entity = %shared.entity, "notification channel closed");
}
