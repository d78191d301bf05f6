//! Single-task event loop for the notification session.
//!
//! Pollers and subscriptions never touch the store. They push [`Inbound`]
//! messages into one channel, and the dispatcher task applies them one at a
//! time. Every change is published as a fresh view on a `watch` channel.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::config::Settings;
use super::coordinator::Coordinator;
use super::model::{DomainEvent, StateSnapshot};
use super::notifications::generators::{GeneratorConfig, LaborConfig};
use super::notifications::model::{EventType, NotificationKey};
use super::notifications::presenter::{self, FailurePolicy, NotificationView, PendingBatch};
use super::notifications::store::BatchId;
use super::submit::{BatchSubmitter, Signer, SubmitError};
use super::watcher::SnapshotReader;

const INBOUND_CAPACITY: usize = 256;

pub enum Inbound {
    Snapshot(StateSnapshot),
    Domain(DomainEvent),
    Close(NotificationKey),
    Remove(NotificationKey),
    ResolveAll {
        event_type: EventType,
        reply: oneshot::Sender<Option<PendingBatch>>,
    },
    Reconfigure {
        generators: GeneratorConfig,
        labor: LaborConfig,
    },
}

pub struct Dispatcher {
    coordinator: Coordinator,
    submitter: Arc<dyn BatchSubmitter>,
    signer: Signer,
    max_batch: usize,
    failure_policy: FailurePolicy,
    view_tx: watch::Sender<Vec<NotificationView>>,
    // Submit calls still waiting on the chain
    in_flight: JoinSet<(BatchId, Result<(), SubmitError>)>,
}

impl Dispatcher {
    pub fn new(
        settings: &Settings,
        submitter: Arc<dyn BatchSubmitter>,
        view_tx: watch::Sender<Vec<NotificationView>>,
    ) -> Self {
        Self {
            coordinator: Coordinator::new(settings.generators.clone(), settings.labor.clone()),
            submitter,
            signer: Signer(settings.account_address.clone()),
            max_batch: settings.max_batch,
            failure_policy: settings.failure_policy,
            view_tx,
            in_flight: JoinSet::new(),
        }
    }

    /// Runs until the token is cancelled or every sender is gone.
    ///
    /// Submit calls still in flight at that point are abandoned.
    pub async fn run(mut self, mut rx: mpsc::Receiver<Inbound>, token: CancellationToken) {
        self.publish();
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                Some(joined) = self.in_flight.join_next() => match joined {
                    Ok((batch, outcome)) => self.settle(batch, outcome),
                    Err(e) => log::error!("Batch submit task failed: {}", e),
                },
                msg = rx.recv() => match msg {
                    Some(msg) => self.handle(msg),
                    None => break,
                },
            }
        }
        if !self.in_flight.is_empty() {
            log::warn!("Abandoning {} in-flight batch calls", self.in_flight.len());
        }
        log::info!("Notification dispatcher stopped");
    }

    fn handle(&mut self, msg: Inbound) {
        match msg {
            Inbound::Snapshot(snapshot) => {
                let output = self.coordinator.tick(snapshot);
                for line in &output.logs {
                    log::info!("{}", line);
                }
                if output.added > 0 {
                    self.publish();
                }
            }
            Inbound::Domain(event) => {
                let output = self.coordinator.handle_event(&event);
                for line in &output.logs {
                    log::info!("{}", line);
                }
                if output.added > 0 {
                    self.publish();
                }
            }
            Inbound::Close(key) => {
                if self.coordinator.store_mut().close(&key) {
                    self.publish();
                }
            }
            Inbound::Remove(key) => {
                if self.coordinator.store_mut().remove(&key).is_some() {
                    self.publish();
                }
            }
            Inbound::ResolveAll { event_type, reply } => {
                let batch = presenter::begin_bulk(self.coordinator.store_mut(), event_type, self.max_batch);
                if let Some(batch) = &batch {
                    log::info!(
                        "Resolving {} {} notifications in batch {}",
                        batch.keys.len(),
                        event_type,
                        batch.id
                    );
                    self.publish();

                    let submitter = Arc::clone(&self.submitter);
                    let signer = self.signer.clone();
                    let id = batch.id;
                    let entity_ids = batch.entity_ids.clone();
                    self.in_flight.spawn(async move {
                        let outcome = submitter.submit(&signer, entity_ids).await;
                        (id, outcome)
                    });
                }
                let _ = reply.send(batch);
            }
            Inbound::Reconfigure { generators, labor } => {
                self.coordinator.update_config(generators, labor);
                log::info!("Generator settings reloaded");
            }
        }
    }

    fn settle(&mut self, batch: BatchId, outcome: Result<(), SubmitError>) {
        let report = presenter::settle_batch(
            self.coordinator.store_mut(),
            batch,
            &outcome,
            self.failure_policy,
        );
        match &report.error {
            Some(e) => log::warn!(
                "Batch {} failed: {} ({} removed, {} reopened)",
                batch,
                e,
                report.removed.len(),
                report.reopened.len()
            ),
            None => log::info!("Batch {} settled, {} removed", batch, report.removed.len()),
        }
        self.publish();
    }

    fn publish(&self) {
        self.view_tx.send_replace(presenter::view(self.coordinator.store()));
    }
}

/// Polls `reader` right away and then every `period`, until cancelled.
pub fn spawn_poller(
    reader: Arc<dyn SnapshotReader>,
    period: Duration,
    tx: mpsc::Sender<Inbound>,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval.tick() => {
                    // File reads and JSON parsing stay off the async workers
                    let reader = Arc::clone(&reader);
                    let snapshot = match tokio::task::spawn_blocking(move || reader.read()).await {
                        Ok(snapshot) => snapshot,
                        Err(e) => {
                            log::error!("Snapshot read task failed: {}", e);
                            continue;
                        }
                    };
                    if let Some(snapshot) = snapshot {
                        if tx.send(Inbound::Snapshot(snapshot)).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }
        log::debug!("Snapshot poller stopped");
    })
}

/// Forwards a subscription stream into the dispatcher until it ends or the
/// token is cancelled.
pub fn spawn_subscription(
    mut events: mpsc::Receiver<DomainEvent>,
    tx: mpsc::Sender<Inbound>,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => {
                        if tx.send(Inbound::Domain(event)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
        log::debug!("Subscription forwarder stopped");
    })
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("notification service has shut down")]
    Closed,
}

/// Cloneable handle for pushing domain events straight into a session.
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::Sender<Inbound>,
}

impl EventSender {
    pub async fn send(&self, event: DomainEvent) -> Result<(), ServiceError> {
        self.tx
            .send(Inbound::Domain(event))
            .await
            .map_err(|_| ServiceError::Closed)
    }
}

/// Handle to a running notification session.
///
/// Dropping the handle cancels the poller, the subscriptions and the
/// dispatcher; [`NotificationService::shutdown`] also waits for them.
pub struct NotificationService {
    tx: mpsc::Sender<Inbound>,
    view_rx: watch::Receiver<Vec<NotificationView>>,
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl NotificationService {
    /// Starts the dispatcher and the snapshot poller. Must run inside a
    /// Tokio runtime.
    pub fn start(
        settings: &Settings,
        reader: Arc<dyn SnapshotReader>,
        submitter: Arc<dyn BatchSubmitter>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
        let (view_tx, view_rx) = watch::channel(Vec::new());
        let token = CancellationToken::new();

        let dispatcher = Dispatcher::new(settings, submitter, view_tx);
        let dispatcher_task = tokio::spawn(dispatcher.run(rx, token.clone()));
        let poller_task = spawn_poller(reader, settings.poll_interval(), tx.clone(), token.clone());
        log::info!(
            "Notification service started, polling every {:?}",
            settings.poll_interval()
        );

        Self {
            tx,
            view_rx,
            token,
            tasks: vec![dispatcher_task, poller_task],
        }
    }

    /// Feeds a push subscription into the session.
    pub fn add_subscription(&mut self, events: mpsc::Receiver<DomainEvent>) {
        let task = spawn_subscription(events, self.tx.clone(), self.token.clone());
        self.tasks.push(task);
    }

    pub fn event_sender(&self) -> EventSender {
        EventSender { tx: self.tx.clone() }
    }

    /// Swaps generator settings. Existing entries are kept.
    pub async fn update_config(&self, settings: &Settings) -> Result<(), ServiceError> {
        self.send(Inbound::Reconfigure {
            generators: settings.generators.clone(),
            labor: settings.labor.clone(),
        })
        .await
    }

    /// Forces a refresh outside the poll interval.
    pub async fn push_snapshot(&self, snapshot: StateSnapshot) -> Result<(), ServiceError> {
        self.send(Inbound::Snapshot(snapshot)).await
    }

    pub async fn close(&self, key: NotificationKey) -> Result<(), ServiceError> {
        self.send(Inbound::Close(key)).await
    }

    pub async fn remove(&self, key: NotificationKey) -> Result<(), ServiceError> {
        self.send(Inbound::Remove(key)).await
    }

    /// Starts a bulk action for one category.
    ///
    /// Returns the batch once its entries are marked pending; the external
    /// call settles later and shows up in the view.
    pub async fn resolve_all(&self, event_type: EventType) -> Result<Option<PendingBatch>, ServiceError> {
        let (reply, rx) = oneshot::channel();
        self.send(Inbound::ResolveAll { event_type, reply }).await?;
        rx.await.map_err(|_| ServiceError::Closed)
    }

    /// Current view
    pub fn view(&self) -> Vec<NotificationView> {
        self.view_rx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<Vec<NotificationView>> {
        self.view_rx.clone()
    }

    pub async fn shutdown(mut self) {
        self.token.cancel();
        for task in std::mem::take(&mut self.tasks) {
            if let Err(e) = task.await {
                log::error!("Notification task ended abnormally: {}", e);
            }
        }
    }

    async fn send(&self, msg: Inbound) -> Result<(), ServiceError> {
        self.tx.send(msg).await.map_err(|_| ServiceError::Closed)
    }
}

impl Drop for NotificationService {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
