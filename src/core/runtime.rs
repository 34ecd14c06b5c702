use crate::auth::{AuthContext, AuthProvider, AuthResponse, AuthenticationChain, AuthenticationError};
use crate::config::Config;
use crate::mqtt::dispatch::{MsgDispatcher, QueueMsgDispatcher};
use crate::mqtt::protocol::PublishMsg;
use crate::mqtt::retained::{NoopRetained, RetainedMsgProcessor};
use crate::mqtt::session::{DisconnectReason, SessionInfo};
use crate::mqtt::will::{LastWillService, WillDecision};
use crate::queue::cluster::{ClusterEvent, ClusterEventQueueFactory, EventConsumer, EventProducer};
use crate::queue::{InMemoryClusterEventQueueFactory, InMemoryLog, ProtoQueueMsg, QueueCallback};
use crate::telemetry::{self, LogHandle, StatsSnapshot};
use crate::time::{Clock, SystemClock};
use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Collaborators plugged into a [`Runtime`].
pub struct RuntimeDeps {
    /// Authentication providers in evaluation order.
    pub providers: Vec<Arc<dyn AuthProvider>>,
    pub retained: Arc<dyn RetainedMsgProcessor>,
    /// Defaults to a dispatcher writing to the publish-msg topic of `log`.
    pub dispatcher: Option<Arc<dyn MsgDispatcher>>,
    /// Shared log for multi-node setups in one process; a fresh one otherwise.
    pub log: Option<Arc<InMemoryLog>>,
}

impl Default for RuntimeDeps {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            retained: Arc::new(NoopRetained),
            dispatcher: None,
            log: None,
        }
    }
}

/// Wires authentication, last-will delivery and cluster events for one broker node.
pub struct Runtime<C: Clock = SystemClock> {
    config: Config,
    auth: AuthenticationChain,
    wills: LastWillService<C>,
    log: Arc<InMemoryLog>,
    event_producer: EventProducer,
    event_consumer: Mutex<Option<EventConsumer>>,
    event_loop: Mutex<Option<JoinHandle<()>>>,
    events_handled: Arc<AtomicU64>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    log_handle: Option<LogHandle>,
}

impl Runtime<SystemClock> {
    /// Must be called from within a tokio runtime.
    pub fn new(config: Config, deps: RuntimeDeps) -> Result<Self> {
        Self::with_clock(config, SystemClock, deps)
    }
}

impl<C: Clock> Runtime<C> {
    pub fn with_clock(config: Config, clock: C, deps: RuntimeDeps) -> Result<Self> {
        config.validate()?;
        let service_id = config.service_id.clone();
        let log = deps
            .log
            .unwrap_or_else(|| InMemoryLog::new(config.queue.partitions));
        let dispatcher = match deps.dispatcher {
            Some(dispatcher) => dispatcher,
            None => {
                let dispatcher = QueueMsgDispatcher::in_memory(&log, &config.queue, &service_id);
                dispatcher
                    .init()
                    .context("failed to initialise publish-msg producer")?;
                Arc::new(dispatcher)
            }
        };
        let factory = InMemoryClusterEventQueueFactory::from_config(log.clone(), &config.queue);
        let event_producer = factory.create_event_producer(&service_id);
        event_producer
            .init()
            .context("failed to initialise cluster event producer")?;
        let event_consumer = factory.create_event_consumer(&service_id);
        event_consumer
            .subscribe()
            .context("failed to subscribe cluster event consumer")?;
        let wills = LastWillService::with_clock(
            &config.will.scheduler_name,
            clock,
            dispatcher,
            deps.retained,
        );
        let auth = AuthenticationChain::new(deps.providers);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tracing::info!(
            service_id = %service_id,
            providers = auth.len(),
            partitions = log.partitions(),
            "runtime initialised"
        );
        Ok(Self {
            config,
            auth,
            wills,
            log,
            event_producer,
            event_consumer: Mutex::new(Some(event_consumer)),
            event_loop: Mutex::new(None),
            events_handled: Arc::new(AtomicU64::new(0)),
            shutdown_tx,
            shutdown_rx,
            log_handle: None,
        })
    }

    pub fn with_log_handle(mut self, handle: LogHandle) -> Self {
        self.log_handle = Some(handle);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn service_id(&self) -> &str {
        &self.config.service_id
    }

    pub fn auth(&self) -> &AuthenticationChain {
        &self.auth
    }

    pub fn wills(&self) -> &LastWillService<C> {
        &self.wills
    }

    pub fn log(&self) -> Arc<InMemoryLog> {
        self.log.clone()
    }

    pub fn log_handle(&self) -> Option<LogHandle> {
        self.log_handle.clone()
    }

    pub fn set_log_level(&self, level: &str) -> Result<()> {
        match &self.log_handle {
            Some(handle) => telemetry::set_log_level(handle, level),
            None => anyhow::bail!("tracing was not initialised by this runtime"),
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            service_id: self.config.service_id.clone(),
            pending_wills: self.wills.pending_wills(),
            scheduled_wills: self.wills.scheduled_wills(),
            cluster_events_handled: self.events_handled.load(Ordering::Relaxed),
        }
    }

    /// Authenticate a connecting client and register its session state.
    ///
    /// On a clean start any delayed will left by a previous session of the
    /// same client is cancelled before the new will is saved.
    pub async fn connect(
        &self,
        auth_ctx: &AuthContext,
        session_info: &SessionInfo,
        will: Option<PublishMsg>,
    ) -> Result<AuthResponse, AuthenticationError> {
        let response = self.auth.authenticate(auth_ctx).await?;
        let client_id = session_info.client_id();
        if session_info.clean_start {
            self.wills.cancel_last_will_delay_if_scheduled(client_id);
        }
        if let Some(will) = will {
            self.wills.save_last_will_msg(session_info, will);
        }
        self.publish_event(ClusterEvent::SessionConnected {
            client_id: client_id.to_string(),
            session_id: session_info.session_id,
            service_id: self.config.service_id.clone(),
            clean_start: session_info.clean_start,
        });
        tracing::info!(
            client_id,
            session_id = %session_info.session_id,
            clean_start = session_info.clean_start,
            "client connected"
        );
        Ok(response)
    }

    /// Tear down a session; the will is sent for every reason except a
    /// normal disconnect.
    pub fn disconnect(
        &self,
        session_info: &SessionInfo,
        reason: DisconnectReason,
        new_session_clean_start: bool,
    ) -> WillDecision {
        let decision = self.wills.remove_and_execute_last_will_if_needed(
            session_info.session_id,
            reason.triggers_will(),
            new_session_clean_start,
        );
        self.publish_event(ClusterEvent::SessionDisconnected {
            client_id: session_info.client_id().to_string(),
            session_id: session_info.session_id,
            service_id: self.config.service_id.clone(),
        });
        tracing::info!(
            client_id = session_info.client_id(),
            session_id = %session_info.session_id,
            reason = reason.code(),
            "client disconnected"
        );
        decision
    }

    /// Drop a client's delayed will here and on every other node.
    pub fn clear_session(&self, client_id: &str) -> bool {
        let cancelled = self.wills.cancel_last_will_delay_if_scheduled(client_id);
        self.publish_event(ClusterEvent::ClearSession {
            client_id: client_id.to_string(),
        });
        cancelled
    }

    fn publish_event(&self, event: ClusterEvent) {
        let key = event.client_id().to_string();
        let (callback, ack) = QueueCallback::channel();
        self.event_producer
            .send(ProtoQueueMsg::new(key.clone(), event), Some(callback));
        tokio::spawn(async move {
            if let Err(err) = ack.wait().await {
                tracing::warn!(client_id = %key, "failed to publish cluster event: {err}");
            }
        });
    }

    /// Spawn the cluster event loop. Calling it again is a no-op.
    pub fn start(&self) {
        let Some(consumer) = self.event_consumer.lock().take() else {
            return;
        };
        let handle = tokio::spawn(run_event_loop(
            consumer,
            EventLoopCtx {
                wills: self.wills.clone(),
                service_id: self.config.service_id.clone(),
                max_records: self.config.queue.max_poll_records,
                poll_timeout: self.config.queue.poll_timeout(),
                handled: self.events_handled.clone(),
            },
            self.shutdown_rx.clone(),
        ));
        *self.event_loop.lock() = Some(handle);
        tracing::debug!(service_id = %self.config.service_id, "cluster event loop started");
    }

    /// Start, then block until ctrl-c or [`Runtime::request_shutdown`].
    pub async fn run(&self) -> Result<()> {
        self.start();
        let mut shutdown_rx = self.shutdown_rx.clone();
        if !*shutdown_rx.borrow() {
            tokio::select! {
                res = tokio::signal::ctrl_c() => {
                    res.context("failed to listen for ctrl-c")?;
                    tracing::warn!("shutdown signal received");
                }
                _ = shutdown_rx.changed() => {
                    tracing::info!("shutdown requested by component");
                }
            }
        }
        self.shutdown().await;
        Ok(())
    }

    pub fn request_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Stop the event loop and producer, then cancel outstanding delayed wills.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let handle = self.event_loop.lock().take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                tracing::warn!("cluster event loop ended abnormally: {err:?}");
            }
        }
        self.event_producer.stop();
        self.wills.shutdown();
        tracing::info!(stats = %self.stats().to_json(), "runtime stopped");
    }
}

impl<C: Clock> Drop for Runtime<C> {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.event_loop.lock().take() {
            handle.abort();
        }
        self.wills.shutdown();
    }
}

struct EventLoopCtx<C: Clock> {
    wills: LastWillService<C>,
    service_id: String,
    max_records: usize,
    poll_timeout: Duration,
    handled: Arc<AtomicU64>,
}

async fn run_event_loop<C: Clock>(
    consumer: EventConsumer,
    ctx: EventLoopCtx<C>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    while !*shutdown_rx.borrow() {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            polled = consumer.poll(ctx.max_records, ctx.poll_timeout) => match polled {
                Ok(batch) if batch.is_empty() => {}
                Ok(batch) => {
                    for record in &batch {
                        handle_cluster_event(&ctx.wills, &ctx.service_id, record.value());
                        ctx.handled.fetch_add(1, Ordering::Relaxed);
                    }
                    if let Err(err) = consumer.commit() {
                        tracing::warn!("failed to commit cluster events: {err}");
                    }
                }
                Err(err) => {
                    tracing::warn!("cluster event poll failed: {err}");
                    tokio::time::sleep(ctx.poll_timeout).await;
                }
            }
        }
    }
    consumer.unsubscribe();
    tracing::debug!(service_id = %ctx.service_id, "cluster event loop stopped");
}

/// Apply a cluster event to local will state. Events produced by this node
/// were already applied when they were published.
fn handle_cluster_event<C: Clock>(wills: &LastWillService<C>, own_service_id: &str, event: &ClusterEvent) {
    if event.service_id() == Some(own_service_id) {
        return;
    }
    match event {
        ClusterEvent::SessionConnected {
            client_id,
            clean_start: true,
            service_id,
            ..
        } => {
            if wills.cancel_last_will_delay_if_scheduled(client_id) {
                tracing::debug!(%client_id, remote = %service_id, "client reconnected elsewhere, delayed will cancelled");
            }
        }
        ClusterEvent::ClearSession { client_id } => {
            wills.cancel_last_will_delay_if_scheduled(client_id);
        }
        ClusterEvent::SessionConnected { .. } | ClusterEvent::SessionDisconnected { .. } => {
            tracing::trace!(client_id = event.client_id(), "cluster event needs no local action");
        }
    }
}
