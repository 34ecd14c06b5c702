//! Last-will lifecycle: registration, delayed firing and cancellation.
//!
//! Two concurrent maps hold all mutable state. Pending wills are keyed by
//! session id and are removed exactly once with an atomic remove. Delayed
//! firings are tracked by client id so a clean reconnect of the same client
//! can cancel them. Firing happens on a single scheduler worker; the
//! dispatch acknowledgement is awaited on a separate task.

use crate::core::scheduler::{DelayScheduler, ScheduledTask};
use crate::mqtt::dispatch::{DispatchFailure, MsgDispatcher};
use crate::mqtt::protocol::PublishMsg;
use crate::mqtt::retained::RetainedMsgProcessor;
use crate::mqtt::session::SessionInfo;
use crate::queue::QueueCallback;
use crate::time::{Clock, SystemClock};
use dashmap::DashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, error, trace, warn};
use uuid::Uuid;

/// A registered will together with the session that registered it.
#[derive(Debug, Clone)]
pub struct MsgWithSessionInfo {
    pub publish_msg: PublishMsg,
    pub session_info: SessionInfo,
}

impl MsgWithSessionInfo {
    fn client_id(&self) -> &str {
        self.session_info.client_id()
    }
}

/// What a disconnect did with the session's will.
#[derive(Debug, Clone)]
pub enum WillDecision {
    /// The session had no will registered.
    Absent,
    /// The will was removed without being sent.
    Discarded,
    /// Positive delay on a non-clean restart: removed, not scheduled.
    Deferred,
    /// Dispatch scheduled; the handle is also tracked under the client id.
    Scheduled(ScheduledTask),
}

struct Inner<C: Clock> {
    last_will_messages: DashMap<Uuid, MsgWithSessionInfo>,
    delayed_wills: DashMap<String, ScheduledTask>,
    dispatcher: Arc<dyn MsgDispatcher>,
    retained: Arc<dyn RetainedMsgProcessor>,
    scheduler: DelayScheduler<C>,
}

pub struct LastWillService<C: Clock = SystemClock> {
    inner: Arc<Inner<C>>,
}

impl<C: Clock> Clone for LastWillService<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl LastWillService<SystemClock> {
    /// Must be called from within a tokio runtime; starts the scheduler worker.
    pub fn new(
        scheduler_name: &str,
        dispatcher: Arc<dyn MsgDispatcher>,
        retained: Arc<dyn RetainedMsgProcessor>,
    ) -> Self {
        Self::with_clock(scheduler_name, SystemClock, dispatcher, retained)
    }
}

impl<C: Clock> LastWillService<C> {
    pub fn with_clock(
        scheduler_name: &str,
        clock: C,
        dispatcher: Arc<dyn MsgDispatcher>,
        retained: Arc<dyn RetainedMsgProcessor>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                last_will_messages: DashMap::new(),
                delayed_wills: DashMap::new(),
                dispatcher,
                retained,
                scheduler: DelayScheduler::start_with_clock(scheduler_name, clock),
            }),
        }
    }

    /// Register the will for a session, replacing any previous one.
    pub fn save_last_will_msg(&self, session_info: &SessionInfo, publish_msg: PublishMsg) {
        trace!(
            client_id = session_info.client_id(),
            session_id = %session_info.session_id,
            topic = %publish_msg.topic_name,
            "saving last will msg"
        );
        let entry = MsgWithSessionInfo {
            publish_msg,
            session_info: session_info.clone(),
        };
        if self
            .inner
            .last_will_messages
            .insert(session_info.session_id, entry)
            .is_some()
        {
            error!(
                client_id = session_info.client_id(),
                session_id = %session_info.session_id,
                "last-will message has been saved already"
            );
        }
    }

    /// Remove the session's will and fire it if required.
    ///
    /// A positive will delay only schedules when the new session is a clean
    /// start; otherwise the will is removed and not sent.
    pub fn remove_and_execute_last_will_if_needed(
        &self,
        session_id: Uuid,
        send_msg: bool,
        new_session_clean_start: bool,
    ) -> WillDecision {
        let Some((_, entry)) = self.inner.last_will_messages.remove(&session_id) else {
            trace!(%session_id, "no last will msg");
            return WillDecision::Absent;
        };
        debug!(%session_id, send_msg, "removing last will msg");
        if !send_msg {
            return WillDecision::Discarded;
        }
        let will_delay = entry.publish_msg.will_delay_secs();
        if !new_session_clean_start && will_delay > 0 {
            debug!(%session_id, will_delay, "will delay set on non-clean restart, not scheduling");
            return WillDecision::Deferred;
        }
        WillDecision::Scheduled(self.schedule_last_will(entry, session_id, will_delay))
    }

    /// Cancel the delayed will tracked for `client_id`, if any.
    ///
    /// Returns true when a pending firing was stopped. A will whose dispatch
    /// has already started is not interrupted.
    pub fn cancel_last_will_delay_if_scheduled(&self, client_id: &str) -> bool {
        let Some((_, task)) = self.inner.delayed_wills.remove(client_id) else {
            return false;
        };
        let cancelled = !task.is_cancelled() && task.cancel();
        if cancelled {
            debug!(client_id, task_id = task.id(), "cancelled delayed last will");
        }
        cancelled
    }

    fn schedule_last_will(&self, entry: MsgWithSessionInfo, session_id: Uuid, will_delay: u32) -> ScheduledTask {
        let client_id = entry.client_id().to_string();
        let weak = Arc::downgrade(&self.inner);
        let task = self.inner.scheduler.schedule(
            Duration::from_secs(u64::from(will_delay)),
            move |task| process_last_will(&weak, entry, session_id, task),
        );
        trace!(%client_id, %session_id, will_delay, task_id = task.id(), "last will scheduled");
        self.inner.delayed_wills.insert(client_id.clone(), task.clone());
        // A zero-delay will can finish before the insert above lands.
        if !task.is_pending() {
            self.inner
                .delayed_wills
                .remove_if(&client_id, |_, tracked| tracked.id() == task.id());
        }
        task
    }

    /// Number of sessions with a registered will.
    pub fn pending_wills(&self) -> usize {
        self.inner.last_will_messages.len()
    }

    /// Number of clients with a tracked delayed firing.
    pub fn scheduled_wills(&self) -> usize {
        self.inner.delayed_wills.len()
    }

    pub fn has_pending_will(&self, session_id: &Uuid) -> bool {
        self.inner.last_will_messages.contains_key(session_id)
    }

    pub fn has_scheduled_will(&self, client_id: &str) -> bool {
        self.inner.delayed_wills.contains_key(client_id)
    }

    pub fn scheduler_name(&self) -> &str {
        self.inner.scheduler.name()
    }

    /// Cancel every outstanding firing and stop the scheduler. Registered
    /// wills are not flushed.
    pub fn shutdown(&self) {
        self.inner.scheduler.shutdown();
        self.inner.delayed_wills.clear();
    }
}

fn process_last_will<C: Clock>(
    inner: &Weak<Inner<C>>,
    entry: MsgWithSessionInfo,
    session_id: Uuid,
    task: &ScheduledTask,
) {
    let Some(inner) = inner.upgrade() else {
        return;
    };
    let MsgWithSessionInfo {
        mut publish_msg,
        session_info,
    } = entry;
    if publish_msg.retained {
        publish_msg = inner.retained.process(publish_msg);
    }
    persist_publish_msg(inner.dispatcher.as_ref(), &session_info, publish_msg, session_id);
    inner
        .delayed_wills
        .remove_if(session_info.client_id(), |_, tracked| tracked.id() == task.id());
}

fn persist_publish_msg(
    dispatcher: &dyn MsgDispatcher,
    session_info: &SessionInfo,
    publish_msg: PublishMsg,
    session_id: Uuid,
) {
    let (callback, ack) = QueueCallback::channel();
    dispatcher.persist_publish_msg(session_info, publish_msg, callback);
    tokio::spawn(async move {
        match ack.wait().await {
            Ok(metadata) => trace!(
                %session_id,
                partition = metadata.partition,
                offset = metadata.offset,
                "successfully acknowledged last will msg"
            ),
            Err(source) => {
                let failure = DispatchFailure { session_id, source };
                warn!(%session_id, "failed to acknowledge last will msg. reason - {}", failure.source);
                trace!("detailed error: {failure:?}");
            }
        }
    });
}
