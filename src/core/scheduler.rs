//! Single-worker delayed task scheduler.
//!
//! One tokio task owns a min-heap of deadlines and runs due jobs in
//! deadline order (submission order on ties). Cancellation is advisory:
//! it only succeeds while a task is still pending, a job that has started
//! always runs to completion. A cancelled task wakes the worker, which
//! drops it from the heap together with the job it owns.

use crate::time::{Clock, SystemClock};
use parking_lot::Mutex;
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::Instrument;

const PENDING: u8 = 0;
const RUNNING: u8 = 1;
const DONE: u8 = 2;
const CANCELLED: u8 = 3;

type Job = Box<dyn FnOnce(&ScheduledTask) + Send + 'static>;

/// Wakeup shared by the worker and every task handle.
#[derive(Debug, Default)]
struct Signal {
    wakeup: Notify,
    purge: AtomicBool,
}

/// Handle to a job submitted to a [`DelayScheduler`].
#[derive(Debug, Clone)]
pub struct ScheduledTask {
    id: u64,
    state: Arc<AtomicU8>,
    signal: Option<Arc<Signal>>,
}

impl ScheduledTask {
    fn new(id: u64, signal: Arc<Signal>) -> Self {
        Self {
            id,
            state: Arc::new(AtomicU8::new(PENDING)),
            signal: Some(signal),
        }
    }

    fn cancelled(id: u64) -> Self {
        Self {
            id,
            state: Arc::new(AtomicU8::new(CANCELLED)),
            signal: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Cancel the task if it has not started yet.
    ///
    /// Returns false when the job is already running, finished or cancelled.
    pub fn cancel(&self) -> bool {
        let cancelled = self
            .state
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if cancelled {
            if let Some(signal) = &self.signal {
                signal.purge.store(true, Ordering::Release);
                signal.wakeup.notify_one();
            }
        }
        cancelled
    }

    pub fn is_pending(&self) -> bool {
        self.state.load(Ordering::Acquire) == PENDING
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::Acquire) == CANCELLED
    }

    /// True once the job has run to completion.
    pub fn is_done(&self) -> bool {
        self.state.load(Ordering::Acquire) == DONE
    }

    fn begin(&self) -> bool {
        self.state
            .compare_exchange(PENDING, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn finish(&self) {
        self.state.store(DONE, Ordering::Release);
    }
}

struct Entry {
    deadline: Instant,
    task: ScheduledTask,
    job: Job,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.task.id == other.task.id
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    // Reversed so BinaryHeap pops the earliest deadline first.
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.task.id.cmp(&self.task.id))
    }
}

struct Shared {
    queue: Mutex<BinaryHeap<Entry>>,
    signal: Arc<Signal>,
    closed: AtomicBool,
}

enum Next {
    Due(Entry),
    Wait(Instant),
    Idle,
}

/// Delayed task executor backed by a single worker task.
pub struct DelayScheduler<C: Clock = SystemClock> {
    name: String,
    clock: C,
    next_id: AtomicU64,
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DelayScheduler<SystemClock> {
    /// Start a scheduler on the current tokio runtime using the system clock.
    pub fn start(name: impl Into<String>) -> Self {
        Self::start_with_clock(name, SystemClock)
    }
}

impl<C: Clock> DelayScheduler<C> {
    pub fn start_with_clock(name: impl Into<String>, clock: C) -> Self {
        let name = name.into();
        let shared = Arc::new(Shared {
            queue: Mutex::new(BinaryHeap::new()),
            signal: Arc::new(Signal::default()),
            closed: AtomicBool::new(false),
        });
        let span = tracing::debug_span!("scheduler", name = %name);
        let worker = tokio::spawn(run_worker(shared.clone(), clock.clone()).instrument(span));
        tracing::debug!(scheduler = %name, "delay scheduler started");
        Self {
            name,
            clock,
            next_id: AtomicU64::new(1),
            shared,
            worker: Mutex::new(Some(worker)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Submit `job` to run on the worker once `delay` has elapsed.
    ///
    /// The job receives its own handle so it can correlate bookkeeping.
    pub fn schedule<F>(&self, delay: Duration, job: F) -> ScheduledTask
    where
        F: FnOnce(&ScheduledTask) + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if self.shared.closed.load(Ordering::Acquire) {
            tracing::warn!(scheduler = %self.name, task_id = id, "scheduler is shut down; task dropped");
            return ScheduledTask::cancelled(id);
        }
        let task = ScheduledTask::new(id, self.shared.signal.clone());
        let deadline = self.clock.now() + delay;
        self.shared.queue.lock().push(Entry {
            deadline,
            task: task.clone(),
            job: Box::new(job),
        });
        self.shared.signal.wakeup.notify_one();
        task
    }

    /// Number of entries held by the worker, including cancelled ones not
    /// yet purged.
    pub fn queued(&self) -> usize {
        self.shared.queue.lock().len()
    }

    /// Number of queued tasks that are still pending.
    pub fn pending(&self) -> usize {
        self.shared
            .queue
            .lock()
            .iter()
            .filter(|entry| entry.task.is_pending())
            .count()
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Cancel every outstanding task and stop the worker.
    pub fn shutdown(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let drained: Vec<Entry> = self.shared.queue.lock().drain().collect();
        let cancelled = drained.iter().filter(|entry| entry.task.cancel()).count();
        self.shared.signal.wakeup.notify_one();
        if let Some(handle) = self.worker.lock().take() {
            handle.abort();
        }
        tracing::debug!(scheduler = %self.name, cancelled, "delay scheduler stopped");
    }
}

impl<C: Clock> Drop for DelayScheduler<C> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run_worker<C: Clock>(shared: Arc<Shared>, clock: C) {
    loop {
        let notified = shared.signal.wakeup.notified();
        if shared.closed.load(Ordering::Acquire) {
            break;
        }
        if shared.signal.purge.swap(false, Ordering::AcqRel) {
            // Jobs are dropped after the lock is released.
            let purged = purge_cancelled(&shared.queue);
            tracing::trace!(purged = purged.len(), "dropped cancelled tasks");
        }
        let next = {
            let mut queue = shared.queue.lock();
            match queue.peek() {
                None => Next::Idle,
                Some(entry) if entry.deadline <= clock.now() => match queue.pop() {
                    Some(entry) => Next::Due(entry),
                    None => Next::Idle,
                },
                Some(entry) => Next::Wait(entry.deadline),
            }
        };
        match next {
            Next::Due(entry) => execute(entry),
            Next::Wait(deadline) => {
                tokio::select! {
                    () = clock.sleep_until(deadline) => {}
                    () = notified => {}
                }
            }
            Next::Idle => notified.await,
        }
    }
}

fn purge_cancelled(queue: &Mutex<BinaryHeap<Entry>>) -> Vec<Entry> {
    let mut queue = queue.lock();
    let (live, cancelled): (Vec<Entry>, Vec<Entry>) = std::mem::take(&mut *queue)
        .into_vec()
        .into_iter()
        .partition(|entry| !entry.task.is_cancelled());
    *queue = BinaryHeap::from(live);
    cancelled
}

fn execute(entry: Entry) {
    let Entry { task, job, .. } = entry;
    if !task.begin() {
        tracing::trace!(task_id = task.id, "skipping cancelled task");
        return;
    }
    if catch_unwind(AssertUnwindSafe(|| job(&task))).is_err() {
        tracing::error!(task_id = task.id, "scheduled task panicked");
    }
    task.finish();
}
