//! Bounded-concurrency job runner.
//!
//! Up to `max_jobs` jobs run at once; the rest wait in FIFO order. A job's function is
//! called synchronously when the job starts and its future is spawned on the runner's
//! tokio runtime. Completion of any job starts the next queued one.
//!
//! Cancellation is cooperative: a queued job is dropped without ever running, a running
//! job has its [`CancellationToken`] cancelled and its cancel callback invoked once.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use log::debug;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::error::{JobError, PrefetchError};

/// Invoked when a running job is cancelled (e.g. to abort a request).
pub type CancelCallback = Box<dyn FnOnce() + Send + 'static>;

type Starter = Box<dyn FnOnce(&Arc<RunnerInner>) + Send + 'static>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Queued,
    Running,
    Finished,
    Cancelled,
}

struct ControlState {
    phase: Phase,
    on_cancel: Option<CancelCallback>,
}

/// Lifecycle shared between a job's handle and its task.
struct JobControl {
    token: CancellationToken,
    state: Mutex<ControlState>,
}

impl JobControl {
    fn new(on_cancel: Option<CancelCallback>) -> Self {
        Self {
            token: CancellationToken::new(),
            state: Mutex::new(ControlState {
                phase: Phase::Queued,
                on_cancel,
            }),
        }
    }

    fn phase(&self) -> Phase {
        self.state.lock().phase
    }

    /// False if the job was cancelled between leaving the queue and starting.
    fn set_running(&self) -> bool {
        let mut state = self.state.lock();
        if state.phase == Phase::Queued {
            state.phase = Phase::Running;
            return true;
        }
        false
    }

    fn set_finished(&self) {
        let mut state = self.state.lock();
        if state.phase == Phase::Running {
            state.phase = Phase::Finished;
        }
        state.on_cancel = None;
    }
}

struct QueuedJob {
    id: u64,
    start: Starter,
}

struct Queue {
    active: usize,
    pending: VecDeque<QueuedJob>,
    next_id: u64,
}

struct RunnerInner {
    handle: Handle,
    max_jobs: usize,
    queue: Mutex<Queue>,
}

impl RunnerInner {
    /// Called when a running job settles. Hands the slot to the next queued job.
    fn finish(self: &Arc<Self>) {
        let next = {
            let mut queue = self.queue.lock();
            let next = queue.pending.pop_front();
            if next.is_none() {
                queue.active = queue.active.saturating_sub(1);
            }
            next
        };
        if let Some(job) = next {
            debug!("job {} started from queue", job.id);
            (job.start)(self);
        }
    }

    /// Remove a job that has not started yet. Returns false if it already left the queue.
    fn dequeue(&self, id: u64) -> bool {
        let mut queue = self.queue.lock();
        match queue.pending.iter().position(|job| job.id == id) {
            Some(index) => {
                queue.pending.remove(index);
                true
            }
            None => false,
        }
    }
}

/// Releases the runner slot even if the job's future panics.
struct SlotGuard(Arc<RunnerInner>);

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.0.finish();
    }
}

#[derive(Clone)]
pub struct JobRunner {
    inner: Arc<RunnerInner>,
}

impl fmt::Debug for JobRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRunner")
            .field("max_jobs", &self.inner.max_jobs)
            .field("active", &self.active_jobs())
            .field("queued", &self.queued_jobs())
            .finish()
    }
}

impl JobRunner {
    /// A runner spawning onto `handle`. `max_jobs` is raised to at least 1.
    pub fn new(handle: Handle, max_jobs: usize) -> Self {
        Self {
            inner: Arc::new(RunnerInner {
                handle,
                max_jobs: max_jobs.max(1),
                queue: Mutex::new(Queue {
                    active: 0,
                    pending: VecDeque::new(),
                    next_id: 0,
                }),
            }),
        }
    }

    /// A runner on the ambient tokio runtime.
    pub fn current(max_jobs: usize) -> Result<Self, PrefetchError> {
        let handle = Handle::try_current().map_err(|e| PrefetchError::NoRuntime(e.to_string()))?;
        Ok(Self::new(handle, max_jobs))
    }

    pub fn max_jobs(&self) -> usize {
        self.inner.max_jobs
    }

    pub fn active_jobs(&self) -> usize {
        self.inner.queue.lock().active
    }

    pub fn queued_jobs(&self) -> usize {
        self.inner.queue.lock().pending.len()
    }

    /// Submit a job. Starts immediately while under the concurrency cap, otherwise queues.
    pub fn run<T, F, Fut>(&self, func: F, on_cancel: Option<CancelCallback>) -> JobHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, JobError>> + Send + 'static,
    {
        let control = Arc::new(JobControl::new(on_cancel));
        let (tx, rx) = oneshot::channel();

        let task_control = Arc::clone(&control);
        let start: Starter = Box::new(move |runner: &Arc<RunnerInner>| {
            if !task_control.set_running() {
                runner.finish();
                return;
            }
            // created first so a panicking `func` still hands the slot on
            let guard = SlotGuard(Arc::clone(runner));
            let fut = func(task_control.token.clone());
            runner.handle.spawn(async move {
                let result = fut.await;
                let _ = tx.send(result);
                task_control.set_finished();
                drop(guard);
            });
        });

        let mut queue = self.inner.queue.lock();
        let id = queue.next_id;
        queue.next_id += 1;
        if queue.active < self.inner.max_jobs {
            queue.active += 1;
            drop(queue);
            start(&self.inner);
        } else {
            debug!("job {id} queued ({} active)", queue.active);
            queue.pending.push_back(QueuedJob { id, start });
        }

        JobHandle {
            id,
            control,
            runner: Arc::clone(&self.inner),
            rx,
        }
    }
}

/// Handle to a submitted job. Await it, or poll it with [`JobHandle::try_take`].
pub struct JobHandle<T> {
    id: u64,
    control: Arc<JobControl>,
    runner: Arc<RunnerInner>,
    rx: oneshot::Receiver<Result<T, JobError>>,
}

impl<T> fmt::Debug for JobHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobHandle")
            .field("id", &self.id)
            .field("phase", &self.control.phase())
            .finish()
    }
}

impl<T> JobHandle<T> {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_cancelled(&self) -> bool {
        self.control.phase() == Phase::Cancelled
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.control.phase(), Phase::Finished | Phase::Cancelled)
    }

    /// Cancel the job. Queued jobs are dropped without running; running jobs get their
    /// token cancelled and the cancel callback called. No-op once finished.
    pub fn cancel(&self) {
        let callback = {
            let mut state = self.control.state.lock();
            match state.phase {
                Phase::Queued => {
                    state.phase = Phase::Cancelled;
                    state.on_cancel = None;
                    None
                }
                Phase::Running => {
                    state.phase = Phase::Cancelled;
                    state.on_cancel.take()
                }
                Phase::Finished | Phase::Cancelled => return,
            }
        };

        if self.runner.dequeue(self.id) {
            debug!("job {} cancelled before start", self.id);
            return;
        }
        debug!("job {} cancelled while running", self.id);
        self.control.token.cancel();
        if let Some(callback) = callback {
            callback();
        }
    }

    /// Non-blocking check for the result. `None` while the job is still pending.
    pub fn try_take(&mut self) -> Option<Result<T, JobError>> {
        if self.is_cancelled() {
            return Some(Err(JobError::Cancelled));
        }
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(self.closed_error())),
        }
    }

    fn closed_error(&self) -> JobError {
        if self.is_cancelled() {
            JobError::Cancelled
        } else {
            JobError::Failed("job terminated without a result".into())
        }
    }
}

impl<T> Future for JobHandle<T> {
    type Output = Result<T, JobError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if this.is_cancelled() {
            return Poll::Ready(Err(JobError::Cancelled));
        }
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(this.closed_error())),
            Poll::Pending => Poll::Pending,
        }
    }
}
