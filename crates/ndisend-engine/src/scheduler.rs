//! Async operation scheduling.
//!
//! Native calls block, so each operation runs its work closure on a worker
//! from a bounded blocking pool. The completion closure runs exactly once,
//! in whichever task awaits the returned [`Operation`], and turns the work
//! output into the caller-visible result.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::{oneshot, Semaphore};
use tracing::{debug, error, trace};

use crate::config::SchedulerConfig;
use crate::error::SendError;
use crate::SendResult;

type Completion<T> = Box<dyn FnOnce() -> SendResult<T> + Send>;

struct SchedulerInner {
    runtime: Option<Runtime>,
    handle: Handle,
    permits: Arc<Semaphore>,
    submitted: AtomicU64,
    config: SchedulerConfig,
}

impl Drop for SchedulerInner {
    fn drop(&mut self) {
        self.permits.close();
        // Queued operations resolve with AsyncFailure; running native calls
        // finish on their own threads.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
        debug!("Scheduler stopped");
    }
}

/// Worker pool for native calls. Cheap to clone.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    /// Create a scheduler with its own runtime.
    pub fn new(config: SchedulerConfig) -> SendResult<Self> {
        let max_workers = config.max_workers.max(1);
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(max_workers)
            .thread_name(config.thread_name.clone())
            .enable_time()
            .build()
            .map_err(|e| SendError::AsyncFailure(format!("failed to start worker pool: {e}")))?;

        debug!(max_workers, "Scheduler started");
        Ok(Self {
            inner: Arc::new(SchedulerInner {
                handle: runtime.handle().clone(),
                runtime: Some(runtime),
                permits: Arc::new(Semaphore::new(max_workers)),
                submitted: AtomicU64::new(0),
                config,
            }),
        })
    }

    /// Scheduler configuration.
    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// Operations handed to the worker pool so far.
    pub fn submitted(&self) -> u64 {
        self.inner.submitted.load(Ordering::SeqCst)
    }

    /// Run `work` on a worker, then `complete` on the awaiting task.
    ///
    /// If the returned operation is dropped before it resolves, the work
    /// still runs and its output is dropped without calling `complete`.
    pub fn submit<W, R, C, T>(&self, label: &'static str, work: W, complete: C) -> Operation<T>
    where
        W: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
        C: FnOnce(R) -> SendResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel::<Completion<T>>();
        let permits = Arc::clone(&self.inner.permits);
        let id = self.inner.submitted.fetch_add(1, Ordering::SeqCst) + 1;
        trace!(label, id, "Operation submitted");

        self.inner.handle.spawn(async move {
            let permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    debug!(label, id, "Worker pool closed before operation ran");
                    return;
                }
            };

            let joined = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                work()
            })
            .await;

            let completion: Completion<T> = match joined {
                Ok(output) => Box::new(move || complete(output)),
                Err(e) => {
                    error!(label, id, "Worker failed: {}", e);
                    let message = format!("{label} worker did not complete: {e}");
                    Box::new(move || Err(SendError::AsyncFailure(message)))
                }
            };

            if tx.send(completion).is_err() {
                trace!(label, id, "Operation dropped before completion");
            }
        });

        Operation {
            state: OperationState::Pending(rx),
        }
    }
}

enum OperationState<T> {
    Immediate(Option<SendResult<T>>),
    Pending(oneshot::Receiver<Completion<T>>),
    Done,
}

/// Caller-visible result of an asynchronous sender operation.
///
/// Resolves exactly once. Validation failures come back as already
/// rejected operations rather than as synchronous errors.
#[must_use = "operations do nothing visible unless awaited"]
pub struct Operation<T> {
    state: OperationState<T>,
}

impl<T> Operation<T> {
    /// An operation that is already rejected.
    pub fn rejected(error: SendError) -> Self {
        Self {
            state: OperationState::Immediate(Some(Err(error))),
        }
    }

    /// An operation that is already resolved.
    pub fn resolved(value: T) -> Self {
        Self {
            state: OperationState::Immediate(Some(Ok(value))),
        }
    }

    /// Returns true if no worker task backs this operation.
    pub fn is_immediate(&self) -> bool {
        matches!(self.state, OperationState::Immediate(_))
    }
}

// The output is moved out, never pinned in place.
impl<T> Unpin for Operation<T> {}

impl<T> Future for Operation<T> {
    type Output = SendResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        let received = match &mut this.state {
            OperationState::Immediate(result) => {
                let result = result.take().unwrap_or_else(|| Err(polled_after_completion()));
                this.state = OperationState::Done;
                return Poll::Ready(result);
            }
            OperationState::Pending(rx) => match Pin::new(rx).poll(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(received) => received,
            },
            OperationState::Done => return Poll::Ready(Err(polled_after_completion())),
        };

        this.state = OperationState::Done;
        Poll::Ready(match received {
            Ok(complete) => complete(),
            Err(_) => Err(SendError::AsyncFailure(
                "worker dropped the operation".to_string(),
            )),
        })
    }
}

fn polled_after_completion() -> SendError {
    SendError::AsyncFailure("operation polled after completion".to_string())
}
