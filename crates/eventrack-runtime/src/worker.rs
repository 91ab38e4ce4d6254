//! In-process task queue backed by the tokio runtime.
//!
//! [`TokioTaskQueue`] is the [`TaskQueue`] the runtime hands to
//! `async_routing` nodes. Tasks go through an unbounded channel to a worker
//! loop, which runs each one on the blocking pool with
//! [`send_event`]. Retryable failures are run again after the policy's
//! countdown until the retry budget is spent.
//!
//! ```text
//!   AsyncRoutingNode::send ──► enqueue ──► channel ──► worker loop
//!                                                          │
//!                                        spawn_blocking(send_event)
//!                                                          │
//!                                  retryable? ── sleep(countdown) ──► again
//! ```

use std::sync::Arc;

use eventrack_core::{OffloadError, OffloadTask, RetryPolicy, TaskQueue, TrackerRegistry, send_event};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::error::RuntimeResult;

/// A [`TaskQueue`] executed by a worker on the current tokio runtime.
#[derive(Debug)]
pub struct TokioTaskQueue {
    sender: mpsc::UnboundedSender<OffloadTask>,
    shutdown_token: CancellationToken,
    tasks: TaskTracker,
}

impl TokioTaskQueue {
    /// Starts the worker on the current tokio runtime.
    ///
    /// Fails when called outside of a runtime.
    pub fn start(registry: Arc<TrackerRegistry>, policy: RetryPolicy) -> RuntimeResult<Arc<Self>> {
        let handle = Handle::try_current()?;
        let (sender, receiver) = mpsc::unbounded_channel();
        let queue = Arc::new(Self {
            sender,
            shutdown_token: CancellationToken::new(),
            tasks: TaskTracker::new(),
        });

        let worker = Worker {
            registry,
            policy,
            shutdown_token: queue.shutdown_token.clone(),
            tasks: queue.tasks.clone(),
        };
        queue.tasks.spawn_on(worker.run(receiver), &handle);
        debug!(
            max_retries = policy.max_retries,
            countdown = ?policy.countdown,
            "Offload worker started"
        );
        Ok(queue)
    }

    /// Returns the token cancelled on shutdown.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Returns `true` once [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// Stops accepting tasks and waits for the worker loop and running tasks
    /// to finish.
    ///
    /// Tasks waiting for a retry are abandoned.
    pub async fn shutdown(&self) {
        self.shutdown_token.cancel();
        self.tasks.close();
        self.tasks.wait().await;
        info!("Offload worker stopped");
    }
}

impl TaskQueue for TokioTaskQueue {
    fn enqueue(&self, task: OffloadTask) -> Result<(), OffloadError> {
        if self.shutdown_token.is_cancelled() {
            return Err(OffloadError::Enqueue("queue is shut down".into()));
        }
        self.sender
            .send(task)
            .map_err(|_| OffloadError::Enqueue("queue is shut down".into()))
    }
}

// =============================================================================
// Worker
// =============================================================================

struct Worker {
    registry: Arc<TrackerRegistry>,
    policy: RetryPolicy,
    shutdown_token: CancellationToken,
    tasks: TaskTracker,
}

impl Worker {
    async fn run(self, mut receiver: mpsc::UnboundedReceiver<OffloadTask>) {
        let worker = Arc::new(self);
        loop {
            tokio::select! {
                biased;
                _ = worker.shutdown_token.cancelled() => break,
                task = receiver.recv() => match task {
                    Some(task) => {
                        let runner = Arc::clone(&worker);
                        worker.tasks.spawn(async move { runner.execute(task).await });
                    }
                    None => break,
                },
            }
        }
        receiver.close();
        let dropped = std::iter::from_fn(|| receiver.try_recv().ok()).count();
        if dropped > 0 {
            warn!(dropped, "Offload worker stopped with queued tasks");
        }
    }

    async fn execute(&self, mut task: OffloadTask) {
        loop {
            let registry = Arc::clone(&self.registry);
            let attempt = task.clone();
            let result = tokio::task::spawn_blocking(move || send_event(&registry, &attempt)).await;

            let err = match result {
                Ok(Ok(())) => {
                    debug!(
                        tracker = %task.tracker_name,
                        backend = %task.backend_name,
                        attempt = task.attempt,
                        "Offloaded event dispatched"
                    );
                    return;
                }
                Ok(Err(err)) => err,
                Err(join_err) => {
                    error!(
                        backend = %task.backend_name,
                        error = %join_err,
                        "Offloaded event panicked during dispatch"
                    );
                    return;
                }
            };

            if !self.policy.should_retry(task.attempt, &err) {
                error!(
                    tracker = %task.tracker_name,
                    backend = %task.backend_name,
                    attempt = task.attempt,
                    error = %err,
                    "Giving up on offloaded event"
                );
                return;
            }

            warn!(
                backend = %task.backend_name,
                attempt = task.attempt,
                error = %err,
                retry_in = ?self.policy.countdown,
                "Offloaded event failed, retrying"
            );
            tokio::select! {
                _ = self.shutdown_token.cancelled() => {
                    warn!(backend = %task.backend_name, "Retry abandoned on shutdown");
                    return;
                }
                _ = tokio::time::sleep(self.policy.countdown) => {}
            }
            task = task.retry();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventrack_core::{AsyncRoutingNode, MemorySink, RoutingNode, Tracker};
    use std::time::Duration;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            countdown: Duration::from_millis(20),
        }
    }

    fn offload_tracker(queue: Arc<TokioTaskQueue>, sink: Arc<MemorySink>) -> Tracker {
        let inner = RoutingNode::new().with_backend("memory", sink);
        let offload = AsyncRoutingNode::new(inner, "async", queue as Arc<dyn TaskQueue>);
        Tracker::new(RoutingNode::new().with_backend("async", offload))
    }

    async fn wait_for(sink: &MemorySink, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while sink.len() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("events were not delivered in time");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_delivers_through_async_node() {
        let registry = Arc::new(TrackerRegistry::new());
        let queue = TokioTaskQueue::start(registry.clone(), fast_policy()).unwrap();
        let sink = Arc::new(MemorySink::new());
        let tracker = registry.register_default(offload_tracker(queue.clone(), sink.clone()));

        tracker.emit_name("first");
        tracker.emit_name("second");
        wait_for(&sink, 2).await;

        let mut names: Vec<_> = sink.events().iter().map(|e| e.name().to_string()).collect();
        names.sort();
        assert_eq!(names, ["first", "second"]);
        queue.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_retries_until_tracker_registered() {
        let registry = Arc::new(TrackerRegistry::new());
        let queue = TokioTaskQueue::start(registry.clone(), fast_policy()).unwrap();
        let sink = Arc::new(MemorySink::new());

        queue
            .enqueue(OffloadTask::new("late", "async", r#"{"name": "x"}"#))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        registry.register("late", offload_tracker(queue.clone(), sink.clone()));

        wait_for(&sink, 1).await;
        assert_eq!(sink.events()[0].name(), "x");
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_enqueue_after_shutdown() {
        let queue = TokioTaskQueue::start(Arc::new(TrackerRegistry::new()), fast_policy()).unwrap();
        queue.shutdown().await;

        assert!(queue.is_shut_down());
        let err = queue
            .enqueue(OffloadTask::new("default", "async", "{}"))
            .unwrap_err();
        assert!(matches!(err, OffloadError::Enqueue(_)));
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_worker_loop() {
        let queue = TokioTaskQueue::start(Arc::new(TrackerRegistry::new()), fast_policy()).unwrap();
        assert_eq!(queue.tasks.len(), 1);

        queue
            .enqueue(OffloadTask::new("missing", "async", "{}"))
            .unwrap();
        queue.shutdown().await;

        assert!(queue.tasks.is_closed());
        assert!(queue.tasks.is_empty());
    }

    #[test]
    fn test_start_outside_runtime() {
        let result = TokioTaskQueue::start(Arc::new(TrackerRegistry::new()), fast_policy());
        assert!(matches!(result, Err(crate::error::RuntimeError::NoRuntime(_))));
    }
}
