//! In-process task broker.
//!
//! Two named queues, `default` and `dedicated`, each drained by its own pool
//! of worker tasks. Producers submit through a cloneable [`Dispatcher`],
//! which routes every task by kind. Ranking requests carry a reply channel so
//! the submitter can wait on the result through a [`TaskHandle`], bounded by
//! a deadline.

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use meetnews_shared::{
    CandidateItem, MeetNewsError, ProcessNewsRequest, QueuesConfig, RankRequest, Result, TaskId,
};

use crate::router::{QueueName, Router, TaskKind};

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// A unit of work carried by the broker.
#[derive(Debug)]
pub enum Task {
    ProcessNews(ProcessNewsRequest),
    RankSimilarity {
        request: RankRequest,
        reply: oneshot::Sender<Result<Vec<CandidateItem>>>,
    },
}

impl Task {
    pub fn kind(&self) -> TaskKind {
        match self {
            Self::ProcessNews(_) => TaskKind::ProcessNews,
            Self::RankSimilarity { .. } => TaskKind::RankSimilarity,
        }
    }
}

/// Where and as what a task is running.
#[derive(Debug, Clone, Copy)]
pub struct TaskContext {
    pub id: TaskId,
    pub queue: QueueName,
}

/// Runs tasks pulled off a queue.
#[async_trait]
pub trait TaskExecutor: Send + Sync + 'static {
    async fn execute(&self, ctx: TaskContext, task: Task);
}

struct Envelope {
    id: TaskId,
    task: Task,
}

type QueueSender = mpsc::UnboundedSender<Envelope>;
type QueueReceiver = mpsc::UnboundedReceiver<Envelope>;

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

struct DispatcherInner {
    router: Router,
    default: RwLock<Option<QueueSender>>,
    dedicated: RwLock<Option<QueueSender>>,
}

/// Submits tasks to the queue their kind routes to.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

impl Dispatcher {
    fn slot(&self, queue: QueueName) -> &RwLock<Option<QueueSender>> {
        match queue {
            QueueName::Default => &self.inner.default,
            QueueName::Dedicated => &self.inner.dedicated,
        }
    }

    /// Enqueue a task and return its id. Fails only if the queue is closed.
    pub fn submit(&self, task: Task) -> Result<TaskId> {
        let kind = task.kind();
        let queue = self.inner.router.route(kind);
        let id = TaskId::new();

        let guard = self
            .slot(queue)
            .read()
            .map_err(|_| MeetNewsError::Queue(format!("{queue} queue lock poisoned")))?;
        let sender = guard
            .as_ref()
            .ok_or_else(|| MeetNewsError::Queue(format!("{queue} queue is closed")))?;
        sender
            .send(Envelope { id, task })
            .map_err(|_| MeetNewsError::Queue(format!("{queue} queue is closed")))?;

        debug!(task_id = %id, %kind, %queue, "task enqueued");
        Ok(id)
    }

    /// Enqueue an orchestrator task.
    pub fn enqueue_process_news(&self, request: ProcessNewsRequest) -> Result<TaskId> {
        self.submit(Task::ProcessNews(request))
    }

    /// Enqueue a ranking task and return a handle to wait on its result.
    pub fn delegate_rank(&self, request: RankRequest) -> Result<TaskHandle<Vec<CandidateItem>>> {
        let (reply, rx) = oneshot::channel();
        let id = self.submit(Task::RankSimilarity { request, reply })?;
        Ok(TaskHandle {
            id,
            kind: TaskKind::RankSimilarity,
            rx,
        })
    }

    /// Stop accepting tasks for `queue`. Already queued tasks stay queued.
    fn close(&self, queue: QueueName) {
        match self.slot(queue).write() {
            Ok(mut guard) => {
                guard.take();
            }
            Err(poisoned) => {
                poisoned.into_inner().take();
            }
        }
    }
}

// ---------------------------------------------------------------------------
// TaskHandle
// ---------------------------------------------------------------------------

/// Pending result of a submitted task.
pub struct TaskHandle<T> {
    id: TaskId,
    kind: TaskKind,
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> TaskHandle<T> {
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Wait for the result for at most `timeout`.
    ///
    /// Timing out only abandons the wait: the task itself keeps running and
    /// its result is discarded.
    pub async fn wait(self, timeout: Duration) -> Result<T> {
        match tokio::time::timeout(timeout, self.rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(MeetNewsError::Queue(format!(
                "{} task {} ended without a reply",
                self.kind, self.id
            ))),
            Err(_) => Err(MeetNewsError::Timeout {
                what: format!("{} task {}", self.kind, self.id),
                secs: timeout.as_secs(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Broker
// ---------------------------------------------------------------------------

/// Worker counts per pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSizes {
    pub default: usize,
    pub dedicated: usize,
}

impl From<&QueuesConfig> for PoolSizes {
    fn from(config: &QueuesConfig) -> Self {
        Self {
            default: config.default_concurrency.max(1) as usize,
            dedicated: config.dedicated_concurrency.max(1) as usize,
        }
    }
}

impl Default for PoolSizes {
    fn default() -> Self {
        Self::from(&QueuesConfig::default())
    }
}

/// The running worker pools.
pub struct Broker {
    dispatcher: Dispatcher,
    default_workers: Vec<JoinHandle<()>>,
    dedicated_workers: Vec<JoinHandle<()>>,
}

impl Broker {
    /// Create both queues and spawn their worker pools.
    ///
    /// `make_executor` receives the dispatcher so executors can submit
    /// follow-up tasks. Must be called inside a Tokio runtime.
    pub fn start<F>(router: Router, sizes: PoolSizes, make_executor: F) -> Self
    where
        F: FnOnce(Dispatcher) -> Arc<dyn TaskExecutor>,
    {
        let (default_tx, default_rx) = mpsc::unbounded_channel();
        let (dedicated_tx, dedicated_rx) = mpsc::unbounded_channel();

        let dispatcher = Dispatcher {
            inner: Arc::new(DispatcherInner {
                router,
                default: RwLock::new(Some(default_tx)),
                dedicated: RwLock::new(Some(dedicated_tx)),
            }),
        };

        let executor = make_executor(dispatcher.clone());
        let default_workers =
            spawn_pool(QueueName::Default, sizes.default, default_rx, executor.clone());
        let dedicated_workers =
            spawn_pool(QueueName::Dedicated, sizes.dedicated, dedicated_rx, executor);

        info!(
            default = sizes.default,
            dedicated = sizes.dedicated,
            "broker started"
        );

        Self {
            dispatcher,
            default_workers,
            dedicated_workers,
        }
    }

    pub fn dispatcher(&self) -> Dispatcher {
        self.dispatcher.clone()
    }

    /// Close the queues and wait for workers to drain them.
    ///
    /// The default pool drains first, while ranking is still accepted, so
    /// orchestrator tasks already queued can still delegate.
    pub async fn shutdown(self) {
        info!("broker draining");

        self.dispatcher.close(QueueName::Default);
        join_pool(QueueName::Default, self.default_workers).await;

        self.dispatcher.close(QueueName::Dedicated);
        join_pool(QueueName::Dedicated, self.dedicated_workers).await;

        info!("broker stopped");
    }
}

fn spawn_pool(
    queue: QueueName,
    size: usize,
    rx: QueueReceiver,
    executor: Arc<dyn TaskExecutor>,
) -> Vec<JoinHandle<()>> {
    let rx = Arc::new(Mutex::new(rx));
    (0..size.max(1))
        .map(|worker| tokio::spawn(worker_loop(queue, worker, rx.clone(), executor.clone())))
        .collect()
}

async fn join_pool(queue: QueueName, workers: Vec<JoinHandle<()>>) {
    for handle in workers {
        if let Err(e) = handle.await {
            error!(%queue, error = %e, "worker ended abnormally");
        }
    }
}

async fn worker_loop(
    queue: QueueName,
    worker: usize,
    rx: Arc<Mutex<QueueReceiver>>,
    executor: Arc<dyn TaskExecutor>,
) {
    debug!(%queue, worker, "worker started");

    loop {
        let next = rx.lock().await.recv().await;
        let Some(Envelope { id, task }) = next else {
            break;
        };

        let kind = task.kind();
        let ctx = TaskContext { id, queue };
        let exec = executor.clone();
        let start = Instant::now();

        // Run in its own task so a panic only loses this task.
        match tokio::spawn(async move { exec.execute(ctx, task).await }).await {
            Ok(()) => debug!(
                task_id = %id,
                %kind,
                %queue,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "task finished"
            ),
            Err(e) => error!(task_id = %id, %kind, %queue, error = %e, "task panicked"),
        }
    }

    debug!(%queue, worker, "worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records what ran where; ranking echoes the candidates back.
    #[derive(Default)]
    struct Recorder {
        seen: std::sync::Mutex<Vec<(TaskKind, QueueName)>>,
        rank_delay: Duration,
        rank_completed: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        drop_reply: bool,
    }

    #[async_trait]
    impl TaskExecutor for Recorder {
        async fn execute(&self, ctx: TaskContext, task: Task) {
            self.seen.lock().unwrap().push((task.kind(), ctx.queue));
            match task {
                Task::ProcessNews(_) => {}
                Task::RankSimilarity { request, reply } => {
                    let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    self.max_in_flight.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(self.rank_delay).await;
                    self.in_flight.fetch_sub(1, Ordering::SeqCst);
                    self.rank_completed.fetch_add(1, Ordering::SeqCst);
                    if !self.drop_reply {
                        let _ = reply.send(Ok(request.candidates));
                    }
                }
            }
        }
    }

    fn sizes(default: usize, dedicated: usize) -> PoolSizes {
        PoolSizes { default, dedicated }
    }

    fn start(recorder: Arc<Recorder>, pools: PoolSizes) -> Broker {
        Broker::start(Router::default(), pools, move |_| recorder as Arc<dyn TaskExecutor>)
    }

    fn process_request(id: i64) -> ProcessNewsRequest {
        ProcessNewsRequest::new(id, 1, "summary", vec!["kw".into()])
    }

    fn rank_request(n: usize) -> RankRequest {
        let items = (0..n)
            .map(|i| CandidateItem::new(format!("u{i}"), "t", "body"))
            .collect();
        RankRequest::new("query", items, 5)
    }

    #[tokio::test]
    async fn ranking_runs_on_dedicated_queue() {
        let recorder = Arc::new(Recorder::default());
        let broker = start(recorder.clone(), sizes(2, 1));
        let dispatcher = broker.dispatcher();

        dispatcher.enqueue_process_news(process_request(1)).unwrap();
        let handle = dispatcher.delegate_rank(rank_request(3)).unwrap();
        let ranked = handle.wait(Duration::from_secs(5)).await.unwrap();
        assert_eq!(ranked.len(), 3);

        broker.shutdown().await;

        let seen = recorder.seen.lock().unwrap().clone();
        assert!(seen.contains(&(TaskKind::RankSimilarity, QueueName::Dedicated)));
        assert!(seen.contains(&(TaskKind::ProcessNews, QueueName::Default)));
    }

    #[tokio::test]
    async fn wait_times_out_but_task_completes() {
        let recorder = Arc::new(Recorder {
            rank_delay: Duration::from_millis(300),
            ..Default::default()
        });
        let broker = start(recorder.clone(), sizes(1, 1));

        let handle = broker.dispatcher().delegate_rank(rank_request(2)).unwrap();
        let err = handle.wait(Duration::from_millis(20)).await.unwrap_err();
        assert!(matches!(err, MeetNewsError::Timeout { .. }));

        broker.shutdown().await;
        assert_eq!(recorder.rank_completed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_reply_is_queue_error() {
        let recorder = Arc::new(Recorder {
            drop_reply: true,
            ..Default::default()
        });
        let broker = start(recorder, sizes(1, 1));

        let handle = broker.dispatcher().delegate_rank(rank_request(1)).unwrap();
        let err = handle.wait(Duration::from_secs(5)).await.unwrap_err();
        assert!(err.to_string().contains("without a reply"));

        broker.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_drains_queued_tasks() {
        let recorder = Arc::new(Recorder::default());
        let broker = start(recorder.clone(), sizes(1, 1));
        let dispatcher = broker.dispatcher();

        for id in 0..5 {
            dispatcher.enqueue_process_news(process_request(id)).unwrap();
        }
        broker.shutdown().await;

        assert_eq!(recorder.seen.lock().unwrap().len(), 5);
        let err = dispatcher.enqueue_process_news(process_request(9)).unwrap_err();
        assert!(err.to_string().contains("closed"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn dedicated_pool_of_one_runs_serially() {
        let recorder = Arc::new(Recorder {
            rank_delay: Duration::from_millis(30),
            ..Default::default()
        });
        let broker = start(recorder.clone(), sizes(4, 1));
        let dispatcher = broker.dispatcher();

        let handles: Vec<_> = (0..3)
            .map(|_| dispatcher.delegate_rank(rank_request(1)).unwrap())
            .collect();
        for handle in handles {
            handle.wait(Duration::from_secs(5)).await.unwrap();
        }
        broker.shutdown().await;

        assert_eq!(recorder.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.rank_completed.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn pool_sizes_from_config() {
        let config = QueuesConfig {
            default_concurrency: 0,
            ..QueuesConfig::default()
        };
        assert_eq!(PoolSizes::from(&config), sizes(1, 1));
        assert_eq!(PoolSizes::from(&QueuesConfig::default()), sizes(4, 1));
    }
}
