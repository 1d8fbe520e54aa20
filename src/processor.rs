use crate::config::Config;
use crate::errors::{ProcessingError, QueueError};
use crate::queue::{QueueClient, ReceiveRequest};
use crate::store::ObjectStore;
use crate::work::{MessageWorker, Processed};
use futures::future::join_all;
use std::fmt::{self, Display};
use std::panic;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorState {
    Running,
    Draining,
    Stopped,
}

impl Display for ProcessorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessorState::Running => write!(f, "RUNNING"),
            ProcessorState::Draining => write!(f, "DRAINING"),
            ProcessorState::Stopped => write!(f, "STOPPED"),
        }
    }
}

/// How the drain phase of a shutdown ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Every in-flight task settled within the drain budget
    Clean,
    /// The budget expired; the abandoned messages are redelivered once their
    /// visibility timeout lapses
    Forced { abandoned: usize },
}

/// Result counts of one poll cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub received: usize,
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy)]
struct PollSettings {
    receive: ReceiveRequest,
    interval: Duration,
    drain_budget: Duration,
    drain_check_interval: Duration,
}

/// Counts tasks that have been launched but not yet settled
#[derive(Debug, Clone, Default)]
struct ActiveTasks(Arc<AtomicUsize>);

impl ActiveTasks {
    fn track(&self) -> TaskGuard {
        self.0.fetch_add(1, Ordering::SeqCst);
        TaskGuard(Arc::clone(&self.0))
    }

    fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Decrements the active count when the owning task settles, panics included
struct TaskGuard(Arc<AtomicUsize>);

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

type TaskResult = Result<Processed, ProcessingError>;

tokio::task_local! {
    /// Id of the message the current task is processing
    static MESSAGE_TASK: String;
}

/// Routes uncaught faults into the regular drain path instead of aborting.
///
/// A panic inside a message task only fails that message: the task's join
/// handle reports it and polling carries on. Any other panic cancels
/// `shutdown`.
pub fn install_panic_hook(shutdown: CancellationToken) {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        default_hook(info);
        match MESSAGE_TASK.try_with(|id| id.clone()) {
            Ok(message_id) => error!("Message {} panicked: {}", message_id, info),
            Err(_) => {
                error!("Uncaught fault, initiating graceful shutdown: {}", info);
                shutdown.cancel();
            }
        }
    }));
}

/// This is the main loop for processing messages from a queue
///
/// Each cycle receives one batch, runs a task per message and waits for the
/// whole batch to settle before the next receive, so at most one batch is in
/// flight at a time.
pub struct Processor<Q, S> {
    queue: Arc<Q>,
    worker: Arc<MessageWorker<Q, S>>,
    settings: PollSettings,
    active: ActiveTasks,
    state: watch::Sender<ProcessorState>,
}

impl<Q, S> Processor<Q, S>
where
    Q: QueueClient + Send + Sync + 'static,
    S: ObjectStore + Send + Sync + 'static,
{
    pub fn new(worker: MessageWorker<Q, S>, config: &Config) -> Self {
        let (state, _) = watch::channel(ProcessorState::Running);
        Processor {
            queue: worker.queue(),
            worker: Arc::new(worker),
            settings: PollSettings {
                receive: config.receive_request(),
                interval: config.poll_interval,
                drain_budget: config.drain_budget,
                drain_check_interval: config.drain_check_interval,
            },
            active: ActiveTasks::default(),
            state,
        }
    }

    pub fn state(&self) -> ProcessorState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ProcessorState> {
        self.state.subscribe()
    }

    pub fn active_tasks(&self) -> usize {
        self.active.count()
    }

    /// Polls until `shutdown` is cancelled, then waits for in-flight tasks
    /// for at most the drain budget.
    pub async fn run(&self, shutdown: CancellationToken) -> DrainOutcome {
        info!(
            "Processor running: {:?} every {:?}",
            &self.settings.receive, &self.settings.interval
        );
        self.poll_until_cancelled(&shutdown).await;

        self.transition(ProcessorState::Draining);
        let outcome = self.drain().await;
        self.transition(ProcessorState::Stopped);
        outcome
    }

    async fn poll_until_cancelled(&self, shutdown: &CancellationToken) {
        while !shutdown.is_cancelled() {
            // Dropping a cycle mid-batch detaches its tasks, it does not abort them
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                result = self.poll_once() => match result {
                    Ok(summary) if summary.received > 0 => info!("Batch settled: {:?}", summary),
                    Ok(_) => debug!("No messages received from queue"),
                    Err(e) => error!("Error polling queue: {}", e),
                },
            }

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = sleep(self.settings.interval) => (),
            }
        }
    }

    /// Runs one poll cycle: receive a batch, process every message
    /// concurrently and wait for all of them to settle.
    pub async fn poll_once(&self) -> Result<BatchSummary, QueueError> {
        trace!("Polling queue");
        let messages = self.queue.receive(&self.settings.receive).await?;
        if messages.is_empty() {
            return Ok(BatchSummary::default());
        }
        info!("Received {} message(s) from queue", messages.len());

        let handles: Vec<JoinHandle<TaskResult>> = messages
            .into_iter()
            .map(|message| {
                let guard = self.active.track();
                let worker = Arc::clone(&self.worker);
                let message_id = message.id.clone();
                tokio::spawn(MESSAGE_TASK.scope(message_id.clone(), async move {
                    let _guard = guard;
                    let result = worker.process(message).await;
                    if let Err(ref e) = result {
                        error!("Error processing message {}: {}", message_id, e);
                    }
                    result
                }))
            })
            .collect();

        let mut summary = BatchSummary {
            received: handles.len(),
            ..BatchSummary::default()
        };
        for settled in join_all(handles).await {
            match settled {
                Ok(Ok(_)) => summary.succeeded += 1,
                Ok(Err(_)) => summary.failed += 1,
                Err(e) => {
                    error!("Message task panicked: {}", e);
                    summary.failed += 1;
                }
            }
        }
        Ok(summary)
    }

    async fn drain(&self) -> DrainOutcome {
        let started = Instant::now();
        loop {
            let active = self.active.count();
            if active == 0 {
                info!("All in-flight messages settled");
                return DrainOutcome::Clean;
            }
            if started.elapsed() >= self.settings.drain_budget {
                warn!(
                    "Forcing shutdown with {} active message(s) after {:?}",
                    active, self.settings.drain_budget
                );
                return DrainOutcome::Forced { abandoned: active };
            }
            info!("Waiting for {} active message(s) to complete...", active);
            let remaining = self.settings.drain_budget.saturating_sub(started.elapsed());
            sleep(remaining.min(self.settings.drain_check_interval)).await;
        }
    }

    fn transition(&self, next: ProcessorState) {
        let previous = self.state.send_replace(next);
        info!("Processor state {} -> {}", previous, next);
    }
}
