//! Worker and poller threads serving every streamed source of a context.

use super::engine::StreamEngine;
use super::task::{SourceKey, Task, TaskAction, TaskPool, TaskQueue};
use crate::config::StreamState;
use crate::context::AudioContext;
use crate::error::Result;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tracing::{debug, error, info, warn};

const WORKER_THREAD_NAME: &str = "audio-task-worker";
const POLLER_THREAD_NAME: &str = "audio-stream-poller";
const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Owner of the streaming threads.
///
/// All engine mutation happens on a single worker thread that drains a FIFO
/// task queue. A poller thread wakes every
/// [`poll_interval`](crate::StreamingConfig::poll_interval) and posts a refill
/// pass. Callers only ever post tasks.
///
/// ```text
/// caller threads ──post──┐
///                        ▼
/// poller ──RefillAll──▶ queue ──▶ worker ──▶ engines ──▶ PlaybackDevice
/// ```
pub struct StreamManager {
    context: AudioContext,
    queue: TaskQueue,
    next_key: AtomicU64,
    poller_stop: Arc<AtomicBool>,
    poller: Mutex<Option<JoinHandle<()>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

impl StreamManager {
    /// Spawn the worker and poller threads for `context`.
    pub fn start(context: AudioContext) -> Result<Self> {
        let config = context.config().clone();
        let pool = Arc::new(TaskPool::new(config.task_pool_capacity));
        let (sender, receiver) = unbounded_channel();
        let queue = TaskQueue::new(sender, Arc::clone(&pool));

        let worker = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || run_worker(receiver, pool))?;

        let poller_stop = Arc::new(AtomicBool::new(false));
        let poller = {
            let queue = queue.clone();
            let stop = Arc::clone(&poller_stop);
            let interval = config.poll_interval;
            thread::Builder::new()
                .name(POLLER_THREAD_NAME.to_string())
                .spawn(move || run_poller(queue, stop, interval))
        };
        let poller = match poller {
            Ok(poller) => poller,
            Err(e) => {
                let _ = queue.post(None, TaskAction::Shutdown);
                return Err(e.into());
            }
        };

        info!(
            buffer_count = config.buffer_count,
            poll_interval = ?config.poll_interval,
            "Stream manager started"
        );
        Ok(Self {
            context,
            queue,
            next_key: AtomicU64::new(1),
            poller_stop,
            poller: Mutex::new(Some(poller)),
            worker: Mutex::new(Some(worker)),
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn context(&self) -> &AudioContext {
        &self.context
    }

    /// Pause every playing source.
    pub fn pause_all(&self) -> Result<()> {
        self.queue.post(None, TaskAction::PauseAll)
    }

    /// Resume every paused source.
    pub fn resume_all(&self) -> Result<()> {
        self.queue.post(None, TaskAction::ResumeAll)
    }

    /// Stop every source.
    pub fn stop_all(&self) -> Result<()> {
        self.queue.post(None, TaskAction::StopAll)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Idle task records available for reuse.
    pub fn pooled_tasks(&self) -> usize {
        self.queue.pool().idle_count()
    }

    pub(crate) fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    pub(crate) fn next_key(&self) -> SourceKey {
        self.next_key.fetch_add(1, Ordering::Relaxed)
    }

    /// Stop the poller, drain the worker and join both threads.
    ///
    /// Waits at most `poller_join_timeout` for the poller and
    /// `worker_shutdown_timeout` for the worker; a thread that does not finish
    /// in time is detached with a warning. Calling it again is a no-op.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        let config = self.context.config();

        self.poller_stop.store(true, Ordering::Release);
        if let Some(poller) = self.poller.lock().take() {
            poller.thread().unpark();
            join_bounded(poller, config.poller_join_timeout, POLLER_THREAD_NAME);
        }

        if let Err(e) = self.queue.post(None, TaskAction::Shutdown) {
            debug!("Worker queue already closed: {}", e);
        }
        if let Some(worker) = self.worker.lock().take() {
            join_bounded(worker, config.worker_shutdown_timeout, WORKER_THREAD_NAME);
        }
        info!("Stream manager shut down");
    }
}

impl std::fmt::Debug for StreamManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamManager")
            .field("context", &self.context)
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

impl Drop for StreamManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn join_bounded(handle: JoinHandle<()>, timeout: Duration, name: &str) {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            warn!(thread = name, ?timeout, "Thread did not finish in time, detaching it");
            return;
        }
        thread::sleep(JOIN_POLL_INTERVAL);
    }
    if handle.join().is_err() {
        error!(thread = name, "Thread panicked");
    }
}

fn run_poller(queue: TaskQueue, stop: Arc<AtomicBool>, interval: Duration) {
    debug!("Stream poller running");
    loop {
        thread::park_timeout(interval);
        if stop.load(Ordering::Acquire) {
            break;
        }
        if queue.post(None, TaskAction::RefillAll).is_err() {
            break;
        }
    }
    debug!("Stream poller exiting");
}

fn run_worker(mut receiver: UnboundedReceiver<Box<Task>>, pool: Arc<TaskPool>) {
    let mut engines: HashMap<SourceKey, Box<StreamEngine>> = HashMap::new();
    debug!("Stream worker running");

    while let Some(mut task) = receiver.blocking_recv() {
        let shutdown = task.action == TaskAction::Shutdown;
        handle_task(&mut engines, &mut task);
        pool.release(task);
        if shutdown {
            break;
        }
    }

    info!(remaining = engines.len(), "Stream worker exiting");
}

fn handle_task(engines: &mut HashMap<SourceKey, Box<StreamEngine>>, task: &mut Task) {
    match task.action {
        TaskAction::Idle | TaskAction::Shutdown => {}
        TaskAction::Register => match (task.target, task.engine.take()) {
            (Some(key), Some(engine)) => {
                if engines.insert(key, engine).is_some() {
                    warn!(key, "Replaced an engine registered under the same key");
                }
                debug!(key, sources = engines.len(), "Engine registered");
            }
            _ => error!("Register task without target or engine"),
        },
        TaskAction::RefillAll => {
            for (key, engine) in engines.iter_mut() {
                if let Err(e) = engine.refill() {
                    error!(key, "Refill failed: {}", e);
                }
            }
        }
        TaskAction::PauseAll => {
            for_each_in_state(engines, StreamState::Playing, "pause", |e| e.pause())
        }
        TaskAction::ResumeAll => {
            for_each_in_state(engines, StreamState::Paused, "resume", |e| e.play())
        }
        TaskAction::StopAll => {
            for (key, engine) in engines.iter_mut() {
                if let Err(e) = engine.stop() {
                    error!(key, "Stop failed: {}", e);
                }
            }
        }
        TaskAction::DisposeCallback => {
            if let Some(key) = task.target {
                if engines.remove(&key).is_none() {
                    debug!(key, "Dispose for an unknown source");
                }
            }
        }
        TaskAction::Play | TaskAction::Pause | TaskAction::Stop | TaskAction::Seek { .. } => {
            let Some(key) = task.target else {
                error!(action = ?task.action, "Task without target");
                return;
            };
            let Some(engine) = engines.get_mut(&key) else {
                debug!(key, action = ?task.action, "Task for an unknown source");
                return;
            };
            let result = match task.action {
                TaskAction::Play => engine.play(),
                TaskAction::Pause => engine.pause(),
                TaskAction::Stop => engine.stop(),
                TaskAction::Seek { seconds } => engine.seek(seconds),
                _ => Ok(()),
            };
            if let Err(e) = result {
                error!(key, action = ?task.action, "Stream task failed: {}", e);
                engine.publish_state();
            }
        }
    }
}

fn for_each_in_state(
    engines: &mut HashMap<SourceKey, Box<StreamEngine>>,
    state: StreamState,
    what: &str,
    mut apply: impl FnMut(&mut StreamEngine) -> Result<()>,
) {
    for (key, engine) in engines.iter_mut() {
        if engine.state() != state {
            continue;
        }
        if let Err(e) = apply(engine.as_mut()) {
            error!(key, "Failed to {} source: {}", what, e);
        }
    }
}
