//! Task records exchanged between caller threads and the stream worker.

use super::engine::StreamEngine;
use crate::error::{PlaybackError, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::trace;

/// Worker-side identity of a streamed source.
pub(crate) type SourceKey = u64;

/// Operation carried by a [`Task`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub(crate) enum TaskAction {
    /// Pooled record with nothing to do.
    #[default]
    Idle,
    /// Hand a freshly opened engine over to the worker.
    Register,
    Play,
    Pause,
    Stop,
    Seek {
        seconds: f64,
    },
    /// Refill the buffer rings of every registered source.
    RefillAll,
    /// Drop the engine and acknowledge to the disposing caller.
    DisposeCallback,
    PauseAll,
    ResumeAll,
    StopAll,
    /// Exit the worker loop.
    Shutdown,
}

impl TaskAction {
    /// Whether the action applies to every source instead of a single target.
    pub(crate) fn is_broadcast(&self) -> bool {
        matches!(
            self,
            Self::RefillAll | Self::PauseAll | Self::ResumeAll | Self::StopAll | Self::Shutdown
        )
    }
}

/// Unit of work for the stream worker.
#[derive(Default)]
pub(crate) struct Task {
    pub target: Option<SourceKey>,
    pub action: TaskAction,
    pub engine: Option<Box<StreamEngine>>,
}

impl Task {
    /// Clear the record before it goes back to the pool.
    pub(crate) fn reset(&mut self) {
        self.target = None;
        self.action = TaskAction::Idle;
        self.engine = None;
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("target", &self.target)
            .field("action", &self.action)
            .field("engine", &self.engine.as_ref().map(|_| "StreamEngine { ... }"))
            .finish()
    }
}

/// Free list of boxed task records.
///
/// Holds at most `capacity` idle records; extra records released beyond that
/// are dropped.
#[derive(Debug)]
pub(crate) struct TaskPool {
    idle: Mutex<Vec<Box<Task>>>,
    capacity: usize,
}

impl TaskPool {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            idle: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
        }
    }

    pub(crate) fn acquire(&self, target: Option<SourceKey>, action: TaskAction) -> Box<Task> {
        let mut task = self.idle.lock().pop().unwrap_or_default();
        task.target = target;
        task.action = action;
        task
    }

    pub(crate) fn release(&self, mut task: Box<Task>) {
        task.reset();
        let mut idle = self.idle.lock();
        if idle.len() < self.capacity {
            idle.push(task);
        }
    }

    pub(crate) fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }
}

/// Sending half of the worker queue.
#[derive(Debug, Clone)]
pub(crate) struct TaskQueue {
    sender: UnboundedSender<Box<Task>>,
    pool: Arc<TaskPool>,
}

impl TaskQueue {
    pub(crate) fn new(sender: UnboundedSender<Box<Task>>, pool: Arc<TaskPool>) -> Self {
        Self { sender, pool }
    }

    /// Enqueue an action for `target`, or for every source when `target` is `None`.
    pub(crate) fn post(&self, target: Option<SourceKey>, action: TaskAction) -> Result<()> {
        debug_assert!(
            target.is_some() != action.is_broadcast(),
            "{:?} posted with target {:?}",
            action,
            target
        );
        let task = self.pool.acquire(target, action);
        self.send(task)
    }

    /// Transfer ownership of an engine to the worker.
    pub(crate) fn register(&self, key: SourceKey, engine: Box<StreamEngine>) -> Result<()> {
        let mut task = self.pool.acquire(Some(key), TaskAction::Register);
        task.engine = Some(engine);
        self.send(task)
    }

    fn send(&self, task: Box<Task>) -> Result<()> {
        trace!(target_key = ?task.target, action = ?task.action, "Posting task");
        self.sender.send(task).map_err(|rejected| {
            self.pool.release(rejected.0);
            PlaybackError::EngineShutDown
        })
    }

    pub(crate) fn pool(&self) -> &Arc<TaskPool> {
        &self.pool
    }
}
