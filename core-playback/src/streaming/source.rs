//! Caller-side handle of a streamed source.

use super::engine::{DeviceHandles, LoopPoints, SharedState, StreamEngine};
use super::manager::StreamManager;
use super::task::{SourceKey, TaskAction, TaskQueue};
use crate::config::{StreamState, StreamingStats};
use crate::error::{PlaybackError, Result};
use crate::stream::AudioStream;
use bridge_traits::PlaybackDevice;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

const DISPOSE_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// A long sound played through a ring of device buffers refilled in the
/// background.
///
/// Control calls update the visible state immediately and are carried out
/// asynchronously by the manager's worker, in call order.
pub struct StreamedSource {
    key: SourceKey,
    queue: TaskQueue,
    device: Arc<dyn PlaybackDevice>,
    handles: DeviceHandles,
    shared: Arc<SharedState>,
    seconds_per_buffer: f64,
    duration: Option<Duration>,
    dispose_timeout: Duration,
    disposed: bool,
}

impl StreamedSource {
    /// Create the device source for `stream`, prefill its buffers and hand it
    /// to the manager's worker.
    ///
    /// # Errors
    ///
    /// - `UnsupportedFormat` if the device cannot play the stream layout; no
    ///   device resource is created in that case
    /// - `Device` if the device fails to allocate or fill the buffers
    /// - `EngineShutDown` if the manager is shut down
    #[instrument(skip_all, fields(source = %stream.source()))]
    pub fn open(manager: &StreamManager, stream: AudioStream) -> Result<Self> {
        if manager.is_shut_down() {
            return Err(PlaybackError::EngineShutDown);
        }
        let context = manager.context();
        let key = manager.next_key();
        let duration = stream.duration();
        let shared = Arc::new(SharedState::new());

        let engine = StreamEngine::new(key, context, stream, Arc::clone(&shared))?;
        let handles = engine.handles().clone();
        let seconds_per_buffer = engine.seconds_per_buffer();

        let device = Arc::clone(context.device());
        if let Err(e) = manager.queue().register(key, Box::new(engine)) {
            handles.release(device.as_ref());
            return Err(e);
        }

        info!(key, ?duration, seconds_per_buffer, "Streamed source opened");
        Ok(Self {
            key,
            queue: manager.queue().clone(),
            device,
            handles,
            shared,
            seconds_per_buffer,
            duration,
            dispose_timeout: context.config().dispose_timeout,
            disposed: false,
        })
    }

    pub fn play(&self) -> Result<()> {
        self.shared.set_state(StreamState::Playing);
        self.post(TaskAction::Play)
    }

    /// Pause playback. Ignored when the source is stopped.
    pub fn pause(&self) -> Result<()> {
        if self.shared.state() == StreamState::Stopped {
            return Ok(());
        }
        self.shared.set_state(StreamState::Paused);
        self.post(TaskAction::Pause)
    }

    /// Stop playback and rewind to the start.
    pub fn stop(&self) -> Result<()> {
        self.shared.set_state(StreamState::Stopped);
        self.post(TaskAction::Stop)
    }

    /// Move the play cursor to `seconds`.
    ///
    /// Negative positions are logged and ignored. Positions past the end stop
    /// the source (or restart it when looping). The play state is kept: a
    /// playing source keeps reporting [`is_playing`](Self::is_playing) while
    /// the worker seeks.
    pub fn set_playback_position(&self, seconds: f64) -> Result<()> {
        if seconds < 0.0 || seconds.is_nan() {
            error!(key = self.key, seconds, "Cannot seek to a negative position");
            return Ok(());
        }
        self.post(TaskAction::Seek { seconds })
    }

    /// Whether the worker is carrying out a seek for this source right now.
    pub fn is_seeking(&self) -> bool {
        self.shared.is_seeking()
    }

    /// Current play position in seconds.
    ///
    /// Sum of the audio before the current decode epoch, the buffers played
    /// since and the device offset into the buffer being played.
    pub fn playback_position(&self) -> f64 {
        self.shared.position_base()
            + self.shared.processed_buffers() as f64 * self.seconds_per_buffer
            + self.device.playback_offset(self.handles.source)
    }

    pub fn set_looping(&self, looping: bool) {
        self.shared.set_looping(looping);
    }

    pub fn is_looping(&self) -> bool {
        self.shared.is_looping()
    }

    /// Repeat only the section between `start` and `end` seconds while
    /// looping.
    ///
    /// Once the stream reaches `end` it continues at `start`. Seeking past
    /// `end` turns the section off and the source plays to the end of the
    /// stream and stops, until it is stopped or seeked back in front of
    /// `end`. Points past the end of the stream are accepted; an `end` beyond
    /// the stream loops from the stream end back to `start`. `(0.0, 0.0)`
    /// turns the section off.
    ///
    /// # Errors
    ///
    /// `InvalidLoopPoints` if either point is negative or `start > end`.
    pub fn set_loop_points(&self, start: f64, end: f64) -> Result<()> {
        let points = LoopPoints::new(start, end)?;
        self.shared.set_loop_points(points);
        debug!(key = self.key, start, end, "Loop points set");
        Ok(())
    }

    /// Current loop section as `(start, end)` seconds.
    pub fn loop_points(&self) -> (f64, f64) {
        let points = self.shared.loop_points();
        (points.start, points.end)
    }

    pub fn state(&self) -> StreamState {
        self.shared.state()
    }

    pub fn is_playing(&self) -> bool {
        self.state() == StreamState::Playing
    }

    pub fn is_paused(&self) -> bool {
        self.state() == StreamState::Paused
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == StreamState::Stopped
    }

    /// Length of the stream, `None` if unknown.
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    /// Seconds of audio held by one device buffer.
    pub fn seconds_per_buffer(&self) -> f64 {
        self.seconds_per_buffer
    }

    pub fn stats(&self) -> StreamingStats {
        self.shared.stats()
    }

    /// Stop the source, wait for the worker to release it and delete the
    /// device source and buffers.
    ///
    /// # Errors
    ///
    /// `DisposeTimeout` if the worker does not release the source within
    /// [`dispose_timeout`](crate::StreamingConfig::dispose_timeout); the device
    /// resources are left untouched then.
    pub fn dispose(mut self) -> Result<()> {
        self.dispose_inner()
    }

    fn dispose_inner(&mut self) -> Result<()> {
        if self.disposed {
            return Ok(());
        }
        self.disposed = true;
        self.shared.set_state(StreamState::Stopped);

        let posted = self
            .post(TaskAction::Stop)
            .and_then(|_| self.post(TaskAction::DisposeCallback));
        if let Err(e) = posted {
            debug!(key = self.key, "Dispose without a running worker: {}", e);
        }

        let deadline = Instant::now() + self.dispose_timeout;
        while !self.shared.is_released() {
            if Instant::now() >= deadline {
                warn!(
                    key = self.key,
                    timeout = ?self.dispose_timeout,
                    "Worker did not release the source, leaking device resources"
                );
                return Err(PlaybackError::DisposeTimeout(self.dispose_timeout));
            }
            thread::sleep(DISPOSE_POLL_INTERVAL);
        }

        self.handles.release(self.device.as_ref());
        debug!(key = self.key, "Streamed source disposed");
        Ok(())
    }

    fn post(&self, action: TaskAction) -> Result<()> {
        self.queue.post(Some(self.key), action)
    }
}

impl std::fmt::Debug for StreamedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamedSource")
            .field("key", &self.key)
            .field("handles", &self.handles)
            .field("state", &self.state())
            .field("seconds_per_buffer", &self.seconds_per_buffer)
            .finish()
    }
}

impl Drop for StreamedSource {
    fn drop(&mut self) {
        if let Err(e) = self.dispose_inner() {
            error!(key = self.key, "Failed to dispose streamed source: {}", e);
        }
    }
}
