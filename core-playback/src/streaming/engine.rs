//! Per-source streaming state machine driven by the worker thread.
//!
//! A [`StreamEngine`] owns the decoded stream and the device buffer ring of one
//! source. Once registered it is only ever touched by the worker; callers
//! observe it through the atomics of [`SharedState`].

use super::task::SourceKey;
use crate::config::{StreamState, StreamingStats};
use crate::context::AudioContext;
use crate::error::{PlaybackError, Result};
use crate::stream::AudioStream;
use bridge_traits::{BufferId, PcmFormat, PlaybackDevice, SourceId, SourceState};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// State shared between a [`StreamedSource`](super::StreamedSource) handle and
/// its engine.
#[derive(Debug)]
pub(crate) struct SharedState {
    state: AtomicU8,
    looping: AtomicBool,
    seeking: AtomicBool,
    loop_points: Mutex<LoopPoints>,
    processed_buffers: AtomicU64,
    position_base: AtomicU64,
    released: AtomicBool,
    stats: Mutex<StreamingStats>,
}

impl SharedState {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU8::new(StreamState::Stopped.as_u8()),
            looping: AtomicBool::new(false),
            seeking: AtomicBool::new(false),
            loop_points: Mutex::new(LoopPoints::default()),
            processed_buffers: AtomicU64::new(0),
            position_base: AtomicU64::new(0f64.to_bits()),
            released: AtomicBool::new(false),
            stats: Mutex::new(StreamingStats::default()),
        }
    }

    pub(crate) fn state(&self) -> StreamState {
        StreamState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: StreamState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    pub(crate) fn is_looping(&self) -> bool {
        self.looping.load(Ordering::Acquire)
    }

    pub(crate) fn set_looping(&self, looping: bool) {
        self.looping.store(looping, Ordering::Release);
    }

    /// Whether the worker is carrying out a seek right now.
    pub(crate) fn is_seeking(&self) -> bool {
        self.seeking.load(Ordering::Acquire)
    }

    fn set_seeking(&self, seeking: bool) {
        self.seeking.store(seeking, Ordering::Release);
    }

    pub(crate) fn loop_points(&self) -> LoopPoints {
        *self.loop_points.lock()
    }

    pub(crate) fn set_loop_points(&self, points: LoopPoints) {
        *self.loop_points.lock() = points;
    }

    pub(crate) fn processed_buffers(&self) -> u64 {
        self.processed_buffers.load(Ordering::Acquire)
    }

    /// Seconds of audio before the first buffer of the current epoch.
    pub(crate) fn position_base(&self) -> f64 {
        f64::from_bits(self.position_base.load(Ordering::Acquire))
    }

    fn start_epoch(&self, base: f64, processed: u64) {
        self.position_base.store(base.to_bits(), Ordering::Release);
        self.processed_buffers.store(processed, Ordering::Release);
    }

    /// Whether the worker has dropped the engine.
    pub(crate) fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    pub(crate) fn stats(&self) -> StreamingStats {
        self.stats.lock().clone()
    }

    fn record(&self, update: impl FnOnce(&mut StreamingStats)) {
        update(&mut self.stats.lock());
    }
}

/// Section of a looping stream that is repeated, in seconds.
///
/// `end == 0` disables the section and the whole stream loops.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct LoopPoints {
    pub start: f64,
    pub end: f64,
}

impl LoopPoints {
    pub(crate) fn new(start: f64, end: f64) -> Result<Self> {
        if start.is_nan() || end.is_nan() || start < 0.0 || end < 0.0 {
            return Err(PlaybackError::InvalidLoopPoints(format!(
                "start {} and end {} must not be negative",
                start, end
            )));
        }
        if start > end {
            return Err(PlaybackError::InvalidLoopPoints(format!(
                "start {} is after end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }
}

/// Queued buffer after which the play position restarts from `base`.
#[derive(Debug, Clone, Copy)]
struct EpochMark {
    buffer: BufferId,
    base: f64,
    /// Buffers of the new epoch already played once `buffer` is processed.
    processed: u64,
}

/// Device handles allocated for one streamed source.
#[derive(Debug, Clone)]
pub(crate) struct DeviceHandles {
    pub source: SourceId,
    pub buffers: Vec<BufferId>,
}

impl DeviceHandles {
    pub(crate) fn release(&self, device: &dyn PlaybackDevice) {
        device.delete_source(self.source);
        device.delete_buffers(&self.buffers);
    }
}

pub(crate) struct StreamEngine {
    key: SourceKey,
    device: Arc<dyn PlaybackDevice>,
    stream: AudioStream,
    handles: DeviceHandles,
    format: PcmFormat,
    sample_rate: u32,
    seconds_per_buffer: f64,
    scratch: Vec<u8>,
    /// State the worker drives the device towards.
    state: StreamState,
    last_queued_buffer: Option<BufferId>,
    /// Position restarts in queue order, one per buffer at most.
    epoch_marks: VecDeque<EpochMark>,
    /// Stream bytes decoded since the last rewind.
    decoded_bytes: u64,
    /// Set by a seek past the loop end: play on to the end of the stream.
    behind_loop_end: bool,
    end_of_stream: bool,
    /// Whether the ring holds audio for the current position.
    primed: bool,
    shared: Arc<SharedState>,
}

impl StreamEngine {
    /// Allocate the device source and buffers for `stream` and fill the ring.
    ///
    /// Runs on the caller thread before the engine is registered. Any device
    /// resource created here is released again when a later step fails.
    pub(crate) fn new(
        key: SourceKey,
        context: &AudioContext,
        stream: AudioStream,
        shared: Arc<SharedState>,
    ) -> Result<Self> {
        let format = stream.pcm_format()?;
        let config = context.config();
        let buffer_size = config.buffer_size_for(stream.channels(), format.frame_size());
        let sample_rate = stream.sample_rate();
        let seconds_per_buffer =
            buffer_size as f64 / (format.frame_size() as f64 * sample_rate as f64);

        let device = Arc::clone(context.device());
        let source = device.create_source()?;
        let buffers = match device.create_buffers(config.buffer_count) {
            Ok(buffers) => buffers,
            Err(e) => {
                device.delete_source(source);
                return Err(e.into());
            }
        };

        let mut engine = Self {
            key,
            device,
            stream,
            handles: DeviceHandles { source, buffers },
            format,
            sample_rate,
            seconds_per_buffer,
            scratch: vec![0u8; buffer_size],
            state: StreamState::Stopped,
            last_queued_buffer: None,
            epoch_marks: VecDeque::new(),
            decoded_bytes: 0,
            behind_loop_end: false,
            end_of_stream: false,
            primed: false,
            shared,
        };

        if let Err(e) = engine.fill_all() {
            engine.handles.release(engine.device.as_ref());
            return Err(e);
        }

        debug!(
            key,
            ?format,
            buffer_size,
            seconds_per_buffer,
            "Stream engine created"
        );
        Ok(engine)
    }

    pub(crate) fn handles(&self) -> &DeviceHandles {
        &self.handles
    }

    pub(crate) fn seconds_per_buffer(&self) -> f64 {
        self.seconds_per_buffer
    }

    fn bytes_per_second(&self) -> f64 {
        self.format.frame_size() as f64 * self.sample_rate as f64
    }

    /// Whole frames covering `seconds` of audio.
    fn byte_offset(&self, seconds: f64) -> u64 {
        let frame = self.format.frame_size() as u64;
        let bytes = (seconds * self.bytes_per_second()) as u64;
        bytes - bytes % frame
    }

    /// Byte offset of the loop end when a loop section is in effect.
    fn loop_end_bytes(&self, points: LoopPoints) -> Option<u64> {
        if !self.shared.is_looping() || self.behind_loop_end {
            return None;
        }
        let end = self.byte_offset(points.end);
        (end > self.byte_offset(points.start)).then_some(end)
    }

    /// Bytes to decode into the next buffer without passing `loop_end`.
    fn chunk_limit(&self, loop_end: Option<u64>) -> usize {
        match loop_end {
            Some(end) => end
                .saturating_sub(self.decoded_bytes)
                .min(self.scratch.len() as u64) as usize,
            None => self.scratch.len(),
        }
    }

    fn decode_into_scratch(&mut self, limit: usize) -> Result<usize> {
        let read = self.stream.read(&mut self.scratch[..limit])?;
        self.decoded_bytes += read as u64;
        Ok(read)
    }

    /// Reopen the stream and decode forward to exactly `seconds`. Returns the
    /// position reached, earlier than `seconds` only when the stream is
    /// shorter.
    fn rewind_to(&mut self, seconds: f64) -> Result<f64> {
        self.stream.reset()?;
        self.decoded_bytes = 0;
        let target = self.byte_offset(seconds);
        while self.decoded_bytes < target {
            let limit = (target - self.decoded_bytes).min(self.scratch.len() as u64) as usize;
            if self.decode_into_scratch(limit)? == 0 {
                break;
            }
        }
        Ok(self.decoded_bytes as f64 / self.bytes_per_second())
    }

    /// Restart the play position from `base` once `buffer` has been processed.
    fn mark_epoch(&mut self, buffer: BufferId, base: f64, processed: u64) {
        if self.epoch_marks.back().is_some_and(|mark| mark.buffer == buffer) {
            self.epoch_marks.pop_back();
        }
        self.epoch_marks.push_back(EpochMark {
            buffer,
            base,
            processed,
        });
    }

    /// Jump back to the loop start; `buffer` will carry the first audio of
    /// the new pass.
    fn restart_loop(&mut self, buffer: BufferId, points: LoopPoints) -> Result<()> {
        let base = self.rewind_to(points.start)?;
        self.shared.record(|stats| stats.loops += 1);
        self.mark_epoch(buffer, base, 1);
        debug!(key = self.key, base, "Stream looped");
        Ok(())
    }

    /// Decode the next chunk into `buffer` and queue it, wrapping around to
    /// the loop start when looping. Returns `false` when the stream is
    /// exhausted.
    ///
    /// With a loop section in effect the chunk is cut at the loop end and the
    /// stream skips back to the loop start right away.
    fn fill_or_loop(&mut self, buffer: BufferId) -> Result<bool> {
        let points = self.shared.loop_points();
        let loop_end = self.loop_end_bytes(points);
        if loop_end.is_some_and(|end| self.decoded_bytes >= end) {
            self.restart_loop(buffer, points)?;
        }

        let mut read = self.decode_into_scratch(self.chunk_limit(loop_end))?;
        if read == 0 {
            if !self.shared.is_looping() || self.behind_loop_end {
                self.end_of_stream = true;
                return Ok(false);
            }
            self.restart_loop(buffer, points)?;
            read = self.decode_into_scratch(self.chunk_limit(loop_end))?;
            if read == 0 {
                self.end_of_stream = true;
                return Ok(false);
            }
        }

        self.device
            .buffer_data(buffer, self.format, &self.scratch[..read], self.sample_rate)?;
        self.device.queue_buffer(self.handles.source, buffer)?;
        self.last_queued_buffer = Some(buffer);
        self.shared.record(|stats| stats.fills += 1);

        if loop_end == Some(self.decoded_bytes) {
            let base = self.rewind_to(points.start)?;
            self.shared.record(|stats| stats.loops += 1);
            self.mark_epoch(buffer, base, 0);
            debug!(key = self.key, base, "Cut at the loop end");
        }
        Ok(true)
    }

    /// Fill and queue every buffer of the ring, stopping early at the end of
    /// the stream.
    fn fill_all(&mut self) -> Result<()> {
        for index in 0..self.handles.buffers.len() {
            let buffer = self.handles.buffers[index];
            if !self.fill_or_loop(buffer)? {
                break;
            }
        }
        self.primed = true;
        Ok(())
    }

    /// Requeue processed buffers with fresh audio.
    pub(crate) fn refill(&mut self) -> Result<()> {
        if !self.primed || !matches!(self.state, StreamState::Playing | StreamState::Paused) {
            return Ok(());
        }

        let source = self.handles.source;
        for buffer in self.device.unqueue_processed(source)? {
            match self.epoch_marks.front() {
                Some(mark) if mark.buffer == buffer => {
                    self.shared.start_epoch(mark.base, mark.processed);
                    self.epoch_marks.pop_front();
                }
                _ => {
                    self.shared.processed_buffers.fetch_add(1, Ordering::AcqRel);
                }
            }
            if !self.end_of_stream {
                self.fill_or_loop(buffer)?;
            }
        }

        let queued = self.device.queued_count(source);
        if self.end_of_stream && queued == 0 {
            info!(key = self.key, "Stream played to the end");
            self.shared.record(|stats| stats.end_of_stream_stops += 1);
            return self.stop();
        }

        if self.state == StreamState::Playing
            && queued > 0
            && self.device.state(source) != SourceState::Playing
        {
            debug!(
                key = self.key,
                queued,
                last_queued = ?self.last_queued_buffer,
                "Device ran dry, resuming playback"
            );
            self.device.play(source)?;
            self.shared.record(|stats| stats.underruns_recovered += 1);
        }
        Ok(())
    }

    pub(crate) fn play(&mut self) -> Result<()> {
        if !self.primed {
            self.fill_all()?;
        }
        self.device.play(self.handles.source)?;
        self.set_state(StreamState::Playing);
        Ok(())
    }

    pub(crate) fn pause(&mut self) -> Result<()> {
        if self.state != StreamState::Playing {
            self.shared.set_state(self.state);
            return Ok(());
        }
        self.device.pause(self.handles.source)?;
        self.set_state(StreamState::Paused);
        Ok(())
    }

    /// Stop the device and rewind. The ring is refilled by the next play or seek.
    pub(crate) fn stop(&mut self) -> Result<()> {
        let source = self.handles.source;
        self.device.stop(source)?;
        self.device.clear_queue(source)?;
        self.stream.reset()?;
        self.decoded_bytes = 0;
        self.last_queued_buffer = None;
        self.epoch_marks.clear();
        self.behind_loop_end = false;
        self.end_of_stream = false;
        self.primed = false;
        self.shared.start_epoch(0.0, 0);
        self.set_state(StreamState::Stopped);
        Ok(())
    }

    /// Move the play cursor to `target` seconds.
    ///
    /// The stream is rewound and decoded forward in buffer-sized steps until
    /// it is less than one buffer before the target; the remainder is applied
    /// as a device offset into the first refilled buffer. A target past the
    /// loop end turns the loop section off until the source stops.
    pub(crate) fn seek(&mut self, target: f64) -> Result<()> {
        self.shared.set_seeking(true);
        let result = self.seek_to(target);
        self.shared.set_seeking(false);
        result
    }

    fn seek_to(&mut self, target: f64) -> Result<()> {
        let resume = self.state;
        let source = self.handles.source;
        self.shared.record(|stats| stats.seeks += 1);

        self.device.stop(source)?;
        self.device.clear_queue(source)?;
        self.stream.reset()?;
        self.decoded_bytes = 0;
        self.last_queued_buffer = None;
        self.epoch_marks.clear();
        self.end_of_stream = false;

        let loop_end = self.shared.loop_points().end;
        self.behind_loop_end = loop_end > 0.0 && target > loop_end;

        let bytes_per_second = self.bytes_per_second();
        let capacity = self.scratch.len();
        let mut current = 0.0;
        while current < target - self.seconds_per_buffer {
            let read = self.decode_into_scratch(capacity)?;
            if read == 0 {
                break;
            }
            current += read as f64 / bytes_per_second;
        }

        if current < target - self.seconds_per_buffer {
            warn!(
                key = self.key,
                target,
                end = current,
                "Seek target is past the end of the stream"
            );
            self.stop()?;
            if self.shared.is_looping() && resume == StreamState::Playing {
                self.play()?;
            }
            return Ok(());
        }

        self.shared.start_epoch(current, 0);
        let first = self.handles.buffers[0];
        self.mark_epoch(first, current, 1);
        for index in 0..self.handles.buffers.len() {
            let buffer = self.handles.buffers[index];
            if !self.fill_or_loop(buffer)? {
                break;
            }
        }
        self.primed = true;

        let offset = (target - current).max(0.0);
        self.device.set_playback_offset(source, offset)?;
        debug!(
            key = self.key,
            target,
            current,
            offset,
            behind_loop_end = self.behind_loop_end,
            "Seek complete"
        );

        match resume {
            StreamState::Playing => self.play()?,
            StreamState::Paused => {
                self.device.play(source)?;
                self.device.pause(source)?;
                self.set_state(StreamState::Paused);
            }
            StreamState::Stopped => self.set_state(StreamState::Stopped),
        }
        Ok(())
    }

    fn set_state(&mut self, state: StreamState) {
        self.state = state;
        self.shared.set_state(state);
    }

    pub(crate) fn state(&self) -> StreamState {
        self.state
    }

    /// Overwrite the caller-visible state with the worker's view.
    pub(crate) fn publish_state(&self) {
        self.shared.set_state(self.state);
    }
}

impl Drop for StreamEngine {
    fn drop(&mut self) {
        self.stream.close();
        self.shared.released.store(true, Ordering::Release);
        debug!(key = self.key, "Stream engine released");
    }
}
