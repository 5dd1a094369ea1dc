//! # Streaming Configuration
//!
//! Configuration types for the buffered streaming engine.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Streaming engine configuration.
///
/// Controls the device buffer ring, the refill cadence and the timeouts used
/// when sources are disposed or the manager shuts down.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamingConfig {
    /// Number of device buffers cycled per streamed source.
    ///
    /// Default: 3.
    #[serde(default = "default_buffer_count")]
    pub buffer_count: usize,

    /// Bytes of decoded PCM per channel held by one device buffer.
    ///
    /// The actual buffer size is `buffer_size_per_channel * channels` rounded
    /// up to a power of two, see [`StreamingConfig::buffer_size_for`].
    ///
    /// Default: 64 KiB (~0.74s of 16-bit audio at 44.1kHz).
    #[serde(default = "default_buffer_size_per_channel")]
    pub buffer_size_per_channel: usize,

    /// Interval between two refill passes of the poller thread.
    ///
    /// Must stay well below the playing time of one buffer, otherwise the
    /// device runs dry between passes.
    ///
    /// Default: 100 ms.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: Duration,

    /// Maximum time `dispose` waits for the worker to release a source.
    ///
    /// Default: 2 seconds.
    #[serde(default = "default_dispose_timeout")]
    pub dispose_timeout: Duration,

    /// Maximum time shutdown waits for the poller thread to exit.
    ///
    /// Default: 2 seconds.
    #[serde(default = "default_poller_join_timeout")]
    pub poller_join_timeout: Duration,

    /// Maximum time shutdown waits for the worker to drain its queue.
    ///
    /// Default: 500 ms.
    #[serde(default = "default_worker_shutdown_timeout")]
    pub worker_shutdown_timeout: Duration,

    /// Maximum number of idle task records kept for reuse.
    ///
    /// Default: 64.
    #[serde(default = "default_task_pool_capacity")]
    pub task_pool_capacity: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            buffer_count: default_buffer_count(),
            buffer_size_per_channel: default_buffer_size_per_channel(),
            poll_interval: default_poll_interval(),
            dispose_timeout: default_dispose_timeout(),
            poller_join_timeout: default_poller_join_timeout(),
            worker_shutdown_timeout: default_worker_shutdown_timeout(),
            task_pool_capacity: default_task_pool_capacity(),
        }
    }
}

impl StreamingConfig {
    /// Create a configuration optimized for low latency.
    ///
    /// - Smaller buffers (16 KiB per channel)
    /// - Faster refill cadence (20 ms)
    pub fn low_latency() -> Self {
        Self {
            buffer_count: 4,
            buffer_size_per_channel: 16 * 1024,
            poll_interval: Duration::from_millis(20),
            ..Default::default()
        }
    }

    /// Create a configuration holding more audio ahead of the play cursor.
    ///
    /// - Larger buffers (256 KiB per channel)
    /// - More buffers in the ring
    pub fn high_capacity() -> Self {
        Self {
            buffer_count: 4,
            buffer_size_per_channel: 256 * 1024,
            poll_interval: Duration::from_millis(250),
            ..Default::default()
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.buffer_count == 0 {
            return Err("buffer_count must be > 0".to_string());
        }

        if self.buffer_size_per_channel == 0 {
            return Err("buffer_size_per_channel must be > 0".to_string());
        }

        if self.poll_interval.is_zero() {
            return Err("poll_interval must be > 0".to_string());
        }

        if self.dispose_timeout < self.poll_interval {
            return Err("dispose_timeout cannot be shorter than poll_interval".to_string());
        }

        if self.task_pool_capacity == 0 {
            return Err("task_pool_capacity must be > 0".to_string());
        }

        Ok(())
    }

    /// Device buffer size in bytes for a stream layout.
    ///
    /// `buffer_size_per_channel * channels` is rounded up to a power of two,
    /// then down to a whole number of frames so a buffer never splits a
    /// frame (relevant for 24-bit and odd channel layouts).
    pub fn buffer_size_for(&self, channels: u16, frame_size: usize) -> usize {
        let size = (self.buffer_size_per_channel * channels.max(1) as usize).next_power_of_two();
        if frame_size == 0 || size < frame_size {
            return frame_size.max(size);
        }
        size - size % frame_size
    }
}

// ============================================================================
// Default Functions (for serde)
// ============================================================================

fn default_buffer_count() -> usize {
    3
}

fn default_buffer_size_per_channel() -> usize {
    64 * 1024 // 64 KiB
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(100)
}

fn default_dispose_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_poller_join_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_worker_shutdown_timeout() -> Duration {
    Duration::from_millis(500)
}

fn default_task_pool_capacity() -> usize {
    64
}

// ============================================================================
// Stream State
// ============================================================================

/// Playback state of a streamed source as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamState {
    /// Not playing; the next play starts from the current position.
    Stopped,
    /// Buffers are being refilled and the device is playing.
    Playing,
    /// Device paused, buffer ring kept.
    Paused,
}

impl StreamState {
    /// Returns `true` if the source holds or will hold audio in the device.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Playing | Self::Paused)
    }

    pub(crate) fn as_u8(self) -> u8 {
        match self {
            Self::Stopped => 0,
            Self::Playing => 1,
            Self::Paused => 2,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Playing,
            2 => Self::Paused,
            _ => Self::Stopped,
        }
    }
}

/// Counters describing the life of one streamed source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamingStats {
    /// Buffers filled with decoded audio and queued.
    pub fills: u64,
    /// Times the device ran dry while it should have been playing and was
    /// restarted.
    pub underruns_recovered: u64,
    /// Times the stream wrapped around because looping is enabled.
    pub loops: u64,
    /// Seeks carried out by the worker.
    pub seeks: u64,
    /// Times the stream played to its end and stopped on its own.
    pub end_of_stream_stops: u64,
}

impl StreamingStats {
    /// Decoded bytes delivered to the device, assuming every fill was full.
    pub fn max_bytes_streamed(&self, buffer_size: usize) -> u64 {
        self.fills * buffer_size as u64
    }
}
