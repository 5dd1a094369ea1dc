//! Playback device bridge traits and supporting audio types.
//!
//! These abstractions describe the native audio device the streaming engine
//! drives: a source that plays a FIFO queue of PCM buffers. Host applications
//! provide a concrete implementation (OpenAL, CoreAudio, a test double, ...).
//! The engine only ever calls the device from its single worker thread, apart
//! from the position query which may be issued from any thread.

use crate::{error::Result, platform::PlatformSendSync};
use serde::{Deserialize, Serialize};

/// Opaque handle of a device playback source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(pub u32);

/// Opaque handle of a device-side PCM buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u32);

/// Sample representation of a PCM stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PcmDataType {
    /// Signed integer samples (unsigned for 8-bit).
    Integer,
    /// IEEE 754 floating point samples.
    Float,
}

/// Device-native PCM layouts.
///
/// A stream can only be uploaded to the device when its channel count, sample
/// width and data type map to one of these variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PcmFormat {
    Mono8,
    Stereo8,
    Mono16,
    Stereo16,
    MonoFloat32,
    StereoFloat32,
    MonoDouble,
    StereoDouble,
    Quad8,
    Quad16,
    QuadFloat32,
    Surround51Ch8,
    Surround51Ch16,
    Surround51ChFloat32,
    Surround61Ch8,
    Surround61Ch16,
    Surround61ChFloat32,
    Surround71Ch8,
    Surround71Ch16,
    Surround71ChFloat32,
}

impl PcmFormat {
    /// Resolve the device format for a stream layout, or `None` if the device
    /// cannot play it.
    pub fn determine(channels: u16, bits_per_sample: u16, data_type: PcmDataType) -> Option<Self> {
        use PcmDataType::{Float, Integer};

        let format = match (channels, bits_per_sample, data_type) {
            (1, 8, Integer) => Self::Mono8,
            (2, 8, Integer) => Self::Stereo8,
            (1, 16, Integer) => Self::Mono16,
            (2, 16, Integer) => Self::Stereo16,
            (1, 32, Float) => Self::MonoFloat32,
            (2, 32, Float) => Self::StereoFloat32,
            (1, 64, Float) => Self::MonoDouble,
            (2, 64, Float) => Self::StereoDouble,
            (4, 8, Integer) => Self::Quad8,
            (4, 16, Integer) => Self::Quad16,
            (4, 32, Float) => Self::QuadFloat32,
            (6, 8, Integer) => Self::Surround51Ch8,
            (6, 16, Integer) => Self::Surround51Ch16,
            (6, 32, Float) => Self::Surround51ChFloat32,
            (7, 8, Integer) => Self::Surround61Ch8,
            (7, 16, Integer) => Self::Surround61Ch16,
            (7, 32, Float) => Self::Surround61ChFloat32,
            (8, 8, Integer) => Self::Surround71Ch8,
            (8, 16, Integer) => Self::Surround71Ch16,
            (8, 32, Float) => Self::Surround71ChFloat32,
            _ => return None,
        };

        Some(format)
    }

    /// Number of interleaved channels.
    pub fn channels(&self) -> u16 {
        match self {
            Self::Mono8 | Self::Mono16 | Self::MonoFloat32 | Self::MonoDouble => 1,
            Self::Stereo8 | Self::Stereo16 | Self::StereoFloat32 | Self::StereoDouble => 2,
            Self::Quad8 | Self::Quad16 | Self::QuadFloat32 => 4,
            Self::Surround51Ch8 | Self::Surround51Ch16 | Self::Surround51ChFloat32 => 6,
            Self::Surround61Ch8 | Self::Surround61Ch16 | Self::Surround61ChFloat32 => 7,
            Self::Surround71Ch8 | Self::Surround71Ch16 | Self::Surround71ChFloat32 => 8,
        }
    }

    /// Width of a single sample in bits.
    pub fn bits_per_sample(&self) -> u16 {
        match self {
            Self::Mono8
            | Self::Stereo8
            | Self::Quad8
            | Self::Surround51Ch8
            | Self::Surround61Ch8
            | Self::Surround71Ch8 => 8,
            Self::Mono16
            | Self::Stereo16
            | Self::Quad16
            | Self::Surround51Ch16
            | Self::Surround61Ch16
            | Self::Surround71Ch16 => 16,
            Self::MonoFloat32
            | Self::StereoFloat32
            | Self::QuadFloat32
            | Self::Surround51ChFloat32
            | Self::Surround61ChFloat32
            | Self::Surround71ChFloat32 => 32,
            Self::MonoDouble | Self::StereoDouble => 64,
        }
    }

    /// Sample representation.
    pub fn data_type(&self) -> PcmDataType {
        match self {
            Self::MonoFloat32
            | Self::StereoFloat32
            | Self::MonoDouble
            | Self::StereoDouble
            | Self::QuadFloat32
            | Self::Surround51ChFloat32
            | Self::Surround61ChFloat32
            | Self::Surround71ChFloat32 => PcmDataType::Float,
            _ => PcmDataType::Integer,
        }
    }

    /// Size of one frame (one sample for every channel) in bytes.
    pub fn frame_size(&self) -> usize {
        self.channels() as usize * (self.bits_per_sample() as usize / 8)
    }
}

/// Native state of a device source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceState {
    /// Freshly created, never played.
    Initial,
    Playing,
    Paused,
    /// Stopped explicitly or because the queue ran dry.
    Stopped,
}

/// Native playback device driving queued PCM buffers.
///
/// Semantics mirror a classic buffer-queue audio API:
///
/// - buffers are queued in FIFO order onto a source;
/// - a buffer becomes *processed* once the device finished playing it;
/// - a playing source whose queue runs dry transitions to
///   [`SourceState::Stopped`] on its own (buffer underflow);
/// - stopping a source does not drop its queue, [`clear_queue`] does.
///
/// [`clear_queue`]: PlaybackDevice::clear_queue
pub trait PlaybackDevice: PlatformSendSync {
    /// Allocate a playback source.
    fn create_source(&self) -> Result<SourceId>;

    /// Release a playback source. Unknown ids are ignored.
    fn delete_source(&self, source: SourceId);

    /// Allocate `count` PCM buffers.
    fn create_buffers(&self, count: usize) -> Result<Vec<BufferId>>;

    /// Release PCM buffers. Buffers must not be queued anywhere.
    fn delete_buffers(&self, buffers: &[BufferId]);

    /// Upload PCM data into a buffer, replacing its previous content.
    fn buffer_data(
        &self,
        buffer: BufferId,
        format: PcmFormat,
        data: &[u8],
        sample_rate: u32,
    ) -> Result<()>;

    /// Append a buffer to the source's queue.
    fn queue_buffer(&self, source: SourceId, buffer: BufferId) -> Result<()>;

    /// Remove every processed buffer from the head of the queue and return them
    /// in playback order.
    fn unqueue_processed(&self, source: SourceId) -> Result<Vec<BufferId>>;

    /// Number of buffers currently queued, processed or not.
    fn queued_count(&self, source: SourceId) -> usize;

    /// Detach all buffers from the source. The source should be stopped first.
    fn clear_queue(&self, source: SourceId) -> Result<()>;

    fn play(&self, source: SourceId) -> Result<()>;

    fn pause(&self, source: SourceId) -> Result<()>;

    fn stop(&self, source: SourceId) -> Result<()>;

    /// Current native state of the source.
    fn state(&self, source: SourceId) -> SourceState;

    /// Seconds played within the buffer at the head of the queue.
    fn playback_offset(&self, source: SourceId) -> f64;

    /// Move the play cursor within the buffer at the head of the queue.
    fn set_playback_offset(&self, source: SourceId, seconds: f64) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_determine_basic_formats() {
        assert_eq!(PcmFormat::determine(1, 8, PcmDataType::Integer), Some(PcmFormat::Mono8));
        assert_eq!(PcmFormat::determine(2, 16, PcmDataType::Integer), Some(PcmFormat::Stereo16));
        assert_eq!(PcmFormat::determine(1, 64, PcmDataType::Float), Some(PcmFormat::MonoDouble));
        assert_eq!(
            PcmFormat::determine(2, 32, PcmDataType::Float),
            Some(PcmFormat::StereoFloat32)
        );
    }

    #[test]
    fn test_determine_rejects_unsupported() {
        assert_eq!(PcmFormat::determine(1, 24, PcmDataType::Integer), None);
        assert_eq!(PcmFormat::determine(3, 16, PcmDataType::Integer), None);
        assert_eq!(PcmFormat::determine(1, 16, PcmDataType::Float), None);
        assert_eq!(PcmFormat::determine(6, 64, PcmDataType::Float), None);
        assert_eq!(PcmFormat::determine(0, 8, PcmDataType::Integer), None);
    }

    #[test]
    fn test_format_round_trips_layout() {
        for channels in [1u16, 2, 4, 6, 7, 8] {
            for (bits, data_type) in [(8u16, PcmDataType::Integer), (16, PcmDataType::Integer), (32, PcmDataType::Float)] {
                let format = PcmFormat::determine(channels, bits, data_type)
                    .expect("layout should be supported");
                assert_eq!(format.channels(), channels);
                assert_eq!(format.bits_per_sample(), bits);
                assert_eq!(format.data_type(), data_type);
                assert_eq!(format.frame_size(), channels as usize * bits as usize / 8);
            }
        }
    }

    #[test]
    fn test_format_serializes_by_name() {
        let json = serde_json::to_string(&PcmFormat::Stereo16).unwrap();
        assert_eq!(json, "\"Stereo16\"");

        let state: SourceState = serde_json::from_str("\"Paused\"").unwrap();
        assert_eq!(state, SourceState::Paused);
    }
}
