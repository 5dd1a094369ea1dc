//! # Sound Loader
//!
//! Decodes a whole stream into memory for short sounds that are played many
//! times (effects, UI feedback) and do not need the streaming engine.

use crate::decoder::SampleConverter;
use crate::error::Result;
use crate::stream::AudioStream;
use bridge_traits::PcmFormat;
use bytes::{Bytes, BytesMut};
use std::time::Duration;
use tracing::{debug, warn};

/// Size of the scratch chunk used while draining a stream.
const LOAD_CHUNK: usize = 16 * 1024;

/// Fully decoded PCM ready to be uploaded into a single device buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    pub data: Bytes,
    pub format: PcmFormat,
    pub sample_rate: u32,
    pub duration: Duration,
}

impl PcmBuffer {
    /// Number of frames held by the buffer.
    pub fn frames(&self) -> usize {
        let frame_size = self.format.frame_size();
        if frame_size == 0 {
            0
        } else {
            self.data.len() / frame_size
        }
    }
}

/// Loads complete sounds into memory.
pub struct SoundLoader;

impl SoundLoader {
    /// Decode `stream` to its end.
    ///
    /// The device format is resolved before anything is decoded, so an
    /// unplayable layout fails without touching the payload. The stream is
    /// closed afterwards.
    pub fn load(mut stream: AudioStream) -> Result<PcmBuffer> {
        let format = stream.pcm_format()?;
        let sample_rate = stream.sample_rate();
        let expected = (stream.total_samples_per_channel() as usize)
            .saturating_mul(format.frame_size());

        let mut data = BytesMut::with_capacity(expected);
        let mut chunk = vec![0u8; LOAD_CHUNK - LOAD_CHUNK % format.frame_size()];
        loop {
            let read = stream.read(&mut chunk)?;
            if read == 0 {
                break;
            }
            data.extend_from_slice(&chunk[..read]);
        }
        stream.close();

        if data.len() != expected {
            warn!(
                expected,
                decoded = data.len(),
                "Decoded length differs from the declared sample count"
            );
        }

        let frames = data.len() / format.frame_size();
        let duration = if sample_rate == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(frames as f64 / sample_rate as f64)
        };
        debug!(?format, bytes = data.len(), ?duration, "Sound loaded");

        Ok(PcmBuffer {
            data: data.freeze(),
            format,
            sample_rate,
            duration,
        })
    }

    /// Decode `stream` and reverse it sample by sample.
    ///
    /// # Errors
    ///
    /// Besides the errors of [`load`](Self::load), `UnsupportedFormat` if the
    /// sample width is not a whole number of bytes.
    pub fn load_reversed(stream: AudioStream) -> Result<PcmBuffer> {
        let buffer = Self::load(stream)?;
        let bits = buffer.format.bits_per_sample();
        let mut data = BytesMut::from(buffer.data.as_ref());
        SampleConverter::reverse_pcm_in_place(&mut data, bits)?;
        Ok(PcmBuffer {
            data: data.freeze(),
            ..buffer
        })
    }
}
