//! # Audio Decoder Module
//!
//! Container parsers and per-codec sample decoders producing interleaved PCM.
//!
//! ## Overview
//!
//! Every supported input encoding is one variant of the closed [`Decoder`]
//! enum. The container parsers ([`wav`], [`aiff`], [`qoa`]) read the header
//! chunks, pick the variant from the stream layout and hand over the reader
//! positioned at the first payload byte. From then on the decoder owns the
//! input.
//!
//! ## Supported Formats
//!
//! | Container | Encoding | Decoder | Output |
//! |-----------|----------|---------|--------|
//! | WAV | PCM 8/16-bit | [`PcmDecoder`] | passthrough |
//! | WAV | PCM 24/32-bit | [`NarrowingDecoder`] | 16-bit |
//! | WAV | IEEE float 32/64-bit | [`PcmDecoder`] | passthrough |
//! | WAV, AIFC | A-law / u-law | [`LawDecoder`] | 16-bit |
//! | WAV | IMA-ADPCM | [`ImaAdpcmDecoder`] | 16-bit |
//! | WAV | MS-ADPCM | [`MsAdpcmDecoder`] | 16-bit |
//! | AIFF, AIFC | big-endian PCM / float | [`AiffPcmDecoder`] | 8/16-bit, float |
//! | QOA | LMS residual slices | [`QoaDecoder`] | 16-bit |
//!
//! ## Read contract
//!
//! `read(buf)` writes whole frames into `buf` and returns the number of bytes
//! written. A return value of `0` marks the end of the stream (or a buffer
//! smaller than one frame); further calls keep returning `0`.
//!
//! ```text
//! Container parser → Decoder::read → AudioStream::read → device buffer
//! ```

pub mod aiff;
pub mod bits;
mod format_detector;
mod ima_adpcm;
mod law;
mod ms_adpcm;
mod pcm;
pub mod qoa;
mod sample_converter;
pub mod wav;

pub use bridge_traits::PcmDataType;
pub use format_detector::{AudioFileType, FormatDetector, SNIFF_LEN};
pub use ima_adpcm::ImaAdpcmDecoder;
pub use law::{expand_alaw, expand_ulaw, LawDecoder, LawEncoding};
pub use ms_adpcm::MsAdpcmDecoder;
pub use pcm::{AiffPcmDecoder, AiffSampleFormat, NarrowingDecoder, PcmDecoder};
pub use qoa::{LmsState, QoaDecoder};
pub use sample_converter::SampleConverter;

use crate::error::Result;

/// Channel count and sample rate of a decoded stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleSpec {
    pub channels: u16,
    pub sample_rate: u32,
}

impl SampleSpec {
    pub fn new(channels: u16, sample_rate: u32) -> Self {
        Self {
            channels,
            sample_rate,
        }
    }
}

/// Sample decoder, one variant per input encoding.
#[derive(Debug)]
pub enum Decoder {
    Pcm(PcmDecoder),
    Narrowing(NarrowingDecoder),
    Law(LawDecoder),
    ImaAdpcm(ImaAdpcmDecoder),
    MsAdpcm(MsAdpcmDecoder),
    Qoa(QoaDecoder),
    AiffPcm(AiffPcmDecoder),
}

macro_rules! dispatch {
    ($decoder:expr, $inner:ident => $body:expr) => {
        match $decoder {
            Decoder::Pcm($inner) => $body,
            Decoder::Narrowing($inner) => $body,
            Decoder::Law($inner) => $body,
            Decoder::ImaAdpcm($inner) => $body,
            Decoder::MsAdpcm($inner) => $body,
            Decoder::Qoa($inner) => $body,
            Decoder::AiffPcm($inner) => $body,
        }
    };
}

impl Decoder {
    /// Short codec name used in log output.
    pub fn name(&self) -> &'static str {
        match self {
            Decoder::Pcm(_) => "pcm",
            Decoder::Narrowing(_) => "pcm-narrowing",
            Decoder::Law(d) => match d.encoding() {
                LawEncoding::ALaw => "a-law",
                LawEncoding::ULaw => "u-law",
            },
            Decoder::ImaAdpcm(_) => "ima-adpcm",
            Decoder::MsAdpcm(_) => "ms-adpcm",
            Decoder::Qoa(_) => "qoa",
            Decoder::AiffPcm(_) => "aiff-pcm",
        }
    }

    /// Decode into `output`, returning the number of bytes written (0 at end of stream).
    pub fn read(&mut self, output: &mut [u8]) -> Result<usize> {
        dispatch!(self, d => d.read(output))
    }

    pub fn input_bits_per_sample(&self) -> u16 {
        dispatch!(self, d => d.input_bits_per_sample())
    }

    /// Width of an emitted sample: 8, 16, 32 (float only) or 64.
    pub fn output_bits_per_sample(&self) -> u16 {
        dispatch!(self, d => d.output_bits_per_sample())
    }

    pub fn output_channels(&self) -> u16 {
        dispatch!(self, d => d.spec().channels)
    }

    pub fn output_sample_rate(&self) -> u32 {
        dispatch!(self, d => d.spec().sample_rate)
    }

    /// Total number of samples per channel the decoder will emit.
    pub fn total_samples_per_channel(&self) -> u64 {
        dispatch!(self, d => d.total_samples_per_channel())
    }

    pub fn data_type(&self) -> PcmDataType {
        dispatch!(self, d => d.data_type())
    }

    /// Encoded input bytes not consumed yet.
    pub fn bytes_remaining(&self) -> u64 {
        dispatch!(self, d => d.bytes_remaining())
    }

    /// Encoded block size of the ADPCM codecs.
    pub fn block_align(&self) -> Option<usize> {
        match self {
            Decoder::ImaAdpcm(d) => Some(d.block_align()),
            Decoder::MsAdpcm(d) => Some(d.block_align()),
            _ => None,
        }
    }
}

/// Largest prefix of `len` bytes holding whole frames.
pub(crate) fn frame_aligned(len: usize, frame_size: usize) -> usize {
    if frame_size == 0 {
        len
    } else {
        len - len % frame_size
    }
}

/// Decoded block waiting to be copied out by `read`.
#[derive(Debug, Default)]
pub(crate) struct BlockOutput {
    data: Vec<u8>,
    position: usize,
}

impl BlockOutput {
    pub(crate) fn is_drained(&self) -> bool {
        self.position >= self.data.len()
    }

    /// Replace the content with a freshly decoded block.
    pub(crate) fn refill(&mut self) -> &mut Vec<u8> {
        self.data.clear();
        self.position = 0;
        &mut self.data
    }

    /// Copy as much pending data as fits into `output`.
    pub(crate) fn drain_into(&mut self, output: &mut [u8]) -> usize {
        let available = &self.data[self.position..];
        let count = available.len().min(output.len());
        output[..count].copy_from_slice(&available[..count]);
        self.position += count;
        count
    }
}

/// Push a 16-bit sample as little-endian bytes.
pub(crate) fn push_i16(out: &mut Vec<u8>, sample: i16) {
    out.extend_from_slice(&sample.to_le_bytes());
}
