//! Linear PCM decoders: little-endian passthrough, 24/32-bit narrowing and the
//! big-endian AIFF sample layouts.

use super::bits::{BoundedReader, SourceReader};
use super::{frame_aligned, PcmDataType, SampleSpec};
use crate::error::Result;

// ============================================================================
// Passthrough
// ============================================================================

/// Copies little-endian PCM or IEEE float samples unchanged.
#[derive(Debug)]
pub struct PcmDecoder {
    input: BoundedReader,
    spec: SampleSpec,
    bits_per_sample: u16,
    data_type: PcmDataType,
    total_samples: u64,
}

impl PcmDecoder {
    pub fn new(
        reader: SourceReader,
        data_len: u64,
        spec: SampleSpec,
        bits_per_sample: u16,
        data_type: PcmDataType,
    ) -> Self {
        let frame_size = u64::from(spec.channels) * u64::from(bits_per_sample / 8);
        Self {
            input: BoundedReader::new(reader, data_len),
            spec,
            bits_per_sample,
            data_type,
            total_samples: data_len.checked_div(frame_size).unwrap_or(0),
        }
    }

    pub fn read(&mut self, output: &mut [u8]) -> Result<usize> {
        let frame_size = usize::from(self.spec.channels) * usize::from(self.bits_per_sample / 8);
        let usable = frame_aligned(output.len(), frame_size);
        let read = self.input.read_fully(&mut output[..usable])?;
        Ok(read - read % frame_size.max(1))
    }

    pub fn spec(&self) -> SampleSpec {
        self.spec
    }

    pub fn input_bits_per_sample(&self) -> u16 {
        self.bits_per_sample
    }

    pub fn output_bits_per_sample(&self) -> u16 {
        self.bits_per_sample
    }

    pub fn total_samples_per_channel(&self) -> u64 {
        self.total_samples
    }

    pub fn data_type(&self) -> PcmDataType {
        self.data_type
    }

    pub fn bytes_remaining(&self) -> u64 {
        self.input.remaining()
    }
}

// ============================================================================
// 24/32-bit → 16-bit
// ============================================================================

/// Keeps the top 16 bits of 24- or 32-bit little-endian integer samples.
#[derive(Debug)]
pub struct NarrowingDecoder {
    input: BoundedReader,
    spec: SampleSpec,
    input_bytes: usize,
    scratch: Vec<u8>,
    total_samples: u64,
}

impl NarrowingDecoder {
    /// `input_bits` must be 24 or 32.
    pub fn new(reader: SourceReader, data_len: u64, spec: SampleSpec, input_bits: u16) -> Self {
        let input_bytes = usize::from(input_bits / 8);
        let frame_size = u64::from(spec.channels) * input_bytes as u64;
        Self {
            input: BoundedReader::new(reader, data_len),
            spec,
            input_bytes,
            scratch: Vec::new(),
            total_samples: data_len.checked_div(frame_size).unwrap_or(0),
        }
    }

    pub fn read(&mut self, output: &mut [u8]) -> Result<usize> {
        let channels = usize::from(self.spec.channels);
        let usable = frame_aligned(output.len(), 2 * channels);
        let samples = usable / 2;

        let needed = samples * self.input_bytes;
        self.scratch.resize(needed, 0);
        let read = self.input.read_fully(&mut self.scratch[..needed])?;

        let mut whole = read / self.input_bytes;
        whole -= whole % channels.max(1);

        let top = self.input_bytes - 2;
        for (sample, out) in self.scratch[..whole * self.input_bytes]
            .chunks_exact(self.input_bytes)
            .zip(output.chunks_exact_mut(2))
        {
            out[0] = sample[top];
            out[1] = sample[top + 1];
        }
        Ok(whole * 2)
    }

    pub fn spec(&self) -> SampleSpec {
        self.spec
    }

    pub fn input_bits_per_sample(&self) -> u16 {
        (self.input_bytes * 8) as u16
    }

    pub fn output_bits_per_sample(&self) -> u16 {
        16
    }

    pub fn total_samples_per_channel(&self) -> u64 {
        self.total_samples
    }

    pub fn data_type(&self) -> PcmDataType {
        PcmDataType::Integer
    }

    pub fn bytes_remaining(&self) -> u64 {
        self.input.remaining()
    }
}

// ============================================================================
// AIFF big-endian layouts
// ============================================================================

/// Sample layouts stored in an uncompressed AIFF/AIFC `SSND` chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiffSampleFormat {
    /// Signed 8-bit, converted to unsigned 8-bit.
    Signed8,
    /// Big-endian 16-bit.
    Int16,
    /// Big-endian 24-bit, narrowed to 16-bit.
    Int24,
    /// Big-endian 32-bit, narrowed to 16-bit.
    Int32,
    /// Big-endian IEEE float.
    Float32,
    /// Big-endian IEEE double.
    Float64,
}

impl AiffSampleFormat {
    fn input_bytes(self) -> usize {
        match self {
            Self::Signed8 => 1,
            Self::Int16 => 2,
            Self::Int24 => 3,
            Self::Int32 | Self::Float32 => 4,
            Self::Float64 => 8,
        }
    }

    fn output_bytes(self) -> usize {
        match self {
            Self::Signed8 => 1,
            Self::Int16 | Self::Int24 | Self::Int32 => 2,
            Self::Float32 => 4,
            Self::Float64 => 8,
        }
    }

    fn convert(self, sample: &[u8], out: &mut [u8]) {
        match self {
            Self::Signed8 => out[0] = sample[0].wrapping_add(128),
            Self::Int16 | Self::Int24 | Self::Int32 => {
                out[0] = sample[1];
                out[1] = sample[0];
            }
            Self::Float32 | Self::Float64 => {
                for (dst, src) in out.iter_mut().zip(sample.iter().rev()) {
                    *dst = *src;
                }
            }
        }
    }
}

/// Converts big-endian AIFF samples to the little-endian device layout.
#[derive(Debug)]
pub struct AiffPcmDecoder {
    input: BoundedReader,
    spec: SampleSpec,
    format: AiffSampleFormat,
    input_bits: u16,
    scratch: Vec<u8>,
    total_samples: u64,
}

impl AiffPcmDecoder {
    pub fn new(
        reader: SourceReader,
        data_len: u64,
        spec: SampleSpec,
        format: AiffSampleFormat,
        input_bits: u16,
        total_samples: u64,
    ) -> Self {
        Self {
            input: BoundedReader::new(reader, data_len),
            spec,
            format,
            input_bits,
            scratch: Vec::new(),
            total_samples,
        }
    }

    pub fn sample_format(&self) -> AiffSampleFormat {
        self.format
    }

    pub fn read(&mut self, output: &mut [u8]) -> Result<usize> {
        let channels = usize::from(self.spec.channels);
        let in_bytes = self.format.input_bytes();
        let out_bytes = self.format.output_bytes();

        let usable = frame_aligned(output.len(), out_bytes * channels);
        let samples = usable / out_bytes;
        let needed = samples * in_bytes;
        self.scratch.resize(needed, 0);
        let read = self.input.read_fully(&mut self.scratch[..needed])?;

        let mut whole = read / in_bytes;
        whole -= whole % channels.max(1);

        for (sample, out) in self.scratch[..whole * in_bytes]
            .chunks_exact(in_bytes)
            .zip(output.chunks_exact_mut(out_bytes))
        {
            self.format.convert(sample, out);
        }
        Ok(whole * out_bytes)
    }

    pub fn spec(&self) -> SampleSpec {
        self.spec
    }

    pub fn input_bits_per_sample(&self) -> u16 {
        self.input_bits
    }

    pub fn output_bits_per_sample(&self) -> u16 {
        (self.format.output_bytes() * 8) as u16
    }

    pub fn total_samples_per_channel(&self) -> u64 {
        self.total_samples
    }

    pub fn data_type(&self) -> PcmDataType {
        match self.format {
            AiffSampleFormat::Float32 | AiffSampleFormat::Float64 => PcmDataType::Float,
            _ => PcmDataType::Integer,
        }
    }

    pub fn bytes_remaining(&self) -> u64 {
        self.input.remaining()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn reader(bytes: Vec<u8>) -> SourceReader {
        Box::new(Cursor::new(bytes))
    }

    #[test]
    fn test_pcm_passthrough_stops_at_declared_length() {
        let data = vec![1u8, 2, 3, 4, 5, 6, 7, 8, 99, 99];
        let mut decoder = PcmDecoder::new(
            reader(data),
            8,
            SampleSpec::new(2, 44100),
            16,
            PcmDataType::Integer,
        );
        assert_eq!(decoder.total_samples_per_channel(), 2);

        let mut out = [0u8; 16];
        assert_eq!(decoder.read(&mut out).unwrap(), 8);
        assert_eq!(&out[..8], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(decoder.read(&mut out).unwrap(), 0);
    }

    #[test]
    fn test_pcm_read_returns_whole_frames() {
        let mut decoder = PcmDecoder::new(
            reader(vec![0u8; 12]),
            12,
            SampleSpec::new(2, 8000),
            16,
            PcmDataType::Integer,
        );
        let mut out = [0u8; 7];
        assert_eq!(decoder.read(&mut out).unwrap(), 4);
    }

    #[test]
    fn test_narrowing_keeps_top_bytes() {
        // 0x123456 and -1 as 24-bit little-endian
        let data = vec![0x56, 0x34, 0x12, 0xFF, 0xFF, 0xFF];
        let mut decoder = NarrowingDecoder::new(reader(data), 6, SampleSpec::new(1, 8000), 24);
        assert_eq!(decoder.total_samples_per_channel(), 2);

        let mut out = [0u8; 8];
        assert_eq!(decoder.read(&mut out).unwrap(), 4);
        assert_eq!(i16::from_le_bytes([out[0], out[1]]), 0x1234);
        assert_eq!(i16::from_le_bytes([out[2], out[3]]), -1);
    }

    #[test]
    fn test_narrowing_32_bit_truncates() {
        let sample = 0x7FFF_FFFFi32.to_le_bytes().to_vec();
        let mut decoder = NarrowingDecoder::new(reader(sample), 4, SampleSpec::new(1, 8000), 32);
        let mut out = [0u8; 2];
        assert_eq!(decoder.read(&mut out).unwrap(), 2);
        assert_eq!(i16::from_le_bytes(out), i16::MAX);
        assert_eq!(decoder.output_bits_per_sample(), 16);
    }

    #[test]
    fn test_aiff_layouts() {
        let cases: [(AiffSampleFormat, Vec<u8>, Vec<u8>); 5] = [
            (AiffSampleFormat::Signed8, vec![0x80, 0x00, 0x7F], vec![0x00, 0x80, 0xFF]),
            (AiffSampleFormat::Int16, vec![0x12, 0x34], vec![0x34, 0x12]),
            (AiffSampleFormat::Int24, vec![0x12, 0x34, 0x56], vec![0x34, 0x12]),
            (AiffSampleFormat::Int32, vec![0x12, 0x34, 0x56, 0x78], vec![0x34, 0x12]),
            (
                AiffSampleFormat::Float32,
                1.5f32.to_be_bytes().to_vec(),
                1.5f32.to_le_bytes().to_vec(),
            ),
        ];

        for (format, input, expected) in cases {
            let len = input.len() as u64;
            let mut decoder =
                AiffPcmDecoder::new(reader(input), len, SampleSpec::new(1, 8000), format, 0, 0);
            let mut out = vec![0u8; 8];
            let written = decoder.read(&mut out).unwrap();
            assert_eq!(&out[..written], expected.as_slice(), "{:?}", format);
        }
    }

    #[test]
    fn test_aiff_float64_is_float() {
        let input = (-0.25f64).to_be_bytes().to_vec();
        let mut decoder = AiffPcmDecoder::new(
            reader(input),
            8,
            SampleSpec::new(1, 8000),
            AiffSampleFormat::Float64,
            64,
            1,
        );
        let mut out = [0u8; 8];
        assert_eq!(decoder.read(&mut out).unwrap(), 8);
        assert_eq!(f64::from_le_bytes(out), -0.25);
        assert_eq!(decoder.data_type(), PcmDataType::Float);
        assert_eq!(decoder.output_bits_per_sample(), 64);
    }
}
