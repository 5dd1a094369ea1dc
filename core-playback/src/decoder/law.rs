//! G.711 A-law and u-law expansion to 16-bit PCM.

use super::bits::{BoundedReader, SourceReader};
use super::{frame_aligned, PcmDataType, SampleSpec};
use crate::error::Result;

/// Companding law of an 8-bit logarithmic stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LawEncoding {
    ALaw,
    ULaw,
}

/// Expand an A-law byte to a signed 16-bit sample.
pub fn expand_alaw(byte: u8) -> i16 {
    let value = byte ^ 0x55;
    let mut magnitude = i32::from(value & 0x0F) << 4;
    let segment = (value & 0x70) >> 4;
    match segment {
        0 => magnitude += 8,
        1 => magnitude += 0x108,
        _ => magnitude = (magnitude + 0x108) << (segment - 1),
    }
    let sample = if value & 0x80 != 0 { magnitude } else { -magnitude };
    sample as i16
}

/// Expand a u-law byte to a signed 16-bit sample.
pub fn expand_ulaw(byte: u8) -> i16 {
    const BIAS: i32 = 0x84;
    let value = !byte;
    let magnitude = ((i32::from(value & 0x0F) << 3) + BIAS) << ((value & 0x70) >> 4);
    let sample = if value & 0x80 != 0 {
        BIAS - magnitude
    } else {
        magnitude - BIAS
    };
    sample as i16
}

#[derive(Debug)]
pub struct LawDecoder {
    input: BoundedReader,
    spec: SampleSpec,
    encoding: LawEncoding,
    scratch: Vec<u8>,
    total_samples: u64,
}

impl LawDecoder {
    pub fn new(reader: SourceReader, data_len: u64, spec: SampleSpec, encoding: LawEncoding) -> Self {
        Self {
            input: BoundedReader::new(reader, data_len),
            spec,
            encoding,
            scratch: Vec::new(),
            total_samples: data_len / u64::from(spec.channels.max(1)),
        }
    }

    pub fn encoding(&self) -> LawEncoding {
        self.encoding
    }

    pub fn read(&mut self, output: &mut [u8]) -> Result<usize> {
        let channels = usize::from(self.spec.channels);
        let samples = frame_aligned(output.len(), 2 * channels) / 2;
        self.scratch.resize(samples, 0);
        let read = self.input.read_fully(&mut self.scratch[..samples])?;
        let whole = read - read % channels.max(1);

        let expand = match self.encoding {
            LawEncoding::ALaw => expand_alaw,
            LawEncoding::ULaw => expand_ulaw,
        };
        for (byte, out) in self.scratch[..whole].iter().zip(output.chunks_exact_mut(2)) {
            out.copy_from_slice(&expand(*byte).to_le_bytes());
        }
        Ok(whole * 2)
    }

    pub fn spec(&self) -> SampleSpec {
        self.spec
    }

    pub fn input_bits_per_sample(&self) -> u16 {
        8
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_ulaw_reference_values() {
        assert_eq!(expand_ulaw(0xFF), 0);
        assert_eq!(expand_ulaw(0x7F), 0);
        assert_eq!(expand_ulaw(0x00), -32124);
        assert_eq!(expand_ulaw(0x80), 32124);
    }

    #[test]
    fn test_alaw_reference_values() {
        assert_eq!(expand_alaw(0xD5), 8);
        assert_eq!(expand_alaw(0x55), -8);
        assert_eq!(expand_alaw(0xAA), 32256);
        assert_eq!(expand_alaw(0x2A), -32256);
    }

    #[test]
    fn test_law_expansion_is_odd_symmetric() {
        for byte in 0..=0x7Fu8 {
            assert_eq!(expand_ulaw(byte), -expand_ulaw(byte | 0x80));
            assert_eq!(expand_alaw(byte), -expand_alaw(byte | 0x80));
        }
    }

    #[test]
    fn test_decoder_widens_to_16_bit() {
        let data = vec![0xFFu8, 0x80, 0x00, 0x7F];
        let mut decoder = LawDecoder::new(
            Box::new(Cursor::new(data)),
            4,
            SampleSpec::new(2, 8000),
            LawEncoding::ULaw,
        );
        assert_eq!(decoder.total_samples_per_channel(), 2);

        let mut out = [0u8; 16];
        assert_eq!(decoder.read(&mut out).unwrap(), 8);
        let samples: Vec<i16> = out[..8]
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        assert_eq!(samples, vec![0, 32124, -32124, 0]);
        assert_eq!(decoder.read(&mut out).unwrap(), 0);
    }
}
