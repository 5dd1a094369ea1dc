//! Microsoft ADPCM decoder for WAV format tag `0x0002`.

use super::bits::{BoundedReader, SourceReader};
use super::{frame_aligned, push_i16, BlockOutput, PcmDataType, SampleSpec};
use crate::error::{PlaybackError, Result};

const ADAPTATION_TABLE: [i32; 16] = [
    230, 230, 230, 230, 307, 409, 512, 614, 768, 614, 512, 409, 307, 230, 230, 230,
];

const COEFFICIENTS: [(i32, i32); 7] = [
    (256, 0),
    (512, -256),
    (0, 0),
    (192, 64),
    (240, 0),
    (460, -208),
    (392, -232),
];

const MIN_DELTA: i32 = 16;
/// Keeps `768 * delta` and `8 * delta` inside `i32`.
const MAX_DELTA: i32 = i32::MAX / 768;
/// Preamble bytes per channel: predictor index, delta, two seed samples.
const PREAMBLE_BYTES: usize = 7;

#[derive(Debug, Default, Clone, Copy)]
struct ChannelState {
    coef1: i32,
    coef2: i32,
    delta: i32,
    sample1: i32,
    sample2: i32,
}

impl ChannelState {
    fn decode_nibble(&mut self, nibble: u8) -> i16 {
        // sign-extend the 4-bit code
        let signed = i32::from(((nibble << 4) as i8) >> 4);
        let predicted = (self.sample1 * self.coef1 + self.sample2 * self.coef2) >> 8;
        let sample = (predicted + signed * self.delta).clamp(i32::from(i16::MIN), i32::from(i16::MAX));

        self.sample2 = self.sample1;
        self.sample1 = sample;
        self.delta =
            ((ADAPTATION_TABLE[usize::from(nibble)] * self.delta) >> 8).clamp(MIN_DELTA, MAX_DELTA);
        sample as i16
    }
}

#[derive(Debug)]
pub struct MsAdpcmDecoder {
    input: BoundedReader,
    spec: SampleSpec,
    block_align: usize,
    block: Vec<u8>,
    pending: BlockOutput,
    total_samples: u64,
}

impl MsAdpcmDecoder {
    /// `spec.channels` must be 1 or 2.
    pub fn new(reader: SourceReader, data_len: u64, spec: SampleSpec, block_align: usize) -> Self {
        let channels = usize::from(spec.channels.max(1));
        let full_blocks = data_len / block_align.max(1) as u64;
        let partial = (data_len % block_align.max(1) as u64) as usize;
        let mut total_samples = full_blocks * Self::samples_in_block(block_align, channels);
        if partial >= PREAMBLE_BYTES * channels {
            total_samples += Self::samples_in_block(partial, channels);
        }

        Self {
            input: BoundedReader::new(reader, data_len),
            spec,
            block_align,
            block: vec![0; block_align],
            pending: BlockOutput::default(),
            total_samples,
        }
    }

    /// Samples per channel decoded from a block of `block_len` bytes.
    fn samples_in_block(block_len: usize, channels: usize) -> u64 {
        (block_len.saturating_sub(PREAMBLE_BYTES * channels) * 2 / channels + 2) as u64
    }

    pub fn block_align(&self) -> usize {
        self.block_align
    }

    pub fn read(&mut self, output: &mut [u8]) -> Result<usize> {
        let usable = frame_aligned(output.len(), 2 * usize::from(self.spec.channels));
        let mut written = 0;
        while written < usable {
            if self.pending.is_drained() && !self.decode_next_block()? {
                break;
            }
            written += self.pending.drain_into(&mut output[written..usable]);
        }
        Ok(written)
    }

    fn decode_next_block(&mut self) -> Result<bool> {
        let channels = usize::from(self.spec.channels);
        let read = self.input.read_fully(&mut self.block)?;
        let header_len = PREAMBLE_BYTES * channels;
        if read < header_len {
            return Ok(false);
        }

        let block = &self.block[..read];
        let word = |offset: usize| i32::from(i16::from_le_bytes([block[offset], block[offset + 1]]));

        let mut states = [ChannelState::default(); 2];
        for (channel, state) in states.iter_mut().enumerate().take(channels) {
            let predictor = usize::from(block[channel]);
            let (coef1, coef2) = *COEFFICIENTS.get(predictor).ok_or_else(|| {
                PlaybackError::CorruptedStream(format!(
                    "MS-ADPCM predictor index {} out of range",
                    predictor
                ))
            })?;
            state.coef1 = coef1;
            state.coef2 = coef2;
            state.delta = word(channels + channel * 2);
            state.sample1 = word(channels * 3 + channel * 2);
            state.sample2 = word(channels * 5 + channel * 2);
        }

        let out = self.pending.refill();
        for state in states.iter().take(channels) {
            push_i16(out, state.sample2 as i16);
        }
        for state in states.iter().take(channels) {
            push_i16(out, state.sample1 as i16);
        }

        let second = channels - 1;
        for byte in &block[header_len..] {
            let high = states[0].decode_nibble(byte >> 4);
            push_i16(out, high);
            let low = states[second].decode_nibble(byte & 0x0F);
            push_i16(out, low);
        }

        Ok(true)
    }

    pub fn spec(&self) -> SampleSpec {
        self.spec
    }

    pub fn input_bits_per_sample(&self) -> u16 {
        4
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

    fn mono_block(predictor: u8, delta: i16, s1: i16, s2: i16, data: &[u8]) -> Vec<u8> {
        let mut block = vec![predictor];
        block.extend_from_slice(&delta.to_le_bytes());
        block.extend_from_slice(&s1.to_le_bytes());
        block.extend_from_slice(&s2.to_le_bytes());
        block.extend_from_slice(data);
        block
    }

    fn decode_all(decoder: &mut MsAdpcmDecoder) -> Result<Vec<i16>> {
        let mut samples = Vec::new();
        let mut buf = [0u8; 32];
        loop {
            let n = decoder.read(&mut buf)?;
            if n == 0 {
                return Ok(samples);
            }
            samples.extend(buf[..n].chunks_exact(2).map(|b| i16::from_le_bytes([b[0], b[1]])));
        }
    }

    #[test]
    fn test_mono_block_emits_seeds_then_nibbles() {
        let block = mono_block(0, 16, 100, 50, &[0x12, 0xF0]);
        let len = block.len();
        let mut decoder =
            MsAdpcmDecoder::new(Box::new(Cursor::new(block)), len as u64, SampleSpec::new(1, 8000), len);
        assert_eq!(decoder.total_samples_per_channel(), 6);

        let samples = decode_all(&mut decoder).unwrap();
        assert_eq!(&samples[..5], &[50, 100, 116, 148, 132]);
        assert_eq!(samples.len(), 6);
    }

    #[test]
    fn test_delta_floor() {
        let mut state = ChannelState {
            coef1: 256,
            coef2: 0,
            delta: 16,
            sample1: 0,
            sample2: 0,
        };
        state.decode_nibble(0);
        assert_eq!(state.delta, MIN_DELTA);
        state.decode_nibble(8);
        // 768 * 16 >> 8
        assert_eq!(state.delta, 48);
    }

    #[test]
    fn test_delta_growth_is_capped() {
        let block = mono_block(0, 16, 0, 0, &[0x88; 64]);
        let len = block.len();
        let mut decoder =
            MsAdpcmDecoder::new(Box::new(Cursor::new(block)), len as u64, SampleSpec::new(1, 8000), len);

        let samples = decode_all(&mut decoder).unwrap();
        assert_eq!(samples.len(), 2 + 128);

        let mut state = ChannelState {
            coef1: 256,
            coef2: 0,
            delta: 16,
            sample1: 0,
            sample2: 0,
        };
        for _ in 0..64 {
            state.decode_nibble(8);
        }
        assert_eq!(state.delta, MAX_DELTA);
    }

    #[test]
    fn test_invalid_predictor_index() {
        let block = mono_block(7, 16, 0, 0, &[0x00]);
        let len = block.len();
        let mut decoder =
            MsAdpcmDecoder::new(Box::new(Cursor::new(block)), len as u64, SampleSpec::new(1, 8000), len);
        assert!(matches!(
            decode_all(&mut decoder),
            Err(PlaybackError::CorruptedStream(_))
        ));
    }

    #[test]
    fn test_stereo_alternates_channels() {
        let mut block = vec![0u8, 0u8];
        for value in [16i16, 16, 10, -10, 5, -5] {
            block.extend_from_slice(&value.to_le_bytes());
        }
        block.push(0x11);
        let len = block.len();
        let mut decoder =
            MsAdpcmDecoder::new(Box::new(Cursor::new(block)), len as u64, SampleSpec::new(2, 8000), len);
        assert_eq!(decoder.total_samples_per_channel(), 3);

        let samples = decode_all(&mut decoder).unwrap();
        // s2 pair, s1 pair, then left from the high nibble and right from the low
        assert_eq!(samples, vec![5, -5, 10, -10, 26, 6]);
    }

    #[test]
    fn test_partial_block_counts_samples() {
        let full = mono_block(0, 16, 0, 0, &[0u8; 9]);
        let mut data = full.clone();
        data.extend_from_slice(&mono_block(0, 16, 0, 0, &[0u8; 2]));
        let decoder = MsAdpcmDecoder::new(
            Box::new(Cursor::new(data.clone())),
            data.len() as u64,
            SampleSpec::new(1, 8000),
            full.len(),
        );
        assert_eq!(decoder.total_samples_per_channel(), 20 + 6);
    }
}
