//! IMA/DVI ADPCM decoder for WAV format tag `0x0011`.

use super::bits::{BoundedReader, SourceReader};
use super::{frame_aligned, push_i16, BlockOutput, PcmDataType, SampleSpec};
use crate::error::Result;

const INDEX_TABLE: [i32; 16] = [-1, -1, -1, -1, 2, 4, 6, 8, -1, -1, -1, -1, 2, 4, 6, 8];

const STEP_TABLE: [i32; 89] = [
    7, 8, 9, 10, 11, 12, 13, 14, 16, 17, 19, 21, 23, 25, 28, 31, 34, 37, 41, 45, 50, 55, 60, 66,
    73, 80, 88, 97, 107, 118, 130, 143, 157, 173, 190, 209, 230, 253, 279, 307, 337, 371, 408,
    449, 494, 544, 598, 658, 724, 796, 876, 963, 1060, 1166, 1282, 1411, 1552, 1707, 1878, 2066,
    2272, 2499, 2749, 3024, 3327, 3660, 4026, 4428, 4871, 5358, 5894, 6484, 7132, 7845, 8630,
    9493, 10442, 11487, 12635, 13899, 15289, 16818, 18500, 20350, 22385, 24623, 27086, 29794,
    32767,
];

const MAX_STEP_INDEX: i32 = 88;
const PREAMBLE_BYTES: usize = 4;
/// Data bytes per channel before a stereo stream switches channel.
const STEREO_GROUP_BYTES: usize = 4;

/// Predictor state of one channel.
#[derive(Debug, Default, Clone, Copy)]
struct ChannelState {
    predictor: i32,
    step_index: i32,
}

impl ChannelState {
    fn from_preamble(bytes: &[u8]) -> Self {
        Self {
            predictor: i32::from(i16::from_le_bytes([bytes[0], bytes[1]])),
            step_index: i32::from(bytes[2]).min(MAX_STEP_INDEX),
        }
    }

    fn decode_nibble(&mut self, nibble: u8) -> i16 {
        let step = STEP_TABLE[self.step_index as usize];
        self.step_index = (self.step_index + INDEX_TABLE[usize::from(nibble)]).clamp(0, MAX_STEP_INDEX);

        let mut diff = step >> 3;
        if nibble & 4 != 0 {
            diff += step;
        }
        if nibble & 2 != 0 {
            diff += step >> 1;
        }
        if nibble & 1 != 0 {
            diff += step >> 2;
        }

        if nibble & 8 != 0 {
            self.predictor -= diff;
        } else {
            self.predictor += diff;
        }
        self.predictor = self.predictor.clamp(i32::from(i16::MIN), i32::from(i16::MAX));
        self.predictor as i16
    }

    /// Decode both nibbles of a data byte, low nibble first.
    fn decode_byte(&mut self, byte: u8) -> [i16; 2] {
        [self.decode_nibble(byte & 0x0F), self.decode_nibble(byte >> 4)]
    }
}

#[derive(Debug)]
pub struct ImaAdpcmDecoder {
    input: BoundedReader,
    spec: SampleSpec,
    block_align: usize,
    block: Vec<u8>,
    pending: BlockOutput,
    total_samples: u64,
}

impl ImaAdpcmDecoder {
    /// `spec.channels` must be 1 or 2 and `block_align` larger than the preamble.
    pub fn new(reader: SourceReader, data_len: u64, spec: SampleSpec, block_align: usize) -> Self {
        let channels = u64::from(spec.channels.max(1));
        let block_size = block_align.max(1) as u64;
        let blocks = data_len.div_ceil(block_size);
        let preamble_bytes = blocks * PREAMBLE_BYTES as u64 * channels;
        let total_samples = (data_len * 2).saturating_sub(preamble_bytes * 2) / channels;

        Self {
            input: BoundedReader::new(reader, data_len),
            spec,
            block_align,
            block: vec![0; block_align],
            pending: BlockOutput::default(),
            total_samples,
        }
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

    /// Decode the next block into `pending`; `false` at end of input.
    fn decode_next_block(&mut self) -> Result<bool> {
        let channels = usize::from(self.spec.channels);
        let read = self.input.read_fully(&mut self.block)?;
        let header_len = PREAMBLE_BYTES * channels;
        if read < header_len {
            return Ok(false);
        }

        let mut states = [ChannelState::default(); 2];
        for (channel, state) in states.iter_mut().enumerate().take(channels) {
            *state = ChannelState::from_preamble(&self.block[channel * PREAMBLE_BYTES..]);
        }

        let data = &self.block[header_len..read];
        let out = self.pending.refill();

        if channels == 1 {
            for byte in data {
                for sample in states[0].decode_byte(*byte) {
                    push_i16(out, sample);
                }
            }
        } else {
            let group = STEREO_GROUP_BYTES * 2;
            for chunk in data.chunks_exact(group) {
                let mut left = [0i16; STEREO_GROUP_BYTES * 2];
                let mut right = [0i16; STEREO_GROUP_BYTES * 2];
                for i in 0..STEREO_GROUP_BYTES {
                    left[i * 2..i * 2 + 2].copy_from_slice(&states[0].decode_byte(chunk[i]));
                    right[i * 2..i * 2 + 2]
                        .copy_from_slice(&states[1].decode_byte(chunk[STEREO_GROUP_BYTES + i]));
                }
                for (l, r) in left.iter().zip(right.iter()) {
                    push_i16(out, *l);
                    push_i16(out, *r);
                }
            }
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

    fn decode_all(decoder: &mut ImaAdpcmDecoder) -> Vec<i16> {
        let mut samples = Vec::new();
        let mut buf = [0u8; 64];
        loop {
            let n = decoder.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            samples.extend(buf[..n].chunks_exact(2).map(|b| i16::from_le_bytes([b[0], b[1]])));
        }
        samples
    }

    #[test]
    fn test_first_nibbles_from_zero_state() {
        // predictor 0, step index 0, one data byte
        let block = vec![0x00, 0x00, 0x00, 0x00, 0x07];
        let mut decoder =
            ImaAdpcmDecoder::new(Box::new(Cursor::new(block)), 5, SampleSpec::new(1, 8000), 5);
        assert_eq!(decoder.total_samples_per_channel(), 2);
        assert_eq!(decode_all(&mut decoder), vec![11, 13]);
    }

    #[test]
    fn test_step_index_clamped_from_preamble() {
        let mut state = ChannelState::from_preamble(&[0x00, 0x00, 200, 0x00]);
        assert_eq!(state.step_index, 88);
        // largest positive code saturates the predictor
        assert_eq!(state.decode_nibble(0x07), i16::MAX);
    }

    #[test]
    fn test_predictor_saturates_negative() {
        let mut state = ChannelState {
            predictor: -32000,
            step_index: 88,
        };
        assert_eq!(state.decode_nibble(0x0F), i16::MIN);
    }

    #[test]
    fn test_stereo_groups_interleave() {
        let mut block = vec![
            0x00, 0x00, 0x00, 0x00, // left preamble
            0x00, 0x00, 0x00, 0x00, // right preamble
        ];
        block.extend_from_slice(&[0x07, 0x00, 0x00, 0x00]);
        block.extend_from_slice(&[0x0F, 0x00, 0x00, 0x00]);
        let len = block.len();
        let mut decoder =
            ImaAdpcmDecoder::new(Box::new(Cursor::new(block)), len as u64, SampleSpec::new(2, 8000), len);
        assert_eq!(decoder.total_samples_per_channel(), 8);

        let samples = decode_all(&mut decoder);
        assert_eq!(samples.len(), 16);
        assert_eq!(samples[0], 11);
        assert_eq!(samples[1], -11);
        assert_eq!(samples[2], 13);
        assert_eq!(samples[3], -9);
    }

    #[test]
    fn test_decoding_is_deterministic() {
        let block: Vec<u8> = [0x10, 0x00, 0x05, 0x00]
            .into_iter()
            .chain((0..60u8).map(|i| i.wrapping_mul(37)))
            .collect();
        let len = block.len();
        let run = |data: Vec<u8>| {
            let mut decoder =
                ImaAdpcmDecoder::new(Box::new(Cursor::new(data)), len as u64, SampleSpec::new(1, 8000), len);
            decode_all(&mut decoder)
        };
        let first = run(block.clone());
        assert_eq!(first.len(), 120);
        assert_eq!(first, run(block));
    }
}
