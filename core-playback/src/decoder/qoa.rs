//! QOA ("Quite OK Audio") container and decoder.
//!
//! A QOA file is an 8-byte header followed by self-delimiting frames:
//!
//! ```text
//! "qoaf" u32be(samples per channel)
//! frame: u8 channels | u24be rate | u16be samples | u16be frame size
//!        per channel: 4 × i16be history, 4 × i16be weights
//!        slices: u64be, 20 samples each, interleaved per channel
//! ```
//!
//! Every slice carries a 4-bit scale factor and twenty 3-bit quantized
//! residuals. Samples are reconstructed with a 4-tap sign-sign LMS predictor
//! whose state carries over from slice to slice.

use super::bits::{self, read_fully, BoundedReader, SourceReader};
use super::{push_i16, BlockOutput, PcmDataType, SampleSpec};
use crate::error::{PlaybackError, Result};
use tracing::warn;

pub const MAGIC: &[u8; 4] = b"qoaf";
pub const MAX_CHANNELS: u16 = 8;
pub const SLICE_LEN: usize = 20;
pub const MAX_SLICES_PER_FRAME: usize = 256;
pub const MAX_FRAME_SAMPLES: usize = SLICE_LEN * MAX_SLICES_PER_FRAME;

const FRAME_HEADER_LEN: usize = 8;
const LMS_STATE_LEN: usize = 16;

const DEQUANT: [[i32; 8]; 16] = [
    [1, -1, 3, -3, 5, -5, 7, -7],
    [5, -5, 18, -18, 32, -32, 49, -49],
    [16, -16, 53, -53, 95, -95, 147, -147],
    [34, -34, 113, -113, 203, -203, 315, -315],
    [63, -63, 210, -210, 378, -378, 588, -588],
    [104, -104, 345, -345, 621, -621, 966, -966],
    [158, -158, 528, -528, 950, -950, 1477, -1477],
    [228, -228, 760, -760, 1368, -1368, 2128, -2128],
    [316, -316, 1053, -1053, 1895, -1895, 2947, -2947],
    [422, -422, 1405, -1405, 2529, -2529, 3934, -3934],
    [548, -548, 1828, -1828, 3290, -3290, 5117, -5117],
    [696, -696, 2320, -2320, 4176, -4176, 6496, -6496],
    [868, -868, 2893, -2893, 5207, -5207, 8099, -8099],
    [1064, -1064, 3548, -3548, 6386, -6386, 9933, -9933],
    [1286, -1286, 4288, -4288, 7718, -7718, 12005, -12005],
    [1536, -1536, 5120, -5120, 9216, -9216, 14336, -14336],
];

/// Sign-sign least mean squares predictor state of one channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LmsState {
    pub history: [i16; 4],
    pub weights: [i16; 4],
}

impl LmsState {
    /// Predicted next sample, before the residual is applied.
    pub fn predict(&self) -> i32 {
        let sum = self
            .weights
            .iter()
            .zip(self.history.iter())
            .fold(0i32, |acc, (w, h)| acc.wrapping_add(i32::from(*w) * i32::from(*h)));
        sum >> 13
    }

    /// Adapt the weights towards the residual sign and push `sample` into the history.
    pub fn update(&mut self, sample: i16, residual: i32) {
        let delta = residual >> 4;
        for (weight, history) in self.weights.iter_mut().zip(self.history.iter()) {
            let step = if *history < 0 { -delta } else { delta };
            *weight = weight.wrapping_add(step as i16);
        }
        self.history.rotate_left(1);
        self.history[3] = sample;
    }

    fn from_be_bytes(bytes: &[u8]) -> Self {
        let word = |i: usize| i16::from_be_bytes([bytes[i * 2], bytes[i * 2 + 1]]);
        Self {
            history: [word(0), word(1), word(2), word(3)],
            weights: [word(4), word(5), word(6), word(7)],
        }
    }
}

/// Decode one slice into `output`, writing every `stride`-th sample.
fn decode_slice(lms: &mut LmsState, mut slice: u64, output: &mut [i16], stride: usize, count: usize) {
    let scale_factor = (slice >> 60) as usize;
    for sample_index in 0..count {
        let predicted = lms.predict();
        let quantized = ((slice >> 57) & 0x7) as usize;
        let residual = DEQUANT[scale_factor][quantized];
        let sample = (predicted + residual).clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16;
        lms.update(sample, residual);
        output[sample_index * stride] = sample;
        slice <<= 3;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FrameHeader {
    channels: u16,
    sample_rate: u32,
    samples: usize,
    frame_size: usize,
}

impl FrameHeader {
    fn parse(bytes: [u8; FRAME_HEADER_LEN]) -> Self {
        Self {
            channels: u16::from(bytes[0]),
            sample_rate: u32::from_be_bytes([0, bytes[1], bytes[2], bytes[3]]),
            samples: usize::from(u16::from_be_bytes([bytes[4], bytes[5]])),
            frame_size: usize::from(u16::from_be_bytes([bytes[6], bytes[7]])),
        }
    }

    fn expected_size(&self) -> usize {
        let channels = usize::from(self.channels);
        let slices = self.samples.div_ceil(SLICE_LEN);
        FRAME_HEADER_LEN + LMS_STATE_LEN * channels + slices * 8 * channels
    }
}

/// Read the file header and the first frame header.
pub fn open(mut reader: SourceReader) -> Result<QoaDecoder> {
    let magic = bits::read_tag(&mut reader)
        .map_err(|_| PlaybackError::MalformedContainer("QOA header is truncated".to_string()))?;
    if &magic != MAGIC {
        return Err(PlaybackError::MalformedContainer(
            "missing 'qoaf' magic".to_string(),
        ));
    }
    let total_samples = bits::read_u32_be(&mut reader)
        .map_err(|_| PlaybackError::MalformedContainer("QOA header is truncated".to_string()))?;
    if total_samples == 0 {
        return Err(PlaybackError::UnsupportedFormat(
            "streamed QOA is not supported".to_string(),
        ));
    }

    let mut header = [0u8; FRAME_HEADER_LEN];
    if read_fully(&mut reader, &mut header)? < FRAME_HEADER_LEN {
        return Err(PlaybackError::MalformedContainer(
            "QOA file has no frames".to_string(),
        ));
    }
    let first = FrameHeader::parse(header);
    if first.channels == 0 || first.channels > MAX_CHANNELS {
        return Err(PlaybackError::UnsupportedFormat(format!(
            "QOA channels: {}",
            first.channels
        )));
    }
    if first.sample_rate == 0 {
        return Err(PlaybackError::MalformedContainer(
            "QOA sample rate is zero".to_string(),
        ));
    }

    Ok(QoaDecoder {
        input: BoundedReader::unbounded(reader),
        spec: SampleSpec::new(first.channels, first.sample_rate),
        total_samples: u64::from(total_samples),
        emitted: 0,
        next_header: Some(first),
        lms: [LmsState::default(); MAX_CHANNELS as usize],
        frame: Vec::new(),
        samples: Vec::new(),
        pending: BlockOutput::default(),
        consumed: (MAGIC.len() + 4 + FRAME_HEADER_LEN) as u64,
        finished: false,
    })
}

#[derive(Debug)]
pub struct QoaDecoder {
    input: BoundedReader,
    spec: SampleSpec,
    total_samples: u64,
    /// Samples per channel handed to `pending` so far.
    emitted: u64,
    /// Header read ahead at open time.
    next_header: Option<FrameHeader>,
    lms: [LmsState; MAX_CHANNELS as usize],
    frame: Vec<u8>,
    samples: Vec<i16>,
    pending: BlockOutput,
    consumed: u64,
    finished: bool,
}

impl QoaDecoder {
    pub fn read(&mut self, output: &mut [u8]) -> Result<usize> {
        let usable = super::frame_aligned(output.len(), 2 * usize::from(self.spec.channels));
        let mut written = 0;
        while written < usable {
            if self.pending.is_drained() && !self.decode_next_frame()? {
                break;
            }
            written += self.pending.drain_into(&mut output[written..usable]);
        }
        Ok(written)
    }

    fn read_frame_header(&mut self) -> Result<Option<FrameHeader>> {
        if let Some(header) = self.next_header.take() {
            return Ok(Some(header));
        }
        let mut bytes = [0u8; FRAME_HEADER_LEN];
        let read = self.input.read_fully(&mut bytes)?;
        self.consumed += read as u64;
        if read < FRAME_HEADER_LEN {
            if read > 0 {
                warn!(read, "QOA stream ends inside a frame header");
            }
            return Ok(None);
        }
        Ok(Some(FrameHeader::parse(bytes)))
    }

    fn decode_next_frame(&mut self) -> Result<bool> {
        if self.finished || self.emitted >= self.total_samples {
            self.finished = true;
            return Ok(false);
        }
        let Some(header) = self.read_frame_header()? else {
            self.finished = true;
            return Ok(false);
        };

        if header.channels != self.spec.channels {
            return Err(PlaybackError::CorruptedStream(format!(
                "QOA frame has {} channels, stream has {}",
                header.channels, self.spec.channels
            )));
        }
        if header.samples > MAX_FRAME_SAMPLES || header.frame_size != header.expected_size() {
            return Err(PlaybackError::CorruptedStream(format!(
                "QOA frame size {} does not match {} samples",
                header.frame_size, header.samples
            )));
        }

        let body_len = header.frame_size - FRAME_HEADER_LEN;
        self.frame.resize(body_len, 0);
        let read = self.input.read_fully(&mut self.frame)?;
        self.consumed += read as u64;
        if read < body_len {
            warn!(expected = body_len, read, "QOA stream ends inside a frame");
            self.finished = true;
            return Ok(false);
        }

        let channels = usize::from(header.channels);
        let mut cursor = 0;
        for lms in self.lms.iter_mut().take(channels) {
            *lms = LmsState::from_be_bytes(&self.frame[cursor..cursor + LMS_STATE_LEN]);
            cursor += LMS_STATE_LEN;
        }

        self.samples.clear();
        self.samples.resize(header.samples * channels, 0);
        for slice_start in (0..header.samples).step_by(SLICE_LEN) {
            let count = SLICE_LEN.min(header.samples - slice_start);
            for channel in 0..channels {
                let mut word = [0u8; 8];
                word.copy_from_slice(&self.frame[cursor..cursor + 8]);
                cursor += 8;
                decode_slice(
                    &mut self.lms[channel],
                    u64::from_be_bytes(word),
                    &mut self.samples[slice_start * channels + channel..],
                    channels,
                    count,
                );
            }
        }

        let remaining = self.total_samples - self.emitted;
        let frames = (header.samples as u64).min(remaining) as usize;
        self.emitted += frames as u64;

        let out = self.pending.refill();
        for sample in &self.samples[..frames * channels] {
            push_i16(out, *sample);
        }
        Ok(true)
    }

    pub fn spec(&self) -> SampleSpec {
        self.spec
    }

    pub fn input_bits_per_sample(&self) -> u16 {
        // bits per residual code
        3
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

    /// QOA frames are self-delimiting; this reports an estimate from the
    /// samples still to be emitted.
    pub fn bytes_remaining(&self) -> u64 {
        if self.finished {
            return 0;
        }
        let remaining = self.total_samples - self.emitted;
        let slices = remaining.div_ceil(SLICE_LEN as u64);
        slices * 8 * u64::from(self.spec.channels)
    }

    /// Encoded bytes consumed from the input so far.
    pub fn bytes_consumed(&self) -> u64 {
        self.consumed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const GOLDEN_SLICE: u64 = 0x50a6_0a62_ef2e_f03f;
    const GOLDEN_SAMPLES: [i16; 20] = [
        104, 553, 1625, 3681, 5931, 8714, 12488, 17942, 24667, 32767, 32767, 32767, 32767, 32767,
        32767, 32648, 32505, 32434, 31460, 28622,
    ];

    fn encoder_start_state() -> LmsState {
        LmsState {
            history: [0; 4],
            weights: [0, 0, -(1 << 13), 1 << 14],
        }
    }

    fn mono_file(total: u32, samples: u16, slices: &[u64]) -> Vec<u8> {
        let mut file = b"qoaf".to_vec();
        file.extend_from_slice(&total.to_be_bytes());
        let frame_size = 8 + 16 + 8 * slices.len() as u16;
        file.push(1);
        file.extend_from_slice(&44100u32.to_be_bytes()[1..]);
        file.extend_from_slice(&samples.to_be_bytes());
        file.extend_from_slice(&frame_size.to_be_bytes());
        let state = encoder_start_state();
        for value in state.history.iter().chain(state.weights.iter()) {
            file.extend_from_slice(&value.to_be_bytes());
        }
        for slice in slices {
            file.extend_from_slice(&slice.to_be_bytes());
        }
        file
    }

    fn decode_all(decoder: &mut QoaDecoder) -> Vec<i16> {
        let mut samples = Vec::new();
        let mut buf = [0u8; 16];
        loop {
            let n = decoder.read(&mut buf).unwrap();
            if n == 0 {
                return samples;
            }
            samples.extend(buf[..n].chunks_exact(2).map(|b| i16::from_le_bytes([b[0], b[1]])));
        }
    }

    #[test]
    fn test_lms_predict_and_update() {
        let mut lms = LmsState {
            history: [100, 200, 300, 400],
            weights: [0, 0, -(1 << 13), 1 << 14],
        };
        assert_eq!(lms.predict(), 500);

        lms.update(510, 32);
        assert_eq!(lms.history, [200, 300, 400, 510]);
        assert_eq!(lms.weights, [2, 2, -8190, 16386]);

        let mut negative = LmsState {
            history: [-1, 1, -1, 1],
            weights: [0; 4],
        };
        negative.update(0, 64);
        assert_eq!(negative.weights, [-4, 4, -4, 4]);
    }

    #[test]
    fn test_slice_golden_trajectory() {
        let mut lms = encoder_start_state();
        let mut out = [0i16; 20];
        decode_slice(&mut lms, GOLDEN_SLICE, &mut out, 1, 20);
        assert_eq!(out, GOLDEN_SAMPLES);
        assert_eq!(lms.history, [32505, 32434, 31460, 28622]);
        assert_eq!(lms.weights, [-118, -118, -8310, 16266]);
    }

    #[test]
    fn test_decoder_reads_frame() {
        let file = mono_file(20, 20, &[GOLDEN_SLICE]);
        let mut decoder = open(Box::new(Cursor::new(file))).unwrap();
        assert_eq!(decoder.spec(), SampleSpec::new(1, 44100));
        assert_eq!(decoder.total_samples_per_channel(), 20);
        assert_eq!(decode_all(&mut decoder), GOLDEN_SAMPLES.to_vec());
        assert_eq!(decoder.bytes_remaining(), 0);
    }

    #[test]
    fn test_output_capped_at_declared_total() {
        let file = mono_file(7, 20, &[GOLDEN_SLICE]);
        let mut decoder = open(Box::new(Cursor::new(file))).unwrap();
        assert_eq!(decode_all(&mut decoder), GOLDEN_SAMPLES[..7].to_vec());
    }

    #[test]
    fn test_streamed_qoa_rejected() {
        let file = mono_file(0, 20, &[GOLDEN_SLICE]);
        let err = open(Box::new(Cursor::new(file))).unwrap_err();
        assert!(matches!(err, PlaybackError::UnsupportedFormat(ref m) if m.contains("streamed")));
    }

    #[test]
    fn test_bad_magic_is_malformed() {
        let mut file = mono_file(20, 20, &[GOLDEN_SLICE]);
        file[0] = b'x';
        assert!(matches!(
            open(Box::new(Cursor::new(file))),
            Err(PlaybackError::MalformedContainer(_))
        ));
    }

    #[test]
    fn test_frame_size_mismatch_is_corrupted() {
        let mut file = mono_file(20, 20, &[GOLDEN_SLICE]);
        // declared frame size byte
        file[15] = 40;
        let mut decoder = open(Box::new(Cursor::new(file))).unwrap();
        let mut buf = [0u8; 8];
        assert!(matches!(
            decoder.read(&mut buf),
            Err(PlaybackError::CorruptedStream(_))
        ));
    }
}
