//! Shared fixtures for the integration tests: a simulated playback device and
//! builders for synthetic WAV, AIFF and QOA files.

#![allow(dead_code)]

use bridge_traits::error::Result as BridgeResult;
use bridge_traits::{BridgeError, BufferId, PcmFormat, PlaybackDevice, SourceId, SourceState};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

// ============================================================================
// Virtual Device
// ============================================================================

#[derive(Debug)]
struct VirtualSource {
    state: SourceState,
    queue: VecDeque<BufferId>,
    offset: f64,
}

#[derive(Debug, Default)]
struct DeviceState {
    next_id: u32,
    sources: HashMap<SourceId, VirtualSource>,
    buffers: HashMap<BufferId, usize>,
    uploads: usize,
    uploaded_bytes: u64,
    upload_log: Vec<Vec<u8>>,
    max_queued: usize,
    plays: usize,
}

/// In-memory buffer-queue device.
///
/// With auto processing enabled, every `unqueue_processed` call on a playing
/// source finishes the buffer at the head of its queue, so each refill pass of
/// the engine consumes exactly one buffer. A playing source whose queue runs
/// dry switches to `Stopped` like a real device.
#[derive(Debug)]
pub struct VirtualDevice {
    inner: Mutex<DeviceState>,
    auto_process: AtomicBool,
}

impl VirtualDevice {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(DeviceState::default()),
            auto_process: AtomicBool::new(true),
        })
    }

    /// Device that never finishes a buffer on its own.
    pub fn manual() -> Arc<Self> {
        let device = Self::new();
        device.set_auto_process(false);
        device
    }

    pub fn set_auto_process(&self, enabled: bool) {
        self.auto_process.store(enabled, Ordering::SeqCst);
    }

    pub fn uploads(&self) -> usize {
        self.inner.lock().uploads
    }

    pub fn uploaded_bytes(&self) -> u64 {
        self.inner.lock().uploaded_bytes
    }

    /// 16-bit samples of every upload so far, in upload order.
    pub fn uploaded_chunks(&self) -> Vec<Vec<i16>> {
        self.inner
            .lock()
            .upload_log
            .iter()
            .map(|data| i16_samples(data))
            .collect()
    }

    pub fn plays(&self) -> usize {
        self.inner.lock().plays
    }

    pub fn live_sources(&self) -> usize {
        self.inner.lock().sources.len()
    }

    pub fn live_buffers(&self) -> usize {
        self.inner.lock().buffers.len()
    }

    pub fn max_queued(&self) -> usize {
        self.inner.lock().max_queued
    }

    /// Id of the only live source.
    pub fn single_source(&self) -> SourceId {
        let inner = self.inner.lock();
        assert_eq!(inner.sources.len(), 1, "expected exactly one source");
        *inner.sources.keys().next().unwrap()
    }

    pub fn source_state(&self, source: SourceId) -> SourceState {
        self.inner.lock().sources[&source].state
    }

    pub fn queue_len(&self, source: SourceId) -> usize {
        self.inner.lock().sources[&source].queue.len()
    }

    /// Simulate the hardware running dry or being interrupted.
    pub fn force_state(&self, source: SourceId, state: SourceState) {
        if let Some(entry) = self.inner.lock().sources.get_mut(&source) {
            entry.state = state;
        }
    }

    fn next_id(inner: &mut DeviceState) -> u32 {
        inner.next_id += 1;
        inner.next_id
    }
}

fn with_source<T>(
    inner: &mut DeviceState,
    source: SourceId,
    f: impl FnOnce(&mut VirtualSource) -> T,
) -> BridgeResult<T> {
    inner
        .sources
        .get_mut(&source)
        .map(f)
        .ok_or(BridgeError::UnknownHandle(source.0))
}

impl PlaybackDevice for VirtualDevice {
    fn create_source(&self) -> BridgeResult<SourceId> {
        let mut inner = self.inner.lock();
        let id = SourceId(Self::next_id(&mut inner));
        inner.sources.insert(
            id,
            VirtualSource {
                state: SourceState::Initial,
                queue: VecDeque::new(),
                offset: 0.0,
            },
        );
        Ok(id)
    }

    fn delete_source(&self, source: SourceId) {
        self.inner.lock().sources.remove(&source);
    }

    fn create_buffers(&self, count: usize) -> BridgeResult<Vec<BufferId>> {
        let mut inner = self.inner.lock();
        let ids: Vec<_> = (0..count)
            .map(|_| BufferId(Self::next_id(&mut inner)))
            .collect();
        for id in &ids {
            inner.buffers.insert(*id, 0);
        }
        Ok(ids)
    }

    fn delete_buffers(&self, buffers: &[BufferId]) {
        let mut inner = self.inner.lock();
        for buffer in buffers {
            inner.buffers.remove(buffer);
        }
    }

    fn buffer_data(
        &self,
        buffer: BufferId,
        _format: PcmFormat,
        data: &[u8],
        _sample_rate: u32,
    ) -> BridgeResult<()> {
        let mut inner = self.inner.lock();
        let slot = inner
            .buffers
            .get_mut(&buffer)
            .ok_or(BridgeError::UnknownHandle(buffer.0))?;
        *slot = data.len();
        inner.uploads += 1;
        inner.uploaded_bytes += data.len() as u64;
        inner.upload_log.push(data.to_vec());
        Ok(())
    }

    fn queue_buffer(&self, source: SourceId, buffer: BufferId) -> BridgeResult<()> {
        let mut inner = self.inner.lock();
        let queued = with_source(&mut inner, source, |s| {
            s.queue.push_back(buffer);
            s.queue.len()
        })?;
        inner.max_queued = inner.max_queued.max(queued);
        Ok(())
    }

    fn unqueue_processed(&self, source: SourceId) -> BridgeResult<Vec<BufferId>> {
        let auto = self.auto_process.load(Ordering::SeqCst);
        let mut inner = self.inner.lock();
        with_source(&mut inner, source, |s| {
            if !auto || s.state != SourceState::Playing {
                return Vec::new();
            }
            let processed: Vec<_> = s.queue.pop_front().into_iter().collect();
            s.offset = 0.0;
            if s.queue.is_empty() {
                s.state = SourceState::Stopped;
            }
            processed
        })
    }

    fn queued_count(&self, source: SourceId) -> usize {
        self.inner
            .lock()
            .sources
            .get(&source)
            .map_or(0, |s| s.queue.len())
    }

    fn clear_queue(&self, source: SourceId) -> BridgeResult<()> {
        let mut inner = self.inner.lock();
        with_source(&mut inner, source, |s| s.queue.clear())
    }

    fn play(&self, source: SourceId) -> BridgeResult<()> {
        let mut inner = self.inner.lock();
        inner.plays += 1;
        with_source(&mut inner, source, |s| {
            s.state = if s.queue.is_empty() {
                SourceState::Stopped
            } else {
                SourceState::Playing
            };
        })
    }

    fn pause(&self, source: SourceId) -> BridgeResult<()> {
        let mut inner = self.inner.lock();
        with_source(&mut inner, source, |s| {
            if s.state == SourceState::Playing {
                s.state = SourceState::Paused;
            }
        })
    }

    fn stop(&self, source: SourceId) -> BridgeResult<()> {
        let mut inner = self.inner.lock();
        with_source(&mut inner, source, |s| {
            s.state = SourceState::Stopped;
            s.offset = 0.0;
        })
    }

    fn state(&self, source: SourceId) -> SourceState {
        self.inner
            .lock()
            .sources
            .get(&source)
            .map_or(SourceState::Stopped, |s| s.state)
    }

    fn playback_offset(&self, source: SourceId) -> f64 {
        self.inner
            .lock()
            .sources
            .get(&source)
            .map_or(0.0, |s| s.offset)
    }

    fn set_playback_offset(&self, source: SourceId, seconds: f64) -> BridgeResult<()> {
        let mut inner = self.inner.lock();
        with_source(&mut inner, source, |s| s.offset = seconds)
    }
}

/// Poll `condition` every millisecond until it holds or `timeout` expires.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    condition()
}

// ============================================================================
// File Builders
// ============================================================================

/// RIFF/WAVE file with a plain 16-byte `fmt ` chunk.
pub fn wav(format: u16, channels: u16, rate: u32, bits: u16, block_align: u16, data: &[u8]) -> Vec<u8> {
    wav_with_fmt(&fmt_body(format, channels, rate, bits, block_align), data)
}

pub fn fmt_body(format: u16, channels: u16, rate: u32, bits: u16, block_align: u16) -> Vec<u8> {
    let mut fmt = Vec::new();
    fmt.extend_from_slice(&format.to_le_bytes());
    fmt.extend_from_slice(&channels.to_le_bytes());
    fmt.extend_from_slice(&rate.to_le_bytes());
    fmt.extend_from_slice(&(rate * u32::from(block_align)).to_le_bytes());
    fmt.extend_from_slice(&block_align.to_le_bytes());
    fmt.extend_from_slice(&bits.to_le_bytes());
    fmt
}

pub fn wav_with_fmt(fmt: &[u8], data: &[u8]) -> Vec<u8> {
    let mut body = b"WAVE".to_vec();
    body.extend_from_slice(b"fmt ");
    body.extend_from_slice(&(fmt.len() as u32).to_le_bytes());
    body.extend_from_slice(fmt);
    if fmt.len() % 2 == 1 {
        body.push(0);
    }
    body.extend_from_slice(b"data");
    body.extend_from_slice(&(data.len() as u32).to_le_bytes());
    body.extend_from_slice(data);

    let mut file = b"RIFF".to_vec();
    file.extend_from_slice(&(body.len() as u32).to_le_bytes());
    file.extend_from_slice(&body);
    file
}

/// Linear PCM WAV from little-endian sample bytes.
pub fn wav_pcm(channels: u16, rate: u32, bits: u16, data: &[u8]) -> Vec<u8> {
    wav(1, channels, rate, bits, channels * bits / 8, data)
}

pub fn wav_i16(channels: u16, rate: u32, samples: &[i16]) -> Vec<u8> {
    let data: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
    wav_pcm(channels, rate, 16, &data)
}

/// Mono 16-bit WAV with a recognizable ramp: sample `i` is `i as i16`.
pub fn wav_ramp(samples: usize, rate: u32) -> Vec<u8> {
    let data: Vec<u8> = (0..samples).flat_map(|i| (i as i16).to_le_bytes()).collect();
    wav_pcm(1, rate, 16, &data)
}

/// 80-bit IEEE 754 extended encoding of an integral sample rate.
pub fn extended(rate: u32) -> [u8; 10] {
    assert!(rate > 0);
    let msb = 31 - rate.leading_zeros();
    let exponent = 16383 + msb as u16;
    let mantissa = u64::from(rate) << (63 - msb);
    let mut bytes = [0u8; 10];
    bytes[..2].copy_from_slice(&exponent.to_be_bytes());
    bytes[2..].copy_from_slice(&mantissa.to_be_bytes());
    bytes
}

/// AIFF (`compression == None`) or AIFC file.
pub fn aiff(
    channels: i16,
    frames: u32,
    bits: i16,
    rate: u32,
    compression: Option<&[u8; 4]>,
    samples: &[u8],
) -> Vec<u8> {
    let mut comm = Vec::new();
    comm.extend_from_slice(&channels.to_be_bytes());
    comm.extend_from_slice(&frames.to_be_bytes());
    comm.extend_from_slice(&bits.to_be_bytes());
    comm.extend_from_slice(&extended(rate));
    if let Some(id) = compression {
        comm.extend_from_slice(id);
        comm.extend_from_slice(&[0, 0]);
    }

    let form_type: &[u8; 4] = if compression.is_some() { b"AIFC" } else { b"AIFF" };
    let mut body = form_type.to_vec();
    body.extend_from_slice(b"COMM");
    body.extend_from_slice(&(comm.len() as u32).to_be_bytes());
    body.extend_from_slice(&comm);
    body.extend_from_slice(b"SSND");
    body.extend_from_slice(&(samples.len() as u32 + 8).to_be_bytes());
    body.extend_from_slice(&[0u8; 8]);
    body.extend_from_slice(samples);
    if samples.len() % 2 == 1 {
        body.push(0);
    }

    let mut file = b"FORM".to_vec();
    file.extend_from_slice(&(body.len() as u32).to_be_bytes());
    file.extend_from_slice(&body);
    file
}

/// One encoded QOA slice together with the samples it decodes to when the
/// LMS starts from [`QOA_START_HISTORY`] / [`QOA_START_WEIGHTS`].
pub const QOA_GOLDEN_SLICE: u64 = 0x50a6_0a62_ef2e_f03f;
pub const QOA_GOLDEN_SAMPLES: [i16; 20] = [
    104, 553, 1625, 3681, 5931, 8714, 12488, 17942, 24667, 32767, 32767, 32767, 32767, 32767,
    32767, 32648, 32505, 32434, 31460, 28622,
];
pub const QOA_START_HISTORY: [i16; 4] = [0; 4];
pub const QOA_START_WEIGHTS: [i16; 4] = [0, 0, -(1 << 13), 1 << 14];

/// Mono QOA file with a single frame made of `slices`.
pub fn qoa_mono(total: u32, frame_samples: u16, rate: u32, slices: &[u64]) -> Vec<u8> {
    let mut file = b"qoaf".to_vec();
    file.extend_from_slice(&total.to_be_bytes());
    if total == 0 {
        return file;
    }
    let frame_size = 8 + 16 + 8 * slices.len() as u16;
    file.push(1);
    file.extend_from_slice(&rate.to_be_bytes()[1..]);
    file.extend_from_slice(&frame_samples.to_be_bytes());
    file.extend_from_slice(&frame_size.to_be_bytes());
    for value in QOA_START_HISTORY.iter().chain(QOA_START_WEIGHTS.iter()) {
        file.extend_from_slice(&value.to_be_bytes());
    }
    for slice in slices {
        file.extend_from_slice(&slice.to_be_bytes());
    }
    file
}

/// Decode little-endian 16-bit PCM bytes.
pub fn i16_samples(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect()
}
