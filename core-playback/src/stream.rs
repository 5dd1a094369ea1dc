//! # Audio Stream
//!
//! Uniform pull interface over every supported container: open a source,
//! inspect its layout, read interleaved PCM until the end, reopen to rewind.
//!
//! ## Usage
//!
//! ```no_run
//! use core_playback::AudioStream;
//!
//! let mut stream = AudioStream::open_path("sfx/explosion.wav")?;
//! println!("{} Hz, {} channel(s)", stream.sample_rate(), stream.channels());
//!
//! let mut buffer = vec![0u8; 4096];
//! while stream.read(&mut buffer)? > 0 {
//!     // hand the PCM to the device
//! }
//! # Ok::<(), core_playback::PlaybackError>(())
//! ```

use crate::decoder::bits::{read_fully, SourceReader};
use crate::decoder::{
    aiff, qoa, wav, AudioFileType, Decoder, FormatDetector, PcmDataType, SNIFF_LEN,
};
use crate::error::{PlaybackError, Result};
use bridge_traits::PcmFormat;
use bytes::Bytes;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, instrument};

/// Where the encoded audio comes from.
///
/// The source is kept by the stream so it can be reopened on
/// [`AudioStream::reset`].
#[derive(Debug, Clone)]
pub enum AudioSource {
    File(PathBuf),
    Memory(Bytes),
}

impl AudioSource {
    fn open_reader(&self) -> Result<SourceReader> {
        match self {
            AudioSource::File(path) => Ok(Box::new(BufReader::new(File::open(path)?))),
            AudioSource::Memory(bytes) => {
                use bytes::Buf;
                Ok(Box::new(bytes.clone().reader()))
            }
        }
    }
}

impl fmt::Display for AudioSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioSource::File(path) => write!(f, "{}", path.display()),
            AudioSource::Memory(bytes) => write!(f, "<memory: {} bytes>", bytes.len()),
        }
    }
}

impl From<PathBuf> for AudioSource {
    fn from(path: PathBuf) -> Self {
        AudioSource::File(path)
    }
}

impl From<Bytes> for AudioSource {
    fn from(bytes: Bytes) -> Self {
        AudioSource::Memory(bytes)
    }
}

/// Decoded audio stream.
///
/// Layout accessors keep answering after [`close`](AudioStream::close);
/// only [`read`](AudioStream::read) fails on a closed stream.
#[derive(Debug)]
pub struct AudioStream {
    source: AudioSource,
    file_type: AudioFileType,
    decoder: Option<Decoder>,
    channels: u16,
    sample_rate: u32,
    bits_per_sample: u16,
    data_type: PcmDataType,
    total_samples_per_channel: u64,
    block_align: Option<usize>,
}

impl AudioStream {
    /// Open a stream, detecting the container from its leading bytes.
    ///
    /// # Errors
    ///
    /// - `MalformedContainer` if the container is not recognized or broken
    /// - `UnsupportedFormat` if the codec or layout cannot be decoded
    /// - `Io` if the source cannot be read
    #[instrument(skip(source), fields(source = %source))]
    pub fn open(source: AudioSource) -> Result<Self> {
        Self::open_with(source, None)
    }

    /// Open a stream as the given container, skipping detection.
    pub fn open_as(source: AudioSource, file_type: AudioFileType) -> Result<Self> {
        Self::open_with(source, Some(file_type))
    }

    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::open(AudioSource::File(path.as_ref().to_path_buf()))
    }

    pub fn from_bytes(bytes: impl Into<Bytes>) -> Result<Self> {
        Self::open(AudioSource::Memory(bytes.into()))
    }

    fn open_with(source: AudioSource, forced: Option<AudioFileType>) -> Result<Self> {
        let (file_type, decoder) = open_decoder(&source, forced)?;
        let stream = Self {
            file_type,
            channels: decoder.output_channels(),
            sample_rate: decoder.output_sample_rate(),
            bits_per_sample: decoder.output_bits_per_sample(),
            data_type: decoder.data_type(),
            total_samples_per_channel: decoder.total_samples_per_channel(),
            block_align: decoder.block_align(),
            decoder: Some(decoder),
            source,
        };

        debug!(
            file_type = ?stream.file_type,
            decoder = stream.decoder_name().unwrap_or("none"),
            channels = stream.channels,
            sample_rate = stream.sample_rate,
            bits_per_sample = stream.bits_per_sample,
            total_samples = stream.total_samples_per_channel,
            "Opened audio stream"
        );
        Ok(stream)
    }

    /// Fill `buffer` with decoded PCM.
    ///
    /// Keeps decoding until the buffer is full or the stream is exhausted and
    /// returns the number of bytes written. `0` means end of stream.
    pub fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let decoder = self.decoder.as_mut().ok_or(PlaybackError::StreamClosed)?;
        let mut total = 0;
        while total < buffer.len() {
            let read = decoder.read(&mut buffer[total..])?;
            if read == 0 {
                break;
            }
            total += read;
        }
        Ok(total)
    }

    /// Reopen the source and position the stream at the first sample.
    pub fn reset(&mut self) -> Result<()> {
        let (_, decoder) = open_decoder(&self.source, Some(self.file_type))?;
        self.decoder = Some(decoder);
        debug!(source = %self.source, "Audio stream rewound");
        Ok(())
    }

    /// Release the decoder and its input. Idempotent.
    pub fn close(&mut self) {
        if self.decoder.take().is_some() {
            debug!(source = %self.source, "Audio stream closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.decoder.is_none()
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Width of an emitted sample.
    pub fn bits_per_sample(&self) -> u16 {
        self.bits_per_sample
    }

    pub fn data_type(&self) -> PcmDataType {
        self.data_type
    }

    /// Encoded block size for ADPCM streams.
    pub fn block_align(&self) -> Option<usize> {
        self.block_align
    }

    pub fn total_samples_per_channel(&self) -> u64 {
        self.total_samples_per_channel
    }

    pub fn file_type(&self) -> AudioFileType {
        self.file_type
    }

    pub fn source(&self) -> &AudioSource {
        &self.source
    }

    /// Name of the active codec, `None` once closed.
    pub fn decoder_name(&self) -> Option<&'static str> {
        self.decoder.as_ref().map(Decoder::name)
    }

    /// Size of one decoded frame in bytes.
    pub fn frame_size(&self) -> usize {
        self.channels as usize * (self.bits_per_sample as usize / 8)
    }

    /// Play length, `None` when the sample count or rate is unknown.
    pub fn duration(&self) -> Option<Duration> {
        if self.total_samples_per_channel == 0 || self.sample_rate == 0 {
            return None;
        }
        Some(Duration::from_secs_f64(
            self.total_samples_per_channel as f64 / self.sample_rate as f64,
        ))
    }

    /// Play length in seconds, `-1.0` when unknown.
    pub fn duration_secs(&self) -> f64 {
        self.duration().map_or(-1.0, |d| d.as_secs_f64())
    }

    /// Device format for the decoded layout.
    ///
    /// # Errors
    ///
    /// `UnsupportedFormat` naming the layout if the device cannot play it.
    pub fn pcm_format(&self) -> Result<PcmFormat> {
        PcmFormat::determine(self.channels, self.bits_per_sample, self.data_type).ok_or_else(
            || {
                PlaybackError::UnsupportedFormat(format!(
                    "no device format for channels: {}, bits: {}, type: {:?}",
                    self.channels, self.bits_per_sample, self.data_type
                ))
            },
        )
    }
}

fn open_decoder(
    source: &AudioSource,
    forced: Option<AudioFileType>,
) -> Result<(AudioFileType, Decoder)> {
    let mut reader = source.open_reader()?;
    let mut head = [0u8; SNIFF_LEN];
    let read = read_fully(&mut reader, &mut head)?;

    let path = match source {
        AudioSource::File(path) => Some(path.as_path()),
        AudioSource::Memory(_) => None,
    };
    let file_type = match forced.or_else(|| FormatDetector::detect(path, &head[..read])) {
        Some(file_type) => file_type,
        None => {
            return Err(PlaybackError::MalformedContainer(
                "unrecognized audio container, expected RIFF/WAVE, FORM/AIFF or qoaf".to_string(),
            ))
        }
    };
    FormatDetector::validate_support(file_type)?;

    let chained: SourceReader = Box::new(Read::chain(Cursor::new(head[..read].to_vec()), reader));
    let decoder = match file_type {
        AudioFileType::Wav => wav::open(chained)?,
        AudioFileType::Aiff => aiff::open(chained)?,
        AudioFileType::Qoa => Decoder::Qoa(qoa::open(chained)?),
    };
    Ok((file_type, decoder))
}

impl Drop for AudioStream {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_16_mono(samples: &[i16], rate: u32) -> Vec<u8> {
        let data_len = samples.len() as u32 * 2;
        let mut file = Vec::new();
        file.extend_from_slice(b"RIFF");
        file.extend_from_slice(&(36 + data_len).to_le_bytes());
        file.extend_from_slice(b"WAVEfmt ");
        file.extend_from_slice(&16u32.to_le_bytes());
        file.extend_from_slice(&1u16.to_le_bytes());
        file.extend_from_slice(&1u16.to_le_bytes());
        file.extend_from_slice(&rate.to_le_bytes());
        file.extend_from_slice(&(rate * 2).to_le_bytes());
        file.extend_from_slice(&2u16.to_le_bytes());
        file.extend_from_slice(&16u16.to_le_bytes());
        file.extend_from_slice(b"data");
        file.extend_from_slice(&data_len.to_le_bytes());
        for sample in samples {
            file.extend_from_slice(&sample.to_le_bytes());
        }
        file
    }

    #[test]
    fn test_open_from_memory() {
        let stream = AudioStream::from_bytes(wav_16_mono(&[1, 2, 3, 4], 8000)).unwrap();
        assert_eq!(stream.file_type(), AudioFileType::Wav);
        assert_eq!(stream.channels(), 1);
        assert_eq!(stream.sample_rate(), 8000);
        assert_eq!(stream.bits_per_sample(), 16);
        assert_eq!(stream.total_samples_per_channel(), 4);
        assert_eq!(stream.pcm_format().unwrap(), PcmFormat::Mono16);
        assert_eq!(stream.decoder_name(), Some("pcm"));
        assert_eq!(stream.block_align(), None);
    }

    #[test]
    fn test_read_until_end_then_zero() {
        let mut stream = AudioStream::from_bytes(wav_16_mono(&[1, -1, 2], 8000)).unwrap();
        let mut buffer = [0u8; 64];
        assert_eq!(stream.read(&mut buffer).unwrap(), 6);
        assert_eq!(&buffer[..6], &[1, 0, 0xFF, 0xFF, 2, 0]);
        assert_eq!(stream.read(&mut buffer).unwrap(), 0);
    }

    #[test]
    fn test_reset_rewinds() {
        let mut stream = AudioStream::from_bytes(wav_16_mono(&[7, 8], 8000)).unwrap();
        let mut buffer = [0u8; 4];
        assert_eq!(stream.read(&mut buffer).unwrap(), 4);
        stream.reset().unwrap();
        let mut again = [0u8; 4];
        assert_eq!(stream.read(&mut again).unwrap(), 4);
        assert_eq!(buffer, again);
    }

    #[test]
    fn test_closed_stream_rejects_reads() {
        let mut stream = AudioStream::from_bytes(wav_16_mono(&[1], 8000)).unwrap();
        stream.close();
        stream.close();
        assert!(stream.is_closed());
        assert_eq!(stream.channels(), 1);
        let err = stream.read(&mut [0u8; 2]).unwrap_err();
        assert!(matches!(err, PlaybackError::StreamClosed));
    }

    #[test]
    fn test_duration() {
        let stream = AudioStream::from_bytes(wav_16_mono(&[0; 4000], 8000)).unwrap();
        assert_eq!(stream.duration(), Some(Duration::from_millis(500)));
        assert!((stream.duration_secs() - 0.5).abs() < 1e-9);

        let empty = AudioStream::from_bytes(wav_16_mono(&[], 8000)).unwrap();
        assert_eq!(empty.duration(), None);
        assert_eq!(empty.duration_secs(), -1.0);
    }

    #[test]
    fn test_unrecognized_container_is_malformed() {
        let err = AudioStream::from_bytes(&b"OggS\0\0\0\0\0\0\0\0\0\0"[..]).unwrap_err();
        assert!(matches!(err, PlaybackError::MalformedContainer(_)));

        let err = AudioStream::from_bytes(Bytes::new()).unwrap_err();
        assert!(matches!(err, PlaybackError::MalformedContainer(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = AudioStream::open_path("/definitely/not/here.wav").unwrap_err();
        assert!(matches!(err, PlaybackError::Io(_)));
    }

    #[test]
    fn test_file_extension_and_content() {
        let dir = std::env::temp_dir();
        let mislabelled = dir.join(format!("stream-test-{}.aiff", std::process::id()));
        std::fs::write(&mislabelled, wav_16_mono(&[1, 2], 8000)).unwrap();
        let stream = AudioStream::open_path(&mislabelled).unwrap();
        assert_eq!(stream.file_type(), AudioFileType::Wav);

        // too short to sniff: the extension picks the parser
        let truncated = dir.join(format!("stream-test-{}.wav", std::process::id()));
        std::fs::write(&truncated, b"RIFF").unwrap();
        let err = AudioStream::open_path(&truncated).unwrap_err();

        std::fs::remove_file(&mislabelled).unwrap();
        std::fs::remove_file(&truncated).unwrap();
        match err {
            PlaybackError::MalformedContainer(message) => {
                assert!(message.contains("WAV file is truncated"), "{}", message)
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_open_as_forces_container() {
        let err = AudioStream::open_as(
            AudioSource::Memory(Bytes::from(wav_16_mono(&[1], 8000))),
            AudioFileType::Aiff,
        )
        .unwrap_err();
        assert!(matches!(err, PlaybackError::MalformedContainer(_)));
    }
}
