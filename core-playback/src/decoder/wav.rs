//! # RIFF/WAVE Container
//!
//! Walks the chunk list of a WAV file, parses the `fmt ` chunk and selects the
//! sample decoder for the `data` chunk.
//!
//! ```text
//! "RIFF" u32le(size) "WAVE"
//!   chunk: id[4] u32le(size) body [pad byte if size is odd]
//! ```
//!
//! Unknown chunks are skipped. The `fmt ` chunk must appear before `data`.

use super::bits::{self, SourceReader};
use super::{
    Decoder, ImaAdpcmDecoder, LawDecoder, LawEncoding, MsAdpcmDecoder, NarrowingDecoder,
    PcmDataType, PcmDecoder, SampleSpec,
};
use crate::error::{PlaybackError, Result};
use bytes::Buf;
use tracing::{debug, trace};

pub const FORMAT_PCM: u16 = 0x0001;
pub const FORMAT_MS_ADPCM: u16 = 0x0002;
pub const FORMAT_IEEE_FLOAT: u16 = 0x0003;
pub const FORMAT_ALAW: u16 = 0x0006;
pub const FORMAT_ULAW: u16 = 0x0007;
pub const FORMAT_IMA_ADPCM: u16 = 0x0011;
pub const FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// Bytes 2..16 shared by every `KSDATAFORMAT_SUBTYPE_*` GUID.
const SUBFORMAT_GUID_TAIL: [u8; 14] = [
    0x00, 0x00, 0x00, 0x00, 0x10, 0x00, 0x80, 0x00, 0x00, 0xAA, 0x00, 0x38, 0x9B, 0x71,
];

const MIN_FMT_LEN: u32 = 16;
const EXTENSIBLE_FMT_LEN: u32 = 40;
const EXTENSION_CB_SIZE: u16 = 22;
/// Upper bound for the `fmt ` chunk body; real files use at most a few dozen bytes.
const MAX_FMT_LEN: u32 = 4096;

/// `WAVE_FORMAT_EXTENSIBLE` extension fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavFmtExtension {
    pub valid_bits_per_sample: u16,
    pub channel_mask: u32,
    /// First two bytes of the sub-format GUID, equal to a plain format tag.
    pub sub_format: u16,
}

/// Parsed `fmt ` chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavFmt {
    pub format_tag: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub avg_bytes_per_sec: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
    pub extension: Option<WavFmtExtension>,
}

impl WavFmt {
    pub fn parse(body: &[u8]) -> Result<Self> {
        if body.len() < MIN_FMT_LEN as usize {
            return Err(PlaybackError::MalformedContainer(format!(
                "fmt chunk is {} bytes, expected at least {}",
                body.len(),
                MIN_FMT_LEN
            )));
        }

        let mut buf = body;
        let mut fmt = WavFmt {
            format_tag: buf.get_u16_le(),
            channels: buf.get_u16_le(),
            sample_rate: buf.get_u32_le(),
            avg_bytes_per_sec: buf.get_u32_le(),
            block_align: buf.get_u16_le(),
            bits_per_sample: buf.get_u16_le(),
            extension: None,
        };

        if body.len() >= EXTENSIBLE_FMT_LEN as usize {
            let cb_size = buf.get_u16_le();
            if cb_size == EXTENSION_CB_SIZE {
                let valid_bits_per_sample = buf.get_u16_le();
                let channel_mask = buf.get_u32_le();
                let sub_format = buf.get_u16_le();
                let mut tail = [0u8; 14];
                buf.copy_to_slice(&mut tail);
                if tail == SUBFORMAT_GUID_TAIL {
                    fmt.extension = Some(WavFmtExtension {
                        valid_bits_per_sample,
                        channel_mask,
                        sub_format,
                    });
                }
            }
        }

        Ok(fmt)
    }

    /// Format code after resolving `WAVE_FORMAT_EXTENSIBLE`.
    pub fn format_code(&self) -> Result<u16> {
        if self.format_tag != FORMAT_EXTENSIBLE {
            return Ok(self.format_tag);
        }
        self.extension.map(|ext| ext.sub_format).ok_or_else(|| {
            PlaybackError::MalformedContainer(
                "WAVE_FORMAT_EXTENSIBLE without a valid extension".to_string(),
            )
        })
    }
}

fn truncated(what: &str) -> impl FnOnce(std::io::Error) -> PlaybackError + '_ {
    move |_| PlaybackError::MalformedContainer(format!("WAV file is truncated in {}", what))
}

/// Parse the RIFF header and chunks up to `data`, returning the decoder for
/// the sample payload.
pub fn open(mut reader: SourceReader) -> Result<Decoder> {
    let riff = bits::read_tag(&mut reader).map_err(truncated("RIFF header"))?;
    if &riff != b"RIFF" {
        return Err(PlaybackError::MalformedContainer(
            "missing 'RIFF' literal".to_string(),
        ));
    }
    bits::read_u32_le(&mut reader).map_err(truncated("RIFF header"))?;
    let wave = bits::read_tag(&mut reader).map_err(truncated("RIFF header"))?;
    if &wave != b"WAVE" {
        return Err(PlaybackError::MalformedContainer(
            "missing 'WAVE' literal".to_string(),
        ));
    }

    let mut fmt: Option<WavFmt> = None;
    loop {
        let id = bits::read_tag(&mut reader).map_err(|_| {
            PlaybackError::MalformedContainer("WAV file has no data chunk".to_string())
        })?;
        let size = bits::read_u32_le(&mut reader).map_err(truncated("chunk header"))?;
        trace!(chunk = %String::from_utf8_lossy(&id), size, "WAV chunk");

        match &id {
            b"fmt " => {
                if size > MAX_FMT_LEN {
                    return Err(PlaybackError::MalformedContainer(format!(
                        "fmt chunk of {} bytes",
                        size
                    )));
                }
                let mut body = vec![0u8; size as usize];
                if bits::read_fully(&mut reader, &mut body)? < body.len() {
                    return Err(PlaybackError::MalformedContainer(
                        "WAV file is truncated in fmt chunk".to_string(),
                    ));
                }
                if size % 2 == 1 {
                    bits::skip(&mut reader, 1).map_err(truncated("fmt chunk"))?;
                }
                fmt = Some(WavFmt::parse(&body)?);
            }
            b"data" => {
                let fmt = fmt.ok_or_else(|| {
                    PlaybackError::MalformedContainer("data chunk before fmt chunk".to_string())
                })?;
                return select_decoder(&fmt, reader, u64::from(size));
            }
            _ => {
                let padded = u64::from(size) + u64::from(size % 2);
                bits::skip(&mut reader, padded).map_err(truncated("skipped chunk"))?;
            }
        }
    }
}

/// Pick the sample decoder for a `fmt ` description.
pub fn select_decoder(fmt: &WavFmt, reader: SourceReader, data_len: u64) -> Result<Decoder> {
    let code = fmt.format_code()?;
    if fmt.channels == 0 {
        return Err(PlaybackError::MalformedContainer(
            "WAV fmt declares zero channels".to_string(),
        ));
    }
    if fmt.sample_rate == 0 {
        return Err(PlaybackError::MalformedContainer(
            "WAV fmt declares a zero sample rate".to_string(),
        ));
    }

    let spec = SampleSpec::new(fmt.channels, fmt.sample_rate);
    let channels = usize::from(fmt.channels);
    let block_align = usize::from(fmt.block_align);
    let unsupported = || {
        PlaybackError::UnsupportedFormat(format!(
            "bits: {}, format: 0x{:04X}, channels: {}",
            fmt.bits_per_sample, code, fmt.channels
        ))
    };

    let decoder = match (fmt.bits_per_sample, code) {
        (4, FORMAT_IMA_ADPCM) | (4, FORMAT_MS_ADPCM) => {
            if channels > 2 {
                return Err(unsupported());
            }
            if code == FORMAT_IMA_ADPCM {
                if block_align <= 4 * channels {
                    return Err(PlaybackError::MalformedContainer(format!(
                        "IMA-ADPCM block align {} too small",
                        block_align
                    )));
                }
                Decoder::ImaAdpcm(ImaAdpcmDecoder::new(reader, data_len, spec, block_align))
            } else {
                if block_align < 7 * channels {
                    return Err(PlaybackError::MalformedContainer(format!(
                        "MS-ADPCM block align {} too small",
                        block_align
                    )));
                }
                Decoder::MsAdpcm(MsAdpcmDecoder::new(reader, data_len, spec, block_align))
            }
        }
        (8, FORMAT_ULAW) => {
            Decoder::Law(LawDecoder::new(reader, data_len, spec, LawEncoding::ULaw))
        }
        (8, FORMAT_ALAW) => {
            Decoder::Law(LawDecoder::new(reader, data_len, spec, LawEncoding::ALaw))
        }
        (8, FORMAT_PCM) | (16, FORMAT_PCM) => Decoder::Pcm(PcmDecoder::new(
            reader,
            data_len,
            spec,
            fmt.bits_per_sample,
            PcmDataType::Integer,
        )),
        (24, FORMAT_PCM) | (32, FORMAT_PCM) => Decoder::Narrowing(NarrowingDecoder::new(
            reader,
            data_len,
            spec,
            fmt.bits_per_sample,
        )),
        (32, FORMAT_IEEE_FLOAT) | (64, FORMAT_IEEE_FLOAT) => Decoder::Pcm(PcmDecoder::new(
            reader,
            data_len,
            spec,
            fmt.bits_per_sample,
            PcmDataType::Float,
        )),
        _ => return Err(unsupported()),
    };

    debug!(
        decoder = decoder.name(),
        channels = fmt.channels,
        sample_rate = fmt.sample_rate,
        bits = fmt.bits_per_sample,
        data_len,
        "WAV stream opened"
    );
    Ok(decoder)
}
