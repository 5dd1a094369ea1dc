//! # AIFF/AIFC Container
//!
//! ```text
//! "FORM" u32be(size) "AIFF" | "AIFC"
//!   chunk: id[4] u32be(size) body [pad byte if size is odd]
//!   COMM: i16 channels, u32 frames, i16 bits, 80-bit extended rate
//!         (AIFC) compression id[4], pascal string name
//!   SSND: u32 offset, u32 block size, offset bytes, samples
//! ```

use super::bits::{self, SourceReader};
use super::{
    AiffPcmDecoder, AiffSampleFormat, Decoder, LawDecoder, LawEncoding, NarrowingDecoder,
    PcmDataType, PcmDecoder, SampleSpec,
};
use crate::error::{PlaybackError, Result};
use bytes::Buf;
use tracing::{debug, trace, warn};

const AIFF_COMM_LEN: u32 = 18;
const AIFC_MIN_COMM_LEN: u32 = 22;
const MAX_COMM_LEN: u32 = 4096;
const SSND_HEADER_LEN: u32 = 8;

/// Parsed `COMM` chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct AiffComm {
    pub channels: u16,
    pub sample_frames: u32,
    pub bits_per_sample: u16,
    pub sample_rate: f64,
    /// Four character compression id; `NONE` for plain AIFF.
    pub compression: [u8; 4],
}

impl AiffComm {
    pub fn parse(body: &[u8], aifc: bool) -> Result<Self> {
        let len = body.len() as u32;
        let valid = if aifc {
            len >= AIFC_MIN_COMM_LEN
        } else {
            len == AIFF_COMM_LEN
        };
        if !valid {
            return Err(PlaybackError::MalformedContainer(format!(
                "COMM chunk of {} bytes in {} file",
                len,
                if aifc { "AIFC" } else { "AIFF" }
            )));
        }

        let mut buf = body;
        let channels = buf.get_i16();
        let sample_frames = buf.get_u32();
        let bits_per_sample = buf.get_i16();
        let mut rate = [0u8; 10];
        buf.copy_to_slice(&mut rate);
        let compression = if aifc {
            let mut id = [0u8; 4];
            buf.copy_to_slice(&mut id);
            // the pascal string name that follows is informational only
            id
        } else {
            *b"NONE"
        };

        if channels <= 0 {
            return Err(PlaybackError::MalformedContainer(format!(
                "COMM declares {} channels",
                channels
            )));
        }
        if bits_per_sample <= 0 {
            return Err(PlaybackError::MalformedContainer(format!(
                "COMM declares {} bits per sample",
                bits_per_sample
            )));
        }

        Ok(Self {
            channels: channels as u16,
            sample_frames,
            bits_per_sample: bits_per_sample as u16,
            sample_rate: bits::extended_to_f64(rate),
            compression,
        })
    }

    /// Bytes one sample occupies in the `SSND` payload.
    pub fn bytes_per_sample(&self) -> usize {
        match self.bits_per_sample {
            64 => 8,
            b if b > 24 => 4,
            b if b > 16 => 3,
            b if b > 8 => 2,
            _ => 1,
        }
    }

    fn compression_name(&self) -> String {
        String::from_utf8_lossy(&self.compression).into_owned()
    }
}

fn truncated(what: &str) -> impl FnOnce(std::io::Error) -> PlaybackError + '_ {
    move |_| PlaybackError::MalformedContainer(format!("AIFF file is truncated in {}", what))
}

/// Parse the FORM header and chunks up to `SSND`, returning the decoder for
/// the sample payload.
pub fn open(mut reader: SourceReader) -> Result<Decoder> {
    let form = bits::read_tag(&mut reader).map_err(truncated("FORM header"))?;
    if &form != b"FORM" {
        return Err(PlaybackError::MalformedContainer(
            "missing 'FORM' literal".to_string(),
        ));
    }
    bits::read_u32_be(&mut reader).map_err(truncated("FORM header"))?;
    let aifc = match &bits::read_tag(&mut reader).map_err(truncated("FORM header"))? {
        b"AIFF" => false,
        b"AIFC" => true,
        _ => {
            return Err(PlaybackError::MalformedContainer(
                "FORM type is neither AIFF nor AIFC".to_string(),
            ))
        }
    };

    let mut comm: Option<AiffComm> = None;
    loop {
        let id = bits::read_tag(&mut reader).map_err(|_| {
            PlaybackError::MalformedContainer("AIFF file has no SSND chunk".to_string())
        })?;
        let size = bits::read_u32_be(&mut reader).map_err(truncated("chunk header"))?;
        trace!(chunk = %String::from_utf8_lossy(&id), size, "AIFF chunk");

        match &id {
            b"COMM" => {
                if size > MAX_COMM_LEN {
                    return Err(PlaybackError::MalformedContainer(format!(
                        "COMM chunk of {} bytes",
                        size
                    )));
                }
                let mut body = vec![0u8; size as usize];
                if bits::read_fully(&mut reader, &mut body)? < body.len() {
                    return Err(PlaybackError::MalformedContainer(
                        "AIFF file is truncated in COMM chunk".to_string(),
                    ));
                }
                if size % 2 == 1 {
                    bits::skip(&mut reader, 1).map_err(truncated("COMM chunk"))?;
                }
                comm = Some(AiffComm::parse(&body, aifc)?);
            }
            b"SSND" => {
                let comm = comm.ok_or_else(|| {
                    PlaybackError::MalformedContainer("SSND chunk before COMM chunk".to_string())
                })?;
                if size < SSND_HEADER_LEN {
                    return Err(PlaybackError::MalformedContainer(format!(
                        "SSND chunk of {} bytes",
                        size
                    )));
                }
                let offset = bits::read_u32_be(&mut reader).map_err(truncated("SSND chunk"))?;
                let block_size = bits::read_u32_be(&mut reader).map_err(truncated("SSND chunk"))?;
                if block_size > 0 {
                    warn!(block_size, "AIFF sound data is block aligned, alignment is ignored");
                }
                bits::skip(&mut reader, u64::from(offset)).map_err(truncated("SSND chunk"))?;
                let data_len = u64::from(size - SSND_HEADER_LEN).saturating_sub(u64::from(offset));
                return select_decoder(&comm, reader, data_len);
            }
            _ => {
                let padded = u64::from(size) + u64::from(size % 2);
                bits::skip(&mut reader, padded).map_err(truncated("skipped chunk"))?;
            }
        }
    }
}

/// Pick the sample decoder for a `COMM` description.
pub fn select_decoder(comm: &AiffComm, reader: SourceReader, data_len: u64) -> Result<Decoder> {
    if !(comm.sample_rate >= 1.0 && comm.sample_rate <= f64::from(u32::MAX)) {
        return Err(PlaybackError::MalformedContainer(format!(
            "AIFF sample rate {}",
            comm.sample_rate
        )));
    }
    let spec = SampleSpec::new(comm.channels, comm.sample_rate as u32);
    let bytes_per_sample = comm.bytes_per_sample();
    let frames = u64::from(comm.sample_frames);
    let mut compression = comm.compression;
    compression.make_ascii_lowercase();

    let aiff_pcm = |reader: SourceReader, format: AiffSampleFormat| {
        Decoder::AiffPcm(AiffPcmDecoder::new(
            reader,
            data_len,
            spec,
            format,
            comm.bits_per_sample,
            frames,
        ))
    };

    let decoder = match (&compression, bytes_per_sample) {
        (b"none" | b"twos", 1) => aiff_pcm(reader, AiffSampleFormat::Signed8),
        (b"none" | b"twos", 2) => aiff_pcm(reader, AiffSampleFormat::Int16),
        (b"none" | b"twos", 3) => aiff_pcm(reader, AiffSampleFormat::Int24),
        (b"none" | b"twos", 4) => aiff_pcm(reader, AiffSampleFormat::Int32),
        (b"fl32", 4) => aiff_pcm(reader, AiffSampleFormat::Float32),
        (b"fl64", 8) => aiff_pcm(reader, AiffSampleFormat::Float64),
        (b"alaw", 1) => Decoder::Law(LawDecoder::new(reader, data_len, spec, LawEncoding::ALaw)),
        (b"ulaw", 1) => Decoder::Law(LawDecoder::new(reader, data_len, spec, LawEncoding::ULaw)),
        (b"sowt", 2) => Decoder::Pcm(PcmDecoder::new(
            reader,
            data_len,
            spec,
            16,
            PcmDataType::Integer,
        )),
        (b"sowt", 3) => Decoder::Narrowing(NarrowingDecoder::new(reader, data_len, spec, 24)),
        (b"sowt", 4) => Decoder::Narrowing(NarrowingDecoder::new(reader, data_len, spec, 32)),
        _ => {
            return Err(PlaybackError::UnsupportedFormat(format!(
                "AIFF bits per sample: {}, compression: {}",
                comm.bits_per_sample,
                comm.compression_name()
            )))
        }
    };

    debug!(
        decoder = decoder.name(),
        compression = %comm.compression_name(),
        channels = comm.channels,
        sample_rate = spec.sample_rate,
        bits = comm.bits_per_sample,
        data_len,
        "AIFF stream opened"
    );
    Ok(decoder)
}
