//! # Format Detection Module
//!
//! Identifies the container of an audio stream from its leading bytes, a file
//! extension or a MIME type, and checks that the matching parser is compiled in.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

/// Number of leading bytes needed to tell the containers apart.
pub const SNIFF_LEN: usize = 12;

/// Supported audio container types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AudioFileType {
    Wav,
    Aiff,
    Qoa,
}

impl AudioFileType {
    /// Common file extension.
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFileType::Wav => "wav",
            AudioFileType::Aiff => "aiff",
            AudioFileType::Qoa => "qoa",
        }
    }

    /// MIME type.
    pub fn mime_type(&self) -> &'static str {
        match self {
            AudioFileType::Wav => "audio/wav",
            AudioFileType::Aiff => "audio/aiff",
            AudioFileType::Qoa => "audio/qoa",
        }
    }
}

/// Format detector for audio streams.
pub struct FormatDetector;

impl FormatDetector {
    /// Detect the container from the first [`SNIFF_LEN`] bytes of a stream.
    ///
    /// # Example
    ///
    /// ```rust
    /// use core_playback::{AudioFileType, FormatDetector};
    ///
    /// let header = b"RIFF\x24\x00\x00\x00WAVE";
    /// assert_eq!(FormatDetector::sniff(header), Some(AudioFileType::Wav));
    /// ```
    pub fn sniff(header: &[u8]) -> Option<AudioFileType> {
        if header.len() >= 4 && &header[..4] == b"qoaf" {
            return Some(AudioFileType::Qoa);
        }
        if header.len() < SNIFF_LEN {
            return None;
        }
        match (&header[..4], &header[8..12]) {
            (b"RIFF", b"WAVE") => Some(AudioFileType::Wav),
            (b"FORM", b"AIFF") | (b"FORM", b"AIFC") => Some(AudioFileType::Aiff),
            _ => None,
        }
    }

    /// Pick the container for a stream read from `path`.
    ///
    /// The file extension decides, falling back to the leading bytes when it
    /// is missing or unknown. Leading bytes that identify a different
    /// container override the extension.
    pub fn detect(path: Option<&Path>, header: &[u8]) -> Option<AudioFileType> {
        let hinted = path.and_then(Self::from_path);
        let sniffed = Self::sniff(header);
        match (hinted, sniffed) {
            (Some(hinted), Some(sniffed)) if hinted != sniffed => {
                warn!(
                    ?hinted,
                    ?sniffed,
                    "File extension does not match the content, using the content"
                );
                Some(sniffed)
            }
            (Some(hinted), _) => Some(hinted),
            (None, sniffed) => sniffed,
        }
    }

    /// Guess the container from a file extension.
    pub fn from_path(path: &Path) -> Option<AudioFileType> {
        let extension = path.extension().and_then(|ext| ext.to_str())?;
        debug!("Detecting container from extension: {}", extension);
        match extension.to_ascii_lowercase().as_str() {
            "wav" | "wave" => Some(AudioFileType::Wav),
            "aif" | "aiff" | "aifc" => Some(AudioFileType::Aiff),
            "qoa" => Some(AudioFileType::Qoa),
            _ => None,
        }
    }

    /// Guess the container from a MIME type.
    pub fn from_mime_type(mime_type: &str) -> Option<AudioFileType> {
        match mime_type.to_ascii_lowercase().as_str() {
            "audio/wav" | "audio/wave" | "audio/x-wav" | "audio/vnd.wave" => {
                Some(AudioFileType::Wav)
            }
            "audio/aiff" | "audio/x-aiff" | "audio/x-aifc" => Some(AudioFileType::Aiff),
            "audio/qoa" => Some(AudioFileType::Qoa),
            _ => None,
        }
    }

    /// Validate that the parser for a container is enabled by feature flags.
    ///
    /// # Returns
    ///
    /// - `Ok(())` - Container is supported
    /// - `Err(PlaybackError::UnsupportedFormat)` - Parser not enabled
    pub fn validate_support(file_type: AudioFileType) -> Result<()> {
        match file_type {
            AudioFileType::Wav => {
                #[cfg(not(feature = "decoder-wav"))]
                return Err(crate::error::PlaybackError::UnsupportedFormat(
                    "WAV decoder not enabled. Enable 'decoder-wav' feature".to_string(),
                ));
                #[cfg(feature = "decoder-wav")]
                Ok(())
            }
            AudioFileType::Aiff => {
                #[cfg(not(feature = "decoder-aiff"))]
                return Err(crate::error::PlaybackError::UnsupportedFormat(
                    "AIFF decoder not enabled. Enable 'decoder-aiff' feature".to_string(),
                ));
                #[cfg(feature = "decoder-aiff")]
                Ok(())
            }
            AudioFileType::Qoa => {
                #[cfg(not(feature = "decoder-qoa"))]
                return Err(crate::error::PlaybackError::UnsupportedFormat(
                    "QOA decoder not enabled. Enable 'decoder-qoa' feature".to_string(),
                ));
                #[cfg(feature = "decoder-qoa")]
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_containers() {
        assert_eq!(
            FormatDetector::sniff(b"RIFF\0\0\0\0WAVEfmt "),
            Some(AudioFileType::Wav)
        );
        assert_eq!(FormatDetector::sniff(b"FORM\0\0\0\0AIFC"), Some(AudioFileType::Aiff));
        assert_eq!(FormatDetector::sniff(b"FORM\0\0\0\0AIFF"), Some(AudioFileType::Aiff));
        assert_eq!(FormatDetector::sniff(b"qoaf\0\0\0\x10"), Some(AudioFileType::Qoa));
        assert_eq!(FormatDetector::sniff(b"RIFF\0\0\0\0AVI "), None);
        assert_eq!(FormatDetector::sniff(b"RIFF"), None);
        assert_eq!(FormatDetector::sniff(b""), None);
    }

    #[test]
    fn test_from_path() {
        assert_eq!(
            FormatDetector::from_path(Path::new("/sfx/shot.WAV")),
            Some(AudioFileType::Wav)
        );
        assert_eq!(
            FormatDetector::from_path(Path::new("music/theme.aifc")),
            Some(AudioFileType::Aiff)
        );
        assert_eq!(
            FormatDetector::from_path(Path::new("loop.qoa")),
            Some(AudioFileType::Qoa)
        );
        assert_eq!(FormatDetector::from_path(Path::new("track.mp3")), None);
        assert_eq!(FormatDetector::from_path(Path::new("noext")), None);
    }

    #[test]
    fn test_detect_prefers_extension_then_content() {
        let wav_header = b"RIFF\0\0\0\0WAVEfmt ";

        // extension alone is enough when the header is too short to sniff
        assert_eq!(
            FormatDetector::detect(Some(Path::new("short.wav")), b"RIFF"),
            Some(AudioFileType::Wav)
        );
        // unknown extension falls back to the content
        assert_eq!(
            FormatDetector::detect(Some(Path::new("sound.bin")), wav_header),
            Some(AudioFileType::Wav)
        );
        assert_eq!(
            FormatDetector::detect(None, b"qoaf\0\0\0\x10"),
            Some(AudioFileType::Qoa)
        );
        // mislabelled file
        assert_eq!(
            FormatDetector::detect(Some(Path::new("theme.aiff")), wav_header),
            Some(AudioFileType::Wav)
        );
        assert_eq!(FormatDetector::detect(Some(Path::new("notes.txt")), b"hello"), None);
    }

    #[test]
    fn test_mime_types() {
        assert_eq!(
            FormatDetector::from_mime_type("audio/x-wav"),
            Some(AudioFileType::Wav)
        );
        assert_eq!(AudioFileType::Aiff.mime_type(), "audio/aiff");
        assert_eq!(
            FormatDetector::from_mime_type(AudioFileType::Qoa.mime_type()),
            Some(AudioFileType::Qoa)
        );
        assert_eq!(AudioFileType::Wav.extension(), "wav");
    }

    #[test]
    #[cfg(all(feature = "decoder-wav", feature = "decoder-aiff", feature = "decoder-qoa"))]
    fn test_support_with_default_features() {
        assert!(FormatDetector::validate_support(AudioFileType::Wav).is_ok());
        assert!(FormatDetector::validate_support(AudioFileType::Aiff).is_ok());
        assert!(FormatDetector::validate_support(AudioFileType::Qoa).is_ok());
    }
}
