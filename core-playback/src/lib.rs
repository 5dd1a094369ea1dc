//! # Playback & Streaming Module
//!
//! Decodes container-wrapped audio into raw PCM and streams it to a native
//! playback device.
//!
//! ## Overview
//!
//! This module handles:
//! - Container parsing (RIFF/WAV, AIFF/AIFC, QOA) and per-codec sample decoding
//! - A uniform pull interface over every format ([`AudioStream`])
//! - Loading short sounds fully into memory ([`SoundLoader`])
//! - Streaming long sounds through a ring of device buffers refilled by a
//!   single background worker ([`StreamManager`], [`StreamedSource`])
//!
//! ## Feature Flags
//!
//! - `decoder-wav`, `decoder-aiff`, `decoder-qoa` - Enable a container parser
//! - `decoder-all` (default) - All of the above

pub mod config;
pub mod context;
pub mod decoder;
pub mod error;
pub mod loader;
pub mod stream;
pub mod streaming;

pub use config::{StreamState, StreamingConfig, StreamingStats};
pub use context::{AudioContext, AudioContextBuilder};
pub use decoder::{AudioFileType, Decoder, FormatDetector, SampleConverter, SampleSpec};
pub use error::{PlaybackError, Result};
pub use loader::{PcmBuffer, SoundLoader};
pub use stream::{AudioSource, AudioStream};
pub use streaming::{StreamManager, StreamedSource};
