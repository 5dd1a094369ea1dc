//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the audio core and the native audio
//! device. The core decodes and schedules PCM; the host owns the hardware and
//! exposes it through [`PlaybackDevice`](playback::PlaybackDevice).
//!
//! ## Traits
//!
//! - [`PlaybackDevice`](playback::PlaybackDevice) - Buffer-queue playback source
//!   (create/queue/unqueue buffers, play/pause/stop, offset queries)
//!
//! ## Types
//!
//! - [`PcmFormat`](playback::PcmFormat) - Device-native PCM layouts and the
//!   mapping from `(channels, bits, data type)`
//! - [`SourceState`](playback::SourceState) - Native source state
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type. Platform
//! implementations should convert native error codes into it with an
//! actionable message.
//!
//! ## Thread Safety
//!
//! Bridge traits require `Send + Sync` on native targets so the device can be
//! shared between the streaming worker and caller threads.
//!
//! ## Examples
//!
//! ```ignore
//! use bridge_traits::playback::{BufferId, PcmFormat, PlaybackDevice, SourceId, SourceState};
//! use bridge_traits::error::Result;
//!
//! pub struct OpenAlDevice { /* context handles */ }
//!
//! impl PlaybackDevice for OpenAlDevice {
//!     fn create_source(&self) -> Result<SourceId> {
//!         // alGenSources
//!         todo!()
//!     }
//!     // ...
//! }
//! ```

pub mod error;
pub mod platform;
pub mod playback;

pub use error::BridgeError;

pub use playback::{BufferId, PcmDataType, PcmFormat, PlaybackDevice, SourceId, SourceState};
