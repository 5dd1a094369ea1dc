//! # Playback Error Types
//!
//! Error types for audio decoding and streaming operations.

use bridge_traits::BridgeError;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during decoding and playback operations.
#[derive(Error, Debug)]
pub enum PlaybackError {
    // ========================================================================
    // Format/Codec Errors
    // ========================================================================
    /// Container structure is broken: missing magic literals, truncated or
    /// out-of-order chunks.
    #[error("Malformed container: {0}")]
    MalformedContainer(String),

    /// Container was recognized but its codec, bit depth or channel layout
    /// cannot be decoded or played.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    // ========================================================================
    // Decoding Errors
    // ========================================================================
    /// Encoded payload contains values the codec cannot interpret.
    #[error("Corrupted audio stream: {0}")]
    CorruptedStream(String),

    /// The stream was closed and cannot be read anymore.
    #[error("Audio stream is closed")]
    StreamClosed,

    // ========================================================================
    // Streaming Errors
    // ========================================================================
    /// Streaming configuration failed validation.
    #[error("Invalid streaming configuration: {0}")]
    InvalidConfig(String),

    /// Loop section bounds are negative or out of order.
    #[error("Invalid loop points: {0}")]
    InvalidLoopPoints(String),

    /// The worker did not acknowledge disposal in time.
    #[error("Timed out after {0:?} waiting for the stream worker to release the source")]
    DisposeTimeout(Duration),

    /// The stream manager has been shut down, no more tasks are accepted.
    #[error("Stream manager is shut down")]
    EngineShutDown,

    // ========================================================================
    // Platform/Adapter Errors
    // ========================================================================
    /// Playback device reported a failure.
    #[error("Audio device error: {0}")]
    Device(#[from] BridgeError),

    /// Runtime configuration or capability error.
    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::Error),

    // ========================================================================
    // Generic Errors
    // ========================================================================
    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PlaybackError {
    /// Returns `true` if this error is transient and the operation can be retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, PlaybackError::DisposeTimeout(_) | PlaybackError::Device(_))
    }

    /// Returns `true` if this error is related to container or codec issues.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            PlaybackError::MalformedContainer(_) | PlaybackError::UnsupportedFormat(_)
        )
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;
