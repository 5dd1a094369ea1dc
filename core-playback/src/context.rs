//! # Audio Context
//!
//! Explicit handle bundling the playback device with the streaming settings.
//!
//! ## Overview
//!
//! Every [`StreamManager`](crate::streaming::StreamManager) is started from an
//! [`AudioContext`]. The context is built once by the host and cloned freely;
//! clones share the same device.
//!
//! ## Usage
//!
//! ```ignore
//! use core_playback::{AudioContext, StreamingConfig};
//! use std::sync::Arc;
//!
//! let context = AudioContext::builder()
//!     .device(Arc::new(MyOpenAlDevice::new()))
//!     .config(StreamingConfig::low_latency())
//!     .build()?;
//! ```
//!
//! ## Error Handling
//!
//! The builder fails fast when the device is missing or the configuration
//! does not validate:
//!
//! ```
//! use core_playback::AudioContext;
//!
//! let err = AudioContext::builder().build().unwrap_err();
//! assert!(matches!(err, core_runtime::Error::CapabilityMissing { .. }));
//! ```

use crate::config::StreamingConfig;
use bridge_traits::PlaybackDevice;
use core_runtime::{Error, Result};
use std::sync::Arc;
use tracing::debug;

/// Device and configuration shared by the streaming engine.
#[derive(Clone)]
pub struct AudioContext {
    device: Arc<dyn PlaybackDevice>,
    config: StreamingConfig,
}

impl std::fmt::Debug for AudioContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioContext")
            .field("device", &"PlaybackDevice { ... }")
            .field("config", &self.config)
            .finish()
    }
}

impl AudioContext {
    /// Creates a new builder for constructing an `AudioContext`.
    pub fn builder() -> AudioContextBuilder {
        AudioContextBuilder::default()
    }

    /// Context with the default streaming configuration.
    pub fn new(device: Arc<dyn PlaybackDevice>) -> Self {
        Self {
            device,
            config: StreamingConfig::default(),
        }
    }

    pub fn device(&self) -> &Arc<dyn PlaybackDevice> {
        &self.device
    }

    pub fn config(&self) -> &StreamingConfig {
        &self.config
    }
}

fn device_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "PlaybackDevice".to_string(),
        message: "A PlaybackDevice implementation is required to stream audio. \
                 Inject the host's native buffer-queue device (OpenAL, CoreAudio, ...) \
                 through AudioContext::builder().device(...)."
            .to_string(),
    }
}

/// Builder for [`AudioContext`].
#[derive(Default)]
pub struct AudioContextBuilder {
    device: Option<Arc<dyn PlaybackDevice>>,
    config: Option<StreamingConfig>,
}

impl AudioContextBuilder {
    /// Sets the playback device (required).
    pub fn device(mut self, device: Arc<dyn PlaybackDevice>) -> Self {
        self.device = Some(device);
        self
    }

    /// Sets the streaming configuration. Defaults to [`StreamingConfig::default`].
    pub fn config(mut self, config: StreamingConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Validates the settings and builds the context.
    ///
    /// # Errors
    ///
    /// - `Error::CapabilityMissing` if no device was provided
    /// - `Error::Config` if the streaming configuration is invalid
    pub fn build(self) -> Result<AudioContext> {
        let device = self.device.ok_or_else(device_missing_error)?;
        let config = self.config.unwrap_or_default();
        config
            .validate()
            .map_err(|e| Error::Config(format!("Invalid streaming configuration: {}", e)))?;

        debug!(
            buffer_count = config.buffer_count,
            buffer_size_per_channel = config.buffer_size_per_channel,
            "Audio context built"
        );
        Ok(AudioContext { device, config })
    }
}
