//! # Streaming Engine
//!
//! Plays long sounds through a small ring of device buffers that a background
//! worker keeps refilled ahead of the play cursor.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────┐  play/pause/seek   ┌────────────────────────┐
//! │ StreamedSource (any  │ ─────────────────▶ │ TaskQueue (FIFO, pooled │
//! │ thread)              │                    │ task records)           │
//! └──────────┬───────────┘                    └───────────┬────────────┘
//!            │ atomics                                    │
//!            ▼                                            ▼
//! ┌──────────────────────┐   RefillAll        ┌────────────────────────┐
//! │ state / position /   │ ◀──── poller ────▶ │ worker: owns every      │
//! │ stats                │                    │ StreamEngine            │
//! └──────────────────────┘                    └───────────┬────────────┘
//!                                                         │
//!                                                         ▼
//!                                                  PlaybackDevice
//! ```
//!
//! ## Buffer ring
//!
//! Each source cycles [`buffer_count`](crate::StreamingConfig::buffer_count)
//! device buffers. On every refill pass the worker unqueues the buffers the
//! device finished, decodes the next chunk into each and queues it again.
//! When the stream is exhausted it either wraps around (looping) or lets the
//! queue drain and stops the source.
//!
//! ## Usage
//!
//! ```ignore
//! use core_playback::{AudioContext, AudioStream, StreamManager, StreamedSource};
//!
//! let manager = StreamManager::start(AudioContext::new(device))?;
//! let music = StreamedSource::open(&manager, AudioStream::open_path("theme.qoa")?)?;
//! music.set_looping(true);
//! music.play()?;
//! // ...
//! music.dispose()?;
//! manager.shutdown();
//! ```

mod engine;
mod manager;
mod source;
mod task;

pub use manager::StreamManager;
pub use source::StreamedSource;
