//! Workspace facade crate.
//!
//! Re-exports the workspace crates behind feature flags so host applications
//! can depend on `audio-core-workspace` alone and pick the container parsers
//! they need (`decoder-wav`, `decoder-aiff`, `decoder-qoa`, or `playback` for
//! all of them).

pub use bridge_traits;
pub use core_runtime;

#[cfg(any(
    feature = "playback",
    feature = "decoder-wav",
    feature = "decoder-aiff",
    feature = "decoder-qoa"
))]
pub use core_playback;
