use thiserror::Error;

/// Failure reported by a host device implementation.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    /// The device ran out of sources or buffers.
    #[error("Device resources exhausted: {0}")]
    ResourceExhausted(String),

    /// A source or buffer id that the device never handed out, or already
    /// deleted.
    #[error("Unknown device handle: {0}")]
    UnknownHandle(u32),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
