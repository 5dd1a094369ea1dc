use thiserror::Error;

/// Errors raised while wiring up the runtime: configuration, host capabilities
/// and the logging subscriber.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    /// A global tracing subscriber could not be installed, usually because one
    /// is already set.
    #[error("Logging error: {0}")]
    Logging(String),
}

pub type Result<T> = std::result::Result<T, Error>;
