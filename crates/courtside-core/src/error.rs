use thiserror::Error;

use crate::discover::DiscoveryReport;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Process not found: {0}")]
    ProcessNotFound(String),

    #[error("Failed to open process: {0}")]
    ProcessOpenFailed(String),

    #[error("Module not found in target process: {0}")]
    ModuleNotFound(String),

    #[error("Failed to read process memory at address {address:#x}: {message}")]
    MemoryReadFailed { address: u64, message: String },

    #[error("Failed to write process memory at address {address:#x}: {message}")]
    MemoryWriteFailed { address: u64, message: String },

    #[error("Invalid schema: {0}")]
    SchemaInvalid(String),

    #[error("Text value does not fit declared capacity of {max_chars} characters")]
    TextTooLong { max_chars: usize },

    #[error("Value out of range for field: {0}")]
    ValueOutOfRange(String),

    #[error("Base discovery inconclusive for {table}: best candidate has {votes} votes (threshold {threshold})")]
    DiscoveryInconclusive {
        table: String,
        votes: u32,
        threshold: u32,
        report: Box<DiscoveryReport>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for failures that invalidate the whole session (attach/schema),
    /// as opposed to per-field conditions callers treat as "value unavailable".
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::ProcessNotFound(_)
                | Error::ProcessOpenFailed(_)
                | Error::ModuleNotFound(_)
                | Error::SchemaInvalid(_)
        )
    }
}
