use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, FfmpegError>;

/// Errors that escape the wrapper.
///
/// Lifecycle misuse (double open, closing an idle wrapper) and shutdown
/// timeouts are reported through `OpenOutcome`/`CloseOutcome` instead.
#[derive(Debug, Error)]
pub enum FfmpegError {
    #[error("Failed to spawn '{binary}': {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Extra arguments have unbalanced quotes: {0}")]
    InvalidExtraArgs(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to read config file '{}': {source}", .path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

impl FfmpegError {
    pub(crate) fn spawn(binary: impl Into<String>, source: std::io::Error) -> Self {
        Self::Spawn {
            binary: binary.into(),
            source,
        }
    }
}
