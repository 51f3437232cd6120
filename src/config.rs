use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{FfmpegError, Result};
use crate::model::{ReadSource, DEFAULT_BINARY_PATH, DEFAULT_CHUNK_SIZE, FFMPEG_STOP_TIMEOUT};

pub const FFMPEG_BINARY_ENV: &str = "FFMPEG_BINARY";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FfmpegConfig {
    pub binary_path: String,
    pub chunk_size: usize,
    pub read_source: ReadSource,
    pub stop_timeout_secs: u64,
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            binary_path: DEFAULT_BINARY_PATH.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            read_source: ReadSource::Stdout,
            stop_timeout_secs: FFMPEG_STOP_TIMEOUT.as_secs(),
        }
    }
}

impl FfmpegConfig {
    pub fn from_json_str(contents: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| FfmpegError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;

        let config = Self::from_json_str(&contents)?;
        tracing::debug!(config_path = %path.display(), "Loaded ffmpeg config");
        Ok(config)
    }

    /// Applies `FFMPEG_BINARY` on top of the loaded values. Empty values are ignored.
    pub fn with_env_overrides(self) -> Self {
        self.with_binary_override(std::env::var(FFMPEG_BINARY_ENV).ok())
    }

    fn with_binary_override(mut self, binary_path: Option<String>) -> Self {
        if let Some(binary_path) = binary_path.filter(|value| !value.trim().is_empty()) {
            self.binary_path = binary_path;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.chunk_size()?;

        if self.binary_path.trim().is_empty() {
            return Err(FfmpegError::InvalidConfig(
                "binaryPath must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    pub fn chunk_size(&self) -> Result<NonZeroUsize> {
        NonZeroUsize::new(self.chunk_size)
            .ok_or_else(|| FfmpegError::InvalidConfig("chunkSize must be positive".to_string()))
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }
}
