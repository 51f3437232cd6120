//! Process lifecycle wrapper around the `ffmpeg` executable.
//!
//! ```no_run
//! use std::num::NonZeroUsize;
//! use haffmpeg::{FfmpegProcess, OpenOptions, ReadSource};
//!
//! let mut ffmpeg = FfmpegProcess::new("ffmpeg", NonZeroUsize::new(4096).unwrap(), ReadSource::Stdout);
//! ffmpeg.open(["-f", "lavfi", "-i", "testsrc", "-t", "1", "-f", "mpegts"], &OpenOptions::new())?;
//! for chunk in ffmpeg.chunks() {
//!     println!("{} bytes", chunk.len());
//! }
//! ffmpeg.close_with_default_timeout();
//! # Ok::<(), haffmpeg::FfmpegError>(())
//! ```

mod config;
mod error;
mod model;
mod process;

pub use config::{FfmpegConfig, FFMPEG_BINARY_ENV};
pub use error::{FfmpegError, Result};
pub use model::{
    CloseOutcome, OpenOptions, OpenOutcome, ReadSource, Redirect, TransferMode,
    DEFAULT_BINARY_PATH, DEFAULT_CHUNK_SIZE, DEFAULT_OUTPUT, FFMPEG_STOP_TIMEOUT,
};
pub use process::{Chunk, Chunks, FfmpegProcess};

/// Installs the fmt subscriber filtered by `RUST_LOG`. Safe to call twice.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}
