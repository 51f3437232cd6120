mod args;
mod chunks;
mod shutdown;

use std::num::NonZeroUsize;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use tracing::Span;

pub use chunks::{Chunk, Chunks};

use crate::config::FfmpegConfig;
use crate::error::{FfmpegError, Result};
use crate::model::{
    CloseOutcome, OpenOptions, OpenOutcome, ReadSource, TransferMode, FFMPEG_STOP_TIMEOUT,
};

/// The child process and the transfer mode it was opened with.
pub(crate) struct RunningProcess {
    pub(crate) child: Child,
    pub(crate) mode: TransferMode,
    pub(crate) text_carry: Vec<u8>,
}

/// Owns at most one ffmpeg child at a time.
///
/// `open` builds the command line and spawns the process, `chunks` streams
/// the selected output, `close` asks ffmpeg to quit with `q` on stdin and
/// kills it if it does not exit in time. Each open/close cycle starts from a
/// fresh argument vector.
pub struct FfmpegProcess {
    binary_path: String,
    argv: Vec<String>,
    chunk_size: NonZeroUsize,
    read_source: ReadSource,
    stop_timeout: Duration,
    running: Option<RunningProcess>,
    span: Span,
}

impl FfmpegProcess {
    pub fn new(
        binary_path: impl Into<String>,
        chunk_size: NonZeroUsize,
        read_source: ReadSource,
    ) -> Self {
        let binary_path = binary_path.into();
        let span = tracing::info_span!("ffmpeg", binary = %binary_path);
        Self::with_span(binary_path, chunk_size, read_source, span)
    }

    /// Like `new`, but every log event of this instance is recorded under `span`.
    pub fn with_span(
        binary_path: impl Into<String>,
        chunk_size: NonZeroUsize,
        read_source: ReadSource,
        span: Span,
    ) -> Self {
        let binary_path = binary_path.into();
        Self {
            argv: vec![binary_path.clone()],
            binary_path,
            chunk_size,
            read_source,
            stop_timeout: FFMPEG_STOP_TIMEOUT,
            running: None,
            span,
        }
    }

    pub fn from_config(config: &FfmpegConfig) -> Result<Self> {
        config.validate()?;
        let mut process =
            Self::new(config.binary_path.clone(), config.chunk_size()?, config.read_source);
        process.stop_timeout = config.stop_timeout();
        Ok(process)
    }

    pub fn binary_path(&self) -> &str {
        &self.binary_path
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn chunk_size(&self) -> NonZeroUsize {
        self.chunk_size
    }

    pub fn read_source(&self) -> ReadSource {
        self.read_source
    }

    pub fn stop_timeout(&self) -> Duration {
        self.stop_timeout
    }

    /// The running child, if any. Exit status is left for the caller to interpret.
    pub fn process(&self) -> Option<&Child> {
        self.running.as_ref().map(|running| &running.child)
    }

    pub fn process_mut(&mut self) -> Option<&mut Child> {
        self.running.as_mut().map(|running| &mut running.child)
    }

    /// Transfer mode of the running process; `None` when nothing runs.
    pub fn mode(&self) -> Option<TransferMode> {
        self.running.as_ref().map(|running| running.mode)
    }

    pub fn is_running(&mut self) -> bool {
        match self.running.as_mut() {
            Some(running) => matches!(running.child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Starts ffmpeg with `[binary] + command_args + split(extra_args) + [output]`.
    ///
    /// Calling this while a process is running only logs a warning. Spawn
    /// failures are returned and leave the instance idle.
    pub fn open<I, S>(&mut self, command_args: I, options: &OpenOptions) -> Result<OpenOutcome>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.running.is_some() {
            tracing::warn!(parent: &self.span, "FFmpeg is already running");
            return Ok(OpenOutcome::AlreadyRunning);
        }

        self.argv = args::build_argument_vector(
            &self.binary_path,
            command_args,
            options.extra_args.as_deref(),
            &options.output,
        )?;

        tracing::debug!(parent: &self.span, argv = ?self.argv, "Start FFmpeg");

        let spawn_result = Command::new(&self.argv[0])
            .args(&self.argv[1..])
            .stdin(Stdio::piped())
            .stdout(options.stdout.stdio())
            .stderr(options.stderr.stdio())
            .spawn();

        let child = match spawn_result {
            Ok(child) => child,
            Err(error) => {
                tracing::error!(parent: &self.span, "Failed to spawn FFmpeg process: {error}");
                self.reset_argv();
                return Err(FfmpegError::spawn(self.binary_path.clone(), error));
            }
        };

        let pid = child.id();
        tracing::info!(parent: &self.span, pid, mode = ?options.mode, "FFmpeg process started");

        self.running = Some(RunningProcess {
            child,
            mode: options.mode,
            text_carry: Vec::new(),
        });

        Ok(OpenOutcome::Started { pid })
    }

    pub fn close_with_default_timeout(&mut self) -> CloseOutcome {
        self.close(self.stop_timeout)
    }

    /// Asks ffmpeg to quit and waits up to `timeout`, killing it afterwards.
    ///
    /// Never fails: an idle instance logs an error and reports `NotRunning`,
    /// a process that exited on its own is reaped and reported as
    /// `AlreadyExited`. Whenever a process was present, the instance is back
    /// to its idle state when this returns.
    pub fn close(&mut self, timeout: Duration) -> CloseOutcome {
        let Some(mut running) = self.running.take() else {
            tracing::error!(parent: &self.span, "FFmpeg isn't running");
            return CloseOutcome::NotRunning;
        };

        let outcome = match running.child.try_wait() {
            Ok(Some(status)) => {
                tracing::error!(parent: &self.span, %status, "FFmpeg isn't running");
                CloseOutcome::AlreadyExited(status)
            }
            Ok(None) => {
                tracing::debug!(parent: &self.span, pid = running.child.id(), "Close FFmpeg process");
                shutdown::stop_ffmpeg(&mut running.child, running.mode, timeout, &self.span)
            }
            Err(error) => {
                tracing::warn!(parent: &self.span, "Failed to poll FFmpeg process: {error}");
                shutdown::stop_ffmpeg(&mut running.child, running.mode, timeout, &self.span)
            }
        };

        self.reset_argv();
        outcome
    }

    /// Output of the running process in `chunk_size` pieces.
    ///
    /// `chunk_size` counts bytes in both modes. In text mode a chunk may run
    /// up to three bytes over it, because a character split by the previous
    /// read is completed first.
    pub fn chunks(&mut self) -> Chunks<'_> {
        Chunks {
            running: self.running.as_mut(),
            read_source: self.read_source,
            chunk_size: self.chunk_size,
            span: &self.span,
        }
    }

    fn reset_argv(&mut self) {
        self.argv.clear();
        self.argv.push(self.binary_path.clone());
    }
}

impl Drop for FfmpegProcess {
    fn drop(&mut self) {
        let Some(mut running) = self.running.take() else {
            return;
        };

        if matches!(running.child.try_wait(), Ok(None)) {
            tracing::warn!(
                parent: &self.span,
                pid = running.child.id(),
                "FFmpeg still running on drop, killing it"
            );
            if let Err(error) = running.child.kill() {
                tracing::debug!(parent: &self.span, "FFmpeg kill on drop returned: {error}");
            }
        }

        if let Err(error) = running.child.wait() {
            tracing::warn!(parent: &self.span, "Failed to reap FFmpeg process on drop: {error}");
        }
    }
}

impl std::fmt::Debug for FfmpegProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FfmpegProcess")
            .field("binary_path", &self.binary_path)
            .field("argv", &self.argv)
            .field("chunk_size", &self.chunk_size)
            .field("read_source", &self.read_source)
            .field("pid", &self.process().map(Child::id))
            .field("mode", &self.mode())
            .finish()
    }
}
