use std::process::{ExitStatus, Stdio};
use std::time::Duration;

pub const DEFAULT_BINARY_PATH: &str = "ffmpeg";
pub const DEFAULT_CHUNK_SIZE: usize = 1024;
pub const DEFAULT_OUTPUT: &str = "-";
pub const FFMPEG_STOP_TIMEOUT: Duration = Duration::from_secs(5);
pub(crate) const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Output stream that `Chunks` reads from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadSource {
    #[default]
    Stdout,
    Stderr,
}

/// How the child's streams are exchanged, fixed when the process is opened.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransferMode {
    #[default]
    Binary,
    Text,
}

impl TransferMode {
    /// ffmpeg's interactive quit key. The text-mode character encodes to the
    /// same single byte.
    pub fn quit_token(self) -> &'static [u8] {
        match self {
            TransferMode::Binary => b"q",
            TransferMode::Text => "q".as_bytes(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Redirect {
    Piped,
    Discard,
}

impl Redirect {
    pub(crate) fn stdio(self) -> Stdio {
        match self {
            Redirect::Piped => Stdio::piped(),
            Redirect::Discard => Stdio::null(),
        }
    }
}

/// Per-cycle options for `FfmpegProcess::open`.
#[derive(Clone, Debug)]
pub struct OpenOptions {
    pub output: String,
    pub extra_args: Option<String>,
    pub mode: TransferMode,
    pub stdout: Redirect,
    pub stderr: Redirect,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            output: DEFAULT_OUTPUT.to_string(),
            extra_args: None,
            mode: TransferMode::Binary,
            stdout: Redirect::Piped,
            stderr: Redirect::Discard,
        }
    }
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn output(mut self, output: impl Into<String>) -> Self {
        self.output = output.into();
        self
    }

    /// Raw user-supplied arguments, split with POSIX shell quoting rules and
    /// placed between the command arguments and the output.
    pub fn extra_args(mut self, extra_args: impl Into<String>) -> Self {
        self.extra_args = Some(extra_args.into());
        self
    }

    pub fn mode(mut self, mode: TransferMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn text(self) -> Self {
        self.mode(TransferMode::Text)
    }

    pub fn stdout(mut self, redirect: Redirect) -> Self {
        self.stdout = redirect;
        self
    }

    pub fn stderr(mut self, redirect: Redirect) -> Self {
        self.stderr = redirect;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenOutcome {
    Started { pid: u32 },
    /// A process was already running; nothing was spawned or changed.
    AlreadyRunning,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseOutcome {
    /// The process quit on its own after receiving the quit token.
    Graceful(ExitStatus),
    /// The timeout expired and the process was killed and reaped. The status
    /// is missing only if the final wait itself failed.
    Forced(Option<ExitStatus>),
    /// The process had already exited before `close` was called.
    AlreadyExited(ExitStatus),
    NotRunning,
}

impl CloseOutcome {
    pub fn exit_status(&self) -> Option<ExitStatus> {
        match self {
            CloseOutcome::Graceful(status) | CloseOutcome::AlreadyExited(status) => Some(*status),
            CloseOutcome::Forced(status) => *status,
            CloseOutcome::NotRunning => None,
        }
    }

    pub fn was_forced(&self) -> bool {
        matches!(self, CloseOutcome::Forced(_))
    }
}
