use std::io::{Read, Write};
use std::process::{Child, ExitStatus};
use std::thread;
use std::time::{Duration, Instant};

use tracing::Span;

use crate::model::{CloseOutcome, TransferMode, EXIT_POLL_INTERVAL};

pub(super) fn stop_ffmpeg(
    child: &mut Child,
    mode: TransferMode,
    timeout: Duration,
    span: &Span,
) -> CloseOutcome {
    request_ffmpeg_graceful_stop(child, mode, span);
    let deadline = deadline_after(timeout);
    let drain_threads = spawn_output_drains(child, span);

    match wait_for_exit(child, deadline, span) {
        Some(status) => {
            tracing::debug!(parent: span, %status, "ffmpeg process closed");
            finish_output_drains(drain_threads, deadline, span);
            CloseOutcome::Graceful(status)
        }
        None => {
            tracing::warn!(
                parent: span,
                ?timeout,
                "Timeout while waiting for ffmpeg to quit, killing it"
            );
            let status = force_stop(child, span);
            finish_output_drains(drain_threads, Instant::now(), span);
            CloseOutcome::Forced(status)
        }
    }
}

fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .unwrap_or_else(|| now + Duration::from_secs(u64::from(u32::MAX)))
}

/// Joins drain threads that finish before `deadline` and detaches the rest.
/// A drain outlives the child when a process it forked still holds the pipe.
fn finish_output_drains(
    drain_threads: Vec<thread::JoinHandle<()>>,
    deadline: Instant,
    span: &Span,
) {
    while drain_threads.iter().any(|handle| !handle.is_finished()) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep(EXIT_POLL_INTERVAL.min(deadline - now));
    }

    for drain_thread in drain_threads {
        if !drain_thread.is_finished() {
            tracing::debug!(parent: span, "ffmpeg output pipe still held open, detaching drain");
            continue;
        }
        if let Err(error) = drain_thread.join() {
            tracing::warn!(parent: span, "Failed to join ffmpeg output drain thread: {error:?}");
        }
    }
}

/// Writes the quit token and closes stdin so ffmpeg sees the request.
fn request_ffmpeg_graceful_stop(child: &mut Child, mode: TransferMode, span: &Span) {
    let Some(mut stdin) = child.stdin.take() else {
        tracing::debug!(parent: span, "ffmpeg stdin already closed, skipping quit token");
        return;
    };

    let write_result = stdin
        .write_all(mode.quit_token())
        .and_then(|()| stdin.flush());
    if let Err(error) = write_result {
        // ffmpeg may have quit and closed its end already.
        tracing::debug!(parent: span, "Failed to send quit token to ffmpeg: {error}");
    }
}

/// Keeps piped output flowing so ffmpeg never blocks on a full pipe while
/// it shuts down. The threads end once the child closes its side.
fn spawn_output_drains(child: &mut Child, span: &Span) -> Vec<thread::JoinHandle<()>> {
    let mut drain_threads = Vec::with_capacity(2);

    if let Some(stdout) = child.stdout.take() {
        drain_threads.push(spawn_drain(stdout, "stdout", span.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        drain_threads.push(spawn_drain(stderr, "stderr", span.clone()));
    }

    drain_threads
}

fn spawn_drain<R>(mut stream: R, stream_name: &'static str, span: Span) -> thread::JoinHandle<()>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || match std::io::copy(&mut stream, &mut std::io::sink()) {
        Ok(drained) => {
            tracing::trace!(parent: &span, stream_name, drained, "Drained ffmpeg output");
        }
        Err(error) => {
            tracing::debug!(parent: &span, stream_name, "Failed to drain ffmpeg output: {error}");
        }
    })
}

fn wait_for_exit(child: &mut Child, deadline: Instant, span: &Span) -> Option<ExitStatus> {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Some(status),
            Ok(None) => {}
            Err(error) => {
                tracing::warn!(parent: span, "Failed while waiting for ffmpeg process: {error}");
                return None;
            }
        }

        let now = Instant::now();
        if now >= deadline {
            return None;
        }
        thread::sleep(EXIT_POLL_INTERVAL.min(deadline - now));
    }
}

/// Kills the child and blocks until it is reaped.
fn force_stop(child: &mut Child, span: &Span) -> Option<ExitStatus> {
    if let Err(error) = child.kill() {
        tracing::warn!(parent: span, "Failed to force-stop ffmpeg process: {error}");
    }

    match child.wait() {
        Ok(status) => Some(status),
        Err(error) => {
            tracing::warn!(parent: span, "Failed to collect ffmpeg exit status after kill: {error}");
            None
        }
    }
}
