//! Lifecycle tests against real child processes.
//!
//! `sh -c SCRIPT` stands in for ffmpeg: the output target lands in `$0` and
//! extra arguments in `$@`. Scripts that must outlive the reader close their
//! output and then block in `cat` until the quit token arrives on stdin.
#![cfg(unix)]

use std::io::Write;
use std::num::NonZeroUsize;
use std::os::unix::process::ExitStatusExt;
use std::time::{Duration, Instant};

use haffmpeg::{
    Chunk, CloseOutcome, FfmpegConfig, FfmpegError, FfmpegProcess, OpenOptions, OpenOutcome,
    ReadSource, Redirect, TransferMode,
};

const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

fn sh_process(chunk_size: usize, read_source: ReadSource) -> FfmpegProcess {
    FfmpegProcess::new("sh", NonZeroUsize::new(chunk_size).unwrap(), read_source)
}

fn assert_idle(process: &FfmpegProcess) {
    assert_eq!(process.argv(), [process.binary_path()]);
    assert!(process.process().is_none());
    assert_eq!(process.mode(), None);
}

#[test]
fn spawned_arguments_match_argument_vector() {
    let script = r#"printf '%s|' "$0" "$@"; exec >&-; cat >/dev/null"#;
    let mut process = sh_process(1024, ReadSource::Stdout);
    let options = OpenOptions::new().extra_args("--flag 'two words'");

    let outcome = process.open(["-c", script], &options).unwrap();
    assert!(matches!(outcome, OpenOutcome::Started { .. }));
    assert_eq!(process.argv(), ["sh", "-c", script, "--flag", "two words", "-"]);

    let output: Vec<u8> = process.chunks().flat_map(Chunk::into_bytes).collect();
    assert_eq!(output, b"--flag|two words|-|");

    let outcome = process.close(CLOSE_TIMEOUT);
    assert!(matches!(outcome, CloseOutcome::Graceful(status) if status.success()));
    assert_idle(&process);
}

#[test]
fn chunks_are_bounded_by_chunk_size() {
    let mut process = sh_process(4, ReadSource::Stdout);
    process
        .open(
            ["-c", "printf abcdefghij; exec >&-; cat >/dev/null"],
            &OpenOptions::new(),
        )
        .unwrap();

    let chunks: Vec<Chunk> = process.chunks().collect();
    assert_eq!(
        chunks,
        [
            Chunk::Binary(b"abcd".to_vec()),
            Chunk::Binary(b"efgh".to_vec()),
            Chunk::Binary(b"ij".to_vec()),
        ]
    );
    assert!(chunks.iter().all(|chunk| !chunk.is_empty() && chunk.len() <= 4));

    assert!(matches!(process.close(CLOSE_TIMEOUT), CloseOutcome::Graceful(_)));
    assert_idle(&process);
}

#[test]
fn second_open_is_ignored() {
    let mut process = sh_process(1024, ReadSource::Stdout);
    let Ok(OpenOutcome::Started { pid }) =
        process.open(["-c", "cat >/dev/null"], &OpenOptions::new())
    else {
        panic!("first open should start a process");
    };
    let argv_after_first_open = process.argv().to_vec();

    let outcome = process
        .open(["-c", "exit 0"], &OpenOptions::new().text())
        .unwrap();

    assert_eq!(outcome, OpenOutcome::AlreadyRunning);
    assert_eq!(process.process().map(|child| child.id()), Some(pid));
    assert_eq!(process.argv(), argv_after_first_open.as_slice());
    assert_eq!(process.mode(), Some(TransferMode::Binary));

    assert!(matches!(process.close(CLOSE_TIMEOUT), CloseOutcome::Graceful(_)));
    assert_idle(&process);
}

#[test]
fn close_kills_process_that_ignores_quit_token() {
    let mut process = sh_process(1024, ReadSource::Stdout);
    let options = OpenOptions::new().stdout(Redirect::Discard);
    process.open(["-c", "exec sleep 30"], &options).unwrap();

    let started_at = Instant::now();
    let outcome = process.close(Duration::from_millis(200));

    assert!(started_at.elapsed() < Duration::from_secs(10));
    let CloseOutcome::Forced(Some(status)) = outcome else {
        panic!("expected a forced close, got {outcome:?}");
    };
    assert!(!status.success());
    assert_eq!(status.signal(), Some(9));
    assert!(outcome.was_forced());
    assert_idle(&process);
}

#[test]
fn forced_close_returns_while_forked_child_holds_stdout() {
    // sh forks `sleep`, which inherits stdout and outlives the kill.
    let mut process = sh_process(1024, ReadSource::Stdout);
    process.open(["-c", "sleep 3; :"], &OpenOptions::new()).unwrap();

    let started_at = Instant::now();
    let outcome = process.close(Duration::from_millis(200));

    assert!(started_at.elapsed() < Duration::from_secs(2));
    assert!(outcome.was_forced());
    assert_idle(&process);
}

#[test]
fn graceful_close_returns_while_background_job_holds_stdout() {
    let mut process = sh_process(1024, ReadSource::Stdout);
    process
        .open(["-c", "sleep 3 & cat >/dev/null"], &OpenOptions::new())
        .unwrap();

    let started_at = Instant::now();
    let outcome = process.close(Duration::from_millis(500));

    assert!(started_at.elapsed() < Duration::from_secs(2));
    assert!(matches!(outcome, CloseOutcome::Graceful(status) if status.success()));
    assert_idle(&process);
}

#[test]
fn exited_process_ends_chunks_and_is_reaped_on_close() {
    let mut process = sh_process(1024, ReadSource::Stdout);
    process.open(["-c", "exit 3"], &OpenOptions::new()).unwrap();

    let status = process.process_mut().unwrap().wait().unwrap();
    assert_eq!(status.code(), Some(3));
    assert!(!process.is_running());
    assert_eq!(process.chunks().next(), None);

    let outcome = process.close(CLOSE_TIMEOUT);
    assert_eq!(outcome, CloseOutcome::AlreadyExited(status));
    assert_idle(&process);

    // Idle again, so a second close is a plain no-op.
    assert_eq!(process.close(CLOSE_TIMEOUT), CloseOutcome::NotRunning);
}

#[test]
fn discarded_stream_yields_nothing() {
    let mut process = sh_process(1024, ReadSource::Stdout);
    let options = OpenOptions::new().stdout(Redirect::Discard);
    process.open(["-c", "cat >/dev/null"], &options).unwrap();

    assert_eq!(process.chunks().next(), None);
    assert!(process.is_running());

    assert!(matches!(process.close(CLOSE_TIMEOUT), CloseOutcome::Graceful(_)));
}

#[test]
fn stderr_source_in_text_mode() {
    let mut process = sh_process(64, ReadSource::Stderr);
    let options = OpenOptions::new()
        .text()
        .stdout(Redirect::Discard)
        .stderr(Redirect::Piped);
    process
        .open(
            ["-c", r#"printf 'frame=1 speed=1.0x\n' >&2; exec 2>&-; cat >/dev/null"#],
            &options,
        )
        .unwrap();
    assert_eq!(process.mode(), Some(TransferMode::Text));

    let chunks: Vec<Chunk> = process.chunks().collect();
    assert_eq!(chunks, [Chunk::Text("frame=1 speed=1.0x\n".to_string())]);

    assert!(matches!(process.close(CLOSE_TIMEOUT), CloseOutcome::Graceful(_)));
    assert_idle(&process);
}

#[test]
fn split_character_at_end_of_stream_is_replaced() {
    // 0xC3 starts a two-byte character that never completes.
    let mut process = sh_process(4, ReadSource::Stdout);
    process
        .open(
            ["-c", r"printf 'abc\303'; exec >&-; cat >/dev/null"],
            &OpenOptions::new().text(),
        )
        .unwrap();

    let chunks: Vec<Chunk> = process.chunks().collect();
    assert_eq!(
        chunks,
        [
            Chunk::Text("abc".to_string()),
            Chunk::Text("\u{FFFD}".to_string()),
        ]
    );

    assert!(matches!(process.close(CLOSE_TIMEOUT), CloseOutcome::Graceful(_)));
}

#[test]
fn close_drains_unread_output() {
    // More output than a pipe buffer holds; the child only finishes once
    // it is drained.
    let script = "head -c 1000000 /dev/zero; cat >/dev/null";
    let mut process = sh_process(1024, ReadSource::Stdout);
    process.open(["-c", script], &OpenOptions::new()).unwrap();

    let outcome = process.close(CLOSE_TIMEOUT);
    assert!(matches!(outcome, CloseOutcome::Graceful(status) if status.success()));
}

#[test]
fn missing_binary_is_a_spawn_error() {
    let mut process = FfmpegProcess::new(
        "/nonexistent/bin/ffmpeg",
        NonZeroUsize::new(1024).unwrap(),
        ReadSource::Stdout,
    );

    let error = process
        .open(["-f", "lavfi", "-i", "testsrc"], &OpenOptions::new())
        .unwrap_err();

    let FfmpegError::Spawn { binary, source } = error else {
        panic!("expected a spawn error");
    };
    assert_eq!(binary, "/nonexistent/bin/ffmpeg");
    assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
    assert_idle(&process);
}

#[test]
fn instance_supports_repeated_cycles() {
    let mut process = sh_process(1024, ReadSource::Stdout);

    for round in ["first", "second"] {
        let script = format!("printf {round}; exec >&-; cat >/dev/null");
        process.open(["-c", script.as_str()], &OpenOptions::new()).unwrap();
        assert_eq!(process.argv(), ["sh", "-c", script.as_str(), "-"]);

        let output: Vec<u8> = process.chunks().flat_map(Chunk::into_bytes).collect();
        assert_eq!(output, round.as_bytes());

        assert!(matches!(process.close(CLOSE_TIMEOUT), CloseOutcome::Graceful(_)));
        assert_idle(&process);
    }
}

#[test]
fn process_built_from_config_file() {
    let mut config_file = tempfile::NamedTempFile::new().unwrap();
    write!(
        config_file,
        r#"{{"binaryPath": "sh", "chunkSize": 2, "stopTimeoutSecs": 3}}"#
    )
    .unwrap();

    let config = FfmpegConfig::load(config_file.path()).unwrap();
    let mut process = FfmpegProcess::from_config(&config).unwrap();
    assert_eq!(process.stop_timeout(), Duration::from_secs(3));

    process
        .open(["-c", "printf abc; exec >&-; cat >/dev/null"], &OpenOptions::new())
        .unwrap();
    let chunks: Vec<Chunk> = process.chunks().collect();
    assert_eq!(
        chunks,
        [Chunk::Binary(b"ab".to_vec()), Chunk::Binary(b"c".to_vec())]
    );

    assert!(matches!(
        process.close_with_default_timeout(),
        CloseOutcome::Graceful(_)
    ));
}
