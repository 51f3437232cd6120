use std::io::Read;
use std::num::NonZeroUsize;

use tracing::Span;

use super::RunningProcess;
use crate::model::{ReadSource, TransferMode};

/// One read from the child's selected output stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Chunk {
    Binary(Vec<u8>),
    Text(String),
}

impl Chunk {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Chunk::Binary(bytes) => bytes,
            Chunk::Text(text) => text.as_bytes(),
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Chunk::Binary(bytes) => bytes,
            Chunk::Text(text) => text.into_bytes(),
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lazy sequence of output chunks, borrowed from an `FfmpegProcess`.
///
/// Every call to `next` checks the process again: the sequence ends without
/// reading when there is no process, when it has exited, or when the
/// selected stream was not piped. Otherwise it blocks until `chunk_size`
/// bytes arrive or the stream reaches end-of-file.
///
/// Text chunks are sized in bytes too, not characters. A character split by
/// a read is held back and prepended to the next chunk, so a text chunk may
/// exceed `chunk_size` by up to three bytes.
pub struct Chunks<'a> {
    pub(super) running: Option<&'a mut RunningProcess>,
    pub(super) read_source: ReadSource,
    pub(super) chunk_size: NonZeroUsize,
    pub(super) span: &'a Span,
}

impl Iterator for Chunks<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        let span = self.span;
        let Some(running) = self.running.as_deref_mut() else {
            tracing::debug!(parent: span, "No ffmpeg process to read output from");
            return None;
        };

        match running.child.try_wait() {
            Ok(None) => {}
            Ok(Some(status)) => {
                tracing::debug!(parent: span, %status, "ffmpeg has exited, output sequence ends");
                return flush_text_carry(running);
            }
            Err(error) => {
                tracing::warn!(parent: span, "Failed to poll ffmpeg process: {error}");
                return None;
            }
        }

        let limit = self.chunk_size.get();
        loop {
            let Some(bytes) = read_selected_stream(running, self.read_source, limit, span) else {
                return flush_text_carry(running);
            };

            match running.mode {
                TransferMode::Binary => return Some(Chunk::Binary(bytes)),
                TransferMode::Text => {
                    let at_eof = bytes.len() < limit;
                    running.text_carry.extend_from_slice(&bytes);
                    let text = decode_utf8_carry(&mut running.text_carry, at_eof);
                    if !text.is_empty() {
                        return Some(Chunk::Text(text));
                    }
                }
            }
        }
    }
}

fn read_selected_stream(
    running: &mut RunningProcess,
    read_source: ReadSource,
    limit: usize,
    span: &Span,
) -> Option<Vec<u8>> {
    let read_result = match read_source {
        ReadSource::Stdout => running.child.stdout.as_mut().map(|stdout| read_chunk(stdout, limit)),
        ReadSource::Stderr => running.child.stderr.as_mut().map(|stderr| read_chunk(stderr, limit)),
    };

    match read_result {
        None => {
            tracing::error!(
                parent: span,
                ?read_source,
                "ffmpeg output stream is not piped, nothing to read"
            );
            None
        }
        Some(Ok(bytes)) if bytes.is_empty() => {
            tracing::debug!(parent: span, ?read_source, "ffmpeg output stream closed");
            None
        }
        Some(Ok(bytes)) => Some(bytes),
        Some(Err(error)) => {
            tracing::warn!(parent: span, ?read_source, "Failed to read ffmpeg output: {error}");
            None
        }
    }
}

/// Emits a partial character left over from the last full-size read as
/// U+FFFD once the stream has ended.
fn flush_text_carry(running: &mut RunningProcess) -> Option<Chunk> {
    if running.text_carry.is_empty() {
        return None;
    }
    Some(Chunk::Text(decode_utf8_carry(&mut running.text_carry, true)))
}

/// Reads until `limit` bytes are collected or the stream ends.
fn read_chunk<R: Read + ?Sized>(reader: &mut R, limit: usize) -> std::io::Result<Vec<u8>> {
    let mut buffer = Vec::with_capacity(limit);
    reader.take(limit as u64).read_to_end(&mut buffer)?;
    Ok(buffer)
}

/// Decodes as much of `carry` as forms complete UTF-8, leaving a trailing
/// partial character in `carry` unless the stream is at its end.
pub(crate) fn decode_utf8_carry(carry: &mut Vec<u8>, at_eof: bool) -> String {
    let mut text = String::with_capacity(carry.len());
    let mut rest: &[u8] = carry.as_slice();

    while !rest.is_empty() {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                text.push_str(valid);
                rest = &[];
            }
            Err(error) => {
                let (valid, after) = rest.split_at(error.valid_up_to());
                text.push_str(std::str::from_utf8(valid).unwrap_or_default());

                match error.error_len() {
                    Some(invalid_len) => {
                        text.push(char::REPLACEMENT_CHARACTER);
                        rest = &after[invalid_len..];
                    }
                    None if at_eof => {
                        text.push(char::REPLACEMENT_CHARACTER);
                        rest = &[];
                    }
                    None => {
                        rest = after;
                        break;
                    }
                }
            }
        }
    }

    let remaining = rest.to_vec();
    *carry = remaining;
    text
}
