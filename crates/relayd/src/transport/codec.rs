//! Newline-delimited framing.

use std::io::{self, BufRead, BufReader, Read, Write};

use thiserror::Error;

use crate::protocol::Outbound;

/// Errors raised while reading or writing frames.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The peer sent a line longer than the configured limit.
    #[error("frame exceeds the limit of {limit} bytes")]
    TooLarge {
        /// Configured limit.
        limit: usize,
    },
    /// Reading from or writing to the stream failed.
    #[error("stream IO failed: {0}")]
    Io(#[from] io::Error),
    /// An outgoing message could not be serialised.
    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One inbound line with its terminator and any trailing `\r` removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame contents.
    pub bytes: Vec<u8>,
    /// `false` for bytes left at end of stream without a newline.
    pub terminated: bool,
}

/// Splits a byte stream into frames, one per newline.
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: BufReader<R>,
    buffer: Vec<u8>,
    limit: usize,
}

impl<R: Read> FrameReader<R> {
    /// Wraps `reader`, rejecting frames longer than `limit` bytes.
    pub fn new(reader: R, limit: usize) -> Self {
        Self {
            inner: BufReader::new(reader),
            buffer: Vec::new(),
            limit,
        }
    }

    /// Returns the next non-blank frame, or `None` at end of stream.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::TooLarge`] when a line exceeds the limit and
    /// [`FrameError::Io`] when the underlying read fails. The reader should
    /// not be used again after an error.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, FrameError> {
        loop {
            self.buffer.clear();
            let Some(terminated) = self.fill_line()? else {
                return Ok(None);
            };
            if self.buffer.last() == Some(&b'\r') {
                self.buffer.pop();
            }
            if self.buffer.iter().all(u8::is_ascii_whitespace) {
                if terminated {
                    continue;
                }
                return Ok(None);
            }
            return Ok(Some(Frame {
                bytes: std::mem::take(&mut self.buffer),
                terminated,
            }));
        }
    }

    /// Reads up to and including the next newline into `buffer`.
    ///
    /// Yields `Some(true)` for a terminated line, `Some(false)` for a tail at
    /// end of stream and `None` when the stream ended cleanly.
    fn fill_line(&mut self) -> Result<Option<bool>, FrameError> {
        loop {
            let available = match self.inner.fill_buf() {
                Ok(available) => available,
                Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
                Err(error) => return Err(FrameError::Io(error)),
            };
            if available.is_empty() {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                self.check_length()?;
                return Ok(Some(false));
            }

            let newline = available.iter().position(|byte| *byte == b'\n');
            let chunk_len = newline.unwrap_or(available.len());
            // One byte of slack for a `\r` that belongs to the line ending.
            if self.buffer.len() + chunk_len > self.limit.saturating_add(1) {
                return Err(FrameError::TooLarge { limit: self.limit });
            }
            self.buffer.extend_from_slice(&available[..chunk_len]);
            let consumed = chunk_len + usize::from(newline.is_some());
            self.inner.consume(consumed);
            if newline.is_some() {
                self.check_length()?;
                return Ok(Some(true));
            }
        }
    }

    /// Checks the buffered line against the limit, not counting a trailing
    /// `\r`.
    fn check_length(&self) -> Result<(), FrameError> {
        let carriage_return = usize::from(self.buffer.last() == Some(&b'\r'));
        if self.buffer.len() - carriage_return > self.limit {
            return Err(FrameError::TooLarge { limit: self.limit });
        }
        Ok(())
    }
}

/// Writes messages as compact JSON, one per line.
#[derive(Debug)]
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: Write> FrameWriter<W> {
    /// Wraps `writer`.
    pub fn new(writer: W) -> Self {
        Self { inner: writer }
    }

    /// Serialises `message` followed by a newline. Does not flush.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Encode`] when serialisation fails and
    /// [`FrameError::Io`] when the write fails.
    pub fn write(&mut self, message: &Outbound) -> Result<(), FrameError> {
        let mut line = serde_json::to_vec(message)?;
        line.push(b'\n');
        self.inner.write_all(&line)?;
        Ok(())
    }

    /// Flushes buffered frames to the stream.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Io`] when the flush fails.
    pub fn flush(&mut self) -> Result<(), FrameError> {
        self.inner.flush()?;
        Ok(())
    }

    /// Releases the wrapped writer.
    pub fn into_inner(self) -> W {
        self.inner
    }
}
