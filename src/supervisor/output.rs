//! Line framing for child stdout and stderr.
//!
//! Child output is split on `\n` as raw bytes. Content never fails decoding:
//! invalid UTF-8 is left to the reader to convert, and a line longer than the
//! configured limit is discarded up to its newline and reported as
//! [`OutputFrame::Oversized`]. Only a failing read ends the stream, so the
//! supervisor keeps draining the pipe for as long as the child writes to it.

use std::io;

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

/// Maximum output line length kept in memory: 1 MiB.
pub const MAX_OUTPUT_LINE_BYTES: usize = 1_048_576;

/// One decoded unit of child output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputFrame {
    /// A complete line without its terminator (`\n` or `\r\n`).
    Line(Vec<u8>),
    /// A line longer than the limit was skipped.
    Oversized,
}

/// Newline framing with a byte limit per line.
#[derive(Debug)]
pub struct OutputCodec {
    max_length: usize,
    /// Where the next newline search resumes, so rescans stay linear.
    next_index: usize,
    discarding: bool,
}

impl OutputCodec {
    /// Codec with the default [`MAX_OUTPUT_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_length(MAX_OUTPUT_LINE_BYTES)
    }

    /// Codec keeping at most `max_length` bytes per line.
    #[must_use]
    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            max_length,
            next_index: 0,
            discarding: false,
        }
    }
}

impl Default for OutputCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for OutputCodec {
    type Item = OutputFrame;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> io::Result<Option<OutputFrame>> {
        loop {
            let read_to = buf.len().min(self.max_length.saturating_add(1));
            let newline = buf[self.next_index..read_to]
                .iter()
                .position(|byte| *byte == b'\n');

            match (self.discarding, newline) {
                (true, Some(offset)) => {
                    buf.advance(self.next_index + offset + 1);
                    self.discarding = false;
                    self.next_index = 0;
                    return Ok(Some(OutputFrame::Oversized));
                }
                (true, None) => {
                    buf.advance(read_to);
                    self.next_index = 0;
                    if buf.is_empty() {
                        return Ok(None);
                    }
                }
                (false, Some(offset)) => {
                    let end = self.next_index + offset;
                    self.next_index = 0;
                    let mut line = buf.split_to(end + 1);
                    line.truncate(end);
                    if line.last() == Some(&b'\r') {
                        line.truncate(end - 1);
                    }
                    return Ok(Some(OutputFrame::Line(line.to_vec())));
                }
                (false, None) if buf.len() > self.max_length => {
                    self.discarding = true;
                }
                (false, None) => {
                    self.next_index = read_to;
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> io::Result<Option<OutputFrame>> {
        if let Some(frame) = self.decode(buf)? {
            return Ok(Some(frame));
        }
        self.next_index = 0;
        if self.discarding {
            self.discarding = false;
            buf.clear();
            return Ok(Some(OutputFrame::Oversized));
        }
        if buf.is_empty() {
            return Ok(None);
        }
        // Unterminated final line.
        let mut line = buf.split();
        if line.last() == Some(&b'\r') {
            line.truncate(line.len() - 1);
        }
        Ok(Some(OutputFrame::Line(line.to_vec())))
    }
}
