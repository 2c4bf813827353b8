// Position-tracking patch stream reader.
//
// Every fixed-width read reports its own outcome: the buffer was filled,
// the stream ended after `read` bytes, or the underlying reader failed.
// Short reads are classified from that tagged result directly, never from
// state queried afterwards.

use std::io::{self, BufRead, ErrorKind};

use super::error::{PatchError, Phase};

/// Sentinel rendered when the stream position cannot be tracked.
pub const UNKNOWN_POSITION: u64 = u64::MAX;

/// Outcome of a fixed-width read that did not fail at the I/O level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// The whole buffer was filled.
    Filled,
    /// The stream reported end of data after `read` bytes.
    EndOfInput { read: usize },
}

/// Forward-only reader over a patch stream.
///
/// Counts consumed bytes so hunks can be tagged with the offset of their
/// header. Peeking is done through the `BufRead` buffer and never consumes.
pub struct PatchReader<R> {
    inner: R,
    position: Option<u64>,
}

impl<R: BufRead> PatchReader<R> {
    /// Wrap a reader positioned at the start of a patch stream.
    pub fn new(inner: R) -> Self {
        Self::with_origin(inner, Some(0))
    }

    /// Wrap a reader whose current offset is `origin`, or unknown if `None`.
    pub fn with_origin(inner: R, origin: Option<u64>) -> Self {
        Self {
            inner,
            position: origin,
        }
    }

    /// Bytes consumed so far, if known.
    pub fn position(&self) -> Option<u64> {
        self.position
    }

    fn advance(&mut self, n: usize) {
        self.position = self.position.and_then(|p| p.checked_add(n as u64));
    }

    /// Fill `buf` completely, or report how far the stream got before ending.
    ///
    /// `Interrupted` is retried; any other error is returned unchanged.
    pub fn read_field(&mut self, buf: &mut [u8]) -> io::Result<ReadStatus> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => {
                    self.advance(filled);
                    return Ok(ReadStatus::EndOfInput { read: filled });
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    self.advance(filled);
                    return Err(e);
                }
            }
        }
        self.advance(filled);
        Ok(ReadStatus::Filled)
    }

    /// Fill `buf` completely; any short read is fatal for `phase`.
    pub fn read_exact_in(&mut self, buf: &mut [u8], phase: Phase) -> Result<(), PatchError> {
        match self.read_field(buf).map_err(PatchError::io(phase))? {
            ReadStatus::Filled => Ok(()),
            ReadStatus::EndOfInput { .. } => Err(PatchError::EarlyEof { phase }),
        }
    }

    /// Discard exactly `len` bytes without copying them anywhere.
    pub fn skip(&mut self, len: u64, phase: Phase) -> Result<(), PatchError> {
        let mut remaining = len;
        while remaining > 0 {
            let available = match self.inner.fill_buf() {
                Ok(buf) => buf.len(),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(PatchError::Io { phase, source: e }),
            };
            if available == 0 {
                return Err(PatchError::EarlyEof { phase });
            }
            let n = usize::try_from(remaining).map_or(available, |r| r.min(available));
            self.inner.consume(n);
            self.advance(n);
            remaining -= n as u64;
        }
        Ok(())
    }

    /// Look at the next byte without consuming it.
    pub fn peek_byte(&mut self) -> io::Result<Option<u8>> {
        loop {
            match self.inner.fill_buf() {
                Ok(buf) => return Ok(buf.first().copied()),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
