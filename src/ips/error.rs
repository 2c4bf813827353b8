// Error and warning types for IPS decoding/application.
//
// Fatal conditions abort the run at the point of detection and carry the
// phase they occurred in. Warnings never change the result; they are logged
// and collected in the run summary.

use std::fmt;
use std::io;

use thiserror::Error;

use super::MAGIC_LEN;

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// Stage of a patch run, used to label fatal errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Magic,
    HunkDecode,
    PayloadTransfer,
    Truncation,
    Resize,
    Listing,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Magic => "while detecting magic PATCH",
            Self::HunkDecode => "while reading hunks",
            Self::PayloadTransfer => "while transferring hunk payload",
            Self::Truncation => "while reading truncation length",
            Self::Resize => "while truncating output",
            Self::Listing => "while writing listing",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Fatal errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum PatchError {
    /// A read came up short and the stream confirmed end of data.
    #[error("{phase}: unexpected EOF")]
    EarlyEof { phase: Phase },

    /// A read or listing write failed for any other reason.
    #[error("{phase}: I/O error: {source}")]
    Io {
        phase: Phase,
        #[source]
        source: io::Error,
    },

    #[error("magic PATCH not found (got {})", escape(found))]
    MagicMismatch { found: [u8; MAGIC_LEN] },

    #[error("{}: short write at output offset {offset:#08x}: {source}", Phase::PayloadTransfer)]
    ShortWrite {
        offset: u32,
        #[source]
        source: io::Error,
    },

    #[error("{}: failed to seek output to {offset:#08x}: {source}", Phase::PayloadTransfer)]
    SeekFailure {
        offset: u32,
        #[source]
        source: io::Error,
    },

    #[error("{}: failed to resize output to {length:#08x} bytes: {source}", Phase::Resize)]
    ResizeFailure {
        length: u32,
        #[source]
        source: io::Error,
    },
}

impl PatchError {
    /// Phase in which the error was raised.
    pub fn phase(&self) -> Phase {
        match self {
            Self::EarlyEof { phase } | Self::Io { phase, .. } => *phase,
            Self::MagicMismatch { .. } => Phase::Magic,
            Self::ShortWrite { .. } | Self::SeekFailure { .. } => Phase::PayloadTransfer,
            Self::ResizeFailure { .. } => Phase::Resize,
        }
    }

    /// True for the two classified short-read outcomes.
    pub fn is_early_eof(&self) -> bool {
        matches!(self, Self::EarlyEof { .. })
    }

    pub(crate) fn io(phase: Phase) -> impl FnOnce(io::Error) -> Self {
        move |source| Self::Io { phase, source }
    }
}

fn escape(bytes: &[u8]) -> String {
    bytes.escape_ascii().to_string()
}

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

/// Non-fatal conditions surfaced during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Warning {
    /// A hunk with length zero. Accepted, nothing is written.
    ZeroLengthHunk { position: u64, offset: u32 },
    /// Bytes follow the truncation length. They are left unread.
    TrailingData { position: u64 },
    /// The patch stream position could no longer be tracked.
    UnknownPosition,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroLengthHunk { position, offset } => write!(
                f,
                "zero-length hunk at patch offset {position:#010x} (target offset {offset:#08x})"
            ),
            Self::TrailingData { position } => write!(
                f,
                "unexpected bytes at end of file (patch offset {position:#010x}). ignoring..."
            ),
            Self::UnknownPosition => f.write_str("patch stream position unavailable"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
