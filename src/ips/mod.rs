// IPS patch format implementation.
//
// # Modules
//
// - `reader` - Position-tracking stream reader with classified short reads
// - `hunk`   - Hunk header decoding/encoding and big-endian helpers
// - `apply`  - Patch engine: magic check, hunk application, truncation
// - `text`   - Human-readable hunk listing
// - `error`  - Fatal errors and non-fatal warnings

pub mod apply;
pub mod error;
pub mod hunk;
pub mod reader;
pub mod text;

// Re-export key types for convenience.
pub use apply::{PatchApplier, PatchOptions, PatchSummary, PatchTarget, apply_patch, list_patch};
pub use error::{PatchError, Phase, Warning};
pub use hunk::Hunk;
pub use reader::{PatchReader, ReadStatus, UNKNOWN_POSITION};
pub use text::TextEmitter;

// ---------------------------------------------------------------------------
// Format constants
// ---------------------------------------------------------------------------

pub const MAGIC: &[u8; MAGIC_LEN] = b"PATCH";
pub const MAGIC_LEN: usize = 5;

pub const EOF_MARKER: &[u8; 3] = b"EOF";

/// Largest offset a 24-bit hunk header can carry.
pub const MAX_HUNK_OFFSET: u32 = 0xFF_FFFF;

/// Largest length a hunk (regular or RLE) can carry.
pub const MAX_HUNK_LEN: usize = u16::MAX as usize;

pub const TRUNC_LENGTH_WIDTH: usize = 3;
