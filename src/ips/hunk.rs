// IPS hunk header encoding/decoding.
//
// Header layout (big-endian):
//   offset  3 bytes, or the literal "EOF" ending the hunk list
//   length  2 bytes; 0 selects the RLE form
//   RLE:    run length 2 bytes, fill 1 byte
// Regular hunks are followed by `length` literal payload bytes, which are
// not part of the header and are handled by the applier.

use std::io::{self, BufRead, Write};

use super::error::{PatchError, Phase};
use super::reader::PatchReader;
use super::{EOF_MARKER, MAX_HUNK_OFFSET};

pub const HUNK_OFFSET_WIDTH: usize = 3;
pub const HUNK_LENGTH_WIDTH: usize = 2;

/// A hunk at this offset would be indistinguishable from the end
/// marker.
pub const EOF_MARKER_OFFSET: u32 = be24(*EOF_MARKER);

// ---------------------------------------------------------------------------
// Fixed-width big-endian helpers
// ---------------------------------------------------------------------------

#[inline]
pub const fn be16(bytes: [u8; 2]) -> u32 {
    ((bytes[0] as u32) << 8) | bytes[1] as u32
}

#[inline]
pub const fn be24(bytes: [u8; 3]) -> u32 {
    ((bytes[0] as u32) << 16) | ((bytes[1] as u32) << 8) | bytes[2] as u32
}

#[inline]
pub const fn to_be24(value: u32) -> [u8; 3] {
    let b = value.to_be_bytes();
    [b[1], b[2], b[3]]
}

// ---------------------------------------------------------------------------
// Hunk
// ---------------------------------------------------------------------------

/// One decoded hunk header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hunk {
    /// `length` literal bytes follow the header.
    Regular { offset: u32, length: u16 },
    /// `length` copies of `fill`; no payload follows.
    Rle { offset: u32, length: u16, fill: u8 },
    /// End of the hunk list.
    End,
}

impl Hunk {
    /// Bytes of patch stream following the header.
    pub fn payload_len(&self) -> u16 {
        match *self {
            Self::Regular { length, .. } => length,
            Self::Rle { .. } | Self::End => 0,
        }
    }

    /// Decode the next hunk header.
    ///
    /// Any short read aborts with the classified error; partially read
    /// headers are never completed with defaults.
    pub fn decode<R: BufRead>(r: &mut PatchReader<R>) -> Result<Self, PatchError> {
        const PHASE: Phase = Phase::HunkDecode;

        let mut offset = [0u8; HUNK_OFFSET_WIDTH];
        r.read_exact_in(&mut offset, PHASE)?;
        if &offset == EOF_MARKER {
            return Ok(Self::End);
        }
        let offset = be24(offset);

        let mut len = [0u8; HUNK_LENGTH_WIDTH];
        r.read_exact_in(&mut len, PHASE)?;
        let length = be16(len) as u16;
        if length != 0 {
            return Ok(Self::Regular { offset, length });
        }

        r.read_exact_in(&mut len, PHASE)?;
        let length = be16(len) as u16;
        let mut fill = [0u8; 1];
        r.read_exact_in(&mut fill, PHASE)?;

        Ok(Self::Rle {
            offset,
            length,
            fill: fill[0],
        })
    }

    /// Encode the header (not the payload) of this hunk.
    ///
    /// Fails for headers the format cannot represent: offsets above 24
    /// bits, any hunk at the end marker's offset, or a zero-length regular
    /// hunk (length 0 selects the RLE form).
    pub fn encode<W: Write>(&self, w: &mut W) -> io::Result<()> {
        match *self {
            Self::End => w.write_all(EOF_MARKER),
            Self::Regular { offset, length } => {
                check_offset(offset)?;
                if length == 0 {
                    return Err(invalid("regular hunk length must be nonzero".into()));
                }
                w.write_all(&to_be24(offset))?;
                w.write_all(&length.to_be_bytes())
            }
            Self::Rle {
                offset,
                length,
                fill,
            } => {
                check_offset(offset)?;
                w.write_all(&to_be24(offset))?;
                w.write_all(&[0, 0])?;
                w.write_all(&length.to_be_bytes())?;
                w.write_all(&[fill])
            }
        }
    }
}

fn check_offset(offset: u32) -> io::Result<()> {
    if offset > MAX_HUNK_OFFSET {
        return Err(invalid(format!("hunk offset {offset:#x} exceeds 24 bits")));
    }
    if offset == EOF_MARKER_OFFSET {
        return Err(invalid(format!(
            "hunk offset {offset:#08x} aliases the EOF marker"
        )));
    }
    Ok(())
}

fn invalid(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, msg)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
