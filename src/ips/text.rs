// Human-readable hunk listing.
//
// One line per directive, numeric fields in fixed-width lowercase hex:
//
//   0x00000000 PATCH
//   0x00000005 REGULAR offset=0x000010 length=0x0004
//   0x0000000e RLE offset=0x000000 length=0x0005 fill=0x7f
//   0x00000016 EOF
//   TRUNCATE length=0x000003

use std::io::{self, Write};

use super::hunk::Hunk;
use super::reader::UNKNOWN_POSITION;

/// Writes listing lines to any `Write` sink.
pub struct TextEmitter<W: Write> {
    out: W,
}

impl<W: Write> TextEmitter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Header line confirming the magic, tagged with its stream offset.
    pub fn magic(&mut self, position: Option<u64>) -> io::Result<()> {
        writeln!(self.out, "{} PATCH", tag(position))
    }

    /// One decoded hunk (or the end marker) and the offset of its header.
    pub fn hunk(&mut self, position: Option<u64>, hunk: &Hunk) -> io::Result<()> {
        let tag = tag(position);
        match *hunk {
            Hunk::Regular { offset, length } => writeln!(
                self.out,
                "{tag} REGULAR offset=0x{offset:06x} length=0x{length:04x}"
            ),
            Hunk::Rle {
                offset,
                length,
                fill,
            } => writeln!(
                self.out,
                "{tag} RLE offset=0x{offset:06x} length=0x{length:04x} fill=0x{fill:02x}"
            ),
            Hunk::End => writeln!(self.out, "{tag} EOF"),
        }
    }

    /// Resolved truncation length.
    pub fn truncate(&mut self, length: u32) -> io::Result<()> {
        writeln!(self.out, "TRUNCATE length=0x{length:06x}")
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

fn tag(position: Option<u64>) -> String {
    format!("0x{:08x}", position.unwrap_or(UNKNOWN_POSITION))
}
