// Patch engine: one linear pass over the patch stream.
//
//   magic -> { hunk header -> apply or skip -> listing line } until EOF
//         -> [truncation length -> resize] -> [trailing byte check]
//
// The output is written through random-access seeks. A single scratch
// buffer sized to the largest possible hunk is allocated per applier and
// reused for every payload and RLE fill.

use std::fs::File;
use std::io::{self, BufRead, Cursor, Seek, SeekFrom, Write};

use log::{debug, error, warn};

use super::error::{PatchError, Phase, Warning};
use super::hunk::{Hunk, be24};
use super::reader::{PatchReader, ReadStatus};
use super::text::TextEmitter;
use super::{MAGIC, MAGIC_LEN, MAX_HUNK_LEN, TRUNC_LENGTH_WIDTH};

// ---------------------------------------------------------------------------
// Output target trait
// ---------------------------------------------------------------------------

/// A seekable, resizable output the engine can patch in place.
pub trait PatchTarget: Write + Seek {
    /// Truncate or extend to exactly `len` bytes. Extension zero-fills.
    fn set_len(&mut self, len: u64) -> io::Result<()>;
}

impl PatchTarget for File {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        File::set_len(self, len)
    }
}

/// In-memory output.
impl PatchTarget for Cursor<Vec<u8>> {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        let len = usize::try_from(len).map_err(io::Error::other)?;
        self.get_mut().resize(len, 0);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Options / summary
// ---------------------------------------------------------------------------

/// Configuration for a patch run.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatchOptions {
    /// Honor the optional truncation length after the EOF marker.
    pub truncate: bool,
}

/// What a completed run did.
#[derive(Debug, Clone, Default)]
pub struct PatchSummary {
    /// Regular hunks decoded.
    pub regular_hunks: u64,
    /// RLE hunks decoded.
    pub rle_hunks: u64,
    /// Bytes written to the output (zero when only listing).
    pub bytes_written: u64,
    /// Truncation length found after the EOF marker, if honored and present.
    pub truncated_to: Option<u32>,
    /// Patch bytes consumed, if the position was trackable.
    pub patch_bytes: Option<u64>,
    /// Non-fatal conditions, in the order they were raised.
    pub warnings: Vec<Warning>,
}

impl PatchSummary {
    pub fn hunks(&self) -> u64 {
        self.regular_hunks + self.rle_hunks
    }
}

// ---------------------------------------------------------------------------
// PatchApplier
// ---------------------------------------------------------------------------

/// Decodes a patch stream and applies its hunks.
pub struct PatchApplier<R> {
    reader: PatchReader<R>,
    /// Payload / fill staging, `MAX_HUNK_LEN` bytes.
    scratch: Vec<u8>,
    summary: PatchSummary,
    position_lost: bool,
}

impl<R: BufRead> PatchApplier<R> {
    pub fn new(patch: R) -> Self {
        Self::from_reader(PatchReader::new(patch))
    }

    pub fn from_reader(reader: PatchReader<R>) -> Self {
        Self {
            reader,
            scratch: vec![0u8; MAX_HUNK_LEN],
            summary: PatchSummary::default(),
            position_lost: false,
        }
    }

    /// Consume and validate the 5-byte `PATCH` signature.
    pub fn read_magic(&mut self) -> Result<(), PatchError> {
        let mut found = [0u8; MAGIC_LEN];
        self.reader.read_exact_in(&mut found, Phase::Magic)?;
        if &found != MAGIC {
            return Err(PatchError::MagicMismatch { found });
        }
        Ok(())
    }

    /// Decode the next hunk header, tagged with the stream offset it began at.
    pub fn next_hunk(&mut self) -> Result<(Option<u64>, Hunk), PatchError> {
        let position = self.position();
        let hunk = Hunk::decode(&mut self.reader)?;
        match hunk {
            Hunk::Regular { .. } => self.summary.regular_hunks += 1,
            Hunk::Rle { .. } => self.summary.rle_hunks += 1,
            Hunk::End => {}
        }
        debug!("hunk at {position:?}: {hunk:?}");
        Ok((position, hunk))
    }

    /// Write one hunk to `target`, or skip its payload when there is none.
    pub fn apply_hunk(
        &mut self,
        position: Option<u64>,
        hunk: &Hunk,
        target: Option<&mut (dyn PatchTarget + '_)>,
    ) -> Result<(), PatchError> {
        // `fill` is set for RLE hunks, which carry no payload.
        let (offset, len, fill) = match *hunk {
            Hunk::End => return Ok(()),
            Hunk::Regular { offset, length } => (offset, length as usize, None),
            Hunk::Rle {
                offset,
                length,
                fill,
            } => (offset, length as usize, Some(fill)),
        };

        if len == 0 {
            self.warn(Warning::ZeroLengthHunk {
                position: position.unwrap_or(super::UNKNOWN_POSITION),
                offset,
            });
            return Ok(());
        }

        let Some(target) = target else {
            return self
                .reader
                .skip(hunk.payload_len() as u64, Phase::PayloadTransfer);
        };

        let buf = &mut self.scratch[..len];
        match fill {
            Some(byte) => buf.fill(byte),
            None => self.reader.read_exact_in(buf, Phase::PayloadTransfer)?,
        }
        write_at(target, offset, buf)?;
        self.summary.bytes_written += len as u64;
        Ok(())
    }

    /// Read the optional 3-byte truncation length after the EOF marker.
    ///
    /// Returns `None` when the stream ends cleanly with no directive.
    pub fn read_truncation(&mut self) -> Result<Option<u32>, PatchError> {
        let mut buf = [0u8; TRUNC_LENGTH_WIDTH];
        let status = self
            .reader
            .read_field(&mut buf)
            .map_err(PatchError::io(Phase::Truncation))?;
        match status {
            ReadStatus::Filled => Ok(Some(be24(buf))),
            ReadStatus::EndOfInput { read: 0 } => Ok(None),
            ReadStatus::EndOfInput { .. } => Err(PatchError::EarlyEof {
                phase: Phase::Truncation,
            }),
        }
    }

    /// Warn if any byte follows; the byte is left in the stream.
    pub fn check_trailing(&mut self) {
        let position = self.position();
        match self.reader.peek_byte() {
            Ok(Some(_)) => self.warn(Warning::TrailingData {
                position: position.unwrap_or(super::UNKNOWN_POSITION),
            }),
            Ok(None) => {}
            Err(e) => error!("while checking for post-truncation-length data: I/O error: {e}"),
        }
    }

    /// Run the whole pass.
    ///
    /// With no `target` the payloads are skipped; with no `listing` no text
    /// is produced. Either may be absent, not both usefully.
    pub fn run(
        &mut self,
        mut target: Option<&mut (dyn PatchTarget + '_)>,
        listing: Option<&mut (dyn Write + '_)>,
        opts: PatchOptions,
    ) -> Result<PatchSummary, PatchError> {
        let mut listing = listing.map(TextEmitter::new);
        let start = self.position();
        self.read_magic()?;
        if let Some(l) = listing.as_mut() {
            l.magic(start).map_err(PatchError::io(Phase::Listing))?;
        }

        loop {
            let (position, hunk) = self.next_hunk()?;
            if let Some(l) = listing.as_mut() {
                l.hunk(position, &hunk)
                    .map_err(PatchError::io(Phase::Listing))?;
            }
            if hunk == Hunk::End {
                break;
            }
            self.apply_hunk(position, &hunk, target.as_deref_mut())?;
        }

        if opts.truncate {
            if let Some(length) = self.read_truncation()? {
                if let Some(l) = listing.as_mut() {
                    l.truncate(length)
                        .map_err(PatchError::io(Phase::Listing))?;
                }
                if let Some(t) = target.as_deref_mut() {
                    resize(t, length)?;
                }
                self.summary.truncated_to = Some(length);
            }
            self.check_trailing();
        }

        if let Some(l) = listing.as_mut() {
            l.flush().map_err(PatchError::io(Phase::Listing))?;
        }
        if let Some(t) = target {
            t.flush()
                .map_err(PatchError::io(Phase::PayloadTransfer))?;
        }

        self.summary.patch_bytes = self.reader.position();
        Ok(std::mem::take(&mut self.summary))
    }

    pub fn into_reader(self) -> PatchReader<R> {
        self.reader
    }

    fn position(&mut self) -> Option<u64> {
        let position = self.reader.position();
        if position.is_none() && !self.position_lost {
            self.position_lost = true;
            self.warn(Warning::UnknownPosition);
        }
        position
    }

    fn warn(&mut self, w: Warning) {
        warn!("{w}");
        self.summary.warnings.push(w);
    }
}

fn write_at(target: &mut dyn PatchTarget, offset: u32, data: &[u8]) -> Result<(), PatchError> {
    target
        .seek(SeekFrom::Start(offset as u64))
        .map_err(|source| PatchError::SeekFailure { offset, source })?;
    target
        .write_all(data)
        .map_err(|source| PatchError::ShortWrite { offset, source })
}

fn resize(target: &mut dyn PatchTarget, length: u32) -> Result<(), PatchError> {
    let current = target
        .seek(SeekFrom::End(0))
        .map_err(|source| PatchError::ResizeFailure { length, source })?;
    if (length as u64) < current {
        debug!("truncation discards {} output bytes", current - length as u64);
    }
    target
        .set_len(length as u64)
        .map_err(|source| PatchError::ResizeFailure { length, source })?;
    target
        .seek(SeekFrom::End(0))
        .map_err(|source| PatchError::ResizeFailure { length, source })?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Convenience functions
// ---------------------------------------------------------------------------

/// Apply a patch stream to `target`, which must already hold the patient
/// bytes.
pub fn apply_patch<R: BufRead>(
    patch: R,
    target: &mut dyn PatchTarget,
    opts: PatchOptions,
) -> Result<PatchSummary, PatchError> {
    PatchApplier::new(patch).run(Some(target), None, opts)
}

/// Write the hunk listing of a patch stream to `listing`.
pub fn list_patch<R: BufRead>(
    patch: R,
    listing: &mut dyn Write,
    opts: PatchOptions,
) -> Result<PatchSummary, PatchError> {
    PatchApplier::new(patch).run(None, Some(listing), opts)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ips::reader::tests::FailAfter;
    use std::io::BufReader;

    const TRUNC: PatchOptions = PatchOptions { truncate: true };

    fn patch(hunks: &[(Hunk, &[u8])], trailer: &[u8]) -> Vec<u8> {
        let mut out = MAGIC.to_vec();
        for (h, payload) in hunks {
            h.encode(&mut out).unwrap();
            out.extend_from_slice(payload);
        }
        Hunk::End.encode(&mut out).unwrap();
        out.extend_from_slice(trailer);
        out
    }

    fn apply(
        patient: &[u8],
        patch: &[u8],
        opts: PatchOptions,
    ) -> Result<(Vec<u8>, PatchSummary), PatchError> {
        let mut out = Cursor::new(patient.to_vec());
        let summary = apply_patch(patch, &mut out, opts)?;
        Ok((out.into_inner(), summary))
    }

    #[test]
    fn empty_patch_leaves_output_identical() {
        let patient = b"some patient bytes".to_vec();
        let (out, summary) = apply(&patient, &patch(&[], b""), TRUNC).unwrap();
        assert_eq!(out, patient);
        assert_eq!(summary.hunks(), 0);
        assert_eq!(summary.truncated_to, None);
        assert!(summary.warnings.is_empty());
        assert_eq!(summary.patch_bytes, Some(8));
    }

    #[test]
    fn regular_hunk_writes_payload_at_offset() {
        let p = patch(
            &[(
                Hunk::Regular {
                    offset: 0x10,
                    length: 4,
                },
                &[0xAA, 0xBB, 0xCC, 0xDD],
            )],
            b"",
        );
        let (out, summary) = apply(&[0u8; 20], &p, PatchOptions::default()).unwrap();
        let mut expected = [0u8; 20];
        expected[16..20].copy_from_slice(&[0xAA, 0xBB, 0xCC, 0xDD]);
        assert_eq!(out, expected);
        assert_eq!(summary.regular_hunks, 1);
        assert_eq!(summary.bytes_written, 4);
    }

    #[test]
    fn rle_hunk_fills_run() {
        let p = patch(
            &[(
                Hunk::Rle {
                    offset: 0,
                    length: 5,
                    fill: 0x7F,
                },
                &[],
            )],
            b"",
        );
        let (out, _) = apply(b"abcdefgh", &p, PatchOptions::default()).unwrap();
        assert_eq!(out, b"\x7f\x7f\x7f\x7f\x7ffgh");
    }

    #[test]
    fn hunk_past_end_extends_output() {
        let p = patch(
            &[(
                Hunk::Regular {
                    offset: 6,
                    length: 2,
                },
                b"zz",
            )],
            b"",
        );
        let (out, _) = apply(b"ab", &p, PatchOptions::default()).unwrap();
        assert_eq!(out, b"ab\0\0\0\0zz");
    }

    #[test]
    fn later_hunks_overwrite_earlier_ones() {
        let p = patch(
            &[
                (
                    Hunk::Rle {
                        offset: 0,
                        length: 4,
                        fill: b'x',
                    },
                    &[],
                ),
                (
                    Hunk::Regular {
                        offset: 1,
                        length: 2,
                    },
                    b"yy",
                ),
            ],
            b"",
        );
        let (out, _) = apply(b"", &p, PatchOptions::default()).unwrap();
        assert_eq!(out, b"xyyx");
    }

    #[test]
    fn max_length_hunk_uses_whole_scratch() {
        let payload = vec![0x5Au8; MAX_HUNK_LEN];
        let p = patch(
            &[(
                Hunk::Regular {
                    offset: 1,
                    length: u16::MAX,
                },
                &payload,
            )],
            b"",
        );
        let (out, summary) = apply(b"", &p, PatchOptions::default()).unwrap();
        assert_eq!(out.len(), MAX_HUNK_LEN + 1);
        assert!(out[1..].iter().all(|&b| b == 0x5A));
        assert_eq!(summary.bytes_written, MAX_HUNK_LEN as u64);
    }

    #[test]
    fn zero_length_rle_warns_without_writing() {
        let p = patch(
            &[(
                Hunk::Rle {
                    offset: 3,
                    length: 0,
                    fill: 0xEE,
                },
                &[],
            )],
            b"",
        );
        let (out, summary) = apply(b"abc", &p, PatchOptions::default()).unwrap();
        assert_eq!(out, b"abc");
        assert_eq!(summary.bytes_written, 0);
        assert_eq!(
            summary.warnings,
            vec![Warning::ZeroLengthHunk {
                position: 5,
                offset: 3
            }]
        );
    }

    #[test]
    fn bad_magic_fails_before_hunks() {
        let mut p = patch(
            &[(
                Hunk::Rle {
                    offset: 0,
                    length: 1,
                    fill: 1,
                },
                &[],
            )],
            b"",
        );
        p[0] = b'p';
        let mut out = Cursor::new(b"keep".to_vec());
        let err = apply_patch(&p[..], &mut out, PatchOptions::default()).unwrap_err();
        assert!(matches!(err, PatchError::MagicMismatch { found } if &found == b"pATCH"));
        assert_eq!(out.into_inner(), b"keep");
    }

    #[test]
    fn short_magic_is_early_eof() {
        let err = apply(b"", b"PAT", PatchOptions::default()).unwrap_err();
        assert!(matches!(err, PatchError::EarlyEof { phase: Phase::Magic }));
    }

    #[test]
    fn truncated_payload_is_early_eof() {
        let mut p = MAGIC.to_vec();
        Hunk::Regular {
            offset: 0,
            length: 4,
        }
        .encode(&mut p)
        .unwrap();
        p.extend_from_slice(&[1, 2]);
        let err = apply(b"", &p, PatchOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            PatchError::EarlyEof {
                phase: Phase::PayloadTransfer
            }
        ));
    }

    #[test]
    fn missing_eof_marker_is_early_eof() {
        let err = apply(b"", MAGIC, PatchOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            PatchError::EarlyEof {
                phase: Phase::HunkDecode
            }
        ));
    }

    #[test]
    fn io_failure_mid_header_is_io_error() {
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&[0x00, 0x01]);
        let reader = BufReader::new(FailAfter::new(&bytes));
        let mut out = Cursor::new(Vec::new());
        let err = apply_patch(reader, &mut out, PatchOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            PatchError::Io {
                phase: Phase::HunkDecode,
                ..
            }
        ));
    }

    #[test]
    fn truncation_shrinks_output() {
        let (out, summary) = apply(&[9u8; 10], &patch(&[], &[0, 0, 3]), TRUNC).unwrap();
        assert_eq!(out, [9, 9, 9]);
        assert_eq!(summary.truncated_to, Some(3));
    }

    #[test]
    fn truncation_grows_output_with_zeros() {
        let (out, _) = apply(b"ab", &patch(&[], &[0, 0, 5]), TRUNC).unwrap();
        assert_eq!(out, b"ab\0\0\0");
    }

    #[test]
    fn truncation_ignored_unless_enabled() {
        let (out, summary) =
            apply(&[9u8; 10], &patch(&[], &[0, 0, 3]), PatchOptions::default()).unwrap();
        assert_eq!(out.len(), 10);
        assert_eq!(summary.truncated_to, None);
        assert!(summary.warnings.is_empty());
    }

    #[test]
    fn partial_truncation_length_is_early_eof() {
        let err = apply(b"", &patch(&[], &[0, 3]), TRUNC).unwrap_err();
        assert!(matches!(
            err,
            PatchError::EarlyEof {
                phase: Phase::Truncation
            }
        ));
    }

    #[test]
    fn trailing_data_warns_and_is_left_unread() {
        let p = patch(&[], &[0, 0, 1, 0xAB, 0xCD]);
        let mut out = Cursor::new(b"xyz".to_vec());
        let mut applier = PatchApplier::new(&p[..]);
        let summary = applier.run(Some(&mut out), None, TRUNC).unwrap();
        assert_eq!(out.into_inner(), b"x");
        assert_eq!(
            summary.warnings,
            vec![Warning::TrailingData { position: 11 }]
        );
        assert_eq!(summary.patch_bytes, Some(11));

        let mut reader = applier.into_reader();
        assert_eq!(reader.peek_byte().unwrap(), Some(0xAB));
    }

    #[test]
    fn output_position_is_new_end_after_resize() {
        let mut out = Cursor::new(vec![1u8; 8]);
        apply_patch(&patch(&[], &[0, 0, 2])[..], &mut out, TRUNC).unwrap();
        assert_eq!(out.position(), 2);
    }

    #[test]
    fn listing_skips_payloads() {
        let p = patch(
            &[
                (
                    Hunk::Regular {
                        offset: 0x10,
                        length: 4,
                    },
                    &[0xAA, 0xBB, 0xCC, 0xDD],
                ),
                (
                    Hunk::Rle {
                        offset: 0,
                        length: 5,
                        fill: 0x7F,
                    },
                    &[],
                ),
            ],
            &[0, 0, 3],
        );
        let mut text = Vec::new();
        let summary = list_patch(&p[..], &mut text, TRUNC).unwrap();
        assert_eq!(
            String::from_utf8(text).unwrap(),
            "0x00000000 PATCH\n\
             0x00000005 REGULAR offset=0x000010 length=0x0004\n\
             0x0000000e RLE offset=0x000000 length=0x0005 fill=0x7f\n\
             0x00000016 EOF\n\
             TRUNCATE length=0x000003\n"
        );
        assert_eq!(summary.bytes_written, 0);
        assert_eq!(summary.truncated_to, Some(3));
    }

    #[test]
    fn listing_empty_patch_is_two_lines() {
        let mut text = Vec::new();
        list_patch(&patch(&[], b"")[..], &mut text, TRUNC).unwrap();
        assert_eq!(
            String::from_utf8(text).unwrap(),
            "0x00000000 PATCH\n0x00000005 EOF\n"
        );
    }

    #[test]
    fn apply_and_list_together() {
        let p = patch(
            &[(
                Hunk::Regular {
                    offset: 1,
                    length: 1,
                },
                b"!",
            )],
            b"",
        );
        let mut out = Cursor::new(b"abc".to_vec());
        let mut text = Vec::new();
        PatchApplier::new(&p[..])
            .run(Some(&mut out), Some(&mut text), PatchOptions::default())
            .unwrap();
        assert_eq!(out.into_inner(), b"a!c");
        assert_eq!(text.iter().filter(|&&b| b == b'\n').count(), 3);
    }

    #[test]
    fn unknown_origin_warns_once_and_lists_sentinel() {
        let p = patch(
            &[(
                Hunk::Rle {
                    offset: 0,
                    length: 1,
                    fill: 0,
                },
                &[],
            )],
            b"",
        );
        let reader = PatchReader::with_origin(&p[..], None);
        let mut text = Vec::new();
        let summary = PatchApplier::from_reader(reader)
            .run(None, Some(&mut text), PatchOptions::default())
            .unwrap();
        assert_eq!(summary.warnings, vec![Warning::UnknownPosition]);
        assert!(String::from_utf8(text)
            .unwrap()
            .starts_with("0xffffffffffffffff PATCH\n"));
        assert_eq!(summary.patch_bytes, None);
    }
}
