// File-level helpers for applying and listing IPS patches.
//
// Provides `apply_file()` and `list_file()` convenience functions that open
// the patch (or stdin for `-`), seed the output with the patient bytes and
// run the engine over buffered handles. Optionally computes a SHA-256 of
// the patched output (feature-gated behind `file-io`).

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

#[cfg(feature = "file-io")]
use std::io::{Seek, SeekFrom};

#[cfg(feature = "file-io")]
use sha2::Digest;

use thiserror::Error;

use crate::ips::{PatchApplier, PatchError, PatchOptions, PatchSummary};

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Statistics returned by `apply_file()`.
#[derive(Debug, Clone)]
pub struct ApplyStats {
    /// Patient file size in bytes (0 when starting from an empty output).
    pub patient_size: u64,
    /// Patch file size in bytes (unknown for stdin).
    pub patch_size: Option<u64>,
    /// Patched output size in bytes.
    pub output_size: u64,
    /// What the engine did.
    pub summary: PatchSummary,
    /// SHA-256 of the patched output (if `file-io` feature is enabled).
    pub output_sha256: Option<[u8; 32]>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error type for file-level operations.
#[derive(Debug, Error)]
pub enum FileError {
    /// A file could not be opened or created.
    #[error("failed to open {role} file {}: {source}", path.display())]
    Open {
        role: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Copying the patient into the output failed.
    #[error("failed to copy patient file {} to output: {source}", path.display())]
    Copy {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The output path names the patient file itself.
    #[error("output file {} is the patient file", path.display())]
    SameFile { path: PathBuf },

    /// The output exists and overwriting was not requested.
    #[error("output file {} already exists", path.display())]
    OutputExists { path: PathBuf },

    /// Decoding or application failed.
    #[error(transparent)]
    Patch(#[from] PatchError),

    /// Any other I/O failure (metadata, checksum pass).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

// ---------------------------------------------------------------------------
// Opening
// ---------------------------------------------------------------------------

const BUF_SIZE: usize = 64 * 1024; // 64 KiB

/// Path that selects stdin/stdout instead of a file.
pub const STDIO_PATH: &str = "-";

pub fn is_stdio(path: &Path) -> bool {
    path.as_os_str() == STDIO_PATH
}

/// Open a patch stream, honoring `-` for stdin.
///
/// Returns the buffered reader and the file size when it is known.
pub fn open_patch(path: &Path) -> Result<(Box<dyn BufRead>, Option<u64>), FileError> {
    if is_stdio(path) {
        return Ok((Box::new(io::stdin().lock()), None));
    }
    let file = File::open(path).map_err(open_err("patch", path))?;
    let size = file.metadata().ok().map(|m| m.len());
    Ok((Box::new(BufReader::with_capacity(BUF_SIZE, file)), size))
}

fn open_err(role: &'static str, path: &Path) -> impl FnOnce(io::Error) -> FileError {
    let path = path.to_path_buf();
    move |source| FileError::Open { role, path, source }
}

/// Create the output for read/write. Without `overwrite` the file must not
/// exist yet; the check and the creation are one atomic open.
fn open_output(path: &Path, overwrite: bool) -> Result<File, FileError> {
    let mut options = OpenOptions::new();
    options.read(true).write(true);
    if overwrite {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }
    options.open(path).map_err(|source| {
        if source.kind() == io::ErrorKind::AlreadyExists {
            FileError::OutputExists {
                path: path.to_path_buf(),
            }
        } else {
            FileError::Open {
                role: "output",
                path: path.to_path_buf(),
                source,
            }
        }
    })
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// apply_file
// ---------------------------------------------------------------------------

/// Apply the patch at `patch_path` and write the result to `output_path`.
///
/// The output is seeded with a byte-for-byte copy of `patient_path`;
/// without a patient it starts empty. An existing output is replaced only
/// when `overwrite` is set. If `listing` is given, the hunk listing is
/// written to it during the same pass.
///
/// Both inputs are opened before the output is touched, so a missing
/// patch or patient leaves an existing output intact.
pub fn apply_file(
    patch_path: &Path,
    patient_path: Option<&Path>,
    output_path: &Path,
    listing: Option<&mut (dyn Write + '_)>,
    opts: PatchOptions,
    overwrite: bool,
) -> Result<ApplyStats, FileError> {
    if let Some(patient) = patient_path
        && same_file(patient, output_path)
    {
        return Err(FileError::SameFile {
            path: output_path.to_path_buf(),
        });
    }

    let (patch, patch_size) = open_patch(patch_path)?;
    let patient = match patient_path {
        Some(path) => {
            let file = File::open(path).map_err(open_err("patient", path))?;
            Some((path, BufReader::with_capacity(BUF_SIZE, file)))
        }
        None => None,
    };

    let mut output = open_output(output_path, overwrite)?;

    let patient_size = match patient {
        Some((path, mut reader)) => {
            io::copy(&mut reader, &mut output).map_err(|source| FileError::Copy {
                path: path.to_path_buf(),
                source,
            })?
        }
        None => 0,
    };

    let summary = PatchApplier::new(patch).run(Some(&mut output), listing, opts)?;
    let output_size = output.metadata()?.len();

    #[cfg(feature = "file-io")]
    let output_sha256 = {
        output.seek(SeekFrom::Start(0))?;
        let mut hasher = sha2::Sha256::new();
        io::copy(&mut BufReader::with_capacity(BUF_SIZE, &mut output), &mut hasher)?;
        Some(hasher.finalize().into())
    };
    #[cfg(not(feature = "file-io"))]
    let output_sha256: Option<[u8; 32]> = None;

    Ok(ApplyStats {
        patient_size,
        patch_size,
        output_size,
        summary,
        output_sha256,
    })
}

// ---------------------------------------------------------------------------
// list_file
// ---------------------------------------------------------------------------

/// Write the hunk listing of the patch at `patch_path` to `listing`.
pub fn list_file(
    patch_path: &Path,
    listing: &mut dyn Write,
    opts: PatchOptions,
) -> Result<PatchSummary, FileError> {
    let (patch, _) = open_patch(patch_path)?;
    let summary = PatchApplier::new(patch).run(None, Some(listing), opts)?;
    Ok(summary)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
