//! ipsapply: IPS binary patch application and listing.
//!
//! The crate provides:
//! - The IPS format decoder and patch engine (`ips`)
//! - File-oriented helpers (`io`)
//! - An optional CLI (`cli` feature)
//!
//! # Quick Start
//!
//! ```no_run
//! use std::io::Cursor;
//! use ipsapply::ips::{self, PatchOptions};
//!
//! let patch = b"PATCH\x00\x00\x01\x00\x02hiEOF";
//! let mut output = Cursor::new(b"abcd".to_vec());
//! ips::apply_patch(&patch[..], &mut output, PatchOptions::default()).unwrap();
//! assert_eq!(output.into_inner(), b"ahid");
//! ```

pub mod io;
pub mod ips;

#[cfg(feature = "cli")]
pub mod cli;
