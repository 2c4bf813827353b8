#![no_main]
use libfuzzer_sys::fuzz_target;
use ipsapply::ips::{PatchOptions, apply_patch, list_patch};
use std::io::Cursor;

fuzz_target!(|data: &[u8]| {
    // Arbitrary patch bytes must only ever produce errors, never panics.
    let opts = PatchOptions { truncate: true };
    let _ = list_patch(data, &mut std::io::sink(), opts);

    // Same bytes behind a valid magic, applied over a small patient.
    let mut patch = b"PATCH".to_vec();
    patch.extend_from_slice(data);
    let mut out = Cursor::new(vec![0u8; 64]);
    let _ = apply_patch(&patch[..], &mut out, opts);
});
