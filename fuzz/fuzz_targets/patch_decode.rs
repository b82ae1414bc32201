//! Fuzz harness for `Patch::decode`.
//!
//! The first byte picks how much of the input is used as the source file; the
//! rest is decoded as a patch. Decoding must never panic, accepted patches
//! must re-encode to the exact input, and applying one to any source either
//! fails or produces the declared number of bytes.

#![no_main]
use std::io::Cursor;

use binpatch::Patch;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&split, rest)) = data.split_first() else {
        return;
    };
    let split = usize::from(split).min(rest.len());
    let (source, encoded) = rest.split_at(split);

    let Ok(patch) = Patch::decode(encoded) else {
        return;
    };
    assert_eq!(patch.encode(), encoded);

    // Cap the output so huge copy/insert totals are rejected, not written.
    if patch.output_len().is_none_or(|len| len > 1 << 20) {
        return;
    }

    let mut out = Vec::new();
    if let Ok(written) = patch.apply(&mut Cursor::new(source), &mut out) {
        assert_eq!(written, out.len() as u64);
        if let Some(expected) = patch.expected_len() {
            assert_eq!(expected, written);
        }
    }
});
