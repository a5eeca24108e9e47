#![no_main]

use libfuzzer_sys::fuzz_target;

/// Keep the harness itself bounded; real descriptors are a few KiB.
const MAX_INPUT_BYTES: usize = 64 * 1024;

fuzz_target!(|data: &[u8]| {
    let data = &data[..data.len().min(MAX_INPUT_BYTES)];

    // Raw stream, including the version prefix.
    let _ = offcrypto_agile::parse_descriptor(data);

    // Same bytes behind a valid Agile prefix so the XML path is reached on every input.
    let mut prefixed = Vec::with_capacity(8 + data.len());
    prefixed.extend_from_slice(&[0x04, 0x00, 0x04, 0x00, 0x40, 0x00, 0x00, 0x00]);
    prefixed.extend_from_slice(data);
    let _ = offcrypto_agile::parse_descriptor(&prefixed);
});
