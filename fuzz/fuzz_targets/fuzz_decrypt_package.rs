#![no_main]

use libfuzzer_sys::fuzz_target;
use offcrypto_agile::{ChainingMode, CipherAlgorithm, HashAlgorithm, KeyData};

const MAX_INPUT_BYTES: usize = 256 * 1024;

fuzz_target!(|data: &[u8]| {
    let Some((&selector, rest)) = data.split_first() else {
        return;
    };
    let stream = &rest[..rest.len().min(MAX_INPUT_BYTES)];

    let hash_algorithm = match selector % 5 {
        0 => HashAlgorithm::Md5,
        1 => HashAlgorithm::Sha1,
        2 => HashAlgorithm::Sha256,
        3 => HashAlgorithm::Sha384,
        _ => HashAlgorithm::Sha512,
    };
    let key_len = [16usize, 24, 32, 7][usize::from(selector >> 6)];
    let package = KeyData {
        cipher_algorithm: CipherAlgorithm::Aes,
        cipher_chaining: ChainingMode::Cbc,
        salt_value: stream.iter().take(16).copied().collect(),
        hash_algorithm,
        block_size: 16,
        key_bits: Some(key_len * 8),
    };
    let key = vec![selector; key_len];

    if let Ok(out) = offcrypto_agile::decrypt_package(&key, &package, stream) {
        let declared = u32::from_le_bytes([stream[0], stream[1], stream[2], stream[3]]) as usize;
        assert_eq!(out.len(), declared);
    }
});
