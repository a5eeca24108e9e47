use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rand::{rngs::StdRng, SeedableRng as _};

use offcrypto_agile::{
    decrypt, decrypt_chunk, decrypt_package, decrypt_with_options, derive_key, encrypt_document,
    encrypt_package, parse_descriptor, wrap_key, BlockKey, DecryptOptions, EncryptOptions,
    HashAlgorithm, OffcryptoError, CHUNK_SIZE,
};

fn fast_opts() -> EncryptOptions {
    EncryptOptions {
        hash_algorithm: HashAlgorithm::Sha512,
        key_bits: 256,
        spin_count: 1_000,
    }
}

fn plaintext(len: usize) -> Vec<u8> {
    let mut out = b"PK\x03\x04".to_vec();
    out.extend((0..len).map(|i| (i * 7 % 256) as u8));
    out.truncate(len);
    out
}

/// Descriptor with all-zero salts whose wrapped key is built from the public stages.
fn zero_salt_document(password: &str, spin_count: u32, data: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let zero_salt = [0u8; 16];
    let package_key = [0x5Au8; 16];

    let xml_without_key = |encrypted_key_value: &str| {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<encryption xmlns="http://schemas.microsoft.com/office/2006/encryption"
    xmlns:p="http://schemas.microsoft.com/office/2006/keyEncryptor/password">
  <keyData saltSize="16" blockSize="16" keyBits="128" hashSize="64" cipherAlgorithm="AES"
    cipherChaining="ChainingModeCBC" hashAlgorithm="SHA512" saltValue="{salt}"/>
  <keyEncryptors>
    <keyEncryptor uri="http://schemas.microsoft.com/office/2006/keyEncryptor/password">
      <p:encryptedKey spinCount="{spin_count}" saltSize="16" blockSize="16" keyBits="128"
        hashSize="64" cipherAlgorithm="AES" cipherChaining="ChainingModeCBC"
        hashAlgorithm="SHA512" saltValue="{salt}" encryptedKeyValue="{encrypted_key_value}"/>
    </keyEncryptor>
  </keyEncryptors>
</encryption>"#,
            salt = BASE64.encode(zero_salt),
        )
    };
    let with_prefix = |xml: String| {
        let mut bytes = vec![0x04, 0x00, 0x04, 0x00, 0x40, 0x00, 0x00, 0x00];
        bytes.extend_from_slice(xml.as_bytes());
        bytes
    };

    // Parse a placeholder first to get typed parameters for wrapping.
    let placeholder = parse_descriptor(&with_prefix(xml_without_key(&BASE64.encode([0u8; 16]))))
        .expect("parse placeholder");
    let password_key = derive_key(
        password,
        HashAlgorithm::Sha512,
        &zero_salt,
        spin_count,
        128,
        BlockKey::KeyValue,
    )
    .expect("derive");
    let wrapped = wrap_key(&password_key, &placeholder.key, &package_key).expect("wrap");

    let encryption_info = with_prefix(xml_without_key(&BASE64.encode(&wrapped)));
    let encrypted_package =
        encrypt_package(&package_key, &placeholder.package, data).expect("encrypt package");
    (encryption_info, encrypted_package)
}

#[test]
fn hunter2_scenario_decrypts_three_chunks_to_exact_length() {
    let data = plaintext(9000);
    let (encryption_info, encrypted_package) = zero_salt_document("hunter2", 100_000, &data);

    // 8-byte header + 4096 + 4096 + 816.
    assert_eq!(encrypted_package.len(), 8 + 4096 + 4096 + 816);
    assert_eq!(&encrypted_package[..4], &9000u32.to_le_bytes());

    let out = decrypt(&encryption_info, &encrypted_package, "hunter2").expect("decrypt");
    assert_eq!(out.len(), 9000);
    assert_eq!(out, data);
}

#[test]
fn round_trips_boundary_lengths() {
    for len in [0usize, 1, 4095, 4096, 4097, 10_000] {
        let data = plaintext(len);
        let doc = encrypt_document(&data, "pw", &fast_opts(), &mut StdRng::from_seed([1u8; 32]))
            .expect("encrypt");
        let out = decrypt(&doc.encryption_info, &doc.encrypted_package, "pw").expect("decrypt");
        assert_eq!(out, data, "len={len}");
    }
}

#[test]
fn chunks_decrypt_independently_of_processing_order() {
    let data = plaintext(4 * CHUNK_SIZE + 123);
    let (encryption_info, encrypted_package) = zero_salt_document("order", 0, &data);
    let descriptor = parse_descriptor(&encryption_info).expect("parse");
    let package_key = [0x5Au8; 16];

    let full = decrypt_package(&package_key, &descriptor.package, &encrypted_package)
        .expect("full pass");
    let chunks: Vec<&[u8]> = encrypted_package[8..].chunks(CHUNK_SIZE).collect();
    for index in [4usize, 0, 3, 1, 2] {
        let out = decrypt_chunk(&package_key, &descriptor.package, index as u32, chunks[index])
            .expect("chunk");
        let start = index * CHUNK_SIZE;
        let end = (start + CHUNK_SIZE).min(full.len());
        assert_eq!(&out[..end - start], &full[start..end], "chunk {index}");
    }
}

#[test]
fn wrong_password_yields_garbage_by_default() {
    let data = plaintext(5000);
    let doc = encrypt_document(&data, "right", &fast_opts(), &mut StdRng::from_seed([2u8; 32]))
        .expect("encrypt");
    let out = decrypt(&doc.encryption_info, &doc.encrypted_package, "wrong").expect("decrypt");
    assert_eq!(out.len(), data.len());
    assert_ne!(out, data);
}

#[test]
fn wrong_password_is_rejected_when_verifier_is_enabled() {
    let doc = encrypt_document(b"PK data", "right", &fast_opts(), &mut StdRng::from_seed([3u8; 32]))
        .expect("encrypt");
    let opts = DecryptOptions {
        verify_password: true,
        ..DecryptOptions::default()
    };
    let err = decrypt_with_options(&doc.encryption_info, &doc.encrypted_package, "wrong", &opts)
        .expect_err("wrong password");
    assert!(matches!(err, OffcryptoError::InvalidPassword), "got {err:?}");

    let out = decrypt_with_options(&doc.encryption_info, &doc.encrypted_package, "right", &opts)
        .expect("right password");
    assert_eq!(out, b"PK data");
}

#[test]
fn tampering_fails_integrity_check() {
    let data = plaintext(6000);
    let doc = encrypt_document(&data, "pw", &fast_opts(), &mut StdRng::from_seed([4u8; 32]))
        .expect("encrypt");
    let opts = DecryptOptions {
        verify_integrity: true,
        ..DecryptOptions::default()
    };

    // Ciphertext byte.
    let mut tampered = doc.encrypted_package.clone();
    tampered[100] ^= 0x55;
    let err = decrypt_with_options(&doc.encryption_info, &tampered, "pw", &opts)
        .expect_err("tampered ciphertext");
    assert!(matches!(err, OffcryptoError::IntegrityCheckFailed), "got {err:?}");

    // Length header is covered by the HMAC as well.
    let mut tampered = doc.encrypted_package.clone();
    tampered[0] ^= 0x01;
    let err = decrypt_with_options(&doc.encryption_info, &tampered, "pw", &opts)
        .expect_err("tampered header");
    assert!(matches!(err, OffcryptoError::IntegrityCheckFailed), "got {err:?}");

    let out = decrypt_with_options(&doc.encryption_info, &doc.encrypted_package, "pw", &opts)
        .expect("untampered");
    assert_eq!(out, data);
}

#[test]
fn integrity_check_without_data_integrity_is_malformed() {
    let (encryption_info, encrypted_package) = zero_salt_document("pw", 0, b"abc");
    let opts = DecryptOptions {
        verify_integrity: true,
        ..DecryptOptions::default()
    };
    let err = decrypt_with_options(&encryption_info, &encrypted_package, "pw", &opts)
        .expect_err("no dataIntegrity");
    assert!(matches!(err, OffcryptoError::MalformedDescriptor(_)), "got {err:?}");
}

#[test]
fn truncated_payload_reports_declared_length() {
    let data = plaintext(5000);
    let (encryption_info, mut encrypted_package) = zero_salt_document("pw", 0, &data);
    encrypted_package.truncate(8 + CHUNK_SIZE);
    let err = decrypt(&encryption_info, &encrypted_package, "pw").expect_err("truncated");
    assert!(
        matches!(
            err,
            OffcryptoError::DeclaredLengthExceedsPayload {
                declared_len: 5000,
                available_len: 4096
            }
        ),
        "got {err:?}"
    );
}
