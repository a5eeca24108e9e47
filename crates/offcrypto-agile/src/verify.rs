//! Opt-in password and data-integrity checks.
//!
//! Agile digests (`encryptedVerifierHashValue`, `encryptedHmacValue`, ...) are stored as AES-CBC
//! ciphertext and decrypt to a buffer padded to the block size when the digest length is not a
//! multiple of it (e.g. SHA1=20 bytes padded to 32). Only the digest prefix is compared.

use crate::derive::{derive_iv, finalize_key};
use crate::descriptor::{EncryptionDescriptor, PasswordKeyEncryptor};
use crate::error::{OffcryptoError, Result};
use crate::primitives::{block_cipher, ct_eq, hmac, BlockKey, CipherOperation};

/// Check the password verifier of `key` against an [`iterated_hash`](crate::derive::iterated_hash)
/// output for the candidate password.
pub fn verify_password(iterated_hash: &[u8], key: &PasswordKeyEncryptor) -> Result<()> {
    let (Some(encrypted_input), Some(encrypted_value)) = (
        key.encrypted_verifier_hash_input.as_deref(),
        key.encrypted_verifier_hash_value.as_deref(),
    ) else {
        return Err(OffcryptoError::malformed(
            "missing encryptedVerifierHashInput/encryptedVerifierHashValue",
        ));
    };

    let decrypt_field = |block_key: BlockKey, ciphertext: &[u8]| -> Result<Vec<u8>> {
        let field_key = finalize_key(iterated_hash, key.hash_algorithm, key.key_bits, block_key)?;
        block_cipher(
            CipherOperation::Decrypt,
            key.cipher_algorithm,
            key.cipher_chaining,
            &field_key,
            &key.salt_value,
            ciphertext,
        )
    };

    let verifier_input = decrypt_field(BlockKey::VerifierHashInput, encrypted_input)?;
    let verifier_value = decrypt_field(BlockKey::VerifierHashValue, encrypted_value)?;

    let input_len = key.salt_value.len();
    let input = verifier_input
        .get(..input_len)
        .ok_or_else(|| OffcryptoError::malformed("decrypted verifierHashInput is truncated"))?;
    let digest = key.hash_algorithm.hash(&[input]);
    let expected = verifier_value
        .get(..digest.len())
        .ok_or_else(|| OffcryptoError::malformed("decrypted verifierHashValue is truncated"))?;

    if !ct_eq(&digest, expected) {
        log::debug!("password verifier mismatch");
        return Err(OffcryptoError::InvalidPassword);
    }
    Ok(())
}

/// Check the `dataIntegrity` HMAC over the whole `EncryptedPackage` stream.
pub fn verify_integrity(
    package_key: &[u8],
    descriptor: &EncryptionDescriptor,
    encrypted_package: &[u8],
) -> Result<()> {
    let integrity = descriptor
        .data_integrity
        .as_ref()
        .ok_or_else(|| OffcryptoError::malformed("missing <dataIntegrity> element"))?;
    let package = &descriptor.package;
    let digest_len = package.hash_algorithm.digest_len();

    let decrypt_field = |block_key: BlockKey, ciphertext: &[u8]| -> Result<Vec<u8>> {
        let iv = derive_iv(
            package.hash_algorithm,
            &package.salt_value,
            &block_key.bytes(),
            package.block_size,
        );
        let plain = block_cipher(
            CipherOperation::Decrypt,
            package.cipher_algorithm,
            package.cipher_chaining,
            package_key,
            &iv,
            ciphertext,
        )?;
        plain
            .get(..digest_len)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| OffcryptoError::malformed("decrypted HMAC field is truncated"))
    };

    let hmac_key = decrypt_field(BlockKey::HmacKey, &integrity.encrypted_hmac_key)?;
    let expected = decrypt_field(BlockKey::HmacValue, &integrity.encrypted_hmac_value)?;
    let actual = hmac(package.hash_algorithm, &hmac_key, encrypted_package)?;

    if !ct_eq(&actual, &expected) {
        log::debug!("EncryptedPackage HMAC mismatch");
        return Err(OffcryptoError::IntegrityCheckFailed);
    }
    Ok(())
}
