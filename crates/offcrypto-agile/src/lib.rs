//! MS-OFFCRYPTO Agile Encryption (version 4.4) for password-protected OOXML documents.
//!
//! An encrypted `.docx`/`.xlsx`/`.pptx` is an OLE/CFB container with two streams:
//! - `EncryptionInfo`: an 8-byte version prefix plus an XML descriptor of the key derivation and
//!   cipher parameters;
//! - `EncryptedPackage`: the chunked AES-CBC ciphertext of the original ZIP package.
//!
//! Decryption is a pipeline of pure stages:
//! [`parse_descriptor`] → [`derive_key`] → [`unwrap_key`] → [`decrypt_package`].
//! [`decrypt`] runs the whole pipeline. A wrong password is not detected by default and yields
//! garbage output; see [`DecryptOptions`] to opt into the password verifier and the
//! `dataIntegrity` HMAC check.

pub mod derive;
pub mod descriptor;
mod error;
pub mod ole;
pub mod package;
pub mod primitives;
pub mod unwrap;
pub mod verify;
pub mod writer;


pub use crate::derive::{derive_iv, derive_key, finalize_key, iterated_hash};
pub use crate::descriptor::{
    parse_descriptor, DataIntegrity, EncryptionDescriptor, EncryptionVersion, KeyData,
    PasswordKeyEncryptor,
};
pub use crate::error::{OffcryptoError, Result};
pub use crate::ole::{decrypt_ole, encrypt_to_ole, is_encrypted_ooxml_ole, read_encrypted_streams};
pub use crate::package::{chunk_iv, decrypt_chunk, decrypt_package, encrypt_package, CHUNK_SIZE};
pub use crate::primitives::{
    block_cipher, hmac, BlockKey, ChainingMode, CipherAlgorithm, CipherOperation, HashAlgorithm,
};
pub use crate::unwrap::{unwrap_key, wrap_key};
pub use crate::verify::{verify_integrity, verify_password};
pub use crate::writer::{encrypt_document, EncryptedDocument};

/// Default upper bound on `spinCount` accepted from a descriptor.
///
/// Office writes 100,000; a hostile file could ask for `u32::MAX` rounds.
pub const DEFAULT_MAX_SPIN_COUNT: u32 = 1_000_000;

/// Options for [`decrypt_with_options`].
#[derive(Debug, Clone)]
pub struct DecryptOptions {
    /// Reject descriptors whose `spinCount` is larger than this.
    pub max_spin_count: u32,
    /// Check the password verifier and fail with [`OffcryptoError::InvalidPassword`] on mismatch.
    pub verify_password: bool,
    /// Check the `dataIntegrity` HMAC and fail with [`OffcryptoError::IntegrityCheckFailed`] on
    /// mismatch.
    pub verify_integrity: bool,
}

impl Default for DecryptOptions {
    fn default() -> Self {
        Self {
            max_spin_count: DEFAULT_MAX_SPIN_COUNT,
            verify_password: false,
            verify_integrity: false,
        }
    }
}

/// Options for [`encrypt_document`].
#[derive(Debug, Clone)]
pub struct EncryptOptions {
    pub hash_algorithm: HashAlgorithm,
    pub key_bits: usize,
    pub spin_count: u32,
}

impl Default for EncryptOptions {
    fn default() -> Self {
        Self {
            hash_algorithm: HashAlgorithm::Sha512,
            key_bits: 256,
            spin_count: 100_000,
        }
    }
}

/// Decrypt an `EncryptedPackage` stream with default [`DecryptOptions`].
pub fn decrypt(encryption_info: &[u8], encrypted_package: &[u8], password: &str) -> Result<Vec<u8>> {
    decrypt_with_options(
        encryption_info,
        encrypted_package,
        password,
        &DecryptOptions::default(),
    )
}

/// Decrypt an `EncryptedPackage` stream.
///
/// The spin loop runs once per call; every block key needed (verifier and package key) is
/// finalized from the same iterated hash.
pub fn decrypt_with_options(
    encryption_info: &[u8],
    encrypted_package: &[u8],
    password: &str,
    opts: &DecryptOptions,
) -> Result<Vec<u8>> {
    let descriptor = parse_descriptor(encryption_info)?;
    let key = &descriptor.key;
    if key.spin_count > opts.max_spin_count {
        return Err(OffcryptoError::SpinCountTooLarge {
            spin_count: key.spin_count,
            max: opts.max_spin_count,
        });
    }

    log::debug!("deriving password key ({} rounds)", key.spin_count);
    let h = iterated_hash(password, key.hash_algorithm, &key.salt_value, key.spin_count);

    if opts.verify_password {
        verify_password(&h, key)?;
        log::debug!("password verifier matched");
    }

    let password_key = finalize_key(&h, key.hash_algorithm, key.key_bits, BlockKey::KeyValue)?;
    let package_key = unwrap_key(&password_key, key)?;

    if opts.verify_integrity {
        verify_integrity(&package_key, &descriptor, encrypted_package)?;
        log::debug!("EncryptedPackage HMAC matched");
    }

    decrypt_package(&package_key, &descriptor.package, encrypted_package)
}

/// Encrypt `plaintext` with the thread-local CSPRNG.
pub fn encrypt(plaintext: &[u8], password: &str, opts: &EncryptOptions) -> Result<EncryptedDocument> {
    encrypt_document(plaintext, password, opts, &mut rand::rng())
}
