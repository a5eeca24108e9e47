//! Password-to-key derivation and IV derivation for Agile encryption.
//!
//! The derived password hash uses `spinCount` iterations (commonly 100,000). To avoid recomputing
//! it for every block key, the derivation is split in two:
//! - [`iterated_hash`]: `H0 = Hash(salt || UTF16LE(password))`, then `spinCount` rounds of
//!   `H = Hash(LE32(i) || H)`;
//! - [`finalize_key`]: `Hash(H || blockKey)` fitted to `keyBits / 8`.
//!
//! [`derive_key`] composes both for a single block key.

use zeroize::Zeroizing;

use crate::error::{OffcryptoError, Result};
use crate::primitives::{BlockKey, HashAlgorithm};

/// Filler byte used when a derived key or IV is shorter than required.
pub const PAD_BYTE: u8 = 0x36;

#[cfg(test)]
thread_local! {
    pub(crate) static ITERATED_HASH_CALLS: std::cell::Cell<usize> = const { std::cell::Cell::new(0) };
}

/// Encode a password as UTF-16LE without BOM or terminator.
pub fn password_to_utf16le_bytes(password: &str) -> Zeroizing<Vec<u8>> {
    let mut out = Zeroizing::new(Vec::with_capacity(password.len() * 2));
    for unit in password.encode_utf16() {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    out
}

/// Compute the spin-loop hash shared by every block key of one password encryptor.
pub fn iterated_hash(
    password: &str,
    hash: HashAlgorithm,
    salt: &[u8],
    spin_count: u32,
) -> Zeroizing<Vec<u8>> {
    #[cfg(test)]
    ITERATED_HASH_CALLS.with(|calls| calls.set(calls.get() + 1));

    let password_utf16le = password_to_utf16le_bytes(password);
    let digest_len = hash.digest_len();

    let mut h = Zeroizing::new(vec![0u8; digest_len]);
    hash.hash_into(&[salt, &password_utf16le], &mut h);

    // Reuse one round buffer: LE32(i) || H.
    let mut round = Zeroizing::new(vec![0u8; 4 + digest_len]);
    for i in 0..spin_count {
        round[..4].copy_from_slice(&i.to_le_bytes());
        round[4..].copy_from_slice(&h);
        hash.hash_into(&[&round], &mut h);
    }

    h
}

/// Derive the key for `block_key` from an [`iterated_hash`] output.
pub fn finalize_key(
    iterated: &[u8],
    hash: HashAlgorithm,
    key_bits: usize,
    block_key: BlockKey,
) -> Result<Zeroizing<Vec<u8>>> {
    if key_bits == 0 || key_bits % 8 != 0 {
        return Err(OffcryptoError::malformed(format!(
            "keyBits must be a non-zero multiple of 8, got {key_bits}"
        )));
    }

    let digest = Zeroizing::new(hash.hash(&[iterated, &block_key.bytes()]));
    Ok(Zeroizing::new(fit_to_length(&digest, key_bits / 8)))
}

/// Full password-to-key derivation for one block key.
pub fn derive_key(
    password: &str,
    hash: HashAlgorithm,
    salt: &[u8],
    spin_count: u32,
    key_bits: usize,
    block_key: BlockKey,
) -> Result<Zeroizing<Vec<u8>>> {
    let h = iterated_hash(password, hash, salt, spin_count);
    finalize_key(&h, hash, key_bits, block_key)
}

/// Derive an IV: `Hash(salt || block_key)` fitted to `block_size`.
///
/// `block_key` is either one of the [`BlockKey`] constants or `LE32(chunk_index)`.
pub fn derive_iv(hash: HashAlgorithm, salt: &[u8], block_key: &[u8], block_size: usize) -> Vec<u8> {
    let digest = hash.hash(&[salt, block_key]);
    fit_to_length(&digest, block_size)
}

/// Truncate `bytes` to `len`, or right-pad with [`PAD_BYTE`].
pub fn fit_to_length(bytes: &[u8], len: usize) -> Vec<u8> {
    let mut out = bytes[..bytes.len().min(len)].to_vec();
    out.resize(len, PAD_BYTE);
    out
}
