//! `EncryptedPackage` stream decryption.
//!
//! Layout:
//!
//! ```text
//! [0..4)   LE32 plaintext length
//! [4..8)   reserved
//! [8..)    ciphertext, in 4096-byte chunks (last one shorter)
//! ```
//!
//! Chunk `i` is AES-CBC encrypted on its own, with IV `Hash(keyData.saltValue || LE32(i))`
//! fitted to `keyData.blockSize`.

use crate::derive::derive_iv;
use crate::descriptor::KeyData;
use crate::error::{OffcryptoError, Result};
use crate::primitives::{block_cipher, CipherOperation};

/// Plaintext bytes per encrypted chunk.
pub const CHUNK_SIZE: usize = 4096;

/// Length-prefix region in front of the ciphertext.
pub const PACKAGE_HEADER_LEN: usize = 8;

/// IV of chunk `index`.
pub fn chunk_iv(package: &KeyData, index: u32) -> Vec<u8> {
    derive_iv(
        package.hash_algorithm,
        &package.salt_value,
        &index.to_le_bytes(),
        package.block_size,
    )
}

/// Decrypt one ciphertext chunk. A chunk that is not block aligned is zero-padded first.
pub fn decrypt_chunk(
    package_key: &[u8],
    package: &KeyData,
    index: u32,
    chunk: &[u8],
) -> Result<Vec<u8>> {
    transform_chunk(CipherOperation::Decrypt, package_key, package, index, chunk)
}

fn transform_chunk(
    op: CipherOperation,
    package_key: &[u8],
    package: &KeyData,
    index: u32,
    chunk: &[u8],
) -> Result<Vec<u8>> {
    let expected = package.cipher_algorithm.block_size();
    if package.block_size != expected {
        return Err(OffcryptoError::InvalidIvLength {
            len: package.block_size,
            expected,
        });
    }

    let iv = chunk_iv(package, index);
    let rem = chunk.len() % package.block_size;
    if rem == 0 {
        return block_cipher(
            op,
            package.cipher_algorithm,
            package.cipher_chaining,
            package_key,
            &iv,
            chunk,
        );
    }

    let mut padded = Vec::with_capacity(chunk.len() + package.block_size - rem);
    padded.extend_from_slice(chunk);
    padded.resize(chunk.len() + package.block_size - rem, 0);
    block_cipher(
        op,
        package.cipher_algorithm,
        package.cipher_chaining,
        package_key,
        &iv,
        &padded,
    )
}

/// Read the declared plaintext length from the stream header.
pub fn declared_len(stream: &[u8]) -> Result<usize> {
    let Some(header) = stream.get(..PACKAGE_HEADER_LEN) else {
        return Err(OffcryptoError::EncryptedPackageTooShort { len: stream.len() });
    };
    let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    usize::try_from(len).map_err(|_| OffcryptoError::EncryptedPackageTooLarge {
        len: stream.len(),
    })
}

/// Decrypt a full `EncryptedPackage` stream into exactly the declared number of bytes.
pub fn decrypt_package(package_key: &[u8], package: &KeyData, stream: &[u8]) -> Result<Vec<u8>> {
    let declared_len = declared_len(stream)?;
    let payload = &stream[PACKAGE_HEADER_LEN..];
    let chunk_count = payload.len().div_ceil(CHUNK_SIZE);
    if u32::try_from(chunk_count).is_err() {
        return Err(OffcryptoError::EncryptedPackageTooLarge { len: stream.len() });
    }

    log::debug!(
        "decrypting EncryptedPackage: declared_len={declared_len} payload_len={} chunks={chunk_count}",
        payload.len()
    );

    let decrypt_indexed = |(index, chunk): (usize, &[u8])| -> Result<Vec<u8>> {
        let index = index as u32;
        log::trace!("decrypting chunk {index} ({} bytes)", chunk.len());
        decrypt_chunk(package_key, package, index, chunk)
    };

    #[cfg(feature = "parallel")]
    let chunks: Vec<Vec<u8>> = {
        use rayon::prelude::*;
        payload
            .par_chunks(CHUNK_SIZE)
            .enumerate()
            .map(decrypt_indexed)
            .collect::<Result<_>>()?
    };
    #[cfg(not(feature = "parallel"))]
    let chunks: Vec<Vec<u8>> = payload
        .chunks(CHUNK_SIZE)
        .enumerate()
        .map(decrypt_indexed)
        .collect::<Result<_>>()?;

    let mut out = Vec::with_capacity(chunks.iter().map(Vec::len).sum());
    for chunk in &chunks {
        out.extend_from_slice(chunk);
    }

    if out.len() < declared_len {
        return Err(OffcryptoError::DeclaredLengthExceedsPayload {
            declared_len,
            available_len: out.len(),
        });
    }
    out.truncate(declared_len);
    Ok(out)
}

/// Inverse of [`decrypt_package`]: build an `EncryptedPackage` stream for `plaintext`.
pub fn encrypt_package(package_key: &[u8], package: &KeyData, plaintext: &[u8]) -> Result<Vec<u8>> {
    let declared_len = u32::try_from(plaintext.len()).map_err(|_| {
        OffcryptoError::EncryptedPackageTooLarge {
            len: plaintext.len(),
        }
    })?;

    let mut out = Vec::with_capacity(PACKAGE_HEADER_LEN + plaintext.len() + package.block_size);
    out.extend_from_slice(&declared_len.to_le_bytes());
    out.extend_from_slice(&[0u8; 4]);
    for (index, chunk) in plaintext.chunks(CHUNK_SIZE).enumerate() {
        let ciphertext = transform_chunk(
            CipherOperation::Encrypt,
            package_key,
            package,
            index as u32,
            chunk,
        )?;
        out.extend_from_slice(&ciphertext);
    }
    Ok(out)
}
