//! Cipher primitive adapter for MS-OFFCRYPTO Agile encryption.
//!
//! Algorithm names from the `EncryptionInfo` XML are resolved into closed enumerations at the
//! descriptor boundary; everything past that point works with typed values. The primitives
//! themselves come from the RustCrypto crates (`aes`, `cbc`, `sha1`, `sha2`, `md-5`, `hmac`).

use core::fmt;

use aes::{Aes128, Aes192, Aes256};
use cipher::block_padding::NoPadding;
use cipher::{BlockCipher, BlockDecryptMut, BlockEncryptMut, KeyInit, KeyIvInit};
use digest::Digest;
use hmac::{Hmac, Mac};

use crate::error::{OffcryptoError, Result};

pub const AES_BLOCK_SIZE: usize = 16;

/// Hash algorithms accepted in `hashAlgorithm` attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    /// Parse a hash algorithm name as used in MS-OFFCRYPTO XML.
    ///
    /// Names are case-insensitive; `SHA-256` / `sha_256` spellings seen in other tooling are
    /// tolerated.
    pub fn from_name(name: &str) -> Result<Self> {
        let normalized = name.trim().to_ascii_lowercase().replace(['-', '_'], "");
        match normalized.as_str() {
            "md5" => Ok(HashAlgorithm::Md5),
            "sha1" => Ok(HashAlgorithm::Sha1),
            "sha256" => Ok(HashAlgorithm::Sha256),
            "sha384" => Ok(HashAlgorithm::Sha384),
            "sha512" => Ok(HashAlgorithm::Sha512),
            _ => Err(OffcryptoError::UnsupportedAlgorithm(name.to_string())),
        }
    }

    /// Canonical XML spelling.
    pub fn name(self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "MD5",
            HashAlgorithm::Sha1 => "SHA1",
            HashAlgorithm::Sha256 => "SHA256",
            HashAlgorithm::Sha384 => "SHA384",
            HashAlgorithm::Sha512 => "SHA512",
        }
    }

    pub fn digest_len(self) -> usize {
        match self {
            HashAlgorithm::Md5 => 16,
            HashAlgorithm::Sha1 => 20,
            HashAlgorithm::Sha256 => 32,
            HashAlgorithm::Sha384 => 48,
            HashAlgorithm::Sha512 => 64,
        }
    }

    /// Digest the concatenation of `parts`.
    pub fn hash(self, parts: &[&[u8]]) -> Vec<u8> {
        let mut out = vec![0u8; self.digest_len()];
        self.hash_into(parts, &mut out);
        out
    }

    /// Digest the concatenation of `parts` into `out`, which must be exactly
    /// [`digest_len`](Self::digest_len) bytes.
    ///
    /// Lets the spin loop reuse a single buffer instead of allocating per iteration.
    pub(crate) fn hash_into(self, parts: &[&[u8]], out: &mut [u8]) {
        fn run<D: Digest>(parts: &[&[u8]], out: &mut [u8]) {
            let mut hasher = D::new();
            for part in parts {
                hasher.update(part);
            }
            out.copy_from_slice(&hasher.finalize());
        }

        match self {
            HashAlgorithm::Md5 => run::<md5::Md5>(parts, out),
            HashAlgorithm::Sha1 => run::<sha1::Sha1>(parts, out),
            HashAlgorithm::Sha256 => run::<sha2::Sha256>(parts, out),
            HashAlgorithm::Sha384 => run::<sha2::Sha384>(parts, out),
            HashAlgorithm::Sha512 => run::<sha2::Sha512>(parts, out),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Block cipher named by `cipherAlgorithm`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CipherAlgorithm {
    Aes,
}

impl CipherAlgorithm {
    pub fn from_name(name: &str) -> Result<Self> {
        if name.trim().eq_ignore_ascii_case("AES") {
            Ok(CipherAlgorithm::Aes)
        } else {
            Err(OffcryptoError::UnsupportedAlgorithm(name.to_string()))
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CipherAlgorithm::Aes => "AES",
        }
    }

    pub fn block_size(self) -> usize {
        match self {
            CipherAlgorithm::Aes => AES_BLOCK_SIZE,
        }
    }

    /// Concrete algorithm identifier for a key of `key_len` bytes, e.g. `AES-256`.
    pub fn qualified_name(self, key_len: usize) -> String {
        format!("{}-{}", self.name(), key_len.saturating_mul(8))
    }
}

/// Chaining mode named by `cipherChaining`.
///
/// `ChainingModeCFB` is recognised so it can be reported precisely, but only CBC is implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainingMode {
    Cbc,
    Cfb,
}

impl ChainingMode {
    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim() {
            "ChainingModeCBC" => Ok(ChainingMode::Cbc),
            "ChainingModeCFB" => Ok(ChainingMode::Cfb),
            other => Err(OffcryptoError::UnsupportedCipherChaining(other.to_string())),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ChainingMode::Cbc => "ChainingModeCBC",
            ChainingMode::Cfb => "ChainingModeCFB",
        }
    }

    /// Fail with [`OffcryptoError::UnsupportedCipherChaining`] unless this is CBC.
    pub fn require_cbc(self) -> Result<()> {
        match self {
            ChainingMode::Cbc => Ok(()),
            other => Err(OffcryptoError::UnsupportedCipherChaining(
                other.name().to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherOperation {
    Encrypt,
    Decrypt,
}

/// Fixed 8-byte protocol constants appended before the final hash of a key derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKey {
    /// Unwraps `encryptedKeyValue` (the package key).
    KeyValue,
    /// Decrypts `encryptedVerifierHashInput`.
    VerifierHashInput,
    /// Decrypts `encryptedVerifierHashValue`.
    VerifierHashValue,
    /// IV derivation for `dataIntegrity/encryptedHmacKey`.
    HmacKey,
    /// IV derivation for `dataIntegrity/encryptedHmacValue`.
    HmacValue,
}

impl BlockKey {
    pub const fn bytes(self) -> [u8; 8] {
        match self {
            BlockKey::KeyValue => [0x14, 0x6E, 0x0B, 0xE7, 0xAB, 0xAC, 0xD0, 0xD6],
            BlockKey::VerifierHashInput => [0xFE, 0xA7, 0xD2, 0x76, 0x3B, 0x4B, 0x9E, 0x79],
            BlockKey::VerifierHashValue => [0xD7, 0xAA, 0x0F, 0x6D, 0x30, 0x61, 0x34, 0x4E],
            BlockKey::HmacKey => [0x5F, 0xB2, 0xAD, 0x01, 0x0C, 0xB9, 0xE1, 0xF6],
            BlockKey::HmacValue => [0xA0, 0x67, 0x7F, 0x02, 0xB2, 0x2C, 0x84, 0x33],
        }
    }
}

/// Block-cipher transform with padding disabled.
///
/// The caller supplies block-aligned input and interprets the output length. The key length
/// selects the concrete cipher (`AES-128`/`AES-192`/`AES-256`).
pub fn block_cipher(
    op: CipherOperation,
    cipher: CipherAlgorithm,
    chaining: ChainingMode,
    key: &[u8],
    iv: &[u8],
    input: &[u8],
) -> Result<Vec<u8>> {
    chaining.require_cbc()?;

    let block_size = cipher.block_size();
    if iv.len() != block_size {
        return Err(OffcryptoError::InvalidIvLength {
            len: iv.len(),
            expected: block_size,
        });
    }
    if input.len() % block_size != 0 {
        return Err(OffcryptoError::UnalignedInput {
            len: input.len(),
            block_size,
        });
    }

    if !matches!(key.len(), 16 | 24 | 32) {
        return Err(OffcryptoError::UnsupportedAlgorithm(
            cipher.qualified_name(key.len()),
        ));
    }

    let mut buf = input.to_vec();
    if buf.is_empty() {
        return Ok(buf);
    }

    match (key.len(), op) {
        (16, CipherOperation::Decrypt) => cbc_decrypt::<Aes128>(key, iv, &mut buf)?,
        (24, CipherOperation::Decrypt) => cbc_decrypt::<Aes192>(key, iv, &mut buf)?,
        (_, CipherOperation::Decrypt) => cbc_decrypt::<Aes256>(key, iv, &mut buf)?,
        (16, CipherOperation::Encrypt) => cbc_encrypt::<Aes128>(key, iv, &mut buf)?,
        (24, CipherOperation::Encrypt) => cbc_encrypt::<Aes192>(key, iv, &mut buf)?,
        (_, CipherOperation::Encrypt) => cbc_encrypt::<Aes256>(key, iv, &mut buf)?,
    }
    Ok(buf)
}

fn cbc_decrypt<C>(key: &[u8], iv: &[u8], buf: &mut [u8]) -> Result<()>
where
    C: BlockCipher + BlockDecryptMut + KeyInit,
{
    let len = buf.len();
    // Key and IV lengths were validated by the caller, so `InvalidLength` means the key.
    let dec = cbc::Decryptor::<C>::new_from_slices(key, iv).map_err(|_| {
        OffcryptoError::UnsupportedAlgorithm(CipherAlgorithm::Aes.qualified_name(key.len()))
    })?;
    dec.decrypt_padded_mut::<NoPadding>(buf)
        .map_err(|_| OffcryptoError::UnalignedInput {
            len,
            block_size: AES_BLOCK_SIZE,
        })?;
    Ok(())
}

fn cbc_encrypt<C>(key: &[u8], iv: &[u8], buf: &mut [u8]) -> Result<()>
where
    C: BlockCipher + BlockEncryptMut + KeyInit,
{
    let len = buf.len();
    let enc = cbc::Encryptor::<C>::new_from_slices(key, iv).map_err(|_| {
        OffcryptoError::UnsupportedAlgorithm(CipherAlgorithm::Aes.qualified_name(key.len()))
    })?;
    enc.encrypt_padded_mut::<NoPadding>(buf, len)
        .map_err(|_| OffcryptoError::UnalignedInput {
            len,
            block_size: AES_BLOCK_SIZE,
        })?;
    Ok(())
}

/// Keyed hash used by the `dataIntegrity` check.
pub fn hmac(hash: HashAlgorithm, key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    fn run<M: Mac + KeyInit>(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
        let mut mac = <M as KeyInit>::new_from_slice(key)
            .map_err(|_| OffcryptoError::malformed("invalid HMAC key length"))?;
        mac.update(data);
        Ok(mac.finalize().into_bytes().to_vec())
    }

    match hash {
        HashAlgorithm::Md5 => run::<Hmac<md5::Md5>>(key, data),
        HashAlgorithm::Sha1 => run::<Hmac<sha1::Sha1>>(key, data),
        HashAlgorithm::Sha256 => run::<Hmac<sha2::Sha256>>(key, data),
        HashAlgorithm::Sha384 => run::<Hmac<sha2::Sha384>>(key, data),
        HashAlgorithm::Sha512 => run::<Hmac<sha2::Sha512>>(key, data),
    }
}

/// Constant-time equality for verifier and HMAC comparisons.
pub(crate) fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq as _;
    a.len() == b.len() && bool::from(a.ct_eq(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    // NIST SP 800-38A F.2 AES-CBC vectors.
    const PLAINTEXT: &str = concat!(
        "6bc1bee22e409f96e93d7e117393172a",
        "ae2d8a571e03ac9c9eb76fac45af8e51",
        "30c81c46a35ce411e5fbc1191a0a52ef",
        "f69f2445df4f9b17ad2b417be66c3710",
    );
    const IV: &str = "000102030405060708090a0b0c0d0e0f";

    fn unhex(s: &str) -> Vec<u8> {
        hex::decode(s).expect("valid hex")
    }

    #[test]
    fn aes_128_cbc_matches_nist_vector() {
        let key = unhex("2b7e151628aed2a6abf7158809cf4f3c");
        let ciphertext = unhex(concat!(
            "7649abac8119b246cee98e9b12e9197d",
            "5086cb9b507219ee95db113a917678b2",
            "73bed6b8e3c1743b7116e69e22229516",
            "3ff1caa1681fac09120eca307586e1a7",
        ));

        let plaintext = block_cipher(
            CipherOperation::Decrypt,
            CipherAlgorithm::Aes,
            ChainingMode::Cbc,
            &key,
            &unhex(IV),
            &ciphertext,
        )
        .expect("decrypt");
        assert_eq!(plaintext, unhex(PLAINTEXT));

        let reencrypted = block_cipher(
            CipherOperation::Encrypt,
            CipherAlgorithm::Aes,
            ChainingMode::Cbc,
            &key,
            &unhex(IV),
            &plaintext,
        )
        .expect("encrypt");
        assert_eq!(reencrypted, ciphertext);
    }

    #[test]
    fn aes_256_cbc_matches_nist_vector() {
        let key = unhex(concat!(
            "603deb1015ca71be2b73aef0857d7781",
            "1f352c073b6108d72d9810a30914dff4",
        ));
        let ciphertext = unhex(concat!(
            "f58c4c04d6e5f1ba779eabfb5f7bfbd6",
            "9cfc4e967edb808d679f777bc6702c7d",
            "39f23369a9d9bacfa530e26304231461",
            "b2eb05e2c39be9fcda6c19078c6a9d1b",
        ));

        let plaintext = block_cipher(
            CipherOperation::Decrypt,
            CipherAlgorithm::Aes,
            ChainingMode::Cbc,
            &key,
            &unhex(IV),
            &ciphertext,
        )
        .expect("decrypt");
        assert_eq!(plaintext, unhex(PLAINTEXT));
    }

    #[test]
    fn cfb_chaining_is_rejected_by_the_cipher() {
        let err = block_cipher(
            CipherOperation::Decrypt,
            CipherAlgorithm::Aes,
            ChainingMode::Cfb,
            &[0u8; 16],
            &[0u8; 16],
            &[0u8; 16],
        )
        .unwrap_err();
        assert!(
            matches!(err, OffcryptoError::UnsupportedCipherChaining(ref c) if c == "ChainingModeCFB"),
            "got {err:?}"
        );
    }

    #[test]
    fn unsupported_key_length_reports_qualified_name() {
        let err = block_cipher(
            CipherOperation::Decrypt,
            CipherAlgorithm::Aes,
            ChainingMode::Cbc,
            &[0u8; 20],
            &[0u8; 16],
            &[0u8; 16],
        )
        .unwrap_err();
        assert!(
            matches!(err, OffcryptoError::UnsupportedAlgorithm(ref name) if name == "AES-160"),
            "got {err:?}"
        );
    }

    #[test]
    fn rejects_unaligned_input_and_bad_iv() {
        let err = block_cipher(
            CipherOperation::Decrypt,
            CipherAlgorithm::Aes,
            ChainingMode::Cbc,
            &[0u8; 16],
            &[0u8; 16],
            &[0u8; 15],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            OffcryptoError::UnalignedInput {
                len: 15,
                block_size: 16
            }
        ));

        let err = block_cipher(
            CipherOperation::Decrypt,
            CipherAlgorithm::Aes,
            ChainingMode::Cbc,
            &[0u8; 16],
            &[0u8; 8],
            &[0u8; 16],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            OffcryptoError::InvalidIvLength {
                len: 8,
                expected: 16
            }
        ));
    }

    #[test]
    fn hash_concatenates_parts() {
        assert_eq!(
            HashAlgorithm::Sha1.hash(&[b"a", b"bc"]),
            unhex("a9993e364706816aba3e25717850c26c9cd0d89d")
        );
        assert_eq!(
            HashAlgorithm::Sha1.hash(&[b"abc"]),
            HashAlgorithm::Sha1.hash(&[b"ab", b"", b"c"])
        );
        for alg in [
            HashAlgorithm::Md5,
            HashAlgorithm::Sha1,
            HashAlgorithm::Sha256,
            HashAlgorithm::Sha384,
            HashAlgorithm::Sha512,
        ] {
            assert_eq!(alg.hash(&[b"x"]).len(), alg.digest_len());
        }
    }

    #[test]
    fn parses_algorithm_names() {
        assert_eq!(HashAlgorithm::from_name("SHA512").unwrap(), HashAlgorithm::Sha512);
        assert_eq!(HashAlgorithm::from_name("sha-256").unwrap(), HashAlgorithm::Sha256);
        assert_eq!(HashAlgorithm::from_name("MD5").unwrap(), HashAlgorithm::Md5);
        assert!(matches!(
            HashAlgorithm::from_name("RIPEMD-160"),
            Err(OffcryptoError::UnsupportedAlgorithm(_))
        ));

        assert_eq!(CipherAlgorithm::from_name("aes").unwrap(), CipherAlgorithm::Aes);
        assert!(matches!(
            CipherAlgorithm::from_name("RC2"),
            Err(OffcryptoError::UnsupportedAlgorithm(_))
        ));

        assert_eq!(
            ChainingMode::from_name("ChainingModeCFB").unwrap(),
            ChainingMode::Cfb
        );
        assert!(matches!(
            ChainingMode::from_name("ChainingModeECB"),
            Err(OffcryptoError::UnsupportedCipherChaining(_))
        ));
    }

    #[test]
    fn hmac_sha256_matches_rfc4231_case_2() {
        let mac = hmac(
            HashAlgorithm::Sha256,
            b"Jefe",
            b"what do ya want for nothing?",
        )
        .expect("hmac");
        assert_eq!(
            mac,
            unhex("5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843")
        );
    }
}
