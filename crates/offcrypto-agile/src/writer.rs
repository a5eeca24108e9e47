//! Agile encryption of an OOXML package (the inverse of [`crate::decrypt`]).
//!
//! Produces the two streams of an encrypted document: an `EncryptionInfo` descriptor carrying the
//! password verifier and `dataIntegrity` HMAC, and the chunked `EncryptedPackage`.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rand::{CryptoRng, RngCore};
use zeroize::Zeroizing;

use crate::derive::{derive_iv, finalize_key, iterated_hash};
use crate::descriptor::{KeyData, PasswordKeyEncryptor, PASSWORD_KEY_ENCRYPTOR_URI};
use crate::error::{OffcryptoError, Result};
use crate::package::encrypt_package;
use crate::primitives::{
    block_cipher, hmac, BlockKey, ChainingMode, CipherAlgorithm, CipherOperation, HashAlgorithm,
};
use crate::unwrap::wrap_key;
use crate::EncryptOptions;

const SALT_LEN: usize = 16;

/// `EncryptionVersionInfo` for Agile encryption: version 4.4, reserved flags `0x40`.
const AGILE_VERSION_PREFIX: [u8; 8] = [0x04, 0x00, 0x04, 0x00, 0x40, 0x00, 0x00, 0x00];

/// The two streams of an Agile-encrypted document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedDocument {
    pub encryption_info: Vec<u8>,
    pub encrypted_package: Vec<u8>,
}

/// Encrypt `plaintext` under `password`, drawing keys and salts from `rng`.
pub fn encrypt_document<R>(
    plaintext: &[u8],
    password: &str,
    opts: &EncryptOptions,
    rng: &mut R,
) -> Result<EncryptedDocument>
where
    R: RngCore + CryptoRng + ?Sized,
{
    if !matches!(opts.key_bits, 128 | 192 | 256) {
        return Err(OffcryptoError::UnsupportedAlgorithm(
            CipherAlgorithm::Aes.qualified_name(opts.key_bits / 8),
        ));
    }
    let hash = opts.hash_algorithm;
    let key_len = opts.key_bits / 8;
    let block_size = CipherAlgorithm::Aes.block_size();

    let package_key = Zeroizing::new(random_bytes(rng, key_len));
    let verifier_input = Zeroizing::new(random_bytes(rng, SALT_LEN));
    let hmac_key = Zeroizing::new(random_bytes(rng, hash.digest_len()));

    let package = KeyData {
        cipher_algorithm: CipherAlgorithm::Aes,
        cipher_chaining: ChainingMode::Cbc,
        salt_value: random_bytes(rng, SALT_LEN),
        hash_algorithm: hash,
        block_size,
        key_bits: Some(opts.key_bits),
    };
    let mut key = PasswordKeyEncryptor {
        encrypted_key_value: Vec::new(),
        cipher_algorithm: CipherAlgorithm::Aes,
        cipher_chaining: ChainingMode::Cbc,
        salt_value: random_bytes(rng, SALT_LEN),
        hash_algorithm: hash,
        spin_count: opts.spin_count,
        key_bits: opts.key_bits,
        block_size: Some(block_size),
        encrypted_verifier_hash_input: None,
        encrypted_verifier_hash_value: None,
    };

    log::debug!(
        "encrypting {} bytes: {}-{} {hash} spinCount={}",
        plaintext.len(),
        CipherAlgorithm::Aes.name(),
        opts.key_bits,
        opts.spin_count
    );

    let h = iterated_hash(password, hash, &key.salt_value, opts.spin_count);
    let password_cipher = |block_key: BlockKey, plain: &[u8]| -> Result<Vec<u8>> {
        let field_key = finalize_key(&h, hash, opts.key_bits, block_key)?;
        block_cipher(
            CipherOperation::Encrypt,
            key.cipher_algorithm,
            key.cipher_chaining,
            &field_key,
            &key.salt_value,
            &pad_to_block(plain, block_size),
        )
    };
    let encrypted_verifier_hash_input =
        password_cipher(BlockKey::VerifierHashInput, &verifier_input)?;
    let encrypted_verifier_hash_value = password_cipher(
        BlockKey::VerifierHashValue,
        &hash.hash(&[verifier_input.as_slice()]),
    )?;
    key.encrypted_verifier_hash_input = Some(encrypted_verifier_hash_input);
    key.encrypted_verifier_hash_value = Some(encrypted_verifier_hash_value);

    let password_key = finalize_key(&h, hash, opts.key_bits, BlockKey::KeyValue)?;
    key.encrypted_key_value = wrap_key(&password_key, &key, &package_key)?;

    let encrypted_package = encrypt_package(&package_key, &package, plaintext)?;

    let package_cipher = |block_key: BlockKey, plain: &[u8]| -> Result<Vec<u8>> {
        let iv = derive_iv(hash, &package.salt_value, &block_key.bytes(), block_size);
        block_cipher(
            CipherOperation::Encrypt,
            package.cipher_algorithm,
            package.cipher_chaining,
            &package_key,
            &iv,
            &pad_to_block(plain, block_size),
        )
    };
    let hmac_value = hmac(hash, &hmac_key, &encrypted_package)?;
    let encrypted_hmac_key = package_cipher(BlockKey::HmacKey, &hmac_key)?;
    let encrypted_hmac_value = package_cipher(BlockKey::HmacValue, &hmac_value)?;

    let xml = descriptor_xml(&package, &key, &encrypted_hmac_key, &encrypted_hmac_value);
    let mut encryption_info = Vec::with_capacity(AGILE_VERSION_PREFIX.len() + xml.len());
    encryption_info.extend_from_slice(&AGILE_VERSION_PREFIX);
    encryption_info.extend_from_slice(xml.as_bytes());

    Ok(EncryptedDocument {
        encryption_info,
        encrypted_package,
    })
}

fn random_bytes<R: RngCore + ?Sized>(rng: &mut R, len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len];
    rng.fill_bytes(&mut out);
    out
}

fn pad_to_block(bytes: &[u8], block_size: usize) -> Zeroizing<Vec<u8>> {
    let mut out = Zeroizing::new(bytes.to_vec());
    let rem = out.len() % block_size;
    if rem != 0 {
        out.resize(bytes.len() + block_size - rem, 0);
    }
    out
}

fn descriptor_xml(
    package: &KeyData,
    key: &PasswordKeyEncryptor,
    encrypted_hmac_key: &[u8],
    encrypted_hmac_value: &[u8],
) -> String {
    let b64 = |bytes: &[u8]| BASE64.encode(bytes);
    let hash_size = |hash: HashAlgorithm| hash.digest_len();
    let optional_b64 = |bytes: &Option<Vec<u8>>| bytes.as_deref().map(b64).unwrap_or_default();

    format!(
        concat!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\r\n",
            "<encryption xmlns=\"http://schemas.microsoft.com/office/2006/encryption\" ",
            "xmlns:p=\"http://schemas.microsoft.com/office/2006/keyEncryptor/password\">",
            "<keyData saltSize=\"{pkg_salt_size}\" blockSize=\"{pkg_block_size}\" ",
            "keyBits=\"{key_bits}\" hashSize=\"{pkg_hash_size}\" cipherAlgorithm=\"{pkg_cipher}\" ",
            "cipherChaining=\"{pkg_chaining}\" hashAlgorithm=\"{pkg_hash}\" saltValue=\"{pkg_salt}\"/>",
            "<dataIntegrity encryptedHmacKey=\"{hmac_key}\" encryptedHmacValue=\"{hmac_value}\"/>",
            "<keyEncryptors><keyEncryptor uri=\"{uri}\">",
            "<p:encryptedKey spinCount=\"{spin_count}\" saltSize=\"{key_salt_size}\" ",
            "blockSize=\"{pkg_block_size}\" keyBits=\"{key_bits}\" hashSize=\"{key_hash_size}\" ",
            "cipherAlgorithm=\"{key_cipher}\" cipherChaining=\"{key_chaining}\" ",
            "hashAlgorithm=\"{key_hash}\" saltValue=\"{key_salt}\" ",
            "encryptedVerifierHashInput=\"{verifier_input}\" ",
            "encryptedVerifierHashValue=\"{verifier_value}\" ",
            "encryptedKeyValue=\"{key_value}\"/>",
            "</keyEncryptor></keyEncryptors></encryption>",
        ),
        pkg_salt_size = package.salt_value.len(),
        pkg_block_size = package.block_size,
        key_bits = key.key_bits,
        pkg_hash_size = hash_size(package.hash_algorithm),
        pkg_cipher = package.cipher_algorithm.name(),
        pkg_chaining = package.cipher_chaining.name(),
        pkg_hash = package.hash_algorithm.name(),
        pkg_salt = b64(&package.salt_value),
        hmac_key = b64(encrypted_hmac_key),
        hmac_value = b64(encrypted_hmac_value),
        uri = PASSWORD_KEY_ENCRYPTOR_URI,
        spin_count = key.spin_count,
        key_salt_size = key.salt_value.len(),
        key_hash_size = hash_size(key.hash_algorithm),
        key_cipher = key.cipher_algorithm.name(),
        key_chaining = key.cipher_chaining.name(),
        key_hash = key.hash_algorithm.name(),
        key_salt = b64(&key.salt_value),
        verifier_input = optional_b64(&key.encrypted_verifier_hash_input),
        verifier_value = optional_b64(&key.encrypted_verifier_hash_value),
        key_value = b64(&key.encrypted_key_value),
    )
}
