//! Agile `EncryptionInfo` descriptor parsing (MS-OFFCRYPTO version 4.4).
//!
//! The stream is an 8-byte `EncryptionVersionInfo` prefix followed by a UTF-8 XML document:
//!
//! ```text
//! <encryption>
//!   <keyData cipherAlgorithm=.. cipherChaining=.. saltValue=.. hashAlgorithm=.. blockSize=../>
//!   <dataIntegrity encryptedHmacKey=.. encryptedHmacValue=../>            (optional)
//!   <keyEncryptors>
//!     <keyEncryptor uri="http://schemas.microsoft.com/office/2006/keyEncryptor/password">
//!       <p:encryptedKey encryptedKeyValue=.. spinCount=.. keyBits=.. .../>
//!     </keyEncryptor>
//!   </keyEncryptors>
//! </encryption>
//! ```

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine as _;

use crate::error::{OffcryptoError, Result};
use crate::primitives::{ChainingMode, CipherAlgorithm, HashAlgorithm};

/// Size of the `EncryptionVersionInfo` prefix in front of the XML payload.
pub const ENCRYPTION_INFO_PREFIX_LEN: usize = 8;

/// `keyEncryptor@uri` of the password key encryptor.
pub const PASSWORD_KEY_ENCRYPTOR_URI: &str =
    "http://schemas.microsoft.com/office/2006/keyEncryptor/password";

/// Parsed `EncryptionVersionInfo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptionVersion {
    pub major: u16,
    pub minor: u16,
    pub flags: u32,
}

/// `keyData`: parameters of the package (content) encryption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyData {
    pub cipher_algorithm: CipherAlgorithm,
    pub cipher_chaining: ChainingMode,
    pub salt_value: Vec<u8>,
    pub hash_algorithm: HashAlgorithm,
    pub block_size: usize,
    pub key_bits: Option<usize>,
}

/// Password `encryptedKey`: parameters of the password-derived key and the wrapped package key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordKeyEncryptor {
    pub encrypted_key_value: Vec<u8>,
    pub cipher_algorithm: CipherAlgorithm,
    pub cipher_chaining: ChainingMode,
    pub salt_value: Vec<u8>,
    pub hash_algorithm: HashAlgorithm,
    pub spin_count: u32,
    pub key_bits: usize,
    pub block_size: Option<usize>,
    pub encrypted_verifier_hash_input: Option<Vec<u8>>,
    pub encrypted_verifier_hash_value: Option<Vec<u8>>,
}

impl PasswordKeyEncryptor {
    /// Length in bytes of the password-derived key.
    pub fn key_len(&self) -> usize {
        self.key_bits / 8
    }
}

/// `dataIntegrity`: the wrapped HMAC key and value over the `EncryptedPackage` stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataIntegrity {
    pub encrypted_hmac_key: Vec<u8>,
    pub encrypted_hmac_value: Vec<u8>,
}

/// Everything needed to decrypt an Agile-encrypted package with a password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionDescriptor {
    pub version: EncryptionVersion,
    pub package: KeyData,
    pub key: PasswordKeyEncryptor,
    pub data_integrity: Option<DataIntegrity>,
}

/// Parse an Agile `EncryptionInfo` stream (including its 8-byte version prefix).
pub fn parse_descriptor(encryption_info: &[u8]) -> Result<EncryptionDescriptor> {
    let version = parse_version(encryption_info)?;
    if (version.major, version.minor) != (4, 4) {
        return Err(OffcryptoError::UnsupportedVersion {
            major: version.major,
            minor: version.minor,
        });
    }

    let xml = decode_xml_text(&encryption_info[ENCRYPTION_INFO_PREFIX_LEN..])?;
    let doc = roxmltree::Document::parse(xml)
        .map_err(|err| OffcryptoError::malformed(format!("invalid XML: {err}")))?;

    let key_data_node = find_element(doc.root(), "keyData")
        .ok_or_else(|| OffcryptoError::malformed("missing <keyData> element"))?;
    let package = parse_key_data(key_data_node)?;

    let encrypted_key_node = select_password_encrypted_key(doc.root())?;
    let key = parse_password_key_encryptor(encrypted_key_node)?;

    let data_integrity = find_element(doc.root(), "dataIntegrity")
        .map(parse_data_integrity)
        .transpose()?;

    log::debug!(
        "parsed agile descriptor: cipher={}-{} hash={} blockSize={} spinCount={} keyHash={} integrity={}",
        package.cipher_algorithm.name(),
        key.key_bits,
        package.hash_algorithm,
        package.block_size,
        key.spin_count,
        key.hash_algorithm,
        data_integrity.is_some()
    );

    Ok(EncryptionDescriptor {
        version,
        package,
        key,
        data_integrity,
    })
}

fn parse_version(bytes: &[u8]) -> Result<EncryptionVersion> {
    let Some(prefix) = bytes.get(..ENCRYPTION_INFO_PREFIX_LEN) else {
        return Err(OffcryptoError::malformed(format!(
            "EncryptionInfo stream is {} bytes; expected at least {ENCRYPTION_INFO_PREFIX_LEN}",
            bytes.len()
        )));
    };
    Ok(EncryptionVersion {
        major: u16::from_le_bytes([prefix[0], prefix[1]]),
        minor: u16::from_le_bytes([prefix[2], prefix[3]]),
        flags: u32::from_le_bytes([prefix[4], prefix[5], prefix[6], prefix[7]]),
    })
}

fn decode_xml_text(payload: &[u8]) -> Result<&str> {
    // Some producers pad the stream with trailing NULs.
    let end = payload
        .iter()
        .rposition(|b| *b != 0)
        .map_or(0, |idx| idx + 1);
    let text = std::str::from_utf8(&payload[..end])
        .map_err(|err| OffcryptoError::malformed(format!("XML is not valid UTF-8: {err}")))?;
    Ok(text.strip_prefix('\u{feff}').unwrap_or(text))
}

fn find_element<'a, 'input>(
    node: roxmltree::Node<'a, 'input>,
    local_name: &str,
) -> Option<roxmltree::Node<'a, 'input>> {
    node.descendants()
        .find(|n| n.is_element() && n.tag_name().name() == local_name)
}

fn child_elements<'a, 'input>(
    node: roxmltree::Node<'a, 'input>,
    local_name: &'static str,
) -> impl Iterator<Item = roxmltree::Node<'a, 'input>> {
    node.children()
        .filter(move |n| n.is_element() && n.tag_name().name() == local_name)
}

/// Pick the `encryptedKey` of the password key encryptor.
///
/// The first `keyEncryptor` whose `uri` is the password URI wins; when none declares that URI
/// (some producers omit it) the first `keyEncryptor` is used.
fn select_password_encrypted_key<'a, 'input>(
    root: roxmltree::Node<'a, 'input>,
) -> Result<roxmltree::Node<'a, 'input>> {
    let key_encryptors = find_element(root, "keyEncryptors")
        .ok_or_else(|| OffcryptoError::malformed("missing <keyEncryptors> element"))?;

    let encryptors: Vec<_> = child_elements(key_encryptors, "keyEncryptor").collect();
    if encryptors.is_empty() {
        return Err(OffcryptoError::malformed("missing <keyEncryptor> element"));
    }

    let password_encryptors: Vec<_> = encryptors
        .iter()
        .copied()
        .filter(|n| n.attribute("uri") == Some(PASSWORD_KEY_ENCRYPTOR_URI))
        .collect();
    if password_encryptors.len() > 1 {
        log::warn!(
            "EncryptionInfo declares {} password key encryptors; using the first",
            password_encryptors.len()
        );
    }

    let encryptor = password_encryptors
        .first()
        .or_else(|| encryptors.first())
        .copied()
        .ok_or_else(|| OffcryptoError::malformed("missing <keyEncryptor> element"))?;

    child_elements(encryptor, "encryptedKey")
        .next()
        .ok_or_else(|| OffcryptoError::malformed("missing <keyEncryptor>/<encryptedKey> element"))
}

fn parse_key_data(node: roxmltree::Node<'_, '_>) -> Result<KeyData> {
    const ELEMENT: &str = "keyData";
    let block_size = parse_usize_attr(ELEMENT, node, "blockSize")?;
    if block_size == 0 {
        return Err(OffcryptoError::malformed("keyData.blockSize must be non-zero"));
    }

    Ok(KeyData {
        cipher_algorithm: parse_cipher_algorithm(ELEMENT, node)?,
        cipher_chaining: parse_cbc_chaining(ELEMENT, node)?,
        salt_value: decode_b64_attr(ELEMENT, node, "saltValue")?,
        hash_algorithm: parse_hash_algorithm(ELEMENT, node)?,
        block_size,
        key_bits: parse_optional_usize_attr(ELEMENT, node, "keyBits")?,
    })
}

fn parse_password_key_encryptor(node: roxmltree::Node<'_, '_>) -> Result<PasswordKeyEncryptor> {
    const ELEMENT: &str = "encryptedKey";
    let key_bits = parse_usize_attr(ELEMENT, node, "keyBits")?;
    if key_bits == 0 || key_bits % 8 != 0 {
        return Err(OffcryptoError::malformed(format!(
            "encryptedKey.keyBits must be a non-zero multiple of 8, got {key_bits}"
        )));
    }

    Ok(PasswordKeyEncryptor {
        encrypted_key_value: decode_b64_attr(ELEMENT, node, "encryptedKeyValue")?,
        cipher_algorithm: parse_cipher_algorithm(ELEMENT, node)?,
        cipher_chaining: parse_cbc_chaining(ELEMENT, node)?,
        salt_value: decode_b64_attr(ELEMENT, node, "saltValue")?,
        hash_algorithm: parse_hash_algorithm(ELEMENT, node)?,
        spin_count: parse_u32_attr(ELEMENT, node, "spinCount")?,
        key_bits,
        block_size: parse_optional_usize_attr(ELEMENT, node, "blockSize")?,
        encrypted_verifier_hash_input: decode_optional_b64_attr(
            ELEMENT,
            node,
            "encryptedVerifierHashInput",
        )?,
        encrypted_verifier_hash_value: decode_optional_b64_attr(
            ELEMENT,
            node,
            "encryptedVerifierHashValue",
        )?,
    })
}

fn parse_data_integrity(node: roxmltree::Node<'_, '_>) -> Result<DataIntegrity> {
    const ELEMENT: &str = "dataIntegrity";
    Ok(DataIntegrity {
        encrypted_hmac_key: decode_b64_attr(ELEMENT, node, "encryptedHmacKey")?,
        encrypted_hmac_value: decode_b64_attr(ELEMENT, node, "encryptedHmacValue")?,
    })
}

fn required_attr<'a>(element: &str, node: roxmltree::Node<'a, '_>, attr: &str) -> Result<&'a str> {
    node.attribute(attr).ok_or_else(|| {
        OffcryptoError::malformed(format!("missing required attribute `{element}.{attr}`"))
    })
}

fn parse_hash_algorithm(element: &str, node: roxmltree::Node<'_, '_>) -> Result<HashAlgorithm> {
    HashAlgorithm::from_name(required_attr(element, node, "hashAlgorithm")?)
}

fn parse_cipher_algorithm(
    element: &str,
    node: roxmltree::Node<'_, '_>,
) -> Result<CipherAlgorithm> {
    CipherAlgorithm::from_name(required_attr(element, node, "cipherAlgorithm")?)
}

/// Non-CBC chaining is rejected here, at the boundary, rather than deep inside the cipher.
fn parse_cbc_chaining(element: &str, node: roxmltree::Node<'_, '_>) -> Result<ChainingMode> {
    let mode = ChainingMode::from_name(required_attr(element, node, "cipherChaining")?)?;
    mode.require_cbc()?;
    Ok(mode)
}

fn parse_u32_attr(element: &str, node: roxmltree::Node<'_, '_>, attr: &str) -> Result<u32> {
    let raw = required_attr(element, node, attr)?;
    raw.trim().parse::<u32>().map_err(|err| {
        OffcryptoError::malformed(format!("`{element}.{attr}`: expected u32, got {raw:?}: {err}"))
    })
}

fn parse_usize_attr(element: &str, node: roxmltree::Node<'_, '_>, attr: &str) -> Result<usize> {
    let raw = required_attr(element, node, attr)?;
    parse_usize_value(element, attr, raw)
}

fn parse_optional_usize_attr(
    element: &str,
    node: roxmltree::Node<'_, '_>,
    attr: &str,
) -> Result<Option<usize>> {
    node.attribute(attr)
        .map(|raw| parse_usize_value(element, attr, raw))
        .transpose()
}

fn parse_usize_value(element: &str, attr: &str, raw: &str) -> Result<usize> {
    raw.trim().parse::<usize>().map_err(|err| {
        OffcryptoError::malformed(format!(
            "`{element}.{attr}`: expected an integer, got {raw:?}: {err}"
        ))
    })
}

fn decode_b64_attr(element: &str, node: roxmltree::Node<'_, '_>, attr: &str) -> Result<Vec<u8>> {
    let raw = required_attr(element, node, attr)?;
    decode_b64_value(element, attr, raw)
}

fn decode_optional_b64_attr(
    element: &str,
    node: roxmltree::Node<'_, '_>,
    attr: &str,
) -> Result<Option<Vec<u8>>> {
    node.attribute(attr)
        .map(|raw| decode_b64_value(element, attr, raw))
        .transpose()
}

fn decode_b64_value(element: &str, attr: &str, raw: &str) -> Result<Vec<u8>> {
    // Pretty-printed descriptors may wrap long base64 values, and some producers omit `=`
    // padding.
    let cleaned: Vec<u8> = raw
        .bytes()
        .filter(|b| !matches!(b, b'\r' | b'\n' | b'\t' | b' '))
        .collect();
    STANDARD
        .decode(&cleaned)
        .or_else(|_| STANDARD_NO_PAD.decode(&cleaned))
        .map_err(|err| {
            OffcryptoError::malformed(format!("`{element}.{attr}`: invalid base64: {err}"))
        })
}
