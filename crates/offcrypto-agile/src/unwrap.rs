use zeroize::Zeroizing;

use crate::descriptor::PasswordKeyEncryptor;
use crate::error::Result;
use crate::primitives::{block_cipher, CipherOperation};

/// Recover the package key from `encryptedKeyValue`.
///
/// The password key decrypts `encryptedKeyValue` with `saltValue` as IV. The output is returned
/// untruncated; a wrong password silently yields a wrong key.
pub fn unwrap_key(password_key: &[u8], key: &PasswordKeyEncryptor) -> Result<Zeroizing<Vec<u8>>> {
    let package_key = block_cipher(
        CipherOperation::Decrypt,
        key.cipher_algorithm,
        key.cipher_chaining,
        password_key,
        &key.salt_value,
        &key.encrypted_key_value,
    )?;
    Ok(Zeroizing::new(package_key))
}

/// Inverse of [`unwrap_key`]: encrypt a package key under the password key.
pub fn wrap_key(
    password_key: &[u8],
    key: &PasswordKeyEncryptor,
    package_key: &[u8],
) -> Result<Vec<u8>> {
    block_cipher(
        CipherOperation::Encrypt,
        key.cipher_algorithm,
        key.cipher_chaining,
        password_key,
        &key.salt_value,
        package_key,
    )
}
