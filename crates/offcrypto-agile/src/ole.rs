//! OLE/CFB container helpers.
//!
//! An encrypted OOXML document is a compound file holding the `EncryptionInfo` and
//! `EncryptedPackage` streams at its root.

use std::io::{Cursor, Read, Seek, Write as _};

use crate::error::{OffcryptoError, Result};
use crate::writer::EncryptedDocument;
use crate::{decrypt_with_options, DecryptOptions};

const OLE_MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

pub const ENCRYPTION_INFO_STREAM: &str = "EncryptionInfo";
pub const ENCRYPTED_PACKAGE_STREAM: &str = "EncryptedPackage";

/// Returns true if `bytes` look like an OLE/CFB container holding an encrypted OOXML package.
pub fn is_encrypted_ooxml_ole(bytes: &[u8]) -> bool {
    if !bytes.starts_with(&OLE_MAGIC) {
        return false;
    }

    let Ok(mut ole) = cfb::CompoundFile::open(Cursor::new(bytes)) else {
        return false;
    };

    stream_exists(&mut ole, ENCRYPTION_INFO_STREAM)
        && stream_exists(&mut ole, ENCRYPTED_PACKAGE_STREAM)
}

/// Read the `EncryptionInfo` and `EncryptedPackage` streams out of an OLE/CFB container.
pub fn read_encrypted_streams(bytes: &[u8]) -> Result<EncryptedDocument> {
    let mut ole = cfb::CompoundFile::open(Cursor::new(bytes))?;
    Ok(EncryptedDocument {
        encryption_info: read_stream(&mut ole, ENCRYPTION_INFO_STREAM)?,
        encrypted_package: read_stream(&mut ole, ENCRYPTED_PACKAGE_STREAM)?,
    })
}

/// Decrypt an encrypted OOXML OLE/CFB container and return the raw package bytes.
pub fn decrypt_ole(bytes: &[u8], password: &str, opts: &DecryptOptions) -> Result<Vec<u8>> {
    let streams = read_encrypted_streams(bytes)?;
    decrypt_with_options(
        &streams.encryption_info,
        &streams.encrypted_package,
        password,
        opts,
    )
}

/// Wrap an encrypted document's streams into a new OLE/CFB container.
pub fn encrypt_to_ole(document: &EncryptedDocument) -> Result<Vec<u8>> {
    let mut ole = cfb::CompoundFile::create(Cursor::new(Vec::new()))?;
    ole.create_stream(ENCRYPTION_INFO_STREAM)?
        .write_all(&document.encryption_info)?;
    ole.create_stream(ENCRYPTED_PACKAGE_STREAM)?
        .write_all(&document.encrypted_package)?;
    ole.flush()?;
    Ok(ole.into_inner().into_inner())
}

fn stream_exists<R: Read + Seek>(ole: &mut cfb::CompoundFile<R>, name: &str) -> bool {
    ole.open_stream(name).is_ok()
}

fn read_stream<R: Read + Seek>(ole: &mut cfb::CompoundFile<R>, name: &str) -> Result<Vec<u8>> {
    let mut stream = ole
        .open_stream(name)
        .map_err(|_| OffcryptoError::MissingStream(name.to_string()))?;
    let mut out = Vec::new();
    stream.read_to_end(&mut out)?;
    Ok(out)
}
