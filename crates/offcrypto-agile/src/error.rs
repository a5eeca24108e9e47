use thiserror::Error;

/// Result type for Agile decryption operations.
pub type Result<T> = std::result::Result<T, OffcryptoError>;

/// Errors returned while parsing, decrypting or encrypting Agile-encrypted OOXML packages.
///
/// Every variant is fatal to the call that produced it. The operations are deterministic, so
/// retrying with the same inputs cannot succeed.
#[derive(Debug, Error)]
pub enum OffcryptoError {
    // --- Descriptor ------------------------------------------------------------------------------
    /// A required `EncryptionInfo` element or attribute is missing or unparsable.
    #[error("malformed EncryptionInfo descriptor: {0}")]
    MalformedDescriptor(String),

    #[error(
        "unsupported EncryptionInfo version {major}.{minor}; only Agile Encryption (4.4) is supported"
    )]
    UnsupportedVersion { major: u16, minor: u16 },

    #[error("spinCount {spin_count} exceeds maximum allowed {max} (refusing to run expensive password KDF)")]
    SpinCountTooLarge { spin_count: u32, max: u32 },

    // --- Primitives ------------------------------------------------------------------------------
    /// Hash or cipher algorithm (including the cipher/key-size combination) is not available.
    #[error("unsupported algorithm `{0}`")]
    UnsupportedAlgorithm(String),

    #[error("unsupported cipher chaining `{0}`; only `ChainingModeCBC` is supported")]
    UnsupportedCipherChaining(String),

    #[error("cipher input length {len} is not a multiple of the {block_size}-byte block size")]
    UnalignedInput { len: usize, block_size: usize },

    #[error("invalid IV length {len} bytes (expected {expected})")]
    InvalidIvLength { len: usize, expected: usize },

    // --- EncryptedPackage ------------------------------------------------------------------------
    #[error("EncryptedPackage stream is too short ({len} bytes; expected at least 8)")]
    EncryptedPackageTooShort { len: usize },

    #[error("EncryptedPackage payload of {len} bytes is too large")]
    EncryptedPackageTooLarge { len: usize },

    #[error(
        "EncryptedPackage declares {declared_len} plaintext bytes but only {available_len} bytes were decrypted"
    )]
    DeclaredLengthExceedsPayload {
        declared_len: usize,
        available_len: usize,
    },

    // --- Opt-in verification ---------------------------------------------------------------------
    #[error("invalid password")]
    InvalidPassword,

    #[error("data integrity check failed (EncryptedPackage HMAC mismatch)")]
    IntegrityCheckFailed,

    // --- OLE/CFB container -----------------------------------------------------------------------
    #[error("missing required OLE stream `{0}`")]
    MissingStream(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl OffcryptoError {
    pub(crate) fn malformed(context: impl Into<String>) -> Self {
        OffcryptoError::MalformedDescriptor(context.into())
    }
}
