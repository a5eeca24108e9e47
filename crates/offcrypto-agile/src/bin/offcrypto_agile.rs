use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use offcrypto_agile::{
    decrypt_ole, encrypt, encrypt_to_ole, is_encrypted_ooxml_ole, DecryptOptions, EncryptOptions,
    HashAlgorithm, DEFAULT_MAX_SPIN_COUNT,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(about = "Decrypt or encrypt password-protected OOXML documents (MS-OFFCRYPTO Agile Encryption).")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Decrypt an encrypted OLE container into the raw ZIP package.
    Decrypt {
        /// Encrypted document (OLE/CFB container).
        input: PathBuf,

        /// Where to write the decrypted package.
        output: PathBuf,

        #[command(flatten)]
        password: PasswordArgs,

        /// Fail with "invalid password" instead of writing garbage when the password is wrong.
        #[arg(long)]
        verify_password: bool,

        /// Check the `dataIntegrity` HMAC over the encrypted package.
        #[arg(long)]
        verify_integrity: bool,

        /// Refuse descriptors asking for more key-derivation rounds than this.
        #[arg(long, default_value_t = DEFAULT_MAX_SPIN_COUNT)]
        max_spin_count: u32,
    },
    /// Encrypt a raw ZIP package into an OLE container.
    Encrypt {
        /// Plain package (e.g. an unprotected `.docx`).
        input: PathBuf,

        /// Where to write the encrypted document.
        output: PathBuf,

        #[command(flatten)]
        password: PasswordArgs,

        #[arg(long, value_enum, default_value_t = HashArg::Sha512)]
        hash: HashArg,

        #[arg(long, default_value_t = 256)]
        key_bits: usize,

        #[arg(long, default_value_t = 100_000)]
        spin_count: u32,
    },
}

#[derive(Args)]
struct PasswordArgs {
    /// Document password.
    #[arg(long, required_unless_present = "password_file")]
    password: Option<String>,

    /// Read the password from a file (trailing newlines are trimmed).
    #[arg(long, value_name = "PATH", conflicts_with = "password")]
    password_file: Option<PathBuf>,
}

impl PasswordArgs {
    fn resolve(&self) -> Result<String> {
        if let Some(path) = self.password_file.as_deref() {
            let value = std::fs::read_to_string(path)
                .with_context(|| format!("read password file {}", path.display()))?;
            return Ok(value.trim_end_matches(&['\r', '\n'][..]).to_string());
        }
        match &self.password {
            Some(password) => Ok(password.clone()),
            None => bail!("either --password or --password-file is required"),
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum HashArg {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl From<HashArg> for HashAlgorithm {
    fn from(value: HashArg) -> Self {
        match value {
            HashArg::Sha1 => HashAlgorithm::Sha1,
            HashArg::Sha256 => HashAlgorithm::Sha256,
            HashArg::Sha384 => HashAlgorithm::Sha384,
            HashArg::Sha512 => HashAlgorithm::Sha512,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Decrypt {
            input,
            output,
            password,
            verify_password,
            verify_integrity,
            max_spin_count,
        } => {
            let password = password.resolve()?;
            let bytes = read_input(&input)?;
            if !is_encrypted_ooxml_ole(&bytes) {
                bail!(
                    "{} is not an encrypted OOXML document (expected an OLE container with EncryptionInfo and EncryptedPackage streams)",
                    input.display()
                );
            }
            let opts = DecryptOptions {
                max_spin_count,
                verify_password,
                verify_integrity,
            };
            let package = decrypt_ole(&bytes, &password, &opts)
                .with_context(|| format!("decrypt {}", input.display()))?;
            if !package.starts_with(b"PK") {
                log::warn!(
                    "decrypted package does not start with a ZIP signature; the password is probably wrong"
                );
            }
            write_output(&output, &package)
        }
        Command::Encrypt {
            input,
            output,
            password,
            hash,
            key_bits,
            spin_count,
        } => {
            let password = password.resolve()?;
            let plaintext = read_input(&input)?;
            let opts = EncryptOptions {
                hash_algorithm: hash.into(),
                key_bits,
                spin_count,
            };
            let document = encrypt(&plaintext, &password, &opts)
                .with_context(|| format!("encrypt {}", input.display()))?;
            let bytes = encrypt_to_ole(&document).context("build OLE container")?;
            write_output(&output, &bytes)
        }
    }
}

fn read_input(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("read {}", path.display()))
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    std::fs::write(path, bytes).with_context(|| format!("write {}", path.display()))
}
