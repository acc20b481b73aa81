//! Core types and enums for sesame.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default zstd level used when compressing the archive before sealing.
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Extension of key files picked up by key discovery.
pub const KEY_FILE_EXT: &str = "key";

/// Suffix older single-file artifacts were written with.
pub const LEGACY_SUFFIX: &str = ".encrypted";

/// Suffix of the fallback file created for a legacy payload without a usable name.
pub const LEGACY_FALLBACK_SUFFIX: &str = ".sesame-decrypted";

/// Supported AEAD algorithms.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum AeadAlg {
    /// XChaCha20-Poly1305 (24-byte nonces).
    #[default]
    XChaCha20Poly1305 = 1,
    /// AES-256-GCM-SIV (12-byte nonces).
    Aes256GcmSiv = 2,
}

impl TryFrom<u8> for AeadAlg {
    type Error = SesameError;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        match id {
            1 => Ok(AeadAlg::XChaCha20Poly1305),
            2 => Ok(AeadAlg::Aes256GcmSiv),
            other => Err(SesameError::UnsupportedAead(other)),
        }
    }
}

/// Options for [`encrypt_files`](crate::encrypt_files).
#[derive(Debug, Clone)]
pub struct EncryptOptions {
    /// When `true`, replace an existing output file.
    pub force: bool,
    /// zstd compression level applied to the archive.
    pub compression_level: i32,
    /// Directory relative inputs are resolved against. `None` uses the process working directory.
    pub working_dir: Option<PathBuf>,
    /// Parent of the scratch workspace. `None` uses the system temp directory.
    pub scratch_dir: Option<PathBuf>,
}

impl Default for EncryptOptions {
    fn default() -> Self {
        Self {
            force: false,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            working_dir: None,
            scratch_dir: None,
        }
    }
}

/// Options for [`decrypt_file`](crate::decrypt_file).
#[derive(Debug, Clone)]
pub struct DecryptOptions {
    /// Overwrite colliding destination files without asking.
    pub force: bool,
    /// Keep trying the remaining candidate keys after an authentication failure.
    pub try_all: bool,
    /// Root the decrypted tree is placed under.
    pub output_dir: PathBuf,
    /// Parent of the scratch workspace. `None` uses the system temp directory.
    pub scratch_dir: Option<PathBuf>,
}

impl Default for DecryptOptions {
    fn default() -> Self {
        Self {
            force: false,
            try_all: false,
            output_dir: PathBuf::from("."),
            scratch_dir: None,
        }
    }
}

impl DecryptOptions {
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }
}

/// Library error type (no panics for expected failures).
#[derive(Error, Debug)]
pub enum SesameError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot read {path}: {source}")]
    ReadInput {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("file doesn't exist at {0}")]
    MissingInput(PathBuf),
    #[error("input file is zero-length ({0})")]
    EmptyInput(PathBuf),
    #[error("no keys provided")]
    NoKeys,
    /// Wrong key or tampered ciphertext.
    #[error("incorrect key")]
    Auth,
    #[error("no valid keys for decryption")]
    NoValidKey,
    #[error("encryption/decryption failure")]
    Crypto,
    #[error("malformed encrypted file")]
    Malformed,
    #[error("unsupported format version {0}")]
    UnsupportedVersion(u16),
    #[error("unsupported AEAD algorithm id {0}")]
    UnsupportedAead(u8),
    #[error("corrupt archive: {0}")]
    CorruptArchive(&'static str),
    #[error("could not decode key: {0}")]
    InvalidKey(&'static str),
    #[error("output {0} exists; use --force to overwrite")]
    OutputExists(PathBuf),
    #[error("cannot place {0}: a directory or symlink is in the way")]
    PathCollision(PathBuf),
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
    #[error("serialization error")]
    CborSer(#[from] ciborium::ser::Error<std::io::Error>),
}
