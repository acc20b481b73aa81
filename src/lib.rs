#![forbid(unsafe_code)]
//! # sesame: encrypt a file tree into one authenticated archive
//!
//! `sesame` packs one or more files and directories (typically application
//! configs) into a single archive, compresses it with zstd and seals it with
//! an AEAD cipher (XChaCha20-Poly1305 or AES-256-GCM-SIV) under a symmetric
//! key kept in a key file. Decryption reverses the chain and restores the
//! original relative layout under an output directory.
//!
//! ## Features
//! - **Multi-file archives** preserving relative directory structure
//! - **Tar-style path handling**: absolute inputs lose their leading `/`,
//!   inputs climbing above the current root (`../x`) are left out
//! - **Trial decryption** across several candidate keys (`try_all`)
//! - **Safe placement**: existing files are only replaced when forced or confirmed
//! - **Legacy payloads**: single bare files from older artifacts still decrypt
//!
//! ## Example: Encrypt and decrypt a directory
//! ```no_run
//! use std::path::Path;
//! use sesame::{AeadAlg, DecryptOptions, EncryptOptions, Key, TerminalPrompt};
//! use sesame::{decrypt_file, encrypt_files};
//!
//! let key = Key::generate(AeadAlg::default()).unwrap();
//! encrypt_files(&["config"], Path::new("config.encrypted"), &[key], &EncryptOptions::default())
//!     .unwrap();
//!
//! # let key = Key::generate(AeadAlg::default()).unwrap();
//! let opts = DecryptOptions::default().with_output_dir("restored");
//! let report = decrypt_file(Path::new("config.encrypted"), &[key], &TerminalPrompt, &opts).unwrap();
//! println!("restored {} files", report.written.len());
//! ```
//!
//! Safety notes
//! - The crate is not audited or reviewed! Protects data at rest. Does not defend against compromised hosts/side channels.

mod archive;
mod compress;
mod crypto;
mod file;
mod format;
mod keys;
mod output;
mod pipeline;
mod prompt;
mod types;

// Re-export public API from modules
pub use archive::{Archive, ArchiveEntry, EntryKind, UnpackedEntry, looks_like_archive};
pub use compress::{compress, decompress};
pub use crypto::{KEY_LEN, Key, open, seal};
pub use file::{SCRATCH_PREFIX, release_workspace, scratch_workspace, write_all_atomic};
pub use keys::{
    FoundKey, KeyRequest, Mode, ResolvedKeys, create_key, find_candidate_keys, read_key,
    resolve_keys, write_key,
};
pub use output::{Materializer, Placement};
pub use pipeline::{
    DecryptReport, decrypt_file, encrypt_files, open_with_candidates, verify_input_files,
};
pub use prompt::{Confirm, TerminalPrompt};
pub use types::*;
