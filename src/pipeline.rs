//! Encrypt and decrypt pipelines.
//!
//! Encrypt: `inputs -> archive -> compress -> seal -> output file`.
//! Decrypt: `input file -> open (trying candidate keys) -> decompress ->
//! unpack into the scratch workspace -> materialize under the output dir`.

use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::archive::{Archive, EntryKind, looks_like_archive};
use crate::compress::{compress, decompress};
use crate::crypto::{Key, open, seal};
use crate::file::{release_workspace, resolve_in, scratch_workspace, write_all_atomic};
use crate::output::{Materializer, Placement};
use crate::prompt::Confirm;
use crate::types::{
    DecryptOptions, EncryptOptions, LEGACY_FALLBACK_SUFFIX, LEGACY_SUFFIX, SesameError,
};

/// Name of the packed archive inside the scratch workspace.
const ARCHIVE_FILE_NAME: &str = "sesame.archive";
/// Directory inside the scratch workspace the archive is unpacked into.
const UNPACK_DIR: &str = "unpacked";
/// Staging name for a legacy single-file payload.
const LEGACY_PAYLOAD_NAME: &str = "payload";

/// Outcome of a successful [`decrypt_file`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DecryptReport {
    /// Position of the key that opened the file in the candidate list.
    pub key_index: usize,
    /// The payload was a bare single file rather than an archive.
    pub legacy: bool,
    /// Files written under the output directory.
    pub written: Vec<PathBuf>,
    /// Existing files left untouched because overwriting was declined.
    pub skipped: Vec<PathBuf>,
}

impl DecryptReport {
    fn record(&mut self, placement: Placement) {
        match placement {
            Placement::Written(path) => self.written.push(path),
            Placement::Skipped(path) => self.skipped.push(path),
            Placement::Created(_) => {}
        }
    }
}

/// Check every input exists and no input file is empty.
///
/// Relative inputs are looked up under `working_dir` when given.
pub fn verify_input_files<P: AsRef<Path>>(
    inputs: &[P],
    working_dir: Option<&Path>,
) -> Result<(), SesameError> {
    for input in inputs {
        let input = input.as_ref();
        let path = resolve_in(working_dir, input);
        let meta = fs::metadata(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => SesameError::MissingInput(input.to_path_buf()),
            _ => SesameError::ReadInput {
                path: input.to_path_buf(),
                source: e,
            },
        })?;
        if meta.is_file() && meta.len() == 0 {
            return Err(SesameError::EmptyInput(input.to_path_buf()));
        }
    }
    Ok(())
}

/// Encrypt `inputs` into the single artifact `output` using the first of `keys`.
///
/// Nothing is written to `output` unless every step succeeds; an existing
/// `output` is only replaced when `opts.force` is set.
pub fn encrypt_files<P: AsRef<Path>>(
    inputs: &[P],
    output: &Path,
    keys: &[Key],
    opts: &EncryptOptions,
) -> Result<PathBuf, SesameError> {
    verify_input_files(inputs, opts.working_dir.as_deref())?;
    let key = keys.first().ok_or(SesameError::NoKeys)?;
    if output.exists() && !opts.force {
        return Err(SesameError::OutputExists(output.to_path_buf()));
    }

    let workspace = scratch_workspace(opts.scratch_dir.as_deref())?;

    let archive = Archive::pack_in(opts.working_dir.as_deref(), inputs)?;
    for skipped in archive.skipped() {
        debug!("left out of archive: {}", skipped.display());
    }
    let archive_path = workspace.path().join(ARCHIVE_FILE_NAME);
    archive.write_to(BufWriter::new(File::create(&archive_path)?))?;

    let packed = fs::read(&archive_path)?;
    let compressed = compress(&packed, opts.compression_level)?;
    let sealed = seal(&compressed, key)?;
    write_all_atomic(output, &sealed, false)?;

    release_workspace(workspace);
    info!(
        "encrypted {} entries into {}",
        archive.entries().len(),
        output.display()
    );
    Ok(output.to_path_buf())
}

/// Trial decryption: the first key that opens `ciphertext` wins.
///
/// An authentication failure stops the loop unless `try_all` is set, in which
/// case the next key is tried. Any other failure (a malformed artifact) is
/// fatal regardless of `try_all`.
pub fn open_with_candidates(
    ciphertext: &[u8],
    keys: &[Key],
    try_all: bool,
) -> Result<(usize, Vec<u8>), SesameError> {
    for (index, key) in keys.iter().enumerate() {
        match open(ciphertext, key) {
            Ok(plaintext) => {
                debug!("candidate key #{index} opened the file");
                return Ok((index, plaintext));
            }
            Err(SesameError::Auth) if try_all => {
                debug!("candidate key #{index} rejected");
            }
            Err(err) => return Err(err),
        }
    }
    Err(SesameError::NoValidKey)
}

/// Decrypt `input` with the first candidate key that opens it and place the
/// contents under `opts.output_dir`.
///
/// Colliding destination files are replaced when `opts.force` is set,
/// otherwise `confirm` decides per file.
pub fn decrypt_file(
    input: &Path,
    keys: &[Key],
    confirm: &dyn Confirm,
    opts: &DecryptOptions,
) -> Result<DecryptReport, SesameError> {
    verify_input_files(&[input], None)?;
    if keys.is_empty() {
        return Err(SesameError::NoKeys);
    }
    let ciphertext = fs::read(input).map_err(|source| SesameError::ReadInput {
        path: input.to_path_buf(),
        source,
    })?;

    let workspace = scratch_workspace(opts.scratch_dir.as_deref())?;

    let (key_index, compressed) = open_with_candidates(&ciphertext, keys, opts.try_all)?;
    let payload = decompress(&compressed)?;

    let materializer = Materializer::new(&opts.output_dir, opts.force, confirm);
    let mut report = DecryptReport {
        key_index,
        ..Default::default()
    };

    if looks_like_archive(&payload) {
        let archive = Archive::from_bytes(&payload)?;
        let staging = workspace.path().join(UNPACK_DIR);
        fs::create_dir(&staging)?;
        for entry in archive.unpack(&staging)? {
            let placement = match entry.kind {
                EntryKind::Directory => materializer.place_dir(&entry.path)?,
                EntryKind::File => {
                    materializer.place_file(&staging.join(&entry.path), &entry.path)?
                }
            };
            report.record(placement);
        }
    } else {
        debug!("payload is not an archive; treating it as a single legacy file");
        report.legacy = true;
        let staged = workspace.path().join(LEGACY_PAYLOAD_NAME);
        fs::write(&staged, &payload)?;
        let placement = place_legacy(input, &staged, &materializer, &opts.output_dir)?;
        report.record(placement);
    }

    release_workspace(workspace);
    info!(
        "decrypted {} with candidate key #{}: {} written, {} skipped",
        input.display(),
        report.key_index,
        report.written.len(),
        report.skipped.len()
    );
    Ok(report)
}

/// Place a legacy bare payload.
///
/// `name.encrypted` decrypts to `name`; anything else lands in a fresh
/// uniquely named `*.sesame-decrypted` file.
fn place_legacy(
    input: &Path,
    staged: &Path,
    materializer: &Materializer<'_>,
    output_dir: &Path,
) -> Result<Placement, SesameError> {
    let original_name = input
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.strip_suffix(LEGACY_SUFFIX))
        .filter(|n| !n.is_empty());

    match original_name {
        Some(name) => materializer.place_file(staged, Path::new(name)),
        None => {
            fs::create_dir_all(output_dir)?;
            let fresh = tempfile::Builder::new()
                .prefix("sesame-")
                .suffix(LEGACY_FALLBACK_SUFFIX)
                .tempfile_in(output_dir)?;
            let (_, dest) = fresh.keep().map_err(|e| SesameError::Io(e.error))?;
            materializer.place_fresh(staged, dest)
        }
    }
}
