//! Key discovery, loading and creation.
//!
//! Nothing here looks at the process working directory: callers pass the
//! directory to search or create keys in explicitly.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use walkdir::WalkDir;
use zeroize::Zeroizing;

use crate::crypto::Key;
use crate::file::write_all_atomic;
use crate::prompt::Confirm;
use crate::types::{AeadAlg, KEY_FILE_EXT, SesameError};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Which pipeline the keys are for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Encrypt,
    Decrypt,
}

/// Inputs to [`resolve_keys`].
#[derive(Debug, Clone)]
pub struct KeyRequest<'a> {
    /// Key file named by the user, if any.
    pub keyfile: Option<&'a Path>,
    /// Directory searched for `*.key` files and where new keys are created.
    pub root_dir: &'a Path,
    pub mode: Mode,
    pub try_all: bool,
    /// Algorithm for a newly created key.
    pub alg: AeadAlg,
}

/// A key found by [`find_candidate_keys`].
#[derive(Debug)]
pub struct FoundKey {
    /// Path relative to the search root.
    pub path: PathBuf,
    pub key: Key,
}

/// Ordered candidate keys, plus the path of a key file created on the way.
#[derive(Debug, Default)]
pub struct ResolvedKeys {
    pub keys: Vec<Key>,
    pub created: Option<PathBuf>,
}

/// Load a key file.
///
/// The text is accepted as UTF-8 (with or without a BOM) or, failing that, Latin-1.
pub fn read_key(path: &Path) -> Result<Key, SesameError> {
    let raw = Zeroizing::new(fs::read(path).map_err(|source| SesameError::ReadInput {
        path: path.to_path_buf(),
        source,
    })?);
    let bytes = raw.strip_prefix(UTF8_BOM).unwrap_or(&raw[..]);

    let text = Zeroizing::new(match std::str::from_utf8(bytes) {
        Ok(s) => s.to_owned(),
        Err(_) => bytes.iter().map(|&b| char::from(b)).collect(),
    });
    Key::from_text(&text)
}

/// Every loadable `*.key` file under `root`, in file-name order.
///
/// Files that are not keys, and directories that cannot be read, are skipped.
pub fn find_candidate_keys(root: &Path) -> Vec<FoundKey> {
    let mut found = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("skipping unreadable path during key search: {err}");
                continue;
            }
        };
        let is_key_file = entry.file_type().is_file()
            && entry.path().extension().is_some_and(|ext| ext == KEY_FILE_EXT);
        if !is_key_file {
            continue;
        }

        match read_key(entry.path()) {
            Ok(key) => {
                let path = entry
                    .path()
                    .strip_prefix(root)
                    .unwrap_or(entry.path())
                    .to_path_buf();
                debug!("found key {}", path.display());
                found.push(FoundKey { path, key });
            }
            Err(err) => debug!("ignoring {}: {err}", entry.path().display()),
        }
    }
    found
}

/// Generate a key and store it in a new uniquely named `sesame*.key` file in `dir`.
pub fn create_key(dir: &Path, alg: AeadAlg) -> Result<(PathBuf, Key), SesameError> {
    let key = Key::generate(alg)?;
    let text = Zeroizing::new(key.to_text()?);

    let mut tmp = tempfile::Builder::new()
        .prefix("sesame")
        .suffix(".key")
        .tempfile_in(dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(tmp.path(), fs::Permissions::from_mode(0o600))?;
    }
    tmp.write_all(text.as_bytes())?;
    tmp.as_file_mut().sync_all()?;
    let (_, path) = tmp.keep().map_err(|e| SesameError::Io(e.error))?;

    info!("created key {}", path.display());
    Ok((path, key))
}

/// Write `key` to `path` (0600 perms on Unix).
pub fn write_key(path: &Path, key: &Key, force: bool) -> Result<(), SesameError> {
    if path.exists() && !force {
        return Err(SesameError::OutputExists(path.to_path_buf()));
    }
    let text = Zeroizing::new(key.to_text()?);
    write_all_atomic(path, text.as_bytes(), true)
}

/// Work out which keys to use, asking `confirm` where a choice is needed.
///
/// An empty result means the user declined every offer; callers report it as
/// [`SesameError::NoKeys`].
pub fn resolve_keys(
    req: &KeyRequest<'_>,
    confirm: &dyn Confirm,
) -> Result<ResolvedKeys, SesameError> {
    if let Some(keyfile) = req.keyfile {
        if keyfile.exists() {
            return Ok(ResolvedKeys {
                keys: vec![read_key(keyfile)?],
                created: None,
            });
        }
        if !confirm.confirm_create_key() {
            return Ok(ResolvedKeys::default());
        }
        let key = Key::generate(req.alg)?;
        write_key(keyfile, &key, false)?;
        info!("created key {}", keyfile.display());
        return Ok(ResolvedKeys {
            keys: vec![key],
            created: Some(keyfile.to_path_buf()),
        });
    }

    let found = find_candidate_keys(req.root_dir);
    if found.is_empty() {
        return offer_new_key(req, confirm);
    }

    if req.mode == Mode::Decrypt && req.try_all {
        return Ok(ResolvedKeys {
            keys: found.into_iter().map(|f| f.key).collect(),
            created: None,
        });
    }

    if confirm.confirm_use_key(found.len(), &found[0].path) {
        let keys = found.into_iter().take(1).map(|f| f.key).collect();
        return Ok(ResolvedKeys {
            keys,
            created: None,
        });
    }
    offer_new_key(req, confirm)
}

fn offer_new_key(
    req: &KeyRequest<'_>,
    confirm: &dyn Confirm,
) -> Result<ResolvedKeys, SesameError> {
    if !confirm.confirm_create_key() {
        return Ok(ResolvedKeys::default());
    }
    let (path, key) = create_key(req.root_dir, req.alg)?;
    Ok(ResolvedKeys {
        keys: vec![key],
        created: Some(path),
    })
}
