//! File I/O helpers: atomic output writes and the scratch workspace.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use tempfile::{NamedTempFile, TempDir};

use crate::types::SesameError;

/// Prefix of every scratch workspace directory.
pub const SCRATCH_PREFIX: &str = ".sesame-";

/// Atomically write data to a file using a temporary file.
///
/// The temporary file is created in the same directory as the target and
/// renamed over it only once every byte is on disk, so a failed write never
/// leaves a partial file at `path`.
///
/// # Arguments
///
/// * `path` - Target file path
/// * `data` - Data to write
/// * `mode_600` - Whether to set file permissions to 0o600 (Unix only)
pub fn write_all_atomic(path: &Path, data: &[u8], mode_600: bool) -> Result<(), SesameError> {
    let parent = path
        .parent()
        .ok_or(SesameError::Invalid("output path has no parent"))?;
    fs::create_dir_all(parent)?;
    let mut tmp = NamedTempFile::new_in(parent)?;
    if mode_600 {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(tmp.path(), fs::Permissions::from_mode(0o600))?;
        }
    }
    tmp.write_all(data)?;
    tmp.flush()?;
    tmp.as_file_mut().sync_all()?;
    tmp.persist(path).map_err(|e| SesameError::Io(e.error))?;
    Ok(())
}

/// Acquire a private scratch directory for one pipeline run.
///
/// The directory and everything in it is removed when the returned guard is
/// dropped, on every exit path including errors and unwinding panics.
pub fn scratch_workspace(root: Option<&Path>) -> Result<TempDir, SesameError> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(SCRATCH_PREFIX);
    let dir = match root {
        Some(root) => builder.tempdir_in(root)?,
        None => builder.tempdir()?,
    };
    debug!("scratch workspace at {}", dir.path().display());
    Ok(dir)
}

/// Remove a scratch workspace once its run has completed.
///
/// The run's outputs are already in place, so a failure here is logged, not returned.
pub fn release_workspace(workspace: TempDir) {
    let path = workspace.path().to_path_buf();
    if let Err(err) = workspace.close() {
        warn!("could not remove scratch workspace {}: {err}", path.display());
    }
}

/// Resolve a relative `input` against `working_dir` when one is given.
pub(crate) fn resolve_in(working_dir: Option<&Path>, input: &Path) -> PathBuf {
    match working_dir {
        Some(dir) if input.is_relative() => dir.join(input),
        _ => input.to_path_buf(),
    }
}
