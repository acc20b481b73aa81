//! Places decrypted entries from the scratch workspace into the destination tree.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::debug;

use crate::prompt::Confirm;
use crate::types::SesameError;

/// What happened to one entry handed to the [`Materializer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// The file now exists at this destination path.
    Written(PathBuf),
    /// The directory now exists at this destination path.
    Created(PathBuf),
    /// The destination existed and the user declined to overwrite it.
    Skipped(PathBuf),
}

/// Moves staged entries under an output directory, applying the overwrite policy.
pub struct Materializer<'a> {
    output_dir: &'a Path,
    force: bool,
    confirm: &'a dyn Confirm,
}

impl<'a> Materializer<'a> {
    pub fn new(output_dir: &'a Path, force: bool, confirm: &'a dyn Confirm) -> Self {
        Self {
            output_dir,
            force,
            confirm,
        }
    }

    /// Move the staged file `src` to `rel` under the output directory.
    ///
    /// An existing destination is replaced when forced, otherwise only if the
    /// user agrees; a refusal skips this entry alone.
    pub fn place_file(&self, src: &Path, rel: &Path) -> Result<Placement, SesameError> {
        self.refuse_symlinked_parents(rel, false)?;
        self.place_file_at(src, self.output_dir.join(rel))
    }

    /// Like [`Materializer::place_file`] with an already resolved destination.
    ///
    /// A symlink at `dest` counts as an existing file; replacing it removes
    /// the link, never its target.
    pub fn place_file_at(&self, src: &Path, dest: PathBuf) -> Result<Placement, SesameError> {
        let existing = match fs::symlink_metadata(&dest) {
            Ok(meta) => Some(meta),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        let Some(existing) = existing else {
            return move_file(src, dest);
        };

        if existing.is_dir() {
            return Err(SesameError::PathCollision(dest));
        }
        if !self.force && !self.confirm.confirm_overwrite(&dest) {
            debug!("keeping existing {}", dest.display());
            return Ok(Placement::Skipped(dest));
        }
        if existing.file_type().is_symlink() {
            debug!("replacing symlink {}", dest.display());
            fs::remove_file(&dest)?;
        }

        move_file(src, dest)
    }

    /// Move `src` to `dest` unconditionally.
    ///
    /// Only for destinations the caller just created itself, such as a fresh
    /// uniquely named file.
    pub fn place_fresh(&self, src: &Path, dest: PathBuf) -> Result<Placement, SesameError> {
        move_file(src, dest)
    }

    /// Ensure the directory `rel` exists under the output directory.
    pub fn place_dir(&self, rel: &Path) -> Result<Placement, SesameError> {
        self.refuse_symlinked_parents(rel, true)?;
        let dest = self.output_dir.join(rel);
        fs::create_dir_all(&dest)?;
        Ok(Placement::Created(dest))
    }

    /// Fail with [`SesameError::PathCollision`] if any existing directory on
    /// the way from the output directory to `rel` is a symlink.
    ///
    /// The last component of `rel` is only checked when `include_last` is set.
    fn refuse_symlinked_parents(&self, rel: &Path, include_last: bool) -> Result<(), SesameError> {
        let mut dest = self.output_dir.to_path_buf();
        let mut components = rel.components().peekable();
        while let Some(component) = components.next() {
            if components.peek().is_none() && !include_last {
                break;
            }
            dest.push(component);
            match fs::symlink_metadata(&dest) {
                Ok(meta) if meta.file_type().is_symlink() => {
                    return Err(SesameError::PathCollision(dest));
                }
                Ok(_) => {}
                // nothing below a missing directory can be a link
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

// copy + remove: the scratch workspace may be on another filesystem
fn move_file(src: &Path, dest: PathBuf) -> Result<Placement, SesameError> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(src, &dest)?;
    fs::remove_file(src)?;
    debug!("wrote {}", dest.display());
    Ok(Placement::Written(dest))
}
