//! Archive codec: packs filesystem paths into one byte stream and unpacks it again.
//!
//! Layout: `"SESARCH\0" | u32 LE manifest length | CBOR manifest | file bodies`.
//! The manifest lists every entry in order with its logical path, kind and
//! body length; bodies follow back to back in the same order.

use std::collections::HashSet;
use std::ffi::OsStr;
use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::file::resolve_in;
use crate::types::SesameError;

pub const ARCHIVE_MAGIC: &[u8; 8] = b"SESARCH\0";
pub const ARCHIVE_VERSION: u16 = 1;

/// Kind of filesystem object captured in an archive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// One filesystem object captured in an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    path: String,
    kind: EntryKind,
    data: Vec<u8>,
}

impl ArchiveEntry {
    /// Archive-relative path, `/`-separated.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// An entry written to disk by [`Archive::unpack`], relative to the unpack root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnpackedEntry {
    pub path: PathBuf,
    pub kind: EntryKind,
}

#[derive(Serialize, Deserialize)]
struct Manifest {
    version: u16,
    entries: Vec<ManifestEntry>,
}

#[derive(Serialize, Deserialize)]
struct ManifestEntry {
    path: String,
    kind: EntryKind,
    len: u64,
}

/// An ordered set of entries with unique logical paths.
#[derive(Debug, Default)]
pub struct Archive {
    entries: Vec<ArchiveEntry>,
    skipped: Vec<PathBuf>,
}

/// Whether `data` starts like an archive produced by [`Archive::to_bytes`].
pub fn looks_like_archive(data: &[u8]) -> bool {
    data.starts_with(ARCHIVE_MAGIC)
}

impl Archive {
    /// Pack `inputs`, resolving relative inputs against the process working directory.
    pub fn pack<P: AsRef<Path>>(inputs: &[P]) -> Result<Self, SesameError> {
        Self::pack_in(None, inputs)
    }

    /// Pack `inputs`, resolving relative inputs against `working_dir` when given.
    ///
    /// Directories are walked recursively in file-name order. Absolute inputs
    /// lose their root (`/a/b` is stored as `a/b`), and inputs that climb above
    /// their root (`../secret`) are left out and listed in [`Archive::skipped`].
    /// Any unreadable input aborts the whole pack.
    pub fn pack_in<P: AsRef<Path>>(
        working_dir: Option<&Path>,
        inputs: &[P],
    ) -> Result<Self, SesameError> {
        let mut archive = Archive::default();
        let mut seen = HashSet::new();

        for input in inputs {
            let input = input.as_ref();
            let Some(name) = archive_name(input)? else {
                debug!("skipping {}: escapes the encryption root", input.display());
                archive.skipped.push(input.to_path_buf());
                continue;
            };
            let source = resolve_in(working_dir, input);
            archive.add_tree(&source, &name, &mut seen)?;
        }

        Ok(archive)
    }

    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    /// Inputs left out of the archive because they escape the encryption root.
    pub fn skipped(&self) -> &[PathBuf] {
        &self.skipped
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn add_tree(
        &mut self,
        source: &Path,
        name: &[String],
        seen: &mut HashSet<String>,
    ) -> Result<(), SesameError> {
        let meta = fs::metadata(source).map_err(|e| read_error(source, e))?;
        if !meta.is_dir() {
            if name.is_empty() {
                debug!("skipping {}: no usable archive name", source.display());
                return Ok(());
            }
            let data = fs::read(source).map_err(|e| read_error(source, e))?;
            self.push(name.join("/"), EntryKind::File, data, seen);
            return Ok(());
        }

        for entry in WalkDir::new(source).sort_by_file_name() {
            let entry = entry.map_err(|e| walk_error(source, e))?;
            let rel = entry
                .path()
                .strip_prefix(source)
                .map_err(|_| SesameError::Invalid("directory walk left its root"))?;

            let mut parts = name.to_vec();
            for component in rel.components() {
                if let Component::Normal(part) = component {
                    parts.push(utf8_name(part, entry.path())?);
                }
            }
            if parts.is_empty() {
                continue;
            }
            let path = parts.join("/");

            let file_type = entry.file_type();
            if file_type.is_dir() {
                self.push(path, EntryKind::Directory, Vec::new(), seen);
            } else if file_type.is_file() {
                let data = fs::read(entry.path()).map_err(|e| read_error(entry.path(), e))?;
                self.push(path, EntryKind::File, data, seen);
            } else if file_type.is_symlink() {
                match fs::metadata(entry.path()) {
                    Ok(target) if target.is_file() => {
                        let data =
                            fs::read(entry.path()).map_err(|e| read_error(entry.path(), e))?;
                        self.push(path, EntryKind::File, data, seen);
                    }
                    _ => debug!("not following symlink {}", entry.path().display()),
                }
            } else {
                debug!("skipping special file {}", entry.path().display());
            }
        }
        Ok(())
    }

    fn push(&mut self, path: String, kind: EntryKind, data: Vec<u8>, seen: &mut HashSet<String>) {
        if !seen.insert(path.clone()) {
            debug!("{path} already archived; keeping the first copy");
            return;
        }
        debug!("archiving {path} ({kind:?}, {} bytes)", data.len());
        self.entries.push(ArchiveEntry { path, kind, data });
    }

    /// Serialize the archive into a byte stream.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SesameError> {
        let mut out = Vec::new();
        self.write_to(&mut out)?;
        Ok(out)
    }

    /// Serialize the archive into `w`.
    pub fn write_to<W: Write>(&self, mut w: W) -> Result<(), SesameError> {
        let manifest = Manifest {
            version: ARCHIVE_VERSION,
            entries: self
                .entries
                .iter()
                .map(|e| ManifestEntry {
                    path: e.path.clone(),
                    kind: e.kind,
                    len: e.data.len() as u64,
                })
                .collect(),
        };
        let mut manifest_bytes = Vec::new();
        ciborium::into_writer(&manifest, &mut manifest_bytes)?;
        let manifest_len = u32::try_from(manifest_bytes.len())
            .map_err(|_| SesameError::Invalid("too many archive entries"))?;

        w.write_all(ARCHIVE_MAGIC)?;
        w.write_all(&manifest_len.to_le_bytes())?;
        w.write_all(&manifest_bytes)?;
        for entry in &self.entries {
            w.write_all(&entry.data)?;
        }
        w.flush()?;
        Ok(())
    }

    /// Parse a byte stream produced by [`Archive::to_bytes`].
    ///
    /// Every structural problem is a [`SesameError::CorruptArchive`], including
    /// entry paths that would land outside the unpack root.
    pub fn from_bytes(data: &[u8]) -> Result<Self, SesameError> {
        let rest = data
            .strip_prefix(ARCHIVE_MAGIC)
            .ok_or(SesameError::CorruptArchive("missing archive magic"))?;
        let len_bytes: [u8; 4] = rest
            .get(..4)
            .and_then(|b| b.try_into().ok())
            .ok_or(SesameError::CorruptArchive("truncated manifest length"))?;
        let manifest_len = u32::from_le_bytes(len_bytes) as usize;
        let manifest_bytes = rest
            .get(4..4 + manifest_len)
            .ok_or(SesameError::CorruptArchive("truncated manifest"))?;
        let manifest: Manifest = ciborium::from_reader(manifest_bytes)
            .map_err(|_| SesameError::CorruptArchive("unreadable manifest"))?;
        if manifest.version != ARCHIVE_VERSION {
            return Err(SesameError::CorruptArchive("unsupported archive version"));
        }

        let mut body = &rest[4 + manifest_len..];
        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(manifest.entries.len());
        for m in manifest.entries {
            entry_rel_path(&m.path)?;
            if !seen.insert(m.path.clone()) {
                return Err(SesameError::CorruptArchive("duplicate entry path"));
            }
            if m.kind == EntryKind::Directory && m.len != 0 {
                return Err(SesameError::CorruptArchive("directory entry carries data"));
            }
            let len = usize::try_from(m.len)
                .ok()
                .filter(|len| *len <= body.len())
                .ok_or(SesameError::CorruptArchive("entry data truncated"))?;
            let (head, tail) = body.split_at(len);
            entries.push(ArchiveEntry {
                path: m.path,
                kind: m.kind,
                data: head.to_vec(),
            });
            body = tail;
        }
        if !body.is_empty() {
            return Err(SesameError::CorruptArchive("trailing data after last entry"));
        }

        Ok(Self {
            entries,
            skipped: Vec::new(),
        })
    }

    /// Write every entry under `dest`, creating directories as needed.
    pub fn unpack(&self, dest: &Path) -> Result<Vec<UnpackedEntry>, SesameError> {
        let mut unpacked = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let rel = entry_rel_path(&entry.path)?;
            let target = dest.join(&rel);
            match entry.kind {
                EntryKind::Directory => fs::create_dir_all(&target)?,
                EntryKind::File => {
                    if let Some(parent) = target.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    fs::write(&target, &entry.data)?;
                }
            }
            unpacked.push(UnpackedEntry {
                path: rel,
                kind: entry.kind,
            });
        }
        Ok(unpacked)
    }
}

/// Logical archive name for an input path, or `None` when it climbs above its root.
fn archive_name(input: &Path) -> Result<Option<Vec<String>>, SesameError> {
    let mut parts: Vec<String> = Vec::new();
    for component in input.components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::CurDir => {}
            Component::ParentDir => {
                if parts.pop().is_none() {
                    return Ok(None);
                }
            }
            Component::Normal(part) => parts.push(utf8_name(part, input)?),
        }
    }
    Ok(Some(parts))
}

/// Entry paths are stored as text; names without a UTF-8 form cannot be archived.
fn utf8_name(part: &OsStr, path: &Path) -> Result<String, SesameError> {
    part.to_str().map(str::to_owned).ok_or_else(|| {
        read_error(
            path,
            io::Error::new(io::ErrorKind::InvalidData, "file name is not valid UTF-8"),
        )
    })
}

/// Relative filesystem path for a stored entry path; rejects anything but plain names.
fn entry_rel_path(path: &str) -> Result<PathBuf, SesameError> {
    if path.is_empty() {
        return Err(SesameError::CorruptArchive("empty entry path"));
    }
    let mut rel = PathBuf::new();
    for part in path.split('/') {
        let mut components = Path::new(part).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(name)), None) if name == part => rel.push(part),
            _ => {
                return Err(SesameError::CorruptArchive(
                    "entry path escapes the destination",
                ));
            }
        }
    }
    Ok(rel)
}

fn read_error(path: &Path, source: io::Error) -> SesameError {
    SesameError::ReadInput {
        path: path.to_path_buf(),
        source,
    }
}

fn walk_error(root: &Path, err: walkdir::Error) -> SesameError {
    let path = err.path().unwrap_or(root).to_path_buf();
    let source = err
        .into_io_error()
        .unwrap_or_else(|| io::Error::other("filesystem loop"));
    SesameError::ReadInput { path, source }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(archive: &Archive) -> Vec<&str> {
        archive.entries().iter().map(|e| e.path()).collect()
    }

    #[test]
    fn absolute_and_dotted_names_are_normalized() {
        let join = |p: &str| archive_name(Path::new(p)).unwrap().map(|v| v.join("/"));
        assert_eq!(join("/etc/app/config.py").as_deref(), Some("etc/app/config.py"));
        assert_eq!(join("./conf/a.txt").as_deref(), Some("conf/a.txt"));
        assert_eq!(join("conf/../b.txt").as_deref(), Some("b.txt"));
        assert_eq!(join("../secret"), None);
        assert_eq!(join("a/../../secret"), None);
    }

    #[test]
    fn parent_relative_inputs_are_skipped_without_reading() {
        // The path does not exist; skipping must happen before any filesystem access.
        let archive = Archive::pack(&["../definitely/not/here"]).unwrap();
        assert!(archive.is_empty());
        assert_eq!(archive.skipped(), &[PathBuf::from("../definitely/not/here")]);
    }

    #[test]
    fn directory_walk_is_ordered_and_keeps_empty_dirs() {
        let td = tempfile::tempdir().unwrap();
        let root = td.path().join("conf");
        fs::create_dir_all(root.join("b/empty")).unwrap();
        fs::write(root.join("b/z.txt"), b"z").unwrap();
        fs::write(root.join("a.txt"), b"a").unwrap();

        let archive = Archive::pack_in(Some(td.path()), &["conf", "conf/a.txt"]).unwrap();
        assert_eq!(
            names(&archive),
            vec!["conf", "conf/a.txt", "conf/b", "conf/b/empty", "conf/b/z.txt"]
        );

        let parsed = Archive::from_bytes(&archive.to_bytes().unwrap()).unwrap();
        assert_eq!(parsed.entries(), archive.entries());
    }

    #[test]
    fn unreadable_input_aborts_pack() {
        let td = tempfile::tempdir().unwrap();
        let err = Archive::pack_in(Some(td.path()), &["missing.txt"]).unwrap_err();
        assert!(matches!(err, SesameError::ReadInput { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_names_abort_pack_instead_of_colliding() {
        use std::os::unix::ffi::OsStrExt;

        let td = tempfile::tempdir().unwrap();
        let root = td.path().join("src");
        fs::create_dir(&root).unwrap();
        fs::write(root.join(OsStr::from_bytes(b"\xff.txt")), b"one").unwrap();
        fs::write(root.join(OsStr::from_bytes(b"\xfe.txt")), b"two").unwrap();

        let err = Archive::pack_in(Some(td.path()), &["src"]).unwrap_err();
        assert!(
            matches!(&err, SesameError::ReadInput { source, .. } if source.kind() == io::ErrorKind::InvalidData),
            "got {err:?}"
        );

        let direct = Path::new(OsStr::from_bytes(b"src/\xff.txt"));
        let err = Archive::pack_in(Some(td.path()), &[direct]).unwrap_err();
        assert!(matches!(err, SesameError::ReadInput { .. }));
    }

    #[test]
    fn traversal_entries_are_rejected() {
        for bad in ["../evil", "/etc/passwd", "a/../../evil", "a//b", "./a"] {
            let manifest = Manifest {
                version: ARCHIVE_VERSION,
                entries: vec![ManifestEntry {
                    path: bad.to_owned(),
                    kind: EntryKind::File,
                    len: 1,
                }],
            };
            let mut manifest_bytes = Vec::new();
            ciborium::into_writer(&manifest, &mut manifest_bytes).unwrap();
            let mut data = ARCHIVE_MAGIC.to_vec();
            data.extend_from_slice(&(manifest_bytes.len() as u32).to_le_bytes());
            data.extend_from_slice(&manifest_bytes);
            data.push(b'x');

            let err = Archive::from_bytes(&data).unwrap_err();
            assert!(
                matches!(err, SesameError::CorruptArchive(_)),
                "{bad} was accepted"
            );
        }
    }

    #[test]
    fn truncated_body_is_corrupt() {
        let td = tempfile::tempdir().unwrap();
        fs::write(td.path().join("f.txt"), b"hello").unwrap();
        let bytes = Archive::pack_in(Some(td.path()), &["f.txt"])
            .unwrap()
            .to_bytes()
            .unwrap();

        let err = Archive::from_bytes(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(err, SesameError::CorruptArchive("entry data truncated")));
        assert!(looks_like_archive(&bytes));
        assert!(!looks_like_archive(b"plain config"));
    }
}
