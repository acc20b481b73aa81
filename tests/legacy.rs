//! Artifacts whose payload is a single bare file instead of an archive.

use std::fs;
use std::path::Path;

use sesame::{
    AeadAlg, Confirm, DecryptOptions, Key, SesameError, compress, decrypt_file, seal,
};
use tempfile::tempdir;

struct NoPrompts;

impl Confirm for NoPrompts {
    fn confirm_overwrite(&self, path: &Path) -> bool {
        panic!("unexpected overwrite prompt for {}", path.display())
    }
    fn confirm_create_key(&self) -> bool {
        panic!("unexpected key creation prompt")
    }
    fn confirm_use_key(&self, _found: usize, first: &Path) -> bool {
        panic!("unexpected key selection prompt for {}", first.display())
    }
}

fn write_legacy(path: &Path, contents: &[u8], key: &Key) {
    let payload = compress(contents, 3).unwrap();
    fs::write(path, seal(&payload, key).unwrap()).unwrap();
}

#[test]
fn legacy_file_gets_its_original_name_back() {
    let td = tempdir().unwrap();
    let key = Key::generate(AeadAlg::default()).unwrap();
    let enc = td.path().join("config.py.encrypted");
    write_legacy(&enc, b"DEBUG = True\n", &key);

    let out = td.path().join("out");
    let report = decrypt_file(
        &enc,
        &[key],
        &NoPrompts,
        &DecryptOptions::default().with_output_dir(&out),
    )
    .unwrap();

    assert!(report.legacy);
    assert_eq!(report.written, vec![out.join("config.py")]);
    assert_eq!(fs::read(out.join("config.py")).unwrap(), b"DEBUG = True\n");
}

#[test]
fn legacy_file_without_suffix_gets_a_fresh_name() {
    let td = tempdir().unwrap();
    let key = Key::generate(AeadAlg::default()).unwrap();
    let enc = td.path().join("blob.bin");
    write_legacy(&enc, b"opaque", &key);

    let out = td.path().join("out");
    let report = decrypt_file(
        &enc,
        &[key],
        &NoPrompts,
        &DecryptOptions::default().with_output_dir(&out),
    )
    .unwrap();

    assert!(report.legacy);
    assert_eq!(report.written.len(), 1);
    let written = &report.written[0];
    assert_eq!(written.parent().unwrap(), out);
    let name = written.file_name().unwrap().to_str().unwrap();
    assert!(name.ends_with(".sesame-decrypted"), "got {name}");
    assert_eq!(fs::read(written).unwrap(), b"opaque");
}

#[test]
fn archive_magic_with_garbage_is_not_legacy() {
    let td = tempdir().unwrap();
    let key = Key::generate(AeadAlg::default()).unwrap();
    let enc = td.path().join("notes.txt.encrypted");
    write_legacy(&enc, b"SESARCH\0garbage follows", &key);

    let out = td.path().join("out");
    let err = decrypt_file(
        &enc,
        &[key],
        &NoPrompts,
        &DecryptOptions::default().with_output_dir(&out),
    )
    .unwrap_err();
    assert!(matches!(err, SesameError::CorruptArchive(_)), "got {err:?}");
    assert!(!out.exists());
}
