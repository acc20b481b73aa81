//! Candidate-key trial decryption: fail fast by default, keep going with try_all.

use std::fs;
use std::path::{Path, PathBuf};

use sesame::{
    AeadAlg, Confirm, DecryptOptions, EncryptOptions, Key, SesameError, decrypt_file,
    encrypt_files, open_with_candidates, seal,
};
use tempfile::{TempDir, tempdir};

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

fn key() -> Key {
    Key::generate(AeadAlg::default()).unwrap()
}

/// Encrypt a small two-file tree with `key`; returns (tempdir, artifact path).
fn encrypted_with(key: &Key) -> (TempDir, PathBuf) {
    let td = tempdir().unwrap();
    let src = td.path().join("src");
    fs::create_dir_all(src.join("sub")).unwrap();
    fs::write(src.join("a.cfg"), b"alpha").unwrap();
    fs::write(src.join("sub/b.cfg"), b"beta").unwrap();

    let enc = td.path().join("bundle.encrypted");
    let opts = EncryptOptions {
        working_dir: Some(src),
        ..Default::default()
    };
    encrypt_files(&["a.cfg", "sub"], &enc, std::slice::from_ref(key), &opts).unwrap();
    (td, enc)
}

fn opts(out: &Path, try_all: bool) -> DecryptOptions {
    DecryptOptions {
        try_all,
        ..DecryptOptions::default().with_output_dir(out)
    }
}

#[test]
fn wrong_key_fails_fast_and_writes_nothing() {
    let k1 = key();
    let (td, enc) = encrypted_with(&k1);
    let out = td.path().join("out");

    let err = decrypt_file(&enc, &[key()], &NoPrompts, &opts(&out, false)).unwrap_err();
    assert!(matches!(err, SesameError::Auth), "got {err:?}");
    assert_eq!(err.to_string(), "incorrect key");
    assert!(!out.exists());
}

#[test]
fn wrong_key_first_fails_fast_even_if_right_key_follows() {
    let right = key();
    let (td, enc) = encrypted_with(&right);
    let out = td.path().join("out");

    let err = decrypt_file(&enc, &[key(), right], &NoPrompts, &opts(&out, false)).unwrap_err();
    assert!(matches!(err, SesameError::Auth));
    assert!(!out.exists());
}

#[test]
fn try_all_recovers_with_later_key() {
    let right = key();
    let (td, enc) = encrypted_with(&right);
    let out = td.path().join("out");

    let report = decrypt_file(&enc, &[key(), key(), right], &NoPrompts, &opts(&out, true)).unwrap();
    assert_eq!(report.key_index, 2);
    assert_eq!(fs::read(out.join("a.cfg")).unwrap(), b"alpha");
    assert_eq!(fs::read(out.join("sub/b.cfg")).unwrap(), b"beta");
}

#[test]
fn try_all_with_no_matching_key_reports_no_valid_key() {
    let (td, enc) = encrypted_with(&key());
    let out = td.path().join("out");

    let err = decrypt_file(&enc, &[key(), key()], &NoPrompts, &opts(&out, true)).unwrap_err();
    assert!(matches!(err, SesameError::NoValidKey), "got {err:?}");
    assert!(!out.exists());
}

#[test]
fn malformed_artifact_is_never_retried() {
    let right = key();
    let mut sealed = seal(b"payload", &right).unwrap();
    // Break the header length prefix: no key can ever help.
    sealed[..4].copy_from_slice(&u32::MAX.to_le_bytes());

    let err = open_with_candidates(&sealed, &[key(), right], true).unwrap_err();
    assert!(matches!(err, SesameError::Malformed), "got {err:?}");
}

#[test]
fn first_authenticating_key_wins() {
    let right = key();
    let sealed = seal(b"payload", &right).unwrap();
    let (index, plaintext) = open_with_candidates(&sealed, &[right, key()], false).unwrap();
    assert_eq!(index, 0);
    assert_eq!(plaintext, b"payload");
}

#[test]
fn empty_candidate_list_is_no_valid_key() {
    let sealed = seal(b"payload", &key()).unwrap();
    let err = open_with_candidates(&sealed, &[], true).unwrap_err();
    assert!(matches!(err, SesameError::NoValidKey));
}
