//! Symmetric keys and the seal/open primitives.

use std::fmt;

use aead::{Aead, KeyInit, Payload};
use aes_gcm_siv::Aes256GcmSiv;
use base64::{Engine, engine::general_purpose};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use getrandom::fill as getrandom;
use secrecy::{ExposeSecret, SecretBox};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, Zeroizing};

use crate::format::{SealHeader, encode_header, read_envelope, write_envelope};
use crate::types::{AeadAlg, SesameError};

/// Key length in bytes for every supported algorithm.
pub const KEY_LEN: usize = 32;

/// Authentication tag length of both supported AEADs.
const TAG_LEN: usize = 16;

const KEY_KIND: &str = "sesame-key";
const KEY_VERSION: u16 = 1;

/// Get the nonce length for a given AEAD algorithm.
pub fn nonce_len_for(alg: AeadAlg) -> usize {
    match alg {
        AeadAlg::XChaCha20Poly1305 => 24,
        AeadAlg::Aes256GcmSiv => 12,
    }
}

/// Generate a cryptographically secure random nonce for the given algorithm.
pub fn generate_nonce(alg: AeadAlg) -> Result<Vec<u8>, SesameError> {
    let mut nonce = vec![0u8; nonce_len_for(alg)];
    getrandom(&mut nonce).map_err(|_| SesameError::Crypto)?;
    Ok(nonce)
}

/// An immutable symmetric key.
///
/// The material lives in a [`SecretBox`] and is wiped when the key is dropped.
pub struct Key {
    alg: AeadAlg,
    material: SecretBox<[u8; KEY_LEN]>,
}

/// Text form of a key as stored in a key file.
#[derive(Serialize, Deserialize)]
struct KeyText {
    kind: String,
    version: u16,
    alg: AeadAlg,
    material: String,
}

impl Key {
    /// Generate a fresh random key for `alg`.
    pub fn generate(alg: AeadAlg) -> Result<Self, SesameError> {
        let mut material = Box::new([0u8; KEY_LEN]);
        getrandom(&mut material[..]).map_err(|_| SesameError::Crypto)?;
        Ok(Self {
            alg,
            material: SecretBox::new(material),
        })
    }

    pub fn alg(&self) -> AeadAlg {
        self.alg
    }

    /// Serialize the key to the JSON text stored in key files.
    pub fn to_text(&self) -> Result<String, SesameError> {
        let mut text = KeyText {
            kind: KEY_KIND.to_owned(),
            version: KEY_VERSION,
            alg: self.alg,
            material: general_purpose::STANDARD.encode(self.material.expose_secret()),
        };
        let out = serde_json::to_string_pretty(&text)
            .map_err(|_| SesameError::Invalid("key serialization failed"));
        text.material.zeroize();
        Ok(out? + "\n")
    }

    /// Parse the text produced by [`Key::to_text`].
    pub fn from_text(text: &str) -> Result<Self, SesameError> {
        let mut parsed: KeyText =
            serde_json::from_str(text.trim()).map_err(|_| SesameError::InvalidKey("not a key"))?;
        if parsed.kind != KEY_KIND {
            return Err(SesameError::InvalidKey("not a key"));
        }
        if parsed.version != KEY_VERSION {
            return Err(SesameError::InvalidKey("unsupported key version"));
        }

        let raw = Zeroizing::new(
            general_purpose::STANDARD
                .decode(parsed.material.as_bytes())
                .map_err(|_| SesameError::InvalidKey("bad key material encoding"))?,
        );
        parsed.material.zeroize();
        if raw.len() != KEY_LEN {
            return Err(SesameError::InvalidKey("key material must be 32 bytes"));
        }

        let mut material = Box::new([0u8; KEY_LEN]);
        material.copy_from_slice(&raw);
        Ok(Self {
            alg: parsed.alg,
            material: SecretBox::new(material),
        })
    }

    fn material(&self) -> &[u8; KEY_LEN] {
        self.material.expose_secret()
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key")
            .field("alg", &self.alg)
            .field("material", &"[REDACTED]")
            .finish()
    }
}

/// Encrypt plaintext using AEAD with the specified algorithm, key, and nonce.
///
/// `aad` is authenticated but not encrypted. Returns the ciphertext including
/// the authentication tag.
pub fn aead_encrypt(
    alg: AeadAlg,
    key: &[u8; KEY_LEN],
    nonce_bytes: &[u8],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, SesameError> {
    let payload = Payload {
        msg: plaintext,
        aad,
    };
    match alg {
        AeadAlg::XChaCha20Poly1305 => {
            let cipher =
                XChaCha20Poly1305::new_from_slice(key).map_err(|_| SesameError::Crypto)?;
            let nonce = XNonce::from_slice(nonce_bytes);
            cipher
                .encrypt(nonce, payload)
                .map_err(|_| SesameError::Crypto)
        }
        AeadAlg::Aes256GcmSiv => {
            let cipher = Aes256GcmSiv::new_from_slice(key).map_err(|_| SesameError::Crypto)?;
            let nonce = aes_gcm_siv::Nonce::from_slice(nonce_bytes);
            cipher
                .encrypt(nonce, payload)
                .map_err(|_| SesameError::Crypto)
        }
    }
}

/// Decrypt ciphertext using AEAD with the specified algorithm, key, and nonce.
///
/// # Errors
///
/// Returns `SesameError::Auth` if the tag does not verify (wrong key, tampered
/// data or tampered `aad`).
pub fn aead_decrypt(
    alg: AeadAlg,
    key: &[u8; KEY_LEN],
    nonce_bytes: &[u8],
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, SesameError> {
    let payload = Payload {
        msg: ciphertext,
        aad,
    };
    match alg {
        AeadAlg::XChaCha20Poly1305 => {
            let cipher =
                XChaCha20Poly1305::new_from_slice(key).map_err(|_| SesameError::Crypto)?;
            let nonce = XNonce::from_slice(nonce_bytes);
            cipher
                .decrypt(nonce, payload)
                .map_err(|_| SesameError::Auth)
        }
        AeadAlg::Aes256GcmSiv => {
            let cipher = Aes256GcmSiv::new_from_slice(key).map_err(|_| SesameError::Crypto)?;
            let nonce = aes_gcm_siv::Nonce::from_slice(nonce_bytes);
            cipher
                .decrypt(nonce, payload)
                .map_err(|_| SesameError::Auth)
        }
    }
}

/// Authenticated encryption of `plaintext` under `key`.
///
/// The result is self-contained: it carries the algorithm id and nonce in its
/// header, and the encoded header is bound to the ciphertext as associated data.
pub fn seal(plaintext: &[u8], key: &Key) -> Result<Vec<u8>, SesameError> {
    let nonce = generate_nonce(key.alg())?;
    let header = SealHeader::new(key.alg(), nonce, (plaintext.len() + TAG_LEN) as u64);
    let header_bytes = encode_header(&header)?;
    let ct = aead_encrypt(
        key.alg(),
        key.material(),
        &header.nonce,
        &header_bytes,
        plaintext,
    )?;
    write_envelope(&header_bytes, &ct)
}

/// Authenticated decryption of an artifact produced by [`seal`].
///
/// # Errors
///
/// - `SesameError::Auth` when the key cannot open the artifact.
/// - `SesameError::Malformed`, `UnsupportedVersion` or `UnsupportedAead` when the
///   artifact itself is structurally broken.
pub fn open(data: &[u8], key: &Key) -> Result<Vec<u8>, SesameError> {
    let envelope = read_envelope(data)?;
    if envelope.alg != key.alg() {
        return Err(SesameError::Auth);
    }
    aead_decrypt(
        envelope.alg,
        key.material(),
        &envelope.header.nonce,
        envelope.header_bytes,
        envelope.body,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_bound_as_associated_data() {
        let key = Key::generate(AeadAlg::default()).unwrap();
        let sealed = seal(b"bound", &key).unwrap();
        let envelope = read_envelope(&sealed).unwrap();
        let alg = envelope.alg;
        let nonce = envelope.header.nonce.clone();

        let opened = aead_decrypt(
            alg,
            key.material(),
            &nonce,
            envelope.header_bytes,
            envelope.body,
        )
        .unwrap();
        assert_eq!(opened, b"bound");

        let mut other_header = envelope.header_bytes.to_vec();
        *other_header.last_mut().unwrap() ^= 0x01;
        let res = aead_decrypt(alg, key.material(), &nonce, &other_header, envelope.body);
        assert!(matches!(res, Err(SesameError::Auth)));

        let res = aead_decrypt(alg, key.material(), &nonce, &[], envelope.body);
        assert!(matches!(res, Err(SesameError::Auth)));
    }

    #[test]
    fn recorded_length_matches_ciphertext() {
        for alg in [AeadAlg::XChaCha20Poly1305, AeadAlg::Aes256GcmSiv] {
            let key = Key::generate(alg).unwrap();
            let sealed = seal(b"twelve bytes", &key).unwrap();
            let envelope = read_envelope(&sealed).unwrap();
            assert_eq!(envelope.header.ct_len, envelope.body.len() as u64);
        }
    }
}
