//! On-disk format of a sealed artifact.
//!
//! Layout: `u32 LE header length | CBOR SealHeader | ciphertext`. The encoded
//! header is authenticated as AEAD associated data.

use serde::{Deserialize, Serialize};

use crate::crypto::nonce_len_for;
use crate::types::{AeadAlg, SesameError};

pub const MAGIC: &[u8; 8] = b"SESAME\0\0";
pub const VERSION: u16 = 1;

/// Upper bound for the CBOR header; anything larger is not one of ours.
const MAX_HEADER_LEN: usize = 4096;

/// Versioned header (CBOR-encoded).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealHeader {
    pub magic: [u8; 8],
    pub version: u16,
    pub aead_alg: u8,
    pub nonce: Vec<u8>,
    /// Ciphertext length including the tag, checked against what follows the header.
    pub ct_len: u64,
}

impl SealHeader {
    pub fn new(aead_alg: AeadAlg, nonce: Vec<u8>, ct_len: u64) -> Self {
        Self {
            magic: *MAGIC,
            version: VERSION,
            aead_alg: aead_alg as u8,
            nonce,
            ct_len,
        }
    }

    /// Algorithm named by the header, after validating the fields against it.
    pub fn validate(&self) -> Result<AeadAlg, SesameError> {
        if &self.magic != MAGIC {
            return Err(SesameError::Malformed);
        }
        if self.version != VERSION {
            return Err(SesameError::UnsupportedVersion(self.version));
        }
        let alg = AeadAlg::try_from(self.aead_alg)?;
        if self.nonce.len() != nonce_len_for(alg) {
            return Err(SesameError::Malformed);
        }
        Ok(alg)
    }
}

/// CBOR encoding of `header`, exactly as framed into the artifact.
pub fn encode_header(header: &SealHeader) -> Result<Vec<u8>, SesameError> {
    let mut header_bytes = Vec::new();
    ciborium::into_writer(header, &mut header_bytes)?;
    Ok(header_bytes)
}

/// Frame encoded header bytes and ciphertext into one artifact.
pub fn write_envelope(header_bytes: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, SesameError> {
    let header_len =
        u32::try_from(header_bytes.len()).map_err(|_| SesameError::Invalid("header too large"))?;

    let mut out = Vec::with_capacity(4 + header_bytes.len() + ciphertext.len());
    out.extend_from_slice(&header_len.to_le_bytes());
    out.extend_from_slice(header_bytes);
    out.extend_from_slice(ciphertext);
    Ok(out)
}

/// A parsed artifact, borrowing from the input buffer.
#[derive(Debug)]
pub struct Envelope<'a> {
    pub header: SealHeader,
    pub alg: AeadAlg,
    /// Raw header bytes; the AEAD associated data.
    pub header_bytes: &'a [u8],
    pub body: &'a [u8],
}

/// Split an artifact into its validated header and the ciphertext body.
///
/// Every structural problem maps to [`SesameError::Malformed`] (or the
/// version/algorithm variants); none of them is an authentication failure.
pub fn read_envelope(data: &[u8]) -> Result<Envelope<'_>, SesameError> {
    let len_bytes: [u8; 4] = data
        .get(..4)
        .and_then(|b| b.try_into().ok())
        .ok_or(SesameError::Malformed)?;
    let header_len = u32::from_le_bytes(len_bytes) as usize;
    if header_len == 0 || header_len > MAX_HEADER_LEN {
        return Err(SesameError::Malformed);
    }

    let header_bytes = data.get(4..4 + header_len).ok_or(SesameError::Malformed)?;
    let header: SealHeader =
        ciborium::from_reader(header_bytes).map_err(|_| SesameError::Malformed)?;
    let alg = header.validate()?;

    let body = &data[4 + header_len..];
    if body.len() as u64 != header.ct_len {
        return Err(SesameError::Malformed);
    }
    Ok(Envelope {
        header,
        alg,
        header_bytes,
        body,
    })
}
