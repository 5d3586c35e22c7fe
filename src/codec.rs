//! Telemetry codec: symmetric encryption of wire payloads
//!
//! Every datagram on the wire is the AES encryption of a UTF-8 payload,
//! padded PKCS#7-style to the 16-byte block size and encrypted block by
//! block with a fixed key and **no initialization vector** (ECB).
//!
//! Identical plaintext blocks therefore produce identical ciphertext
//! blocks, and nothing authenticates the payload. This is the existing
//! wire contract shared with deployed producers and is kept as-is for
//! compatibility. It is not suitable for untrusted networks.
//!
//! The key length selects the cipher: 16 bytes for AES-128, 24 for
//! AES-192, 32 for AES-256.

use aes::cipher::{generic_array::GenericArray, BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes128, Aes192, Aes256};

use crate::error::CodecError;

/// Cipher block size in bytes
pub const BLOCK_SIZE: usize = 16;

/// Demo key shared by the reference producers. Do not deploy with it.
pub const DEMO_KEY: &[u8; 16] = b"0123456789abcdef";

enum BlockCipher {
    Aes128(Aes128),
    Aes192(Aes192),
    Aes256(Aes256),
}

impl BlockCipher {
    fn new(key: &[u8]) -> Result<Self, CodecError> {
        let invalid = |_| CodecError::InvalidKeyLength(key.len());
        match key.len() {
            16 => Aes128::new_from_slice(key).map(Self::Aes128).map_err(invalid),
            24 => Aes192::new_from_slice(key).map(Self::Aes192).map_err(invalid),
            32 => Aes256::new_from_slice(key).map(Self::Aes256).map_err(invalid),
            n => Err(CodecError::InvalidKeyLength(n)),
        }
    }

    fn encrypt_blocks(&self, buf: &mut [u8]) {
        for chunk in buf.chunks_exact_mut(BLOCK_SIZE) {
            let block = GenericArray::from_mut_slice(chunk);
            match self {
                Self::Aes128(c) => c.encrypt_block(block),
                Self::Aes192(c) => c.encrypt_block(block),
                Self::Aes256(c) => c.encrypt_block(block),
            }
        }
    }

    fn decrypt_blocks(&self, buf: &mut [u8]) {
        for chunk in buf.chunks_exact_mut(BLOCK_SIZE) {
            let block = GenericArray::from_mut_slice(chunk);
            match self {
                Self::Aes128(c) => c.decrypt_block(block),
                Self::Aes192(c) => c.decrypt_block(block),
                Self::Aes256(c) => c.decrypt_block(block),
            }
        }
    }

    fn key_bits(&self) -> usize {
        match self {
            Self::Aes128(_) => 128,
            Self::Aes192(_) => 192,
            Self::Aes256(_) => 256,
        }
    }
}

/// Keyed codec for wire payloads
///
/// The key schedule is computed once. The codec is immutable afterwards
/// and can be shared across threads.
pub struct TelemetryCodec {
    cipher: BlockCipher,
}

impl std::fmt::Debug for TelemetryCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryCodec")
            .field("cipher", &format_args!("AES-{}-ECB", self.cipher.key_bits()))
            .finish()
    }
}

impl TelemetryCodec {
    /// Create a codec for the given key (16, 24 or 32 bytes)
    pub fn new(key: &[u8]) -> Result<Self, CodecError> {
        Ok(Self {
            cipher: BlockCipher::new(key)?,
        })
    }

    /// Pad and encrypt a payload. Output length is always a non-zero
    /// multiple of [`BLOCK_SIZE`].
    pub fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        let mut buf = pad(plaintext);
        self.cipher.encrypt_blocks(&mut buf);
        buf
    }

    /// Decrypt a payload and strip its padding
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CodecError> {
        if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
            return Err(CodecError::InvalidLength(ciphertext.len()));
        }
        let mut buf = ciphertext.to_vec();
        self.cipher.decrypt_blocks(&mut buf);
        let len = unpad(&buf)?;
        buf.truncate(len);
        Ok(buf)
    }
}

/// Encrypt `plaintext` under `key`
pub fn encrypt(plaintext: &[u8], key: &[u8]) -> Result<Vec<u8>, CodecError> {
    Ok(TelemetryCodec::new(key)?.encrypt(plaintext))
}

/// Decrypt `ciphertext` under `key`
pub fn decrypt(ciphertext: &[u8], key: &[u8]) -> Result<Vec<u8>, CodecError> {
    TelemetryCodec::new(key)?.decrypt(ciphertext)
}

/// PKCS#7: always appends 1..=BLOCK_SIZE bytes, each equal to the pad length
fn pad(data: &[u8]) -> Vec<u8> {
    let pad_len = BLOCK_SIZE - data.len() % BLOCK_SIZE;
    let mut out = Vec::with_capacity(data.len() + pad_len);
    out.extend_from_slice(data);
    out.resize(data.len() + pad_len, pad_len as u8);
    out
}

/// Returns the unpadded length
fn unpad(data: &[u8]) -> Result<usize, CodecError> {
    let pad_len = *data.last().ok_or(CodecError::InvalidPadding)? as usize;
    if pad_len == 0 || pad_len > BLOCK_SIZE || pad_len > data.len() {
        return Err(CodecError::InvalidPadding);
    }
    let body = data.len() - pad_len;
    if data[body..].iter().any(|&b| b as usize != pad_len) {
        return Err(CodecError::InvalidPadding);
    }
    Ok(body)
}
