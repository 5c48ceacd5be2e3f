//! AES-128-GCM payload encryption
//!
//! Wire format: `nonce (12) || ciphertext (N) || tag (16)`. The nonce is drawn
//! fresh from the OS RNG for every encryption.

use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes128Gcm, Nonce};

use crate::error::{Error, Result};
use crate::lorawan::AES128Key;

pub const NONCE_SIZE: usize = 12;
pub const TAG_SIZE: usize = 16;

/// Encrypt `plaintext` under `key`; output is `len(plaintext) + 28` bytes
pub fn encrypt(key: &AES128Key, plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes128Gcm::new(GenericArray::from_slice(&key.0));
    let nonce = Aes128Gcm::generate_nonce(&mut OsRng);
    let sealed = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|_| Error::invalid_length("GCM plaintext", plaintext.len()))?;

    let mut out = Vec::with_capacity(NONCE_SIZE + sealed.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Decrypt `nonce || ciphertext || tag` under `key`
pub fn decrypt(key: &AES128Key, data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < NONCE_SIZE {
        return Err(Error::MalformedCipherText);
    }
    let (nonce, sealed) = data.split_at(NONCE_SIZE);
    let cipher = Aes128Gcm::new(GenericArray::from_slice(&key.0));
    cipher
        .decrypt(Nonce::from_slice(nonce), sealed)
        .map_err(|_| Error::MalformedCipherText)
}
