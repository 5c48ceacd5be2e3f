//! Cryptographic primitives
//!
//! Pure functions over fixed-size buffers. The LoRaWAN layer validates
//! sizes before calling in here, so these never fail on well-typed input.
//!
//! - AES-128 single block encrypt/decrypt (ECB)
//! - AES-CMAC (RFC 4493)
//! - HMAC-SHA-256
//! - AES-GCM in [`gcm`], RFC 3394 key wrap in [`keywrap`]

pub mod gcm;
pub mod keywrap;

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes128;
use cmac::{Cmac, Mac};
use hmac::Hmac;
use sha2::Sha256;

use crate::lorawan::AES128Key;

type HmacSha256 = Hmac<Sha256>;

/// AES block size in bytes
pub const BLOCK_SIZE: usize = 16;

fn cipher(key: &AES128Key) -> Aes128 {
    Aes128::new(GenericArray::from_slice(&key.0))
}

/// Encrypt a single 16-byte block under `key`
pub fn aes128_encrypt(key: &AES128Key, block: &[u8; BLOCK_SIZE]) -> [u8; BLOCK_SIZE] {
    let mut b = GenericArray::clone_from_slice(block);
    cipher(key).encrypt_block(&mut b);
    b.into()
}

/// Decrypt a single 16-byte block under `key`
pub fn aes128_decrypt(key: &AES128Key, block: &[u8; BLOCK_SIZE]) -> [u8; BLOCK_SIZE] {
    let mut b = GenericArray::clone_from_slice(block);
    cipher(key).decrypt_block(&mut b);
    b.into()
}

/// AES-CMAC over the concatenation of `parts`
pub fn aes128_cmac(key: &AES128Key, parts: &[&[u8]]) -> [u8; BLOCK_SIZE] {
    let mut mac = <Cmac<Aes128> as Mac>::new(GenericArray::from_slice(&key.0));
    for part in parts {
        mac.update(part);
    }
    mac.finalize().into_bytes().into()
}

/// HMAC-SHA-256 of `payload` under `key`; the full 32-byte tag
pub fn hmac_sha256(key: &[u8], payload: &[u8]) -> [u8; 32] {
    // HMAC accepts keys of any length.
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
        .unwrap_or_else(|_| unreachable!("HMAC takes keys of any length"));
    mac.update(payload);
    mac.finalize().into_bytes().into()
}
