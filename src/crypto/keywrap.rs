//! AES Key Wrap (RFC 3394)
//!
//! Wraps key material of n·8 bytes (n ≥ 2) under an AES-128, AES-192 or
//! AES-256 KEK. The output is 8 bytes longer than the input and starts with
//! the integrity check register, which must equal `A6A6A6A6A6A6A6A6` after
//! unwrapping.

use aes::cipher::generic_array::GenericArray;
use aes_kw::{KekAes128, KekAes192, KekAes256};

use crate::error::{Error, Result};

const SEMIBLOCK: usize = 8;

enum Kek {
    Aes128(KekAes128),
    Aes192(KekAes192),
    Aes256(KekAes256),
}

impl Kek {
    fn new(kek: &[u8]) -> Result<Self> {
        match kek.len() {
            16 => Ok(Kek::Aes128(KekAes128::new(GenericArray::from_slice(kek)))),
            24 => Ok(Kek::Aes192(KekAes192::new(GenericArray::from_slice(kek)))),
            32 => Ok(Kek::Aes256(KekAes256::new(GenericArray::from_slice(kek)))),
            n => Err(Error::InvalidKeyLength(n)),
        }
    }
}

fn kw_error(err: aes_kw::Error, len: usize) -> Error {
    match err {
        aes_kw::Error::IntegrityCheckFailed => Error::CorruptKey,
        _ => Error::InvalidKeyLength(len),
    }
}

/// Wrap `key` under `kek`
pub fn wrap_key(key: &[u8], kek: &[u8]) -> Result<Vec<u8>> {
    if key.len() < 2 * SEMIBLOCK || key.len() % SEMIBLOCK != 0 {
        return Err(Error::InvalidKeyLength(key.len()));
    }
    let wrapped = match Kek::new(kek)? {
        Kek::Aes128(kw) => kw.wrap_vec(key),
        Kek::Aes192(kw) => kw.wrap_vec(key),
        Kek::Aes256(kw) => kw.wrap_vec(key),
    };
    wrapped.map_err(|e| kw_error(e, key.len()))
}

/// Unwrap `wrapped` under `kek`, verifying the integrity check register
pub fn unwrap_key(wrapped: &[u8], kek: &[u8]) -> Result<Vec<u8>> {
    if wrapped.len() < 3 * SEMIBLOCK || wrapped.len() % SEMIBLOCK != 0 {
        return Err(Error::InvalidKeyLength(wrapped.len()));
    }
    let key = match Kek::new(kek)? {
        Kek::Aes128(kw) => kw.unwrap_vec(wrapped),
        Kek::Aes192(kw) => kw.unwrap_vec(wrapped),
        Kek::Aes256(kw) => kw.unwrap_vec(wrapped),
    };
    key.map_err(|e| kw_error(e, wrapped.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_DATA: [u8; 16] = [
        0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE,
        0xFF,
    ];

    fn kek(len: usize) -> Vec<u8> {
        (0..len as u8).collect()
    }

    #[test]
    fn test_rfc3394_128_bit_kek() {
        // RFC 3394 §4.1
        let wrapped = wrap_key(&KEY_DATA, &kek(16)).unwrap();
        assert_eq!(
            wrapped,
            vec![
                0x1F, 0xA6, 0x8B, 0x0A, 0x81, 0x12, 0xB4, 0x47, 0xAE, 0xF3, 0x4B, 0xD8, 0xFB,
                0x5A, 0x7B, 0x82, 0x9D, 0x3E, 0x86, 0x23, 0x71, 0xD2, 0xCF, 0xE5,
            ]
        );
        assert_eq!(unwrap_key(&wrapped, &kek(16)).unwrap(), KEY_DATA.to_vec());
    }

    #[test]
    fn test_rfc3394_256_bit_kek() {
        // RFC 3394 §4.3
        let wrapped = wrap_key(&KEY_DATA, &kek(32)).unwrap();
        assert_eq!(
            hex::encode_upper(&wrapped),
            "64E8C3F9CE0F5BA263E9777905818A2A93C8191E7D6E8AE7"
        );
    }

    #[test]
    fn test_wrap_unwrap_all_kek_sizes() {
        for kek_len in [16, 24, 32] {
            for key_len in [16, 24, 32, 40] {
                let key: Vec<u8> = (0..key_len as u8).map(|b| b.wrapping_mul(7)).collect();
                let wrapped = wrap_key(&key, &kek(kek_len)).unwrap();
                assert_eq!(wrapped.len(), key_len + 8);
                assert_eq!(unwrap_key(&wrapped, &kek(kek_len)).unwrap(), key);
            }
        }
    }

    #[test]
    fn test_unwrap_wrong_kek_is_corrupt() {
        let wrapped = wrap_key(&KEY_DATA, &kek(16)).unwrap();
        let other = [0x55u8; 16];
        assert_eq!(unwrap_key(&wrapped, &other), Err(Error::CorruptKey));
    }

    #[test]
    fn test_unwrap_tampered_is_corrupt() {
        let mut wrapped = wrap_key(&KEY_DATA, &kek(24)).unwrap();
        wrapped[0] ^= 0x01;
        assert_eq!(unwrap_key(&wrapped, &kek(24)), Err(Error::CorruptKey));
    }

    #[test]
    fn test_invalid_lengths() {
        assert_eq!(wrap_key(&[0u8; 8], &kek(16)), Err(Error::InvalidKeyLength(8)));
        assert_eq!(wrap_key(&[0u8; 17], &kek(16)), Err(Error::InvalidKeyLength(17)));
        assert_eq!(wrap_key(&[], &kek(16)), Err(Error::InvalidKeyLength(0)));
        assert_eq!(wrap_key(&KEY_DATA, &kek(15)), Err(Error::InvalidKeyLength(15)));
        assert_eq!(unwrap_key(&[0u8; 16], &kek(16)), Err(Error::InvalidKeyLength(16)));
        assert_eq!(unwrap_key(&[0u8; 25], &kek(16)), Err(Error::InvalidKeyLength(25)));
    }
}
