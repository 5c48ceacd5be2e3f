//! FRMPayload and join-accept encryption
//!
//! FRMPayload (§4.3.3): a keystream of AES-encrypted A blocks is XORed with
//! the payload, so encryption and decryption are the same operation.
//!
//!   A_i = [0x01 | pad(4) | Dir | DevAddr(4,LE) | FCnt(4,LE) | 0x00 | i]
//!
//! Join-accept (§6.2.3): the network AES-*decrypts* the payload so the
//! device only needs AES encrypt to recover it.

use bytes::BufMut;

use super::types::{AES128Key, DevAddr};
use super::{DOWNLINK, UPLINK};
use crate::crypto::{aes128_decrypt, aes128_encrypt, BLOCK_SIZE};
use crate::error::{Error, Result};

fn keystream_block(dir: u8, dev_addr: &DevAddr, fcnt: u32, i: u8) -> [u8; 16] {
    let mut block = [0u8; 16];
    {
        let mut buf = &mut block[..];
        buf.put_u8(0x01);
        buf.put_u32(0);
        buf.put_u8(dir);
        buf.put_slice(&dev_addr.to_le_bytes());
        buf.put_u32_le(fcnt);
        buf.put_u8(0x00);
        buf.put_u8(i);
    }
    block
}

fn encrypt_message(
    key: &AES128Key,
    dir: u8,
    dev_addr: &DevAddr,
    fcnt: u32,
    payload: &[u8],
) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(payload.len());
    for (i, chunk) in payload.chunks(BLOCK_SIZE).enumerate() {
        // Block index is 1-based and one byte wide
        let index = u8::try_from(i + 1)
            .map_err(|_| Error::invalid_length("FRMPayload", payload.len()))?;
        let s = aes128_encrypt(key, &keystream_block(dir, dev_addr, fcnt, index));
        out.extend(chunk.iter().zip(s.iter()).map(|(p, k)| p ^ k));
    }
    Ok(out)
}

/// Encrypt an uplink FRMPayload of at most 255 blocks
pub fn encrypt_uplink(key: &AES128Key, dev_addr: &DevAddr, fcnt: u32, payload: &[u8]) -> Result<Vec<u8>> {
    encrypt_message(key, UPLINK, dev_addr, fcnt, payload)
}

/// Decrypt an uplink FRMPayload
pub fn decrypt_uplink(key: &AES128Key, dev_addr: &DevAddr, fcnt: u32, payload: &[u8]) -> Result<Vec<u8>> {
    encrypt_message(key, UPLINK, dev_addr, fcnt, payload)
}

/// Encrypt a downlink FRMPayload of at most 255 blocks
pub fn encrypt_downlink(key: &AES128Key, dev_addr: &DevAddr, fcnt: u32, payload: &[u8]) -> Result<Vec<u8>> {
    encrypt_message(key, DOWNLINK, dev_addr, fcnt, payload)
}

/// Decrypt a downlink FRMPayload
pub fn decrypt_downlink(key: &AES128Key, dev_addr: &DevAddr, fcnt: u32, payload: &[u8]) -> Result<Vec<u8>> {
    encrypt_message(key, DOWNLINK, dev_addr, fcnt, payload)
}

/// Select the FRMPayload key: FPort 0 carries MAC commands and uses the
/// network key (NwkSEncKey in 1.1, NwkSKey in 1.0), other ports use AppSKey.
///
/// In 1.0 sessions the NwkSKey is passed as `nwk_s_enc_key`.
pub fn frm_payload_key<'a>(
    f_port: u8,
    app_s_key: &'a AES128Key,
    nwk_s_enc_key: &'a AES128Key,
) -> &'a AES128Key {
    if f_port == 0 {
        nwk_s_enc_key
    } else {
        app_s_key
    }
}

fn check_join_accept_len(payload: &[u8]) -> Result<()> {
    if payload.len() != 16 && payload.len() != 32 {
        return Err(Error::invalid_length("join-accept payload", payload.len()));
    }
    Ok(())
}

fn map_blocks(payload: &[u8], f: impl Fn(&[u8; 16]) -> [u8; 16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len());
    for chunk in payload.chunks_exact(BLOCK_SIZE) {
        let mut block = [0u8; 16];
        block.copy_from_slice(chunk);
        out.extend_from_slice(&f(&block));
    }
    out
}

/// Encrypt a join-accept (without MHDR, with MIC); 16 or 32 bytes.
///
/// The key is AppKey in 1.0, NwkKey for a 1.1 join-accept and JSEncKey for
/// a 1.1 rejoin-accept.
pub fn encrypt_join_accept(key: &AES128Key, payload: &[u8]) -> Result<Vec<u8>> {
    check_join_accept_len(payload)?;
    Ok(map_blocks(payload, |b| aes128_decrypt(key, b)))
}

/// Decrypt a join-accept as the device does
pub fn decrypt_join_accept(key: &AES128Key, payload: &[u8]) -> Result<Vec<u8>> {
    check_join_accept_len(payload)?;
    Ok(map_blocks(payload, |b| aes128_encrypt(key, b)))
}
