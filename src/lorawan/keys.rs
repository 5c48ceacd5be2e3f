//! LoRaWAN key derivation
//!
//! Every derived key is a single AES-128-ECB encryption of a 16-byte block
//! under a root or session key. Multi-byte fields go into the block in
//! over-the-air (little-endian) order.
//!
//! LoRaWAN 1.1 session keys (§6.2.5):
//!   [type(1) | JoinNonce(3) | JoinEUI(8) | DevNonce(2) | pad(2)]
//!
//! LoRaWAN 1.0 session keys (§6.2.5 of 1.0.x):
//!   [type(1) | AppNonce(3) | NetID(3) | DevNonce(2) | pad(7)]
//!
//! Join Server keys (§6.2.2 of 1.1):
//!   [type(1) | DevEUI(8) | pad(7)]

use bytes::BufMut;

use super::types::{DevAddr, DevNonce, JoinNonce, NetID, AES128Key, EUI64};
use crate::crypto::aes128_encrypt;

const FNWK_S_INT_KEY: u8 = 0x01;
const APP_S_KEY: u8 = 0x02;
const SNWK_S_INT_KEY: u8 = 0x03;
const NWK_S_ENC_KEY: u8 = 0x04;

const LEGACY_NWK_S_KEY: u8 = 0x01;
const LEGACY_APP_S_KEY: u8 = 0x02;

const JS_ENC_KEY: u8 = 0x05;
const JS_INT_KEY: u8 = 0x06;

const WOR_S_INT_KEY: u8 = 0x01;
const WOR_S_ENC_KEY: u8 = 0x02;

/// "WOR" framed with type byte 0x01
const ROOT_WOR_S_KEY_BLOCK: [u8; 16] = [0x01, b'W', b'O', b'R', 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];

fn derive_session_key(
    typ: u8,
    key: &AES128Key,
    join_nonce: &JoinNonce,
    join_eui: &EUI64,
    dev_nonce: &DevNonce,
) -> AES128Key {
    let mut block = [0u8; 16];
    {
        let mut buf = &mut block[..];
        buf.put_u8(typ);
        buf.put_slice(&join_nonce.to_le_bytes());
        buf.put_slice(&join_eui.to_le_bytes());
        buf.put_slice(&dev_nonce.to_le_bytes());
    }
    AES128Key(aes128_encrypt(key, &block))
}

fn derive_legacy_session_key(
    typ: u8,
    key: &AES128Key,
    join_nonce: &JoinNonce,
    net_id: &NetID,
    dev_nonce: &DevNonce,
) -> AES128Key {
    let mut block = [0u8; 16];
    {
        let mut buf = &mut block[..];
        buf.put_u8(typ);
        buf.put_slice(&join_nonce.to_le_bytes());
        buf.put_slice(&net_id.to_le_bytes());
        buf.put_slice(&dev_nonce.to_le_bytes());
    }
    AES128Key(aes128_encrypt(key, &block))
}

fn derive_device_key(typ: u8, key: &AES128Key, dev_eui: &EUI64) -> AES128Key {
    let mut block = [0u8; 16];
    {
        let mut buf = &mut block[..];
        buf.put_u8(typ);
        buf.put_slice(&dev_eui.to_le_bytes());
    }
    AES128Key(aes128_encrypt(key, &block))
}

fn derive_addr_key(typ: u8, key: &AES128Key, dev_addr: &DevAddr) -> AES128Key {
    let mut block = [0u8; 16];
    {
        let mut buf = &mut block[..];
        buf.put_u8(typ);
        buf.put_slice(&dev_addr.to_le_bytes());
    }
    AES128Key(aes128_encrypt(key, &block))
}

/// FNwkSIntKey from NwkKey (LoRaWAN 1.1)
pub fn derive_f_nwk_s_int_key(
    nwk_key: &AES128Key,
    join_nonce: &JoinNonce,
    join_eui: &EUI64,
    dev_nonce: &DevNonce,
) -> AES128Key {
    derive_session_key(FNWK_S_INT_KEY, nwk_key, join_nonce, join_eui, dev_nonce)
}

/// AppSKey from AppKey (LoRaWAN 1.1)
pub fn derive_app_s_key(
    app_key: &AES128Key,
    join_nonce: &JoinNonce,
    join_eui: &EUI64,
    dev_nonce: &DevNonce,
) -> AES128Key {
    derive_session_key(APP_S_KEY, app_key, join_nonce, join_eui, dev_nonce)
}

/// SNwkSIntKey from NwkKey (LoRaWAN 1.1)
pub fn derive_s_nwk_s_int_key(
    nwk_key: &AES128Key,
    join_nonce: &JoinNonce,
    join_eui: &EUI64,
    dev_nonce: &DevNonce,
) -> AES128Key {
    derive_session_key(SNWK_S_INT_KEY, nwk_key, join_nonce, join_eui, dev_nonce)
}

/// NwkSEncKey from NwkKey (LoRaWAN 1.1)
pub fn derive_nwk_s_enc_key(
    nwk_key: &AES128Key,
    join_nonce: &JoinNonce,
    join_eui: &EUI64,
    dev_nonce: &DevNonce,
) -> AES128Key {
    derive_session_key(NWK_S_ENC_KEY, nwk_key, join_nonce, join_eui, dev_nonce)
}

/// NwkSKey (LoRaWAN 1.0). A 1.1 device joining a 1.0 network passes its
/// NwkKey as `key`.
pub fn derive_legacy_nwk_s_key(
    key: &AES128Key,
    app_nonce: &JoinNonce,
    net_id: &NetID,
    dev_nonce: &DevNonce,
) -> AES128Key {
    derive_legacy_session_key(LEGACY_NWK_S_KEY, key, app_nonce, net_id, dev_nonce)
}

/// AppSKey (LoRaWAN 1.0). A 1.1 device joining a 1.0 network passes its
/// NwkKey as `key`.
pub fn derive_legacy_app_s_key(
    key: &AES128Key,
    app_nonce: &JoinNonce,
    net_id: &NetID,
    dev_nonce: &DevNonce,
) -> AES128Key {
    derive_legacy_session_key(LEGACY_APP_S_KEY, key, app_nonce, net_id, dev_nonce)
}

/// JSIntKey, used for the 1.1 join-accept MIC and rejoin type 1 MIC
pub fn derive_js_int_key(nwk_key: &AES128Key, dev_eui: &EUI64) -> AES128Key {
    derive_device_key(JS_INT_KEY, nwk_key, dev_eui)
}

/// JSEncKey, used to encrypt rejoin-accepts
pub fn derive_js_enc_key(nwk_key: &AES128Key, dev_eui: &EUI64) -> AES128Key {
    derive_device_key(JS_ENC_KEY, nwk_key, dev_eui)
}

/// Relay root WOR session key (TS011)
pub fn derive_root_wor_s_key(nwk_s_enc_key: &AES128Key) -> AES128Key {
    AES128Key(aes128_encrypt(nwk_s_enc_key, &ROOT_WOR_S_KEY_BLOCK))
}

/// Relay WOR integrity key for the relay at `dev_addr`
pub fn derive_wor_s_int_key(root_wor_s_key: &AES128Key, dev_addr: &DevAddr) -> AES128Key {
    derive_addr_key(WOR_S_INT_KEY, root_wor_s_key, dev_addr)
}

/// Relay WOR encryption key for the relay at `dev_addr`
pub fn derive_wor_s_enc_key(root_wor_s_key: &AES128Key, dev_addr: &DevAddr) -> AES128Key {
    derive_addr_key(WOR_S_ENC_KEY, root_wor_s_key, dev_addr)
}
