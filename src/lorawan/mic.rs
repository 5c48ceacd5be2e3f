//! LoRaWAN message integrity codes
//!
//! A MIC is the first 4 bytes of an AES-CMAC. Join and rejoin MICs are
//! computed over the PHY payload without MIC; data-frame MICs prepend a
//! B0/B1 block to the PHY payload without MIC:
//!
//!   B0 = [0x49 | ConfFCnt(2,LE) | pad(2) | Dir | DevAddr(4,LE) | FCnt(4,LE) | 0x00 | len(msg)]
//!   B1 = [0x49 | ConfFCnt(2,LE) | TxDr | TxCh | Dir | DevAddr(4,LE) | FCnt(4,LE) | 0x00 | len(msg)]
//!
//! ConfFCnt, TxDr and TxCh are zero in LoRaWAN 1.0.

use bytes::BufMut;

use super::types::{AES128Key, DevAddr, DevNonce, Mic, EUI64};
use super::{DOWNLINK, UPLINK};
use crate::crypto::aes128_cmac;
use crate::error::{Error, Result};

/// MHDR | JoinEUI | DevEUI | DevNonce
pub const JOIN_REQUEST_LEN: usize = 19;
/// MHDR | JoinNonce | NetID | DevAddr | DLSettings | RxDelay
pub const JOIN_ACCEPT_LEN: usize = 13;
/// Join-accept with a 16-byte CFList
pub const JOIN_ACCEPT_CFLIST_LEN: usize = 29;
/// MHDR | type | NetID | DevEUI | RJcount0
pub const REJOIN_REQUEST_0_2_LEN: usize = 15;
/// MHDR | type | JoinEUI | DevEUI | RJcount1
pub const REJOIN_REQUEST_1_LEN: usize = 20;

/// JoinReqType of an ordinary join-request (join-accept MIC, OptNeg=1)
pub const JOIN_REQUEST_TYPE: u8 = 0xFF;

/// MHDR | DevAddr | FCtrl | FCnt
const DATA_HEADER_LEN: usize = 8;
const FCTRL_ACK: u8 = 0x20;

fn first_four(tag: [u8; 16]) -> Mic {
    [tag[0], tag[1], tag[2], tag[3]]
}

/// MIC of a join-request; `payload` must be exactly 19 bytes
pub fn compute_join_request_mic(key: &AES128Key, payload: &[u8]) -> Result<Mic> {
    if payload.len() != JOIN_REQUEST_LEN {
        return Err(Error::invalid_length("join-request payload", payload.len()));
    }
    Ok(first_four(aes128_cmac(key, &[payload])))
}

fn check_join_accept_len(payload: &[u8]) -> Result<()> {
    if payload.len() != JOIN_ACCEPT_LEN && payload.len() != JOIN_ACCEPT_CFLIST_LEN {
        return Err(Error::invalid_length("join-accept payload", payload.len()));
    }
    Ok(())
}

/// MIC of a LoRaWAN 1.0 (or 1.1 OptNeg=0) join-accept; `payload` must be
/// 13 or 29 bytes
pub fn compute_legacy_join_accept_mic(key: &AES128Key, payload: &[u8]) -> Result<Mic> {
    check_join_accept_len(payload)?;
    Ok(first_four(aes128_cmac(key, &[payload])))
}

/// MIC of a LoRaWAN 1.1 (OptNeg=1) join-accept under JSIntKey.
///
/// `join_req_type` is [`JOIN_REQUEST_TYPE`] for a join-request or the rejoin
/// type (0, 1, 2) for a rejoin-request.
pub fn compute_join_accept_mic(
    js_int_key: &AES128Key,
    join_req_type: u8,
    join_eui: &EUI64,
    dev_nonce: &DevNonce,
    payload: &[u8],
) -> Result<Mic> {
    check_join_accept_len(payload)?;
    let mut prefix = [0u8; 11];
    {
        let mut buf = &mut prefix[..];
        buf.put_u8(join_req_type);
        buf.put_slice(&join_eui.to_le_bytes());
        buf.put_slice(&dev_nonce.to_le_bytes());
    }
    Ok(first_four(aes128_cmac(js_int_key, &[&prefix[..], payload])))
}

/// MIC of a rejoin-request.
///
/// The caller picks the key: SNwkSIntKey for types 0 and 2, JSIntKey for
/// type 1. The length must match the type byte at offset 1.
pub fn compute_rejoin_request_mic(key: &AES128Key, payload: &[u8]) -> Result<Mic> {
    if payload.len() < 2 {
        return Err(Error::invalid_length("rejoin-request payload", payload.len()));
    }
    let expected = match payload[1] {
        0 | 2 => REJOIN_REQUEST_0_2_LEN,
        1 => REJOIN_REQUEST_1_LEN,
        t => return Err(Error::InvalidRejoinType(t)),
    };
    if payload.len() != expected {
        return Err(Error::invalid_length("rejoin-request payload", payload.len()));
    }
    Ok(first_four(aes128_cmac(key, &[payload])))
}

fn data_block(
    conf_fcnt: u16,
    tx_dr_idx: u8,
    tx_ch_idx: u8,
    dir: u8,
    dev_addr: &DevAddr,
    fcnt: u32,
    len: usize,
) -> Result<[u8; 16]> {
    let len: u8 = len
        .try_into()
        .map_err(|_| Error::invalid_length("data frame payload", len))?;
    let mut block = [0u8; 16];
    {
        let mut buf = &mut block[..];
        buf.put_u8(0x49);
        buf.put_u16_le(conf_fcnt);
        buf.put_u8(tx_dr_idx);
        buf.put_u8(tx_ch_idx);
        buf.put_u8(dir);
        buf.put_slice(&dev_addr.to_le_bytes());
        buf.put_u32_le(fcnt);
        buf.put_u8(0x00);
        buf.put_u8(len);
    }
    Ok(block)
}

fn legacy_data_mic(
    key: &AES128Key,
    dir: u8,
    dev_addr: &DevAddr,
    fcnt: u32,
    payload: &[u8],
) -> Result<Mic> {
    let b0 = data_block(0, 0, 0, dir, dev_addr, fcnt, payload.len())?;
    Ok(first_four(aes128_cmac(key, &[&b0[..], payload])))
}

/// ConfFCnt only applies when the frame acknowledges a confirmed frame
fn effective_conf_fcnt(payload: &[u8], conf_fcnt: u32) -> Result<u16> {
    if payload.len() < DATA_HEADER_LEN {
        return Err(Error::invalid_length("data frame payload", payload.len()));
    }
    if payload[5] & FCTRL_ACK == 0 {
        return Ok(0);
    }
    // Only the 16 least significant bits are transmitted
    Ok(conf_fcnt as u16)
}

/// Uplink MIC under NwkSKey (LoRaWAN 1.0)
pub fn compute_legacy_uplink_mic(
    nwk_s_key: &AES128Key,
    dev_addr: &DevAddr,
    fcnt: u32,
    payload: &[u8],
) -> Result<Mic> {
    legacy_data_mic(nwk_s_key, UPLINK, dev_addr, fcnt, payload)
}

/// Downlink MIC under NwkSKey (LoRaWAN 1.0)
pub fn compute_legacy_downlink_mic(
    nwk_s_key: &AES128Key,
    dev_addr: &DevAddr,
    fcnt: u32,
    payload: &[u8],
) -> Result<Mic> {
    legacy_data_mic(nwk_s_key, DOWNLINK, dev_addr, fcnt, payload)
}

/// Uplink MIC (LoRaWAN 1.1): `cmacS[0..2] || cmacF[0..2]`.
///
/// `conf_fcnt` is ignored unless the ACK bit is set in FCtrl.
#[allow(clippy::too_many_arguments)]
pub fn compute_uplink_mic(
    s_nwk_s_int_key: &AES128Key,
    f_nwk_s_int_key: &AES128Key,
    conf_fcnt: u32,
    tx_dr_idx: u8,
    tx_ch_idx: u8,
    dev_addr: &DevAddr,
    fcnt: u32,
    payload: &[u8],
) -> Result<Mic> {
    let conf_fcnt = effective_conf_fcnt(payload, conf_fcnt)?;
    let b0 = data_block(0, 0, 0, UPLINK, dev_addr, fcnt, payload.len())?;
    let b1 = data_block(conf_fcnt, tx_dr_idx, tx_ch_idx, UPLINK, dev_addr, fcnt, payload.len())?;
    let cmac_f = aes128_cmac(f_nwk_s_int_key, &[&b0[..], payload]);
    let cmac_s = aes128_cmac(s_nwk_s_int_key, &[&b1[..], payload]);
    Ok([cmac_s[0], cmac_s[1], cmac_f[0], cmac_f[1]])
}

/// Downlink MIC under SNwkSIntKey (LoRaWAN 1.1).
///
/// `conf_fcnt` is ignored unless the ACK bit is set in FCtrl.
pub fn compute_downlink_mic(
    s_nwk_s_int_key: &AES128Key,
    dev_addr: &DevAddr,
    conf_fcnt: u32,
    fcnt: u32,
    payload: &[u8],
) -> Result<Mic> {
    let conf_fcnt = effective_conf_fcnt(payload, conf_fcnt)?;
    let b0 = data_block(conf_fcnt, 0, 0, DOWNLINK, dev_addr, fcnt, payload.len())?;
    Ok(first_four(aes128_cmac(s_nwk_s_int_key, &[&b0[..], payload])))
}
