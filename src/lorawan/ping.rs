//! Class B ping-slot offset (§13.1 of 1.0.4 / §14.1 of 1.1)
//!
//! Rand = aes128_encrypt(0x00..00, [BeaconTime(4,LE) | DevAddr(4,LE) | pad(8)])
//! PingOffset = (Rand[0] + Rand[1]·256) mod PingPeriod

use bytes::BufMut;

use super::types::{AES128Key, DevAddr};
use crate::crypto::aes128_encrypt;
use crate::error::{Error, Result};

pub const MIN_PING_PERIOD: u32 = 1 << 5;
pub const MAX_PING_PERIOD: u32 = 1 << 12;

/// Ping offset of `dev_addr` in the beacon period starting at `beacon_time`.
///
/// `ping_period` must be a power of two in [32, 4096].
pub fn compute_ping_offset(beacon_time: u32, dev_addr: &DevAddr, ping_period: u32) -> Result<u16> {
    if !ping_period.is_power_of_two() || !(MIN_PING_PERIOD..=MAX_PING_PERIOD).contains(&ping_period) {
        return Err(Error::InvalidPingPeriod(ping_period));
    }

    let mut block = [0u8; 16];
    {
        let mut buf = &mut block[..];
        buf.put_u32_le(beacon_time);
        buf.put_slice(&dev_addr.to_le_bytes());
    }
    let rand = aes128_encrypt(&AES128Key::default(), &block);
    let offset = u32::from(u16::from_le_bytes([rand[0], rand[1]])) % ping_period;
    // ping_period ≤ 4096 keeps the offset within u16
    Ok(offset as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ping_offset_vector() {
        let addr = DevAddr([0x00, 0x42, 0x00, 0xFF]);
        assert_eq!(compute_ping_offset(0xFF42, &addr, 4096).unwrap(), 3994);
    }

    #[test]
    fn test_ping_period_bounds() {
        let addr = DevAddr([0x00, 0x42, 0x00, 0xFF]);
        for period in [32u32, 64, 128, 256, 512, 1024, 2048, 4096] {
            let offset = compute_ping_offset(0xFF42, &addr, period).unwrap();
            assert!(u32::from(offset) < period);
        }
        for period in [0u32, 16, 31, 33, 100, 4097, 8192] {
            assert_eq!(
                compute_ping_offset(0xFF42, &addr, period),
                Err(Error::InvalidPingPeriod(period))
            );
        }
    }
}
