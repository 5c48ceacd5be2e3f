//! LoRaWAN cryptographic operations
//!
//! Byte-exact implementations of the LoRaWAN 1.0.x / 1.1 key derivations,
//! MICs, payload encryption and ping-slot computation. Everything here is
//! pure and deterministic.

pub mod keys;
pub mod mic;
pub mod payload;
pub mod ping;
pub mod types;

pub use types::{reverse, AES128Key, DevAddr, DevNonce, JoinNonce, MacVersion, Mic, NetID, EUI64};

/// Direction byte of uplink frames in A/B0 blocks
pub const UPLINK: u8 = 0x00;
/// Direction byte of downlink frames in A/B0 blocks
pub const DOWNLINK: u8 = 0x01;
