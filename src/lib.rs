//! LoRaWAN cryptographic core and key custody
//!
//! Layers, bottom-up:
//! - [`crypto`]: AES-128, AES-CMAC, AES-GCM, RFC 3394 key wrap, HMAC-SHA-256
//! - [`lorawan`]: key derivations, MICs, payload encryption, ping offsets
//! - [`vault`]: named secrets and TLS certificates
//! - [`service`]: wrap/unwrap, encrypt/decrypt and HMAC by key label
//! - [`envelope`]: key envelopes and selective session key unwrapping
//! - [`cache`]: ARC caches in front of the key service and the vault
//! - [`cryptoservices`]: per-device join and session operations

pub mod cache;
pub mod config;
pub mod crypto;
pub mod cryptoservices;
pub mod envelope;
pub mod error;
pub mod eui;
pub mod kek_label;
pub mod lorawan;
pub mod service;
pub mod vault;

pub use error::{Error, ErrorKind, Result};
