//! Crypto services: LoRaWAN join and session operations per device
//!
//! The network side covers join-request/join-accept MICs, join-accept and
//! rejoin-accept encryption and network session key derivation. The
//! application side derives AppSKey. Both choose the LoRaWAN 1.1 regime for
//! `version >= 1.1` and the legacy regime below.
//!
//! Implementations:
//! - [`MemoryCryptoService`] holds optional root keys in process
//! - [`RemoteCryptoService`] forwards to a [`CryptoTransport`] and unwraps
//!   returned envelopes through a [`crate::service::KeyService`]

pub mod memory;
pub mod remote;

#[cfg(feature = "remote")]
pub mod http;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::lorawan::{AES128Key, DevNonce, JoinNonce, MacVersion, Mic, NetID, EUI64};

pub use memory::MemoryCryptoService;
pub use remote::{CryptoTransport, RemoteCryptoService};

#[cfg(feature = "remote")]
pub use http::HttpCryptoTransport;

/// Device descriptor handed to the crypto services
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Device {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_eui: Option<EUI64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dev_eui: Option<EUI64>,
    /// Provisioner that issued the device's root keys
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub provisioner_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning_data: Option<serde_json::Value>,
}

impl Device {
    pub fn new(join_eui: EUI64, dev_eui: EUI64) -> Self {
        Self {
            join_eui: Some(join_eui),
            dev_eui: Some(dev_eui),
            ..Default::default()
        }
    }
}

/// Network session keys. Legacy devices only have FNwkSIntKey (NwkSKey);
/// the other two are zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NwkSKeys {
    pub f_nwk_s_int_key: AES128Key,
    pub s_nwk_s_int_key: AES128Key,
    pub nwk_s_enc_key: AES128Key,
}

#[async_trait]
pub trait NetworkCryptoService: Send + Sync {
    async fn join_request_mic(
        &self,
        dev: &Device,
        version: MacVersion,
        payload: &[u8],
    ) -> Result<Mic>;

    async fn join_accept_mic(
        &self,
        dev: &Device,
        version: MacVersion,
        join_req_type: u8,
        dev_nonce: &DevNonce,
        payload: &[u8],
    ) -> Result<Mic>;

    async fn encrypt_join_accept(
        &self,
        dev: &Device,
        version: MacVersion,
        payload: &[u8],
    ) -> Result<Vec<u8>>;

    async fn encrypt_rejoin_accept(
        &self,
        dev: &Device,
        version: MacVersion,
        payload: &[u8],
    ) -> Result<Vec<u8>>;

    async fn derive_nwk_s_keys(
        &self,
        dev: &Device,
        version: MacVersion,
        join_nonce: &JoinNonce,
        dev_nonce: &DevNonce,
        net_id: &NetID,
    ) -> Result<NwkSKeys>;

    /// NwkKey of `dev`, `None` when root keys are not exposed
    async fn nwk_key(&self, dev: &Device) -> Result<Option<AES128Key>>;
}

#[async_trait]
pub trait ApplicationCryptoService: Send + Sync {
    async fn derive_app_s_key(
        &self,
        dev: &Device,
        version: MacVersion,
        join_nonce: &JoinNonce,
        dev_nonce: &DevNonce,
        net_id: &NetID,
    ) -> Result<AES128Key>;

    /// AppKey of `dev`, `None` when root keys are not exposed
    async fn app_key(&self, dev: &Device) -> Result<Option<AES128Key>>;
}

#[async_trait]
impl<T: NetworkCryptoService + ?Sized> NetworkCryptoService for Arc<T> {
    async fn join_request_mic(
        &self,
        dev: &Device,
        version: MacVersion,
        payload: &[u8],
    ) -> Result<Mic> {
        (**self).join_request_mic(dev, version, payload).await
    }

    async fn join_accept_mic(
        &self,
        dev: &Device,
        version: MacVersion,
        join_req_type: u8,
        dev_nonce: &DevNonce,
        payload: &[u8],
    ) -> Result<Mic> {
        (**self)
            .join_accept_mic(dev, version, join_req_type, dev_nonce, payload)
            .await
    }

    async fn encrypt_join_accept(
        &self,
        dev: &Device,
        version: MacVersion,
        payload: &[u8],
    ) -> Result<Vec<u8>> {
        (**self).encrypt_join_accept(dev, version, payload).await
    }

    async fn encrypt_rejoin_accept(
        &self,
        dev: &Device,
        version: MacVersion,
        payload: &[u8],
    ) -> Result<Vec<u8>> {
        (**self).encrypt_rejoin_accept(dev, version, payload).await
    }

    async fn derive_nwk_s_keys(
        &self,
        dev: &Device,
        version: MacVersion,
        join_nonce: &JoinNonce,
        dev_nonce: &DevNonce,
        net_id: &NetID,
    ) -> Result<NwkSKeys> {
        (**self)
            .derive_nwk_s_keys(dev, version, join_nonce, dev_nonce, net_id)
            .await
    }

    async fn nwk_key(&self, dev: &Device) -> Result<Option<AES128Key>> {
        (**self).nwk_key(dev).await
    }
}

#[async_trait]
impl<T: ApplicationCryptoService + ?Sized> ApplicationCryptoService for Arc<T> {
    async fn derive_app_s_key(
        &self,
        dev: &Device,
        version: MacVersion,
        join_nonce: &JoinNonce,
        dev_nonce: &DevNonce,
        net_id: &NetID,
    ) -> Result<AES128Key> {
        (**self)
            .derive_app_s_key(dev, version, join_nonce, dev_nonce, net_id)
            .await
    }

    async fn app_key(&self, dev: &Device) -> Result<Option<AES128Key>> {
        (**self).app_key(dev).await
    }
}
