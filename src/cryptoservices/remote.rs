//! Crypto service backed by a remote Join Server or key provider
//!
//! Every operation becomes one typed request on a [`CryptoTransport`].
//! Session keys and root keys come back as [`KeyEnvelope`]s and are unwrapped
//! through the local [`KeyService`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ApplicationCryptoService, Device, NetworkCryptoService, NwkSKeys};
use crate::envelope::{base64_bytes, unwrap_aes128_key, KeyEnvelope};
use crate::error::{Error, ErrorKind, Result};
use crate::lorawan::{AES128Key, DevNonce, JoinNonce, MacVersion, Mic, NetID, EUI64};
use crate::service::KeyService;

/// Identifiers of the end device a request is about
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EndDeviceIdentifiers {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_eui: Option<EUI64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dev_eui: Option<EUI64>,
}

impl From<&Device> for EndDeviceIdentifiers {
    fn from(dev: &Device) -> Self {
        Self {
            join_eui: dev.join_eui,
            dev_eui: dev.dev_eui,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CryptoServicePayloadRequest {
    pub ids: EndDeviceIdentifiers,
    pub lorawan_version: MacVersion,
    #[serde(with = "base64_bytes")]
    pub payload: Vec<u8>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub provisioner_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning_data: Option<serde_json::Value>,
}

impl CryptoServicePayloadRequest {
    fn new(dev: &Device, version: MacVersion, payload: &[u8]) -> Self {
        Self {
            ids: dev.into(),
            lorawan_version: version,
            payload: payload.to_vec(),
            provisioner_id: dev.provisioner_id.clone(),
            provisioning_data: dev.provisioning_data.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CryptoServicePayloadResponse {
    #[serde(with = "base64_bytes")]
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinAcceptMicRequest {
    pub payload_request: CryptoServicePayloadRequest,
    pub join_request_type: u8,
    pub dev_nonce: DevNonce,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeriveSessionKeysRequest {
    pub ids: EndDeviceIdentifiers,
    pub lorawan_version: MacVersion,
    pub join_nonce: JoinNonce,
    pub dev_nonce: DevNonce,
    pub net_id: NetID,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub provisioner_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning_data: Option<serde_json::Value>,
}

impl DeriveSessionKeysRequest {
    fn new(
        dev: &Device,
        version: MacVersion,
        join_nonce: &JoinNonce,
        dev_nonce: &DevNonce,
        net_id: &NetID,
    ) -> Self {
        Self {
            ids: dev.into(),
            lorawan_version: version,
            join_nonce: *join_nonce,
            dev_nonce: *dev_nonce,
            net_id: *net_id,
            provisioner_id: dev.provisioner_id.clone(),
            provisioning_data: dev.provisioning_data.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetRootKeysRequest {
    pub ids: EndDeviceIdentifiers,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub provisioner_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning_data: Option<serde_json::Value>,
}

impl From<&Device> for GetRootKeysRequest {
    fn from(dev: &Device) -> Self {
        Self {
            ids: dev.into(),
            provisioner_id: dev.provisioner_id.clone(),
            provisioning_data: dev.provisioning_data.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NwkSKeysResponse {
    pub f_nwk_s_int_key: KeyEnvelope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s_nwk_s_int_key: Option<KeyEnvelope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nwk_s_enc_key: Option<KeyEnvelope>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSKeyResponse {
    pub app_s_key: KeyEnvelope,
}

/// One call per crypto service operation
#[async_trait]
pub trait CryptoTransport: Send + Sync {
    async fn join_request_mic(
        &self,
        req: &CryptoServicePayloadRequest,
    ) -> Result<CryptoServicePayloadResponse>;

    async fn join_accept_mic(
        &self,
        req: &JoinAcceptMicRequest,
    ) -> Result<CryptoServicePayloadResponse>;

    async fn encrypt_join_accept(
        &self,
        req: &CryptoServicePayloadRequest,
    ) -> Result<CryptoServicePayloadResponse>;

    async fn encrypt_rejoin_accept(
        &self,
        req: &CryptoServicePayloadRequest,
    ) -> Result<CryptoServicePayloadResponse>;

    async fn derive_nwk_s_keys(&self, req: &DeriveSessionKeysRequest)
        -> Result<NwkSKeysResponse>;

    async fn get_nwk_key(&self, req: &GetRootKeysRequest) -> Result<KeyEnvelope>;

    async fn derive_app_s_key(&self, req: &DeriveSessionKeysRequest) -> Result<AppSKeyResponse>;

    async fn get_app_key(&self, req: &GetRootKeysRequest) -> Result<KeyEnvelope>;
}

/// Network and application crypto service over a [`CryptoTransport`]
pub struct RemoteCryptoService<T, S> {
    transport: T,
    key_service: S,
}

impl<T: CryptoTransport, S: KeyService> RemoteCryptoService<T, S> {
    pub fn new(transport: T, key_service: S) -> Self {
        Self {
            transport,
            key_service,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    async fn unwrap_optional(&self, envelope: Option<&KeyEnvelope>) -> Result<AES128Key> {
        match envelope {
            Some(envelope) => unwrap_aes128_key(envelope, &self.key_service).await,
            None => Ok(AES128Key::default()),
        }
    }

    /// Unwrap a root key; a peer that does not expose root keys yields `None`
    async fn root_key(&self, response: Result<KeyEnvelope>) -> Result<Option<AES128Key>> {
        match response {
            Ok(envelope) => Ok(Some(unwrap_aes128_key(&envelope, &self.key_service).await?)),
            Err(e) if e.kind() == ErrorKind::FailedPrecondition => {
                debug!("Root key not exposed: {}", e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

fn mic_from(response: CryptoServicePayloadResponse) -> Result<Mic> {
    let len = response.payload.len();
    response
        .payload
        .try_into()
        .map_err(|_| Error::invalid_length("MIC", len))
}

#[async_trait]
impl<T: CryptoTransport, S: KeyService> NetworkCryptoService for RemoteCryptoService<T, S> {
    async fn join_request_mic(
        &self,
        dev: &Device,
        version: MacVersion,
        payload: &[u8],
    ) -> Result<Mic> {
        let req = CryptoServicePayloadRequest::new(dev, version, payload);
        mic_from(self.transport.join_request_mic(&req).await?)
    }

    async fn join_accept_mic(
        &self,
        dev: &Device,
        version: MacVersion,
        join_req_type: u8,
        dev_nonce: &DevNonce,
        payload: &[u8],
    ) -> Result<Mic> {
        let req = JoinAcceptMicRequest {
            payload_request: CryptoServicePayloadRequest::new(dev, version, payload),
            join_request_type: join_req_type,
            dev_nonce: *dev_nonce,
        };
        mic_from(self.transport.join_accept_mic(&req).await?)
    }

    async fn encrypt_join_accept(
        &self,
        dev: &Device,
        version: MacVersion,
        payload: &[u8],
    ) -> Result<Vec<u8>> {
        let req = CryptoServicePayloadRequest::new(dev, version, payload);
        Ok(self.transport.encrypt_join_accept(&req).await?.payload)
    }

    async fn encrypt_rejoin_accept(
        &self,
        dev: &Device,
        version: MacVersion,
        payload: &[u8],
    ) -> Result<Vec<u8>> {
        let req = CryptoServicePayloadRequest::new(dev, version, payload);
        Ok(self.transport.encrypt_rejoin_accept(&req).await?.payload)
    }

    async fn derive_nwk_s_keys(
        &self,
        dev: &Device,
        version: MacVersion,
        join_nonce: &JoinNonce,
        dev_nonce: &DevNonce,
        net_id: &NetID,
    ) -> Result<NwkSKeys> {
        let req = DeriveSessionKeysRequest::new(dev, version, join_nonce, dev_nonce, net_id);
        let resp = self.transport.derive_nwk_s_keys(&req).await?;
        Ok(NwkSKeys {
            f_nwk_s_int_key: unwrap_aes128_key(&resp.f_nwk_s_int_key, &self.key_service).await?,
            s_nwk_s_int_key: self.unwrap_optional(resp.s_nwk_s_int_key.as_ref()).await?,
            nwk_s_enc_key: self.unwrap_optional(resp.nwk_s_enc_key.as_ref()).await?,
        })
    }

    async fn nwk_key(&self, dev: &Device) -> Result<Option<AES128Key>> {
        let response = self.transport.get_nwk_key(&dev.into()).await;
        self.root_key(response).await
    }
}

#[async_trait]
impl<T: CryptoTransport, S: KeyService> ApplicationCryptoService for RemoteCryptoService<T, S> {
    async fn derive_app_s_key(
        &self,
        dev: &Device,
        version: MacVersion,
        join_nonce: &JoinNonce,
        dev_nonce: &DevNonce,
        net_id: &NetID,
    ) -> Result<AES128Key> {
        let req = DeriveSessionKeysRequest::new(dev, version, join_nonce, dev_nonce, net_id);
        let resp = self.transport.derive_app_s_key(&req).await?;
        unwrap_aes128_key(&resp.app_s_key, &self.key_service).await
    }

    async fn app_key(&self, dev: &Device) -> Result<Option<AES128Key>> {
        let response = self.transport.get_app_key(&dev.into()).await;
        self.root_key(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cryptoservices::MemoryCryptoService;
    use crate::envelope::wrap_aes128_key;
    use crate::service::VaultKeyService;
    use crate::vault::MemoryKeyVault;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;

    const KEK_LABEL: &str = "js:kek";

    fn key_service() -> Arc<VaultKeyService<MemoryKeyVault>> {
        let mut entries = HashMap::new();
        entries.insert(KEK_LABEL.to_string(), vec![0x5A; 16]);
        Arc::new(VaultKeyService::new(MemoryKeyVault::new(entries)))
    }

    /// Transport answering from an in-memory service, wrapping keys under
    /// `KEK_LABEL` and recording the requests it saw
    struct LoopbackTransport {
        backend: MemoryCryptoService,
        keys: Arc<VaultKeyService<MemoryKeyVault>>,
        expose_root_keys: bool,
        requests: Mutex<Vec<String>>,
    }

    impl LoopbackTransport {
        fn new(keys: Arc<VaultKeyService<MemoryKeyVault>>, expose_root_keys: bool) -> Self {
            Self {
                backend: MemoryCryptoService::new(
                    Some(AES128Key([0x01; 16])),
                    Some(AES128Key([0x02; 16])),
                ),
                keys,
                expose_root_keys,
                requests: Mutex::new(Vec::new()),
            }
        }

        fn record(&self, name: &str) {
            self.requests.lock().push(name.to_string());
        }

        fn device(ids: &EndDeviceIdentifiers) -> Device {
            Device {
                join_eui: ids.join_eui,
                dev_eui: ids.dev_eui,
                ..Default::default()
            }
        }

        async fn wrap(&self, key: AES128Key) -> Result<KeyEnvelope> {
            wrap_aes128_key(&key, KEK_LABEL, &self.keys).await
        }

        async fn root(&self, key: Option<AES128Key>) -> Result<KeyEnvelope> {
            if !self.expose_root_keys {
                return Err(Error::RootKeyNotExposed);
            }
            match key {
                Some(key) => self.wrap(key).await,
                None => Err(Error::KeyNotFound("root".into())),
            }
        }
    }

    #[async_trait]
    impl CryptoTransport for LoopbackTransport {
        async fn join_request_mic(
            &self,
            req: &CryptoServicePayloadRequest,
        ) -> Result<CryptoServicePayloadResponse> {
            self.record("join_request_mic");
            let mic = self
                .backend
                .join_request_mic(&Self::device(&req.ids), req.lorawan_version, &req.payload)
                .await?;
            Ok(CryptoServicePayloadResponse {
                payload: mic.to_vec(),
            })
        }

        async fn join_accept_mic(
            &self,
            req: &JoinAcceptMicRequest,
        ) -> Result<CryptoServicePayloadResponse> {
            self.record("join_accept_mic");
            let p = &req.payload_request;
            let mic = self
                .backend
                .join_accept_mic(
                    &Self::device(&p.ids),
                    p.lorawan_version,
                    req.join_request_type,
                    &req.dev_nonce,
                    &p.payload,
                )
                .await?;
            Ok(CryptoServicePayloadResponse {
                payload: mic.to_vec(),
            })
        }

        async fn encrypt_join_accept(
            &self,
            req: &CryptoServicePayloadRequest,
        ) -> Result<CryptoServicePayloadResponse> {
            self.record("encrypt_join_accept");
            let payload = self
                .backend
                .encrypt_join_accept(&Self::device(&req.ids), req.lorawan_version, &req.payload)
                .await?;
            Ok(CryptoServicePayloadResponse { payload })
        }

        async fn encrypt_rejoin_accept(
            &self,
            req: &CryptoServicePayloadRequest,
        ) -> Result<CryptoServicePayloadResponse> {
            self.record("encrypt_rejoin_accept");
            let payload = self
                .backend
                .encrypt_rejoin_accept(&Self::device(&req.ids), req.lorawan_version, &req.payload)
                .await?;
            Ok(CryptoServicePayloadResponse { payload })
        }

        async fn derive_nwk_s_keys(
            &self,
            req: &DeriveSessionKeysRequest,
        ) -> Result<NwkSKeysResponse> {
            self.record("derive_nwk_s_keys");
            let keys = self
                .backend
                .derive_nwk_s_keys(
                    &Self::device(&req.ids),
                    req.lorawan_version,
                    &req.join_nonce,
                    &req.dev_nonce,
                    &req.net_id,
                )
                .await?;
            let (s, enc) = if req.lorawan_version.is_1_1() {
                (
                    Some(self.wrap(keys.s_nwk_s_int_key).await?),
                    Some(KeyEnvelope::Plain(keys.nwk_s_enc_key)),
                )
            } else {
                (None, None)
            };
            Ok(NwkSKeysResponse {
                f_nwk_s_int_key: self.wrap(keys.f_nwk_s_int_key).await?,
                s_nwk_s_int_key: s,
                nwk_s_enc_key: enc,
            })
        }

        async fn get_nwk_key(&self, _req: &GetRootKeysRequest) -> Result<KeyEnvelope> {
            self.record("get_nwk_key");
            self.root(Some(AES128Key([0x01; 16]))).await
        }

        async fn derive_app_s_key(
            &self,
            req: &DeriveSessionKeysRequest,
        ) -> Result<AppSKeyResponse> {
            self.record("derive_app_s_key");
            let key = self
                .backend
                .derive_app_s_key(
                    &Self::device(&req.ids),
                    req.lorawan_version,
                    &req.join_nonce,
                    &req.dev_nonce,
                    &req.net_id,
                )
                .await?;
            Ok(AppSKeyResponse {
                app_s_key: self.wrap(key).await?,
            })
        }

        async fn get_app_key(&self, _req: &GetRootKeysRequest) -> Result<KeyEnvelope> {
            self.record("get_app_key");
            self.root(None).await
        }
    }

    fn device() -> Device {
        Device::new(
            EUI64([0x42, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]),
            EUI64([0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]),
        )
    }

    fn remote(
        expose_root_keys: bool,
    ) -> RemoteCryptoService<LoopbackTransport, Arc<VaultKeyService<MemoryKeyVault>>> {
        let keys = key_service();
        RemoteCryptoService::new(LoopbackTransport::new(keys.clone(), expose_root_keys), keys)
    }

    #[tokio::test]
    async fn test_remote_matches_memory() {
        let remote = remote(true);
        let local =
            MemoryCryptoService::new(Some(AES128Key([0x01; 16])), Some(AES128Key([0x02; 16])));
        let dev = device();
        let jn = JoinNonce([0x01, 0x02, 0x03]);
        let dn = DevNonce([0x01, 0x02]);
        let nid = NetID([0x00, 0x00, 0x13]);

        for version in [MacVersion::V1_0_3, MacVersion::V1_1] {
            assert_eq!(
                remote.derive_nwk_s_keys(&dev, version, &jn, &dn, &nid).await,
                local.derive_nwk_s_keys(&dev, version, &jn, &dn, &nid).await
            );
            assert_eq!(
                remote.derive_app_s_key(&dev, version, &jn, &dn, &nid).await,
                local.derive_app_s_key(&dev, version, &jn, &dn, &nid).await
            );
            assert_eq!(
                remote.encrypt_join_accept(&dev, version, &[0x33; 32]).await,
                local.encrypt_join_accept(&dev, version, &[0x33; 32]).await
            );
            assert_eq!(
                remote.join_accept_mic(&dev, version, 0xFF, &dn, &[0x20; 13]).await,
                local.join_accept_mic(&dev, version, 0xFF, &dn, &[0x20; 13]).await
            );
        }

        let payload = [0x11u8; 19];
        assert_eq!(
            remote.join_request_mic(&dev, MacVersion::V1_1, &payload).await,
            local.join_request_mic(&dev, MacVersion::V1_1, &payload).await
        );
        assert_eq!(
            remote.encrypt_rejoin_accept(&dev, MacVersion::V1_1, &[0x44; 16]).await,
            local.encrypt_rejoin_accept(&dev, MacVersion::V1_1, &[0x44; 16]).await
        );
    }

    #[tokio::test]
    async fn test_remote_session_keys_1_1_vector() {
        let keys = remote(true)
            .derive_nwk_s_keys(
                &device(),
                MacVersion::V1_1,
                &JoinNonce([0x01, 0x02, 0x03]),
                &DevNonce([0x01, 0x02]),
                &NetID([0x00, 0x00, 0x13]),
            )
            .await
            .unwrap();
        assert_eq!(
            keys.s_nwk_s_int_key,
            "72DEAB554003D2290CEC08068171925D".parse::<AES128Key>().unwrap()
        );
    }

    #[tokio::test]
    async fn test_remote_errors_surface_unchanged() {
        let remote = remote(true);
        assert_eq!(
            remote
                .join_request_mic(&device(), MacVersion::V1_1, &[0u8; 18])
                .await,
            Err(Error::invalid_length("join-request payload", 18))
        );
        assert_eq!(
            remote.app_key(&device()).await,
            Err(Error::KeyNotFound("root".into()))
        );
    }

    #[tokio::test]
    async fn test_root_keys() {
        let exposed = remote(true);
        assert_eq!(
            exposed.nwk_key(&device()).await,
            Ok(Some(AES128Key([0x01; 16])))
        );

        let hidden = remote(false);
        assert_eq!(hidden.nwk_key(&device()).await, Ok(None));
        assert_eq!(hidden.app_key(&device()).await, Ok(None));
        assert_eq!(
            *hidden.transport().requests.lock(),
            vec!["get_nwk_key".to_string(), "get_app_key".to_string()]
        );
    }

    #[test]
    fn test_mic_from_response_length() {
        assert_eq!(
            mic_from(CryptoServicePayloadResponse {
                payload: vec![1, 2, 3, 4]
            }),
            Ok([1, 2, 3, 4])
        );
        assert_eq!(
            mic_from(CryptoServicePayloadResponse { payload: vec![1] }),
            Err(Error::invalid_length("MIC", 1))
        );
    }

    #[test]
    fn test_request_wire_format() {
        let mut dev = device();
        dev.provisioner_id = "microchip".into();
        let req = CryptoServicePayloadRequest::new(&dev, MacVersion::V1_1, &[0, 1, 2, 3]);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["payload"], "AAECAw==");
        assert_eq!(json["ids"]["dev_eui"], "0102030405060708");
        assert_eq!(json["provisioner_id"], "microchip");
        assert!(json.get("provisioning_data").is_none());

        let back: CryptoServicePayloadRequest = serde_json::from_value(json).unwrap();
        assert_eq!(back, req);
    }
}
