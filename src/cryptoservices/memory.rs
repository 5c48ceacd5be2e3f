//! Crypto service holding the root keys in memory

use async_trait::async_trait;
use tracing::debug;

use super::{ApplicationCryptoService, Device, NetworkCryptoService, NwkSKeys};
use crate::error::{Error, Result};
use crate::lorawan::keys::{
    derive_app_s_key, derive_f_nwk_s_int_key, derive_js_enc_key, derive_js_int_key,
    derive_legacy_app_s_key, derive_legacy_nwk_s_key, derive_nwk_s_enc_key,
    derive_s_nwk_s_int_key,
};
use crate::lorawan::mic::{
    compute_join_accept_mic, compute_join_request_mic, compute_legacy_join_accept_mic,
};
use crate::lorawan::payload::encrypt_join_accept;
use crate::lorawan::{AES128Key, DevNonce, JoinNonce, MacVersion, Mic, NetID, EUI64};

/// In-memory network and application crypto service.
///
/// Legacy (1.0.x) devices use AppKey for join MICs, join-accept encryption
/// and both session keys; 1.1 devices use NwkKey on the network side and
/// AppKey for AppSKey.
#[derive(Clone, Default)]
pub struct MemoryCryptoService {
    nwk_key: Option<AES128Key>,
    app_key: Option<AES128Key>,
}

impl MemoryCryptoService {
    pub fn new(nwk_key: Option<AES128Key>, app_key: Option<AES128Key>) -> Self {
        Self { nwk_key, app_key }
    }

    fn require_nwk_key(&self) -> Result<&AES128Key> {
        self.nwk_key.as_ref().ok_or(Error::NoNwkKey)
    }

    fn require_app_key(&self) -> Result<&AES128Key> {
        self.app_key.as_ref().ok_or(Error::NoAppKey)
    }

    /// Root key of the network side for `version`
    fn network_root_key(&self, version: MacVersion) -> Result<&AES128Key> {
        if version.is_1_1() {
            self.require_nwk_key()
        } else {
            self.require_app_key()
        }
    }
}

fn join_eui(dev: &Device) -> Result<&EUI64> {
    dev.join_eui.as_ref().ok_or(Error::NoJoinEui)
}

fn dev_eui(dev: &Device) -> Result<&EUI64> {
    match &dev.dev_eui {
        Some(eui) if !eui.is_zero() => Ok(eui),
        _ => Err(Error::NoDevEui),
    }
}

impl std::fmt::Debug for MemoryCryptoService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCryptoService")
            .field("has_nwk_key", &self.nwk_key.is_some())
            .field("has_app_key", &self.app_key.is_some())
            .finish()
    }
}

#[async_trait]
impl NetworkCryptoService for MemoryCryptoService {
    async fn join_request_mic(
        &self,
        _dev: &Device,
        version: MacVersion,
        payload: &[u8],
    ) -> Result<Mic> {
        compute_join_request_mic(self.network_root_key(version)?, payload)
    }

    async fn join_accept_mic(
        &self,
        dev: &Device,
        version: MacVersion,
        join_req_type: u8,
        dev_nonce: &DevNonce,
        payload: &[u8],
    ) -> Result<Mic> {
        if !version.is_1_1() {
            return compute_legacy_join_accept_mic(self.require_app_key()?, payload);
        }
        let js_int_key = derive_js_int_key(self.require_nwk_key()?, dev_eui(dev)?);
        compute_join_accept_mic(&js_int_key, join_req_type, join_eui(dev)?, dev_nonce, payload)
    }

    async fn encrypt_join_accept(
        &self,
        _dev: &Device,
        version: MacVersion,
        payload: &[u8],
    ) -> Result<Vec<u8>> {
        encrypt_join_accept(self.network_root_key(version)?, payload)
    }

    async fn encrypt_rejoin_accept(
        &self,
        dev: &Device,
        _version: MacVersion,
        payload: &[u8],
    ) -> Result<Vec<u8>> {
        let js_enc_key = derive_js_enc_key(self.require_nwk_key()?, dev_eui(dev)?);
        encrypt_join_accept(&js_enc_key, payload)
    }

    async fn derive_nwk_s_keys(
        &self,
        dev: &Device,
        version: MacVersion,
        join_nonce: &JoinNonce,
        dev_nonce: &DevNonce,
        net_id: &NetID,
    ) -> Result<NwkSKeys> {
        if !version.is_1_1() {
            debug!("Deriving legacy NwkSKey for {:?}", dev.dev_eui);
            let nwk_s_key =
                derive_legacy_nwk_s_key(self.require_app_key()?, join_nonce, net_id, dev_nonce);
            return Ok(NwkSKeys {
                f_nwk_s_int_key: nwk_s_key,
                ..Default::default()
            });
        }

        let nwk_key = self.require_nwk_key()?;
        let join_eui = join_eui(dev)?;
        Ok(NwkSKeys {
            f_nwk_s_int_key: derive_f_nwk_s_int_key(nwk_key, join_nonce, join_eui, dev_nonce),
            s_nwk_s_int_key: derive_s_nwk_s_int_key(nwk_key, join_nonce, join_eui, dev_nonce),
            nwk_s_enc_key: derive_nwk_s_enc_key(nwk_key, join_nonce, join_eui, dev_nonce),
        })
    }

    async fn nwk_key(&self, _dev: &Device) -> Result<Option<AES128Key>> {
        Ok(self.nwk_key)
    }
}

#[async_trait]
impl ApplicationCryptoService for MemoryCryptoService {
    async fn derive_app_s_key(
        &self,
        dev: &Device,
        version: MacVersion,
        join_nonce: &JoinNonce,
        dev_nonce: &DevNonce,
        net_id: &NetID,
    ) -> Result<AES128Key> {
        let app_key = self.require_app_key()?;
        if version.is_1_1() {
            Ok(derive_app_s_key(app_key, join_nonce, join_eui(dev)?, dev_nonce))
        } else {
            Ok(derive_legacy_app_s_key(app_key, join_nonce, net_id, dev_nonce))
        }
    }

    async fn app_key(&self, _dev: &Device) -> Result<Option<AES128Key>> {
        Ok(self.app_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lorawan::mic::JOIN_REQUEST_TYPE;

    const NWK_KEY: AES128Key = AES128Key([0x01; 16]);
    const APP_KEY: AES128Key = AES128Key([0x02; 16]);

    fn device() -> Device {
        Device::new(
            EUI64([0x42, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]),
            EUI64([0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]),
        )
    }

    fn service() -> MemoryCryptoService {
        MemoryCryptoService::new(Some(NWK_KEY), Some(APP_KEY))
    }

    #[tokio::test]
    async fn test_derive_nwk_s_keys_1_1() {
        let keys = service()
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
            keys.f_nwk_s_int_key,
            "F8D8B8B9B1EC36E8B8108429D3F73DD2".parse::<AES128Key>().unwrap()
        );
        assert_eq!(
            keys.s_nwk_s_int_key,
            "72DEAB554003D2290CEC08068171925D".parse::<AES128Key>().unwrap()
        );
        assert_eq!(
            keys.nwk_s_enc_key,
            "31879CF093C24111E39905C77276BFD8".parse::<AES128Key>().unwrap()
        );
    }

    #[tokio::test]
    async fn test_derive_nwk_s_keys_legacy() {
        let jn = JoinNonce([0x01, 0x02, 0x03]);
        let dn = DevNonce([0x01, 0x02]);
        let nid = NetID([0x00, 0x00, 0x13]);
        let keys = service()
            .derive_nwk_s_keys(&device(), MacVersion::V1_0_3, &jn, &dn, &nid)
            .await
            .unwrap();
        assert_eq!(keys.f_nwk_s_int_key, derive_legacy_nwk_s_key(&APP_KEY, &jn, &nid, &dn));
        assert!(keys.s_nwk_s_int_key.is_zero());
        assert!(keys.nwk_s_enc_key.is_zero());
    }

    #[tokio::test]
    async fn test_derive_app_s_key() {
        let svc = service();
        let jn = JoinNonce([0x01, 0x02, 0x03]);
        let dn = DevNonce([0x01, 0x02]);
        let nid = NetID([0x00, 0x00, 0x13]);
        let dev = device();

        let key = svc
            .derive_app_s_key(&dev, MacVersion::V1_1, &jn, &dn, &nid)
            .await
            .unwrap();
        assert_eq!(key, derive_app_s_key(&APP_KEY, &jn, &dev.join_eui.unwrap(), &dn));

        let key = svc
            .derive_app_s_key(&dev, MacVersion::V1_0_2, &jn, &dn, &nid)
            .await
            .unwrap();
        assert_eq!(key, derive_legacy_app_s_key(&APP_KEY, &jn, &nid, &dn));
    }

    #[tokio::test]
    async fn test_join_request_mic_key_by_version() {
        let mut payload = vec![0x00];
        payload.extend_from_slice(&[8, 7, 6, 5, 4, 3, 2, 1]);
        payload.extend_from_slice(&[8, 7, 6, 5, 4, 3, 2, 1]);
        payload.extend_from_slice(&[0x02, 0x01]);

        let svc = service();
        let mic = svc
            .join_request_mic(&device(), MacVersion::V1_1, &payload)
            .await
            .unwrap();
        assert_eq!(mic, [0xE6, 0xE1, 0x0C, 0x55]);

        let legacy = svc
            .join_request_mic(&device(), MacVersion::V1_0_3, &payload)
            .await
            .unwrap();
        assert_eq!(legacy, compute_join_request_mic(&APP_KEY, &payload).unwrap());

        assert_eq!(
            svc.join_request_mic(&device(), MacVersion::V1_1, &payload[..18]).await,
            Err(Error::invalid_length("join-request payload", 18))
        );
    }

    #[tokio::test]
    async fn test_join_accept_mic() {
        let svc = service();
        let dev = device();
        let dn = DevNonce([0x01, 0x02]);
        let payload = [0x20u8; 13];

        let mic = svc
            .join_accept_mic(&dev, MacVersion::V1_1, JOIN_REQUEST_TYPE, &dn, &payload)
            .await
            .unwrap();
        let js_int_key = derive_js_int_key(&NWK_KEY, &dev.dev_eui.unwrap());
        assert_eq!(
            mic,
            compute_join_accept_mic(
                &js_int_key,
                JOIN_REQUEST_TYPE,
                &dev.join_eui.unwrap(),
                &dn,
                &payload
            )
            .unwrap()
        );

        let legacy = svc
            .join_accept_mic(&dev, MacVersion::V1_0_4, JOIN_REQUEST_TYPE, &dn, &payload)
            .await
            .unwrap();
        assert_eq!(legacy, compute_legacy_join_accept_mic(&APP_KEY, &payload).unwrap());
    }

    #[tokio::test]
    async fn test_encrypt_join_and_rejoin_accept() {
        let svc = service();
        let dev = device();
        let payload = [0x33u8; 16];

        let enc = svc
            .encrypt_join_accept(&dev, MacVersion::V1_1, &payload)
            .await
            .unwrap();
        assert_eq!(enc, encrypt_join_accept(&NWK_KEY, &payload).unwrap());

        let enc = svc
            .encrypt_join_accept(&dev, MacVersion::V1_0_3, &payload)
            .await
            .unwrap();
        assert_eq!(enc, encrypt_join_accept(&APP_KEY, &payload).unwrap());

        let enc = svc
            .encrypt_rejoin_accept(&dev, MacVersion::V1_1, &payload)
            .await
            .unwrap();
        let js_enc_key = derive_js_enc_key(&NWK_KEY, &dev.dev_eui.unwrap());
        assert_eq!(enc, encrypt_join_accept(&js_enc_key, &payload).unwrap());
    }

    #[tokio::test]
    async fn test_missing_keys_and_identifiers() {
        let dn = DevNonce([0x01, 0x02]);
        let jn = JoinNonce([0x01, 0x02, 0x03]);
        let nid = NetID([0, 0, 0x13]);

        let no_keys = MemoryCryptoService::default();
        assert_eq!(
            no_keys
                .encrypt_join_accept(&device(), MacVersion::V1_1, &[0; 16])
                .await,
            Err(Error::NoNwkKey)
        );
        assert_eq!(
            no_keys
                .derive_app_s_key(&device(), MacVersion::V1_1, &jn, &dn, &nid)
                .await,
            Err(Error::NoAppKey)
        );
        assert_eq!(no_keys.nwk_key(&device()).await, Ok(None));
        assert_eq!(no_keys.app_key(&device()).await, Ok(None));

        let svc = service();
        let mut dev = device();
        dev.dev_eui = Some(EUI64::default());
        assert_eq!(
            svc.encrypt_rejoin_accept(&dev, MacVersion::V1_1, &[0; 16]).await,
            Err(Error::NoDevEui)
        );

        let dev = Device {
            join_eui: None,
            ..device()
        };
        assert_eq!(
            svc.derive_nwk_s_keys(&dev, MacVersion::V1_1, &jn, &dn, &nid).await,
            Err(Error::NoJoinEui)
        );
        assert_eq!(
            svc.join_accept_mic(&dev, MacVersion::V1_1, 0xFF, &dn, &[0; 13]).await,
            Err(Error::NoJoinEui)
        );
        // Legacy derivation does not need the JoinEUI
        assert!(svc
            .derive_nwk_s_keys(&dev, MacVersion::V1_0_2, &jn, &dn, &nid)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_root_keys_exposed() {
        let svc = service();
        assert_eq!(svc.nwk_key(&device()).await, Ok(Some(NWK_KEY)));
        assert_eq!(svc.app_key(&device()).await, Ok(Some(APP_KEY)));
    }
}
