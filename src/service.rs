//! Key service: cryptographic operations addressed by key label
//!
//! Layers RFC 3394 key wrapping, AES-128-GCM, HMAC-SHA-256 and certificate
//! custody on top of a [`KeyVault`]. Callers only ever see envelopes or
//! one-shot plaintext buffers; the raw vault bytes stay in here.

use std::sync::Arc;

use async_trait::async_trait;

use crate::crypto::{gcm, hmac_sha256, keywrap};
use crate::error::{Error, Result};
use crate::lorawan::AES128Key;
use crate::vault::{Certificate, KeyVault};

#[async_trait]
pub trait KeyService: Send + Sync {
    /// Wrap `plaintext` under the KEK named `kek_label` (RFC 3394)
    async fn wrap(&self, plaintext: &[u8], kek_label: &str) -> Result<Vec<u8>>;

    /// Unwrap `ciphertext` under the KEK named `kek_label` (RFC 3394)
    async fn unwrap(&self, ciphertext: &[u8], kek_label: &str) -> Result<Vec<u8>>;

    /// AES-128-GCM encrypt under the key named `label`
    async fn encrypt(&self, plaintext: &[u8], label: &str) -> Result<Vec<u8>>;

    /// AES-128-GCM decrypt under the key named `label`
    async fn decrypt(&self, ciphertext: &[u8], label: &str) -> Result<Vec<u8>>;

    /// HMAC-SHA-256 of `payload` under the key named `label`
    async fn hmac_hash(&self, payload: &[u8], label: &str) -> Result<[u8; 32]>;

    async fn server_certificate(&self, label: &str) -> Result<Arc<Certificate>>;

    async fn client_certificate(&self) -> Result<Arc<Certificate>>;
}

#[async_trait]
impl<T: KeyService + ?Sized> KeyService for Arc<T> {
    async fn wrap(&self, plaintext: &[u8], kek_label: &str) -> Result<Vec<u8>> {
        (**self).wrap(plaintext, kek_label).await
    }

    async fn unwrap(&self, ciphertext: &[u8], kek_label: &str) -> Result<Vec<u8>> {
        (**self).unwrap(ciphertext, kek_label).await
    }

    async fn encrypt(&self, plaintext: &[u8], label: &str) -> Result<Vec<u8>> {
        (**self).encrypt(plaintext, label).await
    }

    async fn decrypt(&self, ciphertext: &[u8], label: &str) -> Result<Vec<u8>> {
        (**self).decrypt(ciphertext, label).await
    }

    async fn hmac_hash(&self, payload: &[u8], label: &str) -> Result<[u8; 32]> {
        (**self).hmac_hash(payload, label).await
    }

    async fn server_certificate(&self, label: &str) -> Result<Arc<Certificate>> {
        (**self).server_certificate(label).await
    }

    async fn client_certificate(&self) -> Result<Arc<Certificate>> {
        (**self).client_certificate().await
    }
}

/// [`KeyService`] backed by a [`KeyVault`]
pub struct VaultKeyService<V> {
    vault: V,
}

impl<V: KeyVault> VaultKeyService<V> {
    pub fn new(vault: V) -> Self {
        Self { vault }
    }

    pub fn vault(&self) -> &V {
        &self.vault
    }

    async fn content_key(&self, label: &str) -> Result<AES128Key> {
        let raw = self.vault.key(label).await?;
        AES128Key::from_slice(&raw).map_err(|_| Error::invalid_length("content key", raw.len()))
    }
}

#[async_trait]
impl<V: KeyVault> KeyService for VaultKeyService<V> {
    async fn wrap(&self, plaintext: &[u8], kek_label: &str) -> Result<Vec<u8>> {
        let kek = self.vault.key(kek_label).await?;
        keywrap::wrap_key(plaintext, &kek)
    }

    async fn unwrap(&self, ciphertext: &[u8], kek_label: &str) -> Result<Vec<u8>> {
        let kek = self.vault.key(kek_label).await?;
        keywrap::unwrap_key(ciphertext, &kek)
    }

    async fn encrypt(&self, plaintext: &[u8], label: &str) -> Result<Vec<u8>> {
        let key = self.content_key(label).await?;
        gcm::encrypt(&key, plaintext)
    }

    async fn decrypt(&self, ciphertext: &[u8], label: &str) -> Result<Vec<u8>> {
        let key = self.content_key(label).await?;
        gcm::decrypt(&key, ciphertext)
    }

    async fn hmac_hash(&self, payload: &[u8], label: &str) -> Result<[u8; 32]> {
        let key = self.content_key(label).await?;
        Ok(hmac_sha256(&key.0, payload))
    }

    async fn server_certificate(&self, label: &str) -> Result<Arc<Certificate>> {
        self.vault.server_certificate(label).await
    }

    async fn client_certificate(&self) -> Result<Arc<Certificate>> {
        self.vault.client_certificate().await
    }
}
