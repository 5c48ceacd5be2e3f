//! Key vault: custody of named secrets and TLS material
//!
//! A vault hands out raw key bytes by label and decodes TLS certificates.
//! Implementations:
//! - [`EmptyKeyVault`]: finds nothing, safe default
//! - [`memory::MemoryKeyVault`]: immutable label → bytes map
//!
//! Remote vaults are expected to be slow; put them behind
//! [`crate::cache::CachedKeyVault`].

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};

use crate::error::{Error, Result};

pub use memory::MemoryKeyVault;

/// TLS certificate chain with its private key
#[derive(Debug)]
pub struct Certificate {
    /// Leaf first
    pub chain: Vec<CertificateDer<'static>>,
    /// ECDSA or RSA key (PKCS#8, SEC1 or PKCS#1)
    pub private_key: PrivateKeyDer<'static>,
    /// Expiry of the leaf certificate
    pub not_after: DateTime<Utc>,
}

impl Certificate {
    /// Decode a PEM blob holding `CERTIFICATE` blocks and one private key
    /// block, in any order.
    pub fn from_pem(label: &str, pem: &[u8]) -> Result<Self> {
        let invalid = |reason: String| Error::InvalidCertificate {
            label: label.to_string(),
            reason,
        };

        let chain = CertificateDer::pem_slice_iter(pem)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| invalid(e.to_string()))?;
        let leaf = chain
            .first()
            .ok_or_else(|| invalid("no certificate block".to_string()))?;
        let private_key =
            PrivateKeyDer::from_pem_slice(pem).map_err(|e| invalid(e.to_string()))?;

        let (_, parsed) =
            x509_parser::parse_x509_certificate(leaf).map_err(|e| invalid(e.to_string()))?;
        let not_after = DateTime::<Utc>::from_timestamp(parsed.validity().not_after.timestamp(), 0)
            .ok_or_else(|| invalid("NotAfter out of range".to_string()))?;

        Ok(Self {
            chain,
            private_key,
            not_after,
        })
    }
}

/// Source of raw key material and TLS certificates
#[async_trait]
pub trait KeyVault: Send + Sync {
    /// Raw bytes of the key named `label`
    async fn key(&self, label: &str) -> Result<Vec<u8>>;

    /// Server certificate named `label`
    async fn server_certificate(&self, label: &str) -> Result<Arc<Certificate>>;

    /// The client certificate of this process
    async fn client_certificate(&self) -> Result<Arc<Certificate>>;
}

#[async_trait]
impl<T: KeyVault + ?Sized> KeyVault for Arc<T> {
    async fn key(&self, label: &str) -> Result<Vec<u8>> {
        (**self).key(label).await
    }

    async fn server_certificate(&self, label: &str) -> Result<Arc<Certificate>> {
        (**self).server_certificate(label).await
    }

    async fn client_certificate(&self) -> Result<Arc<Certificate>> {
        (**self).client_certificate().await
    }
}

/// Vault without any keys
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyKeyVault;

#[async_trait]
impl KeyVault for EmptyKeyVault {
    async fn key(&self, label: &str) -> Result<Vec<u8>> {
        Err(Error::KeyNotFound(label.to_string()))
    }

    async fn server_certificate(&self, label: &str) -> Result<Arc<Certificate>> {
        Err(Error::CertificateNotFound(label.to_string()))
    }

    async fn client_certificate(&self) -> Result<Arc<Certificate>> {
        Err(Error::CertificateNotFound(String::new()))
    }
}
