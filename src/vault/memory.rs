//! In-memory key vault
//!
//! Backed by a `label → bytes` map fixed at construction. Keys are returned
//! verbatim; certificates are stored as PEM blobs and decoded per lookup.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{Certificate, KeyVault};
use crate::error::{Error, Result};

#[derive(Default)]
pub struct MemoryKeyVault {
    entries: HashMap<String, Vec<u8>>,
    client_certificate: Option<Vec<u8>>,
}

impl MemoryKeyVault {
    pub fn new(entries: HashMap<String, Vec<u8>>) -> Self {
        Self {
            entries,
            client_certificate: None,
        }
    }

    /// Set the PEM blob served by [`KeyVault::client_certificate`]
    pub fn with_client_certificate(mut self, pem: Vec<u8>) -> Self {
        self.client_certificate = Some(pem);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl KeyVault for MemoryKeyVault {
    async fn key(&self, label: &str) -> Result<Vec<u8>> {
        match self.entries.get(label) {
            Some(key) => Ok(key.clone()),
            None => {
                debug!("Key {} not found in memory key vault", label);
                Err(Error::KeyNotFound(label.to_string()))
            }
        }
    }

    async fn server_certificate(&self, label: &str) -> Result<Arc<Certificate>> {
        let pem = self.entries.get(label).ok_or_else(|| {
            debug!("Certificate {} not found in memory key vault", label);
            Error::CertificateNotFound(label.to_string())
        })?;
        Ok(Arc::new(Certificate::from_pem(label, pem)?))
    }

    async fn client_certificate(&self) -> Result<Arc<Certificate>> {
        let pem = self
            .client_certificate
            .as_ref()
            .ok_or_else(|| Error::CertificateNotFound(String::new()))?;
        Ok(Arc::new(Certificate::from_pem("client", pem)?))
    }
}
