use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::kek_label::DEFAULT_SEPARATOR;
use crate::lorawan::{AES128Key, EUI64};
use crate::vault::MemoryKeyVault;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub key_vault: KeyVaultConfig,
    pub cache: CacheConfig,
    pub crypto: CryptoConfig,
    pub kek: KekConfig,
    pub eui: Option<EuiConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Contents of the in-memory key vault
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct KeyVaultConfig {
    /// Label → hex-encoded key
    pub keys: HashMap<String, String>,
    /// Label → PEM file holding certificate chain and private key
    pub certificates: HashMap<String, PathBuf>,
    pub client_certificate: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub size: usize,
    /// 0 disables time-based expiry
    pub ttl_secs: u64,
    /// Upper bound for certificate entries; 0 leaves only the NotAfter bound
    pub certificate_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            size: 1024,
            ttl_secs: 0,
            certificate_ttl_secs: 0,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn certificate_ttl(&self) -> Duration {
        Duration::from_secs(self.certificate_ttl_secs)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    pub nwk_key: Option<AES128Key>,
    pub app_key: Option<AES128Key>,
    /// Remote crypto service; takes precedence over the root keys above
    pub remote_url: Option<String>,
    pub remote_retries: u32,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct KekConfig {
    pub separator: String,
}

impl Default for KekConfig {
    fn default() -> Self {
        Self {
            separator: DEFAULT_SEPARATOR.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EuiConfig {
    pub prefix: EUI64,
    pub prefix_len: u8,
    pub application_limit: Option<u32>,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// In-memory key vault holding the configured keys and certificates
    pub fn build_key_vault(&self) -> anyhow::Result<MemoryKeyVault> {
        let kv = &self.key_vault;
        let mut entries = HashMap::with_capacity(kv.keys.len() + kv.certificates.len());
        for (label, key) in &kv.keys {
            let bytes = hex::decode(key).with_context(|| format!("Invalid hex for key {}", label))?;
            entries.insert(label.clone(), bytes);
        }
        for (label, path) in &kv.certificates {
            let pem = std::fs::read(path)
                .with_context(|| format!("Failed to read certificate {} from {:?}", label, path))?;
            entries.insert(label.clone(), pem);
        }

        let vault = MemoryKeyVault::new(entries);
        match &kv.client_certificate {
            Some(path) => {
                let pem = std::fs::read(path)
                    .with_context(|| format!("Failed to read client certificate {:?}", path))?;
                Ok(vault.with_client_certificate(pem))
            }
            None => Ok(vault),
        }
    }
}
