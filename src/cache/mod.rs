//! Caching decorators for the key service and key vault
//!
//! - [`CachedKeyService`] caches `unwrap` results (errors included) under
//!   `unwrap:<kek_label>:<hex(ciphertext)>`
//! - [`CachedKeyVault`] caches keys under `encryption_key:<label>` and
//!   certificates under `server_certificate:<label>` / `client_certificate:`
//!
//! Both sit on an [`ArcCache`]. Concurrent misses on the same key may both
//! load; the last store wins. A dropped (canceled) load stores nothing, and
//! a load returning [`Error::Canceled`] is not stored either.

pub mod arc;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use metrics::{counter, Counter};
use tracing::debug;

pub use arc::ArcCache;

use crate::error::{Error, Result};
use crate::service::KeyService;
use crate::vault::{Certificate, KeyVault};

/// Certificates leave the cache this long before they expire
pub const CERTIFICATE_EXPIRY_MARGIN: TimeDelta = TimeDelta::hours(1);

/// Source of the current time for expiry decisions
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Hit/miss counters of one cache identity
#[derive(Clone)]
pub struct CacheMetrics {
    hits: Counter,
    misses: Counter,
}

impl CacheMetrics {
    pub fn new(cache: &'static str) -> Self {
        Self {
            hits: counter!("lora_keyvault_cache_hits_total", "cache" => cache),
            misses: counter!("lora_keyvault_cache_misses_total", "cache" => cache),
        }
    }

    fn hit(&self) {
        self.hits.increment(1);
    }

    fn miss(&self) {
        self.misses.increment(1);
    }
}

fn ttl_delta(ttl: Duration) -> Option<TimeDelta> {
    if ttl.is_zero() {
        None
    } else {
        TimeDelta::from_std(ttl).ok()
    }
}

fn cacheable<T>(result: &Result<T>) -> bool {
    !matches!(result, Err(Error::Canceled))
}

/// [`KeyService`] decorator caching unwrap results
pub struct CachedKeyService<S> {
    inner: S,
    cache: ArcCache<String, Result<Vec<u8>>>,
    ttl: Option<TimeDelta>,
    clock: Arc<dyn Clock>,
    metrics: CacheMetrics,
}

impl<S: KeyService> CachedKeyService<S> {
    /// Cache of `size` entries; `ttl` zero disables time-based expiry
    pub fn new(inner: S, size: usize, ttl: Duration) -> Self {
        Self::with_clock(inner, size, ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(inner: S, size: usize, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner,
            cache: ArcCache::new(size),
            ttl: ttl_delta(ttl),
            clock,
            metrics: CacheMetrics::new("unwrap"),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: KeyService> KeyService for CachedKeyService<S> {
    async fn wrap(&self, plaintext: &[u8], kek_label: &str) -> Result<Vec<u8>> {
        self.inner.wrap(plaintext, kek_label).await
    }

    async fn unwrap(&self, ciphertext: &[u8], kek_label: &str) -> Result<Vec<u8>> {
        let key = format!("unwrap:{}:{}", kek_label, hex::encode(ciphertext));
        if let Some(cached) = self.cache.get(&key, self.clock.now()) {
            self.metrics.hit();
            debug!("Unwrap cache hit for KEK {}", kek_label);
            return cached;
        }
        self.metrics.miss();

        let result = self.inner.unwrap(ciphertext, kek_label).await;
        if cacheable(&result) {
            let expires_at = self.ttl.map(|ttl| self.clock.now() + ttl);
            self.cache.insert(key, result.clone(), expires_at);
        }
        result
    }

    async fn encrypt(&self, plaintext: &[u8], label: &str) -> Result<Vec<u8>> {
        self.inner.encrypt(plaintext, label).await
    }

    async fn decrypt(&self, ciphertext: &[u8], label: &str) -> Result<Vec<u8>> {
        self.inner.decrypt(ciphertext, label).await
    }

    async fn hmac_hash(&self, payload: &[u8], label: &str) -> Result<[u8; 32]> {
        self.inner.hmac_hash(payload, label).await
    }

    async fn server_certificate(&self, label: &str) -> Result<Arc<Certificate>> {
        self.inner.server_certificate(label).await
    }

    async fn client_certificate(&self) -> Result<Arc<Certificate>> {
        self.inner.client_certificate().await
    }
}

#[derive(Clone)]
enum VaultEntry {
    Key(Result<Vec<u8>>),
    Certificate(Result<Arc<Certificate>>),
}

/// [`KeyVault`] decorator caching keys and certificates
pub struct CachedKeyVault<V> {
    inner: V,
    cache: ArcCache<String, VaultEntry>,
    key_ttl: Option<TimeDelta>,
    certificate_ttl: Option<TimeDelta>,
    clock: Arc<dyn Clock>,
    key_metrics: CacheMetrics,
    server_certificate_metrics: CacheMetrics,
    client_certificate_metrics: CacheMetrics,
}

impl<V: KeyVault> CachedKeyVault<V> {
    /// Keys live for `key_ttl`. Certificates live for `certificate_ttl`
    /// capped at one hour before their NotAfter. Zero durations disable
    /// the configured bound.
    pub fn new(inner: V, size: usize, key_ttl: Duration, certificate_ttl: Duration) -> Self {
        Self::with_clock(inner, size, key_ttl, certificate_ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(
        inner: V,
        size: usize,
        key_ttl: Duration,
        certificate_ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner,
            cache: ArcCache::new(size),
            key_ttl: ttl_delta(key_ttl),
            certificate_ttl: ttl_delta(certificate_ttl),
            clock,
            key_metrics: CacheMetrics::new("encryption_key"),
            server_certificate_metrics: CacheMetrics::new("server_certificate"),
            client_certificate_metrics: CacheMetrics::new("client_certificate"),
        }
    }

    pub fn inner(&self) -> &V {
        &self.inner
    }

    /// Expiry of a certificate entry; `Err` when it must not be stored
    fn certificate_expiry(
        &self,
        result: &Result<Arc<Certificate>>,
    ) -> std::result::Result<Option<DateTime<Utc>>, ()> {
        let now = self.clock.now();
        let max = self.certificate_ttl.map(|ttl| now + ttl);
        let cert = match result {
            Ok(cert) => cert,
            Err(_) => return Ok(max),
        };
        let until = cert.not_after - CERTIFICATE_EXPIRY_MARGIN;
        if until <= now {
            return Err(());
        }
        Ok(Some(max.map_or(until, |max| max.min(until))))
    }

    async fn load_certificate<F>(
        &self,
        key: String,
        metrics: &CacheMetrics,
        load: F,
    ) -> Result<Arc<Certificate>>
    where
        F: std::future::Future<Output = Result<Arc<Certificate>>> + Send,
    {
        if let Some(VaultEntry::Certificate(cached)) = self.cache.get(&key, self.clock.now()) {
            metrics.hit();
            debug!("Key vault cache hit for {}", key);
            return cached;
        }
        metrics.miss();

        let result = load.await;
        if cacheable(&result) {
            match self.certificate_expiry(&result) {
                Ok(expires_at) => {
                    self.cache
                        .insert(key, VaultEntry::Certificate(result.clone()), expires_at)
                }
                Err(()) => debug!("Certificate {} expires within the hour, not caching", key),
            }
        }
        result
    }
}

#[async_trait]
impl<V: KeyVault> KeyVault for CachedKeyVault<V> {
    async fn key(&self, label: &str) -> Result<Vec<u8>> {
        let key = format!("encryption_key:{}", label);
        if let Some(VaultEntry::Key(cached)) = self.cache.get(&key, self.clock.now()) {
            self.key_metrics.hit();
            debug!("Key vault cache hit for {}", key);
            return cached;
        }
        self.key_metrics.miss();

        let result = self.inner.key(label).await;
        if cacheable(&result) {
            let expires_at = self.key_ttl.map(|ttl| self.clock.now() + ttl);
            self.cache
                .insert(key, VaultEntry::Key(result.clone()), expires_at);
        }
        result
    }

    async fn server_certificate(&self, label: &str) -> Result<Arc<Certificate>> {
        self.load_certificate(
            format!("server_certificate:{}", label),
            &self.server_certificate_metrics,
            self.inner.server_certificate(label),
        )
        .await
    }

    async fn client_certificate(&self) -> Result<Arc<Certificate>> {
        self.load_certificate(
            "client_certificate:".to_string(),
            &self.client_certificate_metrics,
            self.inner.client_certificate(),
        )
        .await
    }
}
