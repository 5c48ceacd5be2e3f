//! DevEUI allocation from an EUI block
//!
//! A block is a prefix plus a counter range. Each allocation reads the
//! current counter, issues `prefix | counter` and advances the counter as one
//! atomic step; a failed allocation leaves the block untouched.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::lorawan::EUI64;

/// Contiguous range of EUIs sharing a prefix.
///
/// `current_counter` is the next counter to issue and never passes
/// `end_counter`. Issuing `end_counter` sets `exhausted` instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EuiBlock {
    pub prefix: EUI64,
    pub current_counter: u64,
    pub end_counter: u64,
    #[serde(default)]
    pub exhausted: bool,
}

impl EuiBlock {
    /// Block covering every EUI under the first `prefix_len` bits of `prefix`
    pub fn new(prefix: EUI64, prefix_len: u8) -> Result<Self> {
        if prefix_len == 0 || prefix_len >= 64 {
            return Err(Error::InvalidArgument(format!(
                "EUI block prefix length {} out of range",
                prefix_len
            )));
        }
        let host_bits = 64 - u32::from(prefix_len);
        let mask = (1u64 << host_bits) - 1;
        Ok(Self {
            prefix: EUI64::from_u64(prefix.to_u64() & !mask),
            current_counter: 0,
            end_counter: mask,
            exhausted: false,
        })
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted || self.current_counter > self.end_counter
    }

    /// EUIs left to issue, saturating for a full 64-bit range
    pub fn remaining(&self) -> u64 {
        if self.is_exhausted() {
            0
        } else {
            (self.end_counter - self.current_counter).saturating_add(1)
        }
    }

    /// Issue the next EUI and advance the counter
    fn next(&mut self) -> Result<EUI64> {
        if self.is_exhausted() {
            return Err(Error::EuiBlockExhausted(self.prefix.to_string()));
        }
        let eui = EUI64::from_u64(self.prefix.to_u64() | self.current_counter);
        match self.current_counter.checked_add(1) {
            Some(next) if next <= self.end_counter => self.current_counter = next,
            _ => self.exhausted = true,
        }
        Ok(eui)
    }
}

/// Persistent DevEUI allocator
#[async_trait]
pub trait EuiBlockStore: Send + Sync {
    /// Issue a fresh DevEUI for `application`
    async fn issue_dev_eui(&self, application: &str) -> Result<EUI64>;
}

struct MemoryState {
    block: EuiBlock,
    issued: HashMap<String, u32>,
}

/// Mutex-serialised in-memory [`EuiBlockStore`]
pub struct MemoryEuiBlockStore {
    state: Mutex<MemoryState>,
    application_limit: Option<u32>,
}

impl MemoryEuiBlockStore {
    pub fn new(block: EuiBlock) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                block,
                issued: HashMap::new(),
            }),
            application_limit: None,
        }
    }

    /// Cap the number of DevEUIs issued per application
    pub fn with_application_limit(mut self, limit: u32) -> Self {
        self.application_limit = Some(limit);
        self
    }

    pub fn block(&self) -> EuiBlock {
        self.state.lock().block.clone()
    }

    pub fn issued(&self, application: &str) -> u32 {
        self.state
            .lock()
            .issued
            .get(application)
            .copied()
            .unwrap_or_default()
    }
}

#[async_trait]
impl EuiBlockStore for MemoryEuiBlockStore {
    async fn issue_dev_eui(&self, application: &str) -> Result<EUI64> {
        let mut state = self.state.lock();

        let issued = state.issued.get(application).copied().unwrap_or_default();
        if let Some(limit) = self.application_limit {
            if issued >= limit {
                warn!("Application {} reached DevEUI limit {}", application, limit);
                return Err(Error::DevEuiLimitReached {
                    application: application.to_string(),
                    limit,
                });
            }
        }

        let eui = state.block.next()?;
        state.issued.insert(application.to_string(), issued + 1);
        debug!("Issued DevEUI {} to application {}", eui, application);
        Ok(eui)
    }
}
