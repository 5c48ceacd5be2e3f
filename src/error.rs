//! Error taxonomy shared by every layer of the key custody core.
//!
//! Each variant carries the attributes an operator needs to diagnose the
//! failure (offending size, label, identifier). `Error::kind()` collapses
//! the variants onto the stable kinds surfaced to callers.

use std::fmt;

use thiserror::Error;

/// Stable error kinds as surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    InvalidArgument,
    Corruption,
    FailedPrecondition,
    Unavailable,
    Canceled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::NotFound => write!(f, "not_found"),
            ErrorKind::InvalidArgument => write!(f, "invalid_argument"),
            ErrorKind::Corruption => write!(f, "corruption"),
            ErrorKind::FailedPrecondition => write!(f, "failed_precondition"),
            ErrorKind::Unavailable => write!(f, "unavailable"),
            ErrorKind::Canceled => write!(f, "canceled"),
        }
    }
}

/// Errors produced by the LoRaWAN crypto layer, the key vault, the key
/// service and the crypto services.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A payload or key has the wrong size for the operation.
    #[error("invalid length of {field}: {size} bytes")]
    InvalidLength { field: &'static str, size: usize },

    /// Ping period is not a power of two in [32, 4096].
    #[error("invalid ping period {0}")]
    InvalidPingPeriod(u32),

    /// Rejoin-request type byte is not 0, 1 or 2.
    #[error("invalid rejoin type {0}")]
    InvalidRejoinType(u8),

    /// Key wrap input is not a non-zero multiple of 8 of at least 16 bytes,
    /// or the KEK is not an AES-128/192/256 key.
    #[error("invalid key length {0}")]
    InvalidKeyLength(usize),

    /// AES-GCM input is too short or failed authentication.
    #[error("malformed cipher text")]
    MalformedCipherText,

    /// RFC 3394 integrity check failed.
    #[error("corrupt key")]
    CorruptKey,

    /// Generic argument validation failure.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("key `{0}` not found")]
    KeyNotFound(String),

    #[error("certificate `{0}` not found")]
    CertificateNotFound(String),

    /// PEM blob present but not decodable into a chain and a private key.
    #[error("invalid certificate `{label}`: {reason}")]
    InvalidCertificate { label: String, reason: String },

    #[error("no NwkKey specified")]
    NoNwkKey,

    #[error("no AppKey specified")]
    NoAppKey,

    #[error("no DevEUI specified")]
    NoDevEui,

    #[error("no JoinEUI specified")]
    NoJoinEui,

    /// The crypto service does not expose root keys.
    #[error("root key not exposed")]
    RootKeyNotExposed,

    /// EUI block has no counters left.
    #[error("EUI block `{0}` exhausted")]
    EuiBlockExhausted(String),

    /// Application reached its DevEUI issuance cap.
    #[error("application `{application}` reached DevEUI limit of {limit}")]
    DevEuiLimitReached { application: String, limit: u32 },

    /// Remote vault or crypto service could not be reached.
    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("operation canceled")]
    Canceled,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidLength { .. }
            | Error::InvalidPingPeriod(_)
            | Error::InvalidRejoinType(_)
            | Error::InvalidKeyLength(_)
            | Error::MalformedCipherText
            | Error::InvalidArgument(_)
            | Error::InvalidCertificate { .. } => ErrorKind::InvalidArgument,
            Error::KeyNotFound(_) | Error::CertificateNotFound(_) => ErrorKind::NotFound,
            Error::CorruptKey
            | Error::NoNwkKey
            | Error::NoAppKey
            | Error::NoDevEui
            | Error::NoJoinEui => ErrorKind::Corruption,
            Error::RootKeyNotExposed
            | Error::EuiBlockExhausted(_)
            | Error::DevEuiLimitReached { .. } => ErrorKind::FailedPrecondition,
            Error::Unavailable(_) => ErrorKind::Unavailable,
            Error::Canceled => ErrorKind::Canceled,
        }
    }

    pub(crate) fn invalid_length(field: &'static str, size: usize) -> Self {
        Error::InvalidLength { field, size }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
