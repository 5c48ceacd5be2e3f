//! Key envelopes and session key aggregates
//!
//! A [`KeyEnvelope`] carries a 128-bit key either in the clear or wrapped
//! under a KEK held by the [`KeyService`]. On the wire it is the message
//!
//! ```text
//! { "key": hex?, "encrypted_key": base64?, "kek_label": string? }
//! ```
//!
//! and readers accept either representation.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::lorawan::AES128Key;
use crate::service::KeyService;

/// Serde adapter for byte fields carried as base64 strings
pub(crate) mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}

/// A 128-bit key, in the clear or wrapped
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "KeyEnvelopeWire", into = "KeyEnvelopeWire")]
pub enum KeyEnvelope {
    /// Plaintext key
    Plain(AES128Key),
    /// Key bytes without KEK label, i.e. in the clear
    Opaque(Vec<u8>),
    /// Key wrapped under the KEK named `kek_label`
    Wrapped { ciphertext: Vec<u8>, kek_label: String },
}

impl KeyEnvelope {
    pub fn kek_label(&self) -> Option<&str> {
        match self {
            KeyEnvelope::Wrapped { kek_label, .. } => Some(kek_label),
            _ => None,
        }
    }

    pub fn is_wrapped(&self) -> bool {
        matches!(self, KeyEnvelope::Wrapped { .. })
    }
}

impl From<AES128Key> for KeyEnvelope {
    fn from(key: AES128Key) -> Self {
        KeyEnvelope::Plain(key)
    }
}

impl fmt::Debug for KeyEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyEnvelope::Plain(_) => write!(f, "KeyEnvelope::Plain(..)"),
            KeyEnvelope::Opaque(b) => write!(f, "KeyEnvelope::Opaque({} bytes)", b.len()),
            KeyEnvelope::Wrapped {
                ciphertext,
                kek_label,
            } => write!(
                f,
                "KeyEnvelope::Wrapped({} bytes, kek_label={})",
                ciphertext.len(),
                kek_label
            ),
        }
    }
}

#[derive(Default, Serialize, Deserialize)]
struct KeyEnvelopeWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    key: Option<AES128Key>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", with = "base64_bytes")]
    encrypted_key: Vec<u8>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    kek_label: String,
}

impl From<KeyEnvelopeWire> for KeyEnvelope {
    fn from(wire: KeyEnvelopeWire) -> Self {
        match wire.key {
            Some(key) => KeyEnvelope::Plain(key),
            None if wire.kek_label.is_empty() => KeyEnvelope::Opaque(wire.encrypted_key),
            None => KeyEnvelope::Wrapped {
                ciphertext: wire.encrypted_key,
                kek_label: wire.kek_label,
            },
        }
    }
}

impl From<KeyEnvelope> for KeyEnvelopeWire {
    fn from(envelope: KeyEnvelope) -> Self {
        match envelope {
            KeyEnvelope::Plain(key) => KeyEnvelopeWire {
                key: Some(key),
                ..Default::default()
            },
            KeyEnvelope::Opaque(bytes) => KeyEnvelopeWire {
                encrypted_key: bytes,
                ..Default::default()
            },
            KeyEnvelope::Wrapped {
                ciphertext,
                kek_label,
            } => KeyEnvelopeWire {
                key: None,
                encrypted_key: ciphertext,
                kek_label,
            },
        }
    }
}

/// Wrap `key` under the KEK named `kek_label`. An empty label leaves the key
/// in the clear.
pub async fn wrap_aes128_key<S: KeyService + ?Sized>(
    key: &AES128Key,
    kek_label: &str,
    service: &S,
) -> Result<KeyEnvelope> {
    if kek_label.is_empty() {
        return Ok(KeyEnvelope::Opaque(key.0.to_vec()));
    }
    let ciphertext = service.wrap(&key.0, kek_label).await?;
    Ok(KeyEnvelope::Wrapped {
        ciphertext,
        kek_label: kek_label.to_string(),
    })
}

/// Recover the plaintext key from `envelope`
pub async fn unwrap_aes128_key<S: KeyService + ?Sized>(
    envelope: &KeyEnvelope,
    service: &S,
) -> Result<AES128Key> {
    match envelope {
        KeyEnvelope::Plain(key) => Ok(*key),
        KeyEnvelope::Opaque(bytes) => AES128Key::from_slice(bytes)
            .map_err(|_| Error::invalid_length("encrypted key", bytes.len())),
        KeyEnvelope::Wrapped {
            ciphertext,
            kek_label,
        } => {
            let plaintext = service.unwrap(ciphertext, kek_label).await?;
            AES128Key::from_slice(&plaintext)
                .map_err(|_| Error::invalid_length("unwrapped key", plaintext.len()))
        }
    }
}

/// The four envelopes of a session key aggregate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKeyField {
    AppSKey,
    FNwkSIntKey,
    SNwkSIntKey,
    NwkSEncKey,
}

impl SessionKeyField {
    pub const ALL: [SessionKeyField; 4] = [
        SessionKeyField::AppSKey,
        SessionKeyField::FNwkSIntKey,
        SessionKeyField::SNwkSIntKey,
        SessionKeyField::NwkSEncKey,
    ];

    /// Field name in paths and on the wire
    pub fn name(&self) -> &'static str {
        match self {
            SessionKeyField::AppSKey => "app_s_key",
            SessionKeyField::FNwkSIntKey => "f_nwk_s_int_key",
            SessionKeyField::SNwkSIntKey => "s_nwk_s_int_key",
            SessionKeyField::NwkSEncKey => "nwk_s_enc_key",
        }
    }

    fn path(&self, prefix: &str) -> String {
        if prefix.is_empty() {
            format!("{}.key", self.name())
        } else {
            format!("{}.{}.key", prefix, self.name())
        }
    }

    /// Whether `path` names this field (or a parent of it) under `prefix`
    fn selected_by(&self, prefix: &str, path: &str) -> bool {
        if path.is_empty() {
            return false;
        }
        let full = self.path(prefix);
        full == path || (full.starts_with(path) && full.as_bytes()[path.len()] == b'.')
    }
}

/// Fields of a [`SessionKeys`] named by `paths` under `prefix`
pub fn select_session_key_fields(prefix: &str, paths: &[&str]) -> Vec<SessionKeyField> {
    SessionKeyField::ALL
        .into_iter()
        .filter(|field| paths.iter().any(|p| field.selected_by(prefix, p)))
        .collect()
}

/// Session key aggregate; absent keys are `None`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionKeys {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_s_key: Option<KeyEnvelope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub f_nwk_s_int_key: Option<KeyEnvelope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s_nwk_s_int_key: Option<KeyEnvelope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nwk_s_enc_key: Option<KeyEnvelope>,
}

impl SessionKeys {
    pub fn get(&self, field: SessionKeyField) -> Option<&KeyEnvelope> {
        match field {
            SessionKeyField::AppSKey => self.app_s_key.as_ref(),
            SessionKeyField::FNwkSIntKey => self.f_nwk_s_int_key.as_ref(),
            SessionKeyField::SNwkSIntKey => self.s_nwk_s_int_key.as_ref(),
            SessionKeyField::NwkSEncKey => self.nwk_s_enc_key.as_ref(),
        }
    }

    pub fn set(&mut self, field: SessionKeyField, envelope: Option<KeyEnvelope>) {
        let slot = match field {
            SessionKeyField::AppSKey => &mut self.app_s_key,
            SessionKeyField::FNwkSIntKey => &mut self.f_nwk_s_int_key,
            SessionKeyField::SNwkSIntKey => &mut self.s_nwk_s_int_key,
            SessionKeyField::NwkSEncKey => &mut self.nwk_s_enc_key,
        };
        *slot = envelope;
    }
}

/// Copy of `keys` holding only the fields selected by `paths`, each in
/// plaintext form.
///
/// A path selects a field when it equals `<prefix>.<field>.key` or is a
/// parent of it (`<prefix>.<field>`, `<prefix>`). With an empty prefix the
/// field paths are `<field>.key`. `keys` is left untouched.
pub async fn unwrap_selected_session_keys<S: KeyService + ?Sized>(
    keys: &SessionKeys,
    service: &S,
    prefix: &str,
    paths: &[&str],
) -> Result<SessionKeys> {
    let mut out = SessionKeys::default();
    for field in select_session_key_fields(prefix, paths) {
        let unwrapped = match keys.get(field) {
            Some(KeyEnvelope::Plain(key)) => KeyEnvelope::Plain(*key),
            Some(envelope) => {
                debug!("Unwrapping session key {}", field.name());
                KeyEnvelope::Plain(unwrap_aes128_key(envelope, service).await?)
            }
            None => continue,
        };
        out.set(field, Some(unwrapped));
    }
    Ok(out)
}
