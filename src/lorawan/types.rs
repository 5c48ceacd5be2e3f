//! Fixed-size LoRaWAN identifiers and keys
//!
//! All types store bytes in the order they are displayed (big-endian).
//! The over-the-air encoding reverses them; see [`reverse`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// Reverse a fixed-size byte array (big-endian ↔ little-endian)
pub fn reverse<const N: usize>(bytes: [u8; N]) -> [u8; N] {
    let mut out = bytes;
    out.reverse();
    out
}

macro_rules! fixed_bytes {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            pub const LEN: usize = $len;

            pub fn is_zero(&self) -> bool {
                self.0.iter().all(|b| *b == 0)
            }

            /// Bytes in over-the-air (little-endian) order
            pub fn to_le_bytes(&self) -> [u8; $len] {
                reverse(self.0)
            }

            pub fn from_slice(bytes: &[u8]) -> Result<Self> {
                let arr: [u8; $len] = bytes
                    .try_into()
                    .map_err(|_| Error::invalid_length(stringify!($name), bytes.len()))?;
                Ok(Self(arr))
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(v: [u8; $len]) -> Self {
                $name(v)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                let bytes = hex::decode(s).map_err(|e| {
                    Error::InvalidArgument(format!("{}: {}", stringify!($name), e))
                })?;
                Self::from_slice(&bytes)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                serializer.serialize_str(&hex::encode_upper(self.0))
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

macro_rules! hex_display {
    ($name:ident) => {
        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", hex::encode_upper(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), hex::encode_upper(self.0))
            }
        }
    };
}

fixed_bytes!(
    /// 128-bit AES key
    AES128Key,
    16
);

// Keys are never rendered.
impl fmt::Debug for AES128Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AES128Key(..)")
    }
}

fixed_bytes!(
    /// 64-bit extended unique identifier (DevEUI, JoinEUI)
    EUI64,
    8
);
hex_display!(EUI64);

impl EUI64 {
    pub fn to_u64(&self) -> u64 {
        u64::from_be_bytes(self.0)
    }

    pub fn from_u64(v: u64) -> Self {
        EUI64(v.to_be_bytes())
    }
}

fixed_bytes!(
    /// 32-bit device address
    DevAddr,
    4
);
hex_display!(DevAddr);

impl DevAddr {
    pub fn to_u32(&self) -> u32 {
        u32::from_be_bytes(self.0)
    }
}

fixed_bytes!(
    /// 16-bit join-request nonce
    DevNonce,
    2
);
hex_display!(DevNonce);

fixed_bytes!(
    /// 24-bit join-accept nonce (AppNonce in LoRaWAN 1.0)
    JoinNonce,
    3
);
hex_display!(JoinNonce);

fixed_bytes!(
    /// 24-bit network identifier
    NetID,
    3
);
hex_display!(NetID);

/// 4-byte message integrity code
pub type Mic = [u8; 4];

/// LoRaWAN MAC version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MacVersion {
    #[serde(rename = "1.0.0")]
    V1_0,
    #[serde(rename = "1.0.1")]
    V1_0_1,
    #[serde(rename = "1.0.2")]
    V1_0_2,
    #[serde(rename = "1.0.3")]
    V1_0_3,
    #[serde(rename = "1.0.4")]
    V1_0_4,
    #[serde(rename = "1.1")]
    V1_1,
}

impl MacVersion {
    /// Whether the version uses the LoRaWAN 1.1 key hierarchy
    pub fn is_1_1(&self) -> bool {
        *self >= MacVersion::V1_1
    }
}

impl fmt::Display for MacVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MacVersion::V1_0 => "1.0.0",
            MacVersion::V1_0_1 => "1.0.1",
            MacVersion::V1_0_2 => "1.0.2",
            MacVersion::V1_0_3 => "1.0.3",
            MacVersion::V1_0_4 => "1.0.4",
            MacVersion::V1_1 => "1.1",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for MacVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "1.0" | "1.0.0" => Ok(MacVersion::V1_0),
            "1.0.1" => Ok(MacVersion::V1_0_1),
            "1.0.2" => Ok(MacVersion::V1_0_2),
            "1.0.3" => Ok(MacVersion::V1_0_3),
            "1.0.4" => Ok(MacVersion::V1_0_4),
            "1.1" | "1.1.0" => Ok(MacVersion::V1_1),
            _ => Err(Error::InvalidArgument(format!("unknown MAC version {}", s))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eui_display_and_numeric() {
        let eui = EUI64([0x42, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(eui.to_string(), "42FFFFFFFFFFFFFF");
        assert_eq!(eui.to_u64(), 0x42FF_FFFF_FFFF_FFFF);
        assert_eq!(EUI64::from_u64(eui.to_u64()), eui);
        assert_eq!("42ffffffffffffff".parse::<EUI64>().unwrap(), eui);
    }

    #[test]
    fn test_le_bytes() {
        let addr = DevAddr([0x01, 0x02, 0x03, 0x04]);
        assert_eq!(addr.to_le_bytes(), [0x04, 0x03, 0x02, 0x01]);
        assert_eq!(addr.to_u32(), 0x01020304);
    }

    #[test]
    fn test_from_slice_wrong_length() {
        let err = AES128Key::from_slice(&[0u8; 15]).unwrap_err();
        assert_eq!(
            err,
            Error::InvalidLength {
                field: "AES128Key",
                size: 15
            }
        );
    }

    #[test]
    fn test_key_debug_is_redacted() {
        let key = AES128Key([0xAB; 16]);
        assert_eq!(format!("{:?}", key), "AES128Key(..)");
    }

    #[test]
    fn test_mac_version_ordering() {
        assert!(MacVersion::V1_1.is_1_1());
        assert!(!MacVersion::V1_0_4.is_1_1());
        assert_eq!("1.0.2".parse::<MacVersion>().unwrap(), MacVersion::V1_0_2);
        assert!("2.0".parse::<MacVersion>().is_err());
    }

    #[test]
    fn test_serde_hex() {
        let nid = NetID([0x00, 0x00, 0x13]);
        let json = serde_json::to_string(&nid).unwrap();
        assert_eq!(json, "\"000013\"");
        let back: NetID = serde_json::from_str(&json).unwrap();
        assert_eq!(back, nid);
    }
}
