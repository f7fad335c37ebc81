//! Compact serde encodings for opaque byte fields.
//!
//! Byte strings are written as standard base64 text instead of JSON number
//! arrays, which keeps a payload within about 4/3 of its raw size.
//!
//! ```ignore
//! #[serde(with = "appproxy_types::encoding::base64_bytes")]
//! pub tx: Vec<u8>,
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serializer};

/// `Vec<u8>` as a base64 string.
pub mod base64_bytes {
    use super::*;

    /// Serializes bytes as base64.
    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    /// Deserializes bytes from base64.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(D::Error::custom)
    }
}

/// `Vec<Vec<u8>>` as a list of base64 strings.
pub mod base64_list {
    use super::*;
    use serde::ser::SerializeSeq;

    /// Serializes each item as base64.
    pub fn serialize<S: Serializer>(items: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(items.len()))?;
        for item in items {
            seq.serialize_element(&STANDARD.encode(item))?;
        }
        seq.end()
    }

    /// Deserializes a list of base64 strings.
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Vec<u8>>, D::Error> {
        Vec::<String>::deserialize(deserializer)?
            .iter()
            .map(|encoded| STANDARD.decode(encoded).map_err(D::Error::custom))
            .collect()
    }
}
