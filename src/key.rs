use crate::defaults::KEY_LENGTH;
use crate::errors::{CyborgError, Result};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A 32-byte index encryption key.
///
/// Generated once per index and held by the caller for the lifetime of the
/// index. The service only ever sees the hex form.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey([u8; KEY_LENGTH]);

impl EncryptionKey {
    /// Fresh key from the operating system RNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LENGTH];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let raw: [u8; KEY_LENGTH] = bytes.try_into().map_err(|_| CyborgError::InvalidKeyLength {
            expected: KEY_LENGTH,
            actual: bytes.len(),
        })?;
        Ok(Self(raw))
    }

    pub fn from_hex(hex_str: &str) -> Result<Self> {
        decode(hex_str)
    }

    pub fn to_hex(&self) -> String {
        encode(self)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.0
    }
}

impl From<[u8; KEY_LENGTH]> for EncryptionKey {
    fn from(bytes: [u8; KEY_LENGTH]) -> Self {
        Self(bytes)
    }
}

// Key material stays out of logs.
impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(<redacted>)")
    }
}

/// Parse the hex wire form. Anything that does not decode to exactly 32 bytes
/// is rejected.
pub fn decode(hex_str: &str) -> Result<EncryptionKey> {
    let bytes = hex::decode(hex_str.trim())
        .map_err(|e| CyborgError::InvalidKeyEncoding(e.to_string()))?;
    EncryptionKey::from_bytes(&bytes)
}

/// Lowercase hex, always 64 characters.
pub fn encode(key: &EncryptionKey) -> String {
    hex::encode(key.0)
}

impl Serialize for EncryptionKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&encode(self))
    }
}

impl<'de> Deserialize<'de> for EncryptionKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        decode(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_encode_is_lowercase_64_chars() {
        let key = EncryptionKey::from([0xAB; KEY_LENGTH]);
        let hex_str = encode(&key);
        assert_eq!(hex_str.len(), 64);
        assert_eq!(hex_str, "ab".repeat(32));
    }

    #[test]
    fn test_decode_accepts_uppercase() {
        let key = decode(&"0F".repeat(32)).unwrap();
        assert_eq!(key.as_bytes(), &[0x0F; KEY_LENGTH]);
    }

    #[test]
    fn test_decode_rejects_short_key() {
        match decode(&"00".repeat(16)) {
            Err(CyborgError::InvalidKeyLength { expected, actual }) => {
                assert_eq!(expected, 32);
                assert_eq!(actual, 16);
            }
            other => panic!("expected InvalidKeyLength, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_rejects_long_key() {
        assert!(matches!(
            decode(&"00".repeat(33)),
            Err(CyborgError::InvalidKeyLength { actual: 33, .. })
        ));
    }

    #[test]
    fn test_decode_rejects_non_hex() {
        assert!(matches!(
            decode(&"zz".repeat(32)),
            Err(CyborgError::InvalidKeyEncoding(_))
        ));
    }

    #[test]
    fn test_from_bytes_rejects_wrong_length() {
        assert!(matches!(
            EncryptionKey::from_bytes(&[1, 2, 3]),
            Err(CyborgError::InvalidKeyLength { actual: 3, .. })
        ));
    }

    #[test]
    fn test_generate_produces_distinct_keys() {
        let a = EncryptionKey::generate();
        let b = EncryptionKey::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_debug_is_redacted() {
        let key = EncryptionKey::from([7u8; KEY_LENGTH]);
        let rendered = format!("{:?}", key);
        assert!(!rendered.contains("0707"));
        assert!(rendered.contains("redacted"));
    }

    #[test]
    fn test_serde_uses_hex_form() {
        let key = EncryptionKey::from([1u8; KEY_LENGTH]);
        let value = serde_json::to_value(&key).unwrap();
        assert_eq!(value, serde_json::json!("01".repeat(32)));
        let back: EncryptionKey = serde_json::from_value(value).unwrap();
        assert_eq!(back, key);
    }

    proptest! {
        #[test]
        fn prop_hex_round_trip(bytes in proptest::array::uniform32(any::<u8>())) {
            let key = EncryptionKey::from(bytes);
            prop_assert_eq!(decode(&encode(&key)).unwrap(), key);
        }
    }
}
