//! Vault keys: generation, decoding from configuration, per-call resolution

use base64::{engine::general_purpose::STANDARD, Engine};
use fvault_core::{FvaultError, FvaultResult};
use rand::RngCore;
use zeroize::Zeroize;

use crate::KEY_SIZE;

/// Prefix marking a base64-encoded key in configuration values.
const BASE64_PREFIX: &str = "base64:";

/// A 256-bit symmetric key. Zeroized on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct VaultKey {
    bytes: [u8; KEY_SIZE],
}

impl VaultKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    /// Build a key from raw decoded bytes, rejecting any length but `KEY_SIZE`.
    pub fn from_encoded(bytes: &[u8]) -> FvaultResult<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(FvaultError::InvalidKey {
                expected: KEY_SIZE,
                actual: bytes.len(),
            });
        }
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(bytes);
        Ok(Self::from_bytes(key))
    }

    /// Decode a key as stored in configuration.
    ///
    /// Accepted forms, in order:
    ///   1. `base64:<standard base64>`
    ///   2. bare standard base64 decoding to exactly `KEY_SIZE` bytes
    ///   3. a raw string of exactly `KEY_SIZE` bytes
    pub fn from_config_value(value: &str) -> FvaultResult<Self> {
        let value = value.trim();

        if let Some(encoded) = value.strip_prefix(BASE64_PREFIX) {
            let mut decoded = STANDARD.decode(encoded).map_err(|_| FvaultError::InvalidKey {
                expected: KEY_SIZE,
                actual: 0,
            })?;
            let key = Self::from_encoded(&decoded);
            decoded.zeroize();
            return key;
        }

        if let Ok(mut decoded) = STANDARD.decode(value) {
            let key = (decoded.len() == KEY_SIZE).then(|| Self::from_encoded(&decoded));
            decoded.zeroize();
            if let Some(key) = key {
                return key;
            }
        }

        Self::from_encoded(value.as_bytes())
    }

    /// Encode as `base64:<b64>`, the form written by `fvault keygen`.
    pub fn to_config_value(&self) -> String {
        format!("{BASE64_PREFIX}{}", STANDARD.encode(self.bytes))
    }

    /// Pick the per-call key if one was supplied, else the default.
    pub fn resolve<'a>(explicit: Option<&'a VaultKey>, default: &'a VaultKey) -> &'a VaultKey {
        explicit.unwrap_or(default)
    }
}

impl Drop for VaultKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Generate a random 256-bit key from the OS CSPRNG.
pub fn generate_key() -> VaultKey {
    let mut bytes = [0u8; KEY_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    VaultKey::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_generation() {
        let k1 = generate_key();
        let k2 = generate_key();
        assert_ne!(k1.as_bytes(), k2.as_bytes(), "random keys must differ");
    }

    #[test]
    fn test_from_encoded_rejects_wrong_length() {
        let err = VaultKey::from_encoded(&[0u8; 16]).unwrap_err();
        assert!(matches!(
            err,
            FvaultError::InvalidKey {
                expected: 32,
                actual: 16
            }
        ));
    }

    #[test]
    fn test_config_value_roundtrip() {
        let key = generate_key();
        let encoded = key.to_config_value();
        assert!(encoded.starts_with("base64:"));

        let decoded = VaultKey::from_config_value(&encoded).unwrap();
        assert_eq!(key, decoded);
    }

    #[test]
    fn test_config_value_bare_base64() {
        let key = VaultKey::from_bytes([7u8; KEY_SIZE]);
        let bare = STANDARD.encode(key.as_bytes());

        assert_eq!(VaultKey::from_config_value(&bare).unwrap(), key);
    }

    #[test]
    fn test_config_value_raw_bytes() {
        let raw = "0123456789abcdef0123456789abcdef";
        let key = VaultKey::from_config_value(raw).unwrap();
        assert_eq!(key.as_bytes(), raw.as_bytes());
    }

    #[test]
    fn test_config_value_short_base64_is_invalid() {
        let short = format!("base64:{}", STANDARD.encode([1u8; 16]));
        assert!(matches!(
            VaultKey::from_config_value(&short),
            Err(FvaultError::InvalidKey { actual: 16, .. })
        ));
    }

    #[test]
    fn test_config_value_garbage_is_invalid() {
        assert!(VaultKey::from_config_value("base64:!!!not-base64!!!").is_err());
        assert!(VaultKey::from_config_value("too short").is_err());
    }

    #[test]
    fn test_resolve_prefers_explicit() {
        let default = VaultKey::from_bytes([1u8; KEY_SIZE]);
        let explicit = VaultKey::from_bytes([2u8; KEY_SIZE]);

        assert_eq!(VaultKey::resolve(Some(&explicit), &default), &explicit);
        assert_eq!(VaultKey::resolve(None, &default), &default);
        assert_eq!(default.as_bytes(), &[1u8; KEY_SIZE], "default untouched");
    }

    #[test]
    fn test_debug_is_redacted() {
        let key = VaultKey::from_bytes([0xAB; KEY_SIZE]);
        let dbg = format!("{key:?}");
        assert!(dbg.contains("REDACTED"));
        assert!(!dbg.contains("171"));
    }
}
