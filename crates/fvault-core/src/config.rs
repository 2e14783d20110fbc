use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{FvaultError, FvaultResult};
use crate::types::CipherKind;

/// Default plaintext bytes per chunk (64 KiB)
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Largest accepted chunk size (16 MiB)
pub const MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// Marker appended to encrypted file names
pub const DEFAULT_EXTENSION: &str = ".enc";

/// Top-level configuration (loaded from fvault.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FvaultConfig {
    pub vault: VaultConfig,
    pub cipher: CipherConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Storage root directory for local-disk vaults
    pub root: PathBuf,
    /// Default key: `base64:<b64>`, bare base64, or 32 raw bytes.
    /// Overridden by FVAULT_KEY. Never written back out.
    #[serde(skip_serializing)]
    pub key: Option<String>,
    /// Extension marker for encrypted files (default: .enc)
    pub extension: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CipherConfig {
    /// "xchacha20poly1305" (default) or "aes256cbc"
    pub algorithm: CipherKind,
    /// Plaintext bytes per chunk
    pub chunk_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            key: None,
            extension: DEFAULT_EXTENSION.into(),
        }
    }
}

impl Default for CipherConfig {
    fn default() -> Self {
        Self {
            algorithm: CipherKind::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl FvaultConfig {
    /// Parse a TOML document and validate it.
    pub fn from_toml(content: &str) -> FvaultResult<Self> {
        let config: FvaultConfig =
            toml::from_str(content).map_err(|e| FvaultError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise fall back to defaults.
    pub fn load(path: &Path) -> FvaultResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::from_toml(&content)
                .map_err(|e| FvaultError::Config(format!("{}: {e}", path.display())))
        } else {
            tracing::warn!("config file not found: {}  (using defaults)", path.display());
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> FvaultResult<()> {
        let size = self.cipher.chunk_size;
        if size == 0 || size > MAX_CHUNK_SIZE {
            return Err(FvaultError::Config(format!(
                "cipher.chunk_size must be between 1 and {MAX_CHUNK_SIZE}, got {size}"
            )));
        }
        let ext = &self.vault.extension;
        if ext.len() < 2 || !ext.starts_with('.') || ext.contains('/') {
            return Err(FvaultError::Config(format!(
                "vault.extension must look like \".enc\", got {ext:?}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[vault]
root = "/srv/uploads"
key = "base64:AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA="
extension = ".vault"

[cipher]
algorithm = "aes256cbc"
chunk_size = 8192

[log]
level = "debug"
format = "json"
"#;
        let config = FvaultConfig::from_toml(toml_str).unwrap();

        assert_eq!(config.vault.root, PathBuf::from("/srv/uploads"));
        assert!(config.vault.key.as_deref().unwrap().starts_with("base64:"));
        assert_eq!(config.vault.extension, ".vault");
        assert_eq!(config.cipher.algorithm, CipherKind::Aes256Cbc);
        assert_eq!(config.cipher.chunk_size, 8192);
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.log.format, "json");
    }

    #[test]
    fn test_parse_defaults() {
        let config = FvaultConfig::from_toml("").unwrap();

        assert_eq!(config.vault.root, PathBuf::from("."));
        assert!(config.vault.key.is_none());
        assert_eq!(config.vault.extension, ".enc");
        assert_eq!(config.cipher.algorithm, CipherKind::XChaCha20Poly1305);
        assert_eq!(config.cipher.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_str = r#"
[cipher]
chunk_size = 1024
"#;
        let config = FvaultConfig::from_toml(toml_str).unwrap();

        // Overridden
        assert_eq!(config.cipher.chunk_size, 1024);
        // Defaults
        assert_eq!(config.cipher.algorithm, CipherKind::XChaCha20Poly1305);
        assert_eq!(config.vault.extension, ".enc");
    }

    #[test]
    fn test_rejects_zero_chunk_size() {
        let err = FvaultConfig::from_toml("[cipher]\nchunk_size = 0\n").unwrap_err();
        assert!(matches!(err, FvaultError::Config(_)));
    }

    #[test]
    fn test_rejects_oversized_chunk_size() {
        let toml_str = format!("[cipher]\nchunk_size = {}\n", MAX_CHUNK_SIZE + 1);
        assert!(FvaultConfig::from_toml(&toml_str).is_err());
    }

    #[test]
    fn test_rejects_bad_extension() {
        assert!(FvaultConfig::from_toml("[vault]\nextension = \"enc\"\n").is_err());
        assert!(FvaultConfig::from_toml("[vault]\nextension = \".\"\n").is_err());
    }

    #[test]
    fn test_unknown_algorithm_is_error() {
        assert!(FvaultConfig::from_toml("[cipher]\nalgorithm = \"rot13\"\n").is_err());
    }

    #[test]
    fn test_serialize_skips_key() {
        let mut config = FvaultConfig::default();
        config.vault.key = Some("base64:c2VjcmV0".into());
        let toml_str = toml::to_string(&config).unwrap();

        assert!(!toml_str.contains("c2VjcmV0"), "key must never be serialized");
        let parsed = FvaultConfig::from_toml(&toml_str).unwrap();
        assert_eq!(parsed.cipher.chunk_size, config.cipher.chunk_size);
        assert_eq!(parsed.vault.extension, config.vault.extension);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = FvaultConfig::load(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config.cipher.chunk_size, DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn test_load_from_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("fvault.toml");
        std::fs::write(&path, "[vault]\nextension = \".sealed\"\n").unwrap();

        let config = FvaultConfig::load(&path).unwrap();
        assert_eq!(config.vault.extension, ".sealed");
    }
}
