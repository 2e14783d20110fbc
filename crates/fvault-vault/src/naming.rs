//! Destination naming: `name` ⇄ `name.enc`

use fvault_core::config::DEFAULT_EXTENSION;
use fvault_core::Direction;

/// Suffix used when decrypting a name that lacks the marker extension
const DECRYPTED_FALLBACK: &str = ".dec";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingPolicy {
    extension: String,
}

impl Default for NamingPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_EXTENSION)
    }
}

impl NamingPolicy {
    pub fn new(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
        }
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// `report.pdf` → `report.pdf.enc`
    pub fn encrypted_name(&self, source: &str) -> String {
        format!("{source}{}", self.extension)
    }

    /// `report.pdf.enc` → `report.pdf`; anything else gets `.dec` appended
    pub fn decrypted_name(&self, source: &str) -> String {
        match source.strip_suffix(self.extension.as_str()) {
            Some(stem) if !stem.is_empty() && !stem.ends_with('/') => stem.to_string(),
            _ => format!("{source}{DECRYPTED_FALLBACK}"),
        }
    }

    /// Explicit names bypass the convention entirely.
    pub fn destination(&self, direction: Direction, source: &str, explicit: Option<&str>) -> String {
        match (explicit, direction) {
            (Some(name), _) => name.to_string(),
            (None, Direction::Encrypt) => self.encrypted_name(source),
            (None, Direction::Decrypt) => self.decrypted_name(source),
        }
    }
}
