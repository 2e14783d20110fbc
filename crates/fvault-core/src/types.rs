use serde::{Deserialize, Serialize};
use std::fmt;

/// Which way bytes flow through the cipher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Encrypt,
    Decrypt,
}

/// Whether the source survives a successful operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferMode {
    /// Source is removed after the whole pipeline succeeds
    Move,
    /// Source is left untouched
    Copy,
}

/// Where the output of an operation goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    /// A named object in the storage backend
    Named(String),
    /// A caller-supplied byte sink (e.g. an HTTP response body)
    Sink,
}

/// Per-chunk cipher used for the encrypted stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CipherKind {
    /// XChaCha20-Poly1305 AEAD, 24-byte nonce, 16-byte tag
    #[default]
    XChaCha20Poly1305,
    /// AES-256-CBC with PKCS#7 padding, 16-byte IV
    Aes256Cbc,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Encrypt => f.write_str("encrypt"),
            Direction::Decrypt => f.write_str("decrypt"),
        }
    }
}

impl fmt::Display for TransferMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferMode::Move => f.write_str("move"),
            TransferMode::Copy => f.write_str("copy"),
        }
    }
}

impl fmt::Display for CipherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CipherKind::XChaCha20Poly1305 => f.write_str("xchacha20poly1305"),
            CipherKind::Aes256Cbc => f.write_str("aes256cbc"),
        }
    }
}
