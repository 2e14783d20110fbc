//! fvault-crypto: chunked streaming encryption for files of any size
//!
//! Architecture: fixed-size chunks, each sealed independently under a fresh IV
//!
//! Pipeline: reader → read chunk → random IV → encrypt chunk → frame record → writer
//!
//! Encrypted stream layout (no header, no trailer):
//! ```text
//! record := [4 bytes: u32 BE len(iv || ciphertext)][iv][ciphertext]
//! stream := record+            (an empty file still yields one record)
//! ```
//!
//! The IV size and ciphertext expansion depend on the [`CipherKind`]:
//! XChaCha20-Poly1305 (24-byte nonce, +16 tag) or AES-256-CBC (16-byte IV,
//! PKCS#7 padding adds 1..=16 bytes).

pub mod cipher;
pub mod frame;
pub mod key;
pub mod stream;

pub use cipher::{build_cipher, Aes256CbcChunk, ChunkCipher, XChaChaChunk};
pub use frame::{read_record, write_record, ChunkRecord, LEN_PREFIX_SIZE};
pub use key::{generate_key, VaultKey};
pub use stream::{ProgressFn, StreamCodec, StreamStats};

pub use fvault_core::CipherKind;

/// Size of a vault key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an XChaCha20-Poly1305 nonce (192-bit)
pub const NONCE_SIZE: usize = 24;

/// Size of a Poly1305 authentication tag
pub const TAG_SIZE: usize = 16;

/// AES block size, also the CBC IV size
pub const BLOCK_SIZE: usize = 16;
