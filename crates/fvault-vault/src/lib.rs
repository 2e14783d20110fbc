//! fvault-vault: file-level encryption on top of the chunked stream codec
//!
//! `FileVault` owns a storage collaborator and a default key. Every operation
//! resolves its key (per-call override or default) and its destination name
//! (explicit or by `NamingPolicy`), runs the codec between storage handles,
//! and only then applies the move/copy lifecycle.

pub mod engine;
pub mod naming;

pub use engine::{FileVault, OperationReport, OperationRequest, VaultOptions, VaultView};
pub use naming::NamingPolicy;
