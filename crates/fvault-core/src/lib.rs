//! fvault-core: shared error type, configuration schema, and common enums
//! used by every crate in the workspace.

pub mod config;
pub mod error;
pub mod types;

pub use error::{FvaultError, FvaultResult};
pub use types::{CipherKind, Direction, OutputTarget, TransferMode};
