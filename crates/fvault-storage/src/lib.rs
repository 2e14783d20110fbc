//! fvault-storage: the byte-stream storage collaborator used by the vault engine
//!
//! The engine only needs sequential reads and writes of named objects, plus
//! existence checks and deletion. One implementation, over an OpenDAL
//! operator, serves both a directory on disk and an in-process store.

pub mod operator;

pub use operator::OperatorStorage;

use fvault_core::{FvaultError, FvaultResult};
use std::io::{Read, Write};

/// Writable handle to one object.
///
/// Bytes are only guaranteed visible after `close`. Callers close on failure
/// too when partial output should be kept.
pub trait ObjectWrite: Write + Send {
    fn close(self: Box<Self>) -> FvaultResult<()>;
}

/// Named-object storage with sequential byte-stream handles.
pub trait Storage: Send + Sync {
    fn exists(&self, path: &str) -> FvaultResult<bool>;

    fn open_read(&self, path: &str) -> FvaultResult<Box<dyn Read + Send>>;

    /// Create or truncate `path` for writing.
    fn open_write(&self, path: &str) -> FvaultResult<Box<dyn ObjectWrite>>;

    fn delete(&self, path: &str) -> FvaultResult<()>;

    /// Human-readable location of `path` (for logs and reports).
    fn full_path(&self, path: &str) -> String;

    /// The name this backend actually stores `path` under. Two names with
    /// the same canonical form address the same object.
    fn canonical_name(&self, path: &str) -> FvaultResult<String> {
        normalize_name(path)
    }
}

/// Canonical form of an object name: `/`-separated, no empty or `.`
/// segments.
///
/// Empty names, absolute names, `..` segments and names ending in `/` are
/// rejected so a name always addresses one object under the storage root.
pub fn normalize_name(name: &str) -> FvaultResult<String> {
    if name.starts_with('/') {
        return Err(FvaultError::InvalidRequest(format!(
            "object name must be relative: {name}"
        )));
    }
    if name.ends_with('/') {
        return Err(FvaultError::InvalidRequest(format!(
            "object name names a directory: {name}"
        )));
    }

    let mut segments = Vec::new();
    for segment in name.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                return Err(FvaultError::InvalidRequest(format!(
                    "object name must stay inside the storage root: {name}"
                )))
            }
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        return Err(FvaultError::InvalidRequest(format!(
            "empty object name: {name:?}"
        )));
    }
    Ok(segments.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_dot_segments() {
        assert_eq!(normalize_name("file.txt").unwrap(), "file.txt");
        assert_eq!(normalize_name("./file.txt").unwrap(), "file.txt");
        assert_eq!(normalize_name("a/./b//c.enc").unwrap(), "a/b/c.enc");
        assert_eq!(normalize_name("././x").unwrap(), "x");
    }

    #[test]
    fn test_normalize_rejects_escapes() {
        for bad in ["", ".", "./", "../outside.txt", "a/../../b", "/etc/passwd", "dir/"] {
            assert!(
                matches!(normalize_name(bad), Err(FvaultError::InvalidRequest(_))),
                "{bad:?} must be rejected"
            );
        }
    }
}
