//! OpenDAL-backed storage
//!
//! The vault engine is synchronous, so the async operator is wrapped in
//! opendal's blocking operator. That needs a tokio runtime; each storage
//! owns one and shares it between clones.

use anyhow::Context;
use fvault_core::{FvaultError, FvaultResult};
use opendal::{blocking, ErrorKind, Operator};
use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing::debug;

use crate::{normalize_name, ObjectWrite, Storage};

/// Bytes buffered before a write is handed to the operator.
const WRITE_BUFFER: usize = 256 * 1024;

/// Named objects behind an OpenDAL operator.
#[derive(Clone)]
pub struct OperatorStorage {
    op: blocking::Operator,
    // Declared after `op` so the runtime outlives it on drop
    _runtime: Arc<Runtime>,
    location: String,
}

impl std::fmt::Debug for OperatorStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperatorStorage")
            .field("location", &self.location)
            .finish()
    }
}

impl OperatorStorage {
    /// Objects stored as files under `root`. The directory is created if
    /// missing.
    pub fn local(root: impl AsRef<Path>) -> FvaultResult<Self> {
        let root = root.as_ref();
        let root = if root.is_absolute() {
            root.to_path_buf()
        } else {
            std::env::current_dir()?.join(root)
        };
        let root_str = root.to_string_lossy().into_owned();
        let builder = opendal::services::Fs::default().root(&root_str);
        let op = Operator::new(builder)
            .context("creating OpenDAL fs operator")?
            .layer(opendal::layers::LoggingLayer::default())
            .finish();
        Self::wrap(op, root_str.trim_end_matches('/').to_string())
    }

    /// Objects held in process memory. Clones share the same objects.
    pub fn memory() -> FvaultResult<Self> {
        let op = Operator::new(opendal::services::Memory::default())
            .context("creating OpenDAL memory operator")?
            .finish();
        Self::wrap(op, "memory:/".to_string())
    }

    fn wrap(op: Operator, location: String) -> FvaultResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("fvault-storage")
            .enable_all()
            .build()?;
        let op = {
            let _guard = runtime.enter();
            blocking::Operator::new(op).context("creating blocking operator")?
        };
        debug!(location = %location, "storage ready");
        Ok(Self {
            op,
            _runtime: Arc::new(runtime),
            location,
        })
    }

    /// Store `data` under `path` in one write, replacing any existing object.
    pub fn put(&self, path: &str, data: impl Into<Vec<u8>>) -> FvaultResult<()> {
        let name = normalize_name(path)?;
        self.op
            .write(&name, data.into())
            .map_err(|e| self.storage_error(e, &name))?;
        Ok(())
    }

    /// Whole contents of the object at `path`.
    pub fn get(&self, path: &str) -> FvaultResult<Vec<u8>> {
        let name = normalize_name(path)?;
        let buf = self.op.read(&name).map_err(|e| self.storage_error(e, &name))?;
        Ok(buf.to_vec())
    }

    fn storage_error(&self, err: opendal::Error, name: &str) -> FvaultError {
        match err.kind() {
            ErrorKind::NotFound => FvaultError::SourceNotFound(self.full_path(name)),
            _ => FvaultError::Other(
                anyhow::Error::new(err).context(format!("storage: {}", self.full_path(name))),
            ),
        }
    }
}

impl Storage for OperatorStorage {
    fn exists(&self, path: &str) -> FvaultResult<bool> {
        let name = normalize_name(path)?;
        self.op.exists(&name).map_err(|e| self.storage_error(e, &name))
    }

    fn open_read(&self, path: &str) -> FvaultResult<Box<dyn Read + Send>> {
        let name = normalize_name(path)?;
        // Readers are lazy; surface a missing object here, not on first read
        if !self.op.exists(&name).map_err(|e| self.storage_error(e, &name))? {
            return Err(FvaultError::SourceNotFound(self.full_path(&name)));
        }
        let reader = self
            .op
            .reader(&name)
            .and_then(|r| r.into_std_read(..))
            .map_err(|e| self.storage_error(e, &name))?;
        Ok(Box::new(reader))
    }

    fn open_write(&self, path: &str) -> FvaultResult<Box<dyn ObjectWrite>> {
        let name = normalize_name(path)?;
        let writer = self
            .op
            .writer(&name)
            .map_err(|e| self.storage_error(e, &name))?;
        Ok(Box::new(OperatorWriter {
            inner: writer,
            pending: Vec::with_capacity(WRITE_BUFFER),
            location: self.full_path(&name),
        }))
    }

    fn delete(&self, path: &str) -> FvaultResult<()> {
        let name = normalize_name(path)?;
        self.op
            .delete(&name)
            .map_err(|e| self.storage_error(e, &name))?;
        debug!(path = %self.full_path(&name), "removed");
        Ok(())
    }

    fn full_path(&self, path: &str) -> String {
        let name = normalize_name(path).unwrap_or_else(|_| path.to_string());
        format!("{}/{}", self.location, name)
    }
}

/// Buffers small record writes into larger operator writes.
struct OperatorWriter {
    inner: blocking::Writer,
    pending: Vec<u8>,
    location: String,
}

impl OperatorWriter {
    fn drain(&mut self) -> io::Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let chunk = std::mem::replace(&mut self.pending, Vec::with_capacity(WRITE_BUFFER));
        self.inner.write(chunk).map_err(io::Error::other)
    }
}

impl Write for OperatorWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        if self.pending.len() >= WRITE_BUFFER {
            self.drain()?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.drain()
    }
}

impl ObjectWrite for OperatorWriter {
    fn close(mut self: Box<Self>) -> FvaultResult<()> {
        self.drain()?;
        self.inner
            .close()
            .with_context(|| format!("closing {}", self.location))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_object(storage: &OperatorStorage, path: &str, data: &[u8]) {
        let mut w = storage.open_write(path).unwrap();
        w.write_all(data).unwrap();
        w.close().unwrap();
    }

    fn read_object(storage: &OperatorStorage, path: &str) -> Vec<u8> {
        let mut out = Vec::new();
        storage.open_read(path).unwrap().read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn test_local_write_read_delete() {
        let tmp = TempDir::new().unwrap();
        let storage = OperatorStorage::local(tmp.path()).unwrap();

        assert!(!storage.exists("a.txt").unwrap());
        write_object(&storage, "a.txt", b"hello");
        assert!(storage.exists("a.txt").unwrap());
        assert_eq!(std::fs::read(tmp.path().join("a.txt")).unwrap(), b"hello");
        assert_eq!(read_object(&storage, "a.txt"), b"hello");

        storage.delete("a.txt").unwrap();
        assert!(!storage.exists("a.txt").unwrap());
        assert!(!tmp.path().join("a.txt").exists());
    }

    #[test]
    fn test_local_nested_write_creates_parents() {
        let tmp = TempDir::new().unwrap();
        let storage = OperatorStorage::local(tmp.path()).unwrap();

        write_object(&storage, "backups/2024/db.dump", b"x");
        assert!(tmp.path().join("backups/2024/db.dump").is_file());
    }

    #[test]
    fn test_dot_prefixed_name_is_same_object() {
        let tmp = TempDir::new().unwrap();
        let storage = OperatorStorage::local(tmp.path()).unwrap();
        write_object(&storage, "file.txt", b"one");

        assert!(storage.exists("./file.txt").unwrap());
        assert_eq!(read_object(&storage, "./file.txt"), b"one");
        assert_eq!(storage.full_path("./file.txt"), storage.full_path("file.txt"));
        assert_eq!(
            storage.canonical_name("./file.txt").unwrap(),
            storage.canonical_name("file.txt").unwrap()
        );
    }

    #[test]
    fn test_missing_source() {
        let tmp = TempDir::new().unwrap();
        let storage = OperatorStorage::local(tmp.path()).unwrap();

        assert!(matches!(
            storage.open_read("nope.txt"),
            Err(FvaultError::SourceNotFound(_))
        ));
    }

    #[test]
    fn test_rejects_escaping_names() {
        let tmp = TempDir::new().unwrap();
        let storage = OperatorStorage::local(tmp.path()).unwrap();

        for bad in ["../outside.txt", "a/../../b", "/etc/passwd", ""] {
            assert!(
                matches!(storage.exists(bad), Err(FvaultError::InvalidRequest(_))),
                "{bad:?} must be rejected"
            );
            assert!(matches!(
                storage.open_write(bad),
                Err(FvaultError::InvalidRequest(_))
            ));
        }
    }

    #[test]
    fn test_memory_put_get() {
        let storage = OperatorStorage::memory().unwrap();
        storage.put("a", b"one".to_vec()).unwrap();

        assert_eq!(storage.get("a").unwrap(), b"one");
        assert!(storage.exists("a").unwrap());
        assert!(!storage.exists("b").unwrap());
        assert!(matches!(storage.get("b"), Err(FvaultError::SourceNotFound(_))));
    }

    #[test]
    fn test_memory_writer_replaces_on_close() {
        let storage = OperatorStorage::memory().unwrap();
        storage.put("a", b"old contents".to_vec()).unwrap();

        let mut w = storage.open_write("a").unwrap();
        w.write_all(b"new ").unwrap();
        w.write_all(b"data").unwrap();
        w.close().unwrap();

        assert_eq!(storage.get("a").unwrap(), b"new data");
    }

    #[test]
    fn test_large_write_spans_buffer() {
        let storage = OperatorStorage::memory().unwrap();
        let data: Vec<u8> = (0..WRITE_BUFFER * 2 + 17).map(|i| i as u8).collect();

        let mut w = storage.open_write("big").unwrap();
        for piece in data.chunks(1000) {
            w.write_all(piece).unwrap();
        }
        w.close().unwrap();

        assert_eq!(read_object(&storage, "big"), data);
    }

    #[test]
    fn test_memory_clones_share_objects() {
        let storage = OperatorStorage::memory().unwrap();
        let other = storage.clone();
        other.put("shared", b"y".to_vec()).unwrap();

        assert_eq!(storage.get("shared").unwrap(), b"y");
        storage.delete("shared").unwrap();
        assert!(!other.exists("shared").unwrap());
    }

    #[test]
    fn test_full_path() {
        let storage = OperatorStorage::memory().unwrap();
        assert_eq!(storage.full_path("doc.txt"), "memory://doc.txt");

        let tmp = TempDir::new().unwrap();
        let local = OperatorStorage::local(tmp.path()).unwrap();
        assert_eq!(
            local.full_path("file.txt"),
            format!("{}/file.txt", tmp.path().display())
        );
    }
}
