//! Vault engine: file-level operations over a storage collaborator
//!
//! Operations:
//!   - `encrypt` / `encrypt_copy`: source → `source.enc` (or explicit name)
//!   - `decrypt` / `decrypt_copy`: `source.enc` → source (or explicit name)
//!   - `stream_decrypt`: source → caller-supplied sink, source always kept
//!   - `key(k)`: view running the same operations under a per-call key
//!
//! Lifecycle rules:
//!   - the source must exist before anything is opened for writing
//!   - the destination is created on the first record/plaintext write, so a
//!     run that fails before producing any output leaves nothing behind
//!   - a run that fails mid-stream leaves the partial destination in place
//!   - move operations delete the source only after the whole run succeeded

use fvault_core::config::{FvaultConfig, DEFAULT_CHUNK_SIZE, DEFAULT_EXTENSION};
use fvault_core::{CipherKind, Direction, FvaultError, FvaultResult, OutputTarget, TransferMode};
use fvault_crypto::{build_cipher, generate_key, ProgressFn, StreamCodec, StreamStats, VaultKey};
use fvault_storage::{ObjectWrite, Storage};
use std::io::{self, Write};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::naming::NamingPolicy;

type SharedProgress = Arc<dyn Fn(u64, &str) + Send + Sync>;

/// Cipher and naming settings for a vault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultOptions {
    pub cipher: CipherKind,
    pub chunk_size: usize,
    pub extension: String,
}

impl Default for VaultOptions {
    fn default() -> Self {
        Self {
            cipher: CipherKind::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            extension: DEFAULT_EXTENSION.into(),
        }
    }
}

impl VaultOptions {
    pub fn from_config(config: &FvaultConfig) -> Self {
        Self {
            cipher: config.cipher.algorithm,
            chunk_size: config.cipher.chunk_size,
            extension: config.vault.extension.clone(),
        }
    }
}

/// One requested operation, fully resolved except for the destination name.
#[derive(Debug)]
pub struct OperationRequest<'a> {
    pub source: &'a str,
    /// `Named(name)` for an explicit destination; `None` to apply the naming policy
    pub destination: Option<OutputTarget>,
    pub key: Option<&'a VaultKey>,
    pub mode: TransferMode,
    pub direction: Direction,
}

/// What an operation did
#[derive(Debug, Clone)]
pub struct OperationReport {
    /// Full path of the source
    pub source: String,
    /// Full path of the destination; `None` when output went to a sink
    pub destination: Option<String>,
    pub direction: Direction,
    pub mode: TransferMode,
    /// true if the source was deleted (move semantics)
    pub source_removed: bool,
    pub stats: StreamStats,
}

/// The vault: a storage collaborator plus a default key.
///
/// Cheap to share across threads; each operation keeps its state local.
pub struct FileVault {
    storage: Arc<dyn Storage>,
    default_key: VaultKey,
    options: VaultOptions,
    naming: NamingPolicy,
    progress: Option<SharedProgress>,
}

impl std::fmt::Debug for FileVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileVault")
            .field("default_key", &self.default_key)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl FileVault {
    pub fn new(storage: Arc<dyn Storage>, default_key: VaultKey) -> Self {
        Self::with_options(storage, default_key, VaultOptions::default())
    }

    pub fn with_options(
        storage: Arc<dyn Storage>,
        default_key: VaultKey,
        options: VaultOptions,
    ) -> Self {
        let naming = NamingPolicy::new(options.extension.clone());
        Self {
            storage,
            default_key,
            options,
            naming,
            progress: None,
        }
    }

    /// Report plaintext bytes processed during each operation.
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(Arc::from(progress));
        self
    }

    pub fn storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }

    pub fn options(&self) -> &VaultOptions {
        &self.options
    }

    pub fn naming(&self) -> &NamingPolicy {
        &self.naming
    }

    pub fn exists(&self, path: &str) -> FvaultResult<bool> {
        self.storage.exists(path)
    }

    /// Mint a fresh random key (not stored anywhere).
    pub fn generate_key() -> VaultKey {
        generate_key()
    }

    /// A view whose operations use `key` instead of the default key.
    pub fn key(&self, key: VaultKey) -> VaultView<'_> {
        VaultView { vault: self, key }
    }

    pub fn encrypt(&self, source: &str, destination: Option<&str>) -> FvaultResult<OperationReport> {
        self.execute(request(source, destination, None, TransferMode::Move, Direction::Encrypt))
    }

    pub fn encrypt_copy(
        &self,
        source: &str,
        destination: Option<&str>,
    ) -> FvaultResult<OperationReport> {
        self.execute(request(source, destination, None, TransferMode::Copy, Direction::Encrypt))
    }

    pub fn decrypt(&self, source: &str, destination: Option<&str>) -> FvaultResult<OperationReport> {
        self.execute(request(source, destination, None, TransferMode::Move, Direction::Decrypt))
    }

    pub fn decrypt_copy(
        &self,
        source: &str,
        destination: Option<&str>,
    ) -> FvaultResult<OperationReport> {
        self.execute(request(source, destination, None, TransferMode::Copy, Direction::Decrypt))
    }

    /// Decrypt `source` straight into `sink`. The source is never deleted.
    pub fn stream_decrypt<W: Write + ?Sized>(
        &self,
        source: &str,
        sink: &mut W,
    ) -> FvaultResult<OperationReport> {
        self.stream_decrypt_with(None, source, sink)
    }

    fn codec(&self, key: &VaultKey) -> StreamCodec {
        let codec = StreamCodec::new(build_cipher(self.options.cipher, key), self.options.chunk_size);
        match &self.progress {
            Some(progress) => {
                let progress = progress.clone();
                codec.with_progress(Box::new(move |done: u64, msg: &str| progress(done, msg)))
            }
            None => codec,
        }
    }

    fn require_source(&self, source: &str) -> FvaultResult<()> {
        if !self.storage.exists(source)? {
            return Err(FvaultError::SourceNotFound(self.storage.full_path(source)));
        }
        Ok(())
    }

    /// Run one request against a named destination.
    pub fn execute(&self, req: OperationRequest<'_>) -> FvaultResult<OperationReport> {
        let explicit = match &req.destination {
            Some(OutputTarget::Named(name)) => Some(name.as_str()),
            Some(OutputTarget::Sink) => {
                return Err(FvaultError::InvalidRequest(
                    "sink output requires stream_decrypt".into(),
                ))
            }
            None => None,
        };
        let key = VaultKey::resolve(req.key, &self.default_key);

        self.require_source(req.source)?;
        let destination = self.naming.destination(req.direction, req.source, explicit);
        // Compare what the backend stores, so `./a.txt` and `a.txt` collide
        if self.storage.canonical_name(&destination)? == self.storage.canonical_name(req.source)? {
            return Err(FvaultError::InvalidRequest(format!(
                "destination is the source itself: {}",
                self.storage.full_path(&destination)
            )));
        }
        if self.storage.exists(&destination)? {
            warn!(
                destination = %self.storage.full_path(&destination),
                "destination exists and will be overwritten"
            );
        }

        info!(
            op = %req.direction,
            mode = %req.mode,
            source = %self.storage.full_path(req.source),
            destination = %self.storage.full_path(&destination),
            cipher = %self.options.cipher,
            override_key = req.key.is_some(),
            "starting"
        );

        let mut reader = self.storage.open_read(req.source)?;
        let mut writer = LazyWriter::new(self.storage.as_ref(), &destination);
        let stats = match self.codec(key).run(req.direction, &mut reader, &mut writer) {
            Ok(stats) => stats,
            Err(e) => {
                // A failed destination open reaches the codec as io::Error
                let e = writer.take_open_error().unwrap_or(e);
                warn!(
                    op = %req.direction,
                    source = %self.storage.full_path(req.source),
                    destination_written = writer.is_open(),
                    error = %e,
                    "operation failed; source kept"
                );
                writer.abandon();
                return Err(e);
            }
        };
        writer.finish()?;
        drop(reader);

        let source_removed = req.mode == TransferMode::Move;
        if source_removed {
            self.storage.delete(req.source)?;
            debug!(source = %self.storage.full_path(req.source), "source removed");
        }

        info!(
            op = %req.direction,
            chunks = stats.chunks,
            plaintext_bytes = stats.plaintext_bytes,
            encrypted_bytes = stats.encrypted_bytes,
            source_removed,
            "done"
        );

        Ok(OperationReport {
            source: self.storage.full_path(req.source),
            destination: Some(self.storage.full_path(&destination)),
            direction: req.direction,
            mode: req.mode,
            source_removed,
            stats,
        })
    }

    fn stream_decrypt_with<W: Write + ?Sized>(
        &self,
        explicit_key: Option<&VaultKey>,
        source: &str,
        sink: &mut W,
    ) -> FvaultResult<OperationReport> {
        let key = VaultKey::resolve(explicit_key, &self.default_key);
        self.require_source(source)?;

        info!(
            op = "stream_decrypt",
            source = %self.storage.full_path(source),
            override_key = explicit_key.is_some(),
            "starting"
        );

        let mut reader = self.storage.open_read(source)?;
        let stats = self.codec(key).decrypt(&mut reader, sink)?;

        info!(
            op = "stream_decrypt",
            chunks = stats.chunks,
            plaintext_bytes = stats.plaintext_bytes,
            "done"
        );

        Ok(OperationReport {
            source: self.storage.full_path(source),
            destination: None,
            direction: Direction::Decrypt,
            mode: TransferMode::Copy,
            source_removed: false,
            stats,
        })
    }
}

fn request<'a>(
    source: &'a str,
    destination: Option<&str>,
    key: Option<&'a VaultKey>,
    mode: TransferMode,
    direction: Direction,
) -> OperationRequest<'a> {
    OperationRequest {
        source,
        destination: destination.map(|d| OutputTarget::Named(d.to_string())),
        key,
        mode,
        direction,
    }
}

/// A vault bound to a per-call key. The vault's default key is untouched.
#[derive(Debug)]
pub struct VaultView<'a> {
    vault: &'a FileVault,
    key: VaultKey,
}

impl VaultView<'_> {
    pub fn encrypt(&self, source: &str, destination: Option<&str>) -> FvaultResult<OperationReport> {
        self.vault.execute(request(
            source,
            destination,
            Some(&self.key),
            TransferMode::Move,
            Direction::Encrypt,
        ))
    }

    pub fn encrypt_copy(
        &self,
        source: &str,
        destination: Option<&str>,
    ) -> FvaultResult<OperationReport> {
        self.vault.execute(request(
            source,
            destination,
            Some(&self.key),
            TransferMode::Copy,
            Direction::Encrypt,
        ))
    }

    pub fn decrypt(&self, source: &str, destination: Option<&str>) -> FvaultResult<OperationReport> {
        self.vault.execute(request(
            source,
            destination,
            Some(&self.key),
            TransferMode::Move,
            Direction::Decrypt,
        ))
    }

    pub fn decrypt_copy(
        &self,
        source: &str,
        destination: Option<&str>,
    ) -> FvaultResult<OperationReport> {
        self.vault.execute(request(
            source,
            destination,
            Some(&self.key),
            TransferMode::Copy,
            Direction::Decrypt,
        ))
    }

    pub fn stream_decrypt<W: Write + ?Sized>(
        &self,
        source: &str,
        sink: &mut W,
    ) -> FvaultResult<OperationReport> {
        self.vault.stream_decrypt_with(Some(&self.key), source, sink)
    }
}

/// Destination writer that only creates the object on first write.
struct LazyWriter<'a> {
    storage: &'a dyn Storage,
    path: &'a str,
    inner: Option<Box<dyn ObjectWrite>>,
    open_error: Option<FvaultError>,
}

impl<'a> LazyWriter<'a> {
    fn new(storage: &'a dyn Storage, path: &'a str) -> Self {
        Self {
            storage,
            path,
            inner: None,
            open_error: None,
        }
    }

    fn is_open(&self) -> bool {
        self.inner.is_some()
    }

    fn open(&mut self) -> FvaultResult<&mut Box<dyn ObjectWrite>> {
        let inner = match self.inner.take() {
            Some(inner) => inner,
            None => self.storage.open_write(self.path)?,
        };
        Ok(self.inner.insert(inner))
    }

    /// The error from a failed open, with its original variant.
    fn take_open_error(&mut self) -> Option<FvaultError> {
        self.open_error.take()
    }

    /// Create the destination even if nothing was written, then commit it.
    fn finish(mut self) -> FvaultResult<()> {
        self.open()?;
        match self.inner.take() {
            Some(inner) => inner.close(),
            None => Ok(()),
        }
    }

    /// Commit whatever was written before a failure. Never creates the
    /// destination.
    fn abandon(mut self) {
        if let Some(inner) = self.inner.take() {
            if let Err(e) = inner.close() {
                warn!(
                    destination = %self.storage.full_path(self.path),
                    error = %e,
                    "partial output could not be committed"
                );
            }
        }
    }
}

impl Write for LazyWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.open() {
            Ok(inner) => inner.write(buf),
            Err(e) => {
                let io_err = io::Error::other(e.to_string());
                self.open_error = Some(e);
                Err(io_err)
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.inner.as_mut() {
            Some(inner) => inner.flush(),
            None => Ok(()),
        }
    }
}
