//! Chunk-by-chunk stream codec
//!
//! Encrypt: read ≤ chunk_size → fresh IV → encrypt_chunk → write_record → repeat
//! Decrypt: read_record → decrypt_chunk → write plaintext → repeat
//!
//! Both directions work one chunk ahead so the final record can be sealed
//! and checked as final. Memory is two chunks, whatever the stream length.
//! Output already written when a later chunk fails is left as-is.

use fvault_core::{FvaultError, FvaultResult};
use std::io::{Read, Write};
use tracing::debug;

use crate::cipher::ChunkCipher;
use crate::frame::{read_full, read_record, write_record, ChunkRecord};

/// Progress callback (plaintext_bytes_done, message)
pub type ProgressFn = Box<dyn Fn(u64, &str) + Send + Sync>;

/// Counters for one codec run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub chunks: u64,
    pub plaintext_bytes: u64,
    pub encrypted_bytes: u64,
}

pub struct StreamCodec {
    cipher: Box<dyn ChunkCipher>,
    chunk_size: usize,
    progress: Option<ProgressFn>,
}

impl StreamCodec {
    pub fn new(cipher: Box<dyn ChunkCipher>, chunk_size: usize) -> Self {
        Self {
            cipher,
            chunk_size: chunk_size.max(1),
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn cipher(&self) -> &dyn ChunkCipher {
        self.cipher.as_ref()
    }

    /// Largest legal record body (IV + ciphertext) for this codec.
    pub fn max_record_body(&self) -> usize {
        self.cipher.iv_len() + self.cipher.ciphertext_len(self.chunk_size)
    }

    fn report(&self, done: u64, msg: &str) {
        if let Some(progress) = &self.progress {
            progress(done, msg);
        }
    }

    /// Encrypt everything `reader` yields into framed records on `writer`.
    ///
    /// Always writes at least one record: an empty source becomes a single
    /// record holding zero plaintext bytes.
    pub fn encrypt<R, W>(&self, reader: &mut R, writer: &mut W) -> FvaultResult<StreamStats>
    where
        R: Read + ?Sized,
        W: Write + ?Sized,
    {
        let mut stats = StreamStats::default();
        let mut buf = vec![0u8; self.chunk_size];
        let mut next = vec![0u8; self.chunk_size];

        let mut n = read_full(reader, &mut buf)?;
        loop {
            // A full chunk may be the last one; look ahead to find out
            let next_len = if n < self.chunk_size {
                0
            } else {
                read_full(reader, &mut next)?
            };
            let last = next_len == 0;

            let iv = self.cipher.generate_iv();
            let ciphertext = self
                .cipher
                .encrypt_chunk(stats.chunks, last, &iv, &buf[..n])?;
            let written = write_record(writer, &iv, &ciphertext)?;

            stats.chunks += 1;
            stats.plaintext_bytes += n as u64;
            stats.encrypted_bytes += written as u64;
            self.report(stats.plaintext_bytes, "encrypting");

            if last {
                break;
            }
            std::mem::swap(&mut buf, &mut next);
            n = next_len;
        }

        writer.flush()?;
        debug!(
            chunks = stats.chunks,
            plaintext_bytes = stats.plaintext_bytes,
            encrypted_bytes = stats.encrypted_bytes,
            cipher = %self.cipher.kind(),
            "stream encrypted"
        );
        Ok(stats)
    }

    /// Decrypt framed records from `reader`, writing plaintext to `writer`.
    ///
    /// Stops at the first error; plaintext of earlier chunks has already
    /// been written by then.
    pub fn decrypt<R, W>(&self, reader: &mut R, writer: &mut W) -> FvaultResult<StreamStats>
    where
        R: Read + ?Sized,
        W: Write + ?Sized,
    {
        let mut stats = StreamStats::default();
        let iv_len = self.cipher.iv_len();
        let max_body = self.max_record_body();

        let mut pending = read_record(reader, 0, iv_len, max_body)?;
        if pending.is_none() {
            // Every encrypted stream carries at least one record
            return Err(FvaultError::TruncatedStream {
                expected: crate::LEN_PREFIX_SIZE,
                actual: 0,
            });
        }

        while let Some(record) = pending.take() {
            let index = stats.chunks;
            // Read one record ahead to learn whether this one is the last.
            // A bad following record still lets this one through first.
            let following = read_record(reader, index + 1, iv_len, max_body);
            let last = matches!(following, Ok(None));

            let plaintext = self.open_record(index, last, &record)?;
            writer.write_all(&plaintext)?;

            stats.chunks += 1;
            stats.plaintext_bytes += plaintext.len() as u64;
            stats.encrypted_bytes += record.encoded_len() as u64;
            self.report(stats.plaintext_bytes, "decrypting");

            pending = following?;
        }

        writer.flush()?;
        debug!(
            chunks = stats.chunks,
            plaintext_bytes = stats.plaintext_bytes,
            encrypted_bytes = stats.encrypted_bytes,
            cipher = %self.cipher.kind(),
            "stream decrypted"
        );
        Ok(stats)
    }

    /// Decrypt one record. A record that only opens as a non-final chunk
    /// where the stream ends means records were cut off after it.
    fn open_record(&self, index: u64, last: bool, record: &ChunkRecord) -> FvaultResult<Vec<u8>> {
        let cipher = self.cipher.as_ref();
        match cipher.decrypt_chunk(index, last, &record.iv, &record.ciphertext) {
            Err(FvaultError::CorruptChunk { .. })
                if last
                    && cipher
                        .decrypt_chunk(index, false, &record.iv, &record.ciphertext)
                        .is_ok() =>
            {
                Err(FvaultError::TruncatedStream {
                    expected: crate::LEN_PREFIX_SIZE,
                    actual: 0,
                })
            }
            other => other,
        }
    }

    /// Run in the given direction.
    pub fn run<R, W>(
        &self,
        direction: fvault_core::Direction,
        reader: &mut R,
        writer: &mut W,
    ) -> FvaultResult<StreamStats>
    where
        R: Read + ?Sized,
        W: Write + ?Sized,
    {
        match direction {
            fvault_core::Direction::Encrypt => self.encrypt(reader, writer),
            fvault_core::Direction::Decrypt => self.decrypt(reader, writer),
        }
    }
}
