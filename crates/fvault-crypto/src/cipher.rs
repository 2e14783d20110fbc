//! Per-chunk ciphers
//!
//! Each chunk is sealed on its own with a caller-supplied IV. Two ciphers share
//! the record format; only the IV size and ciphertext expansion differ:
//! ```text
//! XChaCha20-Poly1305: iv = 24-byte nonce, ct = plaintext + 16-byte tag,
//!                     AAD = chunk_index (8 bytes, big-endian) || last (1 byte)
//! AES-256-CBC:        iv = 16 bytes,      ct = PKCS#7(plaintext), 1..=16 bytes of padding
//! ```
//!
//! The AAD binds an AEAD chunk to its position and to whether it closes the
//! stream, so swapped, dropped-from-the-end or appended records all fail
//! authentication. CBC has no such binding and ignores `last`.

use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes256, Block as AesBlock};
use chacha20poly1305::{
    aead::{Aead, Payload},
    XChaCha20Poly1305, XNonce,
};
use fvault_core::{CipherKind, FvaultError, FvaultResult};
use rand::RngCore;

use crate::key::VaultKey;
use crate::{BLOCK_SIZE, NONCE_SIZE, TAG_SIZE};

/// One-chunk encryption under a key bound at construction.
pub trait ChunkCipher: Send + Sync {
    fn kind(&self) -> CipherKind;

    /// IV (or nonce) length in bytes.
    fn iv_len(&self) -> usize;

    /// Exact ciphertext length produced for `plaintext_len` bytes.
    fn ciphertext_len(&self, plaintext_len: usize) -> usize;

    /// `last` marks the final chunk of the stream.
    fn encrypt_chunk(
        &self,
        index: u64,
        last: bool,
        iv: &[u8],
        plaintext: &[u8],
    ) -> FvaultResult<Vec<u8>>;

    /// Fails with `CorruptChunk` on wrong key, tampering, or a `last` flag
    /// that differs from the one sealed in.
    fn decrypt_chunk(
        &self,
        index: u64,
        last: bool,
        iv: &[u8],
        ciphertext: &[u8],
    ) -> FvaultResult<Vec<u8>>;

    /// Fresh IV from the OS CSPRNG.
    fn generate_iv(&self) -> Vec<u8> {
        let mut iv = vec![0u8; self.iv_len()];
        rand::rngs::OsRng.fill_bytes(&mut iv);
        iv
    }
}

/// Build the cipher selected by `kind`, bound to `key`.
pub fn build_cipher(kind: CipherKind, key: &VaultKey) -> Box<dyn ChunkCipher> {
    match kind {
        CipherKind::XChaCha20Poly1305 => Box::new(XChaChaChunk::new(key)),
        CipherKind::Aes256Cbc => Box::new(Aes256CbcChunk::new(key)),
    }
}

fn check_iv(expected: usize, iv: &[u8]) -> FvaultResult<()> {
    if iv.len() != expected {
        return Err(FvaultError::InvalidRequest(format!(
            "IV must be {expected} bytes, got {}",
            iv.len()
        )));
    }
    Ok(())
}

/// Reason given for every chunk that fails to decrypt, whatever the cause
const REJECTED: &str = "decryption failed: wrong key or tampered data";

fn chunk_aad(index: u64, last: bool) -> [u8; 9] {
    let mut aad = [0u8; 9];
    aad[..8].copy_from_slice(&index.to_be_bytes());
    aad[8] = u8::from(last);
    aad
}

// ── XChaCha20-Poly1305 ────────────────────────────────────────────────────────

pub struct XChaChaChunk {
    cipher: XChaCha20Poly1305,
}

impl XChaChaChunk {
    pub fn new(key: &VaultKey) -> Self {
        Self {
            cipher: XChaCha20Poly1305::new(key.as_bytes().into()),
        }
    }
}

impl ChunkCipher for XChaChaChunk {
    fn kind(&self) -> CipherKind {
        CipherKind::XChaCha20Poly1305
    }

    fn iv_len(&self) -> usize {
        NONCE_SIZE
    }

    fn ciphertext_len(&self, plaintext_len: usize) -> usize {
        plaintext_len + TAG_SIZE
    }

    fn encrypt_chunk(
        &self,
        index: u64,
        last: bool,
        iv: &[u8],
        plaintext: &[u8],
    ) -> FvaultResult<Vec<u8>> {
        check_iv(NONCE_SIZE, iv)?;
        let aad = chunk_aad(index, last);
        self.cipher
            .encrypt(
                XNonce::from_slice(iv),
                Payload {
                    msg: plaintext,
                    aad: &aad,
                },
            )
            .map_err(|e| FvaultError::Other(anyhow::anyhow!("chunk {index} encryption failed: {e}")))
    }

    fn decrypt_chunk(
        &self,
        index: u64,
        last: bool,
        iv: &[u8],
        ciphertext: &[u8],
    ) -> FvaultResult<Vec<u8>> {
        if iv.len() != NONCE_SIZE {
            return Err(FvaultError::corrupt(index, "nonce has wrong size"));
        }
        if ciphertext.len() < TAG_SIZE {
            return Err(FvaultError::corrupt(
                index,
                format!("ciphertext shorter than tag: {} bytes", ciphertext.len()),
            ));
        }
        let aad = chunk_aad(index, last);
        self.cipher
            .decrypt(
                XNonce::from_slice(iv),
                Payload {
                    msg: ciphertext,
                    aad: &aad,
                },
            )
            .map_err(|_| FvaultError::corrupt(index, REJECTED))
    }
}

// ── AES-256-CBC + PKCS#7 ──────────────────────────────────────────────────────

pub struct Aes256CbcChunk {
    cipher: Aes256,
}

impl Aes256CbcChunk {
    pub fn new(key: &VaultKey) -> Self {
        Self {
            cipher: Aes256::new(key.as_bytes().into()),
        }
    }
}

fn xor_into(block: &mut [u8; BLOCK_SIZE], other: &[u8]) {
    for (b, o) in block.iter_mut().zip(other) {
        *b ^= o;
    }
}

impl ChunkCipher for Aes256CbcChunk {
    fn kind(&self) -> CipherKind {
        CipherKind::Aes256Cbc
    }

    fn iv_len(&self) -> usize {
        BLOCK_SIZE
    }

    fn ciphertext_len(&self, plaintext_len: usize) -> usize {
        (plaintext_len / BLOCK_SIZE + 1) * BLOCK_SIZE
    }

    fn encrypt_chunk(
        &self,
        _index: u64,
        _last: bool,
        iv: &[u8],
        plaintext: &[u8],
    ) -> FvaultResult<Vec<u8>> {
        check_iv(BLOCK_SIZE, iv)?;

        let pad = BLOCK_SIZE - plaintext.len() % BLOCK_SIZE;
        let mut out = Vec::with_capacity(plaintext.len() + pad);
        out.extend_from_slice(plaintext);
        out.resize(plaintext.len() + pad, pad as u8);

        let mut prev = [0u8; BLOCK_SIZE];
        prev.copy_from_slice(iv);
        for chunk in out.chunks_exact_mut(BLOCK_SIZE) {
            let mut block = [0u8; BLOCK_SIZE];
            block.copy_from_slice(chunk);
            xor_into(&mut block, &prev);

            let mut aes_block = AesBlock::from(block);
            self.cipher.encrypt_block(&mut aes_block);
            chunk.copy_from_slice(&aes_block);
            prev.copy_from_slice(chunk);
        }
        Ok(out)
    }

    fn decrypt_chunk(
        &self,
        index: u64,
        _last: bool,
        iv: &[u8],
        ciphertext: &[u8],
    ) -> FvaultResult<Vec<u8>> {
        if iv.len() != BLOCK_SIZE {
            return Err(FvaultError::corrupt(index, "IV has wrong size"));
        }
        if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
            return Err(FvaultError::corrupt(
                index,
                format!("ciphertext length {} is not a positive multiple of {BLOCK_SIZE}", ciphertext.len()),
            ));
        }

        let mut out = Vec::with_capacity(ciphertext.len());
        let mut prev = iv;
        for chunk in ciphertext.chunks_exact(BLOCK_SIZE) {
            let mut aes_block = AesBlock::clone_from_slice(chunk);
            self.cipher.decrypt_block(&mut aes_block);

            let mut block = [0u8; BLOCK_SIZE];
            block.copy_from_slice(&aes_block);
            xor_into(&mut block, prev);
            out.extend_from_slice(&block);
            prev = chunk;
        }

        // out holds at least one block; scan the whole last block either way
        let tail = &out[out.len() - BLOCK_SIZE..];
        let pad = tail[BLOCK_SIZE - 1];
        let mut bad = u8::from(pad == 0) | u8::from(pad as usize > BLOCK_SIZE);
        for (i, &b) in tail.iter().rev().enumerate() {
            bad |= u8::from(i < pad as usize) & u8::from(b != pad);
        }
        if bad != 0 {
            return Err(FvaultError::corrupt(index, REJECTED));
        }
        out.truncate(out.len() - pad as usize);
        Ok(out)
    }
}
