//! Record framing for the encrypted stream
//!
//! ```text
//! [4 bytes: u32 BE body length][body: iv || ciphertext]
//! ```
//!
//! The explicit length lets a reader stop exactly at the end of each record
//! without over-reading, and lets it reject a hostile length before
//! allocating.

use fvault_core::{FvaultError, FvaultResult};
use std::io::{ErrorKind, Read, Write};

/// Size of the record length prefix
pub const LEN_PREFIX_SIZE: usize = 4;

/// One framed chunk: IV followed by ciphertext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRecord {
    pub iv: Vec<u8>,
    pub ciphertext: Vec<u8>,
}

impl ChunkRecord {
    /// Encoded size including the length prefix.
    pub fn encoded_len(&self) -> usize {
        LEN_PREFIX_SIZE + self.iv.len() + self.ciphertext.len()
    }
}

/// Write one record. Returns the number of bytes written.
pub fn write_record<W: Write + ?Sized>(
    output: &mut W,
    iv: &[u8],
    ciphertext: &[u8],
) -> FvaultResult<usize> {
    let body_len = iv.len() + ciphertext.len();
    let len = u32::try_from(body_len).map_err(|_| {
        FvaultError::InvalidRequest(format!("record body too large to frame: {body_len} bytes"))
    })?;

    output.write_all(&len.to_be_bytes())?;
    output.write_all(iv)?;
    output.write_all(ciphertext)?;
    Ok(LEN_PREFIX_SIZE + body_len)
}

/// Read one record.
///
/// - `Ok(None)`: clean end of stream (no bytes where a length was expected)
/// - `TruncatedStream`: partial length prefix, or body shorter than declared
/// - `CorruptChunk`: declared length below `iv_len` or above `max_body_len`
///
/// `index` is only used to label errors.
pub fn read_record<R: Read + ?Sized>(
    input: &mut R,
    index: u64,
    iv_len: usize,
    max_body_len: usize,
) -> FvaultResult<Option<ChunkRecord>> {
    let mut len_buf = [0u8; LEN_PREFIX_SIZE];
    let got = read_full(input, &mut len_buf)?;
    if got == 0 {
        return Ok(None);
    }
    if got < LEN_PREFIX_SIZE {
        return Err(FvaultError::TruncatedStream {
            expected: LEN_PREFIX_SIZE,
            actual: got,
        });
    }

    let body_len = u32::from_be_bytes(len_buf) as usize;
    if body_len < iv_len {
        return Err(FvaultError::corrupt(
            index,
            format!("record length {body_len} is shorter than the {iv_len}-byte IV"),
        ));
    }
    if body_len > max_body_len {
        return Err(FvaultError::corrupt(
            index,
            format!("record length {body_len} exceeds maximum {max_body_len}"),
        ));
    }

    let mut body = vec![0u8; body_len];
    let got = read_full(input, &mut body)?;
    if got < body_len {
        return Err(FvaultError::TruncatedStream {
            expected: body_len,
            actual: got,
        });
    }

    let ciphertext = body.split_off(iv_len);
    Ok(Some(ChunkRecord {
        iv: body,
        ciphertext,
    }))
}

/// Fill `buf` from `input`, stopping early only at end of stream.
/// Returns the number of bytes read.
pub(crate) fn read_full<R: Read + ?Sized>(input: &mut R, buf: &mut [u8]) -> FvaultResult<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match input.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Reader that hands out at most `step` bytes per call.
    struct Trickle<'a> {
        data: &'a [u8],
        step: usize,
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = self.step.min(buf.len()).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    #[test]
    fn test_write_layout() {
        let mut out = Vec::new();
        let written = write_record(&mut out, &[1, 2, 3], &[9, 9]).unwrap();

        assert_eq!(written, 4 + 5);
        assert_eq!(out, vec![0, 0, 0, 5, 1, 2, 3, 9, 9]);
    }

    #[test]
    fn test_read_back_sequence() {
        let mut out = Vec::new();
        write_record(&mut out, &[0xAA; 4], b"first").unwrap();
        write_record(&mut out, &[0xBB; 4], b"").unwrap();

        let mut input = Cursor::new(out);
        let r1 = read_record(&mut input, 0, 4, 64).unwrap().unwrap();
        let r2 = read_record(&mut input, 1, 4, 64).unwrap().unwrap();

        assert_eq!(r1.iv, vec![0xAA; 4]);
        assert_eq!(r1.ciphertext, b"first");
        assert_eq!(r2.iv, vec![0xBB; 4]);
        assert!(r2.ciphertext.is_empty());
        assert_eq!(r1.encoded_len(), 4 + 4 + 5);
        assert!(read_record(&mut input, 2, 4, 64).unwrap().is_none());
    }

    #[test]
    fn test_empty_input_is_clean_end() {
        let mut input = Cursor::new(Vec::<u8>::new());
        assert!(read_record(&mut input, 0, 16, 64).unwrap().is_none());
    }

    #[test]
    fn test_partial_length_prefix() {
        let mut input = Cursor::new(vec![0u8, 0]);
        let err = read_record(&mut input, 0, 16, 64).unwrap_err();
        assert!(matches!(
            err,
            FvaultError::TruncatedStream {
                expected: 4,
                actual: 2
            }
        ));
    }

    #[test]
    fn test_short_body() {
        let mut bytes = Vec::new();
        write_record(&mut bytes, &[0u8; 16], &[7u8; 32]).unwrap();
        bytes.truncate(bytes.len() - 10);

        let err = read_record(&mut Cursor::new(bytes), 0, 16, 1024).unwrap_err();
        assert!(matches!(
            err,
            FvaultError::TruncatedStream {
                expected: 48,
                actual: 38
            }
        ));
    }

    #[test]
    fn test_length_below_iv() {
        let mut input = Cursor::new(vec![0, 0, 0, 3, 1, 2, 3]);
        let err = read_record(&mut input, 5, 16, 1024).unwrap_err();
        assert!(matches!(err, FvaultError::CorruptChunk { index: 5, .. }));
    }

    #[test]
    fn test_length_above_max() {
        let mut input = Cursor::new(0xFFFF_FFFFu32.to_be_bytes().to_vec());
        let err = read_record(&mut input, 0, 16, 1024).unwrap_err();
        assert!(matches!(err, FvaultError::CorruptChunk { .. }));
    }

    #[test]
    fn test_reads_across_short_reads() {
        let mut bytes = Vec::new();
        write_record(&mut bytes, &[3u8; 24], &[4u8; 100]).unwrap();

        let mut input = Trickle {
            data: &bytes,
            step: 3,
        };
        let record = read_record(&mut input, 0, 24, 1024).unwrap().unwrap();
        assert_eq!(record.iv, vec![3u8; 24]);
        assert_eq!(record.ciphertext, vec![4u8; 100]);
    }
}
