//! On-disk record framing.
//!
//! Layout (all integers little-endian u32):
//!
//! ```text
//! offset  0    4    8        8+kl        8+kl+20     12+kl+20
//!         +----+----+-----…--+-----…-----+----+-----…---------+
//!         |size| kl | key(kl)| hash(20)  | vl | value(vl)     |
//!         +----+----+-----…--+-----…-----+----+-----…---------+
//! ```
//!
//! `size` is the total encoded length and doubles as the self-delimiting
//! framing recovery walks to find the next record boundary.

use crate::error::{Result, StorageError};
use sha1::{Digest, Sha1};
use std::io::{self, Read};

pub const HASH_LEN: usize = 20;
const HEADER_LEN: usize = 8;
const FIXED_OVERHEAD: usize = HEADER_LEN + HASH_LEN + 4; // size+kl, hash, vl

/// Encodes a `(key, value)` pair into its on-disk framing.
pub fn encode(key: &[u8], value: &[u8]) -> Result<Vec<u8>> {
    if key.is_empty() {
        return Err(StorageError::InvalidFormat("key must not be empty".into()));
    }
    if key.len() > u32::MAX as usize {
        return Err(StorageError::InvalidFormat("key too long".into()));
    }
    if value.len() > u32::MAX as usize {
        return Err(StorageError::InvalidFormat("value too long".into()));
    }

    let size = FIXED_OVERHEAD
        .checked_add(key.len())
        .and_then(|n| n.checked_add(value.len()))
        .ok_or_else(|| StorageError::InvalidFormat("record too large".into()))?;
    if size > u32::MAX as usize {
        return Err(StorageError::InvalidFormat("record too large".into()));
    }

    let mut hasher = Sha1::new();
    hasher.update(value);
    let hash = hasher.finalize();

    let mut buf = Vec::with_capacity(size);
    buf.extend_from_slice(&(size as u32).to_le_bytes());
    buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
    buf.extend_from_slice(key);
    buf.extend_from_slice(&hash);
    buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
    buf.extend_from_slice(value);

    Ok(buf)
}

/// Decodes a complete, previously-framed record back into `(key, value)`.
///
/// Used by tests exercising the framing round-trip; production code paths
/// use [`decode_header_only`] and [`read_value`] so the value is never
/// materialized unless the caller actually asked for it.
pub fn decode(data: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
    if data.len() < HEADER_LEN {
        return Err(StorageError::Corrupted("truncated record header".into()));
    }
    let kl = u32::from_le_bytes(data[4..8].try_into().unwrap()) as usize;
    let key_end = HEADER_LEN
        .checked_add(kl)
        .ok_or_else(|| StorageError::Corrupted("key length overflow".into()))?;
    if data.len() < key_end + HASH_LEN + 4 {
        return Err(StorageError::Corrupted("truncated record body".into()));
    }
    let key = data[HEADER_LEN..key_end].to_vec();
    let vl_start = key_end + HASH_LEN;
    let vl = u32::from_le_bytes(data[vl_start..vl_start + 4].try_into().unwrap()) as usize;
    let value_start = vl_start + 4;
    if data.len() < value_start + vl {
        return Err(StorageError::Corrupted("truncated record value".into()));
    }
    let value = data[value_start..value_start + vl].to_vec();
    Ok((key, value))
}

/// Extracts the key from a fully-buffered record without touching the value,
/// returning `(key, record_len)`. Used by recovery, which already holds the
/// whole `size`-byte record in a scratch buffer and only needs the key to
/// bind it to a file offset.
pub fn decode_header_only(data: &[u8]) -> Result<(Vec<u8>, u32)> {
    if data.len() < HEADER_LEN {
        return Err(StorageError::Corrupted("truncated record header".into()));
    }
    let size = u32::from_le_bytes(data[0..4].try_into().unwrap());
    let kl = u32::from_le_bytes(data[4..8].try_into().unwrap()) as usize;
    let key_end = HEADER_LEN
        .checked_add(kl)
        .ok_or_else(|| StorageError::Corrupted("key length overflow".into()))?;
    if data.len() < key_end {
        return Err(StorageError::Corrupted("truncated record key".into()));
    }
    Ok((data[HEADER_LEN..key_end].to_vec(), size))
}

/// Reads the value of a single record from a forward-only stream positioned
/// at the record's `size` field, verifying the stored SHA-1 digest.
///
/// Skips the key bytes without allocating the key itself.
pub fn read_value<R: Read>(reader: &mut R) -> Result<Vec<u8>> {
    let mut header = [0u8; HEADER_LEN];
    reader.read_exact(&mut header)?;
    let kl = u32::from_le_bytes(header[4..8].try_into().unwrap()) as u64;

    skip(reader, kl)?;

    let mut hash = [0u8; HASH_LEN];
    reader.read_exact(&mut hash)?;

    let mut vl_buf = [0u8; 4];
    reader.read_exact(&mut vl_buf)?;
    let vl = u32::from_le_bytes(vl_buf) as usize;

    let mut value = vec![0u8; vl];
    reader.read_exact(&mut value)?;

    let mut hasher = Sha1::new();
    hasher.update(&value);
    let computed = hasher.finalize();
    if computed.as_slice() != hash {
        return Err(StorageError::Corrupted(format!(
            "hash mismatch: stored {}, computed {}",
            hex::encode(hash),
            hex::encode(computed)
        )));
    }

    Ok(value)
}

/// Discards `n` bytes from `reader` without allocating them all at once.
fn skip<R: Read>(reader: &mut R, n: u64) -> io::Result<()> {
    let copied = io::copy(&mut reader.take(n), &mut io::sink())?;
    if copied != n {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "short read while skipping key bytes",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_key_and_value() {
        let encoded = encode(b"hello", b"world").unwrap();
        let (key, value) = decode(&encoded).unwrap();
        assert_eq!(key, b"hello");
        assert_eq!(value, b"world");
    }

    #[test]
    fn round_trips_empty_value() {
        let encoded = encode(b"k", b"").unwrap();
        let (key, value) = decode(&encoded).unwrap();
        assert_eq!(key, b"k");
        assert!(value.is_empty());
    }

    #[test]
    fn read_value_matches_decode() {
        let encoded = encode(b"key1", b"value1").unwrap();
        let mut cursor = io::Cursor::new(encoded);
        let value = read_value(&mut cursor).unwrap();
        assert_eq!(value, b"value1");
    }

    #[test]
    fn read_value_detects_bit_flip() {
        let mut encoded = encode(b"key1", b"value1").unwrap();
        let len = encoded.len();
        encoded[len - 1] ^= 0x01;
        let mut cursor = io::Cursor::new(encoded);
        let err = read_value(&mut cursor).unwrap_err();
        assert!(matches!(err, StorageError::Corrupted(_)));
    }

    #[test]
    fn rejects_empty_key() {
        assert!(encode(b"", b"v").is_err());
    }

    #[test]
    fn decode_header_only_extracts_key_and_size() {
        let encoded = encode(b"my-key", b"some value bytes").unwrap();
        let (key, size) = decode_header_only(&encoded).unwrap();
        assert_eq!(key, b"my-key");
        assert_eq!(size as usize, encoded.len());
    }
}
