//! Crash-recovery log replay shared by the active segment (on open) and
//! every sealed segment (when it is first opened for reads).
//!
//! Walks a segment file from the start, reconstructing its hash index by
//! decoding just enough of each record to bind its key to the byte offset
//! of the record's `size` field. The stored SHA-1 is *not* verified during
//! this pass — that check happens lazily on [`crate::record::read_value`]
//! so index cost stays decoupled from value integrity.

use crate::error::{Result, StorageError};
use crate::record::decode_header_only;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::debug;

pub const DEFAULT_BUFFER_SIZE: usize = 8192;

/// In-memory `key -> offset` index plus the byte offset one past the last
/// record, i.e. where the next append should land.
pub struct RecoveredIndex {
    pub index: HashMap<Vec<u8>, u64>,
    pub final_offset: u64,
}

/// Replays `path` from the beginning, rebuilding its hash index.
///
/// `buffer_size` is the BufReader capacity and also the threshold below
/// which a record's scratch buffer is stack-allocated rather than heap
/// allocated; it is clamped to at least [`DEFAULT_BUFFER_SIZE`].
pub fn recover(path: &Path, buffer_size: usize) -> Result<RecoveredIndex> {
    let buffer_size = buffer_size.max(DEFAULT_BUFFER_SIZE);
    debug!(path = %path.display(), "recovery starting");
    let file = File::open(path)?;
    let mut reader = BufReader::with_capacity(buffer_size, file);

    let mut index = HashMap::new();
    let mut offset: u64 = 0;

    loop {
        let size_buf = match read_size_header(&mut reader)? {
            None => break,
            Some(buf) => buf,
        };
        let size = u32::from_le_bytes(size_buf) as usize;
        if size < 4 {
            return Err(StorageError::Corrupted(
                "record size field smaller than its own header".into(),
            ));
        }

        let (key, record_len) = if size < DEFAULT_BUFFER_SIZE {
            let mut stack = [0u8; DEFAULT_BUFFER_SIZE];
            stack[..4].copy_from_slice(&size_buf);
            read_exact_or_corrupted(&mut reader, &mut stack[4..size])?;
            decode_header_only(&stack[..size])?
        } else {
            let mut heap = vec![0u8; size];
            heap[..4].copy_from_slice(&size_buf);
            read_exact_or_corrupted(&mut reader, &mut heap[4..])?;
            decode_header_only(&heap)?
        };

        index.insert(key, offset);
        offset += record_len as u64;
    }

    debug!(
        path = %path.display(),
        records = index.len(),
        final_offset = offset,
        "recovery finished"
    );
    Ok(RecoveredIndex {
        index,
        final_offset: offset,
    })
}

/// Reads the 4-byte `size` field at the current cursor, distinguishing a
/// clean end-of-file (no bytes at all) from a truncated header (1-3 bytes).
///
/// A plain `fill_buf` peek is not enough here: `BufReader::fill_buf` only
/// refills its internal buffer when that buffer is empty, so a prior
/// `read_exact` that left 1-3 bytes buffered would make a peek see just
/// those leftover bytes even though more of the file remains unread. This
/// reads through the `Read` impl instead, which pulls further bytes from
/// the underlying file as needed once the buffer drains.
fn read_size_header<R: Read>(reader: &mut R) -> Result<Option<[u8; 4]>> {
    let mut buf = [0u8; 4];
    let mut filled = 0;
    while filled < 4 {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    if filled == 0 {
        Ok(None)
    } else if filled < 4 {
        Err(StorageError::Corrupted(
            "truncated record header at end of file".into(),
        ))
    } else {
        Ok(Some(buf))
    }
}

fn read_exact_or_corrupted<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(StorageError::Corrupted(
            "truncated record tail".into(),
        )),
        Err(e) => Err(e.into()),
    }
}
