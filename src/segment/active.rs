use super::{open_for_append, read_at};
use crate::error::{Result, StorageError};
use crate::record;
use crate::recovery::{self, DEFAULT_BUFFER_SIZE};
use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

/// The single append-only file receiving writes, plus its in-memory hash
/// index and current byte offset.
pub struct ActiveSegment {
    path: PathBuf,
    file: File,
    out_offset: u64,
    index: HashMap<Vec<u8>, u64>,
}

impl ActiveSegment {
    /// Opens (creating if absent) the active segment file at `path` and
    /// replays it to rebuild the hash index, using the default recovery
    /// buffer size.
    pub fn open(path: PathBuf) -> Result<Self> {
        Self::open_with_buffer_size(path, DEFAULT_BUFFER_SIZE)
    }

    /// Same as [`Self::open`] but with a caller-chosen recovery buffer size
    /// (see [`crate::config::Config::recovery_buffer_size`]).
    pub fn open_with_buffer_size(path: PathBuf, buffer_size: usize) -> Result<Self> {
        let file = open_for_append(&path)?;
        let recovered = recovery::recover(&path, buffer_size)?;
        Ok(Self {
            path,
            file,
            out_offset: recovered.final_offset,
            index: recovered.index,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.out_offset
    }

    pub fn is_empty(&self) -> bool {
        self.out_offset == 0
    }

    pub fn index_len(&self) -> usize {
        self.index.len()
    }

    /// Appends a record, updating the index only if the write is complete.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let record = record::encode(key, value)?;
        let n = self.file.write(&record)?;
        if n != record.len() {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "short write appending record",
            )));
        }
        // Flush-per-write: the encoded record is the unit of durability.
        self.file.sync_all()?;

        self.index.insert(key.to_vec(), self.out_offset);
        self.out_offset += n as u64;
        Ok(())
    }

    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        let offset = *self
            .index
            .get(key)
            .ok_or_else(|| StorageError::NotFound(String::from_utf8_lossy(key).into_owned()))?;
        read_at(&self.path, offset)
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.index.contains_key(key)
    }

    /// Replaces the backing file with a fresh, empty one and clears the
    /// index and offset. Called by the database right after the old file
    /// has been renamed into `segments/`.
    pub fn reset(&mut self) -> Result<()> {
        self.file = open_for_append(&self.path)?;
        self.out_offset = 0;
        self.index.clear();
        Ok(())
    }

    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn put_then_get_round_trips() {
        let dir = tempdir().unwrap();
        let mut seg = ActiveSegment::open(dir.path().join("current-data")).unwrap();
        seg.put(b"key1", b"value1").unwrap();
        seg.put(b"key2", b"value2").unwrap();
        assert_eq!(seg.get(b"key1").unwrap(), b"value1");
        assert_eq!(seg.get(b"key2").unwrap(), b"value2");
    }

    #[test]
    fn last_writer_wins() {
        let dir = tempdir().unwrap();
        let mut seg = ActiveSegment::open(dir.path().join("current-data")).unwrap();
        seg.put(b"key", b"v1").unwrap();
        seg.put(b"key", b"v2").unwrap();
        assert_eq!(seg.get(b"key").unwrap(), b"v2");
    }

    #[test]
    fn missing_key_is_not_found() {
        let dir = tempdir().unwrap();
        let seg = ActiveSegment::open(dir.path().join("current-data")).unwrap();
        assert!(matches!(seg.get(b"nope"), Err(StorageError::NotFound(_))));
    }

    #[test]
    fn reopen_recovers_prior_writes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("current-data");
        {
            let mut seg = ActiveSegment::open(path.clone()).unwrap();
            seg.put(b"key1", b"value1").unwrap();
        }
        let seg = ActiveSegment::open(path).unwrap();
        assert_eq!(seg.get(b"key1").unwrap(), b"value1");
    }

    #[test]
    fn reset_clears_index_and_offset() {
        let dir = tempdir().unwrap();
        let mut seg = ActiveSegment::open(dir.path().join("current-data")).unwrap();
        seg.put(b"key", b"value").unwrap();
        assert!(seg.len() > 0);
        seg.reset().unwrap();
        assert_eq!(seg.len(), 0);
        assert!(!seg.contains(b"key"));
    }
}
