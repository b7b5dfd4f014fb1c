use super::read_at;
use crate::error::{Result, StorageError};
use crate::recovery::{self, DEFAULT_BUFFER_SIZE};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// A formerly-active file, now read-only, living under `segments/`.
pub struct SealedSegment {
    path: PathBuf,
    index: HashMap<Vec<u8>, u64>,
}

impl SealedSegment {
    /// Opens an existing sealed file and replays it to rebuild its index,
    /// using the default recovery buffer size.
    pub fn open(path: PathBuf) -> Result<Self> {
        Self::open_with_buffer_size(path, DEFAULT_BUFFER_SIZE)
    }

    /// Same as [`Self::open`] but with a caller-chosen recovery buffer size
    /// (see [`crate::config::Config::recovery_buffer_size`]).
    pub fn open_with_buffer_size(path: PathBuf, buffer_size: usize) -> Result<Self> {
        let recovered = recovery::recover(&path, buffer_size)?;
        Ok(Self {
            path,
            index: recovered.index,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
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

    pub fn keys(&self) -> impl Iterator<Item = &Vec<u8>> {
        self.index.keys()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Parses the `N` in a `segment_<N>` filename.
    pub fn parse_segment_number(path: &Path) -> Option<u64> {
        path.file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_prefix("segment_"))
            .and_then(|n| n.parse::<u64>().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::encode;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn opens_and_reads_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("segment_1");
        let mut file = File::create(&path).unwrap();
        file.write_all(&encode(b"key1", b"value1").unwrap())
            .unwrap();
        drop(file);

        let seg = SealedSegment::open(path).unwrap();
        assert_eq!(seg.get(b"key1").unwrap(), b"value1");
        assert!(!seg.contains(b"missing"));
    }

    #[test]
    fn parses_segment_number_from_name() {
        let path = Path::new("/tmp/segments/segment_42");
        assert_eq!(SealedSegment::parse_segment_number(path), Some(42));
        assert_eq!(
            SealedSegment::parse_segment_number(Path::new("/tmp/segments/garbage")),
            None
        );
    }
}
