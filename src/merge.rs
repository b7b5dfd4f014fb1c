//! Background segment compaction.
//!
//! The source's merge routine conflated "newest two segments" with a
//! "skip if destination already has the key" rule and mutated the live
//! database as its own merge destination — an approach flagged in the
//! specification as almost certainly buggy. This worker instead picks the
//! two *oldest* sealed segments, writes a fresh segment containing, for
//! every key present in either, the value from the newer of the two, and
//! atomically replaces both inputs with the new file. It reproduces the
//! only externally-visible contract the source guarantees (a key that was
//! only reachable through a merged-away segment stays reachable, and the
//! merged-away files disappear) without mutating a concurrently-readable
//! database in place.
//!
//! The merged file is numbered with the *newer* input's segment number, not
//! a freshly allocated one. `sealed[]` is kept sorted ascending by segment
//! number (`Database::open` re-derives that order from filenames on every
//! restart), and `get` scans it newest-first; handing the merged file the
//! next free number would make it sort as the newest segment even though it
//! holds the two oldest segments' data, so a restart would serve stale
//! values ahead of segments that were never touched by this merge.
//! Reusing the newer input's number keeps the merged file's position in
//! that ordering exactly where the newer input used to sit.

use crate::database::Inner;
use crate::error::{Result, StorageError};
use crate::record;
use crate::segment::SealedSegment;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info};

/// A running merge worker's control handle. Dropping it without calling
/// [`MergeHandle::stop`] leaves the worker running; [`crate::Database`]
/// always calls `stop` from its own `Drop`.
pub(crate) struct MergeHandle {
    stop_tx: crossbeam_channel::Sender<()>,
    join: Option<JoinHandle<()>>,
}

impl MergeHandle {
    pub(crate) fn stop(mut self) {
        let _ = self.stop_tx.send(());
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

pub(crate) fn spawn(inner: Arc<Mutex<Inner>>, interval: Duration) -> MergeHandle {
    let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
    let join = thread::spawn(move || run(inner, interval, stop_rx));
    MergeHandle {
        stop_tx,
        join: Some(join),
    }
}

fn run(inner: Arc<Mutex<Inner>>, interval: Duration, stop_rx: crossbeam_channel::Receiver<()>) {
    loop {
        match stop_rx.recv_timeout(interval) {
            Ok(()) => return,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => return,
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
        }

        if let Err(e) = run_one_cycle(&inner) {
            error!(error = %e, "merge cycle failed, will retry next interval");
        }
    }
}

/// Runs a single compaction cycle. Does nothing (rather than erroring) when
/// fewer than two sealed segments exist, unlike the source's `MergeRoutine`
/// which returned from the whole background task in that case.
fn run_one_cycle(inner: &Arc<Mutex<Inner>>) -> Result<()> {
    let (older_idx, older_path, newer_path, segments_dir, merged_num) = {
        let guard = inner.lock();
        if guard.sealed.len() < 2 {
            debug!(sealed = guard.sealed.len(), "not enough segments to merge yet");
            return Ok(());
        }
        let older = guard.sealed[0].path().to_path_buf();
        let newer = guard.sealed[1].path().to_path_buf();
        let segments_dir = guard.dir.join(crate::database::SEGMENTS_DIR);
        let merged_num = SealedSegment::parse_segment_number(&newer).ok_or_else(|| {
            StorageError::Corrupted(format!(
                "cannot parse segment number from {}",
                newer.display()
            ))
        })?;
        (0usize, older, newer, segments_dir, merged_num)
    };

    debug!(older = %older_path.display(), newer = %newer_path.display(), merged_num, "starting merge cycle");

    // The merged file reuses `newer`'s own filename/number, so capture both
    // inputs' sizes before `merge_two_segments` overwrites `newer` in place.
    let older_size = fs::metadata(&older_path)?.len();
    let newer_size = fs::metadata(&newer_path)?.len();

    let merged = merge_two_segments(&older_path, &newer_path, &segments_dir, merged_num)?;
    let merged_size = fs::metadata(&merged)?.len();
    let bytes_reclaimed = (older_size + newer_size).saturating_sub(merged_size);

    {
        let mut guard = inner.lock();
        // Another writer may have rotated while we merged; the two oldest
        // positions still correspond to `older`/`newer` because rotation
        // only appends, it never reorders or removes existing entries.
        guard.sealed.remove(older_idx + 1); // newer (index 1)
        guard.sealed.remove(older_idx); // older (index 0)
        let merged_segment = SealedSegment::open(merged.clone())?;
        guard.sealed.insert(older_idx, merged_segment);
        // `merged_num` reuses `newer`'s already-consumed number, so
        // `next_seg_num` — which tracks the next *unused* number — is left
        // untouched.
    }

    // `merged` was renamed into place at `newer_path` (same number), so only
    // the older input still needs removing from disk.
    fs::remove_file(&older_path)?;

    info!(
        merged = %merged.display(),
        bytes_reclaimed,
        "merge cycle complete"
    );

    crate::metrics::metrics().compactions_total.inc();
    crate::metrics::metrics()
        .compaction_bytes_reclaimed
        .add(bytes_reclaimed);

    Ok(())
}

/// Writes a new segment file containing, for every key present in either
/// `older` or `newer`, the value from `newer` if it has the key, else from
/// `older`. Returns the path of the new file, written under a temporary
/// name and renamed into place so a crash mid-merge never leaves a partial
/// segment visible under its final name. `merged_num` is normally `newer`'s
/// own segment number, so `final_path` usually equals `newer` itself and the
/// rename atomically replaces it with the merged content; the distinct
/// `.merging` suffix on the temporary file avoids any collision before that
/// rename happens.
fn merge_two_segments(
    older: &std::path::Path,
    newer: &std::path::Path,
    segments_dir: &std::path::Path,
    merged_num: u64,
) -> Result<PathBuf> {
    let older_seg = SealedSegment::open(older.to_path_buf())?;
    let newer_seg = SealedSegment::open(newer.to_path_buf())?;

    let mut values: HashMap<Vec<u8>, Vec<u8>> = HashMap::new();
    for key in older_seg.keys() {
        values.insert(key.clone(), older_seg.get(key)?);
    }
    for key in newer_seg.keys() {
        values.insert(key.clone(), newer_seg.get(key)?);
    }

    let final_path = segments_dir.join(format!("segment_{merged_num}"));
    let tmp_path = segments_dir.join(format!("segment_{merged_num}.merging"));

    {
        let mut file = File::create(&tmp_path)?;
        for (key, value) in &values {
            let record = record::encode(key, value)?;
            file.write_all(&record)?;
        }
        file.sync_all()?;
    }
    fs::rename(&tmp_path, &final_path)?;

    Ok(final_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::encode;
    use std::fs::File as StdFile;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn merge_two_segments_prefers_newer_value_and_lands_in_segments_dir() {
        let dir = tempdir().unwrap();
        let segments_dir = dir.path().join("segments");
        fs::create_dir_all(&segments_dir).unwrap();

        let older_path = segments_dir.join("segment_1");
        let mut older_file = StdFile::create(&older_path).unwrap();
        older_file.write_all(&encode(b"k1", b"old").unwrap()).unwrap();
        older_file.write_all(&encode(b"k2", b"only-in-older").unwrap()).unwrap();
        drop(older_file);

        let newer_path = segments_dir.join("segment_2");
        let mut newer_file = StdFile::create(&newer_path).unwrap();
        newer_file.write_all(&encode(b"k1", b"new").unwrap()).unwrap();
        drop(newer_file);

        let merged = merge_two_segments(&older_path, &newer_path, &segments_dir, 3).unwrap();
        assert_eq!(merged, segments_dir.join("segment_3"));
        assert!(merged.starts_with(&segments_dir));

        let merged_seg = SealedSegment::open(merged).unwrap();
        assert_eq!(merged_seg.get(b"k1").unwrap(), b"new");
        assert_eq!(merged_seg.get(b"k2").unwrap(), b"only-in-older");
    }

    #[test]
    fn merge_two_segments_reusing_newer_number_overwrites_in_place() {
        // Mirrors how `run_one_cycle` calls this: merged_num equals
        // `newer`'s own number, so the merged file lands at `newer`'s path.
        let dir = tempdir().unwrap();
        let segments_dir = dir.path().join("segments");
        fs::create_dir_all(&segments_dir).unwrap();

        let older_path = segments_dir.join("segment_2");
        let mut older_file = StdFile::create(&older_path).unwrap();
        older_file.write_all(&encode(b"k", b"old").unwrap()).unwrap();
        drop(older_file);

        let newer_path = segments_dir.join("segment_3");
        let mut newer_file = StdFile::create(&newer_path).unwrap();
        newer_file.write_all(&encode(b"other", b"untouched").unwrap()).unwrap();
        drop(newer_file);

        let merged = merge_two_segments(&older_path, &newer_path, &segments_dir, 3).unwrap();
        assert_eq!(merged, newer_path);

        let merged_seg = SealedSegment::open(merged).unwrap();
        assert_eq!(merged_seg.get(b"k").unwrap(), b"old");
        assert_eq!(merged_seg.get(b"other").unwrap(), b"untouched");
    }

    /// Reproduces the scenario a reviewer flagged: sealed `segment_2[k=old]`,
    /// `segment_3[...]`, `segment_4[k=new]`. Merging the two oldest must not
    /// make the merged file sort as newest after a restart, or last-writer-
    /// wins breaks across a close/reopen cycle.
    #[test]
    fn merge_keeps_relative_ordering_so_newest_value_survives_restart() {
        use crate::config::Config;
        use crate::database::Database;

        let dir = tempdir().unwrap();
        let mut config = Config::new(dir.path().to_path_buf()).without_merge_worker();
        config.rotation_threshold = 1; // rotate after every put

        let db = Database::open(config).unwrap();
        db.put(b"k", b"old").unwrap(); // -> segment_2
        db.put(b"other", b"mid").unwrap(); // -> segment_3
        db.put(b"k", b"new").unwrap(); // -> segment_4

        // Run a single merge cycle directly against the two oldest segments,
        // without waiting on the background timer.
        run_one_cycle(&db.shared_inner()).unwrap();
        assert_eq!(db.get(b"k").unwrap(), b"new");
        db.close().unwrap();

        let db = Database::open(Config::new(dir.path().to_path_buf()).without_merge_worker()).unwrap();
        assert_eq!(db.get(b"k").unwrap(), b"new");
    }
}
