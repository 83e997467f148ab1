//! Persistent file-identity catalog.
//!
//! The container itself (the map of paths to records) is only ever mutated
//! by the enumerator and by explicit catalog operations; the fingerprint
//! builder and comparator mutate only fields of records they have been
//! handed, never the key set, so no locking is needed at this level during
//! a scan phase.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use dupcat_format::{CatalogReader, StoredMediaInfo, StoredRecord};

use crate::record::{FileRecord, MediaInfo, OrderedKey, RecordFlags};

#[derive(Debug, Default)]
pub struct CatalogStore {
    records: HashMap<PathBuf, FileRecord>,
}

impl CatalogStore {
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
        }
    }

    /// Load a persisted snapshot into memory. A missing file is treated as an
    /// empty catalog (first run).
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!("no catalog snapshot at {}, starting empty", path.display());
            return Ok(Self::new());
        }

        let file = CatalogReader::read(path)
            .with_context(|| format!("failed to load catalog snapshot {}", path.display()))?;

        let mut records = HashMap::with_capacity(file.records.len());
        for stored in file.records {
            let record = stored_to_record(stored)?;
            records.insert(record.path.clone(), record);
        }

        log::info!("loaded catalog with {} records from {}", records.len(), path.display());
        Ok(Self { records })
    }

    /// Atomic write of the current snapshot (write-to-temp + rename, handled
    /// by `dupcat-format`).
    pub fn save(&self, path: &Path) -> Result<()> {
        let stored: Vec<StoredRecord> = self.records.values().map(record_to_stored).collect();
        dupcat_format::CatalogWriter::write(path, &stored)
            .with_context(|| format!("failed to save catalog snapshot {}", path.display()))?;
        log::info!("saved catalog with {} records to {}", stored.len(), path.display());
        Ok(())
    }

    /// Insert a freshly enumerated candidate, or reconcile it against an
    /// existing record at the same path: if `(size, date_created,
    /// date_modified)` differ, the old record (and its now-stale
    /// fingerprints) is discarded and replaced.
    pub fn insert_or_reconcile(&mut self, candidate: FileRecord) {
        match self.records.get(&candidate.path) {
            Some(existing)
                if existing.file_size == candidate.file_size
                    && existing.date_created == candidate.date_created
                    && existing.date_modified == candidate.date_modified =>
            {
                // Unchanged: keep the existing record (and its fingerprints).
            }
            _ => {
                self.records.insert(candidate.path.clone(), candidate);
            }
        }
    }

    /// Overwrite the record at `record.path` unconditionally, regardless of
    /// whether identity fields changed. Used to write back a record the
    /// Fingerprint Builder has just processed, where the whole point is to
    /// persist newly-computed `media_info`/`fingerprints`/`flags`/`invalid` -
    /// `insert_or_reconcile`'s "keep the existing record when unchanged"
    /// rule would otherwise discard exactly that output.
    pub fn replace(&mut self, record: FileRecord) {
        self.records.insert(record.path.clone(), record);
    }

    pub fn remove(&mut self, path: &Path) -> Option<FileRecord> {
        self.records.remove(path)
    }

    pub fn update_path(&mut self, old: &Path, new: PathBuf) -> bool {
        if let Some(mut record) = self.records.remove(old) {
            record.path = new.clone();
            self.records.insert(new, record);
            true
        } else {
            false
        }
    }

    pub fn blacklist(&mut self, path: &Path) -> bool {
        if let Some(record) = self.records.get_mut(path) {
            record.flags.insert(RecordFlags::MANUALLY_EXCLUDED);
            true
        } else {
            false
        }
    }

    pub fn get(&self, path: &Path) -> Option<&FileRecord> {
        self.records.get(path)
    }

    pub fn get_mut(&mut self, path: &Path) -> Option<&mut FileRecord> {
        self.records.get_mut(path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.records.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileRecord> {
        self.records.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut FileRecord> {
        self.records.values_mut()
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.records.keys().map(|p| p.as_path())
    }

    /// Reset the transient `invalid` flag on every record at the start of a scan.
    pub fn reset_invalid_flags(&mut self) {
        for record in self.records.values_mut() {
            record.invalid = false;
        }
    }

    /// Evict records whose file no longer exists on disk. Returns the count
    /// removed. Skipped entirely when `include_non_existing_files` is set.
    pub fn clean_missing(&mut self) -> usize {
        let missing: Vec<PathBuf> = self
            .records
            .keys()
            .filter(|path| !path.exists())
            .cloned()
            .collect();
        for path in &missing {
            self.records.remove(path);
        }
        missing.len()
    }
}

fn system_time_to_unix_ms(t: SystemTime) -> i64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_millis() as i64,
        Err(e) => -(e.duration().as_millis() as i64),
    }
}

fn unix_ms_to_system_time(ms: i64) -> SystemTime {
    if ms >= 0 {
        UNIX_EPOCH + std::time::Duration::from_millis(ms as u64)
    } else {
        UNIX_EPOCH - std::time::Duration::from_millis((-ms) as u64)
    }
}

fn record_to_stored(record: &FileRecord) -> StoredRecord {
    let mut fingerprints: Vec<(f64, Option<Vec<u8>>)> = record
        .fingerprints
        .iter()
        .map(|(key, vector)| (key.0, vector.map(|v| v.to_vec())))
        .collect();
    fingerprints.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    StoredRecord {
        path: record.path.to_string_lossy().to_string(),
        file_size: record.file_size,
        date_created_unix_ms: system_time_to_unix_ms(record.date_created),
        date_modified_unix_ms: system_time_to_unix_ms(record.date_modified),
        is_image: record.is_image,
        flags: record.flags.bits(),
        media_info: record.media_info.map(|mi| StoredMediaInfo {
            duration: mi.duration,
            fps: mi.fps,
            bitrate_kbps: mi.bitrate_kbps,
            audio_sample_rate: mi.audio_sample_rate,
            width: mi.width,
            height: mi.height,
        }),
        fingerprints,
    }
}

fn stored_to_record(stored: StoredRecord) -> Result<FileRecord> {
    let mut fingerprints = HashMap::with_capacity(stored.fingerprints.len());
    for (key, vector) in stored.fingerprints {
        let vector = match vector {
            Some(bytes) => {
                let arr: [u8; 256] = bytes
                    .try_into()
                    .map_err(|_| anyhow::anyhow!("fingerprint vector with wrong length in snapshot"))?;
                Some(arr)
            }
            None => None,
        };
        fingerprints.insert(OrderedKey(key), vector);
    }

    Ok(FileRecord {
        path: PathBuf::from(stored.path),
        file_size: stored.file_size,
        date_created: unix_ms_to_system_time(stored.date_created_unix_ms),
        date_modified: unix_ms_to_system_time(stored.date_modified_unix_ms),
        is_image: stored.is_image,
        media_info: stored.media_info.map(|mi| MediaInfo {
            duration: mi.duration,
            fps: mi.fps,
            bitrate_kbps: mi.bitrate_kbps,
            audio_sample_rate: mi.audio_sample_rate,
            width: mi.width,
            height: mi.height,
        }),
        fingerprints,
        flags: RecordFlags::from_bits(stored.flags),
        invalid: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("dupcat-catalog-test-{}-{}", std::process::id(), name))
    }

    #[test]
    fn round_trips_through_save_and_load() {
        let snapshot = tmp_path("roundtrip.bin");
        let mut store = CatalogStore::new();

        let mut record = FileRecord::new(
            PathBuf::from("/videos/one.mp4"),
            1000,
            SystemTime::now(),
            SystemTime::now(),
        );
        record.media_info = Some(MediaInfo {
            duration: 42.5,
            fps: 24.0,
            bitrate_kbps: 3000,
            audio_sample_rate: 44100,
            width: 1280,
            height: 720,
        });
        record.fingerprints.insert(OrderedKey(10.0), Some([9u8; 256]));
        record.fingerprints.insert(OrderedKey(20.0), None);
        store.insert_or_reconcile(record.clone());

        store.save(&snapshot).unwrap();
        let loaded = CatalogStore::load(&snapshot).unwrap();

        assert_eq!(loaded.len(), 1);
        let reloaded = loaded.get(Path::new("/videos/one.mp4")).unwrap();
        assert_eq!(reloaded.file_size, record.file_size);
        assert_eq!(reloaded.media_info, record.media_info);
        assert_eq!(reloaded.fingerprint_at(10.0), record.fingerprint_at(10.0));

        std::fs::remove_file(&snapshot).ok();
    }

    #[test]
    fn replace_overwrites_even_with_unchanged_identity_fields() {
        let mut store = CatalogStore::new();
        let now = SystemTime::now();
        let path = PathBuf::from("/videos/one.mp4");

        store.insert_or_reconcile(FileRecord::new(path.clone(), 100, now, now));
        assert!(store.get(&path).unwrap().media_info.is_none());

        let mut built = FileRecord::new(path.clone(), 100, now, now);
        built.media_info = Some(MediaInfo {
            duration: 12.0,
            fps: 30.0,
            bitrate_kbps: 500,
            audio_sample_rate: 44100,
            width: 640,
            height: 480,
        });
        built.fingerprints.insert(OrderedKey(6.0), Some([7u8; 256]));
        store.replace(built.clone());

        let stored = store.get(&path).unwrap();
        assert_eq!(stored.media_info, built.media_info);
        assert_eq!(stored.fingerprint_at(6.0), built.fingerprint_at(6.0));
    }

    #[test]
    fn reconcile_replaces_changed_records_and_keeps_unchanged() {
        let mut store = CatalogStore::new();
        let now = SystemTime::now();
        let path = PathBuf::from("/videos/one.mp4");

        let mut original = FileRecord::new(path.clone(), 100, now, now);
        original.fingerprints.insert(OrderedKey(1.0), Some([1u8; 256]));
        store.insert_or_reconcile(original.clone());

        // Same identity -> kept, including fingerprints.
        store.insert_or_reconcile(FileRecord::new(path.clone(), 100, now, now));
        assert!(store.get(&path).unwrap().fingerprint_at(1.0).is_some());

        // Changed size -> replaced, fingerprints discarded.
        store.insert_or_reconcile(FileRecord::new(path.clone(), 200, now, now));
        assert!(store.get(&path).unwrap().fingerprint_at(1.0).is_none());
        assert_eq!(store.get(&path).unwrap().file_size, 200);
    }

    #[test]
    fn clean_missing_evicts_only_nonexistent_paths() {
        let mut store = CatalogStore::new();
        let present = tmp_path("present.mp4");
        std::fs::write(&present, b"x").unwrap();
        store.insert_or_reconcile(FileRecord::new(present.clone(), 1, SystemTime::now(), SystemTime::now()));
        store.insert_or_reconcile(FileRecord::new(
            PathBuf::from("/nonexistent/gone.mp4"),
            1,
            SystemTime::now(),
            SystemTime::now(),
        ));

        let removed = store.clean_missing();

        assert_eq!(removed, 1);
        assert_eq!(store.len(), 1);
        assert!(store.contains(&present));
        std::fs::remove_file(&present).ok();
    }

    #[test]
    fn blacklist_sets_manually_excluded_flag() {
        let mut store = CatalogStore::new();
        let path = PathBuf::from("/videos/one.mp4");
        store.insert_or_reconcile(FileRecord::new(path.clone(), 1, SystemTime::now(), SystemTime::now()));
        assert!(store.blacklist(&path));
        assert!(store.get(&path).unwrap().flags.contains(RecordFlags::MANUALLY_EXCLUDED));
    }
}
