//! Per-file fingerprint extraction, run under bounded parallelism.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rayon::prelude::*;

use crate::config::ScanSettings;
use crate::decoder::MediaDecoder;
use crate::record::{FileRecord, OrderedKey, RecordFlags};

/// Mean-brightness cutoff below which a thumbnail is considered too dark to
/// be useful for comparison.
const TOO_DARK_MEAN_THRESHOLD: f64 = 8.0;

/// Cooperative cancellation/pause signals shared across builder workers.
///
/// `paused_total_nanos` accumulates wall-clock time spent paused, relative to
/// a reference instant fixed at construction (`std::time::Instant` isn't
/// atomic-storable, so elapsed-since-reference nanoseconds stand in for it).
/// It is updated exactly once per pause/resume cycle by whichever caller
/// toggles `paused` (see `ScanEngine::pause`/`resume`), not per-worker, so
/// progress ETA math can subtract it from wall-clock elapsed without
/// double-counting concurrent workers.
#[derive(Clone)]
pub struct ScanControl {
    pub paused: Arc<AtomicBool>,
    pub cancelled: Arc<AtomicBool>,
    reference: std::time::Instant,
    paused_at_nanos: Arc<AtomicU64>,
    paused_total_nanos: Arc<AtomicU64>,
}

impl Default for ScanControl {
    fn default() -> Self {
        Self {
            paused: Arc::new(AtomicBool::new(false)),
            cancelled: Arc::new(AtomicBool::new(false)),
            reference: std::time::Instant::now(),
            paused_at_nanos: Arc::new(AtomicU64::new(0)),
            paused_total_nanos: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl ScanControl {
    pub fn new() -> Self {
        Self::default()
    }

    fn now_nanos(&self) -> u64 {
        self.reference.elapsed().as_nanos() as u64
    }

    /// Mark the start of a pause window. Idempotent while already paused.
    pub fn mark_paused(&self) {
        self.paused_at_nanos.store(self.now_nanos(), Ordering::Relaxed);
    }

    /// Close the current pause window, folding its duration into the total.
    pub fn mark_resumed(&self) {
        let started = self.paused_at_nanos.swap(0, Ordering::Relaxed);
        if started != 0 {
            let elapsed = self.now_nanos().saturating_sub(started);
            self.paused_total_nanos.fetch_add(elapsed, Ordering::Relaxed);
        }
    }

    /// Total wall-clock time spent paused so far, including any pause
    /// currently in progress.
    pub fn paused_duration(&self) -> Duration {
        let mut total = self.paused_total_nanos.load(Ordering::Relaxed);
        let started = self.paused_at_nanos.load(Ordering::Relaxed);
        if started != 0 {
            total += self.now_nanos().saturating_sub(started);
        }
        Duration::from_nanos(total)
    }

    fn wait_while_paused(&self) {
        while self.paused.load(Ordering::Relaxed) && !self.cancelled.load(Ordering::Relaxed) {
            std::thread::sleep(Duration::from_millis(50));
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

pub struct FingerprintBuilder<'a> {
    decoder: &'a dyn MediaDecoder,
    settings: &'a ScanSettings,
}

impl<'a> FingerprintBuilder<'a> {
    pub fn new(decoder: &'a dyn MediaDecoder, settings: &'a ScanSettings) -> Self {
        Self { decoder, settings }
    }

    /// Run the builder over every record in `records`, mutating each in
    /// place. Workers run across a rayon pool bounded by
    /// `max_degree_of_parallelism`; each checks `control` at its unit
    /// boundary before starting. `on_processed` is invoked (from whichever
    /// worker thread finishes the record) after each unit completes, so
    /// callers can drive throttled progress reporting without giving up
    /// the parallel fan-out.
    pub fn build_all(&self, records: &mut [FileRecord], control: &ScanControl, on_processed: &(dyn Fn(&FileRecord) + Sync)) {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.settings.max_degree_of_parallelism)
            .build();

        let run = |records: &mut [FileRecord]| {
            records.par_iter_mut().for_each(|record| {
                if control.is_cancelled() {
                    return;
                }
                control.wait_while_paused();
                if control.is_cancelled() {
                    return;
                }
                self.build_one(record);
                on_processed(record);
            });
        };

        match pool {
            Ok(pool) => pool.install(|| run(records)),
            Err(_) => run(records),
        }
    }

    /// Step 1-6 of the per-record algorithm.
    pub(crate) fn build_one(&self, record: &mut FileRecord) {
        if !self.revalidate_inclusion(record) {
            record.invalid = true;
            return;
        }

        if self.has_complete_fingerprint_set(record) && !self.settings.always_retry_failed_sampling {
            return;
        }

        if record.media_info.is_none() && !record.is_image {
            match self.decoder.probe(&record.path) {
                Ok(info) => record.media_info = Some(info),
                Err(e) => {
                    log::warn!("metadata probe failed for {}: {}", record.path.display(), e);
                    record.flags.insert(RecordFlags::METADATA_ERROR);
                    record.invalid = true;
                    return;
                }
            }
        }

        if self.settings.positions.is_empty() && !record.fingerprints.is_empty() {
            record.fingerprints.clear();
        }
        if self.settings.always_retry_failed_sampling {
            record.fingerprints.clear();
        }

        if record.is_image {
            self.build_image_fingerprint(record);
        } else {
            self.build_video_fingerprints(record);
        }
    }

    fn revalidate_inclusion(&self, record: &FileRecord) -> bool {
        if record.flags.contains(RecordFlags::MANUALLY_EXCLUDED) {
            return false;
        }
        if !record.path.exists() {
            return false;
        }
        if self.settings.filter_by_file_size {
            let size_mb = record.file_size as f64 / (1024.0 * 1024.0);
            if size_mb < self.settings.min_file_size_mb || size_mb > self.settings.max_file_size_mb {
                return false;
            }
        }
        let path_str = record.path.to_string_lossy();
        if self.settings.filter_by_file_path_contains
            && !self.settings.file_path_contains.iter().any(|needle| path_str.contains(needle.as_str()))
        {
            return false;
        }
        if self.settings.filter_by_file_path_not_contains
            && self.settings.file_path_not_contains.iter().any(|needle| path_str.contains(needle.as_str()))
        {
            return false;
        }
        true
    }

    fn has_complete_fingerprint_set(&self, record: &FileRecord) -> bool {
        if record.is_image {
            return record.fingerprint_at(0.0).is_some();
        }
        match record.media_info {
            Some(info) => {
                self.settings
                    .positions
                    .iter()
                    .all(|p| record.fingerprint_at(p.key(info.duration)).is_some())
            }
            None => false,
        }
    }

    fn build_image_fingerprint(&self, record: &mut FileRecord) {
        match self.decoder.extract_image_thumbnail(&record.path) {
            Ok(vector) => {
                if mean_brightness(&vector) < TOO_DARK_MEAN_THRESHOLD {
                    record.flags.insert(RecordFlags::TOO_DARK);
                    record.invalid = true;
                }
                record.fingerprints.insert(OrderedKey(0.0), Some(vector));
            }
            Err(e) => {
                log::warn!("thumbnail extraction failed for {}: {}", record.path.display(), e);
                record.flags.insert(RecordFlags::THUMBNAIL_ERROR);
                record.invalid = true;
            }
        }
    }

    fn build_video_fingerprints(&self, record: &mut FileRecord) {
        let Some(info) = record.media_info else { return };
        if self.settings.positions.is_empty() || info.duration <= 0.0 {
            return;
        }

        let keys: Vec<f64> = self.settings.positions.iter().map(|p| p.key(info.duration)).collect();
        let fractions: Vec<f64> = keys.iter().map(|&k| if info.duration > 0.0 { k / info.duration } else { 0.0 }).collect();

        match self
            .decoder
            .extract_grayscale_thumbnails(&record.path, &fractions, info.duration, &self.settings.decoder)
        {
            Ok(vectors) if vectors.len() == keys.len() => {
                for (key, vector) in keys.into_iter().zip(vectors) {
                    record.fingerprints.insert(OrderedKey(key), Some(vector));
                }
            }
            Ok(_) => {
                log::warn!("decoder returned mismatched thumbnail count for {}", record.path.display());
                record.flags.insert(RecordFlags::THUMBNAIL_ERROR);
                record.invalid = true;
            }
            Err(e) => {
                log::warn!("thumbnail extraction failed for {}: {}", record.path.display(), e);
                record.flags.insert(RecordFlags::THUMBNAIL_ERROR);
                record.invalid = true;
            }
        }
    }
}

fn mean_brightness(vector: &[u8; 256]) -> f64 {
    vector.iter().map(|&b| b as u64).sum::<u64>() as f64 / 256.0
}
