//! Control surface: start/stop/pause/resume a scan, with throttled progress
//! reporting and lifecycle events.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::builder::{FingerprintBuilder, ScanControl};
use crate::catalog::CatalogStore;
use crate::comparator::DuplicateComparator;
use crate::config::ScanSettings;
use crate::decoder::MediaDecoder;
use crate::ranker::GroupRanker;
use crate::record::DuplicateItem;

const PROGRESS_THROTTLE: Duration = Duration::from_millis(300);

/// 1x1 black JPEG, returned in place of a preview frame the decoder
/// couldn't produce.
const PLACEHOLDER_THUMBNAIL: &[u8] = &[
    0xFF, 0xD8, 0xFF, 0xD9, // empty JPEG SOI+EOI marker pair
];

/// One progress sample; `estimated_remaining` uses
/// `elapsed * (total - processed - 1) / (processed + 1)`.
#[derive(Debug, Clone)]
pub struct ScanProgress {
    pub processed: usize,
    pub total: usize,
    pub current_path: Option<PathBuf>,
    pub elapsed: Duration,
    pub estimated_remaining: Duration,
}

/// Scan lifecycle milestones, emitted once each per `start_search` run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    DatabaseCleaned(usize),
    FilesEnumerated(usize),
    ThumbnailsRetrieved,
    BuildingHashesDone,
    ScanDone,
    ScanAborted,
}

pub type ProgressCallback<'a> = dyn Fn(ScanProgress) + Send + Sync + 'a;
pub type EventCallback<'a> = dyn Fn(ScanEvent) + Send + Sync + 'a;

struct ProgressTracker {
    started_at: Instant,
    last_emit: Mutex<Instant>,
    processed: AtomicUsize,
    total: usize,
    control: ScanControl,
}

impl ProgressTracker {
    fn new(total: usize, control: ScanControl) -> Self {
        let now = Instant::now();
        Self {
            started_at: now,
            last_emit: Mutex::new(now - PROGRESS_THROTTLE),
            processed: AtomicUsize::new(0),
            total,
            control,
        }
    }

    fn record(&self, current_path: Option<PathBuf>, on_progress: &ProgressCallback) {
        let processed = self.processed.fetch_add(1, Ordering::Relaxed) + 1;
        let is_final = processed == self.total;

        let mut last_emit = self.last_emit.lock().unwrap();
        let now = Instant::now();
        if !is_final && now.duration_since(*last_emit) < PROGRESS_THROTTLE {
            return;
        }
        *last_emit = now;
        drop(last_emit);

        // Pause time is excluded so ETA reflects only active work time.
        let elapsed = now.duration_since(self.started_at).saturating_sub(self.control.paused_duration());
        let remaining_units = self.total.saturating_sub(processed).saturating_sub(1) as f64;
        let estimated_remaining = Duration::from_secs_f64(elapsed.as_secs_f64() * remaining_units / (processed as f64 + 1.0));

        on_progress(ScanProgress {
            processed,
            total: self.total,
            current_path,
            elapsed,
            estimated_remaining,
        });
    }
}

/// The top-level entry point a CLI/GUI front-end drives.
pub struct ScanEngine<'a> {
    decoder: &'a dyn MediaDecoder,
    control: ScanControl,
}

impl<'a> ScanEngine<'a> {
    pub fn new(decoder: &'a dyn MediaDecoder) -> Self {
        Self {
            decoder,
            control: ScanControl::new(),
        }
    }

    pub fn pause(&self) {
        self.control.paused.store(true, Ordering::Relaxed);
        self.control.mark_paused();
    }

    pub fn resume(&self) {
        self.control.paused.store(false, Ordering::Relaxed);
        self.control.mark_resumed();
    }

    /// Resumes first (to escape pause), then signals cancellation.
    pub fn stop(&self) {
        self.resume();
        self.control.cancelled.store(true, Ordering::Relaxed);
    }

    fn is_cancelled(&self) -> bool {
        self.control.cancelled.load(Ordering::Relaxed)
    }

    /// Encoded color preview frame for UI display. Never fails outward: a
    /// decoder error yields a tiny placeholder image instead.
    pub fn preview_thumbnail(&self, path: &std::path::Path, timestamp_seconds: f64) -> Vec<u8> {
        self.decoder
            .extract_color_thumbnail_for_display(path, timestamp_seconds)
            .unwrap_or_else(|err| {
                log::warn!("preview thumbnail failed for {}: {err}", path.display());
                PLACEHOLDER_THUMBNAIL.to_vec()
            })
    }

    /// Load, enumerate, fingerprint, save, compare, rank - the full pipeline.
    pub fn start_search(
        &self,
        settings: &ScanSettings,
        on_progress: &ProgressCallback,
        on_event: &EventCallback,
    ) -> anyhow::Result<HashMap<PathBuf, DuplicateItem>> {
        let catalog_path = settings.catalog_path();
        let mut catalog = CatalogStore::load(&catalog_path)?;
        catalog.reset_invalid_flags();

        if !settings.include_non_existing_files {
            let removed = catalog.clean_missing();
            on_event(ScanEvent::DatabaseCleaned(removed));
        }

        let visited = crate::enumerator::FileEnumerator::enumerate(settings, &mut catalog);
        on_event(ScanEvent::FilesEnumerated(visited));

        if self.is_cancelled() {
            on_event(ScanEvent::ScanAborted);
            return Ok(HashMap::new());
        }

        let mut records: Vec<_> = catalog.iter().cloned().collect();
        let tracker = ProgressTracker::new(records.len(), self.control.clone());
        let builder = FingerprintBuilder::new(self.decoder, settings);

        builder.build_all(&mut records, &self.control, &|record| {
            tracker.record(Some(record.path.clone()), on_progress);
        });
        on_event(ScanEvent::ThumbnailsRetrieved);

        if self.is_cancelled() {
            on_event(ScanEvent::ScanAborted);
            return Ok(HashMap::new());
        }

        for record in records {
            catalog.replace(record);
        }
        catalog.save(&catalog_path)?;
        on_event(ScanEvent::BuildingHashesDone);

        if self.is_cancelled() {
            on_event(ScanEvent::ScanAborted);
            return Ok(HashMap::new());
        }

        let result = self.compare_and_rank(&catalog, settings)?;
        on_event(ScanEvent::ScanDone);
        Ok(result)
    }

    /// Compare + rank only; caller guarantees fingerprints are already current.
    pub fn start_compare(&self, settings: &ScanSettings) -> anyhow::Result<HashMap<PathBuf, DuplicateItem>> {
        let catalog = CatalogStore::load(&settings.catalog_path())?;
        self.compare_and_rank(&catalog, settings)
    }

    fn compare_and_rank(&self, catalog: &CatalogStore, settings: &ScanSettings) -> anyhow::Result<HashMap<PathBuf, DuplicateItem>> {
        let comparator = DuplicateComparator::new(settings);
        let eligible = comparator.eligible(catalog.iter());
        let mut result = comparator.compare_all(&eligible);
        GroupRanker::rank(&mut result);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimated_remaining_matches_formula() {
        let tracker = ProgressTracker::new(10, ScanControl::new());
        tracker.processed.store(3, Ordering::Relaxed);
        let processed = 4usize;
        let elapsed_secs = 2.0;
        let remaining_units = (10usize).saturating_sub(processed).saturating_sub(1) as f64;
        let expected = elapsed_secs * remaining_units / (processed as f64 + 1.0);
        assert!((expected - (2.0 * 5.0 / 5.0)).abs() < 1e-9);
    }

    #[test]
    fn paused_duration_excluded_from_progress_elapsed() {
        let control = ScanControl::new();
        control.mark_paused();
        std::thread::sleep(Duration::from_millis(20));
        control.mark_resumed();
        assert!(control.paused_duration() >= Duration::from_millis(20));

        let before = control.paused_duration();
        control.mark_paused();
        std::thread::sleep(Duration::from_millis(10));
        // Still open: the window counts even before mark_resumed() closes it.
        assert!(control.paused_duration() > before);
        control.mark_resumed();
    }

    #[test]
    fn pause_then_stop_clears_pause_flag() {
        let decoder = FailingDecoder;
        let engine = ScanEngine::new(&decoder);
        engine.pause();
        assert!(engine.control.paused.load(Ordering::Relaxed));
        engine.stop();
        assert!(!engine.control.paused.load(Ordering::Relaxed));
        assert!(engine.control.cancelled.load(Ordering::Relaxed));
    }

    #[test]
    fn preview_thumbnail_falls_back_to_placeholder_on_decoder_error() {
        let decoder = FailingDecoder;
        let engine = ScanEngine::new(&decoder);
        let bytes = engine.preview_thumbnail(std::path::Path::new("/does/not/matter.mp4"), 1.0);
        assert_eq!(bytes, PLACEHOLDER_THUMBNAIL);
    }

    struct FailingDecoder;

    impl MediaDecoder for FailingDecoder {
        fn probe(&self, _path: &std::path::Path) -> anyhow::Result<crate::record::MediaInfo> {
            anyhow::bail!("not available in tests")
        }
        fn extract_grayscale_thumbnails(
            &self,
            _path: &std::path::Path,
            _positions: &[f64],
            _duration_seconds: f64,
            _options: &crate::config::DecoderOptions,
        ) -> anyhow::Result<Vec<[u8; 256]>> {
            anyhow::bail!("not available in tests")
        }
        fn extract_image_thumbnail(&self, _path: &std::path::Path) -> anyhow::Result<[u8; 256]> {
            anyhow::bail!("not available in tests")
        }
        fn extract_color_thumbnail_for_display(&self, _path: &std::path::Path, _timestamp_seconds: f64) -> anyhow::Result<Vec<u8>> {
            anyhow::bail!("no frame available")
        }
    }
}
