//! Catalog data model: `FileRecord` and its satellites.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// Per-stream / per-file media metadata.
///
/// Videos populate every field; images populate only `width`/`height` and
/// leave the rest at their zero defaults (and are never routed through the
/// video-only comparison paths, since `is_image` gates that).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub duration: f64,
    pub fps: f64,
    pub bitrate_kbps: u32,
    pub audio_sample_rate: u32,
    pub width: u32,
    pub height: u32,
}

impl MediaInfo {
    pub fn frame_size(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Macro stand-in for the `bitflags` crate: this codebase doesn't depend on
/// it, and a four-bit set doesn't warrant adding it.
macro_rules! bitflags_like {
    (
        $(#[$meta:meta])*
        pub struct $name:ident: $ty:ty {
            $(const $flag:ident = $value:expr;)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
        pub struct $name(pub $ty);

        impl $name {
            $(pub const $flag: $name = $name($value);)*

            pub const NONE: $name = $name(0);

            pub fn contains(&self, other: $name) -> bool {
                (self.0 & other.0) == other.0
            }

            pub fn insert(&mut self, other: $name) {
                self.0 |= other.0;
            }

            pub fn remove(&mut self, other: $name) {
                self.0 &= !other.0;
            }

            pub fn bits(&self) -> $ty {
                self.0
            }

            pub fn from_bits(bits: $ty) -> Self {
                Self(bits)
            }
        }

        impl std::ops::BitOr for $name {
            type Output = $name;
            fn bitor(self, rhs: $name) -> $name {
                $name(self.0 | rhs.0)
            }
        }
    };
}

bitflags_like! {
    /// Per-record exclusion/error flags.
    pub struct RecordFlags: u8 {
        const MANUALLY_EXCLUDED = 0b0001;
        const TOO_DARK          = 0b0010;
        const METADATA_ERROR    = 0b0100;
        const THUMBNAIL_ERROR   = 0b1000;
    }
}

/// One catalog entry. Identity is the absolute `path`.
#[derive(Debug, Clone, PartialEq)]
pub struct FileRecord {
    pub path: PathBuf,
    pub file_size: u64,
    pub date_created: SystemTime,
    pub date_modified: SystemTime,
    pub is_image: bool,
    pub media_info: Option<MediaInfo>,
    /// position key (seconds) -> 256-byte grayscale vector, or `None` if
    /// that position was attempted but failed / not yet sampled.
    pub fingerprints: HashMap<OrderedKey, Option<[u8; 256]>>,
    pub flags: RecordFlags,
    /// Transient per-scan flag, reset at the start of each scan.
    pub invalid: bool,
}

/// `f64` position key wrapped so it can be used as a `HashMap` key
/// (position keys are always finite, derived via [`crate::config::PositionSetting::key`]).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderedKey(pub f64);

impl Eq for OrderedKey {}
impl std::hash::Hash for OrderedKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}
impl PartialOrd for OrderedKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        self.0.partial_cmp(&other.0)
    }
}
impl Ord for OrderedKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.partial_cmp(&other.0).unwrap_or(std::cmp::Ordering::Equal)
    }
}

impl FileRecord {
    pub fn new(path: PathBuf, file_size: u64, date_created: SystemTime, date_modified: SystemTime) -> Self {
        let is_image = is_image_extension(&path);
        Self {
            path,
            file_size,
            date_created,
            date_modified,
            is_image,
            media_info: None,
            fingerprints: HashMap::new(),
            flags: RecordFlags::NONE,
            invalid: false,
        }
    }

    pub fn folder(&self) -> Option<&Path> {
        self.path.parent()
    }

    /// Look up the fingerprint vector stored at (approximately) `key` seconds.
    ///
    /// Position keys are floats derived from the same formula at build and
    /// compare time, so exact `f64` equality is the correct lookup - see the
    /// "floating-point key collisions" design note.
    pub fn fingerprint_at(&self, key: f64) -> Option<&[u8; 256]> {
        self.fingerprints.get(&OrderedKey(key)).and_then(|v| v.as_ref())
    }

    pub fn has_error_flags(&self) -> bool {
        self.flags.contains(RecordFlags::METADATA_ERROR) || self.flags.contains(RecordFlags::THUMBNAIL_ERROR)
    }
}

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "avi", "mov", "webm", "m4v", "wmv", "flv", "mpg", "mpeg"];
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif", "webp", "tiff"];

pub fn is_image_extension(path: &Path) -> bool {
    extension_lower(path)
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

pub fn is_video_extension(path: &Path) -> bool {
    extension_lower(path)
        .map(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

fn extension_lower(path: &Path) -> Option<String> {
    path.extension().and_then(|e| e.to_str()).map(|s| s.to_lowercase())
}

/// A single flag recorded on a `DuplicateItem`. `FLIPPED` is the only one
/// defined today, kept as a set for symmetry with `RecordFlags`.
bitflags_like! {
    pub struct DuplicateItemFlags: u8 {
        const FLIPPED = 0b0001;
    }
}

/// One participant in a duplicate group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateItem {
    pub path: PathBuf,
    pub group_id: u64,
    /// Distance of the pair that first introduced this item to its group.
    /// Never recomputed when a later pair merges this item's group with
    /// another — merging only reassigns `group_id`.
    pub similarity_distance: f64,
    pub flags: DuplicateItemFlags,
    pub size: u64,
    pub duration: Option<f64>,
    pub fps: Option<f64>,
    pub bitrate_kbps: Option<u32>,
    pub audio_sample_rate: Option<u32>,
    pub frame_size: Option<u64>,
    pub is_best_duration: bool,
    pub is_best_size: bool,
    pub is_best_fps: bool,
    pub is_best_bitrate: bool,
    pub is_best_sample_rate: bool,
    pub is_best_frame_size: bool,
}

impl DuplicateItem {
    pub fn from_record(record: &FileRecord, group_id: u64, similarity_distance: f64, flipped: bool) -> Self {
        let mut flags = DuplicateItemFlags::NONE;
        if flipped {
            flags.insert(DuplicateItemFlags::FLIPPED);
        }
        Self {
            path: record.path.clone(),
            group_id,
            similarity_distance,
            flags,
            size: record.file_size,
            duration: record.media_info.map(|m| m.duration),
            fps: record.media_info.map(|m| m.fps),
            bitrate_kbps: record.media_info.map(|m| m.bitrate_kbps),
            audio_sample_rate: record.media_info.map(|m| m.audio_sample_rate),
            frame_size: record.media_info.map(|m| m.frame_size()),
            is_best_duration: false,
            is_best_size: false,
            is_best_fps: false,
            is_best_bitrate: false,
            is_best_sample_rate: false,
            is_best_frame_size: false,
        }
    }
}

/// A sub-clip alignment: `sub`'s full fingerprint sequence found as a
/// contiguous window inside `main`'s sequence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubClipMatch {
    pub main: PathBuf,
    pub sub: PathBuf,
    pub match_start_times: Vec<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_flags_round_trip() {
        let mut flags = RecordFlags::NONE;
        assert!(!flags.contains(RecordFlags::TOO_DARK));
        flags.insert(RecordFlags::TOO_DARK);
        flags.insert(RecordFlags::METADATA_ERROR);
        assert!(flags.contains(RecordFlags::TOO_DARK));
        assert!(flags.contains(RecordFlags::METADATA_ERROR));
        assert!(!flags.contains(RecordFlags::MANUALLY_EXCLUDED));
        flags.remove(RecordFlags::TOO_DARK);
        assert!(!flags.contains(RecordFlags::TOO_DARK));
    }

    #[test]
    fn extension_classification() {
        assert!(is_video_extension(Path::new("/a/b.MP4")));
        assert!(is_image_extension(Path::new("/a/b.png")));
        assert!(!is_video_extension(Path::new("/a/b.png")));
    }

    #[test]
    fn fingerprint_lookup_by_key() {
        let mut record = FileRecord::new(PathBuf::from("/a/b.mp4"), 10, SystemTime::now(), SystemTime::now());
        record.fingerprints.insert(OrderedKey(12.5), Some([1u8; 256]));
        assert!(record.fingerprint_at(12.5).is_some());
        assert!(record.fingerprint_at(99.0).is_none());
    }
}
