//! dupcat-core - the scan engine: catalog, enumeration, fingerprinting,
//! duplicate comparison, ranking, sub-clip matching, and the control
//! surface that ties them together.

pub mod builder;
pub mod catalog;
pub mod comparator;
pub mod config;
pub mod control;
pub mod decoder;
pub mod enumerator;
pub mod ranker;
pub mod record;
pub mod similarity;
pub mod subclip;

pub use builder::{FingerprintBuilder, ScanControl};
pub use catalog::CatalogStore;
pub use comparator::DuplicateComparator;
pub use config::{DecoderOptions, PositionSetting, PositionType, ScanSettings};
pub use control::{EventCallback, ProgressCallback, ScanEngine, ScanEvent, ScanProgress};
pub use decoder::{FfmpegDecoder, MediaDecoder};
pub use enumerator::FileEnumerator;
pub use ranker::GroupRanker;
pub use record::{DuplicateItem, DuplicateItemFlags, FileRecord, MediaInfo, RecordFlags, SubClipMatch};
pub use subclip::SubClipMatcher;
