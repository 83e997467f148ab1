//! Scan settings: the configuration recognized by the scan engine.
//!
//! Loaded from TOML the same way the rest of this codebase's configuration
//! loads: `serde` + `toml::from_str`, per-field `#[serde(default = "...")]`
//! so a minimal file is valid, and a `validate()` pass that rejects
//! out-of-range values up front.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where in a file to sample a fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionType {
    Percentage,
    OffsetFromStart,
    OffsetFromEnd,
}

/// One configured sampling position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionSetting {
    #[serde(rename = "type")]
    pub kind: PositionType,
    pub value: f64,
}

impl PositionSetting {
    pub fn percentage(value: f64) -> Self {
        Self {
            kind: PositionType::Percentage,
            value,
        }
    }

    pub fn offset_from_start(value: f64) -> Self {
        Self {
            kind: PositionType::OffsetFromStart,
            value,
        }
    }

    pub fn offset_from_end(value: f64) -> Self {
        Self {
            kind: PositionType::OffsetFromEnd,
            value,
        }
    }

    /// Derive the absolute position key (seconds) for a file of the given duration.
    ///
    /// Implementers MUST use exactly this formula so keys derived during
    /// fingerprint extraction match keys recomputed during comparison.
    pub fn key(&self, duration: f64) -> f64 {
        let p = match self.kind {
            PositionType::Percentage => self.value / 100.0,
            PositionType::OffsetFromStart => {
                if duration == 0.0 {
                    0.0
                } else {
                    self.value / duration
                }
            }
            PositionType::OffsetFromEnd => {
                if duration == 0.0 {
                    0.0
                } else {
                    (duration - self.value) / duration
                }
            }
        };
        let clamped = p.clamp(0.0, 1.0);
        duration * clamped
    }
}

/// Hardware-acceleration and extra passthrough knobs for the external decoder.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecoderOptions {
    #[serde(default)]
    pub hardware_acceleration_mode: Option<String>,
    #[serde(default)]
    pub custom_ff_arguments: Option<String>,
    #[serde(default)]
    pub use_native_binding: bool,
    #[serde(default)]
    pub extended_fftools_logging: bool,
}

/// Full configuration recognized by the scan engine; see the settings table
/// this struct implements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSettings {
    #[serde(default)]
    pub include_list: Vec<PathBuf>,
    #[serde(default)]
    pub blacklist: Vec<PathBuf>,
    #[serde(default = "default_true")]
    pub include_subdirectories: bool,
    #[serde(default)]
    pub include_images: bool,
    #[serde(default)]
    pub ignore_read_only_folders: bool,
    #[serde(default = "default_true")]
    pub ignore_reparse_points: bool,
    #[serde(default)]
    pub scan_against_entire_database: bool,
    #[serde(default)]
    pub include_non_existing_files: bool,

    #[serde(default)]
    pub filter_by_file_size: bool,
    #[serde(default)]
    pub min_file_size_mb: f64,
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: f64,

    #[serde(default)]
    pub filter_by_file_path_contains: bool,
    #[serde(default)]
    pub file_path_contains: Vec<String>,
    #[serde(default)]
    pub filter_by_file_path_not_contains: bool,
    #[serde(default)]
    pub file_path_not_contains: Vec<String>,

    #[serde(default = "default_positions")]
    pub positions: Vec<PositionSetting>,
    #[serde(default = "default_percent")]
    pub percent: f64,
    #[serde(default = "default_percent_duration_difference")]
    pub percent_duration_difference: f64,

    #[serde(default)]
    pub ignore_black_pixels: bool,
    #[serde(default)]
    pub ignore_white_pixels: bool,
    #[serde(default = "default_black_threshold")]
    pub black_threshold: u8,
    #[serde(default = "default_white_threshold")]
    pub white_threshold: u8,

    #[serde(default)]
    pub compare_horizontally_flipped: bool,
    #[serde(default)]
    pub exclude_hardlinks: bool,

    #[serde(default)]
    pub enable_time_limited_scan: bool,
    #[serde(default)]
    pub time_limit_seconds: i64,

    #[serde(default)]
    pub always_retry_failed_sampling: bool,

    #[serde(default = "default_parallelism")]
    pub max_degree_of_parallelism: usize,

    #[serde(default)]
    pub decoder: DecoderOptions,

    #[serde(default = "default_database_folder")]
    pub custom_database_folder: PathBuf,
}

fn default_true() -> bool {
    true
}

fn default_max_file_size_mb() -> f64 {
    f64::MAX
}

fn default_positions() -> Vec<PositionSetting> {
    vec![
        PositionSetting::percentage(33.0),
        PositionSetting::percentage(50.0),
        PositionSetting::percentage(66.0),
    ]
}

fn default_percent() -> f64 {
    95.0
}

fn default_percent_duration_difference() -> f64 {
    10.0
}

fn default_black_threshold() -> u8 {
    16
}

fn default_white_threshold() -> u8 {
    240
}

fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_database_folder() -> PathBuf {
    PathBuf::from("./dupcat-data")
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            include_list: Vec::new(),
            blacklist: Vec::new(),
            include_subdirectories: default_true(),
            include_images: false,
            ignore_read_only_folders: false,
            ignore_reparse_points: default_true(),
            scan_against_entire_database: false,
            include_non_existing_files: false,
            filter_by_file_size: false,
            min_file_size_mb: 0.0,
            max_file_size_mb: default_max_file_size_mb(),
            filter_by_file_path_contains: false,
            file_path_contains: Vec::new(),
            filter_by_file_path_not_contains: false,
            file_path_not_contains: Vec::new(),
            positions: default_positions(),
            percent: default_percent(),
            percent_duration_difference: default_percent_duration_difference(),
            ignore_black_pixels: false,
            ignore_white_pixels: false,
            black_threshold: default_black_threshold(),
            white_threshold: default_white_threshold(),
            compare_horizontally_flipped: false,
            exclude_hardlinks: false,
            enable_time_limited_scan: false,
            time_limit_seconds: 0,
            always_retry_failed_sampling: false,
            max_degree_of_parallelism: default_parallelism(),
            decoder: DecoderOptions::default(),
            custom_database_folder: default_database_folder(),
        }
    }
}

impl ScanSettings {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {}", path.display(), e))?;
        let settings: ScanSettings = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("failed to parse TOML config: {}", e))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Similarity distance limit `L = 1 - percent/100`.
    pub fn distance_limit(&self) -> f64 {
        1.0 - self.percent / 100.0
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.custom_database_folder.join("catalog.bin")
    }

    /// Reject out-of-range configuration values up front.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(self.percent > 0.0 && self.percent <= 100.0) {
            anyhow::bail!("percent must be in (0, 100], got {}", self.percent);
        }
        if self.percent_duration_difference < 0.0 {
            anyhow::bail!(
                "percent_duration_difference must be >= 0, got {}",
                self.percent_duration_difference
            );
        }
        if self.max_degree_of_parallelism == 0 {
            anyhow::bail!("max_degree_of_parallelism must be > 0");
        }
        if self.min_file_size_mb < 0.0 || self.max_file_size_mb < self.min_file_size_mb {
            anyhow::bail!("invalid file size filter range");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_key_is_independent_of_duration_scale() {
        let p = PositionSetting::percentage(50.0);
        assert_eq!(p.key(100.0), 50.0);
        assert_eq!(p.key(10.0), 5.0);
    }

    #[test]
    fn offset_from_start_clamps_to_duration() {
        let p = PositionSetting::offset_from_start(20.0);
        assert_eq!(p.key(10.0), 10.0); // 20/10=2.0 clamped to 1.0 * 10
        assert_eq!(p.key(0.0), 0.0);
    }

    #[test]
    fn offset_from_end_matches_formula() {
        let p = PositionSetting::offset_from_end(5.0);
        assert!((p.key(20.0) - 15.0).abs() < 1e-9);
        assert_eq!(p.key(0.0), 0.0);
    }

    #[test]
    fn default_settings_validate() {
        ScanSettings::default().validate().unwrap();
    }

    #[test]
    fn rejects_out_of_range_percent() {
        let mut settings = ScanSettings::default();
        settings.percent = 0.0;
        assert!(settings.validate().is_err());
        settings.percent = 150.0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn parses_minimal_toml() {
        let toml_str = r#"
            include_list = ["/videos"]
            percent = 90.0
        "#;
        let settings: ScanSettings = toml::from_str(toml_str).unwrap();
        assert_eq!(settings.include_list, vec![PathBuf::from("/videos")]);
        assert_eq!(settings.percent, 90.0);
        assert!(settings.include_subdirectories);
    }
}
