//! Pairwise duplicate detection and union-find-style grouping.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::SystemTime;

use rayon::prelude::*;

use crate::config::ScanSettings;
use crate::record::{DuplicateItem, FileRecord, RecordFlags};
use crate::similarity::{flip_horizontal, vector_distance};

pub struct DuplicateComparator<'a> {
    settings: &'a ScanSettings,
}

struct Groups {
    items: HashMap<PathBuf, DuplicateItem>,
    group_of: HashMap<PathBuf, u64>,
}

impl<'a> DuplicateComparator<'a> {
    pub fn new(settings: &'a ScanSettings) -> Self {
        Self { settings }
    }

    /// Filter the catalog down to the scan set per the eligibility rule:
    /// `!invalid && media_info != null && !ThumbnailError && (is_image ||
    /// fingerprints.len() >= positions.len())`.
    pub fn eligible<'r>(&self, records: impl IntoIterator<Item = &'r FileRecord>) -> Vec<&'r FileRecord> {
        records
            .into_iter()
            .filter(|r| {
                !r.invalid
                    && r.media_info.is_some()
                    && !r.flags.contains(RecordFlags::THUMBNAIL_ERROR)
                    && (r.is_image || r.fingerprints.len() >= self.settings.positions.len())
            })
            .collect()
    }

    /// Run the full pairwise comparison over `records`, returning the final
    /// duplicate-item map keyed by path.
    pub fn compare_all(&self, records: &[&FileRecord]) -> HashMap<PathBuf, DuplicateItem> {
        let groups = Mutex::new(Groups {
            items: HashMap::new(),
            group_of: HashMap::new(),
        });
        let next_group_id = AtomicU64::new(1);

        let cutoff = if self.settings.enable_time_limited_scan {
            let window = std::time::Duration::from_secs(self.settings.time_limit_seconds.max(0) as u64);
            Some(SystemTime::now().checked_sub(window).unwrap_or(SystemTime::UNIX_EPOCH))
        } else {
            None
        };

        let n = records.len();
        (0..n).into_par_iter().for_each(|i| {
            let a = records[i];
            if let Some(cutoff) = cutoff {
                if a.date_modified < cutoff {
                    return;
                }
            }
            for j in (i + 1)..n {
                let b = records[j];
                if let Some(cutoff) = cutoff {
                    if b.date_modified < cutoff {
                        continue;
                    }
                }
                self.consider_pair(a, b, &groups, &next_group_id);
            }
        });

        groups.into_inner().unwrap().items
    }

    fn consider_pair(&self, a: &FileRecord, b: &FileRecord, groups: &Mutex<Groups>, next_group_id: &AtomicU64) {
        if a.is_image != b.is_image {
            return;
        }

        if !a.is_image {
            let (Some(info_a), Some(info_b)) = (a.media_info, b.media_info) else {
                return;
            };
            if info_b.duration == 0.0 {
                return;
            }
            let ratio = info_a.duration / info_b.duration * 100.0;
            let p = self.settings.percent_duration_difference;
            if !(100.0 - p <= ratio && ratio <= 100.0 + p) {
                return;
            }
        }

        let limit = self.settings.distance_limit();

        let mut best: Option<(f64, bool)> = self
            .pair_distance(a, b, false, limit)
            .map(|d| (d, false));

        if self.settings.compare_horizontally_flipped {
            if let Some(fd) = self.pair_distance(a, b, true, limit) {
                best = match best {
                    None => Some((fd, true)),
                    Some((d, _)) if fd < d => Some((fd, true)),
                    other => other,
                };
            }
        }

        let Some((distance, flipped)) = best else { return };

        if self.settings.exclude_hardlinks
            && a.file_size == b.file_size
            && a.media_info.map(|m| m.duration) == b.media_info.map(|m| m.duration)
            && are_hardlinked(&a.path, &b.path)
        {
            return;
        }

        let mut groups = groups.lock().unwrap();
        self.merge(a, b, distance, flipped, &mut groups, next_group_id);
    }

    /// Compute the per-pair similarity distance, or `None` if the pair is
    /// not a match (missing fingerprints, or - for videos - any single
    /// position exceeding `limit`, which aborts the average early per the
    /// grouping rules).
    fn pair_distance(&self, a: &FileRecord, b: &FileRecord, flip: bool, limit: f64) -> Option<f64> {
        if a.is_image {
            let va = a.fingerprint_at(0.0)?;
            let vb = b.fingerprint_at(0.0)?;
            let va_eff = if flip { flip_horizontal(va) } else { *va };
            let d = vector_distance(&va_eff, vb, self.settings)?;
            return if d <= limit { Some(d) } else { None };
        }

        let info_a = a.media_info?;
        let info_b = b.media_info?;
        let mut sum = 0.0;
        let mut count = 0usize;

        for p in &self.settings.positions {
            let ka = p.key(info_a.duration);
            let kb = p.key(info_b.duration);
            let va = a.fingerprint_at(ka)?;
            let vb = b.fingerprint_at(kb)?;
            let va_eff = if flip { flip_horizontal(va) } else { *va };
            let d = vector_distance(&va_eff, vb, self.settings)?;
            if d > limit {
                return None;
            }
            sum += d;
            count += 1;
        }

        if count == 0 {
            return None;
        }
        let mean = sum / count as f64;
        if mean.is_nan() {
            None
        } else {
            Some(mean)
        }
    }

    fn merge(
        &self,
        a: &FileRecord,
        b: &FileRecord,
        distance: f64,
        flipped: bool,
        groups: &mut Groups,
        next_group_id: &AtomicU64,
    ) {
        let a_group = groups.group_of.get(&a.path).copied();
        let b_group = groups.group_of.get(&b.path).copied();

        match (a_group, b_group) {
            (Some(ga), Some(gb)) if ga != gb => {
                let members: Vec<PathBuf> = groups
                    .group_of
                    .iter()
                    .filter(|(_, &g)| g == gb)
                    .map(|(p, _)| p.clone())
                    .collect();
                for member in members {
                    groups.group_of.insert(member.clone(), ga);
                    if let Some(item) = groups.items.get_mut(&member) {
                        item.group_id = ga;
                    }
                }
            }
            (Some(_), Some(_)) => {
                // already in the same group; nothing to do.
            }
            (Some(ga), None) => {
                groups.group_of.insert(b.path.clone(), ga);
                groups
                    .items
                    .insert(b.path.clone(), DuplicateItem::from_record(b, ga, distance, flipped));
            }
            (None, Some(gb)) => {
                groups.group_of.insert(a.path.clone(), gb);
                groups
                    .items
                    .insert(a.path.clone(), DuplicateItem::from_record(a, gb, distance, flipped));
            }
            (None, None) => {
                let gid = next_group_id.fetch_add(1, Ordering::Relaxed);
                groups.group_of.insert(a.path.clone(), gid);
                groups.group_of.insert(b.path.clone(), gid);
                groups
                    .items
                    .insert(a.path.clone(), DuplicateItem::from_record(a, gid, distance, false));
                groups
                    .items
                    .insert(b.path.clone(), DuplicateItem::from_record(b, gid, distance, flipped));
            }
        }
    }
}

#[cfg(unix)]
fn are_hardlinked(a: &Path, b: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;
    let (Ok(ma), Ok(mb)) = (std::fs::metadata(a), std::fs::metadata(b)) else {
        return false;
    };
    ma.dev() == mb.dev() && ma.ino() == mb.ino()
}

#[cfg(not(unix))]
fn are_hardlinked(_a: &Path, _b: &Path) -> bool {
    false
}
