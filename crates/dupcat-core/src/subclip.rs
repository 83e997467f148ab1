//! Finds a shorter file's fingerprint sequence as a contiguous window inside
//! a longer file's sequence.

use std::collections::HashSet;

use crate::config::ScanSettings;
use crate::record::{FileRecord, OrderedKey, SubClipMatch};
use crate::similarity::vector_distance;

pub struct SubClipMatcher<'a> {
    settings: &'a ScanSettings,
}

impl<'a> SubClipMatcher<'a> {
    pub fn new(settings: &'a ScanSettings) -> Self {
        Self { settings }
    }

    pub fn find_matches(&self, records: &[&FileRecord]) -> Vec<SubClipMatch> {
        let mut matches = Vec::new();
        let mut seen = HashSet::new();

        for main in records {
            for sub in records {
                if std::ptr::eq(*main, *sub) {
                    continue;
                }
                if main.is_image || sub.is_image {
                    continue;
                }
                let (Some(main_info), Some(sub_info)) = (main.media_info, sub.media_info) else {
                    continue;
                };
                if !(main_info.duration > sub_info.duration) {
                    continue;
                }
                if main.fingerprints.len() < self.settings.positions.len()
                    || sub.fingerprints.len() < self.settings.positions.len()
                {
                    continue;
                }

                self.match_pair(main, sub, &mut matches, &mut seen);
            }
        }

        matches
    }

    fn match_pair(
        &self,
        main: &FileRecord,
        sub: &FileRecord,
        matches: &mut Vec<SubClipMatch>,
        seen: &mut HashSet<(std::path::PathBuf, std::path::PathBuf, Vec<u64>)>,
    ) {
        let mut main_entries: Vec<(f64, &[u8; 256])> =
            main.fingerprints.iter().filter_map(|(k, v)| v.as_ref().map(|v| (k.0, v))).collect();
        main_entries.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        let mut sub_entries: Vec<(f64, &[u8; 256])> =
            sub.fingerprints.iter().filter_map(|(k, v)| v.as_ref().map(|v| (k.0, v))).collect();
        sub_entries.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        let m = main_entries.len();
        let s = sub_entries.len();
        if s < 1 || m < s {
            return;
        }

        let limit = self.settings.distance_limit();

        for i in 0..=(m - s) {
            let mut window_matches = true;
            for j in 0..s {
                let d = vector_distance(main_entries[i + j].1, sub_entries[j].1, self.settings);
                match d {
                    Some(d) if d <= limit => {}
                    _ => {
                        window_matches = false;
                        break;
                    }
                }
            }

            if window_matches {
                let match_start_times: Vec<f64> = main_entries[i..i + s].iter().map(|(k, _)| *k).collect();
                let dedupe_key = (
                    main.path.clone(),
                    sub.path.clone(),
                    match_start_times.iter().map(|k| OrderedKey(*k).0.to_bits()).collect(),
                );
                if seen.insert(dedupe_key) {
                    matches.push(SubClipMatch {
                        main: main.path.clone(),
                        sub: sub.path.clone(),
                        match_start_times,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::MediaInfo;
    use std::path::PathBuf;
    use std::time::SystemTime;

    fn video(path: &str, duration: f64, vectors: &[(f64, [u8; 256])]) -> FileRecord {
        let mut record = FileRecord::new(PathBuf::from(path), 10, SystemTime::now(), SystemTime::now());
        record.media_info = Some(MediaInfo {
            duration,
            fps: 24.0,
            bitrate_kbps: 1000,
            audio_sample_rate: 44100,
            width: 640,
            height: 480,
        });
        for (k, v) in vectors {
            record.fingerprints.insert(OrderedKey(*k), Some(*v));
        }
        record
    }

    #[test]
    fn finds_window_inside_longer_main() {
        let mut settings = ScanSettings::default();
        settings.positions = vec![crate::config::PositionSetting::percentage(0.0)];
        settings.percent = 95.0;

        let main = video(
            "/main.mp4",
            100.0,
            &[(0.0, [1u8; 256]), (10.0, [50u8; 256]), (20.0, [100u8; 256]), (30.0, [200u8; 256])],
        );
        let sub = video("/sub.mp4", 20.0, &[(0.0, [50u8; 256]), (10.0, [100u8; 256])]);

        let matcher = SubClipMatcher::new(&settings);
        let refs = [&main, &sub];
        let matches = matcher.find_matches(&refs);

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].match_start_times, vec![10.0, 20.0]);
    }

    #[test]
    fn no_match_when_sub_not_shorter() {
        let mut settings = ScanSettings::default();
        settings.positions = vec![crate::config::PositionSetting::percentage(0.0)];

        let main = video("/main.mp4", 20.0, &[(0.0, [1u8; 256])]);
        let sub = video("/sub.mp4", 20.0, &[(0.0, [1u8; 256])]);

        let matcher = SubClipMatcher::new(&settings);
        let refs = [&main, &sub];
        assert!(matcher.find_matches(&refs).is_empty());
    }
}
