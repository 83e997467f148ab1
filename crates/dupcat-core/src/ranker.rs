//! Per-group "best representative" ranking across several metric axes.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::record::DuplicateItem;

pub struct GroupRanker;

impl GroupRanker {
    /// Mark every tied-for-best item on each axis, within each distinct
    /// `group_id`. `size` is ranked by minimum ("smallest wins"); every
    /// other axis by maximum.
    pub fn rank(items: &mut HashMap<PathBuf, DuplicateItem>) {
        let mut by_group: HashMap<u64, Vec<PathBuf>> = HashMap::new();
        for (path, item) in items.iter() {
            by_group.entry(item.group_id).or_default().push(path.clone());
        }

        for members in by_group.values() {
            let best_size = members.iter().map(|p| items[p].size).min();
            let best_duration = max_of(members, items, |i| i.duration);
            let best_fps = max_of(members, items, |i| i.fps);
            let best_bitrate = max_of(members, items, |i| i.bitrate_kbps);
            let best_sample_rate = max_of(members, items, |i| i.audio_sample_rate);
            let best_frame_size = max_of(members, items, |i| i.frame_size);

            for path in members {
                let item = items.get_mut(path).unwrap();
                item.is_best_size = best_size == Some(item.size);
                item.is_best_duration = matches_opt(item.duration, best_duration);
                item.is_best_fps = matches_opt(item.fps, best_fps);
                item.is_best_bitrate = matches_opt(item.bitrate_kbps, best_bitrate);
                item.is_best_sample_rate = matches_opt(item.audio_sample_rate, best_sample_rate);
                item.is_best_frame_size = matches_opt(item.frame_size, best_frame_size);
            }
        }
    }
}

fn max_of<T, F>(members: &[PathBuf], items: &HashMap<PathBuf, DuplicateItem>, f: F) -> Option<T>
where
    T: PartialOrd + Copy,
    F: Fn(&DuplicateItem) -> Option<T>,
{
    members
        .iter()
        .filter_map(|p| f(&items[p]))
        .fold(None, |acc, v| match acc {
            None => Some(v),
            Some(current) if v > current => Some(v),
            acc => acc,
        })
}

fn matches_opt<T: PartialEq>(value: Option<T>, best: Option<T>) -> bool {
    match (value, best) {
        (Some(v), Some(b)) => v == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::DuplicateItemFlags;
    use std::path::PathBuf;

    fn item(path: &str, group_id: u64, size: u64, duration: Option<f64>, frame_size: Option<u64>) -> DuplicateItem {
        DuplicateItem {
            path: PathBuf::from(path),
            group_id,
            similarity_distance: 0.0,
            flags: DuplicateItemFlags::NONE,
            size,
            duration,
            fps: None,
            bitrate_kbps: None,
            audio_sample_rate: None,
            frame_size,
            is_best_duration: false,
            is_best_size: false,
            is_best_fps: false,
            is_best_bitrate: false,
            is_best_sample_rate: false,
            is_best_frame_size: false,
        }
    }

    #[test]
    fn marks_smallest_size_and_longest_duration_as_best() {
        let mut items = HashMap::new();
        items.insert(PathBuf::from("/a.mp4"), item("/a.mp4", 1, 200, Some(10.0), Some(100)));
        items.insert(PathBuf::from("/b.mp4"), item("/b.mp4", 1, 100, Some(20.0), Some(100)));

        GroupRanker::rank(&mut items);

        assert!(!items[&PathBuf::from("/a.mp4")].is_best_size);
        assert!(items[&PathBuf::from("/b.mp4")].is_best_size);
        assert!(items[&PathBuf::from("/b.mp4")].is_best_duration);
        assert!(!items[&PathBuf::from("/a.mp4")].is_best_duration);
    }

    #[test]
    fn ties_are_all_marked_best() {
        let mut items = HashMap::new();
        items.insert(PathBuf::from("/a.mp4"), item("/a.mp4", 1, 100, None, Some(50)));
        items.insert(PathBuf::from("/b.mp4"), item("/b.mp4", 1, 100, None, Some(50)));

        GroupRanker::rank(&mut items);

        assert!(items[&PathBuf::from("/a.mp4")].is_best_size);
        assert!(items[&PathBuf::from("/b.mp4")].is_best_size);
        assert!(items[&PathBuf::from("/a.mp4")].is_best_frame_size);
        assert!(items[&PathBuf::from("/b.mp4")].is_best_frame_size);
    }

    #[test]
    fn groups_are_ranked_independently() {
        let mut items = HashMap::new();
        items.insert(PathBuf::from("/a.mp4"), item("/a.mp4", 1, 100, None, None));
        items.insert(PathBuf::from("/b.mp4"), item("/b.mp4", 2, 50, None, None));

        GroupRanker::rank(&mut items);

        assert!(items[&PathBuf::from("/a.mp4")].is_best_size);
        assert!(items[&PathBuf::from("/b.mp4")].is_best_size);
    }
}
