//! Walks the configured include roots and reconciles what it finds into the
//! catalog. File-access failures are logged and skipped; they are never
//! fatal to the walk.

use std::path::Path;

use walkdir::{DirEntry, WalkDir};

use crate::catalog::CatalogStore;
use crate::config::ScanSettings;
use crate::record::{is_image_extension, is_video_extension, FileRecord};

pub struct FileEnumerator;

impl FileEnumerator {
    /// Walk every root in `settings.include_list`, reconciling candidates
    /// into `catalog`. Returns the number of files visited (not necessarily
    /// the number inserted - unchanged files are reconciled as no-ops).
    pub fn enumerate(settings: &ScanSettings, catalog: &mut CatalogStore) -> usize {
        let mut visited = 0usize;

        for root in &settings.include_list {
            let max_depth = if settings.include_subdirectories {
                usize::MAX
            } else {
                1
            };

            let walker = WalkDir::new(root)
                .follow_links(false)
                .max_depth(max_depth)
                .into_iter()
                .filter_entry(|entry| Self::should_descend_or_keep(entry, settings, root));

            for entry in walker {
                let entry = match entry {
                    Ok(e) => e,
                    Err(e) => {
                        log::warn!("enumerator: failed to read directory entry: {}", e);
                        continue;
                    }
                };

                if !entry.file_type().is_file() {
                    continue;
                }

                if !Self::has_relevant_extension(entry.path(), settings) {
                    continue;
                }

                match Self::build_candidate(entry.path()) {
                    Ok(candidate) => {
                        visited += 1;
                        catalog.insert_or_reconcile(candidate);
                    }
                    Err(e) => {
                        log::warn!("enumerator: skipping {}: {}", entry.path().display(), e);
                    }
                }
            }
        }

        visited
    }

    fn should_descend_or_keep(entry: &DirEntry, settings: &ScanSettings, root: &Path) -> bool {
        // WalkDir yields the root itself first; always keep it.
        if entry.path() == root {
            return true;
        }

        if settings.ignore_reparse_points && entry.path_is_symlink() {
            return false;
        }

        if is_blacklisted(entry.path(), &settings.blacklist) {
            return false;
        }

        if entry.file_type().is_dir() && settings.ignore_read_only_folders {
            if let Ok(metadata) = entry.metadata() {
                if metadata.permissions().readonly() {
                    return false;
                }
            }
        }

        true
    }

    fn has_relevant_extension(path: &Path, settings: &ScanSettings) -> bool {
        if is_video_extension(path) {
            return true;
        }
        if settings.include_images && is_image_extension(path) {
            return true;
        }
        false
    }

    fn build_candidate(path: &Path) -> anyhow::Result<FileRecord> {
        let metadata = std::fs::metadata(path)?;
        let created = metadata.created().unwrap_or(std::time::SystemTime::UNIX_EPOCH);
        let modified = metadata.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH);
        Ok(FileRecord::new(path.to_path_buf(), metadata.len(), created, modified))
    }
}

/// Folder-prefix match with proper component boundaries: `Path::starts_with`
/// already treats `/foo` and `/foobar` as unrelated, which is exactly the
/// boundary rule required here.
fn is_blacklisted(path: &Path, blacklist: &[std::path::PathBuf]) -> bool {
    blacklist.iter().any(|prefix| path == prefix || path.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn tmp_dir(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("dupcat-enum-test-{}-{}", std::process::id(), name));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn finds_video_files_recursively() {
        let root = tmp_dir("basic");
        fs::create_dir_all(root.join("sub")).unwrap();
        fs::write(root.join("a.mp4"), b"x").unwrap();
        fs::write(root.join("sub").join("b.mkv"), b"y").unwrap();
        fs::write(root.join("notes.txt"), b"z").unwrap();

        let mut settings = ScanSettings::default();
        settings.include_list = vec![root.clone()];

        let mut catalog = CatalogStore::new();
        let visited = FileEnumerator::enumerate(&settings, &mut catalog);

        assert_eq!(visited, 2);
        assert!(catalog.contains(&root.join("a.mp4")));
        assert!(catalog.contains(&root.join("sub").join("b.mkv")));
        assert!(!catalog.contains(&root.join("notes.txt")));

        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn respects_blacklist_prefix_boundary() {
        let root = tmp_dir("blacklist");
        fs::create_dir_all(root.join("foo")).unwrap();
        fs::create_dir_all(root.join("foobar")).unwrap();
        fs::write(root.join("foo").join("a.mp4"), b"x").unwrap();
        fs::write(root.join("foobar").join("b.mp4"), b"y").unwrap();

        let mut settings = ScanSettings::default();
        settings.include_list = vec![root.clone()];
        settings.blacklist = vec![root.join("foo")];

        let mut catalog = CatalogStore::new();
        FileEnumerator::enumerate(&settings, &mut catalog);

        assert!(!catalog.contains(&root.join("foo").join("a.mp4")));
        assert!(catalog.contains(&root.join("foobar").join("b.mp4")));

        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn depth_one_skips_subdirectories() {
        let root = tmp_dir("depth");
        fs::create_dir_all(root.join("sub")).unwrap();
        fs::write(root.join("top.mp4"), b"x").unwrap();
        fs::write(root.join("sub").join("deep.mp4"), b"y").unwrap();

        let mut settings = ScanSettings::default();
        settings.include_list = vec![root.clone()];
        settings.include_subdirectories = false;

        let mut catalog = CatalogStore::new();
        FileEnumerator::enumerate(&settings, &mut catalog);

        assert!(catalog.contains(&root.join("top.mp4")));
        assert!(!catalog.contains(&root.join("sub").join("deep.mp4")));

        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn images_only_included_when_enabled() {
        let root = tmp_dir("images");
        fs::write(root.join("pic.png"), b"x").unwrap();

        let mut settings = ScanSettings::default();
        settings.include_list = vec![root.clone()];

        let mut catalog = CatalogStore::new();
        FileEnumerator::enumerate(&settings, &mut catalog);
        assert!(!catalog.contains(&root.join("pic.png")));

        settings.include_images = true;
        let mut catalog = CatalogStore::new();
        FileEnumerator::enumerate(&settings, &mut catalog);
        assert!(catalog.contains(&root.join("pic.png")));

        fs::remove_dir_all(&root).ok();
    }
}
