//! Binary catalog snapshot format: header, writer, reader.

pub mod format;
pub mod reader;
pub mod writer;

pub use format::{CatalogFile, CatalogHeader, StoredMediaInfo, StoredRecord, MAGIC, VERSION};
pub use reader::CatalogReader;
pub use writer::{write_catalog_file, CatalogWriter};

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn sample_records() -> Vec<StoredRecord> {
        vec![
            StoredRecord {
                path: "/videos/a.mp4".to_string(),
                file_size: 12345,
                date_created_unix_ms: 1_000,
                date_modified_unix_ms: 2_000,
                is_image: false,
                flags: 0,
                media_info: Some(StoredMediaInfo {
                    duration: 30.5,
                    fps: 29.97,
                    bitrate_kbps: 4500,
                    audio_sample_rate: 48000,
                    width: 1920,
                    height: 1080,
                }),
                fingerprints: vec![
                    (0.0, Some(vec![128u8; 256])),
                    (15.25, None),
                ],
            },
            StoredRecord {
                path: "/images/b.png".to_string(),
                file_size: 9000,
                date_created_unix_ms: 500,
                date_modified_unix_ms: 500,
                is_image: true,
                flags: 0b0010,
                media_info: None,
                fingerprints: vec![(0.0, Some(vec![10u8; 256]))],
            },
        ]
    }

    #[test]
    fn round_trips_records_through_disk() {
        let dir = std::env::temp_dir().join(format!("dupcat-format-test-{:p}", &0u8));
        std::fs::create_dir_all(&dir).unwrap();
        let path: PathBuf = dir.join("catalog.bin");

        let records = sample_records();
        write_catalog_file(
            &path,
            &CatalogFile {
                header: CatalogHeader::new(0, 0, 0),
                records: records.clone(),
            },
        )
        .unwrap();

        let loaded = CatalogReader::read(&path).unwrap();
        assert_eq!(loaded.records, records);
        assert_eq!(loaded.header.record_count, records.len() as u32);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn rejects_corrupted_payload() {
        let dir = std::env::temp_dir().join(format!("dupcat-format-test-corrupt-{:p}", &0u8));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("catalog.bin");

        write_catalog_file(
            &path,
            &CatalogFile {
                header: CatalogHeader::new(0, 0, 0),
                records: sample_records(),
            },
        )
        .unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        std::fs::write(&path, &bytes).unwrap();

        assert!(CatalogReader::read(&path).is_err());
        std::fs::remove_file(&path).ok();
    }
}
