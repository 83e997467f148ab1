//! Catalog snapshot writer.
//!
//! Writes are crash-safe: the full snapshot is written to a temporary file
//! in the same directory as the destination, flushed, and then atomically
//! renamed into place so a reader never observes a partially-written file.

use crate::format::{CatalogFile, CatalogHeader, StoredRecord};
use anyhow::{Context, Result};
use crc::{Crc, CRC_64_XZ};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_XZ);

pub struct CatalogWriter;

impl CatalogWriter {
    /// Write `records` to `path` via write-to-temp + rename.
    pub fn write(path: &Path, records: &[StoredRecord]) -> Result<()> {
        let payload = Self::encode_payload(records)?;
        let checksum = CRC64.checksum(&payload);
        let header = CatalogHeader::new(records.len() as u32, payload.len() as u64, checksum);

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create catalog directory: {}", dir.display()))?;
        let tmp_path = dir.join(format!(
            ".{}.tmp",
            path.file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "catalog".to_string())
        ));

        {
            let file = File::create(&tmp_path).with_context(|| {
                format!("failed to create temp catalog file: {}", tmp_path.display())
            })?;
            let mut writer = BufWriter::new(file);
            Self::write_header(&mut writer, &header)?;
            writer
                .write_all(&payload)
                .with_context(|| "failed to write catalog payload")?;
            writer.flush().with_context(|| "failed to flush catalog file")?;
        }

        std::fs::rename(&tmp_path, path).with_context(|| {
            format!(
                "failed to atomically rename {} to {}",
                tmp_path.display(),
                path.display()
            )
        })?;

        Ok(())
    }

    fn write_header<W: Write>(writer: &mut W, header: &CatalogHeader) -> Result<()> {
        writer.write_all(&header.magic)?;
        writer.write_all(&header.version.to_le_bytes())?;
        writer.write_all(&header.flags.to_le_bytes())?;
        writer.write_all(&header.record_count.to_le_bytes())?;
        writer.write_all(&header.payload_size.to_le_bytes())?;
        writer.write_all(&header.checksum.to_le_bytes())?;
        writer.write_all(&header.reserved.to_le_bytes())?;
        Ok(())
    }

    fn encode_payload(records: &[StoredRecord]) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        for record in records {
            Self::encode_record(&mut buf, record)?;
        }
        Ok(buf)
    }

    fn encode_record(buf: &mut Vec<u8>, record: &StoredRecord) -> Result<()> {
        let path_bytes = record.path.as_bytes();
        buf.extend_from_slice(&(path_bytes.len() as u32).to_le_bytes());
        buf.extend_from_slice(path_bytes);

        buf.extend_from_slice(&record.file_size.to_le_bytes());
        buf.extend_from_slice(&record.date_created_unix_ms.to_le_bytes());
        buf.extend_from_slice(&record.date_modified_unix_ms.to_le_bytes());
        buf.push(record.is_image as u8);
        buf.push(record.flags);

        match &record.media_info {
            Some(mi) => {
                buf.push(1);
                buf.extend_from_slice(&mi.duration.to_bits().to_le_bytes());
                buf.extend_from_slice(&mi.fps.to_bits().to_le_bytes());
                buf.extend_from_slice(&mi.bitrate_kbps.to_le_bytes());
                buf.extend_from_slice(&mi.audio_sample_rate.to_le_bytes());
                buf.extend_from_slice(&mi.width.to_le_bytes());
                buf.extend_from_slice(&mi.height.to_le_bytes());
            }
            None => buf.push(0),
        }

        buf.extend_from_slice(&(record.fingerprints.len() as u32).to_le_bytes());
        for (key, vector) in &record.fingerprints {
            buf.extend_from_slice(&key.to_bits().to_le_bytes());
            match vector {
                Some(v) => {
                    if v.len() != 256 {
                        anyhow::bail!(
                            "fingerprint vector for {} has {} bytes, expected 256",
                            record.path,
                            v.len()
                        );
                    }
                    buf.push(1);
                    buf.extend_from_slice(v);
                }
                None => buf.push(0),
            }
        }

        Ok(())
    }
}

/// Convenience wrapper matching `CatalogWriter::write` for a whole `CatalogFile`.
pub fn write_catalog_file(path: &Path, file: &CatalogFile) -> Result<()> {
    CatalogWriter::write(path, &file.records)
}
