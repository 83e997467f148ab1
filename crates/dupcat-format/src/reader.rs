//! Catalog snapshot reader.

use crate::format::{CatalogFile, CatalogHeader, StoredMediaInfo, StoredRecord, MAGIC};
use anyhow::{Context, Result};
use crc::{Crc, CRC_64_XZ};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_XZ);

pub struct CatalogReader;

impl CatalogReader {
    /// Read and validate a catalog snapshot, verifying the magic bytes and checksum.
    pub fn read(path: &Path) -> Result<CatalogFile> {
        let file = File::open(path)
            .with_context(|| format!("failed to open catalog file: {}", path.display()))?;
        let mut reader = BufReader::new(file);

        let header = Self::read_header(&mut reader)?;
        if header.magic != MAGIC {
            anyhow::bail!("invalid catalog file: magic bytes mismatch at {}", path.display());
        }
        if header.version != crate::format::VERSION {
            anyhow::bail!(
                "unsupported catalog version {} (expected {}) at {}",
                header.version,
                crate::format::VERSION,
                path.display()
            );
        }

        let mut payload = vec![0u8; header.payload_size as usize];
        reader
            .read_exact(&mut payload)
            .with_context(|| format!("truncated catalog payload in {}", path.display()))?;

        let actual_checksum = CRC64.checksum(&payload);
        if actual_checksum != header.checksum {
            anyhow::bail!(
                "catalog checksum mismatch in {}: expected {:016x}, got {:016x}",
                path.display(),
                header.checksum,
                actual_checksum
            );
        }

        let records = Self::decode_payload(&payload, header.record_count as usize)?;
        Ok(CatalogFile { header, records })
    }

    fn read_header<R: Read>(reader: &mut R) -> Result<CatalogHeader> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        let version = read_u16(reader)?;
        let flags = read_u16(reader)?;
        let record_count = read_u32(reader)?;
        let payload_size = read_u64(reader)?;
        let checksum = read_u64(reader)?;
        let reserved = read_u64(reader)?;
        Ok(CatalogHeader {
            magic,
            version,
            flags,
            record_count,
            payload_size,
            checksum,
            reserved,
        })
    }

    fn decode_payload(payload: &[u8], record_count: usize) -> Result<Vec<StoredRecord>> {
        let mut cursor = payload;
        let mut records = Vec::with_capacity(record_count);
        for _ in 0..record_count {
            let (record, rest) = Self::decode_record(cursor)?;
            records.push(record);
            cursor = rest;
        }
        Ok(records)
    }

    fn decode_record(mut buf: &[u8]) -> Result<(StoredRecord, &[u8])> {
        let path_len = take_u32(&mut buf)? as usize;
        let path = take_string(&mut buf, path_len)?;

        let file_size = take_u64(&mut buf)?;
        let date_created_unix_ms = take_i64(&mut buf)?;
        let date_modified_unix_ms = take_i64(&mut buf)?;
        let is_image = take_u8(&mut buf)? != 0;
        let flags = take_u8(&mut buf)?;

        let has_media_info = take_u8(&mut buf)?;
        let media_info = if has_media_info != 0 {
            let duration = f64::from_bits(take_u64(&mut buf)?);
            let fps = f64::from_bits(take_u64(&mut buf)?);
            let bitrate_kbps = take_u32(&mut buf)?;
            let audio_sample_rate = take_u32(&mut buf)?;
            let width = take_u32(&mut buf)?;
            let height = take_u32(&mut buf)?;
            Some(StoredMediaInfo {
                duration,
                fps,
                bitrate_kbps,
                audio_sample_rate,
                width,
                height,
            })
        } else {
            None
        };

        let fingerprint_count = take_u32(&mut buf)? as usize;
        let mut fingerprints = Vec::with_capacity(fingerprint_count);
        for _ in 0..fingerprint_count {
            let key = f64::from_bits(take_u64(&mut buf)?);
            let has_vector = take_u8(&mut buf)?;
            let vector = if has_vector != 0 {
                Some(take_bytes(&mut buf, 256)?.to_vec())
            } else {
                None
            };
            fingerprints.push((key, vector));
        }

        Ok((
            StoredRecord {
                path,
                file_size,
                date_created_unix_ms,
                date_modified_unix_ms,
                is_image,
                flags,
                media_info,
                fingerprints,
            },
            buf,
        ))
    }
}

fn read_u16<R: Read>(reader: &mut R) -> Result<u16> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64<R: Read>(reader: &mut R) -> Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn take_bytes<'a>(buf: &mut &'a [u8], n: usize) -> Result<&'a [u8]> {
    if buf.len() < n {
        anyhow::bail!("unexpected end of catalog payload");
    }
    let (head, tail) = buf.split_at(n);
    *buf = tail;
    Ok(head)
}

fn take_u8(buf: &mut &[u8]) -> Result<u8> {
    Ok(take_bytes(buf, 1)?[0])
}

fn take_u32(buf: &mut &[u8]) -> Result<u32> {
    Ok(u32::from_le_bytes(take_bytes(buf, 4)?.try_into().unwrap()))
}

fn take_u64(buf: &mut &[u8]) -> Result<u64> {
    Ok(u64::from_le_bytes(take_bytes(buf, 8)?.try_into().unwrap()))
}

fn take_i64(buf: &mut &[u8]) -> Result<i64> {
    Ok(i64::from_le_bytes(take_bytes(buf, 8)?.try_into().unwrap()))
}

fn take_string(buf: &mut &[u8], len: usize) -> Result<String> {
    let bytes = take_bytes(buf, len)?;
    Ok(String::from_utf8(bytes.to_vec())?)
}
