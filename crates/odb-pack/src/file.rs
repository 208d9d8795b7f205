use std::path::{Path, PathBuf};

use odb_store::{file_contents_ro_path, FileContents, ObjectKind};
use odb_types::{Digest, DIGEST_LEN};

use crate::error::{PackError, PackResult};
use crate::writer::decode_varint;

pub(crate) const PACK_MAGIC: &[u8; 4] = b"ODBP";
pub(crate) const PACK_VERSION: u32 = 1;

const HEADER_LEN: usize = 12;

/// Location and header of one pack entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntryHeader {
    pub kind: ObjectKind,
    /// Uncompressed size.
    pub size: u64,
    data_start: usize,
    data_end: usize,
}

/// Read-only view of a pack file.
pub struct PackFile {
    path: PathBuf,
    data: FileContents,
    count: u32,
}

impl PackFile {
    /// Open and validate the header of the pack at `path`.
    pub fn open(path: &Path, allow_mmap: bool) -> PackResult<Self> {
        let data = file_contents_ro_path(path, false, allow_mmap)?.into_contents();
        Self::from_contents(path, data)
    }

    pub fn from_contents(path: &Path, data: FileContents) -> PackResult<Self> {
        if data.len() < HEADER_LEN + DIGEST_LEN {
            return Err(PackError::CorruptEntry {
                offset: 0,
                reason: "pack data too short".into(),
            });
        }
        if &data[0..4] != PACK_MAGIC {
            return Err(PackError::InvalidMagic {
                expected: "ODBP".into(),
                actual: String::from_utf8_lossy(&data[0..4]).into(),
            });
        }
        let version = read_u32(&data, 4);
        if version != PACK_VERSION {
            return Err(PackError::UnsupportedVersion(version));
        }
        let count = read_u32(&data, 8);
        Ok(Self {
            path: path.to_path_buf(),
            data,
            count,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the pack in bytes.
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Object count recorded in the header.
    pub fn object_count(&self) -> u32 {
        self.count
    }

    /// Trailing checksum.
    pub fn checksum(&self) -> Digest {
        let pos = self.data.len() - DIGEST_LEN;
        let mut raw = [0u8; DIGEST_LEN];
        raw.copy_from_slice(&self.data[pos..]);
        Digest::from_raw(raw)
    }

    /// Recompute the checksum over the whole pack and compare.
    pub fn verify_checksum(&self) -> PackResult<()> {
        let body = &self.data[..self.data.len() - DIGEST_LEN];
        if Digest::of(body) != self.checksum() {
            return Err(PackError::ChecksumMismatch);
        }
        Ok(())
    }

    /// Parse the entry header at `offset` without touching its data.
    pub fn entry_header(&self, offset: u64) -> PackResult<EntryHeader> {
        let end_of_entries = self.data.len() - DIGEST_LEN;
        let mut pos = offset as usize;
        if offset < HEADER_LEN as u64 || pos >= end_of_entries {
            return Err(PackError::CorruptEntry {
                offset,
                reason: "offset outside of pack entries".into(),
            });
        }

        let type_id = self.data[pos];
        pos += 1;
        let kind = ObjectKind::from_type_id(type_id).ok_or_else(|| PackError::CorruptEntry {
            offset,
            reason: format!("unknown type id: {type_id}"),
        })?;

        let (size, consumed) = decode_varint(&self.data[pos..end_of_entries]).ok_or_else(|| {
            PackError::CorruptEntry {
                offset,
                reason: "bad size varint".into(),
            }
        })?;
        pos += consumed;
        let (compressed, consumed) = decode_varint(&self.data[pos..end_of_entries])
            .ok_or_else(|| PackError::CorruptEntry {
                offset,
                reason: "bad compressed size varint".into(),
            })?;
        pos += consumed;

        let data_end = pos
            .checked_add(compressed as usize)
            .filter(|end| *end <= end_of_entries)
            .ok_or_else(|| PackError::CorruptEntry {
                offset,
                reason: "compressed data extends beyond pack".into(),
            })?;

        Ok(EntryHeader {
            kind,
            size,
            data_start: pos,
            data_end,
        })
    }

    /// Decompress the entry at `offset`, checking its CRC32 and size.
    pub fn read_at(&self, offset: u64, expected_crc: u32) -> PackResult<(EntryHeader, Vec<u8>)> {
        let header = self.entry_header(offset)?;
        let compressed = &self.data[header.data_start..header.data_end];

        if crc32fast::hash(compressed) != expected_crc {
            return Err(PackError::CrcMismatch { offset });
        }

        let data = zstd::decode_all(compressed)
            .map_err(|e| PackError::DecompressionFailed(e.to_string()))?;
        if data.len() as u64 != header.size {
            return Err(PackError::CorruptEntry {
                offset,
                reason: format!("size mismatch: expected {}, got {}", header.size, data.len()),
            });
        }
        Ok((header, data))
    }
}

impl std::fmt::Debug for PackFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackFile")
            .field("path", &self.path)
            .field("count", &self.count)
            .field("size", &self.data.len())
            .finish()
    }
}

fn read_u32(data: &[u8], pos: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&data[pos..pos + 4]);
    u32::from_be_bytes(raw)
}
