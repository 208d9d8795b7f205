use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use odb_store::{file_contents_ro_path, FileContents};
use odb_types::{Digest, PartialDigest, DIGEST_LEN};

use crate::error::{PackError, PackResult};

pub(crate) const INDEX_MAGIC: &[u8; 4] = b"ODBI";
pub(crate) const INDEX_VERSION: u32 = 1;

const HEADER_LEN: usize = 8;
const FAN_OUT_LEN: usize = 256 * 4;

/// Read-only view of a pack index file.
///
/// Layout:
/// - magic `ODBI` + u32 version
/// - fan-out table: 256 entries counting digests with first byte <= index
/// - sorted digests
/// - CRC32 array (parallel)
/// - offset array (parallel)
/// - pack checksum
///
/// Lookups read the mapped bytes directly.
pub struct PackIndexFile {
    path: PathBuf,
    data: FileContents,
    count: u32,
}

impl PackIndexFile {
    /// Open and validate the index at `path`.
    pub fn open(path: &Path, allow_mmap: bool) -> PackResult<Self> {
        let data = file_contents_ro_path(path, false, allow_mmap)?.into_contents();
        Self::from_contents(path, data)
    }

    /// Validate already loaded index bytes.
    pub fn from_contents(path: &Path, data: FileContents) -> PackResult<Self> {
        if data.len() < HEADER_LEN + FAN_OUT_LEN {
            return Err(PackError::IndexCorrupted("too short".into()));
        }
        if &data[0..4] != INDEX_MAGIC {
            return Err(PackError::InvalidMagic {
                expected: "ODBI".into(),
                actual: String::from_utf8_lossy(&data[0..4]).into(),
            });
        }
        let version = read_u32(&data, 4);
        if version != INDEX_VERSION {
            return Err(PackError::UnsupportedVersion(version));
        }

        let mut prev = 0;
        for i in 0..256 {
            let n = read_u32(&data, HEADER_LEN + i * 4);
            if n < prev {
                return Err(PackError::IndexCorrupted("fan-out not monotonic".into()));
            }
            prev = n;
        }
        let count = prev;
        let expected = index_len(count as usize);
        if data.len() != expected {
            return Err(PackError::IndexCorrupted(format!(
                "expected {expected} bytes for {count} objects, found {}",
                data.len()
            )));
        }

        Ok(Self {
            path: path.to_path_buf(),
            data,
            count,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of objects in the index.
    pub fn size(&self) -> u32 {
        self.count
    }

    /// Digest at `slot`. Slots run from `0` to `size() - 1` in digest order.
    pub fn sha(&self, slot: u32) -> Digest {
        let mut raw = [0u8; DIGEST_LEN];
        raw.copy_from_slice(self.digest_bytes(slot));
        Digest::from_raw(raw)
    }

    /// CRC32 of the compressed entry at `slot`.
    pub fn crc(&self, slot: u32) -> u32 {
        read_u32(&self.data, self.crc_start() + slot as usize * 4)
    }

    /// Offset of the entry at `slot` within the pack file.
    pub fn offset(&self, slot: u32) -> u64 {
        let pos = self.offset_start() + slot as usize * 8;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&self.data[pos..pos + 8]);
        u64::from_be_bytes(raw)
    }

    /// Checksum of the pack this index describes.
    pub fn pack_checksum(&self) -> Digest {
        let pos = self.data.len() - DIGEST_LEN;
        let mut raw = [0u8; DIGEST_LEN];
        raw.copy_from_slice(&self.data[pos..]);
        Digest::from_raw(raw)
    }

    /// Slot of `digest`, if present.
    pub fn sha_to_index(&self, digest: &Digest) -> Option<u32> {
        let first = digest.as_bytes()[0] as usize;
        let (lo, hi) = self.fan_out_range(first, first);
        let slot = self.lower_bound(lo, hi, digest.as_bytes());
        (slot < hi && self.digest_bytes(slot) == digest.as_bytes()).then_some(slot)
    }

    /// Slot of the single digest starting with `partial`.
    ///
    /// Returns `Ok(None)` if nothing matches and [`PackError::Ambiguous`] if
    /// more than one digest in this index does.
    pub fn partial_sha_to_index(&self, partial: &PartialDigest) -> PackResult<Option<u32>> {
        let lower = partial.lower_bound();
        let first = lower.as_bytes()[0] as usize;
        // a single hex character leaves the low nibble of the first byte open
        let last = if partial.hex_len() == 1 { first | 0x0f } else { first };
        let (lo, hi) = self.fan_out_range(first, last);

        let slot = self.lower_bound(lo, hi, lower.as_bytes());
        if slot >= hi || !partial.matches(&self.sha(slot)) {
            return Ok(None);
        }
        if slot + 1 < hi && partial.matches(&self.sha(slot + 1)) {
            return Err(PackError::Ambiguous(partial.clone()));
        }
        Ok(Some(slot))
    }

    /// All digests in index order.
    pub fn digests(&self) -> impl Iterator<Item = Digest> + '_ {
        (0..self.count).map(move |slot| self.sha(slot))
    }

    fn fan_out(&self, byte: usize) -> u32 {
        read_u32(&self.data, HEADER_LEN + byte * 4)
    }

    /// Slots whose first digest byte lies in `first..=last`.
    fn fan_out_range(&self, first: usize, last: usize) -> (u32, u32) {
        let lo = if first == 0 { 0 } else { self.fan_out(first - 1) };
        (lo, self.fan_out(last))
    }

    /// First slot in `lo..hi` whose digest is not less than `target`.
    fn lower_bound(&self, mut lo: u32, mut hi: u32, target: &[u8]) -> u32 {
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.digest_bytes(mid).cmp(target) {
                Ordering::Less => lo = mid + 1,
                _ => hi = mid,
            }
        }
        lo
    }

    fn digest_bytes(&self, slot: u32) -> &[u8] {
        let pos = HEADER_LEN + FAN_OUT_LEN + slot as usize * DIGEST_LEN;
        &self.data[pos..pos + DIGEST_LEN]
    }

    fn crc_start(&self) -> usize {
        HEADER_LEN + FAN_OUT_LEN + self.count as usize * DIGEST_LEN
    }

    fn offset_start(&self) -> usize {
        self.crc_start() + self.count as usize * 4
    }
}

impl std::fmt::Debug for PackIndexFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackIndexFile")
            .field("path", &self.path)
            .field("count", &self.count)
            .field("mapped", &self.data.is_mapped())
            .finish()
    }
}

/// Serialize an index for `(digest, crc32, offset)` entries.
pub(crate) fn encode_index(mut entries: Vec<(Digest, u32, u64)>, pack_checksum: &Digest) -> Vec<u8> {
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let mut fan_out = [0u32; 256];
    for (digest, _, _) in &entries {
        fan_out[digest.as_bytes()[0] as usize] += 1;
    }
    let mut total = 0;
    for count in fan_out.iter_mut() {
        total += *count;
        *count = total;
    }

    let mut buf = Vec::with_capacity(index_len(entries.len()));
    buf.extend_from_slice(INDEX_MAGIC);
    buf.extend_from_slice(&INDEX_VERSION.to_be_bytes());
    for count in fan_out {
        buf.extend_from_slice(&count.to_be_bytes());
    }
    for (digest, _, _) in &entries {
        buf.extend_from_slice(digest.as_bytes());
    }
    for (_, crc, _) in &entries {
        buf.extend_from_slice(&crc.to_be_bytes());
    }
    for (_, _, offset) in &entries {
        buf.extend_from_slice(&offset.to_be_bytes());
    }
    buf.extend_from_slice(pack_checksum.as_bytes());
    buf
}

fn index_len(count: usize) -> usize {
    HEADER_LEN + FAN_OUT_LEN + count * (DIGEST_LEN + 4 + 8) + DIGEST_LEN
}

fn read_u32(data: &[u8], pos: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&data[pos..pos + 4]);
    u32::from_be_bytes(raw)
}
