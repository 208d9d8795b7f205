use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use odb_store::{ObjectKind, RawObject};
use odb_types::Digest;
use tracing::debug;

use crate::error::{PackError, PackResult};
use crate::file::{PACK_MAGIC, PACK_VERSION};
use crate::index::encode_index;

/// Paths and summary of a written pack.
#[derive(Clone, Debug)]
pub struct WrittenPack {
    pub pack_path: PathBuf,
    pub index_path: PathBuf,
    pub object_count: usize,
    pub checksum: Digest,
}

struct PendingObject {
    digest: Digest,
    kind: ObjectKind,
    data: Vec<u8>,
}

/// Builds a pack and its index from a set of objects.
///
/// Files are published index first, pack second, each through a temporary
/// file and a rename, so a `pack-*.pack` visible in a directory always has
/// its index next to it.
pub struct PackWriter {
    objects: Vec<PendingObject>,
    seen: HashSet<Digest>,
}

impl PackWriter {
    pub fn new() -> Self {
        Self {
            objects: Vec::new(),
            seen: HashSet::new(),
        }
    }

    /// Queue an object under an explicit digest. Repeated digests are
    /// ignored.
    pub fn add_object(&mut self, digest: Digest, kind: ObjectKind, data: &[u8]) {
        if self.seen.insert(digest) {
            self.objects.push(PendingObject {
                digest,
                kind,
                data: data.to_vec(),
            });
        }
    }

    /// Queue an object under its content digest.
    pub fn add_raw_object(&mut self, object: &RawObject) -> Digest {
        let digest = object.digest();
        self.add_object(digest, object.kind, &object.data);
        digest
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Write `<base>.pack` and `<base>.idx`.
    pub fn finish(self, base: &Path) -> PackResult<WrittenPack> {
        let built = self.build()?;
        built.publish(base)
    }

    /// Write the pack into `dir`, named `pack-<checksum>` by convention.
    pub fn finish_into(self, dir: &Path) -> PackResult<WrittenPack> {
        let built = self.build()?;
        let base = dir.join(format!("pack-{}", built.checksum.to_hex()));
        built.publish(&base)
    }

    /// Build pack and index bytes in memory.
    pub fn finish_to_bytes(self) -> PackResult<(Vec<u8>, Vec<u8>)> {
        let built = self.build()?;
        Ok((built.pack, built.index))
    }

    fn build(self) -> PackResult<BuiltPack> {
        let mut pack = Vec::new();
        let mut entries = Vec::with_capacity(self.objects.len());

        pack.extend_from_slice(PACK_MAGIC);
        pack.extend_from_slice(&PACK_VERSION.to_be_bytes());
        pack.extend_from_slice(&(self.objects.len() as u32).to_be_bytes());

        for object in &self.objects {
            let offset = pack.len() as u64;
            let compressed = zstd::encode_all(object.data.as_slice(), 3)
                .map_err(|e| PackError::CompressionFailed(e.to_string()))?;

            pack.push(object.kind.type_id());
            encode_varint(&mut pack, object.data.len() as u64);
            encode_varint(&mut pack, compressed.len() as u64);
            pack.extend_from_slice(&compressed);

            entries.push((object.digest, crc32fast::hash(&compressed), offset));
        }

        let checksum = Digest::of(&pack);
        pack.extend_from_slice(checksum.as_bytes());

        let object_count = entries.len();
        let index = encode_index(entries, &checksum);
        Ok(BuiltPack {
            pack,
            index,
            checksum,
            object_count,
        })
    }
}

struct BuiltPack {
    pack: Vec<u8>,
    index: Vec<u8>,
    checksum: Digest,
    object_count: usize,
}

impl BuiltPack {
    fn publish(self, base: &Path) -> PackResult<WrittenPack> {
        let pack_path = base.with_extension("pack");
        let index_path = base.with_extension("idx");
        write_atomic(&index_path, &self.index)?;
        write_atomic(&pack_path, &self.pack)?;
        debug!(path = %pack_path.display(), objects = self.object_count, "pack written");
        Ok(WrittenPack {
            pack_path,
            index_path,
            object_count: self.object_count,
            checksum: self.checksum,
        })
    }
}

impl Default for PackWriter {
    fn default() -> Self {
        Self::new()
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> PackResult<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| PackError::Io(e.error))?;
    Ok(())
}

/// Encode a u64 as a variable-length integer.
pub(crate) fn encode_varint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value > 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if value == 0 {
            break;
        }
    }
}

/// Decode a variable-length integer. Returns (value, bytes_consumed).
pub(crate) fn decode_varint(data: &[u8]) -> Option<(u64, usize)> {
    let mut value: u64 = 0;
    let mut shift = 0;
    for (i, &byte) in data.iter().enumerate() {
        if shift >= 64 {
            return None;
        }
        value |= ((byte & 0x7F) as u64) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            return Some((value, i + 1));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varint_small_and_large() {
        for value in [0, 42, 127, 128, 1_000_000, u64::MAX] {
            let mut buf = Vec::new();
            encode_varint(&mut buf, value);
            assert_eq!(decode_varint(&buf), Some((value, buf.len())));
        }
    }

    #[test]
    fn varint_truncated() {
        assert_eq!(decode_varint(&[0x80]), None);
        assert_eq!(decode_varint(&[]), None);
    }

    #[test]
    fn varint_overflow() {
        assert_eq!(decode_varint(&[0xff; 11]), None);
    }

    #[test]
    fn duplicate_digests_are_dropped() {
        let mut writer = PackWriter::new();
        let obj = RawObject::new(ObjectKind::Blob, b"same".to_vec());
        writer.add_raw_object(&obj);
        writer.add_raw_object(&obj);
        assert_eq!(writer.len(), 1);
    }

    #[test]
    fn finish_into_names_by_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = PackWriter::new();
        writer.add_raw_object(&RawObject::new(ObjectKind::Blob, b"named".to_vec()));
        let written = writer.finish_into(dir.path()).unwrap();

        let name = written.pack_path.file_name().unwrap().to_str().unwrap();
        assert_eq!(name, format!("pack-{}.pack", written.checksum.to_hex()));
        assert!(written.pack_path.exists());
        assert!(written.index_path.exists());
        assert_eq!(written.object_count, 1);
        // only the two published files remain
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }
}
