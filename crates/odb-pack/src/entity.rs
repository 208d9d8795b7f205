use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use odb_store::{ObjectInfo, ObjectStream};
use tracing::debug;

use crate::error::{PackError, PackResult};
use crate::file::PackFile;
use crate::index::PackIndexFile;

/// One pack and its index.
///
/// Both files are opened when the entity is created. [`index`](Self::index)
/// and [`pack`](Self::pack) hand out shared handles; after
/// [`release`](Self::release) the next acquisition opens the files again,
/// while handles already given out stay valid until dropped.
pub struct PackEntity {
    pack_path: PathBuf,
    index_path: PathBuf,
    allow_mmap: bool,
    index: Mutex<Option<Arc<PackIndexFile>>>,
    pack: Mutex<Option<Arc<PackFile>>>,
}

impl PackEntity {
    /// Open the pack at `pack_path` together with its `.idx` companion.
    pub fn open(pack_path: &Path, allow_mmap: bool) -> PackResult<Self> {
        let index_path = pack_path.with_extension("idx");
        let index = PackIndexFile::open(&index_path, allow_mmap)?;
        let pack = PackFile::open(pack_path, allow_mmap)?;
        if index.pack_checksum() != pack.checksum() {
            return Err(PackError::ChecksumMismatch);
        }
        if index.size() != pack.object_count() {
            return Err(PackError::IndexCorrupted(format!(
                "index lists {} objects, pack holds {}",
                index.size(),
                pack.object_count()
            )));
        }

        Ok(Self {
            pack_path: pack_path.to_path_buf(),
            index_path,
            allow_mmap,
            index: Mutex::new(Some(Arc::new(index))),
            pack: Mutex::new(Some(Arc::new(pack))),
        })
    }

    /// Path of the pack file.
    pub fn path(&self) -> &Path {
        &self.pack_path
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    /// The index, reopened if it was released.
    pub fn index(&self) -> PackResult<Arc<PackIndexFile>> {
        let mut slot = self.index.lock().expect("lock poisoned");
        if let Some(index) = slot.as_ref() {
            return Ok(Arc::clone(index));
        }
        let index = Arc::new(PackIndexFile::open(&self.index_path, self.allow_mmap)?);
        *slot = Some(Arc::clone(&index));
        Ok(index)
    }

    /// The pack file, reopened if it was released.
    pub fn pack(&self) -> PackResult<Arc<PackFile>> {
        let mut slot = self.pack.lock().expect("lock poisoned");
        if let Some(pack) = slot.as_ref() {
            return Ok(Arc::clone(pack));
        }
        let pack = Arc::new(PackFile::open(&self.pack_path, self.allow_mmap)?);
        *slot = Some(Arc::clone(&pack));
        Ok(pack)
    }

    /// Drop the entity's own handles to both files.
    pub fn release(&self) {
        self.index.lock().expect("lock poisoned").take();
        self.pack.lock().expect("lock poisoned").take();
        debug!(path = %self.pack_path.display(), "pack released");
    }

    pub fn is_open(&self) -> bool {
        self.index.lock().expect("lock poisoned").is_some()
            || self.pack.lock().expect("lock poisoned").is_some()
    }

    /// Header information of the object at index `slot`.
    pub fn info_at_index(&self, slot: u32) -> PackResult<ObjectInfo> {
        let index = self.index()?;
        let digest = index.sha(slot);
        let header = self.pack()?.entry_header(index.offset(slot))?;
        Ok(ObjectInfo {
            digest,
            kind: header.kind,
            size: header.size,
        })
    }

    /// Header information and content of the object at index `slot`.
    pub fn stream_at_index(&self, slot: u32) -> PackResult<ObjectStream> {
        let index = self.index()?;
        let digest = index.sha(slot);
        let (header, data) = self.pack()?.read_at(index.offset(slot), index.crc(slot))?;
        let info = ObjectInfo {
            digest,
            kind: header.kind,
            size: header.size,
        };
        Ok(ObjectStream::new(info, data))
    }
}

impl std::fmt::Debug for PackEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackEntity")
            .field("pack_path", &self.pack_path)
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use odb_store::{ObjectKind, RawObject};

    use super::*;
    use crate::writer::{PackWriter, WrittenPack};

    fn write_pack(dir: &Path, objects: &[RawObject]) -> WrittenPack {
        let mut writer = PackWriter::new();
        for obj in objects {
            writer.add_raw_object(obj);
        }
        writer.finish_into(dir).unwrap()
    }

    #[test]
    fn info_and_stream() {
        let dir = tempfile::tempdir().unwrap();
        let blob = RawObject::new(ObjectKind::Blob, b"entity content".to_vec());
        let tree = RawObject::new(ObjectKind::Tree, b"entity tree".to_vec());
        let written = write_pack(dir.path(), &[blob.clone(), tree.clone()]);

        let entity = PackEntity::open(&written.pack_path, true).unwrap();
        assert_eq!(entity.path(), written.pack_path);
        assert_eq!(entity.index_path(), written.index_path);

        let index = entity.index().unwrap();
        assert_eq!(index.size(), 2);

        let slot = index.sha_to_index(&tree.digest()).unwrap();
        let info = entity.info_at_index(slot).unwrap();
        assert_eq!(info.digest, tree.digest());
        assert_eq!(info.kind, ObjectKind::Tree);
        assert_eq!(info.size, tree.data.len() as u64);

        let slot = index.sha_to_index(&blob.digest()).unwrap();
        let mut stream = entity.stream_at_index(slot).unwrap();
        assert_eq!(stream.kind(), ObjectKind::Blob);
        let mut content = Vec::new();
        stream.read_to_end(&mut content).unwrap();
        assert_eq!(content, blob.data);
    }

    #[test]
    fn release_and_reacquire() {
        let dir = tempfile::tempdir().unwrap();
        let blob = RawObject::new(ObjectKind::Blob, b"reopen me".to_vec());
        let written = write_pack(dir.path(), std::slice::from_ref(&blob));

        let entity = PackEntity::open(&written.pack_path, false).unwrap();
        let held = entity.index().unwrap();
        entity.release();
        assert!(!entity.is_open());

        // outstanding handles survive a release
        assert_eq!(held.sha_to_index(&blob.digest()), Some(0));

        let index = entity.index().unwrap();
        assert!(!Arc::ptr_eq(&held, &index));
        assert_eq!(entity.pack().unwrap().object_count(), 1);
        assert!(entity.is_open());
    }

    #[test]
    fn missing_index_fails() {
        let dir = tempfile::tempdir().unwrap();
        let written = write_pack(
            dir.path(),
            &[RawObject::new(ObjectKind::Blob, b"orphan".to_vec())],
        );
        std::fs::remove_file(&written.index_path).unwrap();

        let err = PackEntity::open(&written.pack_path, true).unwrap_err();
        assert!(matches!(err, PackError::Io(_)));
    }

    #[test]
    fn mismatched_index_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let first = write_pack(dir.path(), &[RawObject::new(ObjectKind::Blob, b"one".to_vec())]);
        let second = write_pack(dir.path(), &[RawObject::new(ObjectKind::Blob, b"two".to_vec())]);
        std::fs::copy(&second.index_path, &first.index_path).unwrap();

        let err = PackEntity::open(&first.pack_path, true).unwrap_err();
        assert!(matches!(err, PackError::ChecksumMismatch));
    }
}
