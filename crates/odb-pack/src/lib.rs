//! Pack storage for the object database.
//!
//! A pack bundles many immutable objects into one zstd-compressed,
//! CRC-checked file with a sorted index next to it. This crate reads and
//! writes that format and serves lookups across a whole directory of packs.
//!
//! # Architecture
//!
//! - **Pack file** (`pack-*.pack`): header, compressed entries, SHA-1 trailer
//! - **Pack index** (`pack-*.idx`): fan-out table + sorted digests, searched in place
//! - **PackWriter**: builds a pack/index pair and publishes it atomically
//! - **PackEntity**: one pack plus its index, with re-acquirable handles
//! - **PackedDb**: registry of every pack in a directory, ordered by popularity

pub mod config;
pub mod db;
pub mod entity;
pub mod error;
pub mod file;
pub mod index;
pub mod writer;

pub use config::PackedDbConfig;
pub use db::{PackedDb, PackedDbStats};
pub use entity::PackEntity;
pub use error::{PackError, PackResult};
pub use file::{EntryHeader, PackFile};
pub use index::PackIndexFile;
pub use writer::{PackWriter, WrittenPack};

#[cfg(test)]
mod tests {
    use super::*;
    use odb_store::{CachingDb, ObjectDbRead, ObjectDbWrite, ObjectKind, RawObject, StoreError};

    fn make_blob(content: &[u8]) -> RawObject {
        RawObject::new(ObjectKind::Blob, content.to_vec())
    }

    #[test]
    fn written_pack_is_served_through_traits() {
        let dir = tempfile::tempdir().unwrap();
        let objects = vec![
            make_blob(b"hello world"),
            RawObject::new(ObjectKind::Commit, b"tree 0000\n\nmessage".to_vec()),
            RawObject::new(ObjectKind::Tag, b"object 1111".to_vec()),
        ];
        let mut writer = PackWriter::new();
        for obj in &objects {
            writer.add_raw_object(obj);
        }
        writer.finish_into(dir.path()).unwrap();

        let db: Box<dyn ObjectDbRead> = Box::new(PackedDb::new(dir.path()));
        assert_eq!(db.size().unwrap(), objects.len());
        for obj in &objects {
            let stream = db.stream(&obj.digest()).unwrap();
            assert_eq!(stream.kind(), obj.kind);
            assert_eq!(stream.digest(), obj.digest());
            assert_eq!(stream.into_bytes(), obj.data);
        }
    }

    #[test]
    fn write_side_and_cache_side() {
        let dir = tempfile::tempdir().unwrap();
        let db = PackedDb::new(dir.path());

        let writer: &dyn ObjectDbWrite = &db;
        let err = writer.store(&make_blob(b"rejected")).unwrap_err();
        assert!(matches!(err, StoreError::Unsupported(_)));

        let cache: &dyn CachingDb = &db;
        assert!(!cache.update_cache(true).unwrap());
        assert_eq!(db.entities().unwrap().len(), 0);
    }

    #[test]
    fn large_object_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let blob = make_blob(&vec![0xABu8; 100_000]);
        let mut writer = PackWriter::new();
        writer.add_raw_object(&blob);
        let written = writer.finish_into(dir.path()).unwrap();

        // zstd shrinks the repeated bytes
        assert!(std::fs::metadata(&written.pack_path).unwrap().len() < 100_000);

        let db = PackedDb::new(dir.path());
        let info = db.info(&blob.digest()).unwrap();
        assert_eq!(info.size, 100_000);
        assert_eq!(db.stream(&blob.digest()).unwrap().into_bytes(), blob.data);
    }
}
