use std::fmt;
use std::io::{self, Cursor, Read};

use odb_types::Digest;
use serde::{Deserialize, Serialize};

/// The kind of a stored object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    /// Snapshot with parents and metadata.
    Commit,
    /// Directory listing.
    Tree,
    /// Raw content.
    Blob,
    /// Annotated pointer to another object.
    Tag,
}

impl ObjectKind {
    /// Name used in the hashed object header.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Commit => "commit",
            Self::Tree => "tree",
            Self::Blob => "blob",
            Self::Tag => "tag",
        }
    }

    /// Numeric type id used in pack entries.
    pub fn type_id(&self) -> u8 {
        match self {
            Self::Commit => 1,
            Self::Tree => 2,
            Self::Blob => 3,
            Self::Tag => 4,
        }
    }

    /// Parse a pack entry type id.
    pub fn from_type_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Self::Commit),
            2 => Some(Self::Tree),
            3 => Some(Self::Blob),
            4 => Some(Self::Tag),
            _ => None,
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An object handed to a database for storage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawObject {
    pub kind: ObjectKind,
    pub data: Vec<u8>,
}

impl RawObject {
    pub fn new(kind: ObjectKind, data: Vec<u8>) -> Self {
        Self { kind, data }
    }

    /// Content address of this object.
    pub fn digest(&self) -> Digest {
        Digest::for_object(self.kind.as_str(), &self.data)
    }
}

/// Header information of a stored object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ObjectInfo {
    pub digest: Digest,
    pub kind: ObjectKind,
    /// Uncompressed size in bytes.
    pub size: u64,
}

/// Header information plus a reader over the uncompressed content.
pub struct ObjectStream {
    pub info: ObjectInfo,
    reader: Cursor<Vec<u8>>,
}

impl ObjectStream {
    pub fn new(info: ObjectInfo, data: Vec<u8>) -> Self {
        Self {
            info,
            reader: Cursor::new(data),
        }
    }

    pub fn digest(&self) -> Digest {
        self.info.digest
    }

    pub fn kind(&self) -> ObjectKind {
        self.info.kind
    }

    pub fn size(&self) -> u64 {
        self.info.size
    }

    /// Consume the stream and return the remaining content.
    pub fn into_bytes(self) -> Vec<u8> {
        let pos = self.reader.position() as usize;
        let mut data = self.reader.into_inner();
        data.drain(..pos.min(data.len()));
        data
    }
}

impl Read for ObjectStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl fmt::Debug for ObjectStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStream")
            .field("info", &self.info)
            .field("position", &self.reader.position())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_ids_roundtrip() {
        for kind in [
            ObjectKind::Commit,
            ObjectKind::Tree,
            ObjectKind::Blob,
            ObjectKind::Tag,
        ] {
            assert_eq!(ObjectKind::from_type_id(kind.type_id()), Some(kind));
        }
        assert_eq!(ObjectKind::from_type_id(0), None);
        assert_eq!(ObjectKind::from_type_id(7), None);
    }

    #[test]
    fn raw_object_digest_uses_header() {
        let obj = RawObject::new(ObjectKind::Blob, b"hello\n".to_vec());
        assert_eq!(
            obj.digest().to_hex(),
            "ce013625030ba8dba906f756967f9e9ca394464a"
        );
        let tree = RawObject::new(ObjectKind::Tree, b"hello\n".to_vec());
        assert_ne!(obj.digest(), tree.digest());
    }

    #[test]
    fn stream_reads_content() {
        let info = ObjectInfo {
            digest: Digest::null(),
            kind: ObjectKind::Blob,
            size: 5,
        };
        let mut stream = ObjectStream::new(info, b"hello".to_vec());
        let mut head = [0u8; 2];
        stream.read_exact(&mut head).unwrap();
        assert_eq!(&head, b"he");
        assert_eq!(stream.size(), 5);
        assert_eq!(stream.into_bytes(), b"llo");
    }
}
