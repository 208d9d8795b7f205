use odb_types::Digest;

use crate::error::StoreResult;
use crate::object::{ObjectInfo, ObjectStream, RawObject};

/// Read access to a content-addressed object database.
///
/// Objects are immutable, so implementations are safe to query from many
/// threads at once.
pub trait ObjectDbRead: Send + Sync {
    /// Returns `true` if the object exists. Lookup failures count as absent.
    fn has_object(&self, digest: &Digest) -> bool;

    /// Header information for an object.
    ///
    /// Fails with [`StoreError::NotFound`](crate::StoreError::NotFound) if
    /// no location holds it.
    fn info(&self, digest: &Digest) -> StoreResult<ObjectInfo>;

    /// Header information plus the uncompressed content.
    fn stream(&self, digest: &Digest) -> StoreResult<ObjectStream>;

    /// Number of objects in the database.
    fn size(&self) -> StoreResult<usize>;

    /// Every digest in the database. Each call starts from a fresh snapshot.
    fn digests(&self) -> StoreResult<Box<dyn Iterator<Item = Digest> + '_>>;
}

/// Write access to an object database.
pub trait ObjectDbWrite: Send + Sync {
    /// Store an object and return its digest.
    fn store(&self, object: &RawObject) -> StoreResult<Digest>;
}

/// A database that caches directory state and must be told to re-check it.
pub trait CachingDb {
    /// Reconcile cached state with the filesystem.
    ///
    /// Returns `true` if anything changed. Without `force` an implementation
    /// may skip the work when the filesystem reports no modification.
    fn update_cache(&self, force: bool) -> StoreResult<bool>;
}
