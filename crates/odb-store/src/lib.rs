//! Storage primitives for the object database.
//!
//! This crate holds everything an object database backend is built from,
//! independent of how objects are laid out on disk:
//!
//! - [`ObjectDbRead`] / [`ObjectDbWrite`] / [`CachingDb`] -- the database traits
//! - [`ObjectKind`], [`RawObject`], [`ObjectInfo`], [`ObjectStream`] -- object values
//! - [`LockedFile`] -- lock-file protected, atomic single-file writes
//! - [`LazyCache`] -- deferred, memoized field population
//! - [`MemoryBuffer`] / [`FileContents`] -- mapped-or-heap byte views
//!
//! # Design Rules
//!
//! 1. Objects are immutable once written; readers never need locks.
//! 2. The only mutation primitive is [`LockedFile`]: write to `<path>.lock`,
//!    rename on commit.
//! 3. Lock acquisition never waits. Retry policy belongs to the caller.
//! 4. All I/O errors are propagated, never silently ignored.

pub mod error;
pub mod lazy;
pub mod lock;
pub mod mapped;
pub mod object;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use lazy::LazyCache;
pub use lock::{LockedFile, Phase};
pub use mapped::{file_contents_ro, file_contents_ro_path, FileContents, MemoryBuffer, ReadOnlyView};
pub use object::{ObjectInfo, ObjectKind, ObjectStream, RawObject};
pub use traits::{CachingDb, ObjectDbRead, ObjectDbWrite};
