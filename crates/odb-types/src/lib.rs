//! Foundation types for the object database.
//!
//! Every other `odb` crate depends on `odb-types` for the key it stores
//! objects under.
//!
//! # Key Types
//!
//! - [`Digest`] -- 160-bit content address (SHA-1), ordered by raw bytes
//! - [`PartialDigest`] -- abbreviated digest carrying its canonical hex length

pub mod digest;
pub mod error;

pub use digest::{Digest, PartialDigest, DIGEST_HEX_LEN, DIGEST_LEN};
pub use error::TypeError;
