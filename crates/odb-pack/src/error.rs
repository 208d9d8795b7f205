use odb_store::StoreError;
use odb_types::PartialDigest;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PackError {
    #[error("invalid magic: expected {expected}, got {actual}")]
    InvalidMagic { expected: String, actual: String },

    #[error("unsupported pack version: {0}")]
    UnsupportedVersion(u32),

    #[error("pack checksum does not match its index")]
    ChecksumMismatch,

    #[error("corrupt pack entry at offset {offset}: {reason}")]
    CorruptEntry { offset: u64, reason: String },

    #[error("CRC32 mismatch for entry at offset {offset}")]
    CrcMismatch { offset: u64 },

    #[error("decompression failed: {0}")]
    DecompressionFailed(String),

    #[error("compression failed: {0}")]
    CompressionFailed(String),

    #[error("index corrupted: {0}")]
    IndexCorrupted(String),

    #[error("ambiguous object name: {0}")]
    Ambiguous(PartialDigest),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type PackResult<T> = Result<T, PackError>;

impl From<PackError> for StoreError {
    fn from(err: PackError) -> Self {
        match err {
            PackError::Io(e) => StoreError::Io(e),
            PackError::Ambiguous(partial) => StoreError::Ambiguous(partial),
            other => StoreError::Corrupt(other.to_string()),
        }
    }
}
