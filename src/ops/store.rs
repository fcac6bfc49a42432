use thiserror::Error;

/// Failure taxonomy shared by every aggregate store. Writes carry the
/// version the caller read so lost updates surface as `VersionConflict`
/// instead of silently overwriting.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record already exists")]
    AlreadyExists,
    #[error("record not found")]
    NotFound,
    #[error("version conflict: expected {expected}, found {found}")]
    VersionConflict { expected: u64, found: u64 },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
