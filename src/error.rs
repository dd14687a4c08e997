use thiserror::Error;

/// Status values for every fallible engine operation.
///
/// End-of-iteration conditions (end of file, end of page, empty page) are
/// not errors; the scan and page APIs report them as `Option::None`.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Buffer pool
    #[error("buffer pool exceeded: all frames pinned")]
    BufferExceeded,

    #[error("page not found in buffer hash table")]
    HashNotFound,

    #[error("buffer hash table error: {0}")]
    HashTblError(String),

    #[error("page is not pinned")]
    PageNotPinned,

    #[error("page is pinned")]
    PagePinned,

    #[error("corrupt buffer frame state")]
    BadBuffer,

    // Page level
    #[error("insufficient space on page")]
    NoSpace,

    #[error("invalid slot number")]
    InvalidSlotNo,

    #[error("record length exceeds page capacity")]
    InvalidRecLen,

    // File store
    #[error("file already exists: {0}")]
    FileExists(String),

    #[error("file is open: {0}")]
    FileOpen(String),

    // Scans and catalog
    #[error("bad scan parameter")]
    BadScanParm,

    #[error("relation not found: {0}")]
    RelNotFound(String),

    #[error("attribute not found: {0}")]
    AttrNotFound(String),

    #[error("attribute value does not match declared type: {0}")]
    AttrTypeMismatch(String),

    #[error("storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, DbError>;
