use thiserror::Error;

/// Caller-facing errors for buffer and query operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HistoryError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("persisted history declares {declared} entries but capacity is {capacity}")]
    CapacityExceeded { declared: usize, capacity: usize },
}

/// Failure of the key-value persistence substrate.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("storage backend: {0}")]
    Backend(String),
}

/// Failure while reading the persisted blob back from the store.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("key {key}: expected {expected} bytes, found {actual}")]
    SizeMismatch {
        key: String,
        expected: usize,
        actual: usize,
    },
    #[error("key {key}: {len} bytes exceeds the {max} byte limit")]
    OversizedPayload { key: String, len: usize, max: usize },
    #[error("key {key}: {len} bytes is not a whole number of entries")]
    MisalignedPayload { key: String, len: usize },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Failure of the point-to-point device link.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("device link closed")]
    Closed,
    #[error("device link send failed: {0}")]
    Send(String),
}

/// Malformed relay frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("relay frame must be {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },
    #[error("relay frame level {0} exceeds 100")]
    Level(u8),
    #[error("relay frame has invalid is_last byte {0:#04x}")]
    LastFlag(u8),
    #[error("relay frame index {index} out of range for total {total}")]
    IndexOutOfRange { index: u16, total: u16 },
    #[error("relay frame is_last={is_last} disagrees with index {index}/{total}")]
    InconsistentLast { index: u16, total: u16, is_last: bool },
}

/// Failure delivering a relayed chunk to the RPC layer.
#[derive(Debug, Error)]
#[error("notification sink: {0}")]
pub struct NotifyError(pub String);

/// Errors surfaced by a relay role when handling inbound link traffic.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Notify(#[from] NotifyError),
    #[error("reporting role does not accept inbound relay frames")]
    UnexpectedInbound,
}
