//! Error types for tinymidi.
//!
//! Every public engine operation returns [`Result`]. The variants mirror the
//! failure classes of the handle-based API: bad input data, allocation
//! failure, stale handles and negative preset lookups.

use crate::handle::Handle;
use thiserror::Error;

/// Result type alias for tinymidi operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in tinymidi.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The SoundFont or MIDI data is malformed. Retrying with the same bytes
    /// will fail again.
    #[error("Invalid file: {0}")]
    InvalidFile(String),

    /// An allocation for sample data or event tables could not be satisfied.
    /// Other handles remain usable.
    #[error("Out of memory")]
    OutOfMemory,

    /// The handle is unknown, already closed, or refers to the wrong kind of
    /// object. The call had no effect.
    #[error("Invalid handle: {0}")]
    InvalidHandle(Handle),

    /// The requested preset does not exist in the soundfont.
    #[error("No such preset")]
    NoSuchPreset,

    /// Channel number outside 0-15.
    #[error("Invalid channel: {0}")]
    InvalidChannel(u8),

    /// A stream cannot be rendered at a zero sample rate.
    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(u32),
}

impl Error {
    /// Shorthand for building an [`Error::InvalidFile`].
    pub(crate) fn invalid_file(reason: impl Into<String>) -> Self {
        Error::InvalidFile(reason.into())
    }
}

impl From<std::collections::TryReserveError> for Error {
    fn from(_: std::collections::TryReserveError) -> Self {
        Error::OutOfMemory
    }
}

impl From<midly::Error> for Error {
    fn from(e: midly::Error) -> Self {
        Error::InvalidFile(format!("MIDI parse error: {}", e))
    }
}
