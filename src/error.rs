//! Library-wide error and result types.
//!
//! Every [`Error`] maps to the signed result code the emulated ES module
//! would hand back over IPC ([`Error::code`]) and to one coarse
//! [`ErrorKind`] so that callers can branch without matching every variant.

use std::io;

use thiserror::Error;

/// Result alias used throughout eskit.
pub type Result<T> = std::result::Result<T, Error>;

/// Success.
pub const IPC_SUCCESS: i32 = 0;
/// Generic filesystem permission failure.
pub const FS_EACCESS: i32 = -102;
/// Missing file, title or content.
pub const FS_ENOENT: i32 = -106;
/// Structurally invalid TMD, or a content id the TMD does not list.
pub const ES_INVALID_TMD: i32 = -106;
/// Fewer bytes were read from the content store than requested.
pub const ES_SHORT_READ: i32 = -1009;
/// A write or rename on the NAND failed.
pub const ES_WRITE_FAILURE: i32 = -1010;
/// Bad parameter size, shape or alignment, or a call made in the wrong state.
pub const ES_EINVAL: i32 = -1017;
/// Ticket is bound to another console.
pub const ES_DEVICE_ID_MISMATCH: i32 = -1020;
/// Decrypted content does not hash to the digest recorded in the TMD.
pub const ES_HASH_MISMATCH: i32 = -1022;
/// No ticket installed for the title.
pub const ES_NO_TICKET_INSTALLED: i32 = -1028;
/// Key object missing from the crypto engine.
pub const IOSC_ENOENT: i32 = -2004;

/// Coarse error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed size/shape/alignment, or operation invalid in the current state.
    Parameter,
    /// Malformed ticket or TMD.
    Validation,
    /// Device mismatch, missing license or digest mismatch.
    Authentication,
    /// Write, rename, read or delete failure.
    Io,
    /// Missing title, content or ticket.
    NotFound,
}

/// Reason an authentication step rejected a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    /// The ticket is bound to a different console.
    DeviceIdMismatch { ticket: u32, device: u32 },
    /// No ticket is installed for the title being imported or exported.
    NoTicketInstalled,
    /// Decrypted content does not match the SHA-1 in its TMD record.
    HashMismatch,
}

/// All errors the library can produce.
#[derive(Debug, Error)]
pub enum Error {
    /// A caller-supplied buffer had the wrong count, size or alignment.
    #[error("invalid parameter: {0}")]
    Parameter(&'static str),
    /// The operation is not valid in the current session state.
    #[error("invalid state: {0}")]
    State(&'static str),
    /// Malformed ticket structure or unknown signature type.
    #[error("invalid ticket: {0}")]
    InvalidTicket(&'static str),
    /// Malformed TMD, or a content id the staged TMD does not list.
    #[error("invalid TMD: {0}")]
    InvalidTmd(&'static str),
    /// A license, device binding or digest check failed.
    #[error("authentication failed: {0:?}")]
    Auth(AuthError),
    /// Unpersonalising a device-bound ticket failed with the given code.
    #[error("failed to unpersonalise ticket (ret = {0})")]
    Unpersonalise(i32),
    /// AES was handed data it cannot process without padding.
    #[error("crypto error: {0}")]
    Crypto(&'static str),
    /// A title, content or ticket is not present on the NAND.
    #[error("not found: {0}")]
    NotFound(&'static str),
    /// The content store returned fewer bytes than requested.
    #[error("short read from content store")]
    ShortRead,
    /// Deleting a title directory failed after the title was logically removed.
    #[error("failed to remove title directory: {0}")]
    Remove(#[source] io::Error),
    /// Any other filesystem failure while reading or writing the NAND.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// The taxonomy bucket this error falls into.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Parameter(_) | Error::State(_) | Error::Crypto(_) => ErrorKind::Parameter,
            Error::InvalidTicket(_) | Error::InvalidTmd(_) => ErrorKind::Validation,
            Error::Auth(_) | Error::Unpersonalise(_) => ErrorKind::Authentication,
            Error::ShortRead | Error::Remove(_) | Error::Io(_) => ErrorKind::Io,
            Error::NotFound(_) => ErrorKind::NotFound,
        }
    }

    /// Signed result code as returned to the IPC caller.
    pub fn code(&self) -> i32 {
        match self {
            Error::Parameter(_) | Error::State(_) | Error::Crypto(_) => ES_EINVAL,
            Error::InvalidTicket(_) => ES_EINVAL,
            Error::InvalidTmd(_) => ES_INVALID_TMD,
            Error::Auth(AuthError::DeviceIdMismatch { .. }) => ES_DEVICE_ID_MISMATCH,
            Error::Auth(AuthError::NoTicketInstalled) => ES_NO_TICKET_INSTALLED,
            Error::Auth(AuthError::HashMismatch) => ES_HASH_MISMATCH,
            Error::Unpersonalise(ret) => *ret,
            Error::NotFound(_) => FS_ENOENT,
            Error::ShortRead => ES_SHORT_READ,
            Error::Remove(_) => FS_EACCESS,
            Error::Io(_) => ES_WRITE_FAILURE,
        }
    }
}

impl From<AuthError> for Error {
    fn from(e: AuthError) -> Self {
        Error::Auth(e)
    }
}

/// Collapse an operation result into the signed reply code.
pub fn reply_code(result: Result<i32>) -> i32 {
    match result {
        Ok(code) => code,
        Err(e) => e.code(),
    }
}
