//! Error type for file sessions.

use std::fmt;

use nc3_format::{FormatError, NcType};

/// Errors raised by an open file session.
#[derive(Debug)]
pub enum Error {
    /// I/O error from the underlying storage.
    Io(std::io::Error),
    /// The bytes or the requested change violate the file format.
    Format(FormatError),
    /// A mutating operation on a file opened read-only.
    ReadOnly,
    /// The session was closed.
    Closed,
    /// Values of the wrong element type for a variable.
    WrongType {
        variable: String,
        have: NcType,
        want: NcType,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {e}"),
            Error::Format(e) => write!(f, "format error: {e}"),
            Error::ReadOnly => write!(f, "file is open read-only"),
            Error::Closed => write!(f, "file is closed"),
            Error::WrongType {
                variable,
                have,
                want,
            } => write!(f, "variable {variable} holds {want}, got {have} values"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Format(e) => Some(e),
            _ => None,
        }
    }
}

impl From<FormatError> for Error {
    fn from(e: FormatError) -> Self {
        Error::Format(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
