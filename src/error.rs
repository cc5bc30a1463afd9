//! Error handling for dzcrypt.
//!
//! Every fallible operation returns [`Result`], whose [`struct@Error`]
//! carries:
//! * an [`ErrorKind`] classifying the failure
//! * the name of the operation that failed
//! * the chunk index, for failures inside a stream
//! * the underlying error
//!
//! None of these errors are retried internally. Re-fetching a stream after
//! a [`ErrorKind::TruncatedStream`] is up to the caller.
//!
//! # Example
//!
//! ```rust
//! use dzcrypt::error::{Error, ErrorKind, Result};
//!
//! fn check(len: usize) -> Result<()> {
//!     if len % 8 != 0 {
//!         return Err(Error::decrypt("check", "not block aligned").at_chunk(3));
//!     }
//!     Ok(())
//! }
//! ```

#![allow(clippy::enum_glob_use)]

use std::{fmt, io};
use thiserror::Error;

/// Main error type combining error kind, context and details.
#[derive(Debug)]
pub struct Error {
    /// Classification of the error
    pub kind: ErrorKind,

    /// Name of the operation that failed, e.g. `"decrypt"` or `"build_url"`
    pub operation: &'static str,

    /// Index of the chunk being processed, if the error happened inside a
    /// stream
    pub chunk: Option<u64>,

    /// Details of the underlying error
    pub error: Box<dyn std::error::Error + Send + Sync>,
}

/// Standard result type for dzcrypt operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories.
///
/// All of them are terminal for the operation in progress.
#[expect(clippy::module_name_repetitions)]
#[derive(Clone, Copy, Debug, Eq, Error, Hash, Ord, PartialEq, PartialOrd)]
pub enum ErrorKind {
    /// A block cipher rejected its key or IV.
    #[error("cipher initialization failed")]
    CipherInit,

    /// A buffer length is not a multiple of the required block size.
    #[error("invalid length")]
    InvalidLength,

    /// The source ended before the declared length was read.
    #[error("stream truncated")]
    TruncatedStream,

    /// A chunk selected for decryption could not be decrypted.
    #[error("decryption failed")]
    Decrypt,

    /// Malformed input other than lengths, such as track attributes.
    #[error("invalid argument specified")]
    InvalidArgument,

    /// The source failed for a reason other than ending early.
    #[error("input/output error")]
    Io,
}

impl Error {
    /// Creates a new error with specified kind, operation and details.
    pub fn new<E>(kind: ErrorKind, operation: &'static str, error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self {
            kind,
            operation,
            chunk: None,
            error: error.into(),
        }
    }

    /// Creates an error for a block cipher that rejected its key or IV.
    pub fn cipher_init<E>(operation: &'static str, error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::CipherInit, operation, error)
    }

    /// Creates an error for a buffer of the wrong length.
    pub fn invalid_length<E>(operation: &'static str, error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::InvalidLength, operation, error)
    }

    /// Creates an error for a source that ended before its declared length.
    pub fn truncated_stream<E>(operation: &'static str, error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::TruncatedStream, operation, error)
    }

    /// Creates an error for a chunk that could not be decrypted.
    pub fn decrypt<E>(operation: &'static str, error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Decrypt, operation, error)
    }

    /// Creates an error for malformed input other than lengths.
    pub fn invalid_argument<E>(operation: &'static str, error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::InvalidArgument, operation, error)
    }

    /// Creates an error for a source that failed for another reason.
    pub fn io<E>(operation: &'static str, error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Io, operation, error)
    }

    /// Records the chunk index at which the error occurred.
    #[must_use]
    pub fn at_chunk(mut self, index: u64) -> Self {
        self.chunk = Some(index);
        self
    }

    /// Replaces the operation name, for errors converted from foreign types.
    #[must_use]
    pub fn during(mut self, operation: &'static str) -> Self {
        self.operation = operation;
        self
    }

    /// Copies kind, operation and chunk. The underlying error is kept as its
    /// message only.
    #[must_use]
    pub(crate) fn replica(&self) -> Self {
        Self {
            kind: self.kind,
            operation: self.operation,
            chunk: self.chunk,
            error: self.error.to_string().into(),
        }
    }

    /// Attempts to downcast the underlying error to a concrete type.
    #[must_use]
    pub fn downcast<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        self.error.downcast_ref::<E>()
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.error.source()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}: {}", self.operation, self.kind)?;
        if let Some(chunk) = self.chunk {
            write!(fmt, " at chunk {chunk}")?;
        }
        write!(fmt, ": ")?;
        self.error.fmt(fmt)
    }
}

impl From<io::Error> for Error {
    /// Converts an I/O error, unwrapping errors that were boxed by
    /// `From<Error> for io::Error`.
    fn from(err: io::Error) -> Self {
        if err.get_ref().is_some_and(|inner| inner.is::<Self>()) {
            if let Some(inner) = err.into_inner() {
                if let Ok(err) = inner.downcast::<Self>() {
                    return *err;
                }
            }
            return Self::io("read", "unrecoverable I/O error");
        }

        use io::ErrorKind::*;
        match err.kind() {
            UnexpectedEof => Self::truncated_stream("read", err),
            InvalidInput => Self::invalid_argument("read", err),
            _ => Self::io("read", err),
        }
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        use ErrorKind::*;
        let kind = match err.kind {
            TruncatedStream => io::ErrorKind::UnexpectedEof,
            InvalidArgument => io::ErrorKind::InvalidInput,
            CipherInit | InvalidLength | Decrypt => io::ErrorKind::InvalidData,
            Io => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        if err.is_io() {
            return Self::io("parse", err);
        }
        Self::invalid_argument("parse", err)
    }
}
