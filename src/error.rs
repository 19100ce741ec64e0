//! Error handling for get-song.
//!
//! Provides a unified error type based on gRPC status codes, with mapping
//! from the underlying errors of the crates this tool actually touches
//! (file I/O, JSON probing, tag reading, date formatting).
//!
//! Two categories carry most of the weight here:
//! * [`ErrorKind::NotFound`] — no source URL could be resolved for an input
//!   file; the batch skips that item and continues.
//! * [`ErrorKind::Unavailable`] — an external tool or tag backend is not
//!   present; callers decide whether that degrades silently or escalates.

#![allow(clippy::enum_glob_use)]

use std::fmt;
use thiserror::Error;

/// Main error type combining error kind and details.
#[derive(Debug)]
pub struct Error {
    /// Classification of the error
    pub kind: ErrorKind,

    /// Details of the underlying error
    pub error: Box<dyn std::error::Error + Send + Sync>,
}

/// Standard result type for get-song operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories based on gRPC status codes.
///
/// See [gRPC status codes](https://github.com/googleapis/googleapis/blob/master/google/rpc/code.proto)
/// for the original definitions.
#[expect(clippy::module_name_repetitions)]
#[derive(Clone, Copy, Debug, Eq, Error, Hash, Ord, PartialEq, PartialOrd)]
#[repr(u32)]
pub enum ErrorKind {
    /// Operation was interrupted before completion.
    #[error("operation was cancelled")]
    Cancelled = 1,

    /// Failure that fits no other category.
    #[error("unknown error")]
    Unknown = 2,

    /// An argument did not meet validation requirements.
    #[error("invalid argument specified")]
    InvalidArgument = 3,

    /// A time-bound operation exceeded its limit.
    #[error("operation timed out")]
    DeadlineExceeded = 4,

    /// A requested resource does not exist; notably, no source URL could be
    /// extracted from an input file's metadata.
    #[error("not found")]
    NotFound = 5,

    /// Attempt to create something that already exists.
    #[error("attempt to create what already exists")]
    AlreadyExists = 6,

    /// The caller lacks the necessary permissions.
    #[error("permission denied")]
    PermissionDenied = 7,

    /// No valid authentication credentials.
    #[error("no valid authentication credentials")]
    Unauthenticated = 16,

    /// A resource limit has been reached.
    #[error("resource has been exhausted")]
    ResourceExhausted = 8,

    /// The operation cannot proceed from the current state.
    #[error("invalid state")]
    FailedPrecondition = 9,

    /// The operation was aborted mid-execution, e.g. an external command
    /// exited with a failure status.
    #[error("operation aborted")]
    Aborted = 10,

    /// A value exceeds its allowed bounds.
    #[error("out of range")]
    OutOfRange = 11,

    /// The requested operation is not implemented.
    #[error("not implemented")]
    Unimplemented = 12,

    /// Invariant breakage that should not occur during normal operation.
    #[error("internal error")]
    Internal = 13,

    /// A required service, tool, or backend is not present or not usable;
    /// absence of optional external commands maps here.
    #[error("service unavailable")]
    Unavailable = 14,

    /// Unrecoverable data loss or corruption, e.g. unreadable tag data.
    #[error("unrecoverable data loss or corruption")]
    DataLoss = 15,
}

impl Error {
    /// Creates a new error with specified kind and details.
    pub fn new<E>(kind: ErrorKind, error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self {
            kind,
            error: error.into(),
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

    /// Creates an error for operations that were interrupted mid-execution,
    /// e.g. an external command that exited with a failure status.
    pub fn aborted<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Aborted, error)
    }

    /// Creates an error for duplicate resource creation attempts.
    pub fn already_exists<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::AlreadyExists, error)
    }

    /// Creates an error for cancelled operations.
    pub fn cancelled<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Cancelled, error)
    }

    /// Creates an error for data corruption or loss, e.g. tag data that no
    /// backend could make sense of.
    pub fn data_loss<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::DataLoss, error)
    }

    /// Creates an error for operations that exceeded their deadline.
    pub fn deadline_exceeded<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::DeadlineExceeded, error)
    }

    /// Creates an error for operations that failed due to current state.
    pub fn failed_precondition<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::FailedPrecondition, error)
    }

    /// Creates an error for unexpected internal failures.
    pub fn internal<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Internal, error)
    }

    /// Creates an error for invalid arguments.
    pub fn invalid_argument<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::InvalidArgument, error)
    }

    /// Creates an error for missing resources.
    ///
    /// This is the resolver's failure mode: an input file whose metadata
    /// yields no source URL resolves to `NotFound` and is skipped.
    pub fn not_found<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::NotFound, error)
    }

    /// Creates an error for values outside their valid range.
    pub fn out_of_range<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::OutOfRange, error)
    }

    /// Creates an error for permission denied conditions.
    pub fn permission_denied<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::PermissionDenied, error)
    }

    /// Creates an error for exhausted resources.
    pub fn resource_exhausted<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::ResourceExhausted, error)
    }

    /// Creates an error for unavailable services or tools.
    ///
    /// Used when an external command or a tag backend is not present; most
    /// callers treat this as a normal, degradable condition.
    pub fn unavailable<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Unavailable, error)
    }

    /// Creates an error for failures that fit no other category.
    pub fn unknown<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Unknown, error)
    }
}

/// Returns the underlying error source so chains can be examined for root
/// causes.
impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.error.source()
    }
}

/// Formats the error for display as "{kind}: {details}".
impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}: ", self.kind)?;
        self.error.fmt(fmt)
    }
}

/// Converts IO errors into appropriate error kinds.
///
/// Maps standard IO errors to their logical equivalents:
/// * `NotFound` -> `NotFound`
/// * `PermissionDenied` -> `PermissionDenied`
/// * `TimedOut` -> `DeadlineExceeded`
/// * etc.
impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind::*;
        match err.kind() {
            NotFound => Self::not_found(err),
            PermissionDenied => Self::permission_denied(err),
            AddrInUse | AlreadyExists => Self::already_exists(err),
            AddrNotAvailable | ConnectionRefused | NotConnected => Self::unavailable(err),
            BrokenPipe | ConnectionReset | ConnectionAborted => Self::aborted(err),
            Interrupted | WouldBlock => Self::cancelled(err),
            UnexpectedEof => Self::data_loss(err),
            TimedOut => Self::deadline_exceeded(err),
            InvalidInput | InvalidData => Self::invalid_argument(err),
            WriteZero => Self::resource_exhausted(err),
            _ => Self::unknown(err),
        }
    }
}

/// Converts JSON errors through IO error mapping.
///
/// JSON errors are first converted to IO errors, then mapped using the IO
/// error conversion rules. Covers malformed `ffprobe` output.
impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        std::io::Error::from(err).into()
    }
}

/// Converts tag read/write errors to `DataLoss`.
///
/// A file the tag library cannot parse is treated as carrying unreadable
/// metadata; resolution falls back to probing before giving up.
impl From<lofty::LoftyError> for Error {
    fn from(err: lofty::LoftyError) -> Self {
        Self::data_loss(err)
    }
}

/// Converts date formatting errors to `Internal`.
impl From<time::error::Format> for Error {
    fn from(err: time::error::Format) -> Self {
        Self::internal(err)
    }
}
