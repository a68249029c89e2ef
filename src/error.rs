//! Error types for the tkv crate.

use std::ffi::CStr;
use std::fmt;

use thiserror::Error;

use crate::ffi;

/// Result type alias for tkv operations.
pub type Result<T> = std::result::Result<T, Error>;

/// An error code reported by the native client, surfaced verbatim.
///
/// The code is never translated: callers branch on it with
/// [`NativeError::is`] (or the raw value) and render it with
/// [`NativeError::message`], exactly as the native library defines it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeError {
    code: i32,
}

impl NativeError {
    /// Wrap a raw native error code. Codes are an open set owned by the
    /// native library; no validation is possible or attempted.
    pub fn from_code(code: i32) -> Self {
        Self { code }
    }

    /// The raw native error code.
    pub fn code(&self) -> i32 {
        self.code
    }

    /// Human-readable description from the native error table.
    pub fn message(&self) -> String {
        crate::error_string(self.code)
    }

    /// Ask the native library whether this error matches a predicate.
    pub fn is(&self, predicate: Predicate) -> bool {
        crate::error_predicate(predicate, self.code)
    }

    /// Shorthand for the retryable predicate, the one retry loops branch on.
    pub fn is_retryable(&self) -> bool {
        self.is(Predicate::Retryable)
    }
}

impl fmt::Display for NativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message(), self.code)
    }
}

impl std::error::Error for NativeError {}

/// Error-predicate kinds understood by the native classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predicate {
    /// The failed operation may succeed if retried.
    Retryable,
    /// The commit may or may not have been applied.
    MaybeCommitted,
    /// Retryable, and the commit is known not to have been applied.
    RetryableNotCommitted,
}

impl From<Predicate> for i32 {
    fn from(predicate: Predicate) -> i32 {
        match predicate {
            Predicate::Retryable => ffi::TKV_PREDICATE_RETRYABLE,
            Predicate::MaybeCommitted => ffi::TKV_PREDICATE_MAYBE_COMMITTED,
            Predicate::RetryableNotCommitted => ffi::TKV_PREDICATE_RETRYABLE_NOT_COMMITTED,
        }
    }
}

/// Error type for tkv operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A call argument was malformed; names the offending parameter.
    /// Detected before any native call is made.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The network event loop was already started (it is single-shot
    /// per process, including after a stop).
    #[error("network event loop already started")]
    NetworkStarted,

    /// The OS refused to spawn the network thread.
    #[error("failed to spawn network thread: {0}")]
    NetworkSpawn(#[from] std::io::Error),

    /// An error code from the native client, passed through verbatim.
    #[error(transparent)]
    Native(#[from] NativeError),
}

impl Error {
    /// The native error code, if this error came from the native client.
    pub fn native_code(&self) -> Option<i32> {
        match self {
            Error::Native(e) => Some(e.code()),
            _ => None,
        }
    }

    /// Check if this is an invalid-argument error.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Error::InvalidArgument(_))
    }
}

/// Look up the native description of an error code.
pub(crate) fn error_string_raw(code: i32) -> String {
    unsafe {
        let ptr = ffi::tkv_get_error(code);
        if ptr.is_null() {
            return format!("unknown error ({code})");
        }
        // The native table owns the string; it is static and never freed.
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}
