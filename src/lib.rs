//! Rust bindings for the tkv transactional key-value client library.
//!
//! This crate bridges the native, callback-driven tkv client into a
//! message-passing host: native handles (database, transaction, future)
//! become owned Rust values with correct destruction ordering, asynchronous
//! completions become exactly-one-message deliveries into a channel of your
//! choosing, and result payloads are exposed as zero-copy views pinned to
//! the future that produced them.
//!
//! # Example
//!
//! ```no_run
//! use tkv::Database;
//!
//! fn main() -> tkv::Result<()> {
//!     tkv::select_api_version(tkv::API_VERSION)?;
//!     tkv::network::start()?;
//!
//!     let db = Database::open(None)?;
//!     let tr = db.create_transaction()?;
//!     tr.set(b"hello", b"world");
//!
//!     // Completions arrive as messages; nothing blocks on the native side.
//!     let (mailbox, completions) = tkv::mailbox::channel();
//!     tr.commit().subscribe(1, &mailbox)?;
//!     let done = completions.recv().expect("commit completion");
//!     assert_eq!(done.error_code(), 0);
//!
//!     tkv::network::stop()?;
//!     Ok(())
//! }
//! ```
//!
//! # Threading
//!
//! The native event loop runs on one dedicated OS thread (see
//! [`network`]). Completion callbacks fire on native threads; the bridge
//! confines them to decoding the future and sending one message, both safe
//! from any thread. Handles are cheap to clone and safe to share; keep-alive
//! relationships between them are plain atomic reference counts.

pub mod database;
pub mod error;
mod ffi;
pub mod future;
pub mod mailbox;
pub mod network;
pub mod options;
pub mod transaction;

// Re-export main types at the crate root
pub use database::Database;
pub use error::{Error, NativeError, Predicate, Result};
pub use future::{Future, FutureResult, NativeBytes, ResultKind};
pub use mailbox::Completion;
pub use options::OptionValue;
pub use transaction::Transaction;

/// Test-control surface of the in-process native stub.
#[cfg(feature = "stub-native")]
pub mod stub {
    pub use crate::ffi::stub::control::*;
}

/// The API version this crate was written against.
pub const API_VERSION: i32 = 710;

/// The newest API version the installed native client supports.
pub fn max_api_version() -> i32 {
    unsafe { ffi::tkv_get_max_api_version() }
}

/// Select the native API version. Must be called once, before
/// [`network::start`]; a second call fails with the native "already
/// selected" code.
pub fn select_api_version(version: i32) -> Result<()> {
    let code = unsafe { ffi::tkv_select_api_version(version, API_VERSION) };
    ffi::check(code)?;
    Ok(())
}

/// Look up the native description of an error code. Total: unknown codes
/// get a fallback description rather than an error.
pub fn error_string(code: i32) -> String {
    error::error_string_raw(code)
}

/// Ask the native classifier whether `code` matches `predicate`. The answer
/// is passed through unchanged; retry policy belongs to the caller.
pub fn error_predicate(predicate: Predicate, code: i32) -> bool {
    unsafe { ffi::tkv_error_predicate(predicate.into(), code) != 0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_version_covers_crate_version() {
        assert!(max_api_version() >= API_VERSION);
    }

    #[test]
    fn invalid_argument_names_the_parameter() {
        let err = Database::open(Some("bad\0path")).unwrap_err();
        assert!(err.is_invalid_argument());
        assert_eq!(err.to_string(), "invalid argument: cluster_file");
    }

    #[test]
    fn native_error_keeps_code_verbatim() {
        let err = Error::from(NativeError::from_code(1020));
        assert_eq!(err.native_code(), Some(1020));
    }
}
