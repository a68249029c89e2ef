//! Error conversion utilities for FFI.

use super::raw::{TkvErrorCode, TKV_OK};
use crate::error::NativeError;

/// Check a native error code and convert to Result.
///
/// Native codes are surfaced verbatim; nothing is translated or hidden.
pub fn check(code: TkvErrorCode) -> Result<(), NativeError> {
    if code == TKV_OK {
        Ok(())
    } else {
        Err(NativeError::from_code(code))
    }
}
