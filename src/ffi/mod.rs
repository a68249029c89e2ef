//! FFI bindings to libtkv_c.
//!
//! This module contains low-level C bindings. Users should prefer the
//! safe Rust wrappers in the parent modules.

pub mod error;
pub mod handles;
pub mod raw;
#[cfg(feature = "stub-native")]
pub mod stub;

pub use error::check;
pub use handles::*;
pub use raw::*;
