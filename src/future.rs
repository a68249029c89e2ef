//! Future handles and result decoding.
//!
//! Every asynchronous native operation returns a [`Future`]. A future owns
//! the native future pointer, the tag describing how its payload decodes,
//! and shared-ownership tokens on the handles the operation was issued
//! against, so a transaction (and its database) cannot be destroyed while a
//! pending future still refers to them.

use std::any::Any;
use std::ffi::CStr;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use crate::error::NativeError;
use crate::ffi::{self, check, TkvFuture};

/// How a future's native payload is decoded once it resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    /// Optional value bytes (point read).
    Value,
    /// Commit acknowledgement; success is the entire payload.
    Commit,
    /// Key/value batch plus a continuation flag (range read).
    KeyValueArray,
    /// A 64-bit integer (read version).
    Int64,
    /// A single key (key selector resolution).
    Key,
    /// An array of NUL-terminated strings (storage addresses).
    StringArray,
    /// Watch acknowledgement.
    Watch,
    /// Error-check acknowledgement (`on_error`).
    ErrorCheck,
}

/// Shared state behind a [`Future`] and every [`NativeBytes`] view into it.
pub(crate) struct FutureInner {
    ptr: *mut TkvFuture,
    kind: ResultKind,
    /// Ancestor handles this future keeps alive. Released only after the
    /// native future has been destroyed (fields drop after the `drop` body).
    #[allow(dead_code)]
    refs: Vec<Arc<dyn Any + Send + Sync>>,
}

// Safety: the native client documents futures as safe to probe, read, and
// cancel from any thread once created; the payload is immutable after the
// future resolves.
unsafe impl Send for FutureInner {}
unsafe impl Sync for FutureInner {}

impl FutureInner {
    pub(crate) fn ptr(&self) -> *mut TkvFuture {
        self.ptr
    }
}

impl Drop for FutureInner {
    fn drop(&mut self) {
        unsafe {
            ffi::tkv_future_destroy(self.ptr);
        }
        // `refs` drops afterwards, so ancestors outlive the native destroy.
    }
}

/// A pending or completed asynchronous native operation.
///
/// Futures are consumed either by polling ([`Future::is_ready`] +
/// [`Future::decode`]) or by subscribing a mailbox for a completion message
/// ([`Future::subscribe`]). Dropping the last handle to a future (including
/// every [`NativeBytes`] view carved out of it) destroys the native future
/// exactly once.
pub struct Future {
    pub(crate) inner: Arc<FutureInner>,
}

impl Future {
    /// Wrap a native future pointer.
    ///
    /// # Safety
    ///
    /// `ptr` must be a live future pointer not owned by any other wrapper,
    /// and `kind` must match the operation that produced it.
    pub(crate) unsafe fn from_ptr(
        ptr: *mut TkvFuture,
        kind: ResultKind,
        refs: Vec<Arc<dyn Any + Send + Sync>>,
    ) -> Self {
        Self {
            inner: Arc::new(FutureInner { ptr, kind, refs }),
        }
    }

    /// The result kind this future was submitted with.
    pub fn kind(&self) -> ResultKind {
        self.inner.kind
    }

    /// Readiness probe. A ready future decodes without a not-ready error.
    pub fn is_ready(&self) -> bool {
        unsafe { ffi::tkv_future_is_ready(self.inner.ptr) != 0 }
    }

    /// Cancel the future. It still resolves exactly once, with the native
    /// cancellation code.
    pub fn cancel(&self) {
        unsafe { ffi::tkv_future_cancel(self.inner.ptr) }
    }

    /// Decode the future's result now.
    ///
    /// Returns the native error code verbatim if the future failed (or has
    /// not resolved yet); no payload accessor is touched in that case.
    pub fn decode(&self) -> Result<FutureResult, NativeError> {
        decode(&self.inner)
    }
}

impl fmt::Debug for Future {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Future")
            .field("kind", &self.inner.kind)
            .field("ready", &self.is_ready())
            .finish()
    }
}

/// Decode a future's native completion payload.
///
/// Shared between synchronous polling and the completion callback.
pub(crate) fn decode(inner: &Arc<FutureInner>) -> Result<FutureResult, NativeError> {
    // The failure probe comes first: payload accessors are undefined on a
    // failed future.
    let code = unsafe { ffi::tkv_future_get_error(inner.ptr) };
    check(code)?;

    unsafe {
        match inner.kind {
            ResultKind::Value => {
                let mut present = 0;
                let mut value = std::ptr::null();
                let mut length = 0;
                check(ffi::tkv_future_get_value(
                    inner.ptr,
                    &mut present,
                    &mut value,
                    &mut length,
                ))?;
                if present == 0 {
                    Ok(FutureResult::Absent)
                } else {
                    Ok(FutureResult::Bytes(NativeBytes::new(
                        inner,
                        value,
                        length as usize,
                    )))
                }
            }
            ResultKind::Key => {
                let mut key = std::ptr::null();
                let mut length = 0;
                check(ffi::tkv_future_get_key(inner.ptr, &mut key, &mut length))?;
                Ok(FutureResult::Bytes(NativeBytes::new(
                    inner,
                    key,
                    length as usize,
                )))
            }
            ResultKind::Int64 => {
                // Copied out, never viewed: the native integer is a scalar,
                // not a stable buffer.
                let mut value = 0i64;
                check(ffi::tkv_future_get_int64(inner.ptr, &mut value))?;
                Ok(FutureResult::Int(value))
            }
            ResultKind::KeyValueArray => {
                let mut array = std::ptr::null();
                let mut count = 0;
                let mut more = 0;
                check(ffi::tkv_future_get_keyvalue_array(
                    inner.ptr, &mut array, &mut count, &mut more,
                ))?;
                let mut pairs = Vec::with_capacity(count as usize);
                for i in 0..count as usize {
                    let kv = &*array.add(i);
                    pairs.push((
                        NativeBytes::new(inner, kv.key, kv.key_length as usize),
                        NativeBytes::new(inner, kv.value, kv.value_length as usize),
                    ));
                }
                Ok(FutureResult::KeyValues {
                    pairs,
                    more: more != 0,
                })
            }
            ResultKind::StringArray => {
                let mut array = std::ptr::null();
                let mut count = 0;
                check(ffi::tkv_future_get_string_array(
                    inner.ptr, &mut array, &mut count,
                ))?;
                let mut strings = Vec::with_capacity(count as usize);
                for i in 0..count as usize {
                    let bytes = CStr::from_ptr(*array.add(i)).to_bytes();
                    strings.push(NativeBytes::new(inner, bytes.as_ptr(), bytes.len()));
                }
                Ok(FutureResult::Strings(strings))
            }
            ResultKind::Commit | ResultKind::Watch | ResultKind::ErrorCheck => {
                Ok(FutureResult::Unit)
            }
        }
    }
}

/// The decoded payload of a resolved future.
#[derive(Debug, Clone)]
pub enum FutureResult {
    /// A point read found no value for the key.
    Absent,
    /// Success carries no payload (commit, watch, error-check).
    Unit,
    /// A 64-bit integer, copied out of the native future.
    Int(i64),
    /// Value or key bytes, viewed in place.
    Bytes(NativeBytes),
    /// A range batch in native return order, plus the continuation flag.
    KeyValues {
        pairs: Vec<(NativeBytes, NativeBytes)>,
        more: bool,
    },
    /// NUL-terminated strings in native return order, viewed in place.
    Strings(Vec<NativeBytes>),
}

/// A zero-copy, read-only view into memory owned by a native future.
///
/// The view holds a shared-ownership token on the future, so the native
/// payload stays allocated for exactly as long as any view is reachable,
/// including after the view has been sent to another thread in a completion
/// message. Nothing is copied.
pub struct NativeBytes {
    // Keeps the owning future (and through it, its ancestors) alive.
    owner: Arc<FutureInner>,
    ptr: *const u8,
    len: usize,
}

// Safety: the viewed memory is immutable once the future has resolved, and
// `owner` pins it for the view's whole lifetime.
unsafe impl Send for NativeBytes {}
unsafe impl Sync for NativeBytes {}

impl NativeBytes {
    fn new(owner: &Arc<FutureInner>, ptr: *const u8, len: usize) -> Self {
        Self {
            owner: Arc::clone(owner),
            ptr,
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copy the bytes out, releasing the hold on the native future.
    pub fn to_vec(&self) -> Vec<u8> {
        self.as_ref().to_vec()
    }
}

impl Deref for NativeBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        if self.len == 0 {
            return &[];
        }
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }
}

impl AsRef<[u8]> for NativeBytes {
    fn as_ref(&self) -> &[u8] {
        self
    }
}

impl Clone for NativeBytes {
    fn clone(&self) -> Self {
        Self {
            owner: Arc::clone(&self.owner),
            ptr: self.ptr,
            len: self.len,
        }
    }
}

impl fmt::Debug for NativeBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.as_ref(), f)
    }
}

impl PartialEq for NativeBytes {
    fn eq(&self, other: &Self) -> bool {
        self.as_ref() == other.as_ref()
    }
}

impl Eq for NativeBytes {}

impl PartialEq<[u8]> for NativeBytes {
    fn eq(&self, other: &[u8]) -> bool {
        self.as_ref() == other
    }
}

impl PartialEq<&[u8]> for NativeBytes {
    fn eq(&self, other: &&[u8]) -> bool {
        self.as_ref() == *other
    }
}
