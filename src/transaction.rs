//! Transaction handles and operation submission.

use std::any::Any;
use std::sync::Arc;

use crate::database::DatabaseInner;
use crate::error::{NativeError, Result};
use crate::ffi::{self, check, TkvTransaction};
use crate::future::{Future, ResultKind};
use crate::options::OptionValue;

/// Owns the native transaction pointer plus a shared-ownership token on the
/// database it was created from, so the database outlives it regardless of
/// drop order on the host side.
pub(crate) struct TransactionInner {
    ptr: *mut TkvTransaction,
    _db: Arc<DatabaseInner>,
}

// Safety: a transaction handle may be used from several threads at once;
// the native client synchronizes access to it internally (we add no locks).
unsafe impl Send for TransactionInner {}
unsafe impl Sync for TransactionInner {}

impl Drop for TransactionInner {
    fn drop(&mut self) {
        unsafe {
            ffi::tkv_transaction_destroy(self.ptr);
        }
        // `_db` drops afterwards: the database outlives the native destroy.
    }
}

/// A handle to a transaction.
///
/// Operations may be issued concurrently from multiple threads; each
/// asynchronous operation returns a [`Future`] that keeps this transaction
/// (and its database) alive until the result has been fully consumed.
#[derive(Clone)]
pub struct Transaction {
    inner: Arc<TransactionInner>,
}

impl Transaction {
    /// # Safety
    ///
    /// `ptr` must be a live transaction pointer not owned by another wrapper.
    pub(crate) unsafe fn from_ptr(ptr: *mut TkvTransaction, db: Arc<DatabaseInner>) -> Self {
        Self {
            inner: Arc::new(TransactionInner { ptr, _db: db }),
        }
    }

    /// The keep-alive token futures issued against this transaction carry.
    fn keep_alive(&self) -> Vec<Arc<dyn Any + Send + Sync>> {
        let token: Arc<dyn Any + Send + Sync> = self.inner.clone();
        vec![token]
    }

    /// Set a transaction option (opaque code passthrough).
    pub fn set_option(&self, code: i32, value: OptionValue<'_>) -> Result<()> {
        let encoded = value.encode();
        let code = unsafe {
            ffi::tkv_transaction_set_option(self.inner.ptr, code, encoded.as_ptr(), encoded.len())
        };
        check(code)?;
        Ok(())
    }

    /// Buffer a write of `value` under `key`. Takes effect at commit.
    pub fn set(&self, key: &[u8], value: &[u8]) {
        unsafe {
            ffi::tkv_transaction_set(
                self.inner.ptr,
                key.as_ptr(),
                key.len() as i32,
                value.as_ptr(),
                value.len() as i32,
            );
        }
    }

    /// Buffer a delete of `key`.
    pub fn clear(&self, key: &[u8]) {
        unsafe {
            ffi::tkv_transaction_clear(self.inner.ptr, key.as_ptr(), key.len() as i32);
        }
    }

    /// Buffer a delete of every key in `[begin, end)`.
    pub fn clear_range(&self, begin: &[u8], end: &[u8]) {
        unsafe {
            ffi::tkv_transaction_clear_range(
                self.inner.ptr,
                begin.as_ptr(),
                begin.len() as i32,
                end.as_ptr(),
                end.len() as i32,
            );
        }
    }

    /// Buffer an atomic mutation of `key`. The opcode is an opaque integer
    /// passed through to the native client unchanged.
    pub fn atomic_op(&self, key: &[u8], param: &[u8], operation: i32) {
        unsafe {
            ffi::tkv_transaction_atomic_op(
                self.inner.ptr,
                key.as_ptr(),
                key.len() as i32,
                param.as_ptr(),
                param.len() as i32,
                operation,
            );
        }
    }

    /// Read the value of `key`. Resolves to bytes or absent.
    pub fn get(&self, key: &[u8], snapshot: bool) -> Future {
        let ptr = unsafe {
            ffi::tkv_transaction_get(
                self.inner.ptr,
                key.as_ptr(),
                key.len() as i32,
                snapshot as i32,
            )
        };
        unsafe { Future::from_ptr(ptr, ResultKind::Value, self.keep_alive()) }
    }

    /// Resolve a key selector: the first existing key at or after `key`
    /// (`or_equal` controls whether `key` itself counts), stepped by
    /// `offset` keys. Resolves to a single key.
    pub fn get_key(&self, key: &[u8], or_equal: bool, offset: i32, snapshot: bool) -> Future {
        let ptr = unsafe {
            ffi::tkv_transaction_get_key(
                self.inner.ptr,
                key.as_ptr(),
                key.len() as i32,
                or_equal as i32,
                offset,
                snapshot as i32,
            )
        };
        unsafe { Future::from_ptr(ptr, ResultKind::Key, self.keep_alive()) }
    }

    /// Read up to `limit` key/value pairs from `[begin, end)` (`limit` of 0
    /// means no limit). Resolves to a batch in native return order plus a
    /// flag signalling more data beyond the batch.
    pub fn get_range(
        &self,
        begin: &[u8],
        end: &[u8],
        limit: i32,
        reverse: bool,
        snapshot: bool,
    ) -> Future {
        let ptr = unsafe {
            ffi::tkv_transaction_get_range(
                self.inner.ptr,
                begin.as_ptr(),
                begin.len() as i32,
                end.as_ptr(),
                end.len() as i32,
                limit,
                reverse as i32,
                snapshot as i32,
            )
        };
        unsafe { Future::from_ptr(ptr, ResultKind::KeyValueArray, self.keep_alive()) }
    }

    /// Read the transaction's read version. Resolves to a 64-bit integer.
    pub fn get_read_version(&self) -> Future {
        let ptr = unsafe { ffi::tkv_transaction_get_read_version(self.inner.ptr) };
        unsafe { Future::from_ptr(ptr, ResultKind::Int64, self.keep_alive()) }
    }

    /// Look up the storage addresses holding `key`. Resolves to an array of
    /// strings in native return order.
    pub fn get_addresses_for_key(&self, key: &[u8]) -> Future {
        let ptr = unsafe {
            ffi::tkv_transaction_get_addresses_for_key(
                self.inner.ptr,
                key.as_ptr(),
                key.len() as i32,
            )
        };
        unsafe { Future::from_ptr(ptr, ResultKind::StringArray, self.keep_alive()) }
    }

    /// Watch `key` for a change. Resolves (to unit) when the key's value
    /// changes, or with an error if the watch is cancelled.
    ///
    /// The returned future carries no keep-alive reference: a watch outlives
    /// the transaction that registered it.
    pub fn watch(&self, key: &[u8]) -> Future {
        let ptr = unsafe {
            ffi::tkv_transaction_watch(self.inner.ptr, key.as_ptr(), key.len() as i32)
        };
        unsafe { Future::from_ptr(ptr, ResultKind::Watch, Vec::new()) }
    }

    /// Commit the buffered mutations. Resolves to unit on success; a
    /// conflict surfaces as the native conflict code, retryable via
    /// [`on_error`](Transaction::on_error).
    pub fn commit(&self) -> Future {
        let ptr = unsafe { ffi::tkv_transaction_commit(self.inner.ptr) };
        unsafe { Future::from_ptr(ptr, ResultKind::Commit, self.keep_alive()) }
    }

    /// Hand a failed operation's code back to the native client. Resolves
    /// to unit if the transaction was reset for retry, or re-raises the
    /// code if it is not retryable.
    pub fn on_error(&self, error: NativeError) -> Future {
        let ptr = unsafe { ffi::tkv_transaction_on_error(self.inner.ptr, error.code()) };
        unsafe { Future::from_ptr(ptr, ResultKind::ErrorCheck, self.keep_alive()) }
    }

    /// Cancel the transaction. Pending futures issued against it still
    /// resolve exactly once, with the native cancellation code.
    pub fn cancel(&self) {
        unsafe {
            ffi::tkv_transaction_cancel(self.inner.ptr);
        }
    }
}
