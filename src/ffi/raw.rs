//! Raw C function bindings for libtkv_c.
//!
//! This module contains the direct FFI declarations. Users should prefer the
//! safe Rust wrappers in the parent modules. With the `stub-native` feature
//! the symbols are provided by [`super::stub`] instead of the real client.

use std::os::raw::{c_char, c_int, c_void};

use super::handles::*;

/// Error code returned by native calls. Zero means success; every other
/// value is an opaque code resolvable via [`tkv_get_error`].
pub type TkvErrorCode = c_int;

pub const TKV_OK: TkvErrorCode = 0;

// Error-predicate kinds accepted by tkv_error_predicate.
pub const TKV_PREDICATE_RETRYABLE: c_int = 1;
pub const TKV_PREDICATE_MAYBE_COMMITTED: c_int = 2;
pub const TKV_PREDICATE_RETRYABLE_NOT_COMMITTED: c_int = 3;

/// One key/value pair inside a range-read result. The pointers alias memory
/// owned by the future that produced the array.
#[repr(C)]
pub struct TkvKeyValue {
    pub key: *const u8,
    pub key_length: c_int,
    pub value: *const u8,
    pub value_length: c_int,
}

/// Completion callback installed with [`tkv_future_set_callback`]. Invoked
/// exactly once per future, on a thread owned by the native library.
pub type TkvCallback = unsafe extern "C" fn(future: *mut TkvFuture, param: *mut c_void);

extern "C" {
    // API version negotiation
    pub fn tkv_get_max_api_version() -> c_int;
    pub fn tkv_select_api_version(runtime_version: c_int, header_version: c_int) -> TkvErrorCode;

    // Error utilities
    pub fn tkv_get_error(code: TkvErrorCode) -> *const c_char;
    pub fn tkv_error_predicate(predicate: c_int, code: TkvErrorCode) -> c_int;

    // Network event loop. setup must precede run; run blocks the calling
    // thread until stop is called from another thread.
    pub fn tkv_network_set_option(code: c_int, value: *const u8, length: c_int) -> TkvErrorCode;
    pub fn tkv_setup_network() -> TkvErrorCode;
    pub fn tkv_run_network() -> TkvErrorCode;
    pub fn tkv_stop_network() -> TkvErrorCode;

    // Database
    pub fn tkv_create_database(
        cluster_file: *const c_char,
        out: *mut *mut TkvDatabase,
    ) -> TkvErrorCode;
    pub fn tkv_database_set_option(
        db: *mut TkvDatabase,
        code: c_int,
        value: *const u8,
        length: c_int,
    ) -> TkvErrorCode;
    pub fn tkv_database_create_transaction(
        db: *mut TkvDatabase,
        out: *mut *mut TkvTransaction,
    ) -> TkvErrorCode;
    pub fn tkv_database_destroy(db: *mut TkvDatabase);

    // Transaction: buffered mutations (no future)
    pub fn tkv_transaction_set_option(
        tr: *mut TkvTransaction,
        code: c_int,
        value: *const u8,
        length: c_int,
    ) -> TkvErrorCode;
    pub fn tkv_transaction_set(
        tr: *mut TkvTransaction,
        key: *const u8,
        key_length: c_int,
        value: *const u8,
        value_length: c_int,
    );
    pub fn tkv_transaction_clear(tr: *mut TkvTransaction, key: *const u8, key_length: c_int);
    pub fn tkv_transaction_clear_range(
        tr: *mut TkvTransaction,
        begin_key: *const u8,
        begin_key_length: c_int,
        end_key: *const u8,
        end_key_length: c_int,
    );
    pub fn tkv_transaction_atomic_op(
        tr: *mut TkvTransaction,
        key: *const u8,
        key_length: c_int,
        param: *const u8,
        param_length: c_int,
        operation_type: c_int,
    );

    // Transaction: asynchronous operations, each returning a future
    pub fn tkv_transaction_get(
        tr: *mut TkvTransaction,
        key: *const u8,
        key_length: c_int,
        snapshot: c_int,
    ) -> *mut TkvFuture;
    pub fn tkv_transaction_get_key(
        tr: *mut TkvTransaction,
        key: *const u8,
        key_length: c_int,
        or_equal: c_int,
        offset: c_int,
        snapshot: c_int,
    ) -> *mut TkvFuture;
    pub fn tkv_transaction_get_range(
        tr: *mut TkvTransaction,
        begin_key: *const u8,
        begin_key_length: c_int,
        end_key: *const u8,
        end_key_length: c_int,
        limit: c_int,
        reverse: c_int,
        snapshot: c_int,
    ) -> *mut TkvFuture;
    pub fn tkv_transaction_get_read_version(tr: *mut TkvTransaction) -> *mut TkvFuture;
    pub fn tkv_transaction_get_addresses_for_key(
        tr: *mut TkvTransaction,
        key: *const u8,
        key_length: c_int,
    ) -> *mut TkvFuture;
    pub fn tkv_transaction_watch(
        tr: *mut TkvTransaction,
        key: *const u8,
        key_length: c_int,
    ) -> *mut TkvFuture;
    pub fn tkv_transaction_commit(tr: *mut TkvTransaction) -> *mut TkvFuture;
    pub fn tkv_transaction_on_error(tr: *mut TkvTransaction, code: TkvErrorCode)
        -> *mut TkvFuture;
    pub fn tkv_transaction_cancel(tr: *mut TkvTransaction);
    pub fn tkv_transaction_destroy(tr: *mut TkvTransaction);

    // Future probes and typed payload accessors. The accessors are undefined
    // on a future whose tkv_future_get_error is nonzero.
    pub fn tkv_future_is_ready(future: *mut TkvFuture) -> c_int;
    pub fn tkv_future_get_error(future: *mut TkvFuture) -> TkvErrorCode;
    pub fn tkv_future_set_callback(
        future: *mut TkvFuture,
        callback: TkvCallback,
        param: *mut c_void,
    ) -> TkvErrorCode;
    pub fn tkv_future_get_value(
        future: *mut TkvFuture,
        present: *mut c_int,
        value: *mut *const u8,
        length: *mut c_int,
    ) -> TkvErrorCode;
    pub fn tkv_future_get_key(
        future: *mut TkvFuture,
        key: *mut *const u8,
        length: *mut c_int,
    ) -> TkvErrorCode;
    pub fn tkv_future_get_int64(future: *mut TkvFuture, out: *mut i64) -> TkvErrorCode;
    pub fn tkv_future_get_keyvalue_array(
        future: *mut TkvFuture,
        out: *mut *const TkvKeyValue,
        count: *mut c_int,
        more: *mut c_int,
    ) -> TkvErrorCode;
    pub fn tkv_future_get_string_array(
        future: *mut TkvFuture,
        out: *mut *const *const c_char,
        count: *mut c_int,
    ) -> TkvErrorCode;
    pub fn tkv_future_cancel(future: *mut TkvFuture);
    pub fn tkv_future_destroy(future: *mut TkvFuture);
}
