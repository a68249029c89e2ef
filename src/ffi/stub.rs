//! In-process simulation of libtkv_c.
//!
//! Compiled in with the `stub-native` feature, this module defines the
//! `tkv_*` symbols the crate otherwise expects from the real client, backed
//! by an in-memory store. It exists so the crate builds and its test-suite
//! runs without the native client installed.
//!
//! The stub honours the parts of the native contract the bridge depends on:
//! futures resolve exactly once; completion callbacks fire on a thread the
//! host does not own; payload memory stays valid until the owning future is
//! destroyed; destroy calls free the object immediately, trusting the
//! caller to have kept ancestors alive. It also enforces the contract the
//! bridge must uphold: payload accessors *abort* when invoked on a failed
//! or unresolved future.
//!
//! [`control`] exposes live-object counters and error injection for tests.

use std::collections::BTreeMap;
use std::ffi::CString;
use std::os::raw::{c_char, c_int, c_void};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::{Condvar, Mutex};

use super::handles::{TkvDatabase, TkvFuture, TkvTransaction};
use super::raw::{
    TkvCallback, TkvErrorCode, TkvKeyValue, TKV_OK, TKV_PREDICATE_MAYBE_COMMITTED,
    TKV_PREDICATE_RETRYABLE, TKV_PREDICATE_RETRYABLE_NOT_COMMITTED,
};

const MAX_API_VERSION: c_int = 710;

// ---------------------------------------------------------------------------
// Test-control surface
// ---------------------------------------------------------------------------

pub mod control {
    use std::sync::atomic::Ordering;

    /// Error codes the stub's tables know about.
    pub const ERR_NOT_COMMITTED: i32 = 1020;
    pub const ERR_COMMIT_UNKNOWN_RESULT: i32 = 1021;
    pub const ERR_OPERATION_CANCELLED: i32 = 1025;
    pub const ERR_TIMED_OUT: i32 = 1031;
    pub const ERR_INVALID_OPTION_VALUE: i32 = 2006;
    pub const ERR_NETWORK_NOT_SETUP: i32 = 2008;
    pub const ERR_NETWORK_ALREADY_SETUP: i32 = 2009;
    pub const ERR_FUTURE_NOT_RESOLVED: i32 = 2015;
    pub const ERR_API_VERSION_UNSET: i32 = 2200;
    pub const ERR_API_VERSION_ALREADY_SET: i32 = 2201;
    pub const ERR_API_VERSION_NOT_SUPPORTED: i32 = 2203;

    /// Atomic-mutation opcode the stub implements as 64-bit little-endian
    /// wrapping addition. Every other opcode degrades to overwrite.
    pub const MUTATION_ADD: i32 = 0;

    /// Number of native database objects currently alive.
    pub fn live_databases() -> usize {
        super::LIVE_DATABASES.load(Ordering::SeqCst)
    }

    /// Number of native transaction objects currently alive.
    pub fn live_transactions() -> usize {
        super::LIVE_TRANSACTIONS.load(Ordering::SeqCst)
    }

    /// Number of native future objects currently alive.
    pub fn live_futures() -> usize {
        super::LIVE_FUTURES.load(Ordering::SeqCst)
    }

    /// Make the next commit (process-wide) resolve with `code`.
    pub fn fail_next_commit(code: i32) {
        *super::FAIL_NEXT_COMMIT.lock() = Some(code);
    }

    /// Make the next point read (process-wide) resolve with `code`.
    pub fn fail_next_get(code: i32) {
        *super::FAIL_NEXT_GET.lock() = Some(code);
    }
}

use self::control::*;

static LIVE_DATABASES: AtomicUsize = AtomicUsize::new(0);
static LIVE_TRANSACTIONS: AtomicUsize = AtomicUsize::new(0);
static LIVE_FUTURES: AtomicUsize = AtomicUsize::new(0);

static FAIL_NEXT_COMMIT: Mutex<Option<c_int>> = Mutex::new(None);
static FAIL_NEXT_GET: Mutex<Option<c_int>> = Mutex::new(None);

// ---------------------------------------------------------------------------
// API version and network loop
// ---------------------------------------------------------------------------

static API_SELECTED: AtomicBool = AtomicBool::new(false);

#[derive(Clone, Copy, PartialEq, Eq)]
enum NetState {
    Unset,
    Setup,
    Running,
    Stopped,
}

static NET: Mutex<NetState> = Mutex::new(NetState::Unset);
static NET_CV: Condvar = Condvar::new();

#[no_mangle]
pub unsafe extern "C" fn tkv_get_max_api_version() -> c_int {
    MAX_API_VERSION
}

#[no_mangle]
pub unsafe extern "C" fn tkv_select_api_version(
    runtime_version: c_int,
    _header_version: c_int,
) -> TkvErrorCode {
    if runtime_version <= 0 || runtime_version > MAX_API_VERSION {
        return ERR_API_VERSION_NOT_SUPPORTED;
    }
    if API_SELECTED.swap(true, Ordering::SeqCst) {
        return ERR_API_VERSION_ALREADY_SET;
    }
    TKV_OK
}

#[no_mangle]
pub unsafe extern "C" fn tkv_network_set_option(
    _code: c_int,
    value: *const u8,
    length: c_int,
) -> TkvErrorCode {
    if value.is_null() && length > 0 {
        return ERR_INVALID_OPTION_VALUE;
    }
    TKV_OK
}

#[no_mangle]
pub unsafe extern "C" fn tkv_setup_network() -> TkvErrorCode {
    if !API_SELECTED.load(Ordering::SeqCst) {
        return ERR_API_VERSION_UNSET;
    }
    let mut state = NET.lock();
    match *state {
        NetState::Unset => {
            *state = NetState::Setup;
            TKV_OK
        }
        _ => ERR_NETWORK_ALREADY_SETUP,
    }
}

#[no_mangle]
pub unsafe extern "C" fn tkv_run_network() -> TkvErrorCode {
    let mut state = NET.lock();
    match *state {
        NetState::Setup => *state = NetState::Running,
        // Stop can win the race against the loop thread; that is a clean
        // shutdown, not a misuse.
        NetState::Stopped => return TKV_OK,
        _ => return ERR_NETWORK_NOT_SETUP,
    }
    while *state != NetState::Stopped {
        NET_CV.wait(&mut state);
    }
    TKV_OK
}

#[no_mangle]
pub unsafe extern "C" fn tkv_stop_network() -> TkvErrorCode {
    let mut state = NET.lock();
    *state = NetState::Stopped;
    NET_CV.notify_all();
    TKV_OK
}

// ---------------------------------------------------------------------------
// Error table and predicates
// ---------------------------------------------------------------------------

fn error_cstr(code: TkvErrorCode) -> &'static [u8] {
    match code {
        TKV_OK => b"success\0",
        ERR_NOT_COMMITTED => b"transaction not committed due to conflict\0",
        ERR_COMMIT_UNKNOWN_RESULT => b"commit result unknown\0",
        ERR_OPERATION_CANCELLED => b"operation cancelled\0",
        ERR_TIMED_OUT => b"operation timed out\0",
        ERR_NETWORK_NOT_SETUP => b"network not setup\0",
        ERR_NETWORK_ALREADY_SETUP => b"network already setup\0",
        ERR_FUTURE_NOT_RESOLVED => b"future has not resolved\0",
        ERR_API_VERSION_UNSET => b"api version not selected\0",
        ERR_API_VERSION_ALREADY_SET => b"api version already selected\0",
        ERR_API_VERSION_NOT_SUPPORTED => b"api version not supported\0",
        _ => b"unknown error\0",
    }
}

#[no_mangle]
pub unsafe extern "C" fn tkv_get_error(code: TkvErrorCode) -> *const c_char {
    error_cstr(code).as_ptr() as *const c_char
}

#[no_mangle]
pub unsafe extern "C" fn tkv_error_predicate(predicate: c_int, code: TkvErrorCode) -> c_int {
    let hit = match predicate {
        TKV_PREDICATE_RETRYABLE => {
            matches!(code, ERR_NOT_COMMITTED | ERR_COMMIT_UNKNOWN_RESULT | ERR_TIMED_OUT)
        }
        TKV_PREDICATE_MAYBE_COMMITTED => code == ERR_COMMIT_UNKNOWN_RESULT,
        TKV_PREDICATE_RETRYABLE_NOT_COMMITTED => {
            matches!(code, ERR_NOT_COMMITTED | ERR_TIMED_OUT)
        }
        _ => false,
    };
    hit as c_int
}

// ---------------------------------------------------------------------------
// Futures
// ---------------------------------------------------------------------------

enum Payload {
    None,
    Value(Option<Vec<u8>>),
    Key(Vec<u8>),
    Int(i64),
    KeyValues {
        cells: Vec<TkvKeyValue>,
        more: c_int,
        // Backing storage for the cell pointers; never touched directly.
        _data: Vec<(Vec<u8>, Vec<u8>)>,
    },
    Strings {
        ptrs: Vec<*const c_char>,
        _data: Vec<CString>,
    },
}

impl Payload {
    fn keyvalues(pairs: Vec<(Vec<u8>, Vec<u8>)>, more: bool) -> Payload {
        let cells = pairs
            .iter()
            .map(|(k, v)| TkvKeyValue {
                key: k.as_ptr(),
                key_length: k.len() as c_int,
                value: v.as_ptr(),
                value_length: v.len() as c_int,
            })
            .collect();
        Payload::KeyValues {
            cells,
            more: more as c_int,
            _data: pairs,
        }
    }

    fn strings(values: Vec<CString>) -> Payload {
        let ptrs = values.iter().map(|s| s.as_ptr()).collect();
        Payload::Strings {
            ptrs,
            _data: values,
        }
    }
}

struct ReadyState {
    error: TkvErrorCode,
    payload: Payload,
}

enum FutureState {
    Pending(Option<CallbackCell>),
    Ready(ReadyState),
}

struct StubFuture {
    state: Mutex<FutureState>,
}

// Safety: all state sits behind a mutex; payload pointers refer to heap
// buffers owned by the same struct.
unsafe impl Send for StubFuture {}
unsafe impl Sync for StubFuture {}

impl StubFuture {
    fn pending() -> Arc<StubFuture> {
        LIVE_FUTURES.fetch_add(1, Ordering::SeqCst);
        Arc::new(StubFuture {
            state: Mutex::new(FutureState::Pending(None)),
        })
    }

    fn ready(error: TkvErrorCode, payload: Payload) -> Arc<StubFuture> {
        LIVE_FUTURES.fetch_add(1, Ordering::SeqCst);
        Arc::new(StubFuture {
            state: Mutex::new(FutureState::Ready(ReadyState { error, payload })),
        })
    }

    /// Transition to ready and fire any stored callback. A future resolves
    /// at most once; later calls are no-ops.
    fn resolve(&self, error: TkvErrorCode, payload: Payload) {
        let mut state = self.state.lock();
        if let FutureState::Pending(cell) = &mut *state {
            let cell = cell.take();
            *state = FutureState::Ready(ReadyState { error, payload });
            drop(state);
            if let Some(cell) = cell {
                fire(cell);
            }
        }
    }

    fn is_resolved(&self) -> bool {
        matches!(*self.state.lock(), FutureState::Ready(_))
    }
}

impl Drop for StubFuture {
    fn drop(&mut self) {
        LIVE_FUTURES.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A registered completion callback plus the future pointer it was
/// registered against, shipped to the firing thread.
struct CallbackCell {
    callback: TkvCallback,
    param: *mut c_void,
    future: *mut TkvFuture,
}

// Safety: the cell is only moved to the callback thread, never shared.
unsafe impl Send for CallbackCell {}

/// Invoke a completion callback the way the real client does: from a thread
/// the host runtime does not own.
fn fire(cell: CallbackCell) {
    thread::Builder::new()
        .name("tkv-stub-callback".into())
        .spawn(move || {
            // Force the whole cell (which is `Send`) to be captured, rather
            // than its individual non-`Send` fields (Rust 2021 disjoint
            // closure captures).
            let cell = cell;
            unsafe { (cell.callback)(cell.future, cell.param) }
        })
        .expect("failed to spawn stub callback thread");
}

unsafe fn future_ref<'a>(ptr: *mut TkvFuture) -> &'a StubFuture {
    &*(ptr as *const StubFuture)
}

fn into_handle(future: Arc<StubFuture>) -> *mut TkvFuture {
    Arc::into_raw(future) as *mut TkvFuture
}

#[no_mangle]
pub unsafe extern "C" fn tkv_future_is_ready(future: *mut TkvFuture) -> c_int {
    future_ref(future).is_resolved() as c_int
}

#[no_mangle]
pub unsafe extern "C" fn tkv_future_get_error(future: *mut TkvFuture) -> TkvErrorCode {
    match &*future_ref(future).state.lock() {
        FutureState::Pending(_) => ERR_FUTURE_NOT_RESOLVED,
        FutureState::Ready(ready) => ready.error,
    }
}

#[no_mangle]
pub unsafe extern "C" fn tkv_future_set_callback(
    future: *mut TkvFuture,
    callback: TkvCallback,
    param: *mut c_void,
) -> TkvErrorCode {
    let fut = future_ref(future);
    let cell = CallbackCell {
        callback,
        param,
        future,
    };
    let mut state = fut.state.lock();
    match &mut *state {
        FutureState::Pending(slot) => {
            *slot = Some(cell);
            TKV_OK
        }
        FutureState::Ready(_) => {
            drop(state);
            fire(cell);
            TKV_OK
        }
    }
}

/// Payload accessors abort on misuse: reading a failed or unresolved future
/// is a bridge bug, not a recoverable condition.
fn ready_payload<'a>(
    state: &'a parking_lot::MutexGuard<'_, FutureState>,
    accessor: &str,
) -> &'a ReadyState {
    match &**state {
        FutureState::Pending(_) => panic!("{accessor} called on an unresolved future"),
        FutureState::Ready(ready) => {
            if ready.error != TKV_OK {
                panic!("{accessor} called on a failed future (code {})", ready.error);
            }
            ready
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn tkv_future_get_value(
    future: *mut TkvFuture,
    present: *mut c_int,
    value: *mut *const u8,
    length: *mut c_int,
) -> TkvErrorCode {
    let state = future_ref(future).state.lock();
    let ready = ready_payload(&state, "tkv_future_get_value");
    match &ready.payload {
        Payload::Value(Some(bytes)) => {
            *present = 1;
            *value = bytes.as_ptr();
            *length = bytes.len() as c_int;
        }
        Payload::Value(None) => {
            *present = 0;
            *value = std::ptr::null();
            *length = 0;
        }
        _ => panic!("tkv_future_get_value called on a non-value future"),
    }
    TKV_OK
}

#[no_mangle]
pub unsafe extern "C" fn tkv_future_get_key(
    future: *mut TkvFuture,
    key: *mut *const u8,
    length: *mut c_int,
) -> TkvErrorCode {
    let state = future_ref(future).state.lock();
    let ready = ready_payload(&state, "tkv_future_get_key");
    match &ready.payload {
        Payload::Key(bytes) => {
            *key = bytes.as_ptr();
            *length = bytes.len() as c_int;
        }
        _ => panic!("tkv_future_get_key called on a non-key future"),
    }
    TKV_OK
}

#[no_mangle]
pub unsafe extern "C" fn tkv_future_get_int64(
    future: *mut TkvFuture,
    out: *mut i64,
) -> TkvErrorCode {
    let state = future_ref(future).state.lock();
    let ready = ready_payload(&state, "tkv_future_get_int64");
    match &ready.payload {
        Payload::Int(value) => *out = *value,
        _ => panic!("tkv_future_get_int64 called on a non-integer future"),
    }
    TKV_OK
}

#[no_mangle]
pub unsafe extern "C" fn tkv_future_get_keyvalue_array(
    future: *mut TkvFuture,
    out: *mut *const TkvKeyValue,
    count: *mut c_int,
    more: *mut c_int,
) -> TkvErrorCode {
    let state = future_ref(future).state.lock();
    let ready = ready_payload(&state, "tkv_future_get_keyvalue_array");
    match &ready.payload {
        Payload::KeyValues {
            cells,
            more: more_flag,
            ..
        } => {
            *out = cells.as_ptr();
            *count = cells.len() as c_int;
            *more = *more_flag;
        }
        _ => panic!("tkv_future_get_keyvalue_array called on a non-batch future"),
    }
    TKV_OK
}

#[no_mangle]
pub unsafe extern "C" fn tkv_future_get_string_array(
    future: *mut TkvFuture,
    out: *mut *const *const c_char,
    count: *mut c_int,
) -> TkvErrorCode {
    let state = future_ref(future).state.lock();
    let ready = ready_payload(&state, "tkv_future_get_string_array");
    match &ready.payload {
        Payload::Strings { ptrs, .. } => {
            *out = ptrs.as_ptr();
            *count = ptrs.len() as c_int;
        }
        _ => panic!("tkv_future_get_string_array called on a non-string-array future"),
    }
    TKV_OK
}

#[no_mangle]
pub unsafe extern "C" fn tkv_future_cancel(future: *mut TkvFuture) {
    future_ref(future).resolve(ERR_OPERATION_CANCELLED, Payload::None);
}

#[no_mangle]
pub unsafe extern "C" fn tkv_future_destroy(future: *mut TkvFuture) {
    drop(Arc::from_raw(future as *const StubFuture));
}

// ---------------------------------------------------------------------------
// Databases
// ---------------------------------------------------------------------------

struct StubWatch {
    key: Vec<u8>,
    future: Arc<StubFuture>,
}

struct StubDatabase {
    store: Mutex<BTreeMap<Vec<u8>, Vec<u8>>>,
    version: AtomicI64,
    watches: Mutex<Vec<StubWatch>>,
}

impl StubDatabase {
    fn new() -> StubDatabase {
        LIVE_DATABASES.fetch_add(1, Ordering::SeqCst);
        StubDatabase {
            store: Mutex::new(BTreeMap::new()),
            version: AtomicI64::new(1),
            watches: Mutex::new(Vec::new()),
        }
    }

    /// Resolve every pending watch whose key is in `changed`, and forget
    /// watches that already resolved elsewhere (e.g. cancellation).
    fn trigger_watches(&self, changed: &dyn Fn(&[u8]) -> bool) {
        let mut watches = self.watches.lock();
        watches.retain(|watch| {
            if watch.future.is_resolved() {
                return false;
            }
            if changed(&watch.key) {
                watch.future.resolve(TKV_OK, Payload::None);
                return false;
            }
            true
        });
    }
}

impl Drop for StubDatabase {
    fn drop(&mut self) {
        // Outstanding watches die with the database.
        for watch in self.watches.lock().drain(..) {
            watch.future.resolve(ERR_OPERATION_CANCELLED, Payload::None);
        }
        LIVE_DATABASES.fetch_sub(1, Ordering::SeqCst);
    }
}

#[no_mangle]
pub unsafe extern "C" fn tkv_create_database(
    _cluster_file: *const c_char,
    out: *mut *mut TkvDatabase,
) -> TkvErrorCode {
    let db = Box::new(StubDatabase::new());
    *out = Box::into_raw(db) as *mut TkvDatabase;
    TKV_OK
}

#[no_mangle]
pub unsafe extern "C" fn tkv_database_set_option(
    _db: *mut TkvDatabase,
    _code: c_int,
    value: *const u8,
    length: c_int,
) -> TkvErrorCode {
    if value.is_null() && length > 0 {
        return ERR_INVALID_OPTION_VALUE;
    }
    TKV_OK
}

#[no_mangle]
pub unsafe extern "C" fn tkv_database_create_transaction(
    db: *mut TkvDatabase,
    out: *mut *mut TkvTransaction,
) -> TkvErrorCode {
    let tr = Box::new(StubTransaction::new(db as *const StubDatabase));
    *out = Box::into_raw(tr) as *mut TkvTransaction;
    TKV_OK
}

#[no_mangle]
pub unsafe extern "C" fn tkv_database_destroy(db: *mut TkvDatabase) {
    drop(Box::from_raw(db as *mut StubDatabase));
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

enum WriteOp {
    Set(Vec<u8>, Vec<u8>),
    Clear(Vec<u8>),
    ClearRange(Vec<u8>, Vec<u8>),
    Atomic(Vec<u8>, Vec<u8>, c_int),
}

struct StubTransaction {
    // Raw like the real client: the bridge keeps the database alive.
    db: *const StubDatabase,
    writes: Mutex<Vec<WriteOp>>,
    watches: Mutex<Vec<Arc<StubFuture>>>,
    cancelled: AtomicBool,
}

// Safety: interior state is mutex-guarded; the db pointer is only read.
unsafe impl Send for StubTransaction {}
unsafe impl Sync for StubTransaction {}

impl StubTransaction {
    fn new(db: *const StubDatabase) -> StubTransaction {
        LIVE_TRANSACTIONS.fetch_add(1, Ordering::SeqCst);
        StubTransaction {
            db,
            writes: Mutex::new(Vec::new()),
            watches: Mutex::new(Vec::new()),
            cancelled: AtomicBool::new(false),
        }
    }

    fn db(&self) -> &StubDatabase {
        unsafe { &*self.db }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// The transaction's view of the store: committed data with this
    /// transaction's buffered writes applied in order.
    fn effective(&self) -> BTreeMap<Vec<u8>, Vec<u8>> {
        let mut map = self.db().store.lock().clone();
        for op in self.writes.lock().iter() {
            apply(&mut map, op);
        }
        map
    }
}

impl Drop for StubTransaction {
    fn drop(&mut self) {
        LIVE_TRANSACTIONS.fetch_sub(1, Ordering::SeqCst);
    }
}

fn apply(map: &mut BTreeMap<Vec<u8>, Vec<u8>>, op: &WriteOp) {
    match op {
        WriteOp::Set(key, value) => {
            map.insert(key.clone(), value.clone());
        }
        WriteOp::Clear(key) => {
            map.remove(key);
        }
        WriteOp::ClearRange(begin, end) => {
            if begin < end {
                let doomed: Vec<Vec<u8>> = map
                    .range(begin.clone()..end.clone())
                    .map(|(k, _)| k.clone())
                    .collect();
                for key in doomed {
                    map.remove(&key);
                }
            }
        }
        WriteOp::Atomic(key, param, op) => {
            let value = if *op == MUTATION_ADD {
                let current = map.get(key).map(|v| le_int(v)).unwrap_or(0);
                current.wrapping_add(le_int(param)).to_le_bytes().to_vec()
            } else {
                param.clone()
            };
            map.insert(key.clone(), value);
        }
    }
}

/// Zero-extend up to the first 8 bytes of `bytes` into a little-endian u64.
fn le_int(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    let n = bytes.len().min(8);
    buf[..n].copy_from_slice(&bytes[..n]);
    u64::from_le_bytes(buf)
}

unsafe fn transaction_ref<'a>(ptr: *mut TkvTransaction) -> &'a StubTransaction {
    &*(ptr as *const StubTransaction)
}

unsafe fn bytes<'a>(ptr: *const u8, length: c_int) -> &'a [u8] {
    if length <= 0 {
        &[]
    } else {
        std::slice::from_raw_parts(ptr, length as usize)
    }
}

#[no_mangle]
pub unsafe extern "C" fn tkv_transaction_set_option(
    _tr: *mut TkvTransaction,
    _code: c_int,
    value: *const u8,
    length: c_int,
) -> TkvErrorCode {
    if value.is_null() && length > 0 {
        return ERR_INVALID_OPTION_VALUE;
    }
    TKV_OK
}

#[no_mangle]
pub unsafe extern "C" fn tkv_transaction_set(
    tr: *mut TkvTransaction,
    key: *const u8,
    key_length: c_int,
    value: *const u8,
    value_length: c_int,
) {
    let tr = transaction_ref(tr);
    tr.writes.lock().push(WriteOp::Set(
        bytes(key, key_length).to_vec(),
        bytes(value, value_length).to_vec(),
    ));
}

#[no_mangle]
pub unsafe extern "C" fn tkv_transaction_clear(
    tr: *mut TkvTransaction,
    key: *const u8,
    key_length: c_int,
) {
    let tr = transaction_ref(tr);
    tr.writes
        .lock()
        .push(WriteOp::Clear(bytes(key, key_length).to_vec()));
}

#[no_mangle]
pub unsafe extern "C" fn tkv_transaction_clear_range(
    tr: *mut TkvTransaction,
    begin_key: *const u8,
    begin_key_length: c_int,
    end_key: *const u8,
    end_key_length: c_int,
) {
    let tr = transaction_ref(tr);
    tr.writes.lock().push(WriteOp::ClearRange(
        bytes(begin_key, begin_key_length).to_vec(),
        bytes(end_key, end_key_length).to_vec(),
    ));
}

#[no_mangle]
pub unsafe extern "C" fn tkv_transaction_atomic_op(
    tr: *mut TkvTransaction,
    key: *const u8,
    key_length: c_int,
    param: *const u8,
    param_length: c_int,
    operation_type: c_int,
) {
    let tr = transaction_ref(tr);
    tr.writes.lock().push(WriteOp::Atomic(
        bytes(key, key_length).to_vec(),
        bytes(param, param_length).to_vec(),
        operation_type,
    ));
}

#[no_mangle]
pub unsafe extern "C" fn tkv_transaction_get(
    tr: *mut TkvTransaction,
    key: *const u8,
    key_length: c_int,
    _snapshot: c_int,
) -> *mut TkvFuture {
    let tr = transaction_ref(tr);
    if tr.is_cancelled() {
        return into_handle(StubFuture::ready(ERR_OPERATION_CANCELLED, Payload::None));
    }
    if let Some(code) = FAIL_NEXT_GET.lock().take() {
        return into_handle(StubFuture::ready(code, Payload::None));
    }
    let value = tr.effective().get(bytes(key, key_length)).cloned();
    into_handle(StubFuture::ready(TKV_OK, Payload::Value(value)))
}

#[no_mangle]
pub unsafe extern "C" fn tkv_transaction_get_key(
    tr: *mut TkvTransaction,
    key: *const u8,
    key_length: c_int,
    or_equal: c_int,
    offset: c_int,
    _snapshot: c_int,
) -> *mut TkvFuture {
    let tr = transaction_ref(tr);
    let wanted = bytes(key, key_length);
    let keys: Vec<Vec<u8>> = tr.effective().keys().cloned().collect();
    let base = keys.partition_point(|k| {
        if or_equal != 0 {
            k.as_slice() < wanted
        } else {
            k.as_slice() <= wanted
        }
    });
    let index = base as isize + offset as isize;
    let resolved = if index >= 0 {
        keys.get(index as usize).cloned().unwrap_or_default()
    } else {
        Vec::new()
    };
    into_handle(StubFuture::ready(TKV_OK, Payload::Key(resolved)))
}

#[no_mangle]
pub unsafe extern "C" fn tkv_transaction_get_range(
    tr: *mut TkvTransaction,
    begin_key: *const u8,
    begin_key_length: c_int,
    end_key: *const u8,
    end_key_length: c_int,
    limit: c_int,
    reverse: c_int,
    _snapshot: c_int,
) -> *mut TkvFuture {
    let tr = transaction_ref(tr);
    let begin = bytes(begin_key, begin_key_length).to_vec();
    let end = bytes(end_key, end_key_length).to_vec();

    let mut pairs: Vec<(Vec<u8>, Vec<u8>)> = if begin < end {
        tr.effective()
            .range(begin..end)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    } else {
        Vec::new()
    };
    if reverse != 0 {
        pairs.reverse();
    }
    let mut more = false;
    if limit > 0 && pairs.len() > limit as usize {
        pairs.truncate(limit as usize);
        more = true;
    }
    into_handle(StubFuture::ready(TKV_OK, Payload::keyvalues(pairs, more)))
}

#[no_mangle]
pub unsafe extern "C" fn tkv_transaction_get_read_version(
    tr: *mut TkvTransaction,
) -> *mut TkvFuture {
    let tr = transaction_ref(tr);
    let version = tr.db().version.load(Ordering::SeqCst);
    into_handle(StubFuture::ready(TKV_OK, Payload::Int(version)))
}

#[no_mangle]
pub unsafe extern "C" fn tkv_transaction_get_addresses_for_key(
    _tr: *mut TkvTransaction,
    _key: *const u8,
    _key_length: c_int,
) -> *mut TkvFuture {
    let addresses = vec![
        CString::new("127.0.0.1:4500").expect("static address"),
        CString::new("127.0.0.1:4501").expect("static address"),
    ];
    into_handle(StubFuture::ready(TKV_OK, Payload::strings(addresses)))
}

#[no_mangle]
pub unsafe extern "C" fn tkv_transaction_watch(
    tr: *mut TkvTransaction,
    key: *const u8,
    key_length: c_int,
) -> *mut TkvFuture {
    let tr = transaction_ref(tr);
    if tr.is_cancelled() {
        return into_handle(StubFuture::ready(ERR_OPERATION_CANCELLED, Payload::None));
    }
    let future = StubFuture::pending();
    tr.db().watches.lock().push(StubWatch {
        key: bytes(key, key_length).to_vec(),
        future: Arc::clone(&future),
    });
    tr.watches.lock().push(Arc::clone(&future));
    into_handle(future)
}

#[no_mangle]
pub unsafe extern "C" fn tkv_transaction_commit(tr: *mut TkvTransaction) -> *mut TkvFuture {
    let tr = transaction_ref(tr);
    if tr.is_cancelled() {
        return into_handle(StubFuture::ready(ERR_OPERATION_CANCELLED, Payload::None));
    }
    if let Some(code) = FAIL_NEXT_COMMIT.lock().take() {
        return into_handle(StubFuture::ready(code, Payload::None));
    }

    let db = tr.db();
    let writes = std::mem::take(&mut *tr.writes.lock());
    {
        let mut store = db.store.lock();
        for op in &writes {
            apply(&mut store, op);
        }
    }
    db.version.fetch_add(1, Ordering::SeqCst);
    db.trigger_watches(&|key: &[u8]| {
        writes.iter().any(|op| match op {
            WriteOp::Set(k, _) | WriteOp::Clear(k) | WriteOp::Atomic(k, _, _) => k == key,
            WriteOp::ClearRange(begin, end) => {
                key >= begin.as_slice() && key < end.as_slice()
            }
        })
    });
    into_handle(StubFuture::ready(TKV_OK, Payload::None))
}

#[no_mangle]
pub unsafe extern "C" fn tkv_transaction_on_error(
    tr: *mut TkvTransaction,
    code: TkvErrorCode,
) -> *mut TkvFuture {
    let tr = transaction_ref(tr);
    let retryable = tkv_error_predicate(TKV_PREDICATE_RETRYABLE, code) != 0;
    if retryable {
        // Reset the transaction for the caller's retry loop.
        tr.writes.lock().clear();
        into_handle(StubFuture::ready(TKV_OK, Payload::None))
    } else {
        into_handle(StubFuture::ready(code, Payload::None))
    }
}

#[no_mangle]
pub unsafe extern "C" fn tkv_transaction_cancel(tr: *mut TkvTransaction) {
    let tr = transaction_ref(tr);
    tr.cancelled.store(true, Ordering::SeqCst);
    for watch in tr.watches.lock().drain(..) {
        watch.resolve(ERR_OPERATION_CANCELLED, Payload::None);
    }
}

#[no_mangle]
pub unsafe extern "C" fn tkv_transaction_destroy(tr: *mut TkvTransaction) {
    drop(Box::from_raw(tr as *mut StubTransaction));
}
