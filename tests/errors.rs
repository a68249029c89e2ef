//! Native-error surfacing tests using the stub's failure injection.
//! Injection is process-wide ("fail the next commit"), so these serialize
//! on one lock to keep the injected code paired with its own operation.

use std::sync::Mutex;
use std::time::Duration;

use tkv::{Database, Predicate};

static LOCK: Mutex<()> = Mutex::new(());

#[test]
fn test_commit_conflict_surfaces_code_verbatim() {
    let _guard = LOCK.lock().unwrap();

    let db = Database::open(None).expect("open database");
    let tr = db.create_transaction().expect("create transaction");
    tr.set(b"contended", b"value");

    tkv::stub::fail_next_commit(tkv::stub::ERR_NOT_COMMITTED);
    let commit = tr.commit();

    let err = commit.decode().unwrap_err();
    assert_eq!(err.code(), tkv::stub::ERR_NOT_COMMITTED);
    assert!(err.is_retryable());
    assert!(!err.is(Predicate::MaybeCommitted));

    // The completion message carries the same code, verbatim.
    let (mailbox, completions) = tkv::mailbox::channel();
    commit.subscribe(11, &mailbox).expect("subscribe");
    let msg = completions
        .recv_timeout(Duration::from_secs(5))
        .expect("completion");
    assert_eq!(msg.token, 11);
    assert_eq!(msg.error_code(), tkv::stub::ERR_NOT_COMMITTED);
    assert!(msg.result.is_err());
}

#[test]
fn test_failed_future_decode_skips_payload() {
    let _guard = LOCK.lock().unwrap();

    let db = Database::open(None).expect("open database");
    let tr = db.create_transaction().expect("create transaction");

    tkv::stub::fail_next_get(tkv::stub::ERR_TIMED_OUT);
    // The stub aborts the process if a payload accessor is invoked on a
    // failed future, so surviving this decode proves the probe-first order.
    let err = tr.get(b"x", false).decode().unwrap_err();
    assert_eq!(err.code(), tkv::stub::ERR_TIMED_OUT);
    assert!(err.message().contains("timed out"));
}

#[test]
fn test_native_error_display_includes_code() {
    let _guard = LOCK.lock().unwrap();

    let err = tkv::NativeError::from_code(tkv::stub::ERR_OPERATION_CANCELLED);
    let rendered = err.to_string();
    assert!(rendered.contains("cancelled"), "got: {rendered}");
    assert!(rendered.contains("1025"), "got: {rendered}");
}
