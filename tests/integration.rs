//! End-to-end tests against the in-process native stub: operations,
//! decoding, completion delivery, watches, and cancellation.

use std::collections::HashSet;
use std::sync::Once;
use std::time::Duration;

use tkv::{Database, FutureResult, OptionValue};

fn init() {
    static START: Once = Once::new();
    START.call_once(|| {
        tkv::select_api_version(tkv::API_VERSION).expect("select api version");
        tkv::network::start().expect("start network");
    });
}

fn open_db() -> Database {
    init();
    Database::open(None).expect("open database")
}

#[test]
fn test_get_present_and_absent() {
    let db = open_db();

    let tr = db.create_transaction().expect("create transaction");
    tr.set(b"a", b"1");
    match tr.commit().decode().expect("commit") {
        FutureResult::Unit => {}
        other => panic!("commit decoded to {:?}", other),
    }

    let tr = db.create_transaction().expect("create transaction");
    match tr.get(b"a", false).decode().expect("get") {
        FutureResult::Bytes(value) => assert_eq!(&value[..], b"1"),
        other => panic!("get decoded to {:?}", other),
    }
    match tr.get(b"missing", false).decode().expect("get") {
        FutureResult::Absent => {}
        other => panic!("absent get decoded to {:?}", other),
    }

    // Snapshot reads go through the same path.
    match tr.get(b"a", true).decode().expect("snapshot get") {
        FutureResult::Bytes(value) => assert_eq!(&value[..], b"1"),
        other => panic!("snapshot get decoded to {:?}", other),
    }
}

#[test]
fn test_subscribe_delivers_one_message() {
    let db = open_db();
    let tr = db.create_transaction().expect("create transaction");
    tr.set(b"sub", b"payload");
    tr.commit().decode().expect("commit");

    let tr = db.create_transaction().expect("create transaction");
    let future = tr.get(b"sub", false);
    let (mailbox, completions) = tkv::mailbox::channel();
    future.subscribe(42, &mailbox).expect("subscribe");

    let msg = completions
        .recv_timeout(Duration::from_secs(5))
        .expect("completion");
    assert_eq!(msg.token, 42);
    assert_eq!(msg.error_code(), 0);
    let value = match msg.result.expect("decoded") {
        FutureResult::Bytes(value) => value,
        other => panic!("completion carried {:?}", other),
    };

    // The view stays readable after every handle it came from is gone:
    // it owns a keep-alive token on the future, which holds the chain.
    drop(future);
    drop(tr);
    drop(db);
    assert_eq!(&value[..], b"payload");

    assert!(
        completions.recv_timeout(Duration::from_millis(200)).is_err(),
        "a future must deliver exactly one completion"
    );
}

#[test]
fn test_range_preserves_order_and_continuation() {
    let db = open_db();
    let tr = db.create_transaction().expect("create transaction");
    for (k, v) in [
        (b"range/a", b"1"),
        (b"range/b", b"2"),
        (b"range/c", b"3"),
        (b"range/d", b"4"),
        (b"range/e", b"5"),
    ] {
        tr.set(k, v);
    }
    tr.commit().decode().expect("commit");

    let tr = db.create_transaction().expect("create transaction");
    let (pairs, more) = match tr
        .get_range(b"range/", b"range0", 3, false, false)
        .decode()
        .expect("range")
    {
        FutureResult::KeyValues { pairs, more } => (pairs, more),
        other => panic!("range decoded to {:?}", other),
    };
    assert!(more, "a truncated batch must signal continuation");
    assert_eq!(pairs.len(), 3);
    let keys: Vec<&[u8]> = pairs.iter().map(|(k, _)| &k[..]).collect();
    assert_eq!(keys, [&b"range/a"[..], &b"range/b"[..], &b"range/c"[..]]);
    assert_eq!(&pairs[0].1[..], b"1");

    // Reverse order comes back exactly as the native side returns it.
    let (pairs, more) = match tr
        .get_range(b"range/", b"range0", 0, true, false)
        .decode()
        .expect("reverse range")
    {
        FutureResult::KeyValues { pairs, more } => (pairs, more),
        other => panic!("range decoded to {:?}", other),
    };
    assert!(!more);
    let keys: Vec<&[u8]> = pairs.iter().map(|(k, _)| &k[..]).collect();
    assert_eq!(
        keys,
        [
            &b"range/e"[..],
            &b"range/d"[..],
            &b"range/c"[..],
            &b"range/b"[..],
            &b"range/a"[..],
        ]
    );
}

#[test]
fn test_get_key_resolves_selectors() {
    let db = open_db();
    let tr = db.create_transaction().expect("create transaction");
    tr.set(b"sel/a", b"");
    tr.set(b"sel/b", b"");
    tr.set(b"sel/c", b"");
    tr.commit().decode().expect("commit");

    let tr = db.create_transaction().expect("create transaction");
    match tr.get_key(b"sel/b", true, 0, false).decode().expect("get_key") {
        FutureResult::Bytes(key) => assert_eq!(&key[..], b"sel/b"),
        other => panic!("get_key decoded to {:?}", other),
    }
    match tr.get_key(b"sel/b", false, 0, false).decode().expect("get_key") {
        FutureResult::Bytes(key) => assert_eq!(&key[..], b"sel/c"),
        other => panic!("get_key decoded to {:?}", other),
    }
}

#[test]
fn test_read_version_is_an_integer() {
    let db = open_db();
    let tr = db.create_transaction().expect("create transaction");
    let first = match tr.get_read_version().decode().expect("read version") {
        FutureResult::Int(v) => v,
        other => panic!("read version decoded to {:?}", other),
    };
    assert!(first >= 1);

    tr.set(b"bump", b"");
    tr.commit().decode().expect("commit");

    let tr = db.create_transaction().expect("create transaction");
    match tr.get_read_version().decode().expect("read version") {
        FutureResult::Int(v) => assert!(v > first),
        other => panic!("read version decoded to {:?}", other),
    }
}

#[test]
fn test_addresses_for_key() {
    let db = open_db();
    let tr = db.create_transaction().expect("create transaction");
    let strings = match tr
        .get_addresses_for_key(b"anything")
        .decode()
        .expect("addresses")
    {
        FutureResult::Strings(strings) => strings,
        other => panic!("addresses decoded to {:?}", other),
    };
    assert!(!strings.is_empty());
    assert_eq!(&strings[0][..], b"127.0.0.1:4500");
}

#[test]
fn test_atomic_and_clear_operations() {
    let db = open_db();
    let tr = db.create_transaction().expect("create transaction");
    tr.atomic_op(b"counter", &1u64.to_le_bytes(), tkv::stub::MUTATION_ADD);
    tr.atomic_op(b"counter", &2u64.to_le_bytes(), tkv::stub::MUTATION_ADD);
    tr.set(b"doomed/a", b"");
    tr.set(b"doomed/b", b"");
    tr.set(b"kept", b"");
    tr.commit().decode().expect("commit");

    let tr = db.create_transaction().expect("create transaction");
    match tr.get(b"counter", false).decode().expect("get") {
        FutureResult::Bytes(value) => assert_eq!(&value[..], &3u64.to_le_bytes()),
        other => panic!("counter decoded to {:?}", other),
    }

    tr.clear_range(b"doomed/", b"doomed0");
    tr.clear(b"kept");
    tr.commit().decode().expect("commit");

    let tr = db.create_transaction().expect("create transaction");
    assert!(matches!(
        tr.get(b"doomed/a", false).decode().expect("get"),
        FutureResult::Absent
    ));
    assert!(matches!(
        tr.get(b"kept", false).decode().expect("get"),
        FutureResult::Absent
    ));
}

#[test]
fn test_options_accept_bytes_and_ints() {
    let db = open_db();
    db.set_option(500, OptionValue::Int(128))
        .expect("database int option");
    db.set_option(501, OptionValue::Bytes(b"dc-1"))
        .expect("database bytes option");

    let tr = db.create_transaction().expect("create transaction");
    tr.set_option(502, OptionValue::None)
        .expect("transaction flag option");
}

#[test]
fn test_watch_fires_on_commit_from_other_transaction() {
    let db = open_db();
    let tr = db.create_transaction().expect("create transaction");
    let watch = tr.watch(b"watched");
    assert!(!watch.is_ready());

    // Polling an unresolved future reports the native not-ready code.
    let err = watch.decode().unwrap_err();
    assert_eq!(err.code(), tkv::stub::ERR_FUTURE_NOT_RESOLVED);

    let (mailbox, completions) = tkv::mailbox::channel();
    watch.subscribe(7, &mailbox).expect("subscribe");

    let writer = db.create_transaction().expect("create transaction");
    writer.set(b"watched", b"new-value");
    writer.commit().decode().expect("commit");

    let msg = completions
        .recv_timeout(Duration::from_secs(5))
        .expect("watch completion");
    assert_eq!(msg.token, 7);
    assert_eq!(msg.error_code(), 0);
    assert!(matches!(msg.result, Ok(FutureResult::Unit)));
}

#[test]
fn test_cancelled_transaction_still_completes_once() {
    let db = open_db();
    let tr = db.create_transaction().expect("create transaction");
    let watch = tr.watch(b"never-written");

    let (mailbox, completions) = tkv::mailbox::channel();
    watch.subscribe(9, &mailbox).expect("subscribe");

    tr.cancel();

    let msg = completions
        .recv_timeout(Duration::from_secs(5))
        .expect("cancellation completion");
    assert_eq!(msg.token, 9);
    assert_eq!(msg.error_code(), tkv::stub::ERR_OPERATION_CANCELLED);

    // Exactly one message: cancellation is a completion, not a second path.
    assert!(completions.recv_timeout(Duration::from_millis(200)).is_err());

    // Operations issued after cancellation fail with the same code.
    let err = tr.get(b"x", false).decode().unwrap_err();
    assert_eq!(err.code(), tkv::stub::ERR_OPERATION_CANCELLED);
}

#[test]
fn test_future_cancel_resolves_with_cancellation_code() {
    let db = open_db();
    let tr = db.create_transaction().expect("create transaction");
    let watch = tr.watch(b"quiet");
    watch.cancel();
    let err = watch.decode().unwrap_err();
    assert_eq!(err.code(), tkv::stub::ERR_OPERATION_CANCELLED);
    assert!(!err.is_retryable());
}

#[test]
fn test_on_error_resets_for_retryable_codes() {
    let db = open_db();
    let tr = db.create_transaction().expect("create transaction");

    let conflict = tkv::NativeError::from_code(tkv::stub::ERR_NOT_COMMITTED);
    match tr.on_error(conflict).decode() {
        Ok(FutureResult::Unit) => {}
        other => panic!("retryable on_error decoded to {:?}", other),
    }

    let cancelled = tkv::NativeError::from_code(tkv::stub::ERR_OPERATION_CANCELLED);
    let err = tr.on_error(cancelled).decode().unwrap_err();
    assert_eq!(err.code(), tkv::stub::ERR_OPERATION_CANCELLED);
}

#[test]
fn test_stress_concurrent_subscriptions() {
    const WORKERS: usize = 4;
    const PER_WORKER: usize = 25;

    let db = open_db();
    let seed = db.create_transaction().expect("create transaction");
    for i in 0..WORKERS * PER_WORKER {
        seed.set(format!("stress/{i:03}").as_bytes(), b"x");
    }
    seed.commit().decode().expect("commit");

    let (mailbox, completions) = tkv::mailbox::channel();
    std::thread::scope(|scope| {
        for w in 0..WORKERS {
            let db = db.clone();
            let mailbox = mailbox.clone();
            scope.spawn(move || {
                let tr = db.create_transaction().expect("create transaction");
                for i in 0..PER_WORKER {
                    let n = w * PER_WORKER + i;
                    let future = tr.get(format!("stress/{n:03}").as_bytes(), false);
                    future
                        .subscribe(n as u64, &mailbox)
                        .expect("subscribe under load");
                }
            });
        }
    });

    let mut tokens = HashSet::new();
    for _ in 0..WORKERS * PER_WORKER {
        let msg = completions
            .recv_timeout(Duration::from_secs(10))
            .expect("stress completion");
        assert_eq!(msg.error_code(), 0);
        assert!(tokens.insert(msg.token), "duplicate completion delivered");
    }
    assert_eq!(tokens.len(), WORKERS * PER_WORKER);
    assert!(
        completions.recv_timeout(Duration::from_millis(300)).is_err(),
        "message count must equal the number of registrations"
    );
}
