//! Destruction-ordering tests, driven through the stub's live-object
//! counters. Counters are process-wide, so every test here serializes on
//! one lock and sticks to the polling path (no callback threads) to keep
//! the counts deterministic.

use std::sync::Mutex;

use tkv::{Database, FutureResult};

static LOCK: Mutex<()> = Mutex::new(());

struct Baseline {
    databases: usize,
    transactions: usize,
    futures: usize,
}

fn baseline() -> Baseline {
    Baseline {
        databases: tkv::stub::live_databases(),
        transactions: tkv::stub::live_transactions(),
        futures: tkv::stub::live_futures(),
    }
}

#[test]
fn test_future_keeps_ancestors_alive() {
    let _guard = LOCK.lock().unwrap();
    let base = baseline();

    let db = Database::open(None).expect("open database");
    assert_eq!(tkv::stub::live_databases(), base.databases + 1);

    let tr = db.create_transaction().expect("create transaction");
    drop(db);
    // The transaction holds the database: no native destroy yet.
    assert_eq!(tkv::stub::live_databases(), base.databases + 1);

    let future = tr.get(b"k", false);
    drop(tr);
    // The future holds the transaction, and transitively the database.
    assert_eq!(tkv::stub::live_transactions(), base.transactions + 1);
    assert_eq!(tkv::stub::live_databases(), base.databases + 1);

    drop(future);
    // Last reference gone: each native object was destroyed exactly once.
    assert_eq!(tkv::stub::live_futures(), base.futures);
    assert_eq!(tkv::stub::live_transactions(), base.transactions);
    assert_eq!(tkv::stub::live_databases(), base.databases);
}

#[test]
fn test_view_pins_the_future_it_aliases() {
    let _guard = LOCK.lock().unwrap();
    let base = baseline();

    let view = {
        let db = Database::open(None).expect("open database");
        let tr = db.create_transaction().expect("create transaction");
        tr.set(b"pinned", b"payload");
        tr.commit().decode().expect("commit");

        let tr = db.create_transaction().expect("create transaction");
        let future = tr.get(b"pinned", false);
        match future.decode().expect("get") {
            FutureResult::Bytes(view) => view,
            other => panic!("get decoded to {:?}", other),
        }
        // db, tr, and future all drop here; only the view survives.
    };

    // The zero-copy view keeps its future (and the future's whole
    // ancestor chain) alive, so the bytes are still valid reads.
    assert_eq!(tkv::stub::live_futures(), base.futures + 1);
    assert_eq!(tkv::stub::live_transactions(), base.transactions + 1);
    assert_eq!(tkv::stub::live_databases(), base.databases + 1);
    assert_eq!(&view[..], b"payload");

    drop(view);
    assert_eq!(tkv::stub::live_futures(), base.futures);
    assert_eq!(tkv::stub::live_transactions(), base.transactions);
    assert_eq!(tkv::stub::live_databases(), base.databases);
}

#[test]
fn test_watch_does_not_pin_its_transaction() {
    let _guard = LOCK.lock().unwrap();
    let base = baseline();

    let db = Database::open(None).expect("open database");
    let tr = db.create_transaction().expect("create transaction");
    let watch = tr.watch(b"decoupled");

    drop(tr);
    // A watch deliberately carries no keep-alive on its transaction.
    assert_eq!(tkv::stub::live_transactions(), base.transactions);

    watch.cancel();
    let err = watch.decode().unwrap_err();
    assert_eq!(err.code(), tkv::stub::ERR_OPERATION_CANCELLED);

    drop(watch);
    drop(db);
    assert_eq!(tkv::stub::live_futures(), base.futures);
    assert_eq!(tkv::stub::live_databases(), base.databases);
}
