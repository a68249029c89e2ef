//! Basic example demonstrating the tkv client bindings.
//!
//! Run with: cargo run --example basic

use tkv::{Database, FutureResult};

fn main() -> tkv::Result<()> {
    println!("Max API version: {}", tkv::max_api_version());

    // Select the API version and start the network event loop.
    tkv::select_api_version(tkv::API_VERSION)?;
    tkv::network::start()?;

    let db = Database::open(None)?;

    println!("\n--- Writing a key ---");
    let tr = db.create_transaction()?;
    tr.set(b"greeting", b"hello from Rust");

    // Completions arrive as messages; here we subscribe and wait on the
    // mailbox instead of polling.
    let (mailbox, completions) = tkv::mailbox::channel();
    tr.commit().subscribe(1, &mailbox)?;
    let done = completions.recv().expect("commit completion");
    println!("commit completed with code {}", done.error_code());

    println!("\n--- Reading it back ---");
    let tr = db.create_transaction()?;
    match tr.get(b"greeting", false).decode()? {
        FutureResult::Bytes(value) => {
            println!("greeting = {}", String::from_utf8_lossy(&value));
        }
        FutureResult::Absent => println!("greeting not found"),
        other => println!("unexpected result: {:?}", other),
    }

    println!("\n--- Range read ---");
    let tr = db.create_transaction()?;
    tr.set(b"kv/a", b"1");
    tr.set(b"kv/b", b"2");
    tr.commit().decode()?;

    let tr = db.create_transaction()?;
    if let FutureResult::KeyValues { pairs, more } =
        tr.get_range(b"kv/", b"kv0", 10, false, false).decode()?
    {
        for (key, value) in &pairs {
            println!(
                "  {} = {}",
                String::from_utf8_lossy(key),
                String::from_utf8_lossy(value)
            );
        }
        println!("  more: {}", more);
    }

    println!("\n--- Done ---");
    tkv::network::stop()?;
    Ok(())
}
