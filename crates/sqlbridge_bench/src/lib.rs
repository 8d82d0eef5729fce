//! Benchmark utilities.

use rand::distributions::Alphanumeric;
use rand::Rng;
use sqlbridge_core::{Database, Params, Value};

/// Generate random blob data of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Generate random alphanumeric text of the specified length.
pub fn random_text(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Open a database holding `rows` rows of `(id, name, payload)`.
pub fn seeded_database(rows: usize, payload_size: usize) -> Database {
    let db = Database::open(None).unwrap();
    db.run(
        "CREATE TABLE items(id INTEGER PRIMARY KEY, name TEXT, payload BLOB)",
        None,
    )
    .unwrap();
    db.run("BEGIN", None).unwrap();
    let mut insert = db
        .prepare("INSERT INTO items(name, payload) VALUES (?, ?)", None)
        .unwrap();
    for _ in 0..rows {
        let params = Params::from([
            Value::from(random_text(16)),
            Value::from(random_data(payload_size)),
        ]);
        insert.run(Some(&params)).unwrap();
    }
    insert.free().unwrap();
    db.run("COMMIT", None).unwrap();
    db
}
