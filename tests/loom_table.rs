//! Interleaving-exhaustive tests of `ConcurrentHashTable` (C2)'s racy bucket
//! creation. Run with `RUSTFLAGS="--cfg loom" cargo test --test loom_table --release`.
#![cfg(loom)]

use loom::sync::Arc;
use loom::thread;
use taskgraph_core::status::ListOp;
use taskgraph_core::table::ConcurrentHashTable;

#[test]
fn racing_bucket_creation_has_one_winner() {
    loom::model(|| {
        let table = Arc::new(ConcurrentHashTable::new(1, 10));
        let t1 = table.clone();
        let t2 = table.clone();

        let h1 = thread::spawn(move || t1.insert_if_absent(1, "a"));
        let h2 = thread::spawn(move || t2.insert_if_absent(1, "b"));

        let r1 = h1.join().unwrap();
        let r2 = h2.join().unwrap();

        let inserted: Vec<_> = [&r1, &r2].into_iter().filter(|(op, _)| *op == ListOp::Inserted).collect();
        assert_eq!(inserted.len(), 1);
        assert_eq!(r1.1, r2.1);
    });
}
