//! Interleaving-exhaustive tests of `ConcurrentLinkedList` (C1). Run with
//! `RUSTFLAGS="--cfg loom" cargo test --test loom_list --release`.
#![cfg(loom)]

use loom::sync::Arc;
use loom::thread;
use taskgraph_core::list::ConcurrentLinkedList;
use taskgraph_core::status::ListOp;

#[test]
fn concurrent_insert_same_key_has_one_winner() {
    loom::model(|| {
        let list = Arc::new(ConcurrentLinkedList::new(10));
        let l1 = list.clone();
        let l2 = list.clone();

        let h1 = thread::spawn(move || l1.insert_if_absent(1, "a"));
        let h2 = thread::spawn(move || l2.insert_if_absent(1, "b"));

        let r1 = h1.join().unwrap();
        let r2 = h2.join().unwrap();

        let inserted: Vec<_> = [&r1, &r2].into_iter().filter(|(op, _)| *op == ListOp::Inserted).collect();
        assert_eq!(inserted.len(), 1);
        assert_eq!(r1.1, r2.1, "loser must observe the winner's value");
    });
}

#[test]
fn insert_then_search_sees_it_from_another_thread() {
    loom::model(|| {
        let list = Arc::new(ConcurrentLinkedList::new(10));
        let l1 = list.clone();

        let h = thread::spawn(move || {
            l1.insert_if_absent(7, "v");
        });
        h.join().unwrap();

        assert_eq!(list.search(7), (ListOp::Found, Some("v")));
    });
}
