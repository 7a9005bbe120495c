#![no_main]

use std::cell::RefCell;
use std::rc::Rc;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tether_core::{ListDiff, Observable, ObservableList, WritableList, WritableValue};
use tether_detail::ListDetailValueObservableList;

const POOL: usize = 4;

#[derive(Arbitrary, Debug)]
enum Op {
    Add(u8),
    Insert(u8, u8),
    RemoveAt(u8),
    Move(u8, u8),
    Replace(u8, u8),
    WriteThrough(u8, u8),
    Clear,
}

fn slot(p: u8) -> usize {
    usize::from(p) % POOL
}

fuzz_target!(|ops: Vec<Op>| {
    let pool: Vec<Rc<u8>> = (0..POOL as u8).map(Rc::new).collect();
    let master: WritableList<Rc<u8>> = WritableList::new();
    let adapter = match ListDetailValueObservableList::new(
        master.share(),
        |item: &Rc<u8>| WritableValue::new(u32::from(**item)).share(),
        None,
    ) {
        Ok(adapter) => adapter,
        Err(_) => return,
    };

    let replay = Rc::new(RefCell::new(adapter.to_vec()));
    let r = Rc::clone(&replay);
    let _sub = adapter.subscribe(Box::new(move |diff: &ListDiff<u32>| {
        diff.apply_to(&mut r.borrow_mut());
    }));

    for op in ops.iter().take(64) {
        let _ = match op {
            Op::Add(p) => master.add(Rc::clone(&pool[slot(*p)])),
            Op::Insert(i, p) => master.insert(usize::from(*i), Rc::clone(&pool[slot(*p)])),
            Op::RemoveAt(i) => master.remove_at(usize::from(*i)).map(drop),
            Op::Move(a, b) => master.move_element(usize::from(*a), usize::from(*b)).map(drop),
            Op::Replace(i, p) => master.set(usize::from(*i), Rc::clone(&pool[slot(*p)])).map(drop),
            Op::WriteThrough(i, v) => adapter.set(usize::from(*i), u32::from(*v)).map(drop),
            Op::Clear => master.clear(),
        };
        assert_eq!(adapter.len(), master.len());
        assert_eq!(*replay.borrow(), adapter.to_vec());
    }

    adapter.dispose();
    assert!(adapter.is_disposed());
});
