#![no_main]

use libfuzzer_sys::fuzz_target;
use tether_core::ListDiff;

fuzz_target!(|input: (Vec<u8>, Vec<u8>)| {
    let (old, new) = input;
    if old.len() > 256 || new.len() > 256 {
        return;
    }

    let diff = ListDiff::compute(&old, &new);
    let mut replay = old.clone();
    diff.apply_to(&mut replay);
    assert_eq!(replay, new);

    if old == new {
        assert!(diff.is_empty());
    }
});
