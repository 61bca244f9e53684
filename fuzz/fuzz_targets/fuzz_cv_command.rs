//! Fuzz target: the `CV<id>=<value>` command grammar plus the CV store's
//! validation path behind it.
//!
//! Asserts that arbitrary input never panics, that every accepted update
//! keeps the store inside its declared bounds, and that every rejected
//! update leaves the store untouched.
//!
//! cargo fuzz run fuzz_cv_command

#![no_main]

use libfuzzer_sys::fuzz_target;
use steamloco::config::{descriptor, CvStore};
use steamloco::link::parse_cv_command;

fuzz_target!(|data: &[u8]| {
    let Ok(line) = core::str::from_utf8(data) else {
        return;
    };

    let mut store = CvStore::defaults();
    let before = store.clone();

    match parse_cv_command(line) {
        Ok(cmd) => match store.validate_and_update(cmd.id, &cmd.raw_value) {
            Ok(_) => {
                // Accepted: value must sit inside the declared bound.
                let desc = descriptor(cmd.id).expect("accepted unknown id");
                let v = store.get(cmd.id).expect("accepted id missing").as_f32();
                assert!(v >= desc.min && v <= desc.max);
            }
            Err(_) => assert_eq!(store, before, "rejected update mutated the store"),
        },
        Err(_) => {
            // Parse failures never touch the store at all.
        }
    }
});
