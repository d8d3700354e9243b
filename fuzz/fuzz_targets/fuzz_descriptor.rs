#![no_main]

use libfuzzer_sys::fuzz_target;
use weft_core::DefDescriptor;

fuzz_target!(|data: &str| {
    if let Ok(descriptor) = DefDescriptor::parse(data) {
        let printed = descriptor.to_string();
        let reparsed = DefDescriptor::parse(&printed).expect("printed descriptor must parse");
        assert_eq!(reparsed, descriptor);
    }
});
