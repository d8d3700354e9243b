#![no_main]

use libfuzzer_sys::fuzz_target;
use weft_core::PropertyRef;

fuzz_target!(|data: &str| {
    if let Ok(path) = PropertyRef::parse(data) {
        assert!(!path.provider().is_empty());
        assert!(!path.attribute_name().is_empty());
        let reparsed = PropertyRef::parse(&path.to_string()).expect("printed path must parse");
        assert_eq!(reparsed, path);
    }
});
