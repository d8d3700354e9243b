#![no_main]

use libfuzzer_sys::fuzz_target;
use weft_runtime::WireResponse;

fuzz_target!(|data: &[u8]| {
    let Ok(body) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(response) = WireResponse::from_json(body) {
        for result in &response.actions {
            let _ = result.id.parse::<weft_runtime::ActionId>();
            let _ = response.result_for(&result.id);
        }
        let again = serde_json::to_string(&response).expect("decoded response re-encodes");
        assert_eq!(WireResponse::from_json(&again).ok(), Some(response));
    }
});
