#![no_main]

use hookrelay::fuzz_api::decode_reply;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(body) = std::str::from_utf8(data) {
        if let Some(text) = decode_reply(body).into_text() {
            assert!(!text.is_empty());
        }
    }
});
