#![no_main]

use libfuzzer_sys::fuzz_target;
use sketch_duel_client::protocol::ClientMessage;

fuzz_target!(|data: &[u8]| {
    // Requests we would emit must survive a parse round trip without
    // panicking, whatever the input looks like.
    if let Ok(msg) = serde_json::from_slice::<ClientMessage>(data) {
        let _ = serde_json::to_string(&msg);
    }

    if let Ok(s) = std::str::from_utf8(data) {
        let _ = serde_json::from_str::<ClientMessage>(s);
    }
});
