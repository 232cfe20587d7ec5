#![no_main]

use libfuzzer_sys::fuzz_target;
use sketch_duel_client::protocol::ServerMessage;

fuzz_target!(|data: &[u8]| {
    // Exercise the raw-byte deserialization path (includes serde_json's
    // own UTF-8 validation and error handling for invalid sequences).
    if let Ok(msg) = serde_json::from_slice::<ServerMessage>(data) {
        // Every parsed push must map to a registry key.
        let _ = msg.kind();
    }

    // Also exercise the str-based path for valid UTF-8 input.
    if let Ok(s) = std::str::from_utf8(data) {
        let _ = serde_json::from_str::<ServerMessage>(s);
    }
});
