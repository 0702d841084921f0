#![no_main]

use libfuzzer_sys::fuzz_target;
use presence_probe::protocol::ServerMessage;
use presence_probe::PresenceEvent;

fuzz_target!(|data: &[u8]| {
    // Every message the transport loop accepts must also map onto an event.
    if let Ok(msg) = serde_json::from_slice::<ServerMessage>(data) {
        let _ = PresenceEvent::from(msg);
    }
});
