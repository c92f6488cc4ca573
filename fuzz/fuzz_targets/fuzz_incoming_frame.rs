#![no_main]

use libfuzzer_sys::fuzz_target;
use music_assistant_client::protocol::IncomingFrame;
use music_assistant_client::MassEvent;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    // Classification must never panic, whatever the server sends.
    if let Ok(IncomingFrame::Event(msg)) = IncomingFrame::parse(text) {
        let event = MassEvent::from(msg.clone());
        assert_eq!(event.event_type(), msg.event);
    }
});
