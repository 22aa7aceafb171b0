#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Tap payloads arrive as attacker-controllable JSON; routing must never
    // panic, whatever the bytes decode to
    if let Ok(raw) = std::str::from_utf8(data) {
        let _ = hyperion::notify::route_tap(raw);
    }
});
