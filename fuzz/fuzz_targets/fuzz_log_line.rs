#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);
    let mut buffer = alfen_wallbox::logparse::LogBuffer::default();
    for line in text.lines() {
        let _ = alfen_wallbox::logparse::parse_log_line(line);
        buffer.push(line);
    }
    let mut facts = alfen_wallbox::tags::SocketTagFacts::new();
    let _ = alfen_wallbox::logparse::apply_log_lines(&buffer, &mut facts);
});
