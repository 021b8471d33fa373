#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);
    for line in text.lines() {
        let _ = alfen_wallbox::transactions::parse_tx_line(line);
    }

    // A pass over the same page must always terminate
    let mut scanner = alfen_wallbox::transactions::TransactionScanner::new();
    let mut facts = alfen_wallbox::tags::SocketTagFacts::new();
    let mut pass = scanner.begin_pass();
    while let alfen_wallbox::transactions::ScanControl::Continue(_) =
        scanner.process_page(&mut pass, Some(&text), &mut facts)
    {}
});
