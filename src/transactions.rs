//! Transaction log grammar and scanner
//!
//! The transaction endpoint returns plain text, one record per line:
//!
//! ```text
//! 123_txstart2: id 0x0000007b, socket 1, 2024-01-15 10:30:00 15.5kWh 04A2B3C4 3 1 y
//! 124_txstop2: id 0x0000007b, socket 1, 2024-01-15 12:00:00 25.0kWh 04A2B3C4 3 y
//! 125_mv socket 1, 2024-01-15 11:00:00 20.3
//! 126_dto ...
//! 0_Empty
//! ```
//!
//! Each record id doubles as the offset for the next page request, so a pass
//! keeps asking for more until the stream tells it to stop.

use crate::tags::{SocketTagFacts, TagPhase};

/// Upper bound for any offset derived from the stream
pub const MAX_OFFSET: u64 = 100_000;

/// Pages fetched in one pass at most
pub const MAX_PAGES_PER_PASS: u32 = 200;

/// Consecutive unknown lines tolerated before a pass gives up
const MAX_UNKNOWN_RUN: u32 = 2;

/// Times the same record id may repeat before the stream counts as exhausted
const STABLE_REPEATS: u32 = 2;

/// Socket/date/energy carried by start, stop and meter-value records
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRecord {
    pub tid: Option<u64>,
    /// Socket key, e.g. `"socket 1"`
    pub socket: String,
    pub date: String,
    pub kwh: String,
}

/// One classified transaction line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxLine {
    TxStart(TxRecord),
    TxStop(TxRecord),
    MeterValue(TxRecord),
    /// Offset bookkeeping only
    Advance { tid: Option<u64> },
    /// No more transactions
    Empty,
    Unknown,
}

/// Numeric prefix before the first underscore
fn leading_id(token: &str) -> Option<u64> {
    token.split('_').next()?.parse().ok()
}

/// `socket <n>, <date> <time> <kwh>` following the first token
fn parse_record(tokens: &[&str]) -> Option<TxRecord> {
    let tid = leading_id(tokens.first()?);
    let at = tokens.iter().position(|t| *t == "socket")?;
    let number = tokens.get(at + 1)?.trim_end_matches(',');
    if number.is_empty() {
        return None;
    }
    let date = format!("{} {}", tokens.get(at + 2)?, tokens.get(at + 3)?);
    let kwh = tokens.get(at + 4)?.split("kWh").next()?;
    if kwh.is_empty() {
        return None;
    }
    Some(TxRecord {
        tid,
        socket: format!("socket {}", number),
        date,
        kwh: kwh.to_string(),
    })
}

/// Classify one non-blank line
pub fn parse_tx_line(line: &str) -> TxLine {
    // Version banners prefix the first record: "...version...:2,<record>"
    let line = if line.contains("version") {
        match line.split_once(":2,") {
            Some((_, rest)) => rest,
            None => return TxLine::Unknown,
        }
    } else {
        line
    };

    let tokens: Vec<&str> = line.split_whitespace().collect();
    let record = || parse_record(&tokens);

    if line.contains("txstart") {
        record().map_or(TxLine::Unknown, TxLine::TxStart)
    } else if line.contains("txstop") {
        record().map_or(TxLine::Unknown, TxLine::TxStop)
    } else if line.contains("mv") {
        record().map_or(TxLine::Unknown, TxLine::MeterValue)
    } else if line.contains("dto") {
        TxLine::Advance {
            tid: tokens.first().and_then(|t| leading_id(t)),
        }
    } else if line.contains("0_Empty") {
        TxLine::Empty
    } else {
        TxLine::Unknown
    }
}

/// Why a pass ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EmptyMarker,
    BlankLine,
    UnknownLines,
    OffsetStable,
    NoData,
    PageLimit,
}

/// Outcome of one page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanControl {
    /// Fetch the next page at this offset
    Continue(u64),
    Stop(StopReason),
}

/// Per-pass counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanPass {
    pub offset: u64,
    pub pages: u32,
    repeats: u32,
    unknown_run: u32,
}

/// Transaction scanning state that survives between passes
#[derive(Debug, Clone, Default)]
pub struct TransactionScanner {
    /// Last record id seen; the next pass starts here
    transaction_offset: u64,
}

impl TransactionScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transaction_offset(&self) -> u64 {
        self.transaction_offset
    }

    pub fn begin_pass(&self) -> ScanPass {
        ScanPass {
            offset: self.transaction_offset.min(MAX_OFFSET),
            pages: 0,
            repeats: 0,
            unknown_run: 0,
        }
    }

    /// Process one fetched page (`None` when the fetch failed).
    ///
    /// Stop conditions are checked line by line in stream order and the first
    /// one to fire ends the pass; the rest of the page is not looked at.
    pub fn process_page(
        &mut self,
        pass: &mut ScanPass,
        text: Option<&str>,
        facts: &mut SocketTagFacts,
    ) -> ScanControl {
        let text = match text {
            Some(t) if !t.is_empty() => t,
            _ => return ScanControl::Stop(StopReason::NoData),
        };

        for line in text.lines() {
            if line.is_empty() {
                return ScanControl::Stop(StopReason::BlankLine);
            }

            let record = match parse_tx_line(line) {
                TxLine::Empty => return ScanControl::Stop(StopReason::EmptyMarker),
                TxLine::Unknown => {
                    pass.offset = (pass.offset + 1).min(MAX_OFFSET);
                    pass.unknown_run += 1;
                    if pass.unknown_run > MAX_UNKNOWN_RUN {
                        return ScanControl::Stop(StopReason::UnknownLines);
                    }
                    continue;
                }
                TxLine::Advance { tid } => {
                    pass.unknown_run = 0;
                    pass.offset = match tid {
                        Some(tid) if tid > pass.offset => tid,
                        _ => pass.offset + 1,
                    }
                    .min(MAX_OFFSET);
                    continue;
                }
                TxLine::TxStart(r) => {
                    facts.set_reading(&r.socket, TagPhase::Start, &r.date, &r.kwh);
                    r
                }
                TxLine::TxStop(r) => {
                    facts.set_reading(&r.socket, TagPhase::Stop, &r.date, &r.kwh);
                    facts.snapshot_last_start(&r.socket);
                    r
                }
                TxLine::MeterValue(r) => {
                    facts.set_reading(&r.socket, TagPhase::Mv, &r.date, &r.kwh);
                    r
                }
            };
            pass.unknown_run = 0;

            let Some(tid) = record.tid else {
                continue;
            };
            let tid = tid.min(MAX_OFFSET);
            pass.offset = tid;
            if self.transaction_offset == tid {
                pass.repeats += 1;
            } else {
                self.transaction_offset = tid;
                pass.repeats = 0;
            }
            if pass.repeats >= STABLE_REPEATS {
                return ScanControl::Stop(StopReason::OffsetStable);
            }
        }

        pass.pages += 1;
        if pass.pages >= MAX_PAGES_PER_PASS {
            return ScanControl::Stop(StopReason::PageLimit);
        }
        ScanControl::Continue(pass.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::TagField;

    const START: &str =
        "123_txstart2: id 0x0000007b, socket 1, 2024-01-15 10:30:00 15.5kWh 04A2B3C4 3 1 y";
    const STOP: &str =
        "124_txstop2: id 0x0000007b, socket 1, 2024-01-15 12:00:00 25.0kWh 04A2B3C4 3 y";
    const MV: &str = "125_mv socket 1, 2024-01-15 11:00:00 20.3";

    #[test]
    fn test_line_types() {
        let TxLine::TxStart(start) = parse_tx_line(START) else {
            panic!("expected txstart");
        };
        assert_eq!(start.tid, Some(123));
        assert_eq!(start.socket, "socket 1");
        assert_eq!(start.date, "2024-01-15 10:30:00");
        assert_eq!(start.kwh, "15.5");

        assert!(matches!(parse_tx_line(STOP), TxLine::TxStop(r) if r.kwh == "25.0"));
        assert!(matches!(parse_tx_line(MV), TxLine::MeterValue(r) if r.kwh == "20.3"));
        assert_eq!(parse_tx_line("130_dto 1"), TxLine::Advance { tid: Some(130) });
        assert_eq!(parse_tx_line("0_Empty"), TxLine::Empty);
        assert_eq!(parse_tx_line("garbage"), TxLine::Unknown);
        // recognised marker but truncated record
        assert_eq!(parse_tx_line("123_txstart2: id 0x1, socket"), TxLine::Unknown);
    }

    #[test]
    fn test_version_prefix_is_stripped() {
        let line = format!("1_version:2,{}", MV);
        assert!(matches!(parse_tx_line(&line), TxLine::MeterValue(r) if r.tid == Some(125)));
        assert_eq!(parse_tx_line("version 3"), TxLine::Unknown);
    }

    #[test]
    fn test_meter_value_sets_facts() {
        let mut scanner = TransactionScanner::new();
        let mut pass = scanner.begin_pass();
        let mut facts = SocketTagFacts::new();
        let control = scanner.process_page(&mut pass, Some(MV), &mut facts);
        assert_eq!(control, ScanControl::Continue(125));
        assert_eq!(
            facts.get("socket 1", TagPhase::Mv, TagField::Kwh).as_deref(),
            Some("20.3")
        );
        assert_eq!(
            facts.get("socket 1", TagPhase::Mv, TagField::Date).as_deref(),
            Some("2024-01-15 11:00:00")
        );
    }

    #[test]
    fn test_stop_snapshots_last_start() {
        let mut scanner = TransactionScanner::new();
        let mut pass = scanner.begin_pass();
        let mut facts = SocketTagFacts::new();
        let page = format!("{}\n{}", START, STOP);
        scanner.process_page(&mut pass, Some(&page), &mut facts);
        assert_eq!(
            facts.get("socket 1", TagPhase::LastStart, TagField::Kwh).as_deref(),
            Some("15.5")
        );
        assert_eq!(facts.last_session_energy_kwh("socket 1"), Some(9.5));
    }

    #[test]
    fn test_terminators() {
        let mut facts = SocketTagFacts::new();
        let mut scanner = TransactionScanner::new();

        let mut pass = scanner.begin_pass();
        assert_eq!(
            scanner.process_page(&mut pass, Some("0_Empty\n125_mv socket 9, a b 1"), &mut facts),
            ScanControl::Stop(StopReason::EmptyMarker)
        );
        assert!(facts.phase("socket 9", TagPhase::Mv).is_none());

        let mut pass = scanner.begin_pass();
        assert_eq!(
            scanner.process_page(&mut pass, Some("x\ny\nz\nw"), &mut facts),
            ScanControl::Stop(StopReason::UnknownLines)
        );
        assert_eq!(pass.offset, 3);

        let mut pass = scanner.begin_pass();
        assert_eq!(
            scanner.process_page(&mut pass, Some(&format!("{}\n\n{}", MV, START)), &mut facts),
            ScanControl::Stop(StopReason::BlankLine)
        );

        let mut pass = scanner.begin_pass();
        assert_eq!(
            scanner.process_page(&mut pass, None, &mut facts),
            ScanControl::Stop(StopReason::NoData)
        );
    }

    #[test]
    fn test_unknown_run_resets_on_records() {
        let mut scanner = TransactionScanner::new();
        let mut pass = scanner.begin_pass();
        let mut facts = SocketTagFacts::new();
        let page = format!("x\ny\n{}\nz\nw", MV);
        assert_eq!(
            scanner.process_page(&mut pass, Some(&page), &mut facts),
            ScanControl::Continue(127)
        );
    }

    #[test]
    fn test_offset_stabilizes() {
        let mut scanner = TransactionScanner::new();
        let mut facts = SocketTagFacts::new();
        let mut pass = scanner.begin_pass();
        assert_eq!(
            scanner.process_page(&mut pass, Some(MV), &mut facts),
            ScanControl::Continue(125)
        );
        assert_eq!(
            scanner.process_page(&mut pass, Some(MV), &mut facts),
            ScanControl::Continue(125)
        );
        assert_eq!(
            scanner.process_page(&mut pass, Some(MV), &mut facts),
            ScanControl::Stop(StopReason::OffsetStable)
        );
        assert_eq!(scanner.transaction_offset(), 125);
        assert_eq!(scanner.begin_pass().offset, 125);
    }

    #[test]
    fn test_advance_and_clamp() {
        let mut scanner = TransactionScanner::new();
        let mut facts = SocketTagFacts::new();
        let mut pass = scanner.begin_pass();
        assert_eq!(
            scanner.process_page(&mut pass, Some("50_dto\n10_dto"), &mut facts),
            ScanControl::Continue(51)
        );
        assert_eq!(
            scanner.process_page(&mut pass, Some("999999_dto"), &mut facts),
            ScanControl::Continue(MAX_OFFSET)
        );
    }

    #[test]
    fn test_page_limit() {
        let mut scanner = TransactionScanner::new();
        let mut facts = SocketTagFacts::new();
        let mut pass = scanner.begin_pass();
        let mut last = ScanControl::Continue(0);
        for _ in 0..MAX_PAGES_PER_PASS {
            last = scanner.process_page(&mut pass, Some("1_dto"), &mut facts);
        }
        assert_eq!(last, ScanControl::Stop(StopReason::PageLimit));
    }
}
