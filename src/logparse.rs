//! Device log grammar
//!
//! Log lines look like
//! `2950_2024-01-15:10:30:00:INFO:ev:Socket #1: EV_CONNECTED_AUTHORIZED, tag: 04A2B3C4`
//! i.e. a numeric line id, an underscore, then colon separated fields where
//! everything after the sixth colon is the message.

use crate::tags::SocketTagFacts;
use std::collections::{HashSet, VecDeque};

/// Lines kept between fetches
pub const LOG_BUFFER_CAPACITY: usize = 500;

/// The id separator must appear within this many bytes
const MAX_ID_PREFIX: usize = 20;

const CONNECT_EVENTS: &[&str] = &[
    "EV_CONNECTED_AUTHORIZED",
    "CHARGING_POWER_ON",
    "CABLE_CONNECTED",
];
const DISCONNECT_EVENTS: &[&str] = &["CHARGING_POWER_OFF", "CHARGING_TERMINATING"];

/// Bounded FIFO of raw lines, deduplicated by exact content
#[derive(Debug, Clone)]
pub struct LogBuffer {
    capacity: usize,
    lines: VecDeque<String>,
    seen: HashSet<String>,
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::with_capacity(LOG_BUFFER_CAPACITY)
    }
}

impl LogBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            lines: VecDeque::with_capacity(capacity),
            seen: HashSet::with_capacity(capacity),
        }
    }

    /// Append a line unless it is empty or already buffered. Returns whether it was added.
    pub fn push(&mut self, line: &str) -> bool {
        if line.is_empty() || self.seen.contains(line) {
            return false;
        }
        if self.lines.len() == self.capacity {
            if let Some(evicted) = self.lines.pop_front() {
                self.seen.remove(&evicted);
            }
        }
        self.lines.push_back(line.to_string());
        self.seen.insert(line.to_string());
        true
    }

    /// Split a page of text into lines and buffer them
    pub fn extend_from_text(&mut self, text: &str) -> usize {
        text.lines().filter(|line| self.push(line)).count()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Most recently buffered first
    pub fn iter_newest_first(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().rev().map(String::as_str)
    }
}

/// What a log line tells us about a socket's tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagEvent {
    /// Connect-class event with the tag that authorized it
    Connected { tag: Option<String> },
    /// Disconnect-class event
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub line_id: u64,
    /// Socket key, e.g. `"socket 1"`
    pub socket: String,
    pub event: TagEvent,
}

/// Digits following `Socket #`
fn extract_socket(message: &str) -> Option<&str> {
    let start = message.find("Socket #")? + "Socket #".len();
    let rest = &message[start..];
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    (end > 0).then(|| &rest[..end])
}

/// First whitespace-delimited token after `tag:`
fn extract_tag(message: &str) -> Option<&str> {
    let start = message.find("tag:")? + "tag:".len();
    message[start..].split_whitespace().next()
}

/// Parse one log line into a tag event, or `None` when it carries none
pub fn parse_log_line(line: &str) -> Option<LogRecord> {
    let sep = line.find('_')?;
    if sep >= MAX_ID_PREFIX {
        return None;
    }
    let line_id: u64 = line[..sep].parse().ok()?;

    let parts: Vec<&str> = line[sep + 1..].split(':').collect();
    if parts.len() < 7 {
        return None;
    }
    let message = parts[6..].join(":");

    let socket = format!("socket {}", extract_socket(&message)?);

    if !message.contains("tag:") {
        return None;
    }
    let event = if CONNECT_EVENTS.iter().any(|e| message.contains(e)) {
        TagEvent::Connected {
            tag: extract_tag(&message).map(str::to_string),
        }
    } else if DISCONNECT_EVENTS.iter().any(|e| message.contains(e)) {
        TagEvent::Disconnected
    } else {
        return None;
    };

    Some(LogRecord {
        line_id,
        socket,
        event,
    })
}

/// Apply one record. Returns whether the stored facts changed.
pub fn apply_log_record(record: &LogRecord, facts: &mut SocketTagFacts) -> bool {
    match &record.event {
        TagEvent::Connected { tag: Some(tag) } => {
            facts.apply_tag(&record.socket, record.line_id, Some(tag))
        }
        // Empty tag field: the line still counts, the stored tag stays
        TagEvent::Connected { tag: None } => {
            facts.advance_taglog(&record.socket, record.line_id)
        }
        TagEvent::Disconnected => facts.apply_tag(&record.socket, record.line_id, None),
    }
}

/// Run every buffered line, newest first, through the grammar.
///
/// Returns the number of updates applied.
pub fn apply_log_lines(buffer: &LogBuffer, facts: &mut SocketTagFacts) -> usize {
    buffer
        .iter_newest_first()
        .filter_map(parse_log_line)
        .filter(|record| apply_log_record(record, facts))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::{TagField, TagPhase};

    const CONNECT: &str =
        "200_2024-01-15:10:30:00:INFO:ev:Socket #1: EV_CONNECTED_AUTHORIZED, tag: 04A2B3C4";

    #[test]
    fn test_parse_connect_line() {
        let record = parse_log_line(CONNECT).unwrap();
        assert_eq!(record.line_id, 200);
        assert_eq!(record.socket, "socket 1");
        assert_eq!(
            record.event,
            TagEvent::Connected {
                tag: Some("04A2B3C4".to_string())
            }
        );
    }

    #[test]
    fn test_parse_disconnect_line() {
        let line = "201_2024-01-15:11:30:00:INFO:ev:Socket #2: CHARGING_POWER_OFF, tag: 04A2B3C4";
        let record = parse_log_line(line).unwrap();
        assert_eq!(record.socket, "socket 2");
        assert_eq!(record.event, TagEvent::Disconnected);
    }

    #[test]
    fn test_rejects_malformed_lines() {
        // no separator
        assert!(parse_log_line("hello world").is_none());
        // separator too far in
        assert!(parse_log_line("123456789012345678901234_a:b:c:d:e:f:Socket #1 tag: x").is_none());
        // non numeric id
        assert!(parse_log_line("abc_a:b:c:d:e:f:Socket #1: CABLE_CONNECTED tag: x").is_none());
        // too few fields
        assert!(parse_log_line("5_a:b:c:Socket #1: CABLE_CONNECTED tag: x").is_none());
        // no socket
        assert!(parse_log_line("5_a:b:c:d:e:f:CABLE_CONNECTED tag: x").is_none());
        // event without tag
        assert!(parse_log_line("5_a:b:c:d:e:f:Socket #1: CABLE_CONNECTED").is_none());
        // unrelated event
        assert!(parse_log_line("5_a:b:c:d:e:f:Socket #1: METER_READ tag: x").is_none());
    }

    #[test]
    fn test_buffer_dedup_and_eviction() {
        let mut buffer = LogBuffer::with_capacity(3);
        assert_eq!(buffer.extend_from_text("a\nb\n\na\nc"), 3);
        assert!(buffer.push("d"));
        assert_eq!(buffer.len(), 3);
        // "a" was evicted so it is accepted again
        assert!(buffer.push("a"));
        assert_eq!(buffer.iter_newest_first().collect::<Vec<_>>(), vec!["a", "d", "c"]);
    }

    #[test]
    fn test_apply_lines_keeps_newest_tag() {
        let mut buffer = LogBuffer::default();
        buffer.push("100_2024-01-15:09:00:00:INFO:ev:Socket #1: CABLE_CONNECTED, tag: OLDTAG");
        buffer.push(CONNECT);
        let mut facts = SocketTagFacts::new();
        // newest first: 200 applies, 100 is rejected
        assert_eq!(apply_log_lines(&buffer, &mut facts), 1);
        assert_eq!(
            facts.get("socket 1", TagPhase::Start, TagField::Tag).as_deref(),
            Some("04A2B3C4")
        );
        // replaying is a no-op
        assert_eq!(apply_log_lines(&buffer, &mut facts), 0);
    }

    #[test]
    fn test_empty_tag_advances_taglog_and_keeps_tag() {
        let mut facts = SocketTagFacts::new();
        let tagged =
            parse_log_line("100_2024-01-15:09:00:00:INFO:ev:Socket #1: CABLE_CONNECTED, tag: OLDTAG")
                .unwrap();
        let empty = parse_log_line("200_2024-01-15:10:00:00:INFO:ev:Socket #1: CABLE_CONNECTED, tag:")
            .unwrap();
        assert_eq!(empty.event, TagEvent::Connected { tag: None });

        assert!(apply_log_record(&tagged, &mut facts));
        assert!(apply_log_record(&empty, &mut facts));
        assert_eq!(
            facts.get("socket 1", TagPhase::Start, TagField::TagLog).as_deref(),
            Some("200")
        );
        assert_eq!(
            facts.get("socket 1", TagPhase::Start, TagField::Tag).as_deref(),
            Some("OLDTAG")
        );
        // older lines stay behind the advanced taglog
        assert!(!apply_log_record(&tagged, &mut facts));
    }
}
