//! Per-socket charging facts reconstructed from the log and transaction streams
//!
//! Facts are keyed by socket (`"socket 1"`), then [`TagPhase`], then
//! [`TagField`]. Tag updates coming from the device log carry a line id and
//! only ever move forward: an update whose line id is not above the stored
//! `taglog` is ignored, so replaying pages in any order converges.

use crate::api::NO_TAG;
use crate::diagnostics::short_hash;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::BTreeMap;

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Which record a fact came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TagPhase {
    Start,
    Stop,
    Mv,
    LastStart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagField {
    Tag,
    Date,
    Kwh,
    TagLog,
}

/// Facts for one socket/phase
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PhaseFacts {
    pub tag: Option<String>,
    pub date: Option<String>,
    #[serde(rename = "kWh")]
    pub kwh: Option<String>,
    /// Highest log line id applied to `tag`
    pub taglog: u64,
}

impl PhaseFacts {
    fn field(&self, field: TagField) -> Option<String> {
        match field {
            TagField::Tag => self.tag.clone(),
            TagField::Date => self.date.clone(),
            TagField::Kwh => self.kwh.clone(),
            TagField::TagLog => Some(self.taglog.to_string()),
        }
    }
}

/// `socket -> phase -> facts`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SocketTagFacts {
    sockets: BTreeMap<String, BTreeMap<TagPhase, PhaseFacts>>,
}

impl SocketTagFacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.sockets.is_empty()
    }

    pub fn phase(&self, socket: &str, phase: TagPhase) -> Option<&PhaseFacts> {
        self.sockets.get(socket)?.get(&phase)
    }

    pub fn get(&self, socket: &str, phase: TagPhase, field: TagField) -> Option<String> {
        self.phase(socket, phase)?.field(field)
    }

    fn entry(&mut self, socket: &str, phase: TagPhase) -> &mut PhaseFacts {
        self.sockets
            .entry(socket.to_string())
            .or_default()
            .entry(phase)
            .or_default()
    }

    /// Apply a tag seen on log line `line_id`.
    ///
    /// `tag` is `None` for disconnects, which store the "No Tag" sentinel.
    /// Returns whether the update was newer than what is stored.
    pub fn apply_tag(&mut self, socket: &str, line_id: u64, tag: Option<&str>) -> bool {
        let facts = self.entry(socket, TagPhase::Start);
        if line_id <= facts.taglog {
            return false;
        }
        facts.taglog = line_id;
        facts.tag = Some(tag.unwrap_or(NO_TAG).to_string());
        true
    }

    /// Move `taglog` forward to `line_id` and keep the stored tag.
    ///
    /// Used for connect lines whose tag field is empty.
    pub fn advance_taglog(&mut self, socket: &str, line_id: u64) -> bool {
        let facts = self.entry(socket, TagPhase::Start);
        if line_id <= facts.taglog {
            return false;
        }
        facts.taglog = line_id;
        true
    }

    /// Record the date and energy reading of a transaction record
    pub fn set_reading(&mut self, socket: &str, phase: TagPhase, date: &str, kwh: &str) {
        let facts = self.entry(socket, phase);
        facts.date = Some(date.to_string());
        facts.kwh = Some(kwh.to_string());
    }

    /// Copy the current start reading into `last_start` (on transaction stop)
    pub fn snapshot_last_start(&mut self, socket: &str) {
        let Some(start) = self.phase(socket, TagPhase::Start).cloned() else {
            return;
        };
        let last = self.entry(socket, TagPhase::LastStart);
        if start.kwh.is_some() {
            last.kwh = start.kwh;
        }
        if start.date.is_some() {
            last.date = start.date;
        }
    }

    fn kwh(&self, socket: &str, phase: TagPhase) -> Option<f64> {
        self.phase(socket, phase)?.kwh.as_deref()?.trim().parse().ok()
    }

    fn date(&self, socket: &str, phase: TagPhase) -> Option<NaiveDateTime> {
        let raw = self.phase(socket, phase)?.date.as_deref()?;
        NaiveDateTime::parse_from_str(raw.trim(), DATE_FORMAT).ok()
    }

    fn energy_between(&self, socket: &str, from: TagPhase, to: TagPhase) -> Option<f64> {
        let delta = self.kwh(socket, to)? - self.kwh(socket, from)?;
        (delta >= 0.0).then_some(delta)
    }

    fn duration_between(
        &self,
        socket: &str,
        from: TagPhase,
        to: TagPhase,
    ) -> Option<chrono::Duration> {
        let delta = self.date(socket, to)? - self.date(socket, from)?;
        (delta >= chrono::Duration::zero()).then_some(delta)
    }

    /// Energy charged so far in the running session (meter value minus start)
    pub fn session_energy_kwh(&self, socket: &str) -> Option<f64> {
        self.energy_between(socket, TagPhase::Start, TagPhase::Mv)
    }

    /// Energy of the last finished session
    pub fn last_session_energy_kwh(&self, socket: &str) -> Option<f64> {
        self.energy_between(socket, TagPhase::LastStart, TagPhase::Stop)
    }

    pub fn session_duration(&self, socket: &str) -> Option<chrono::Duration> {
        self.duration_between(socket, TagPhase::Start, TagPhase::Mv)
    }

    pub fn last_session_duration(&self, socket: &str) -> Option<chrono::Duration> {
        self.duration_between(socket, TagPhase::LastStart, TagPhase::Stop)
    }

    /// JSON view with every tag hashed
    pub fn redacted_json(&self) -> serde_json::Value {
        let mut out = serde_json::Map::new();
        for (socket, phases) in &self.sockets {
            let mut socket_obj = serde_json::Map::new();
            for (phase, facts) in phases {
                let mut facts = facts.clone();
                facts.tag = facts.tag.as_deref().map(redact_tag);
                let key = serde_json::to_value(phase)
                    .ok()
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_default();
                socket_obj.insert(
                    key,
                    serde_json::to_value(&facts).unwrap_or(serde_json::Value::Null),
                );
            }
            out.insert(socket.clone(), serde_json::Value::Object(socket_obj));
        }
        serde_json::Value::Object(out)
    }
}

/// Short stable stand-in for an RFID tag, safe to log
pub fn redact_tag(tag: &str) -> String {
    if tag.is_empty() || tag == NO_TAG {
        return tag.to_string();
    }
    format!("<tag:{}>", short_hash(tag))
}
