use serde::{Deserialize, Serialize};

/// Poller state
#[derive(Debug, Clone, PartialEq)]
pub enum DriverState {
    /// Poller created, no cycle run yet
    Initializing,
    /// Last cycle succeeded
    Running,
    /// Last cycle failed
    Error(String),
    /// Poller is shutting down
    ShuttingDown,
}

/// Per-step timings of a single update cycle in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CycleStepDurations {
    /// Proactive login (only when the session was logged out)
    pub login_ms: Option<u64>,
    /// Draining pending writes, including the confirmation re-fetch
    pub writes_ms: Option<u64>,
    /// One-time load of the static categories
    pub bootstrap_ms: Option<u64>,
    /// Rotating category fetch
    pub rotate_ms: Option<u64>,
    /// Device log fetch (every Nth cycle)
    pub logs_ms: Option<u64>,
    /// Transaction log fetch (every Mth cycle)
    pub transactions_ms: Option<u64>,
}

/// Outcome of the last update cycle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CycleReport {
    pub success: bool,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub duration_ms: u64,
    /// Rotating categories fetched this cycle
    pub categories: Vec<String>,
    /// Rotation pointer after the cycle
    pub rotation_index: usize,
    pub steps: CycleStepDurations,
}

/// Messages asking the poller for an out-of-band cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshRequest {
    /// A write was queued for this property id
    ValueQueued(String),
    /// Polling options changed
    OptionsChanged,
    /// Explicit request from the host
    Manual,
}

/// Identity reported by `/api/info`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceInfo {
    #[serde(rename = "Identity", default)]
    pub identity: String,
    #[serde(rename = "FWVersion", default)]
    pub firmware_version: String,
    #[serde(rename = "Model", default)]
    pub model: String,
    #[serde(rename = "ObjectId", default)]
    pub object_id: String,
    #[serde(rename = "Type", default)]
    pub kind: String,
}

impl DeviceInfo {
    /// Stand-in used when the info endpoint is unavailable
    pub fn generic(host: &str) -> Self {
        Self {
            identity: host.to_string(),
            firmware_version: "?".to_string(),
            model: "Generic Alfen Wallbox".to_string(),
            object_id: "?".to_string(),
            kind: "?".to_string(),
        }
    }
}
