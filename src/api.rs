//! Device API vocabulary: endpoint paths, categories, property ids and commands

/// Endpoint paths, relative to `https://<host>`
pub const LOGIN: &str = "/api/login";
pub const LOGOUT: &str = "/api/logout";
pub const INFO: &str = "/api/info";
pub const PROP: &str = "/api/prop";
pub const CMD: &str = "/api/cmd";
pub const LOG: &str = "/api/log";
pub const TRANSACTIONS: &str = "/api/transactions";

/// Property categories
pub const CAT_GENERIC: &str = "generic";
pub const CAT_GENERIC2: &str = "generic2";
pub const CAT_METER1: &str = "meter1";
pub const CAT_METER2: &str = "meter2";
pub const CAT_METER4: &str = "meter4";
pub const CAT_STATES: &str = "states";
pub const CAT_TEMP: &str = "temp";
pub const CAT_OCPP: &str = "ocpp";
pub const CAT_MBUS_TCP: &str = "MbusTCP";
pub const CAT_COMM: &str = "comm";
pub const CAT_DISPLAY: &str = "display";
pub const CAT_LOGS: &str = "logs";
pub const CAT_TRANSACTIONS: &str = "transactions";

/// Every category the device knows about
pub const CATEGORIES: &[&str] = &[
    CAT_GENERIC,
    CAT_GENERIC2,
    CAT_METER1,
    CAT_METER2,
    CAT_METER4,
    CAT_STATES,
    CAT_TEMP,
    CAT_OCPP,
    CAT_MBUS_TCP,
    CAT_COMM,
    CAT_DISPLAY,
    CAT_LOGS,
    CAT_TRANSACTIONS,
];

/// Categories refreshed by rotation out of the box
pub const DEFAULT_REFRESH_CATEGORIES: &[&str] =
    &[CAT_GENERIC, CAT_GENERIC2, CAT_METER1, CAT_STATES, CAT_TEMP];

/// Property ids
pub const ID_CURRENT_LIMIT: &str = "2129_0";
pub const ID_AUTH_MODE: &str = "2126_0";
pub const ID_PHASE: &str = "2069_0";
pub const ID_PHASE_SWITCHING: &str = "2185_0";
pub const ID_GREEN_SHARE: &str = "3280_2";
pub const ID_COMFORT_POWER: &str = "3280_3";
pub const ID_NUMBER_OF_SOCKETS: &str = "205E_0";
pub const ID_AUTH_PLUG_AND_CHARGE_ID: &str = "2063_0";

/// Commands accepted by `/api/cmd`
pub const COMMAND_REBOOT: &str = "reboot";
pub const COMMAND_CLEAR_TRANSACTIONS: &str = "clear-transactions";

/// Start-tag value once a socket is disconnected
pub const NO_TAG: &str = "No Tag";

/// Max characters of the login display name
pub const DISPLAY_NAME_MAX: usize = 32;

/// Logs and transactions are text streams with their own schedule
pub fn is_stream_category(category: &str) -> bool {
    category == CAT_LOGS || category == CAT_TRANSACTIONS
}

/// Property ids are vendor codes such as `2129_0`
pub fn is_valid_param(param: &str) -> bool {
    !param.is_empty()
        && param
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// `cat=<category>&offset=<n>` query for a property page
pub fn category_query(category: &str, offset: u64) -> String {
    format!("{}?cat={}&offset={}", PROP, category, offset)
}

/// `id=<a>,<b>` query for single properties
pub fn ids_query(ids: &[&str]) -> String {
    format!("{}?id={}", PROP, ids.join(","))
}

pub fn log_query(offset: u64) -> String {
    format!("{}?offset={}", LOG, offset)
}

pub fn transactions_query(offset: u64) -> String {
    format!("{}?offset={}", TRANSACTIONS, offset)
}
