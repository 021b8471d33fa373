use super::*;

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            host: "192.168.1.100".to_string(),
            name: String::new(),
            username: default_username(),
            password: String::new(),
            display_name: "alfen-wallbox".to_string(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: 5,
            request_timeout_secs: 20,
            cycle_timeout_secs: 60,
            bootstrap_timeout_secs: 120,
            categories: api::DEFAULT_REFRESH_CATEGORIES
                .iter()
                .map(|c| c.to_string())
                .collect(),
            categories_per_cycle: 3,
            category_fetch_delay_secs: 2.0,
            log_every_cycles: 20,
            transactions_every_cycles: 60,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            login_max_attempts: 5,
            login_window_secs: 60,
            login_timeout_secs: 10,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            file: "/tmp/alfen_wallbox.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}
