//! Login, logout and device identity

use super::{lock, read, write};
use crate::api;
use crate::driver::types::DeviceInfo;
use crate::transport::HttpRequest;
use serde_json::json;
use tokio::time::{Instant, timeout};

impl super::AlfenDevice {
    /// Session display name: friendly name cut to 32 characters
    fn login_display_name(&self) -> String {
        let name = read(&self.name);
        let source = if name.is_empty() {
            &self.display_name
        } else {
            &*name
        };
        source.chars().take(api::DISPLAY_NAME_MAX).collect()
    }

    /// Log in on the current connection.
    ///
    /// Never raises: rate limiting, transport and HTTP failures are logged and
    /// reported as `false` without touching the authenticated flag. A closed
    /// connection is replaced by a fresh one from the factory first.
    pub async fn login(&self) -> bool {
        {
            let mut session = lock(&self.session);
            session.keep_logout = false;
            let now = Instant::now();
            if !session.limiter.try_acquire(now) {
                let wait = session
                    .limiter
                    .locked_out_until(now)
                    .map(|until| until.saturating_duration_since(now).as_secs())
                    .unwrap_or_default();
                self.logger.warn(&format!(
                    "Login blocked by rate limiter: {} attempts in {}s window, retry in {}s",
                    self.session_config.login_max_attempts,
                    session.limiter.window().as_secs(),
                    wait
                ));
                return false;
            }
        }

        let body = json!({
            "username": self.username,
            "password": self.password,
            "displayName": self.login_display_name(),
        });
        let request = HttpRequest::post(api::LOGIN, Some(body));

        let mut connection = self.connection.lock().await;
        if connection.is_closed() {
            self.logger
                .debug("Connection is closed, recreating before login");
            match self.connector.connect() {
                Ok(fresh) => *connection = fresh,
                Err(e) => {
                    self.logger.error(&format!(
                        "Could not open a new connection: {}",
                        self.sanitize(&e.to_string())
                    ));
                    return false;
                }
            }
        }

        self.logger
            .debug(&format!("Attempting login for user {}", self.username));
        let outcome = timeout(self.request_timeout, connection.send(&request)).await;
        drop(connection);

        match outcome {
            Ok(Ok(response)) if response.is_success() => {
                lock(&self.session).mark_authenticated();
                self.logger.debug(&format!(
                    "Login successful (status {})",
                    response.status
                ));
                true
            }
            Ok(Ok(response)) => {
                self.logger.error(&format!(
                    "Login request failed: HTTP status {}",
                    response.status
                ));
                false
            }
            Ok(Err(e)) => {
                self.logger.error(&format!(
                    "Login request failed: {}",
                    self.sanitize(&e.to_string())
                ));
                false
            }
            Err(_) => {
                self.logger.error("Login request timed out");
                false
            }
        }
    }

    /// Log out and drop the connection.
    ///
    /// Sets the stay-logged-out flag first, so every other request is refused
    /// until the next [`login`](Self::login). The logout call itself is only
    /// sent while the session is authenticated.
    pub async fn logout(&self) {
        let was_authenticated = {
            let mut session = lock(&self.session);
            session.keep_logout = true;
            session.authenticated
        };

        let mut connection = self.connection.lock().await;
        if was_authenticated {
            let request = HttpRequest::post(api::LOGOUT, None);
            match timeout(self.request_timeout, connection.send(&request)).await {
                Ok(Ok(response)) => self.logger.debug(&format!(
                    "Logout response status {}",
                    response.status
                )),
                Ok(Err(e)) => self.logger.warn(&format!(
                    "Logout request failed: {}",
                    self.sanitize(&e.to_string())
                )),
                Err(_) => self.logger.warn("Timeout on logout"),
            }
        }
        connection.close().await;
        drop(connection);

        lock(&self.session).mark_logged_out();
        self.logger.debug("Logged out and closed the connection");
    }

    /// Fetch `/api/info`; installs generic info and returns false when unavailable
    pub async fn get_info(&self) -> bool {
        let parsed = match self.get_json(api::INFO).await {
            Some(value) => match serde_json::from_value::<DeviceInfo>(value) {
                Ok(info) => Some(info),
                Err(e) => {
                    self.logger
                        .debug(&format!("Unexpected info payload: {}", e));
                    None
                }
            },
            None => None,
        };

        match parsed {
            Some(info) => {
                self.logger.debug(&format!(
                    "Device {} model {} firmware {}",
                    info.identity, info.model, info.firmware_version
                ));
                *write(&self.info) = Some(info);
                true
            }
            None => {
                self.logger
                    .debug("Info API not available, use generic info");
                *write(&self.info) = Some(DeviceInfo::generic(&self.host));
                false
            }
        }
    }

    /// Log in if needed and load the device identity.
    ///
    /// Derives the name from the identity when none was configured.
    pub async fn init(&self) -> bool {
        if !self.is_logged_in() {
            self.logger.debug("Not logged in - logging in before init");
            if !self.login().await {
                self.logger.debug("Login failed - init cannot continue");
                return false;
            }
        }

        let result = self.get_info().await;
        let name = {
            let mut name = write(&self.name);
            if name.is_empty() {
                if let Some(info) = read(&self.info).as_ref() {
                    *name = format!("{} ({})", info.identity, self.host);
                }
            }
            name.clone()
        };
        *write(&self.device_id) = Some(format!("alfen_{}", name));
        result
    }
}
