//! Request executor
//!
//! Every device call funnels through [`AlfenDevice::execute`]: it logs in
//! first when needed, holds the execution lock for the network round trip,
//! and turns a 401 into exactly one re-login plus one retry. Failures never
//! escape as errors; callers see `None`.

use super::lock;
use crate::transport::{HttpRequest, Method};
use serde_json::Value;
use tokio::time::timeout;

/// Result of one round trip under the execution lock
enum Dispatch {
    Done(String),
    Unauthorized,
    TimedOut,
    Failed(String),
}

impl super::AlfenDevice {
    async fn dispatch(&self, request: &HttpRequest) -> Dispatch {
        let mut connection = self.connection.lock().await;
        self.logger
            .debug(&format!("{} request {}", request.method, request.path));
        match timeout(self.request_timeout, connection.send(request)).await {
            Err(_) => Dispatch::TimedOut,
            Ok(Err(e)) if e.is_timeout() => Dispatch::TimedOut,
            Ok(Err(e)) => Dispatch::Failed(self.sanitize(&e.to_string())),
            Ok(Ok(response)) if response.status == 401 => Dispatch::Unauthorized,
            Ok(Ok(response)) if !response.is_success() => {
                Dispatch::Failed(format!("HTTP status {}", response.status))
            }
            Ok(Ok(response)) => Dispatch::Done(response.body),
        }
    }

    /// Send a request, returning the raw body on success
    pub(crate) async fn execute(&self, request: &HttpRequest) -> Option<String> {
        let mut allowed_login = true;
        loop {
            if self.keep_logout() {
                return None;
            }

            if allowed_login && !self.is_logged_in() {
                self.logger.debug(&format!(
                    "Not logged in, authenticating before {}",
                    request.method
                ));
                if !self.login().await {
                    self.logger
                        .debug(&format!("Login failed - skipping {} request", request.method));
                    return None;
                }
            }

            match self.dispatch(request).await {
                Dispatch::Done(body) => return Some(body),
                Dispatch::Unauthorized if allowed_login => {
                    lock(&self.session).mark_unauthenticated();
                    self.logger.warn(&format!(
                        "{} returned 401 Unauthorized - connection may have been closed by wallbox",
                        request.method
                    ));
                    if !self.login().await {
                        self.logger
                            .debug("Re-authentication failed - skipping retry");
                        return None;
                    }
                    allowed_login = false;
                }
                Dispatch::Unauthorized => {
                    lock(&self.session).mark_unauthenticated();
                    self.logger.error(&format!(
                        "{} {} still unauthorized after re-login",
                        request.method, request.path
                    ));
                    return None;
                }
                Dispatch::TimedOut => {
                    self.logger
                        .warn(&format!("Timeout on {} {}", request.method, request.path));
                    return None;
                }
                Dispatch::Failed(message) => {
                    // The first attempt's failure is reported by the retry, if any
                    if allowed_login {
                        self.logger.debug(&format!(
                            "{} {} failed: {}",
                            request.method, request.path, message
                        ));
                    } else {
                        self.logger.error(&format!(
                            "Unexpected error on {} {}: {}",
                            request.method, request.path, message
                        ));
                    }
                    return None;
                }
            }
        }
    }

    /// GET returning the body as text
    pub(crate) async fn get_text(&self, path: &str) -> Option<String> {
        self.execute(&HttpRequest::get(path)).await
    }

    /// GET returning the body as JSON
    pub(crate) async fn get_json(&self, path: &str) -> Option<Value> {
        let body = self.get_text(path).await?;
        match serde_json::from_str(&body) {
            Ok(value) => Some(value),
            Err(e) => {
                self.logger
                    .error(&format!("Failed to parse JSON from GET {}: {}", path, e));
                None
            }
        }
    }

    /// POST a JSON body.
    ///
    /// `Some(Value::Null)` means the device accepted the request without a
    /// usable body, which includes its trailing-comma JSON.
    pub(crate) async fn post(&self, path: &str, body: Option<Value>) -> Option<Value> {
        let request = HttpRequest::post(path, body);
        let text = self.execute(&request).await?;
        parse_post_body(&text).or_else(|| {
            self.logger.error(&format!(
                "JSONDecodeError on {} {}",
                Method::Post,
                path
            ));
            None
        })
    }
}

/// Interpret a POST response body, tolerating the device's trailing commas
pub(crate) fn parse_post_body(text: &str) -> Option<Value> {
    if text.trim().is_empty() {
        return Some(Value::Null);
    }
    match serde_json::from_str(text) {
        Ok(value) => Some(value),
        Err(e) if e.to_string().contains("trailing comma") => Some(Value::Null),
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_body_quirks() {
        assert_eq!(parse_post_body(""), Some(Value::Null));
        assert_eq!(parse_post_body("{\"a\": 1,}"), Some(Value::Null));
        assert_eq!(parse_post_body("[1, 2,]"), Some(Value::Null));
        assert_eq!(
            parse_post_body("{\"ok\": true}"),
            Some(serde_json::json!({"ok": true}))
        );
        assert_eq!(parse_post_body("{broken"), None);
    }
}
