//! HTTP transport to the wallbox
//!
//! The device authenticates the TCP connection, not a cookie or token, so a
//! transport instance stands for exactly one connection. Once closed it is
//! never reused; the [`TransportFactory`] hands out a fresh one.

use crate::error::{Result, WallboxError};
use crate::logging::{StructuredLogger, get_logger};
use serde_json::Value;
use std::time::Duration;

/// HTTP method used by the device API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
        }
    }
}

/// One request against the device API
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    /// Path plus query, e.g. `/api/prop?cat=generic&offset=0`
    pub path: String,
    pub body: Option<Value>,
}

impl HttpRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body,
        }
    }
}

/// Raw device answer; the executor decides how to interpret the body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A single device connection
#[async_trait::async_trait]
pub trait Transport: Send {
    /// Send one request. Transport level failures map to `Network`/`Timeout`.
    async fn send(&mut self, request: &HttpRequest) -> Result<HttpResponse>;

    /// Whether the connection was torn down and must not be reused
    fn is_closed(&self) -> bool;

    /// Drop the connection
    async fn close(&mut self);
}

/// Produces fresh connections for a device
pub trait TransportFactory: Send + Sync {
    fn connect(&self) -> Result<Box<dyn Transport>>;
}

/// reqwest-backed transport keeping a single idle connection alive
pub struct ReqwestTransport {
    client: Option<reqwest::Client>,
    base_url: String,
    logger: StructuredLogger,
}

impl ReqwestTransport {
    pub fn new(host: &str, timeout: Duration) -> Result<Self> {
        // The device ships a self-signed certificate
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .pool_max_idle_per_host(1)
            .http1_only()
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client: Some(client),
            base_url: format!("https://{}", host),
            logger: get_logger("transport"),
        })
    }
}

#[async_trait::async_trait]
impl Transport for ReqwestTransport {
    async fn send(&mut self, request: &HttpRequest) -> Result<HttpResponse> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| WallboxError::network("Connection already closed"))?;

        let url = format!("{}{}", self.base_url, request.path);
        let builder = match request.method {
            Method::Get => client.get(&url),
            Method::Post => {
                let builder = client.post(&url);
                match &request.body {
                    Some(body) => builder.json(body),
                    None => builder,
                }
            }
        };

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        self.logger.trace(&format!(
            "{} {} -> {} ({} bytes)",
            request.method,
            request.path,
            status,
            body.len()
        ));
        Ok(HttpResponse { status, body })
    }

    fn is_closed(&self) -> bool {
        self.client.is_none()
    }

    async fn close(&mut self) {
        if self.client.take().is_some() {
            self.logger.debug("Connection closed");
        }
    }
}

/// Creates [`ReqwestTransport`]s for one host
#[derive(Debug, Clone)]
pub struct ReqwestTransportFactory {
    host: String,
    timeout: Duration,
}

impl ReqwestTransportFactory {
    pub fn new(host: &str, timeout: Duration) -> Self {
        Self {
            host: host.to_string(),
            timeout,
        }
    }
}

impl TransportFactory for ReqwestTransportFactory {
    fn connect(&self) -> Result<Box<dyn Transport>> {
        Ok(Box::new(ReqwestTransport::new(&self.host, self.timeout)?))
    }
}
