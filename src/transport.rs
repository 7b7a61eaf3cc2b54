//! Blocking HTTP transport shared by the protocol clients.
//!
//! All network I/O in this crate is synchronous with a per-client timeout.
//! The trait seam exists so the protocol clients can be exercised in tests
//! with stub transports instead of a live HTTP stack.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request to {0} timed out")]
    Timeout(String),
    #[error("connection to {0} failed: {1}")]
    Connection(String, String),
}

/// A decoded HTTP response: status code plus body text.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Minimal blocking HTTP operations used by the classify, catalog and token
/// clients.
pub trait Transport: Send + Sync {
    fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<HttpResponse, TransportError>;

    fn post_form(
        &self,
        url: &str,
        basic_auth: Option<(&str, &str)>,
        form: &[(&str, &str)],
    ) -> Result<HttpResponse, TransportError>;
}

/// Production transport over `reqwest::blocking`.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    fn map_error(url: &str, err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout(url.to_string())
        } else {
            TransportError::Connection(url.to_string(), err.to_string())
        }
    }

    fn read_response(
        url: &str,
        response: reqwest::blocking::Response,
    ) -> Result<HttpResponse, TransportError> {
        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|e| Self::map_error(url, e))?;
        Ok(HttpResponse { status, body })
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<HttpResponse, TransportError> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        let response = request.send().map_err(|e| Self::map_error(url, e))?;
        Self::read_response(url, response)
    }

    fn post_form(
        &self,
        url: &str,
        basic_auth: Option<(&str, &str)>,
        form: &[(&str, &str)],
    ) -> Result<HttpResponse, TransportError> {
        let mut request = self.client.post(url).form(form);
        if let Some((user, password)) = basic_auth {
            request = request.basic_auth(user, Some(password));
        }
        let response = request.send().map_err(|e| Self::map_error(url, e))?;
        Self::read_response(url, response)
    }
}
