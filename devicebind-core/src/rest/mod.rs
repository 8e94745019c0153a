//! REST collaborator used for verification submission and challenge pulls.
//!
//! The engine builds [`RestRequest`] values and hands them to a [`RestClient`];
//! it never talks to the network itself.

#[cfg(feature = "network")]
mod http_client;

#[cfg(feature = "network")]
pub use http_client::{HttpClientConfig, HttpRestClient};

use std::fmt;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::error::{ServerError, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, PartialEq)]
pub struct RestRequest {
    pub url: Url,
    pub method: HttpMethod,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
}

impl RestRequest {
    pub fn get(url: Url) -> Self {
        Self {
            url,
            method: HttpMethod::Get,
            body: None,
            headers: vec![("Accept".into(), "application/json".into())],
        }
    }

    pub fn post(url: Url, body: Option<Value>) -> Self {
        let mut headers = vec![("Accept".into(), "application/json".into())];
        if body.is_some() {
            headers.push(("Content-Type".into(), "application/json".into()));
        }
        Self {
            url,
            method: HttpMethod::Post,
            body,
            headers,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

// Query strings and bodies carry signed responses and credentials.
impl fmt::Debug for RestRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut url = self.url.clone();
        url.set_query(None);
        let headers: Vec<(&str, &str)> = self
            .headers
            .iter()
            .map(|(n, v)| {
                if n.eq_ignore_ascii_case("authorization") {
                    (n.as_str(), "[REDACTED]")
                } else {
                    (n.as_str(), v.as_str())
                }
            })
            .collect();
        f.debug_struct("RestRequest")
            .field("url", &url.as_str())
            .field("method", &self.method)
            .field("body", &self.body.as_ref().map(|_| "[REDACTED]"))
            .field("headers", &headers)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RestResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turn non-2xx statuses and empty bodies into their transport errors.
    pub fn ensure_success(self) -> Result<Self, TransportError> {
        if !self.is_success() {
            let server_error = serde_json::from_slice::<ServerError>(&self.body)
                .ok()
                .filter(|e| e.error_code.is_some() || e.error_summary.is_some());
            return Err(TransportError::Status {
                status: self.status,
                server_error,
            });
        }
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return Err(TransportError::EmptyBody {
                status: self.status,
            });
        }
        Ok(self)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, TransportError> {
        serde_json::from_slice(&self.body).map_err(|e| TransportError::Decode(e.to_string()))
    }
}

#[async_trait]
pub trait RestClient: Send + Sync {
    async fn submit(&self, request: RestRequest) -> Result<RestResponse, TransportError>;
}
