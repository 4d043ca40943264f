//! HTTP transport implementation.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use reqwest::StatusCode;
use std::time::Duration;

use super::{Conditional, Response, Transport, TransportError};

/// [`Transport`] over HTTP(S) using `If-None-Match` / `If-Modified-Since`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("freifahren-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;

        Ok(Self { client, timeout })
    }

    fn map_error(&self, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout(self.timeout)
        } else {
            TransportError::Network(e.to_string())
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(
        &self,
        locator: &str,
        conditional: Option<&Conditional>,
    ) -> Result<Response, TransportError> {
        let url = normalize_locator(locator);
        let mut request = self.client.get(&url);

        if let Some(cond) = conditional {
            if let Some(validator) = &cond.validator {
                request = request.header(IF_NONE_MATCH, validator.as_str());
            }
            if let Some(last_modified) = &cond.last_modified {
                request = request.header(IF_MODIFIED_SINCE, last_modified.as_str());
            }
        }

        let response = request.send().await.map_err(|e| self.map_error(e))?;

        let status = response.status();
        if status == StatusCode::NOT_MODIFIED {
            return Ok(Response::NotModified);
        }
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                locator: url,
            });
        }

        let validator = header_string(response.headers(), ETAG);
        let last_modified = header_string(response.headers(), LAST_MODIFIED);

        let body = response.text().await.map_err(|e| self.map_error(e))?;

        Ok(Response::Fresh {
            body,
            validator,
            last_modified,
        })
    }
}

fn normalize_locator(locator: &str) -> String {
    if locator.starts_with("http://") || locator.starts_with("https://") {
        locator.to_string()
    } else {
        format!("http://{}", locator)
    }
}

fn header_string(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .filter(|v| !v.is_empty())
}
