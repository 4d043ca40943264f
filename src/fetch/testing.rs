//! In-process transport double that behaves like an ETag-aware server.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use super::{Conditional, Response, Transport, TransportError};

enum Route {
    Resource { body: String, etag: Option<String> },
    Failing(u16),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub locator: String,
    pub conditional: Option<Conditional>,
}

#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<HashMap<String, Route>>,
    calls: Mutex<Vec<Call>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` at `locator`, answering not-modified when `etag` matches.
    pub fn set_resource(&self, locator: &str, body: &str, etag: Option<&str>) {
        self.routes.lock().unwrap().insert(
            locator.to_string(),
            Route::Resource {
                body: body.to_string(),
                etag: etag.map(str::to_string),
            },
        );
    }

    pub fn set_failing(&self, locator: &str, status: u16) {
        self.routes
            .lock()
            .unwrap()
            .insert(locator.to_string(), Route::Failing(status));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, locator: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.locator == locator)
            .collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn request(
        &self,
        locator: &str,
        conditional: Option<&Conditional>,
    ) -> Result<Response, TransportError> {
        self.calls.lock().unwrap().push(Call {
            locator: locator.to_string(),
            conditional: conditional.cloned(),
        });

        let routes = self.routes.lock().unwrap();
        match routes.get(locator) {
            Some(Route::Resource { body, etag }) => {
                let sent = conditional.and_then(|c| c.validator.as_ref());
                if etag.is_some() && sent == etag.as_ref() {
                    return Ok(Response::NotModified);
                }
                Ok(Response::Fresh {
                    body: body.clone(),
                    validator: etag.clone(),
                    last_modified: None,
                })
            }
            Some(Route::Failing(status)) => Err(TransportError::Status {
                status: *status,
                locator: locator.to_string(),
            }),
            None => Err(TransportError::Status {
                status: 404,
                locator: locator.to_string(),
            }),
        }
    }
}
