//! Remote fetch module.
//!
//! The host supplies a [`Transport`]; [`ConditionalFetchCache`] wraps it with
//! validator-based revalidation against a [`RevalidationStore`].
//!
//! [`RevalidationStore`]: crate::store::RevalidationStore

mod cache;
mod http;
#[cfg(test)]
pub(crate) mod testing;

pub use cache::*;
pub use http::*;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::store::{CacheEntry, StoreError};

/// Transport-level failures.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("unexpected status {status} from {locator}")]
    Status { status: u16, locator: String },
    #[error("remote answered not-modified but nothing is cached for {0}")]
    UnexpectedNotModified(String),
}

/// Errors surfaced by [`ConditionalFetchCache`].
#[derive(Error, Debug)]
pub enum FetchError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("could not decode payload for {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl FetchError {
    pub fn is_decode(&self) -> bool {
        matches!(self, FetchError::Decode { .. })
    }
}

/// Validators attached to a conditional request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conditional {
    pub validator: Option<String>,
    pub last_modified: Option<String>,
}

impl From<&CacheEntry> for Conditional {
    fn from(entry: &CacheEntry) -> Self {
        Self {
            validator: entry.validator.clone(),
            last_modified: entry.last_modified.clone(),
        }
    }
}

/// Outcome of a successful remote call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Fresh {
        body: String,
        validator: Option<String>,
        last_modified: Option<String>,
    },
    NotModified,
}

/// Generic remote-fetch capability.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(
        &self,
        locator: &str,
        conditional: Option<&Conditional>,
    ) -> Result<Response, TransportError>;
}

/// How a fetch interacts with the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    /// Send the stored validator; seed or replace the entry on a fresh body.
    #[default]
    Revalidate,
    /// Skip the validator; overwrite the entry only if one already exists.
    Bypass,
    /// Skip the validator and never write the response.
    NoStore,
}
