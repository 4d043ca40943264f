//! Conditional fetch cache.

use chrono::Utc;
use serde::de::DeserializeOwned;
use std::sync::Arc;

use super::{CachePolicy, Conditional, FetchError, Response, Transport, TransportError};
use crate::store::{CacheEntry, RevalidationStore};

/// Wraps a [`Transport`] and keeps validators in a [`RevalidationStore`].
#[derive(Clone)]
pub struct ConditionalFetchCache {
    transport: Arc<dyn Transport>,
    store: Arc<dyn RevalidationStore>,
}

impl ConditionalFetchCache {
    pub fn new(transport: Arc<dyn Transport>, store: Arc<dyn RevalidationStore>) -> Self {
        Self { transport, store }
    }

    pub fn store(&self) -> &Arc<dyn RevalidationStore> {
        &self.store
    }

    /// Fetch the raw body for `key`.
    pub async fn fetch(
        &self,
        key: &str,
        locator: &str,
        policy: CachePolicy,
    ) -> Result<String, FetchError> {
        self.fetch_with(key, locator, policy, |body| Ok(body.to_string()))
            .await
    }

    /// Fetch and decode a JSON body. A body that fails to decode is never stored.
    pub async fn fetch_json<T: DeserializeOwned>(
        &self,
        key: &str,
        locator: &str,
        policy: CachePolicy,
    ) -> Result<T, FetchError> {
        self.fetch_with(key, locator, policy, |body| serde_json::from_str(body))
            .await
    }

    /// Like [`fetch_json`](Self::fetch_json), but falls back to the stored
    /// payload when the remote call fails.
    pub async fn fetch_or_cached<T: DeserializeOwned>(
        &self,
        key: &str,
        locator: &str,
        policy: CachePolicy,
    ) -> Result<T, FetchError> {
        let err = match self.fetch_json(key, locator, policy).await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        match self.store.get(key) {
            Ok(Some(entry)) => {
                tracing::warn!(key, error = %err, "fetch failed, serving stored payload");
                serde_json::from_str(&entry.payload).map_err(|source| FetchError::Decode {
                    key: key.to_string(),
                    source,
                })
            }
            _ => Err(err),
        }
    }

    async fn fetch_with<T, F>(
        &self,
        key: &str,
        locator: &str,
        policy: CachePolicy,
        decode: F,
    ) -> Result<T, FetchError>
    where
        F: Fn(&str) -> Result<T, serde_json::Error>,
    {
        let previous = match self.store.get(key) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(key, error = %e, "store read failed, fetching unconditionally");
                None
            }
        };

        let conditional = match policy {
            CachePolicy::Revalidate => previous
                .as_ref()
                .filter(|e| e.is_revalidatable())
                .map(Conditional::from),
            CachePolicy::Bypass | CachePolicy::NoStore => None,
        };

        let response = self
            .transport
            .request(locator, conditional.as_ref())
            .await
            .inspect_err(|e| tracing::warn!(key, locator, error = %e, "remote fetch failed"))?;

        match response {
            Response::NotModified => {
                let Some(sent) = previous.filter(|_| conditional.is_some()) else {
                    return Err(TransportError::UnexpectedNotModified(key.to_string()).into());
                };
                // Serve whatever is current now; a concurrent fresh write wins.
                let current = self.store.get(key)?.unwrap_or(sent);
                tracing::debug!(key, "not modified, serving cached payload");
                decode(current.payload.as_str()).map_err(|source| FetchError::Decode {
                    key: key.to_string(),
                    source,
                })
            }
            Response::Fresh {
                body,
                validator,
                last_modified,
            } => {
                let value = decode(body.as_str()).map_err(|source| {
                    tracing::warn!(key, error = %source, "discarding undecodable payload");
                    FetchError::Decode {
                        key: key.to_string(),
                        source,
                    }
                })?;

                let keep = match policy {
                    CachePolicy::Revalidate => true,
                    CachePolicy::Bypass => previous.is_some(),
                    CachePolicy::NoStore => false,
                };

                if keep {
                    let entry = CacheEntry {
                        validator,
                        last_modified,
                        payload: body,
                        retrieved_at: Utc::now(),
                    };
                    match self.store.put_if_newer(key, entry) {
                        Ok(true) => tracing::debug!(key, "stored fresh payload"),
                        Ok(false) => tracing::debug!(key, "fresh payload superseded by a newer entry"),
                        Err(e) => tracing::warn!(key, error = %e, "failed to store fresh payload"),
                    }
                }

                Ok(value)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::MockTransport;
    use crate::store::MemoryStore;
    use serde::Deserialize;

    const SEGMENTS: &str = "http://api/v0/risk-prediction/segment-colors";

    #[derive(Debug, Deserialize, PartialEq)]
    struct Colors {
        segment_colors: std::collections::BTreeMap<String, String>,
    }

    fn setup() -> (Arc<MockTransport>, Arc<MemoryStore>, ConditionalFetchCache) {
        let transport = Arc::new(MockTransport::new());
        let store = Arc::new(MemoryStore::new());
        let cache = ConditionalFetchCache::new(transport.clone(), store.clone());
        (transport, store, cache)
    }

    #[tokio::test]
    async fn test_miss_seeds_then_not_modified_serves_cached() {
        let (transport, store, cache) = setup();
        transport.set_resource(SEGMENTS, r##"{"segment_colors":{"U1-1":"#A92725"}}"##, Some("v1"));

        let first = cache
            .fetch("segments", SEGMENTS, CachePolicy::Revalidate)
            .await
            .unwrap();
        let seeded = store.get("segments").unwrap().unwrap();
        assert_eq!(seeded.validator.as_deref(), Some("v1"));

        let second = cache
            .fetch("segments", SEGMENTS, CachePolicy::Revalidate)
            .await
            .unwrap();
        assert_eq!(first, second);

        // Validator sent on the second call only, entry untouched afterwards.
        let calls = transport.calls_to(SEGMENTS);
        assert_eq!(calls.len(), 2);
        assert!(calls[0].conditional.is_none());
        assert_eq!(
            calls[1].conditional.as_ref().and_then(|c| c.validator.as_deref()),
            Some("v1")
        );
        assert_eq!(store.get("segments").unwrap().unwrap(), seeded);
    }

    #[tokio::test]
    async fn test_modified_replaces_entry() {
        let (transport, store, cache) = setup();
        transport.set_resource(SEGMENTS, r#"{"segment_colors":{}}"#, Some("v1"));
        cache
            .fetch("segments", SEGMENTS, CachePolicy::Revalidate)
            .await
            .unwrap();

        transport.set_resource(SEGMENTS, r##"{"segment_colors":{"U2-4":"#F05044"}}"##, Some("v2"));
        let colors: Colors = cache
            .fetch_json("segments", SEGMENTS, CachePolicy::Revalidate)
            .await
            .unwrap();
        assert_eq!(colors.segment_colors.len(), 1);

        let entry = store.get("segments").unwrap().unwrap();
        assert_eq!(entry.validator.as_deref(), Some("v2"));
        assert!(entry.payload.contains("U2-4"));
    }

    #[tokio::test]
    async fn test_transport_error_leaves_store_alone() {
        let (transport, store, cache) = setup();
        transport.set_resource(SEGMENTS, r#"{"segment_colors":{}}"#, Some("v1"));
        cache
            .fetch("segments", SEGMENTS, CachePolicy::Revalidate)
            .await
            .unwrap();
        let before = store.get("segments").unwrap();

        transport.set_failing(SEGMENTS, 503);
        let err = cache
            .fetch("segments", SEGMENTS, CachePolicy::Revalidate)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FetchError::Transport(TransportError::Status { status: 503, .. })
        ));
        assert_eq!(store.get("segments").unwrap(), before);

        // Callers holding a cached payload get it back.
        let colors: Colors = cache
            .fetch_or_cached("segments", SEGMENTS, CachePolicy::Revalidate)
            .await
            .unwrap();
        assert!(colors.segment_colors.is_empty());
    }

    #[tokio::test]
    async fn test_decode_error_keeps_valid_entry() {
        let (transport, store, cache) = setup();
        transport.set_resource(SEGMENTS, r#"{"segment_colors":{}}"#, Some("v1"));
        let _: Colors = cache
            .fetch_json("segments", SEGMENTS, CachePolicy::Revalidate)
            .await
            .unwrap();

        transport.set_resource(SEGMENTS, "<html>maintenance</html>", Some("v2"));
        let err = cache
            .fetch_json::<Colors>("segments", SEGMENTS, CachePolicy::Revalidate)
            .await
            .unwrap_err();
        assert!(err.is_decode());
        assert_eq!(
            store.get("segments").unwrap().unwrap().validator.as_deref(),
            Some("v1")
        );
    }

    #[tokio::test]
    async fn test_bypass_only_overwrites_existing() {
        let (transport, store, cache) = setup();
        let url = "http://api/basics/inspectors";
        transport.set_resource(url, "[]", Some("r1"));

        cache.fetch("inspectors:recent", url, CachePolicy::Bypass).await.unwrap();
        assert!(store.get("inspectors:recent").unwrap().is_none());

        cache
            .fetch("inspectors:recent", url, CachePolicy::Revalidate)
            .await
            .unwrap();
        transport.set_resource(url, "[1]", Some("r2"));
        cache.fetch("inspectors:recent", url, CachePolicy::Bypass).await.unwrap();

        assert!(transport.calls_to(url)[2].conditional.is_none());
        let entry = store.get("inspectors:recent").unwrap().unwrap();
        assert_eq!(entry.payload, "[1]");
    }

    #[tokio::test]
    async fn test_no_store_never_writes() {
        let (transport, store, cache) = setup();
        let url = "http://api/basics/inspectors?start=a&end=b";
        transport.set_resource(url, "[]", Some("p1"));

        cache.fetch("inspectors:prior-day", url, CachePolicy::NoStore).await.unwrap();
        store
            .put("inspectors:prior-day", CacheEntry::new("old", Some("p0".to_string())))
            .unwrap();
        cache.fetch("inspectors:prior-day", url, CachePolicy::NoStore).await.unwrap();

        assert_eq!(store.get("inspectors:prior-day").unwrap().unwrap().payload, "old");
        assert!(transport.calls().iter().all(|c| c.conditional.is_none()));
    }

    struct AlwaysNotModified;

    #[async_trait::async_trait]
    impl Transport for AlwaysNotModified {
        async fn request(
            &self,
            _locator: &str,
            _conditional: Option<&Conditional>,
        ) -> Result<Response, TransportError> {
            Ok(Response::NotModified)
        }
    }

    #[test]
    fn test_not_modified_without_entry_is_an_error() {
        let store = Arc::new(MemoryStore::new());
        let cache = ConditionalFetchCache::new(Arc::new(AlwaysNotModified), store.clone());

        let err = tokio_test::block_on(cache.fetch("segments", SEGMENTS, CachePolicy::Revalidate))
            .unwrap_err();
        assert!(matches!(
            err,
            FetchError::Transport(TransportError::UnexpectedNotModified(_))
        ));
        assert!(store.get("segments").unwrap().is_none());
    }

    /// Stores a newer entry mid-request, then answers not-modified for the old validator.
    struct ConcurrentWriter {
        store: Arc<MemoryStore>,
    }

    #[async_trait::async_trait]
    impl Transport for ConcurrentWriter {
        async fn request(
            &self,
            _locator: &str,
            conditional: Option<&Conditional>,
        ) -> Result<Response, TransportError> {
            assert_eq!(conditional.and_then(|c| c.validator.as_deref()), Some("v1"));
            let newer = CacheEntry::new(r#"{"segment_colors":{}}"#, Some("v2".to_string()));
            assert!(self.store.put_if_newer("segments", newer).unwrap());
            Ok(Response::NotModified)
        }
    }

    #[tokio::test]
    async fn test_not_modified_serves_concurrent_fresh_write() {
        let store = Arc::new(MemoryStore::new());
        store
            .put(
                "segments",
                CacheEntry::new(r##"{"segment_colors":{"U1-1":"#A92725"}}"##, Some("v1".to_string())),
            )
            .unwrap();
        let transport = Arc::new(ConcurrentWriter {
            store: store.clone(),
        });
        let cache = ConditionalFetchCache::new(transport, store.clone());

        let colors: Colors = cache
            .fetch_json("segments", SEGMENTS, CachePolicy::Revalidate)
            .await
            .unwrap();
        assert!(colors.segment_colors.is_empty());

        let entry = store.get("segments").unwrap().unwrap();
        assert_eq!(entry.validator.as_deref(), Some("v2"));
        assert_eq!(entry.payload, r#"{"segment_colors":{}}"#);
    }
}
