//! Download collaborators: fetch, blob allocation, URL resolution
//!
//! The controller drives the single in-flight download through these traits;
//! implementations own the actual I/O.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use url::Url;

/// MIME type used when materializing the fetched plugin bytes.
pub const PLUGIN_MIME_TYPE: &str = "text/javascript";

/// A failed plugin fetch.
///
/// Never raised to the caller directly: it is delivered through the
/// registration's completion callback while the state machine lands in the
/// `error` status.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("unexpected HTTP status {0}")]
    Status(u16),
}

/// A plugin URL that could not be resolved to an absolute form.
#[derive(Debug, Error)]
#[error("invalid plugin URL {url:?}: {source}")]
pub struct ResolveError {
    pub url: String,
    #[source]
    pub source: url::ParseError,
}

/// One-shot asynchronous fetch of the plugin bytes. Single attempt, no retry.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Allocator for locally resolvable object references over downloaded bytes.
///
/// A reference returned by `create` is owned by this store and must be passed
/// to `revoke` exactly once before being discarded.
pub trait BlobStore: Send + Sync {
    fn create(&self, bytes: Vec<u8>, mime_type: &str) -> String;
    fn revoke(&self, blob_url: &str);
}

/// Resolves a caller-supplied plugin URL to an absolute form.
pub trait UrlResolver: Send + Sync {
    fn resolve(&self, raw: &str) -> Result<String, ResolveError>;
}

/// Resolver that joins relative URLs against an optional base and otherwise
/// requires an absolute URL.
#[derive(Debug, Clone, Default)]
pub struct BaseUrlResolver {
    base: Option<Url>,
}

impl BaseUrlResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base(base: Url) -> Self {
        Self { base: Some(base) }
    }
}

impl UrlResolver for BaseUrlResolver {
    fn resolve(&self, raw: &str) -> Result<String, ResolveError> {
        let resolved = match &self.base {
            Some(base) => base.join(raw),
            None => Url::parse(raw),
        };
        resolved
            .map(|url| url.to_string())
            .map_err(|source| ResolveError {
                url: raw.to_string(),
                source,
            })
    }
}

/// Blob store backed by process memory.
///
/// Handles are only resolvable through the store instance that created them;
/// a worker receiving the handle value over the transport cannot dereference
/// it, matching the host platform's object-URL semantics.
#[derive(Clone, Default)]
pub struct InMemoryBlobStore {
    blobs: Arc<Mutex<HashMap<String, StoredBlob>>>,
}

struct StoredBlob {
    bytes: Vec<u8>,
    mime_type: String,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a handle created by this store.
    pub fn get(&self, blob_url: &str) -> Option<Vec<u8>> {
        self.lock().get(blob_url).map(|blob| blob.bytes.clone())
    }

    /// MIME type recorded for a live handle.
    pub fn mime_type(&self, blob_url: &str) -> Option<String> {
        self.lock().get(blob_url).map(|blob| blob.mime_type.clone())
    }

    /// Number of live (unrevoked) blobs.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, StoredBlob>> {
        self.blobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl BlobStore for InMemoryBlobStore {
    fn create(&self, bytes: Vec<u8>, mime_type: &str) -> String {
        let blob_url = format!("blob:{}", uuid::Uuid::new_v4());
        self.lock().insert(
            blob_url.clone(),
            StoredBlob {
                bytes,
                mime_type: mime_type.to_string(),
            },
        );
        tracing::debug!(blob = %blob_url, "Blob created");
        blob_url
    }

    fn revoke(&self, blob_url: &str) {
        if self.lock().remove(blob_url).is_some() {
            tracing::debug!(blob = %blob_url, "Blob revoked");
        } else {
            tracing::warn!(blob = %blob_url, "Revoke of unknown blob reference");
        }
    }
}

/// HTTP fetch implementation over reqwest.
#[cfg(feature = "http")]
pub struct HttpFetcher {
    client: reqwest::Client,
}

#[cfg(feature = "http")]
impl HttpFetcher {
    const DOWNLOAD_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(60);

    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Self::DOWNLOAD_TIMEOUT)
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}
