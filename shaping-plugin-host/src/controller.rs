//! Main-context plugin lifecycle controller
//!
//! Owns the canonical plugin state, performs the one-shot download through
//! the injected collaborators, and broadcasts every mutation. Exactly one
//! registration is permitted until `clear` resets it, and at most one fetch
//! is ever in flight per registration.

use crate::downloader::{
    BlobStore, FetchError, Fetcher, ResolveError, UrlResolver, PLUGIN_MIME_TYPE,
};
use crate::events::{EventBus, StateCallback, Subscription};
use shaping_plugin_api::{PluginState, PluginStatus};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// Completion callback for a download attempt, invoked exactly once with
/// `None` on success or the fetch error on failure.
pub type CompletionCallback = Box<dyn FnOnce(Option<FetchError>) + Send + Sync>;

/// Programming errors in the lifecycle API, surfaced immediately to the
/// caller. Fetch failures are not usage errors; they flow through the
/// completion callback instead.
#[derive(Debug, Error)]
pub enum UsageError {
    #[error("plugin already registered (status: {0})")]
    AlreadyRegistered(PluginStatus),

    #[error("no deferred plugin registration to download (status: {0})")]
    NotDeferred(PluginStatus),

    #[error(transparent)]
    InvalidUrl(#[from] ResolveError),
}

/// Main-context controller for the plugin lifecycle.
///
/// Clones share the same underlying state. Workers never hold one of these;
/// they observe state through [`crate::WorkerView`] instead, fed by the
/// snapshots this controller broadcasts.
#[derive(Clone)]
pub struct PluginController {
    inner: Arc<RwLock<ControllerInner>>,
    bus: EventBus,
    fetcher: Arc<dyn Fetcher>,
    blobs: Arc<dyn BlobStore>,
    resolver: Arc<dyn UrlResolver>,
}

struct ControllerInner {
    state: PluginState,
    completion: Option<CompletionCallback>,
    /// Bumped by `clear`. A download completion whose captured epoch no
    /// longer matches must not touch state.
    epoch: u64,
}

impl PluginController {
    /// Create a controller in the `unavailable` state.
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        blobs: Arc<dyn BlobStore>,
        resolver: Arc<dyn UrlResolver>,
    ) -> Self {
        Self {
            inner: Arc::new(RwLock::new(ControllerInner {
                state: PluginState::unavailable(),
                completion: None,
                epoch: 0,
            })),
            bus: EventBus::new(),
            fetcher,
            blobs,
            resolver,
        }
    }

    /// Register the plugin URL.
    ///
    /// Fails with [`UsageError::AlreadyRegistered`] while a registration is
    /// live (status `deferred`, `loading`, or `loaded`). Re-registration is
    /// permitted from `unavailable` and from `error`.
    ///
    /// Unless `defer_download` is set, the download starts immediately; the
    /// stored `completion` callback reports its outcome either way.
    pub async fn register(
        &self,
        url: &str,
        completion: Option<CompletionCallback>,
        defer_download: bool,
    ) -> Result<(), UsageError> {
        let resolved = self.resolver.resolve(url)?;

        {
            let mut inner = self.inner.write().await;
            match inner.state.status {
                PluginStatus::Deferred | PluginStatus::Loading | PluginStatus::Loaded => {
                    return Err(UsageError::AlreadyRegistered(inner.state.status));
                }
                PluginStatus::Unavailable | PluginStatus::Error => {}
            }

            inner.state = PluginState {
                status: PluginStatus::Deferred,
                url: Some(resolved.clone()),
                blob_url: None,
            };
            inner.completion = completion;
            tracing::info!(url = %resolved, "Plugin registered");
            self.bus.publish(&inner.state);
        }

        if !defer_download {
            self.start_download().await?;
        }
        Ok(())
    }

    /// Start the download for a deferred registration.
    ///
    /// Fails with [`UsageError::NotDeferred`] unless the status is `deferred`
    /// with a stored URL, which also guarantees a fetch is never re-entered
    /// while one is already in flight. The fetch itself runs on a spawned
    /// task; this returns as soon as the `loading` transition is broadcast.
    pub async fn start_download(&self) -> Result<(), UsageError> {
        let (url, completion, epoch) = {
            let mut inner = self.inner.write().await;
            let url = match (inner.state.status, &inner.state.url) {
                (PluginStatus::Deferred, Some(url)) => url.clone(),
                _ => return Err(UsageError::NotDeferred(inner.state.status)),
            };

            inner.state.status = PluginStatus::Loading;
            let completion = inner.completion.take();
            let epoch = inner.epoch;
            tracing::info!(url = %url, "Plugin download started");
            self.bus.publish(&inner.state);
            (url, completion, epoch)
        };

        let controller = self.clone();
        tokio::spawn(async move {
            controller.run_download(url, completion, epoch).await;
        });
        Ok(())
    }

    /// Reset to `unavailable`, revoking an existing blob reference.
    ///
    /// Idempotent: a second call in a row does nothing and never
    /// double-revokes. Does not abort an in-flight fetch; a late completion
    /// observes the epoch bump and leaves the reset state untouched.
    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        if inner.state.status == PluginStatus::Unavailable {
            return;
        }

        if let Some(blob_url) = inner.state.blob_url.take() {
            self.blobs.revoke(&blob_url);
        }
        inner.state = PluginState::unavailable();
        inner.completion = None;
        inner.epoch += 1;
        tracing::info!("Plugin state cleared");
        self.bus.publish(&inner.state);
    }

    /// Current lifecycle status.
    pub async fn status(&self) -> PluginStatus {
        self.inner.read().await.state.status
    }

    /// Snapshot of the current state, suitable for relaying to workers.
    pub async fn state(&self) -> PluginState {
        self.inner.read().await.state.clone()
    }

    /// Whether a download is in flight. Only the main context can answer
    /// this; worker mirrors lag the canonical state.
    pub async fn is_loading(&self) -> bool {
        self.status().await == PluginStatus::Loading
    }

    /// Subscribe to state broadcasts.
    ///
    /// The current snapshot is delivered synchronously before this returns;
    /// every subsequent mutation is then delivered in order. Callbacks run
    /// under the controller's state lock and must not call back into it.
    pub async fn on_state_change(&self, callback: StateCallback) -> Subscription {
        let inner = self.inner.read().await;
        self.bus.subscribe(&inner.state, callback)
    }

    /// Drop a subscription registered via [`Self::on_state_change`].
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        self.bus.unsubscribe(subscription)
    }

    async fn run_download(self, url: String, completion: Option<CompletionCallback>, epoch: u64) {
        let outcome = match self.fetcher.fetch(&url).await {
            Ok(bytes) => {
                let blob_url = self.blobs.create(bytes, PLUGIN_MIME_TYPE);
                let mut inner = self.inner.write().await;
                if inner.epoch == epoch {
                    inner.state.status = PluginStatus::Loaded;
                    inner.state.blob_url = Some(blob_url);
                    tracing::info!(url = %url, "Plugin downloaded");
                    self.bus.publish(&inner.state);
                } else {
                    // Cleared while the fetch was in flight: the reset state
                    // stands, and the freshly created blob is released.
                    drop(inner);
                    tracing::debug!(url = %url, "Discarding stale plugin download");
                    self.blobs.revoke(&blob_url);
                }
                None
            }
            Err(error) => {
                let mut inner = self.inner.write().await;
                if inner.epoch == epoch {
                    inner.state.status = PluginStatus::Error;
                    tracing::warn!(url = %url, error = %error, "Plugin download failed");
                    self.bus.publish(&inner.state);
                }
                Some(error)
            }
        };

        // The completion only reports the outcome; it never re-derives or
        // re-sets status, so a stale report after `clear` is harmless.
        if let Some(callback) = completion {
            callback(outcome);
        }
    }
}
