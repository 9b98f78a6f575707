//! Wires a main-context controller to a worker-context view over a channel
//! transport and walks the plugin through its full lifecycle.
//!
//! Run with: `cargo run --example lifecycle`

use async_trait::async_trait;
use shaping_plugin_host::{
    BaseUrlResolver, FetchError, Fetcher, InMemoryBlobStore, PluginController, PluginState,
    WorkerView,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Stands in for the network: serves a canned plugin body.
struct CannedFetcher;

#[async_trait]
impl Fetcher for CannedFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        tracing::info!(url = %url, "Serving canned plugin body");
        Ok(b"// shaping plugin body".to_vec())
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "debug".into()))
        .init();

    let controller = PluginController::new(
        Arc::new(CannedFetcher),
        Arc::new(InMemoryBlobStore::new()),
        Arc::new(BaseUrlResolver::new()),
    );

    // Main → worker transport: every broadcast crosses as a msgpack payload.
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Vec<u8>>();
    controller
        .on_state_change(Box::new(move |state| {
            if let Ok(payload) = state.to_msgpack() {
                let _ = tx.send(payload);
            }
        }))
        .await;

    let view = WorkerView::new();
    let worker_view = view.clone();
    let worker = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            match PluginState::from_msgpack(&payload) {
                Ok(state) => worker_view.apply_state(state),
                Err(error) => tracing::warn!(error = %error, "Dropping malformed snapshot"),
            }
        }
    });

    let (done_tx, done_rx) = tokio::sync::oneshot::channel();
    controller
        .register(
            "https://cdn.example/shaper.js",
            Some(Box::new(move |outcome| {
                let _ = done_tx.send(outcome);
            })),
            false,
        )
        .await
        .expect("first registration");

    match done_rx.await.expect("completion fires") {
        None => tracing::info!("Download completed"),
        Some(error) => tracing::error!(error = %error, "Download failed"),
    }

    // Give the worker task a beat to apply the relayed snapshots.
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    tracing::info!(
        worker_status = %view.status(),
        worker_loaded = view.is_loaded(),
        urls = ?view.urls(),
        "Worker view after relay"
    );

    controller.clear().await;
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    tracing::info!(worker_status = %view.status(), "Worker view after clear");

    drop(controller);
    worker.abort();
}
