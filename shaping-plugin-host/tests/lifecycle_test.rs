//! End-to-end lifecycle tests: main-context controller relaying snapshots to
//! a worker-context view over a serialized transport.

use async_trait::async_trait;
use shaping_plugin_host::{
    BaseUrlResolver, FetchError, Fetcher, InMemoryBlobStore, PluginController, PluginState,
    PluginStatus, WorkerView,
};
use std::sync::{Arc, Mutex};

const PLUGIN_URL: &str = "https://cdn.example/shaper.js";

struct StaticFetcher(Vec<u8>);

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch(&self, _url: &str) -> Result<Vec<u8>, FetchError> {
        Ok(self.0.clone())
    }
}

struct FailingFetcher;

#[async_trait]
impl Fetcher for FailingFetcher {
    async fn fetch(&self, _url: &str) -> Result<Vec<u8>, FetchError> {
        Err(FetchError::Transport("connection refused".to_string()))
    }
}

fn controller(fetcher: Arc<dyn Fetcher>) -> (PluginController, InMemoryBlobStore) {
    let blobs = InMemoryBlobStore::new();
    let ctl = PluginController::new(
        fetcher,
        Arc::new(blobs.clone()),
        Arc::new(BaseUrlResolver::new()),
    );
    (ctl, blobs)
}

/// Subscribe a transport that records every broadcast as a serialized
/// payload, the way a real main→worker bridge would ship them.
async fn attach_transport(ctl: &PluginController) -> Arc<Mutex<Vec<Vec<u8>>>> {
    let payloads = Arc::new(Mutex::new(Vec::new()));
    let payloads_clone = payloads.clone();
    ctl.on_state_change(Box::new(move |state| {
        let encoded = state.to_msgpack().expect("state encodes");
        payloads_clone.lock().unwrap().push(encoded);
    }))
    .await;
    payloads
}

/// Deliver all queued payloads to a worker view, in order.
fn drain_to_worker(payloads: &Mutex<Vec<Vec<u8>>>, view: &WorkerView) {
    for payload in payloads.lock().unwrap().drain(..) {
        let state = PluginState::from_msgpack(&payload).expect("state decodes");
        view.apply_state(state);
    }
}

#[tokio::test]
async fn test_worker_mirrors_successful_download() {
    let (ctl, blobs) = controller(Arc::new(StaticFetcher(b"plugin code".to_vec())));
    let payloads = attach_transport(&ctl).await;
    let view = WorkerView::new();

    let (tx, rx) = tokio::sync::oneshot::channel();
    ctl.register(
        PLUGIN_URL,
        Some(Box::new(move |outcome| {
            let _ = tx.send(outcome);
        })),
        false,
    )
    .await
    .unwrap();
    assert!(rx.await.unwrap().is_none());

    drain_to_worker(&payloads, &view);

    assert!(view.is_loaded());
    assert!(!view.is_parsed());
    let urls = view.urls();
    assert_eq!(urls.host.as_deref(), Some(PLUGIN_URL));
    let blob = urls.blob.expect("blob reference relayed");

    // The relayed blob value is bookkeeping only; it resolves solely in the
    // context that created it.
    assert_eq!(blobs.get(&blob).as_deref(), Some(b"plugin code".as_slice()));
    let other_context = InMemoryBlobStore::new();
    assert!(other_context.get(&blob).is_none());
}

#[tokio::test]
async fn test_worker_mirrors_failed_download() {
    let (ctl, _blobs) = controller(Arc::new(FailingFetcher));
    let payloads = attach_transport(&ctl).await;
    let view = WorkerView::new();

    let (tx, rx) = tokio::sync::oneshot::channel();
    ctl.register(
        PLUGIN_URL,
        Some(Box::new(move |outcome| {
            let _ = tx.send(outcome);
        })),
        false,
    )
    .await
    .unwrap();
    let outcome = rx.await.unwrap();
    assert!(matches!(outcome, Some(FetchError::Transport(_))));

    drain_to_worker(&payloads, &view);
    assert_eq!(view.status(), PluginStatus::Error);
    assert!(!view.is_loaded());
    assert_eq!(view.urls().host.as_deref(), Some(PLUGIN_URL));
}

#[tokio::test]
async fn test_late_subscriber_sees_current_snapshot() {
    let (ctl, _blobs) = controller(Arc::new(StaticFetcher(Vec::new())));
    let (tx, rx) = tokio::sync::oneshot::channel();
    ctl.register(
        PLUGIN_URL,
        Some(Box::new(move |outcome| {
            let _ = tx.send(outcome);
        })),
        false,
    )
    .await
    .unwrap();
    rx.await.unwrap();

    // Subscribing after the fact immediately yields the loaded snapshot.
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = seen.clone();
    ctl.on_state_change(Box::new(move |state| {
        seen_clone.lock().unwrap().push(state.clone());
    }))
    .await;

    let snapshots = seen.lock().unwrap();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].status, PluginStatus::Loaded);
}

#[tokio::test]
async fn test_clear_propagates_to_worker() {
    let (ctl, blobs) = controller(Arc::new(StaticFetcher(b"x".to_vec())));
    let payloads = attach_transport(&ctl).await;
    let view = WorkerView::new();

    let (tx, rx) = tokio::sync::oneshot::channel();
    ctl.register(
        PLUGIN_URL,
        Some(Box::new(move |outcome| {
            let _ = tx.send(outcome);
        })),
        false,
    )
    .await
    .unwrap();
    rx.await.unwrap();
    ctl.clear().await;

    drain_to_worker(&payloads, &view);
    assert_eq!(view.status(), PluginStatus::Unavailable);
    assert!(!view.is_loaded());
    assert!(view.urls().blob.is_none());
    assert!(blobs.is_empty());

    // A fresh registration is accepted after clear.
    ctl.register(PLUGIN_URL, None, true).await.unwrap();
    assert_eq!(ctl.status().await, PluginStatus::Deferred);
}
