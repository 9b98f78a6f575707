//! shaping-plugin-host: lifecycle runtime for the lazily-loaded text-shaping plugin
//!
//! The main context owns a [`PluginController`] that registers, downloads,
//! and clears the plugin; worker contexts hold a [`WorkerView`] updated only
//! by relayed state snapshots.

pub mod controller;
pub mod downloader;
pub mod events;
pub mod worker;

pub use controller::{CompletionCallback, PluginController, UsageError};
#[cfg(feature = "http")]
pub use downloader::HttpFetcher;
pub use downloader::{
    BaseUrlResolver, BlobStore, FetchError, Fetcher, InMemoryBlobStore, ResolveError, UrlResolver,
};
pub use events::{EventBus, StateCallback, Subscription};
pub use worker::{
    ArabicShaper, BidiProcessor, FunctionRegistry, PluginUrls, StyledBidiProcessor, WorkerView,
};
pub use shaping_plugin_api::{PluginState, PluginStatus};
