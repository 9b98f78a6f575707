//! shaping-plugin-api: Shared state types for the text-shaping plugin system
//!
//! This crate defines the snapshot payload relayed from the main context to
//! worker contexts. Communication uses MessagePack serialization.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of the shaping plugin.
///
/// Transitions move strictly forward, `unavailable → deferred → loading →
/// {loaded, error}`; only a clear jumps back to `unavailable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginStatus {
    /// No plugin registered.
    Unavailable,

    /// Registered, download not started.
    Deferred,

    /// Download in flight.
    Loading,

    /// Download succeeded and the bytes were materialized as a blob.
    Loaded,

    /// Download failed. A new registration is permitted from here.
    Error,
}

impl fmt::Display for PluginStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PluginStatus::Unavailable => "unavailable",
            PluginStatus::Deferred => "deferred",
            PluginStatus::Loading => "loading",
            PluginStatus::Loaded => "loaded",
            PluginStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Snapshot of the plugin lifecycle, broadcast on every mutation.
///
/// `blob_url` is set only while `status` is [`PluginStatus::Loaded`]. The
/// value is propagated to workers for bookkeeping, but a blob reference can
/// only be dereferenced by the context that created it; other contexts must
/// re-fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginState {
    /// Current lifecycle status.
    pub status: PluginStatus,

    /// Resolved absolute URL of the plugin source. Set at registration,
    /// present for every status except `unavailable`.
    #[serde(default)]
    pub url: Option<String>,

    /// Locally materialized object reference to the downloaded bytes.
    #[serde(default)]
    pub blob_url: Option<String>,
}

impl PluginState {
    /// The initial state: nothing registered.
    pub fn unavailable() -> Self {
        Self {
            status: PluginStatus::Unavailable,
            url: None,
            blob_url: None,
        }
    }

    /// Serialize for the main→worker transport.
    pub fn to_msgpack(&self) -> Result<Vec<u8>, rmp_serde::encode::Error> {
        rmp_serde::to_vec(self)
    }

    /// Deserialize an inbound transport payload.
    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, rmp_serde::decode::Error> {
        rmp_serde::from_slice(bytes)
    }
}

impl Default for PluginState {
    fn default() -> Self {
        Self::unavailable()
    }
}
