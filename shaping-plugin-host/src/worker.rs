//! Worker-context plugin view and shaping-function registry
//!
//! Workers never download. Their view of the plugin changes only through
//! inbound state snapshots relayed from the main context, plus the function
//! slots the executed plugin code itself populates.

use shaping_plugin_api::{PluginState, PluginStatus};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

/// Applies Arabic presentation forms to a run of text.
pub type ArabicShaper = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Reorders bidirectional text into visual-order lines at the given break
/// points.
pub type BidiProcessor = Arc<dyn Fn(&str, &[usize]) -> Vec<String> + Send + Sync>;

/// Like [`BidiProcessor`], but carries a per-character style index through
/// the reordering.
pub type StyledBidiProcessor =
    Arc<dyn Fn(&str, &[u8], &[usize]) -> Vec<(String, Vec<u8>)> + Send + Sync>;

/// Holder for the shaping callables supplied by the loaded plugin.
///
/// Populated by the plugin code once it executes in the worker; this crate
/// only reads presence, it never invokes the functions itself.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    inner: Arc<RwLock<RegistrySlots>>,
}

#[derive(Default)]
struct RegistrySlots {
    apply_arabic_shaping: Option<ArabicShaper>,
    process_bidirectional_text: Option<BidiProcessor>,
    process_styled_bidirectional_text: Option<StyledBidiProcessor>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install all three shaping functions at once.
    pub fn install(
        &self,
        arabic: ArabicShaper,
        bidi: BidiProcessor,
        styled_bidi: StyledBidiProcessor,
    ) {
        let mut slots = self.write();
        slots.apply_arabic_shaping = Some(arabic);
        slots.process_bidirectional_text = Some(bidi);
        slots.process_styled_bidirectional_text = Some(styled_bidi);
        tracing::debug!("Shaping functions installed");
    }

    /// True once all three function slots are populated.
    pub fn is_complete(&self) -> bool {
        let slots = self.read();
        slots.apply_arabic_shaping.is_some()
            && slots.process_bidirectional_text.is_some()
            && slots.process_styled_bidirectional_text.is_some()
    }

    pub fn arabic_shaper(&self) -> Option<ArabicShaper> {
        self.read().apply_arabic_shaping.clone()
    }

    pub fn bidi_processor(&self) -> Option<BidiProcessor> {
        self.read().process_bidirectional_text.clone()
    }

    pub fn styled_bidi_processor(&self) -> Option<StyledBidiProcessor> {
        self.read().process_styled_bidirectional_text.clone()
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistrySlots> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, RegistrySlots> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// URLs known to a worker, for diagnostics and replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginUrls {
    /// Blob reference created by the main context. Cannot be dereferenced
    /// here; propagated for bookkeeping only.
    pub blob: Option<String>,

    /// Original plugin source URL.
    pub host: Option<String>,
}

/// Worker-context replica of the plugin state.
///
/// The only mutation path is [`WorkerView::apply_state`] with a snapshot
/// relayed from the main context. A worker never registers, downloads, or
/// clears; the distinct [`crate::PluginController`] interface owns those.
#[derive(Clone, Default)]
pub struct WorkerView {
    state: Arc<RwLock<PluginState>>,
    registry: FunctionRegistry,
}

impl WorkerView {
    /// Create a view in the `unavailable` state with an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a view around an existing registry.
    pub fn with_registry(registry: FunctionRegistry) -> Self {
        Self {
            state: Arc::new(RwLock::new(PluginState::unavailable())),
            registry,
        }
    }

    /// Overwrite the local state verbatim from an inbound snapshot.
    pub fn apply_state(&self, state: PluginState) {
        tracing::debug!(status = %state.status, "Applying plugin state snapshot");
        *self
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Current mirrored status. Eventually consistent with the main context.
    pub fn status(&self) -> PluginStatus {
        self.read().status
    }

    /// True if the mirrored status is `loaded`, or the shaping functions
    /// have already been installed — the compiled functions can arrive
    /// before or independent of a status broadcast.
    pub fn is_loaded(&self) -> bool {
        self.read().status == PluginStatus::Loaded || self.registry.is_complete()
    }

    /// True once all three shaping functions are populated.
    pub fn is_parsed(&self) -> bool {
        self.registry.is_complete()
    }

    /// The locally known blob reference and original source URL.
    pub fn urls(&self) -> PluginUrls {
        let state = self.read();
        PluginUrls {
            blob: state.blob_url.clone(),
            host: state.url.clone(),
        }
    }

    /// The registry the plugin code populates on this worker.
    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    fn read(&self) -> RwLockReadGuard<'_, PluginState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn install_noop_functions(registry: &FunctionRegistry) {
        registry.install(
            Arc::new(|text: &str| text.to_string()),
            Arc::new(|text: &str, _breaks: &[usize]| vec![text.to_string()]),
            Arc::new(|text: &str, styles: &[u8], _breaks: &[usize]| {
                vec![(text.to_string(), styles.to_vec())]
            }),
        );
    }

    #[test]
    fn test_fresh_view_is_not_loaded() {
        let view = WorkerView::new();
        assert_eq!(view.status(), PluginStatus::Unavailable);
        assert!(!view.is_loaded());
        assert!(!view.is_parsed());
        assert_eq!(
            view.urls(),
            PluginUrls {
                blob: None,
                host: None
            }
        );
    }

    #[test]
    fn test_apply_state_overwrites_verbatim() {
        let view = WorkerView::new();
        view.apply_state(PluginState {
            status: PluginStatus::Loaded,
            url: Some("u".to_string()),
            blob_url: Some("b".to_string()),
        });

        assert!(view.is_loaded());
        assert_eq!(
            view.urls(),
            PluginUrls {
                blob: Some("b".to_string()),
                host: Some("u".to_string()),
            }
        );
    }

    #[test]
    fn test_functions_arriving_before_broadcast_count_as_loaded() {
        let view = WorkerView::new();
        install_noop_functions(view.registry());

        // No status broadcast has arrived, but the functions are live.
        assert_eq!(view.status(), PluginStatus::Unavailable);
        assert!(view.is_loaded());
        assert!(view.is_parsed());
    }

    #[test]
    fn test_registry_incomplete_until_all_slots_filled() {
        let registry = FunctionRegistry::new();
        assert!(!registry.is_complete());
        assert!(registry.arabic_shaper().is_none());

        install_noop_functions(&registry);
        assert!(registry.is_complete());

        let shaper = registry.arabic_shaper().unwrap();
        assert_eq!(shaper("سلام"), "سلام");
    }
}
