//! Capture source registry
//!
//! Enumerating OS windows is left to the host application, which injects its
//! own [`SourceRegistry`]. The default registry only knows the primary display
//! and the embedded preview, both of which capture the whole screen.

use crate::types::CaptureSource;

/// ID of the primary display in the default registry
pub const PRIMARY_SCREEN_ID: &str = "screen:0";

/// Provider of selectable capture sources
pub trait SourceRegistry: Send + Sync {
    /// Sources the operator may pick from
    fn list_sources(&self) -> Vec<CaptureSource>;

    /// Find a source by ID
    fn find(&self, id: &str) -> Option<CaptureSource> {
        self.list_sources().into_iter().find(|s| s.id == id)
    }
}

/// Primary display plus the embedded preview
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultSourceRegistry;

impl SourceRegistry for DefaultSourceRegistry {
    fn list_sources(&self) -> Vec<CaptureSource> {
        vec![
            CaptureSource::screen(PRIMARY_SCREEN_ID, "Entire Screen"),
            CaptureSource::embedded_preview(),
        ]
    }
}

/// Registry over a fixed list, for hosts that enumerate sources up front
#[derive(Debug, Default, Clone)]
pub struct StaticSourceRegistry {
    sources: Vec<CaptureSource>,
}

impl StaticSourceRegistry {
    pub fn new(sources: Vec<CaptureSource>) -> Self {
        Self { sources }
    }
}

impl SourceRegistry for StaticSourceRegistry {
    fn list_sources(&self) -> Vec<CaptureSource> {
        self.sources.clone()
    }
}
