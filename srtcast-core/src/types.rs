//! Core types for srtcast
//!
//! Capture sources, the host platform, and session identifiers shared by the
//! detector, builder and supervisor.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for unique session IDs
static SESSION_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Identifier of one streaming session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(u64);

impl SessionId {
    /// Allocate the next session ID
    pub fn next() -> Self {
        Self(SESSION_COUNTER.fetch_add(1, Ordering::SeqCst))
    }

    /// Get the raw value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// ID of the preview pseudo-source
pub const EMBEDDED_PREVIEW_ID: &str = "embedded-preview";

/// Kind of capture source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// A single top-level window
    Window,
    /// A whole display
    Screen,
    /// Something that is not an OS window (e.g. the embedded preview)
    Virtual,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Window => write!(f, "Window"),
            SourceKind::Screen => write!(f, "Screen"),
            SourceKind::Virtual => write!(f, "Virtual"),
        }
    }
}

/// What the operator selected to capture
///
/// Owned by the caller; a session keeps a copy only for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaptureSource {
    /// Registry-specific identifier
    pub id: String,
    /// Human-readable name
    pub display_name: String,
    /// What kind of source this is
    pub kind: SourceKind,
}

impl CaptureSource {
    /// Create a capture source
    pub fn new(id: impl Into<String>, display_name: impl Into<String>, kind: SourceKind) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            kind,
        }
    }

    /// Create a window source
    pub fn window(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self::new(id, display_name, SourceKind::Window)
    }

    /// Create a screen source
    pub fn screen(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self::new(id, display_name, SourceKind::Screen)
    }

    /// The embedded/virtual preview pseudo-source
    pub fn embedded_preview() -> Self {
        Self::new(EMBEDDED_PREVIEW_ID, "Embedded Preview", SourceKind::Virtual)
    }

    /// Whether this is the preview pseudo-source
    pub fn is_embedded_preview(&self) -> bool {
        self.id == EMBEDDED_PREVIEW_ID
    }
}

impl std::fmt::Display for CaptureSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.kind, self.display_name)
    }
}

/// Host operating system, selecting the capture backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// GDI screen grab
    Windows,
    /// AVFoundation screen grab
    MacOs,
    /// X11 screen grab
    Linux,
}

impl Platform {
    /// Platform this binary was built for
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::MacOs
        } else {
            Self::Linux
        }
    }

    /// Engine executable file name
    pub fn engine_binary(&self) -> &'static str {
        match self {
            Self::Windows => "ffmpeg.exe",
            Self::MacOs | Self::Linux => "ffmpeg",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Windows => write!(f, "windows"),
            Self::MacOs => write!(f, "macos"),
            Self::Linux => write!(f, "linux"),
        }
    }
}
