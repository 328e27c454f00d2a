//! srtcast Core Library
//!
//! Push a desktop screen or window to an SRT ingest endpoint through an
//! external ffmpeg process.
//!
//! This library provides:
//! - Engine discovery with SRT capability probing
//! - Deterministic SRT URL resolution
//! - Platform-specific ffmpeg invocation plans with UDP fallback
//! - Supervision of one exclusive streaming session
//! - A typed event bus for session observers
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────┐   ┌─────────┐   ┌────────────┐   ┌───────────┐
//! │ Resolver │──▶│  Detector  │──▶│ Builder │──▶│ Supervisor │──▶│ Event Bus │
//! │ (URL)    │   │ (cached)   │   │ (plan)  │   │ (ffmpeg)   │   │           │
//! └──────────┘   └────────────┘   └─────────┘   └────────────┘   └───────────┘
//! ```

pub mod config;
pub mod endpoint;
pub mod engine;
pub mod error;
pub mod events;
#[cfg(unix)]
pub mod ipc;
pub mod orchestrator;
pub mod plan;
pub mod session;
pub mod sources;
pub mod types;

pub use config::{ConfigFile, EncodingProfile, QualityPreset, Resolution};
pub use endpoint::{resolve, TransportEndpoint};
pub use engine::{CapabilityDetector, EngineCapability};
pub use error::{ErrorKind, Result, SrtcastError};
pub use events::{EventBus, SessionEvent, Subscription};
pub use orchestrator::{Orchestrator, StartRequest};
pub use plan::{InvocationPlan, PlanWarning};
pub use session::{SessionState, SessionStatus, Supervisor};
pub use types::{CaptureSource, Platform, SessionId, SourceKind};
