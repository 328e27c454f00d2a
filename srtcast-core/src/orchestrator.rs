//! Streaming session orchestrator
//!
//! Facade over the detector, resolver, builder and supervisor. A start request
//! flows through them in that order; any failure along the way is returned to
//! the caller and also published on the event bus.

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{ConfigFile, EncodingProfile};
use crate::endpoint::{self, TransportEndpoint};
use crate::engine::{CapabilityDetector, DetectorOptions, EngineCapability, SystemReport};
use crate::error::{Result, SrtcastError};
use crate::events::{EventBus, SessionEvent, Subscription};
use crate::plan::{self, InvocationPlan};
use crate::session::{SessionMeta, SessionState, SessionStatus, Supervisor, SupervisorOptions};
use crate::sources::{DefaultSourceRegistry, SourceRegistry};
use crate::types::{CaptureSource, Platform, SessionId};

/// Everything needed to start streaming
#[derive(Debug, Clone)]
pub struct StartRequest {
    /// Source ID from the registry
    pub source_id: String,
    pub profile: EncodingProfile,
    pub endpoint: TransportEndpoint,
    /// Used as `streamid` when the endpoint has none
    pub stream_key: String,
    /// Stream over UDP when the engine lacks SRT
    pub allow_fallback: bool,
}

impl StartRequest {
    pub fn new(source_id: impl Into<String>, endpoint: TransportEndpoint) -> Self {
        Self {
            source_id: source_id.into(),
            profile: EncodingProfile::default(),
            endpoint,
            stream_key: String::new(),
            allow_fallback: false,
        }
    }

    pub fn with_profile(mut self, profile: EncodingProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_stream_key(mut self, key: impl Into<String>) -> Self {
        self.stream_key = key.into();
        self
    }

    pub fn with_fallback(mut self, allow: bool) -> Self {
        self.allow_fallback = allow;
        self
    }
}

/// Entry point for hosts driving a streaming session
pub struct Orchestrator {
    detector: Arc<CapabilityDetector>,
    supervisor: Supervisor,
    sources: Arc<dyn SourceRegistry>,
    platform: Platform,
}

impl Orchestrator {
    /// Assemble from explicit parts
    pub fn new(
        detector: Arc<CapabilityDetector>,
        supervisor: Supervisor,
        sources: Arc<dyn SourceRegistry>,
        platform: Platform,
    ) -> Self {
        Self {
            detector,
            supervisor,
            sources,
            platform,
        }
    }

    /// Real engine, real processes and the default source registry
    pub fn from_config(config: &ConfigFile) -> Self {
        let detector = CapabilityDetector::new(DetectorOptions::from(&config.engine));
        let supervisor = Supervisor::new(
            EventBus::new(),
            SupervisorOptions {
                stop_grace: config.engine.stop_grace(),
                ..SupervisorOptions::default()
            },
        );

        Self::new(
            Arc::new(detector),
            supervisor,
            Arc::new(DefaultSourceRegistry),
            Platform::current(),
        )
    }

    /// Replace the source registry
    pub fn with_sources(mut self, sources: Arc<dyn SourceRegistry>) -> Self {
        self.sources = sources;
        self
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Resolve, detect, build and spawn
    pub async fn start_session(&self, request: &StartRequest) -> Result<SessionId> {
        let (plan, source) = match self.prepare(request).await {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!("Cannot start session: {}", e);
                self.bus().publish(SessionEvent::error(None, &e));
                return Err(e);
            }
        };

        let meta = SessionMeta {
            source: Some(source),
            profile: Some(request.profile.clone()),
        };
        let id = self.supervisor.start_with(&plan, meta).await?;

        for warning in plan.warnings() {
            warn!("{}: {}", id, warning);
            self.bus().publish(SessionEvent::plan_warning(Some(id), warning));
        }
        Ok(id)
    }

    /// Build the plan a request would run, without starting it
    pub async fn plan(&self, request: &StartRequest) -> Result<InvocationPlan> {
        self.prepare(request).await.map(|(plan, _)| plan)
    }

    async fn prepare(&self, request: &StartRequest) -> Result<(InvocationPlan, CaptureSource)> {
        request.profile.validate()?;
        let url = endpoint::resolve(&request.endpoint, &request.stream_key)?;

        let source = self
            .sources
            .find(&request.source_id)
            .ok_or_else(|| SrtcastError::SourceNotFound(request.source_id.clone()))?;

        let capability = self.detector.detect().await?;
        let plan = plan::build(self.platform, &source, &request.profile, &capability, &url)?;

        if plan.is_downgraded() && !request.allow_fallback {
            return Err(SrtcastError::ProtocolUnsupported(format!(
                "{} has no SRT support and fallback to UDP was not allowed",
                capability.executable_path.display()
            )));
        }

        info!(
            "Prepared {} stream of {} to {}",
            plan.protocol(),
            source,
            endpoint::safe_url(plan.destination())
        );
        Ok((plan, source))
    }

    /// Stop the active session; returns its final state
    pub async fn stop_session(&self) -> Result<SessionState> {
        self.supervisor.stop().await
    }

    pub async fn session_status(&self) -> SessionStatus {
        self.supervisor.status().await
    }

    /// Transport URL for an endpoint and stream key
    pub fn resolve_endpoint(&self, endpoint: &TransportEndpoint, stream_key: &str) -> Result<String> {
        endpoint::resolve(endpoint, stream_key).map_err(SrtcastError::from)
    }

    /// Cached engine capability
    pub async fn capability(&self) -> Result<EngineCapability> {
        self.detector.detect().await
    }

    /// Drop the cached capability and probe again
    pub async fn refresh_capability(&self) -> Result<EngineCapability> {
        self.detector.invalidate().await;
        self.detector.detect().await
    }

    pub async fn system_report(&self) -> Result<SystemReport> {
        self.detector.system_report(self.platform).await
    }

    /// Push a short synthetic clip to an endpoint
    pub async fn test_endpoint(&self, endpoint: &TransportEndpoint, stream_key: &str, timeout: Duration) -> Result<()> {
        let url = self.resolve_endpoint(endpoint, stream_key)?;
        self.detector.test_endpoint(&url, timeout).await
    }

    pub fn list_sources(&self) -> Vec<CaptureSource> {
        self.sources.list_sources()
    }

    pub fn subscribe(&self) -> Subscription {
        self.bus().subscribe()
    }

    pub fn bus(&self) -> &EventBus {
        self.supervisor.bus()
    }
}
