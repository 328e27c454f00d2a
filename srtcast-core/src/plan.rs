//! Engine invocation plans
//!
//! [`build`] composes the full ffmpeg argument vector for a capture source,
//! encoding profile and destination. It performs no I/O; the same inputs
//! always give an equal plan. When the engine lacks SRT the destination is
//! rewritten to plain UDP and the plan carries a warning saying so.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::EncodingProfile;
use crate::endpoint::{host_port, StreamProtocol};
use crate::engine::EngineCapability;
use crate::error::{Result, SrtcastError, ValidationErrors};
use crate::types::{CaptureSource, Platform};

/// Container format written to the destination
pub const OUTPUT_FORMAT: &str = "mpegts";

/// Non-fatal notes attached to a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlanWarning {
    /// The requested transport was replaced
    ProtocolDowngraded {
        from: StreamProtocol,
        to: StreamProtocol,
    },
}

impl std::fmt::Display for PlanWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ProtocolDowngraded { from, to } => write!(
                f,
                "{} not supported by the installed ffmpeg, streaming over {} instead",
                from, to
            ),
        }
    }
}

/// Executable, arguments and destination for one engine run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationPlan {
    program: PathBuf,
    args: Vec<String>,
    destination: String,
    protocol: StreamProtocol,
    warnings: Vec<PlanWarning>,
}

impl InvocationPlan {
    /// Plan for an arbitrary program, used to drive the supervisor directly
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, destination: impl Into<String>) -> Self {
        let destination = destination.into();
        Self {
            program: program.into(),
            args,
            protocol: StreamProtocol::from_url(&destination).unwrap_or(StreamProtocol::Udp),
            destination,
            warnings: Vec::new(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Output URL actually handed to the engine
    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn protocol(&self) -> StreamProtocol {
        self.protocol
    }

    pub fn warnings(&self) -> &[PlanWarning] {
        &self.warnings
    }

    /// Whether the requested transport was replaced
    pub fn is_downgraded(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| matches!(w, PlanWarning::ProtocolDowngraded { .. }))
    }

    /// Shell-style rendering for logs, secrets masked
    pub fn command_line(&self) -> String {
        let masked = crate::endpoint::safe_url(&self.destination);
        let args: Vec<&str> = self
            .args
            .iter()
            .map(|a| if *a == self.destination { masked.as_str() } else { a.as_str() })
            .collect();
        format!("{} {}", self.program.display(), args.join(" "))
    }
}

/// Compose the plan for streaming `source` to `endpoint_url`
pub fn build(
    platform: Platform,
    source: &CaptureSource,
    profile: &EncodingProfile,
    capability: &EngineCapability,
    endpoint_url: &str,
) -> Result<InvocationPlan> {
    profile.validate()?;

    let requested = StreamProtocol::from_url(endpoint_url).ok_or_else(|| {
        SrtcastError::validation(
            "destination",
            format!("Unsupported destination scheme in '{}'", endpoint_url),
        )
    })?;

    let mut warnings = Vec::new();
    let (destination, protocol) = if requested == StreamProtocol::Srt && !capability.supports_srt {
        let fallback = udp_fallback(endpoint_url)?;
        warnings.push(PlanWarning::ProtocolDowngraded {
            from: StreamProtocol::Srt,
            to: StreamProtocol::Udp,
        });
        (fallback, StreamProtocol::Udp)
    } else {
        (endpoint_url.to_string(), requested)
    };

    // Every source kind grabs the whole primary display
    debug!("Building {} plan for {} on {}", protocol, source, platform);

    let mut args = capture_args(platform, profile);
    args.extend(encode_args(platform, profile));
    args.extend(["-f".to_string(), OUTPUT_FORMAT.to_string(), destination.clone()]);

    Ok(InvocationPlan {
        program: capability.executable_path.clone(),
        args,
        destination,
        protocol,
        warnings,
    })
}

/// `udp://host:port` for an SRT URL, query dropped
fn udp_fallback(url: &str) -> Result<String> {
    let (host, port) = host_port(url).ok_or_else(|| {
        let mut errors = ValidationErrors::new();
        errors.push("destination", format!("Cannot derive host and port from '{}'", url));
        SrtcastError::Validation(errors)
    })?;
    Ok(format!("{}://{}:{}", StreamProtocol::Udp.scheme(), host, port))
}

fn capture_args(platform: Platform, profile: &EncodingProfile) -> Vec<String> {
    let fps = profile.frame_rate.to_string();
    let size = profile.resolution.to_string();

    let args: Vec<&str> = match platform {
        Platform::Windows => vec![
            "-f", "gdigrab", "-framerate", fps.as_str(), "-video_size", size.as_str(), "-i", "desktop",
        ],
        Platform::MacOs => vec![
            "-f", "avfoundation", "-framerate", fps.as_str(), "-pixel_format", "uyvy422", "-i", "2:none",
        ],
        Platform::Linux => vec![
            "-f", "x11grab", "-framerate", fps.as_str(), "-video_size", size.as_str(), "-i", ":0.0",
        ],
    };

    args.into_iter().map(String::from).collect()
}

fn encode_args(platform: Platform, profile: &EncodingProfile) -> Vec<String> {
    let bitrate = format!("{}k", profile.bitrate_kbps);
    let keyint = profile.keyframe_interval_frames.to_string();

    let mut args = vec![
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        profile.preset.as_str().to_string(),
        "-profile:v".to_string(),
        profile.h264_profile.as_str().to_string(),
        "-b:v".to_string(),
        bitrate.clone(),
        "-maxrate".to_string(),
        bitrate,
        "-bufsize".to_string(),
        format!("{}k", profile.bufsize_kbps()),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-g".to_string(),
        keyint.clone(),
        "-keyint_min".to_string(),
        keyint,
    ];

    // avfoundation cannot size the grab itself
    if platform == Platform::MacOs {
        args.push("-vf".to_string());
        args.push(format!(
            "scale={}:{}",
            profile.resolution.width, profile.resolution.height
        ));
    }

    args
}
