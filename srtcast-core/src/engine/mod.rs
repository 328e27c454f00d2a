//! Encoding engine discovery
//!
//! Finds an ffmpeg-compatible executable and works out whether it can push
//! SRT. Candidates are probed one at a time with bounded `-version` runs; the
//! first one that answers is asked for its protocol list. The result is cached
//! for the life of the detector until [`CapabilityDetector::invalidate`].

mod probe;

pub use probe::{ProbeOutput, ProbeRunner, SystemProbeRunner};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::EngineSettings;
use crate::endpoint::safe_url;
use crate::error::{Result, SrtcastError};
use crate::types::Platform;

/// Bound on the endpoint connection test
pub const CONNECTION_TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Version string used when the banner cannot be parsed
pub const UNKNOWN_VERSION: &str = "unknown";

/// What the local encoding engine can do
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineCapability {
    /// Executable to launch
    pub executable_path: PathBuf,
    /// Version token from the `-version` banner
    pub version_string: String,
    /// Whether `srt` is an available output protocol
    pub supports_srt: bool,
    /// False for the bundled fallback
    pub is_system_installed: bool,
}

impl EngineCapability {
    /// Operator-facing summary of SRT availability
    pub fn srt_message(&self) -> &'static str {
        if self.supports_srt {
            "SRT streaming available"
        } else {
            "SRT not supported - please install FFmpeg with SRT support for streaming"
        }
    }
}

/// Capability plus host details for `srtcast info`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemReport {
    pub platform: Platform,
    pub capability: EngineCapability,
    pub srt_message: String,
}

/// Detector settings
#[derive(Debug, Clone)]
pub struct DetectorOptions {
    /// Host platform, selects the well-known install locations
    pub platform: Platform,
    /// Executable tried before everything else
    pub configured_path: Option<PathBuf>,
    /// Fallback executable; defaults to one beside the running binary
    pub bundled_path: Option<PathBuf>,
    /// Bound on each `-version` probe
    pub version_timeout: Duration,
    /// Bound on the `-protocols` probe
    pub protocol_timeout: Duration,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            platform: Platform::current(),
            configured_path: None,
            bundled_path: None,
            version_timeout: Duration::from_secs(3),
            protocol_timeout: Duration::from_secs(3),
        }
    }
}

impl From<&EngineSettings> for DetectorOptions {
    fn from(settings: &EngineSettings) -> Self {
        Self {
            platform: Platform::current(),
            configured_path: settings.path.clone(),
            bundled_path: settings.bundled_path.clone(),
            version_timeout: settings.version_timeout(),
            protocol_timeout: settings.protocol_timeout(),
        }
    }
}

/// Discovers and caches the engine capability
pub struct CapabilityDetector {
    runner: Arc<dyn ProbeRunner>,
    candidates: Vec<PathBuf>,
    bundled: Option<PathBuf>,
    version_timeout: Duration,
    protocol_timeout: Duration,
    /// Held across probing so concurrent callers wait for one scan
    cache: Mutex<Option<EngineCapability>>,
}

impl CapabilityDetector {
    /// Detector probing real executables
    pub fn new(options: DetectorOptions) -> Self {
        Self::with_runner(options, Arc::new(SystemProbeRunner))
    }

    /// Detector with a custom probe runner
    pub fn with_runner(options: DetectorOptions, runner: Arc<dyn ProbeRunner>) -> Self {
        let candidates = candidate_paths(options.platform, options.configured_path.as_deref());
        let bundled = options
            .bundled_path
            .or_else(|| default_bundled_path(options.platform));

        Self {
            runner,
            candidates,
            bundled,
            version_timeout: options.version_timeout,
            protocol_timeout: options.protocol_timeout,
            cache: Mutex::new(None),
        }
    }

    /// Candidates in probe order
    pub fn candidates(&self) -> &[PathBuf] {
        &self.candidates
    }

    /// Cached capability, probing on first use
    pub async fn detect(&self) -> Result<EngineCapability> {
        let mut cache = self.cache.lock().await;
        if let Some(ref capability) = *cache {
            return Ok(capability.clone());
        }

        let capability = self.probe().await?;
        *cache = Some(capability.clone());
        Ok(capability)
    }

    /// Cached capability without probing
    pub async fn cached(&self) -> Option<EngineCapability> {
        self.cache.lock().await.clone()
    }

    /// Drop the cached capability so the next `detect` re-probes
    pub async fn invalidate(&self) {
        let mut cache = self.cache.lock().await;
        if cache.take().is_some() {
            debug!("Engine capability cache invalidated");
        }
    }

    /// Capability plus SRT availability message
    pub async fn system_report(&self, platform: Platform) -> Result<SystemReport> {
        let capability = self.detect().await?;
        Ok(SystemReport {
            platform,
            srt_message: capability.srt_message().to_string(),
            capability,
        })
    }

    /// Push one second of synthetic video to `url`
    ///
    /// Succeeds only on a clean exit with no refusal or failure in the
    /// engine's diagnostics.
    pub async fn test_endpoint(&self, url: &str, timeout: Duration) -> Result<()> {
        let capability = self.detect().await?;
        info!("Testing connection to {}", safe_url(url));

        let args = [
            "-f",
            "lavfi",
            "-i",
            "testsrc=duration=1:size=640x480:rate=30",
            "-c:v",
            "libx264",
            "-preset",
            "ultrafast",
            "-t",
            "1",
            "-f",
            "mpegts",
            url,
        ];

        let output = self
            .runner
            .run(&capability.executable_path, &args, timeout)
            .await?;

        let diagnostics = output.combined();
        if let Some(line) = diagnostics
            .lines()
            .find(|l| l.contains("Connection refused") || l.contains("failed"))
        {
            return Err(SrtcastError::process(output.exit_code, line.trim()));
        }

        if !output.success() {
            let last = diagnostics.lines().last().unwrap_or("").trim().to_string();
            return Err(SrtcastError::process(output.exit_code, last));
        }

        Ok(())
    }

    async fn probe(&self) -> Result<EngineCapability> {
        for candidate in &self.candidates {
            let output = match self
                .runner
                .run(candidate, &["-version"], self.version_timeout)
                .await
            {
                Ok(output) if output.success() => output,
                Ok(output) => {
                    debug!(
                        "{} -version exited with {:?}",
                        candidate.display(),
                        output.exit_code
                    );
                    continue;
                }
                Err(e) => {
                    debug!("{} not usable: {}", candidate.display(), e);
                    continue;
                }
            };

            let version_string = parse_version(&output.stdout);
            let supports_srt = self.probe_srt(candidate).await;

            info!(
                "Using engine {} (version {}, SRT {})",
                candidate.display(),
                version_string,
                if supports_srt { "available" } else { "unavailable" }
            );

            return Ok(EngineCapability {
                executable_path: candidate.clone(),
                version_string,
                supports_srt,
                is_system_installed: true,
            });
        }

        let Some(bundled) = self.bundled.as_ref().filter(|p| p.exists()) else {
            return Err(SrtcastError::unavailable(format!(
                "No ffmpeg found (tried {})",
                self.candidates
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        };

        warn!(
            "No system ffmpeg found, using bundled {} without SRT support",
            bundled.display()
        );

        let version_string = match self
            .runner
            .run(bundled, &["-version"], self.version_timeout)
            .await
        {
            Ok(output) if output.success() => parse_version(&output.stdout),
            _ => UNKNOWN_VERSION.to_string(),
        };

        Ok(EngineCapability {
            executable_path: bundled.clone(),
            version_string,
            supports_srt: false,
            is_system_installed: false,
        })
    }

    async fn probe_srt(&self, program: &Path) -> bool {
        match self
            .runner
            .run(program, &["-hide_banner", "-protocols"], self.protocol_timeout)
            .await
        {
            Ok(output) if output.success() => parse_supports_srt(&output.stdout),
            Ok(output) => {
                warn!(
                    "{} -protocols exited with {:?}, assuming no SRT",
                    program.display(),
                    output.exit_code
                );
                false
            }
            Err(e) => {
                warn!("{} -protocols failed, assuming no SRT: {}", program.display(), e);
                false
            }
        }
    }
}

/// Probe order for a platform
///
/// A configured path comes first, then well-known install locations, then
/// the bare name resolved through `PATH`.
pub fn candidate_paths(platform: Platform, configured: Option<&Path>) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = configured.map(Path::to_path_buf).into_iter().collect();

    let known: &[&str] = match platform {
        Platform::Windows => &[
            "ffmpeg",
            r"C:\ffmpeg\bin\ffmpeg.exe",
            r"C:\Program Files\ffmpeg\bin\ffmpeg.exe",
            r"C:\Program Files (x86)\ffmpeg\bin\ffmpeg.exe",
        ],
        Platform::MacOs | Platform::Linux => &[
            "/usr/local/bin/ffmpeg",
            "/opt/homebrew/bin/ffmpeg",
            "/usr/bin/ffmpeg",
            "ffmpeg",
        ],
    };

    for path in known {
        let path = PathBuf::from(path);
        if !paths.contains(&path) {
            paths.push(path);
        }
    }

    paths
}

/// Engine binary next to the running executable
pub fn default_bundled_path(platform: Platform) -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    Some(exe.parent()?.join(platform.engine_binary()))
}

/// Version token from an `ffmpeg version <token> ...` banner
pub fn parse_version(banner: &str) -> String {
    banner
        .lines()
        .find_map(|line| {
            let rest = line.split("ffmpeg version ").nth(1)?;
            rest.split_whitespace().next().map(str::to_string)
        })
        .unwrap_or_else(|| UNKNOWN_VERSION.to_string())
}

/// Whether `srt` is listed as an output protocol
///
/// Names are matched exactly so `srtp` does not count. Listings without an
/// `Output:` header are searched as a whole.
pub fn parse_supports_srt(listing: &str) -> bool {
    let has_sections = listing.lines().any(|l| l.trim() == "Output:");
    let mut in_output = !has_sections;

    for line in listing.lines() {
        match line.trim() {
            "Output:" => in_output = true,
            "Input:" => in_output = !has_sections,
            name if in_output && name.eq_ignore_ascii_case("srt") => return true,
            _ => {}
        }
    }

    false
}
