//! Mock infrastructure for testing
//!
//! Provides a scripted probe runner, counting launchers and helpers for
//! driving the supervisor with `/bin/sh` scripts instead of ffmpeg.

#![allow(dead_code)]

use async_trait::async_trait;
use srtcast_core::engine::{CapabilityDetector, DetectorOptions, EngineCapability, ProbeOutput, ProbeRunner};
use srtcast_core::error::{Result, SrtcastError};
use srtcast_core::events::{EventBus, SessionEvent, Subscription};
use srtcast_core::orchestrator::Orchestrator;
use srtcast_core::plan::InvocationPlan;
use srtcast_core::session::{Launcher, Supervisor, SupervisorOptions, SystemLauncher};
use srtcast_core::sources::StaticSourceRegistry;
use srtcast_core::types::{CaptureSource, Platform};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::process::{Child, Command};

/// Destination used by script plans
pub const TEST_DESTINATION: &str = "srt://127.0.0.1:9999?mode=caller&latency=120";

/// Canned reply for one probe
#[derive(Debug, Clone)]
pub enum Reply {
    /// Process ran and produced this output
    Output(ProbeOutput),
    /// Probe exceeded its bound
    Timeout,
    /// Executable could not be started
    Missing,
}

/// How a fake executable answers each kind of probe
#[derive(Debug, Clone)]
pub struct FakeEngine {
    pub version: Reply,
    pub protocols: Reply,
    pub other: Reply,
}

impl FakeEngine {
    /// Responds to `-version` and lists the given output protocols
    pub fn working(version: &str, output_protocols: &[&str]) -> Self {
        let mut listing = String::from("Supported file protocols:\nInput:\n  file\n  srt\nOutput:\n");
        for proto in output_protocols {
            listing.push_str(&format!("  {}\n", proto));
        }

        Self {
            version: Reply::Output(ProbeOutput::ok(format!(
                "ffmpeg version {} Copyright (c) 2000-2024 the FFmpeg developers\n",
                version
            ))),
            protocols: Reply::Output(ProbeOutput::ok(listing)),
            other: Reply::Output(ProbeOutput::ok("")),
        }
    }

    /// Exits non-zero for everything
    pub fn broken() -> Self {
        Self {
            version: Reply::Output(ProbeOutput::failed(1, "segfault")),
            protocols: Reply::Output(ProbeOutput::failed(1, "segfault")),
            other: Reply::Output(ProbeOutput::failed(1, "segfault")),
        }
    }

    /// Never answers within the bound
    pub fn hanging() -> Self {
        Self {
            version: Reply::Timeout,
            protocols: Reply::Timeout,
            other: Reply::Timeout,
        }
    }

    /// Replace the reply to non-probe runs (e.g. connection tests)
    pub fn with_other(mut self, reply: Reply) -> Self {
        self.other = reply;
        self
    }
}

/// Probe runner answering from a table of fake executables
///
/// Unknown programs behave as missing. Every call is recorded.
#[derive(Default)]
pub struct FakeProbeRunner {
    engines: HashMap<PathBuf, FakeEngine>,
    calls: Mutex<Vec<(PathBuf, Vec<String>)>>,
    delay: Option<Duration>,
}

impl FakeProbeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_engine(mut self, path: impl Into<PathBuf>, engine: FakeEngine) -> Self {
        self.engines.insert(path.into(), engine);
        self
    }

    /// Sleep before answering each probe
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Recorded calls, in order
    pub fn calls(&self) -> Vec<(PathBuf, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of `-version` probes made
    pub fn version_probes(&self) -> usize {
        self.calls()
            .iter()
            .filter(|(_, args)| args.iter().any(|a| a == "-version"))
            .count()
    }

    /// Programs that received a `-protocols` probe
    pub fn protocol_probes(&self) -> Vec<PathBuf> {
        self.calls()
            .into_iter()
            .filter(|(_, args)| args.iter().any(|a| a == "-protocols"))
            .map(|(path, _)| path)
            .collect()
    }
}

#[async_trait]
impl ProbeRunner for FakeProbeRunner {
    async fn run(&self, program: &Path, args: &[&str], timeout: Duration) -> Result<ProbeOutput> {
        self.calls.lock().unwrap().push((
            program.to_path_buf(),
            args.iter().map(|a| a.to_string()).collect(),
        ));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let Some(engine) = self.engines.get(program) else {
            return Err(std::io::Error::new(std::io::ErrorKind::NotFound, "not found").into());
        };

        let reply = if args.contains(&"-version") {
            &engine.version
        } else if args.contains(&"-protocols") {
            &engine.protocols
        } else {
            &engine.other
        };

        match reply {
            Reply::Output(output) => Ok(output.clone()),
            Reply::Timeout => Err(SrtcastError::timeout(format!(
                "{} did not answer within {:?}",
                program.display(),
                timeout
            ))),
            Reply::Missing => {
                Err(std::io::Error::new(std::io::ErrorKind::NotFound, "not found").into())
            }
        }
    }
}

/// Launcher that counts how many processes it spawned
#[derive(Default)]
pub struct CountingLauncher {
    spawned: AtomicUsize,
}

impl CountingLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawned(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }
}

impl Launcher for CountingLauncher {
    fn launch(&self, plan: &InvocationPlan) -> std::io::Result<Child> {
        self.spawned.fetch_add(1, Ordering::SeqCst);
        SystemLauncher.launch(plan)
    }
}

/// Launcher that runs a fixed shell script whatever the plan says
///
/// Lets orchestrator tests build real ffmpeg plans without ffmpeg.
pub struct ScriptLauncher {
    script: String,
    plans: Mutex<Vec<InvocationPlan>>,
}

impl ScriptLauncher {
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            plans: Mutex::new(Vec::new()),
        }
    }

    /// Plans handed to the launcher, in order
    pub fn plans(&self) -> Vec<InvocationPlan> {
        self.plans.lock().unwrap().clone()
    }
}

impl Launcher for ScriptLauncher {
    fn launch(&self, plan: &InvocationPlan) -> std::io::Result<Child> {
        self.plans.lock().unwrap().push(plan.clone());
        Command::new("/bin/sh")
            .arg("-c")
            .arg(&self.script)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
    }
}

/// Launcher whose spawns always fail
pub struct FailingLauncher;

impl Launcher for FailingLauncher {
    fn launch(&self, _plan: &InvocationPlan) -> std::io::Result<Child> {
        Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "No such file or directory",
        ))
    }
}

/// Plan running `script` under `/bin/sh`
pub fn script_plan(script: &str) -> InvocationPlan {
    InvocationPlan::new(
        "/bin/sh",
        vec!["-c".to_string(), script.to_string()],
        TEST_DESTINATION,
    )
}

/// Capability pointing at a fake ffmpeg
pub fn capability(supports_srt: bool) -> EngineCapability {
    EngineCapability {
        executable_path: PathBuf::from("/usr/bin/ffmpeg"),
        version_string: "6.1.1".to_string(),
        supports_srt,
        is_system_installed: true,
    }
}

/// Orchestrator wired to a fake `/usr/bin/ffmpeg` and a script launcher
///
/// Offers the sources "0x2a" (Firefox) and the embedded preview.
pub fn test_orchestrator(
    supports_srt: bool,
    script: &str,
) -> (Orchestrator, Arc<FakeProbeRunner>, Arc<ScriptLauncher>) {
    let protocols: &[&str] = if supports_srt { &["srt", "udp"] } else { &["udp"] };
    let runner = Arc::new(
        FakeProbeRunner::new().with_engine("/usr/bin/ffmpeg", FakeEngine::working("6.1.1", protocols)),
    );
    let detector = CapabilityDetector::with_runner(
        DetectorOptions {
            platform: Platform::Linux,
            configured_path: Some(PathBuf::from("/usr/bin/ffmpeg")),
            bundled_path: None,
            version_timeout: Duration::from_millis(50),
            protocol_timeout: Duration::from_millis(50),
        },
        runner.clone(),
    );

    let launcher = Arc::new(ScriptLauncher::new(script));
    let supervisor = Supervisor::with_launcher(
        EventBus::new(),
        SupervisorOptions {
            stop_grace: Duration::from_secs(2),
            drain_timeout: Duration::from_millis(500),
        },
        launcher.clone(),
    );

    let sources = StaticSourceRegistry::new(vec![
        CaptureSource::window("0x2a", "Firefox"),
        CaptureSource::embedded_preview(),
    ]);

    let orchestrator = Orchestrator::new(Arc::new(detector), supervisor, Arc::new(sources), Platform::Linux);
    (orchestrator, runner, launcher)
}

/// Collect events until `Ended` arrives or `timeout` elapses
pub async fn events_until_ended(sub: &mut Subscription, timeout: Duration) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    let _ = tokio::time::timeout(timeout, async {
        while let Some(event) = sub.recv().await {
            let ended = matches!(event, SessionEvent::Ended { .. });
            events.push(event);
            if ended {
                break;
            }
        }
    })
    .await;
    events
}

/// Wait for the first event matching `pred`
pub async fn wait_for_event<F>(sub: &mut Subscription, timeout: Duration, pred: F) -> Option<SessionEvent>
where
    F: Fn(&SessionEvent) -> bool,
{
    tokio::time::timeout(timeout, async {
        while let Some(event) = sub.recv().await {
            if pred(&event) {
                return Some(event);
            }
        }
        None
    })
    .await
    .ok()
    .flatten()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fake_runner_unknown_program_is_missing() {
        let runner = FakeProbeRunner::new();
        let err = runner
            .run(Path::new("/nope"), &["-version"], Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, SrtcastError::Io(_)));
        assert_eq!(runner.version_probes(), 1);
    }

    #[tokio::test]
    async fn test_fake_engine_lists_protocols() {
        let runner = FakeProbeRunner::new().with_engine("/ff", FakeEngine::working("6.1", &["srt"]));
        let out = runner
            .run(Path::new("/ff"), &["-protocols"], Duration::from_secs(1))
            .await
            .unwrap();
        assert!(out.stdout.contains("Output:\n  srt\n"));
    }
}
