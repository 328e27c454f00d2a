//! Cast command - start streaming and supervise until stopped

use anyhow::{anyhow, bail, Context, Result};
use clap::Args;
use srtcast_core::config::{ConfigFile, EncodingProfile, QualityPreset, Resolution, SettingsStore};
use srtcast_core::endpoint::safe_url;
use srtcast_core::events::SessionEvent;
use srtcast_core::orchestrator::{Orchestrator, StartRequest};
use srtcast_core::session::SessionState;
use srtcast_core::sources::PRIMARY_SCREEN_ID;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tracing::{debug, info, warn};

use super::{load_config, EndpointArgs};

/// Arguments for the cast command
#[derive(Args)]
pub struct CastArgs {
    #[command(flatten)]
    pub endpoint: EndpointArgs,

    /// Capture source ID (see 'srtcast list-sources')
    #[arg(short, long, default_value = PRIMARY_SCREEN_ID)]
    source: String,

    /// Quality preset (ultra-low, low, medium, high, ultra-high)
    #[arg(short, long)]
    quality: Option<QualityPreset>,

    /// Saved profile name (overrides --quality)
    #[arg(long)]
    profile: Option<String>,

    /// Output resolution, e.g. 1280x720
    #[arg(short, long)]
    resolution: Option<Resolution>,

    /// Capture framerate
    #[arg(short, long)]
    fps: Option<u32>,

    /// Video bitrate in kbps
    #[arg(short, long)]
    bitrate: Option<u32>,

    /// Keyframe interval in frames
    #[arg(long)]
    keyframe_interval: Option<u32>,

    /// Stream over UDP if ffmpeg lacks SRT support
    #[arg(long)]
    allow_fallback: bool,

    /// Print the ffmpeg command line and exit
    #[arg(long)]
    dry_run: bool,
}

impl CastArgs {
    /// Profile from the saved profile or preset, with overrides applied
    fn profile(&self, config: &ConfigFile) -> Result<EncodingProfile> {
        let mut profile = if let Some(ref name) = self.profile {
            config
                .profile(name)
                .ok_or_else(|| anyhow!("No profile named '{}' in the configuration", name))?
        } else if let Some(quality) = self.quality {
            quality.profile()
        } else {
            config.default_profile()
        };

        if let Some(resolution) = self.resolution {
            profile = profile.with_resolution(resolution);
        }
        if let Some(fps) = self.fps {
            profile = profile.with_frame_rate(fps);
        }
        if let Some(bitrate) = self.bitrate {
            profile = profile.with_bitrate(bitrate);
        }
        if let Some(frames) = self.keyframe_interval {
            profile = profile.with_keyframe_interval(frames);
        }

        Ok(profile)
    }
}

/// Start a streaming session and supervise it
pub async fn cast(args: CastArgs, config_path: Option<&Path>) -> Result<()> {
    println!("srtcast - Starting Stream\n");

    let config = load_config(config_path)?;
    let profile = args.profile(&config)?;
    let endpoint = args.endpoint.endpoint(&config)?;

    let request = StartRequest::new(args.source.clone(), endpoint)
        .with_profile(profile.clone())
        .with_stream_key(args.endpoint.stream_key.clone())
        .with_fallback(args.allow_fallback || config.defaults.allow_fallback);

    let orchestrator = Arc::new(Orchestrator::from_config(&config));

    println!("Configuration:");
    println!("  Source:      {}", args.source);
    println!("  Resolution:  {}", profile.resolution);
    println!("  Framerate:   {} fps", profile.frame_rate);
    println!("  Bitrate:     {} kbps", profile.bitrate_kbps);
    println!("  Preset:      {}", profile.preset.as_str());
    println!("  Profile:     {}", profile.h264_profile.as_str());
    println!("  Keyframes:   every {} frames", profile.keyframe_interval_frames);
    println!();

    for warning in profile.warnings() {
        warn!("{}", warning);
        println!("Warning: {}", warning);
    }

    if args.dry_run {
        let plan = orchestrator
            .plan(&request)
            .await
            .context("Failed to build the ffmpeg command")?;
        for warning in plan.warnings() {
            println!("Warning: {}", warning);
        }
        println!("{}", plan.command_line());
        return Ok(());
    }

    #[cfg(unix)]
    {
        if srtcast_core::ipc::cast_running().await {
            bail!("Another cast is already running; stop it first with 'srtcast stop'");
        }
    }

    let mut events = orchestrator.subscribe();

    let session = orchestrator
        .start_session(&request)
        .await
        .context("Failed to start streaming")?;
    info!("Started {}", session);

    #[cfg(unix)]
    let ipc_task = {
        let mut server = srtcast_core::ipc::IpcServer::new(orchestrator.clone());
        match server.start().await {
            Ok(()) => Some(tokio::spawn(async move {
                if let Err(e) = server.run().await {
                    warn!("IPC server stopped: {}", e);
                }
            })),
            Err(e) => {
                warn!("Remote control unavailable: {}", e);
                None
            }
        }
    };

    println!("Press Ctrl+C to stop...\n");

    let mut final_state = SessionState::Idle;
    let mut stopping = false;

    loop {
        tokio::select! {
            result = signal::ctrl_c(), if !stopping => {
                if let Err(e) = result {
                    warn!("Failed to listen for Ctrl+C: {}", e);
                }
                println!("\nReceived interrupt signal...");
                println!("Stopping stream...");
                stopping = true;
                if let Err(e) = orchestrator.stop_session().await {
                    warn!("Stop failed: {}", e);
                }
            }
            event = events.recv() => {
                let Some(event) = event else {
                    break;
                };
                if let SessionEvent::Ended { state, .. } = event {
                    final_state = state;
                    print_event(&event);
                    break;
                }
                print_event(&event);
            }
        }
    }

    #[cfg(unix)]
    {
        if let Some(task) = ipc_task {
            task.abort();
            let _ = task.await;
        }
    }

    match final_state {
        SessionState::Errored => {
            let status = orchestrator.session_status().await;
            let detail = status
                .last_error
                .unwrap_or_else(|| "ffmpeg exited unexpectedly".to_string());
            bail!("Stream ended with an error: {}", detail)
        }
        _ => {
            println!("Stream stopped.");
            Ok(())
        }
    }
}

/// Render one session event for the terminal
fn print_event(event: &SessionEvent) {
    match event {
        SessionEvent::Started { pid, destination, .. } => {
            let pid = pid.map(|p| p.to_string()).unwrap_or_else(|| "?".to_string());
            println!("ffmpeg started (pid {}) -> {}", pid, safe_url(destination));
        }
        SessionEvent::StateChanged { from, to, .. } => {
            debug!("State: {} -> {}", from, to);
            if *to == SessionState::AwaitingConnection {
                println!("Waiting for the endpoint to accept the connection...");
            }
        }
        SessionEvent::Connected { .. } => {
            println!("Connected. Streaming.");
        }
        SessionEvent::Log { line, .. } => {
            debug!("ffmpeg: {}", line);
        }
        SessionEvent::Warning { message, .. } => {
            println!("Warning: {}", message);
        }
        SessionEvent::Error { kind, detail, .. } => {
            eprintln!("Error ({}): {}", kind, detail);
        }
        SessionEvent::Ended { exit_code, state, .. } => {
            let code = exit_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "none".to_string());
            info!("ffmpeg exited (code {}), session {}", code, state);
        }
    }
}
