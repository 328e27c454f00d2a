//! Endpoint commands - resolve and test SRT endpoints

use anyhow::{bail, Context, Result};
use clap::Args;
use srtcast_core::config::{ConfigFile, SettingsStore};
use srtcast_core::endpoint::{safe_url, TransportEndpoint};
use srtcast_core::orchestrator::Orchestrator;
use std::path::Path;
use std::time::Duration;

use super::load_config;

/// Where to stream, as a saved server and/or explicit fields
///
/// Explicit fields override the saved server's values.
#[derive(Args, Debug, Clone, Default)]
pub struct EndpointArgs {
    /// Saved server name (defaults to [defaults] server)
    #[arg(short = 'S', long)]
    pub server: Option<String>,

    /// Ingest host
    #[arg(long)]
    pub host: Option<String>,

    /// Ingest port
    #[arg(short, long)]
    pub port: Option<u32>,

    /// SRT mode (caller, listener)
    #[arg(long)]
    pub mode: Option<String>,

    /// SRT latency in milliseconds
    #[arg(long)]
    pub latency: Option<u32>,

    /// Bandwidth cap in kbps
    #[arg(long)]
    pub maxbw: Option<u32>,

    /// Encryption passphrase
    #[arg(long)]
    pub passphrase: Option<String>,

    /// Encryption key length in bytes (16, 24, 32)
    #[arg(long)]
    pub pbkeylen: Option<u32>,

    /// SRT stream ID (takes precedence over the stream key)
    #[arg(long)]
    pub streamid: Option<String>,

    /// Stream key, sent as the stream ID when none is configured
    #[arg(short = 'k', long, default_value = "")]
    pub stream_key: String,
}

impl EndpointArgs {
    /// Build the endpoint from the saved server and the overrides
    pub fn endpoint(&self, config: &ConfigFile) -> Result<TransportEndpoint> {
        let base = match (&self.server, &self.host) {
            (Some(name), _) => Some(
                config
                    .server(name)
                    .with_context(|| format!("No server named '{}' in the configuration", name))?,
            ),
            (None, Some(_)) => None,
            (None, None) => config.default_server(),
        };

        let mut endpoint = match (base, &self.host) {
            (Some(mut endpoint), host) => {
                if let Some(host) = host {
                    endpoint.host = host.clone();
                }
                endpoint
            }
            (None, Some(host)) => TransportEndpoint::new(host.clone(), self.port.unwrap_or(0)),
            (None, None) => bail!(
                "No server given. Pass --server NAME or --host HOST --port PORT, \
                 or set [defaults] server in the configuration"
            ),
        };

        if let Some(port) = self.port {
            endpoint.port = port;
        }
        if let Some(ref mode) = self.mode {
            endpoint.mode = mode.clone();
        }
        if let Some(latency) = self.latency {
            endpoint.latency_ms = latency;
        }
        if let Some(maxbw) = self.maxbw {
            endpoint.max_bandwidth_kbps = Some(maxbw);
        }
        if let Some(ref passphrase) = self.passphrase {
            endpoint.passphrase = Some(passphrase.clone());
        }
        if let Some(len) = self.pbkeylen {
            endpoint.pb_key_len = Some(len);
        }
        if let Some(ref id) = self.streamid {
            endpoint.stream_id = Some(id.clone());
        }

        Ok(endpoint)
    }
}

/// Arguments for the resolve command
#[derive(Args)]
pub struct ResolveArgs {
    #[command(flatten)]
    pub endpoint: EndpointArgs,

    /// Print the passphrase and stream ID instead of masking them
    #[arg(long)]
    pub reveal: bool,
}

/// Print the transport URL
pub async fn resolve(args: ResolveArgs, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let orchestrator = Orchestrator::from_config(&config);

    let endpoint = args.endpoint.endpoint(&config)?;
    let url = orchestrator
        .resolve_endpoint(&endpoint, &args.endpoint.stream_key)
        .context("Invalid endpoint")?;

    if args.reveal {
        println!("{}", url);
    } else {
        println!("{}", safe_url(&url));
    }

    Ok(())
}

/// Arguments for the test-endpoint command
#[derive(Args)]
pub struct TestEndpointArgs {
    #[command(flatten)]
    pub endpoint: EndpointArgs,

    /// Seconds to wait for the test stream
    #[arg(short, long, default_value = "10")]
    pub timeout: u64,
}

/// Push a one-second test pattern and report the outcome
pub async fn test_endpoint(args: TestEndpointArgs, config_path: Option<&Path>) -> Result<()> {
    println!("srtcast - Endpoint Test\n");

    let config = load_config(config_path)?;
    let orchestrator = Orchestrator::from_config(&config);

    let endpoint = args.endpoint.endpoint(&config)?;
    let url = orchestrator
        .resolve_endpoint(&endpoint, &args.endpoint.stream_key)
        .context("Invalid endpoint")?;

    let capability = orchestrator
        .capability()
        .await
        .context("Cannot test without ffmpeg")?;
    if !capability.supports_srt && url.starts_with("srt://") {
        bail!(
            "{} has no SRT support; install an ffmpeg build with libsrt",
            capability.executable_path.display()
        );
    }

    println!("Testing {} ...", safe_url(&url));

    orchestrator
        .test_endpoint(
            &endpoint,
            &args.endpoint.stream_key,
            Duration::from_secs(args.timeout),
        )
        .await
        .context("Endpoint test failed")?;

    println!("Endpoint accepted the test stream.");
    Ok(())
}
