//! Info command - show the detected engine and its capabilities

use anyhow::Result;
use clap::Args;
use srtcast_core::config::ConfigFile;
use srtcast_core::orchestrator::Orchestrator;
use std::path::Path;

use super::load_config;

/// Arguments for the info command
#[derive(Args)]
pub struct InfoArgs {
    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

/// Show system information and SRT support
pub async fn info(args: InfoArgs, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let orchestrator = Orchestrator::from_config(&config);

    let report = orchestrator.system_report().await;

    if args.json {
        match report {
            Ok(report) => println!("{}", serde_json::to_string_pretty(&report)?),
            Err(e) => println!("{}", serde_json::json!({ "error": e.to_string(), "kind": e.kind() })),
        }
        return Ok(());
    }

    println!("srtcast - System Information\n");
    println!("Platform:");
    println!("  Detected:    {}", orchestrator.platform());
    println!();

    println!("Encoding Engine:");
    match report {
        Ok(report) => {
            let capability = &report.capability;
            let icon = if capability.supports_srt { "[OK]" } else { "[!!]" };
            println!("  Path:        {}", capability.executable_path.display());
            println!("  Version:     {}", capability.version_string);
            println!(
                "  Installed:   {}",
                if capability.is_system_installed { "system" } else { "bundled" }
            );
            println!("  {} SRT:     {}", icon, report.srt_message);

            if !capability.supports_srt {
                println!();
                println!("  Troubleshooting:");
                println!("    - Install an ffmpeg build with libsrt (e.g. 'ffmpeg -protocols | grep srt')");
                println!("    - Or point [engine] path in config.toml at one");
                println!("    - 'srtcast cast --allow-fallback' streams over UDP meanwhile");
            }
        }
        Err(e) => {
            println!("  [!!] {}", e);
            if let Some(hint) = e.user_hint() {
                println!("  Hint: {}", hint);
            }
        }
    }

    println!();
    println!("Configuration:");
    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(ConfigFile::default_path);
    println!(
        "  File:        {} ({})",
        path.display(),
        if path.exists() { "exists" } else { "not created" }
    );
    println!("  Servers:     {}", config.servers.len());
    println!("  Profiles:    {}", config.profiles.len());
    println!("  Quality:     {}", config.defaults.quality);

    Ok(())
}
