//! List commands - capture sources and quality presets

use anyhow::Result;
use srtcast_core::config::{QualityPreset, SettingsStore};
use srtcast_core::orchestrator::Orchestrator;
use std::path::Path;

use super::{load_config, truncate};

/// List available capture sources
pub async fn list_sources(config_path: Option<&Path>) -> Result<()> {
    println!("srtcast - Available Capture Sources\n");

    let config = load_config(config_path)?;
    let orchestrator = Orchestrator::from_config(&config);
    let sources = orchestrator.list_sources();

    if sources.is_empty() {
        println!("No sources found.");
        return Ok(());
    }

    println!("{:<20} {:<30} {:<10}", "ID", "Name", "Type");
    println!("{}", "-".repeat(60));

    for source in sources {
        println!(
            "{:<20} {:<30} {:<10}",
            source.id,
            truncate(&source.display_name, 28),
            source.kind
        );
    }

    println!("\nNote: every source captures the whole display; window-only capture is not supported.");
    println!("Use 'srtcast cast --source ID' to pick one.");

    Ok(())
}

/// List quality presets and saved profiles
pub async fn presets(config_path: Option<&Path>) -> Result<()> {
    println!("srtcast - Encoding Presets\n");

    let config = load_config(config_path)?;

    println!(
        "{:<12} {:<20} {:<10} {:<6} {:<10} {:<10} {:<8}",
        "Name", "Label", "Size", "FPS", "Bitrate", "Preset", "Profile"
    );
    println!("{}", "-".repeat(80));

    for preset in QualityPreset::ALL {
        let profile = preset.profile();
        let marker = if preset == config.defaults.quality { " *" } else { "" };
        println!(
            "{:<12} {:<20} {:<10} {:<6} {:<10} {:<10} {:<8}{}",
            preset.to_string(),
            preset.label(),
            profile.resolution.to_string(),
            profile.frame_rate,
            format!("{}k", profile.bitrate_kbps),
            profile.preset.as_str(),
            profile.h264_profile.as_str(),
            marker
        );
    }

    let saved = config.profiles();
    if !saved.is_empty() {
        println!("\nSaved profiles:");
        for named in saved {
            let p = &named.profile;
            println!(
                "  {:<16} {} @ {} fps, {}k, {}/{}  {}",
                named.name,
                p.resolution,
                p.frame_rate,
                p.bitrate_kbps,
                p.preset.as_str(),
                p.h264_profile.as_str(),
                named.description
            );
        }
    }

    println!("\n* default quality");
    Ok(())
}
