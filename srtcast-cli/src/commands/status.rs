//! Status command - show status of the running cast

use anyhow::Result;
use clap::Args;
use srtcast_core::session::SessionStatus;

/// Arguments for the status command
#[derive(Args)]
pub struct StatusArgs {
    /// Print the raw status as JSON
    #[arg(long)]
    json: bool,
}

/// Query the running cast for its session status
#[cfg(unix)]
pub async fn status(args: StatusArgs) -> Result<()> {
    use anyhow::Context;
    use srtcast_core::error::SrtcastError;
    use srtcast_core::ipc::IpcClient;

    let status = match IpcClient::connect().await {
        Ok(mut client) => client
            .status()
            .await
            .context("Failed to query the running cast")?,
        Err(SrtcastError::NoActiveSession) => SessionStatus::idle(),
        Err(e) => return Err(e).context("Failed to reach the running cast"),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        print_status(&status);
    }

    Ok(())
}

/// Query the running cast for its session status
#[cfg(not(unix))]
pub async fn status(args: StatusArgs) -> Result<()> {
    let status = SessionStatus::idle();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        print_status(&status);
    }
    Ok(())
}

fn print_status(status: &SessionStatus) {
    println!("srtcast - Status\n");

    let Some(session) = status.session else {
        println!("  State: {}", status.state);
        println!();
        println!("No active streaming session. Start one with 'srtcast cast'.");
        return;
    };

    println!("  Session:     {}", session);
    println!("  State:       {}", status.state);
    if let Some(ref source) = status.source {
        println!("  Source:      {} ({})", source.display_name, source.id);
    }
    if let Some(ref profile) = status.profile {
        println!(
            "  Encoding:    {} @ {} fps, {} kbps",
            profile.resolution, profile.frame_rate, profile.bitrate_kbps
        );
    }
    if let Some(ref destination) = status.destination {
        println!("  Destination: {}", destination);
    }
    if let Some(protocol) = status.protocol {
        println!("  Protocol:    {}", protocol);
    }
    if let Some(pid) = status.pid {
        println!("  PID:         {}", pid);
    }
    println!("  Uptime:      {}", format_duration(status.uptime_seconds));
    println!("  Last output: {}s ago", status.idle_seconds);
    if let Some(code) = status.exit_code {
        println!("  Exit code:   {}", code);
    }
    if let Some(ref error) = status.last_error {
        println!("  Last error:  {}", error);
    }
}

fn format_duration(seconds: u64) -> String {
    let h = seconds / 3600;
    let m = (seconds % 3600) / 60;
    let s = seconds % 60;
    if h > 0 {
        format!("{}h {:02}m {:02}s", h, m, s)
    } else if m > 0 {
        format!("{}m {:02}s", m, s)
    } else {
        format!("{}s", s)
    }
}
