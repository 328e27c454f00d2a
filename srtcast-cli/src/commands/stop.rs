//! Stop command - stop the running cast

use anyhow::Result;

/// Ask the running cast to stop its session
#[cfg(unix)]
pub async fn stop() -> Result<()> {
    use anyhow::Context;
    use srtcast_core::error::SrtcastError;
    use srtcast_core::ipc::IpcClient;

    println!("srtcast - Stop Stream\n");

    let mut client = match IpcClient::connect().await {
        Ok(client) => client,
        Err(SrtcastError::NoActiveSession) => {
            println!("No active streaming session.");
            return Ok(());
        }
        Err(e) => return Err(e).context("Failed to reach the running cast"),
    };

    let state = client.stop().await.context("Stop request failed")?;
    println!("Stream {}.", state);

    Ok(())
}

/// Ask the running cast to stop its session
#[cfg(not(unix))]
pub async fn stop() -> Result<()> {
    println!("srtcast - Stop Stream\n");
    println!("Remote control is only available on Unix; press Ctrl+C in the cast terminal.");
    Ok(())
}
