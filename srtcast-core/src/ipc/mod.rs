//! IPC for a running cast
//!
//! While `srtcast cast` streams, it listens on a Unix socket so that
//! `srtcast stop` and `srtcast status` from another terminal can reach the
//! session.

mod client;
mod protocol;
mod server;

pub use client::IpcClient;
pub use protocol::{IpcMessage, IpcResponse};
pub use server::IpcServer;

use std::path::PathBuf;

/// Get the IPC socket path
///
/// Uses XDG_RUNTIME_DIR if available, otherwise /tmp
pub fn socket_path() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        PathBuf::from(runtime_dir).join("srtcast.sock")
    } else {
        // SAFETY: libc::getuid() is a simple syscall that returns the real user ID.
        // It has no preconditions and cannot fail (always returns a valid uid_t).
        let uid = unsafe { libc::getuid() };
        PathBuf::from(format!("/tmp/srtcast-{}.sock", uid))
    }
}

/// Whether a cast is listening and answering pings
pub async fn cast_running() -> bool {
    let path = socket_path();
    if !path.exists() {
        return false;
    }

    match IpcClient::connect().await {
        Ok(mut client) => matches!(client.ping().await, Ok(true)),
        Err(_) => false,
    }
}
