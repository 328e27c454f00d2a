//! IPC server for a running cast
//!
//! Listens on a Unix socket and answers CLI clients from the orchestrator.

use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::protocol::{IpcMessage, IpcResponse};
use super::socket_path;
use crate::error::{Result, SrtcastError};
use crate::orchestrator::Orchestrator;

/// IPC server that handles client connections
pub struct IpcServer {
    /// Path to the Unix socket
    socket_path: PathBuf,
    /// Listener for incoming connections
    listener: Option<UnixListener>,
    /// Session owner
    orchestrator: Arc<Orchestrator>,
    /// Fired once a client has stopped the session
    shutdown_tx: broadcast::Sender<()>,
}

impl IpcServer {
    /// Server on the default socket path
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self::with_path(socket_path(), orchestrator)
    }

    /// Server on a specific socket path
    pub fn with_path(path: PathBuf, orchestrator: Arc<Orchestrator>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            socket_path: path,
            listener: None,
            orchestrator,
            shutdown_tx,
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.socket_path
    }

    /// Start listening for connections
    pub async fn start(&mut self) -> Result<()> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).map_err(|e| {
                SrtcastError::Config(format!("Failed to remove old socket: {}", e))
            })?;
        }

        if let Some(parent) = self.socket_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    SrtcastError::Config(format!("Failed to create socket directory: {}", e))
                })?;
            }
        }

        let listener = UnixListener::bind(&self.socket_path).map_err(|e| {
            SrtcastError::Config(format!(
                "Failed to bind socket at {:?}: {}",
                self.socket_path, e
            ))
        })?;

        // Owner-only: the socket can stop the stream
        let permissions = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&self.socket_path, permissions).map_err(|e| {
            warn!("Failed to set socket permissions: {}", e);
            SrtcastError::Config(format!("Failed to set socket permissions: {}", e))
        })?;

        info!("IPC server listening on {:?}", self.socket_path);
        self.listener = Some(listener);

        Ok(())
    }

    /// Get a receiver for shutdown signals
    pub fn shutdown_receiver(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Accept and handle one connection
    ///
    /// Returns true if the server should continue, false once a client has
    /// stopped the session
    pub async fn accept_one(&self) -> Result<bool> {
        let listener = self
            .listener
            .as_ref()
            .ok_or_else(|| SrtcastError::Config("Server not started".into()))?;

        // Short timeout so callers can interleave other work
        let accept_result =
            tokio::time::timeout(std::time::Duration::from_millis(100), listener.accept()).await;

        let stream = match accept_result {
            Ok(Ok((stream, _addr))) => stream,
            Ok(Err(e)) => {
                error!("Failed to accept connection: {}", e);
                return Ok(true);
            }
            Err(_) => return Ok(true),
        };

        debug!("IPC client connected");
        Ok(self.handle_connection(stream).await)
    }

    /// Serve until a client stops the session
    pub async fn run(&self) -> Result<()> {
        while self.accept_one().await? {}
        Ok(())
    }

    /// Handle a client connection
    ///
    /// Returns true if server should continue, false if it should shut down
    async fn handle_connection(&self, stream: UnixStream) -> bool {
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);
        let mut line = String::new();

        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) => {
                    debug!("IPC client disconnected");
                    return true;
                }
                Ok(_) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }

                    match IpcMessage::from_bytes(trimmed.as_bytes()) {
                        Ok(msg) => {
                            let (response, should_stop) = self.handle_message(msg).await;

                            if let Err(e) = writer.write_all(&response.to_bytes()).await {
                                error!("Failed to send IPC response: {}", e);
                                return true;
                            }

                            if should_stop {
                                let _ = self.shutdown_tx.send(());
                                return false;
                            }
                        }
                        Err(e) => {
                            warn!("Invalid IPC message: {}", e);
                            let response = IpcResponse::error(format!("Invalid message: {}", e));
                            let _ = writer.write_all(&response.to_bytes()).await;
                        }
                    }
                }
                Err(e) => {
                    error!("Error reading from IPC client: {}", e);
                    return true;
                }
            }
        }
    }

    /// Handle an IPC message
    ///
    /// Returns (response, should_stop)
    async fn handle_message(&self, msg: IpcMessage) -> (IpcResponse, bool) {
        match msg {
            IpcMessage::Ping => (IpcResponse::Pong, false),
            IpcMessage::Status => {
                let status = self.orchestrator.session_status().await;
                (IpcResponse::Status(status), false)
            }
            IpcMessage::Capability => match self.orchestrator.capability().await {
                Ok(capability) => (IpcResponse::Capability(capability), false),
                Err(e) => (IpcResponse::error(e.to_string()), false),
            },
            IpcMessage::Stop => {
                info!("Received stop command via IPC");
                match self.orchestrator.stop_session().await {
                    Ok(state) => (IpcResponse::Stopped { state }, true),
                    Err(e) => (IpcResponse::error(e.to_string()), false),
                }
            }
        }
    }

    /// Clean up the socket file
    pub fn cleanup(&self) {
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!("Failed to remove socket file: {}", e);
            } else {
                debug!("Removed socket file {:?}", self.socket_path);
            }
        }
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        self.cleanup();
    }
}
