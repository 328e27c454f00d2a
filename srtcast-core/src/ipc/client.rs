//! IPC client for CLI commands
//!
//! Connects to a running cast to send commands and receive responses.

use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tracing::debug;

use super::protocol::{IpcMessage, IpcResponse};
use super::socket_path;
use crate::engine::EngineCapability;
use crate::error::{Result, SrtcastError};
use crate::session::{SessionState, SessionStatus};

/// Default connection timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default read/write timeout; covers the stop grace period
const IO_TIMEOUT: Duration = Duration::from_secs(10);

/// IPC client for communicating with a running cast
pub struct IpcClient {
    stream: UnixStream,
}

impl IpcClient {
    /// Connect on the default socket path
    pub async fn connect() -> Result<Self> {
        Self::connect_to(&socket_path(), CONNECT_TIMEOUT).await
    }

    /// Connect on a specific socket path
    pub async fn connect_to(path: &Path, timeout: Duration) -> Result<Self> {
        if !path.exists() {
            return Err(SrtcastError::NoActiveSession);
        }

        let stream = tokio::time::timeout(timeout, UnixStream::connect(path))
            .await
            .map_err(|_| SrtcastError::timeout("Connecting to the running cast"))?
            .map_err(|e| SrtcastError::Config(format!("Failed to connect to running cast: {}", e)))?;

        debug!("Connected to running cast at {:?}", path);

        Ok(Self { stream })
    }

    /// Send a message and receive a response with timeout
    async fn send(&mut self, msg: IpcMessage) -> Result<IpcResponse> {
        self.send_with_timeout(msg, IO_TIMEOUT).await
    }

    /// Send a message and receive a response with custom timeout
    async fn send_with_timeout(
        &mut self,
        msg: IpcMessage,
        timeout: Duration,
    ) -> Result<IpcResponse> {
        let (reader, mut writer) = self.stream.split();

        tokio::time::timeout(timeout, writer.write_all(&msg.to_bytes()))
            .await
            .map_err(|_| SrtcastError::timeout("Sending IPC message"))?
            .map_err(|e| SrtcastError::Config(format!("Failed to send message: {}", e)))?;

        let mut reader = BufReader::new(reader);
        let mut line = String::new();
        tokio::time::timeout(timeout, reader.read_line(&mut line))
            .await
            .map_err(|_| SrtcastError::timeout("Waiting for IPC response"))?
            .map_err(|e| SrtcastError::Config(format!("Failed to read response: {}", e)))?;

        IpcResponse::from_bytes(line.trim().as_bytes())
            .map_err(|e| SrtcastError::Config(format!("Invalid response: {}", e)))
    }

    /// Ping the cast to check if it's alive
    pub async fn ping(&mut self) -> Result<bool> {
        match self.send(IpcMessage::Ping).await {
            Ok(IpcResponse::Pong) => Ok(true),
            Ok(_) => Ok(false),
            Err(_) => Ok(false),
        }
    }

    /// Get the session status
    pub async fn status(&mut self) -> Result<SessionStatus> {
        match self.send(IpcMessage::Status).await? {
            IpcResponse::Status(status) => Ok(status),
            IpcResponse::Error { message } => Err(SrtcastError::Config(message)),
            _ => Err(SrtcastError::Config("Unexpected response".into())),
        }
    }

    /// Get the engine capability the cast is using
    pub async fn capability(&mut self) -> Result<EngineCapability> {
        match self.send(IpcMessage::Capability).await? {
            IpcResponse::Capability(capability) => Ok(capability),
            IpcResponse::Error { message } => Err(SrtcastError::Config(message)),
            _ => Err(SrtcastError::Config("Unexpected response".into())),
        }
    }

    /// Stop the session; returns its final state
    pub async fn stop(&mut self) -> Result<SessionState> {
        match self.send(IpcMessage::Stop).await? {
            IpcResponse::Stopped { state } => Ok(state),
            IpcResponse::Error { message } => Err(SrtcastError::Config(message)),
            _ => Err(SrtcastError::Config("Unexpected response".into())),
        }
    }
}
