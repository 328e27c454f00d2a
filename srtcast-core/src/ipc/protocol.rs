//! IPC protocol definitions
//!
//! Newline-delimited JSON, one request and one response per line.

use serde::{Deserialize, Serialize};

use crate::engine::EngineCapability;
use crate::session::{SessionState, SessionStatus};

/// Requests sent to a running cast
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IpcMessage {
    /// Check if the cast is alive
    Ping,
    /// Request the session status
    Status,
    /// Request the detected engine capability
    Capability,
    /// Stop the session gracefully
    Stop,
}

/// Responses from a running cast
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IpcResponse {
    /// Pong response to ping
    Pong,
    /// Error response
    Error { message: String },
    /// Session status
    Status(SessionStatus),
    /// Engine capability
    Capability(EngineCapability),
    /// Session reached a terminal state
    Stopped { state: SessionState },
}

impl IpcMessage {
    /// Serialize message to JSON bytes with newline terminator
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = serde_json::to_vec(self).unwrap_or_default();
        bytes.push(b'\n');
        bytes
    }

    /// Deserialize message from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

impl IpcResponse {
    /// Serialize response to JSON bytes with newline terminator
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = serde_json::to_vec(self).unwrap_or_default();
        bytes.push(b'\n');
        bytes
    }

    /// Deserialize response from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Create an error response
    pub fn error(message: impl Into<String>) -> Self {
        IpcResponse::Error {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_wire_format() {
        let bytes = IpcMessage::Capability.to_bytes();
        assert_eq!(bytes, b"{\"type\":\"Capability\"}\n");
        let parsed = IpcMessage::from_bytes(&bytes[..bytes.len() - 1]).unwrap();
        assert!(matches!(parsed, IpcMessage::Capability));
    }

    #[test]
    fn test_stopped_response_carries_state() {
        let resp = IpcResponse::Stopped {
            state: SessionState::Stopped,
        };
        let bytes = resp.to_bytes();
        let text = std::str::from_utf8(&bytes).unwrap();
        assert!(text.contains("\"state\":\"stopped\""));
        let parsed = IpcResponse::from_bytes(&bytes[..bytes.len() - 1]).unwrap();
        assert!(matches!(
            parsed,
            IpcResponse::Stopped {
                state: SessionState::Stopped
            }
        ));
    }

    #[test]
    fn test_status_response_roundtrip() {
        let resp = IpcResponse::Status(SessionStatus::idle());
        let bytes = resp.to_bytes();
        let parsed = IpcResponse::from_bytes(&bytes[..bytes.len() - 1]).unwrap();
        match parsed {
            IpcResponse::Status(status) => assert_eq!(status.state, SessionState::Idle),
            other => panic!("unexpected response: {:?}", other),
        }
    }
}
