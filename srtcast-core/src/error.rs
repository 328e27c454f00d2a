//! Error types for srtcast

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::SessionState;

/// Result type alias using SrtcastError
pub type Result<T> = std::result::Result<T, SrtcastError>;

/// Coarse error classification reported to observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// Bad profile or endpoint fields
    Validation,
    /// No encoding engine could be found
    CapabilityUnavailable,
    /// SRT requested but unavailable and fallback declined
    ProtocolUnsupported,
    /// Another session is already active
    SessionBusy,
    /// Operation not legal in the current session state
    InvalidTransition,
    /// Engine exited non-zero or never started
    ProcessFailure,
    /// A bounded probe or shutdown exceeded its deadline
    Timeout,
    /// Configuration, I/O and other local failures
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Validation => "validation",
            Self::CapabilityUnavailable => "capability-unavailable",
            Self::ProtocolUnsupported => "protocol-unsupported",
            Self::SessionBusy => "session-busy",
            Self::InvalidTransition => "invalid-transition",
            Self::ProcessFailure => "process-failure",
            Self::Timeout => "timeout",
            Self::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// A single rejected field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Field name as the operator knows it (e.g. "port")
    pub field: String,
    /// What is wrong with it
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Collected validation failures, never empty when returned as an error
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErrors(pub Vec<FieldError>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Record a rejected field
    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.push(FieldError::new(field, message));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter()
    }

    /// Whether a given field was rejected
    pub fn has_field(&self, field: &str) -> bool {
        self.0.iter().any(|e| e.field == field)
    }

    /// Merge another set of failures into this one
    pub fn extend(&mut self, other: ValidationErrors) {
        self.0.extend(other.0);
    }

    /// Ok if nothing was recorded
    pub fn into_result(self) -> std::result::Result<(), ValidationErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|e| e.to_string()).collect();
        write!(f, "{}", parts.join("; "))
    }
}

/// Main error type for srtcast operations
#[derive(Debug, Error)]
pub enum SrtcastError {
    /// Profile or endpoint fields rejected
    #[error("Validation error: {0}")]
    Validation(ValidationErrors),

    /// No usable encoding engine
    #[error("Encoding engine unavailable: {0}")]
    CapabilityUnavailable(String),

    /// SRT requested, engine lacks it, caller declined fallback
    #[error("Protocol unsupported: {0}")]
    ProtocolUnsupported(String),

    /// Exclusivity violation
    #[error("A streaming session is already active")]
    SessionBusy,

    /// Operation not legal from the current state
    #[error("Cannot {operation} while session is {state}")]
    InvalidTransition {
        state: SessionState,
        operation: &'static str,
    },

    /// Engine exited non-zero or could not be spawned
    #[error("Engine process failed (exit code {code}): {detail}", code = fmt_code(.exit_code))]
    ProcessFailure {
        exit_code: Option<i32>,
        detail: String,
    },

    /// A bounded operation exceeded its deadline
    #[error("Timed out: {0}")]
    Timeout(String),

    /// No `srtcast cast` process is listening on the control socket
    #[error("No active streaming session")]
    NoActiveSession,

    /// Capture source not offered by the registry
    #[error("Source not found: {0}")]
    SourceNotFound(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<SrtcastError>,
    },
}

fn fmt_code(code: &Option<i32>) -> String {
    match code {
        Some(c) => c.to_string(),
        None => "none".to_string(),
    }
}

impl SrtcastError {
    /// Create a validation error for a single field
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = ValidationErrors::new();
        errors.push(field, message);
        Self::Validation(errors)
    }

    /// Create a capability error
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::CapabilityUnavailable(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a process failure
    pub fn process(exit_code: Option<i32>, detail: impl Into<String>) -> Self {
        Self::ProcessFailure {
            exit_code,
            detail: detail.into(),
        }
    }

    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Innermost error, skipping context wrappers
    pub fn root(&self) -> &SrtcastError {
        match self {
            Self::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// Taxonomy bucket for observers
    pub fn kind(&self) -> ErrorKind {
        match self.root() {
            Self::Validation(_) | Self::SourceNotFound(_) => ErrorKind::Validation,
            Self::CapabilityUnavailable(_) => ErrorKind::CapabilityUnavailable,
            Self::ProtocolUnsupported(_) => ErrorKind::ProtocolUnsupported,
            Self::SessionBusy => ErrorKind::SessionBusy,
            Self::InvalidTransition { .. } | Self::NoActiveSession => ErrorKind::InvalidTransition,
            Self::ProcessFailure { .. } => ErrorKind::ProcessFailure,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Config(_) | Self::Io(_) | Self::WithContext { .. } => ErrorKind::Internal,
        }
    }

    /// Hint shown to the operator next to the error
    pub fn user_hint(&self) -> Option<&'static str> {
        match self.root() {
            Self::CapabilityUnavailable(_) => {
                Some("Install ffmpeg (with libsrt for SRT output) or set [engine] path in config.toml")
            }
            Self::ProtocolUnsupported(_) => Some(
                "Install an ffmpeg build with SRT support, or pass --allow-fallback to stream over UDP",
            ),
            Self::SessionBusy => Some("Stop the running session first with 'srtcast stop'"),
            Self::NoActiveSession => Some("Start one with 'srtcast cast'"),
            Self::SourceNotFound(_) => Some("Run 'srtcast list-sources' to see available sources"),
            Self::Config(_) => Some("Check ~/.config/srtcast/config.toml for errors"),
            Self::Validation(_) => Some("Check the server and profile settings"),
            Self::ProcessFailure { .. } => {
                Some("Run with -vv to see the engine's diagnostic output")
            }
            _ => None,
        }
    }

    /// Whether the operator can fix this without code changes
    pub fn is_user_recoverable(&self) -> bool {
        matches!(
            self.root(),
            Self::Validation(_)
                | Self::CapabilityUnavailable(_)
                | Self::ProtocolUnsupported(_)
                | Self::SessionBusy
                | Self::SourceNotFound(_)
                | Self::Config(_)
        )
    }
}

impl From<ValidationErrors> for SrtcastError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl From<serde_json::Error> for SrtcastError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(format!("JSON error: {}", err))
    }
}

impl From<toml::de::Error> for SrtcastError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("Failed to parse config file: {}", err))
    }
}
