//! SRT endpoint resolution
//!
//! Turns a server descriptor plus a stream key into the transport URL handed
//! to the engine. Query parameters are always emitted in the same order and
//! percent-encoded, so identical descriptors give byte-identical URLs:
//!
//! ```text
//! srt://<host>:<port>?mode=<m>&latency=<ms>&maxbw=<kbps>k[&passphrase=..&pbkeylen=..][&streamid=..]
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ValidationErrors;

/// URL scheme of resolved endpoints
pub const SRT_SCHEME: &str = "srt";

/// Transport protocol of an output URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamProtocol {
    /// Secure Reliable Transport
    Srt,
    /// Plain MPEG-TS over UDP (SRT fallback)
    Udp,
}

impl StreamProtocol {
    /// Detect protocol from URL
    pub fn from_url(url: &str) -> Option<Self> {
        let lower = url.to_lowercase();
        if lower.starts_with("srt://") {
            Some(Self::Srt)
        } else if lower.starts_with("udp://") {
            Some(Self::Udp)
        } else {
            None
        }
    }

    /// URL scheme without the `://`
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Srt => SRT_SCHEME,
            Self::Udp => "udp",
        }
    }
}

impl std::fmt::Display for StreamProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Srt => write!(f, "SRT"),
            Self::Udp => write!(f, "UDP"),
        }
    }
}

/// SRT connection role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SrtMode {
    /// We initiate the connection
    #[default]
    Caller,
    /// We wait for the remote side
    Listener,
}

impl SrtMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Caller => "caller",
            Self::Listener => "listener",
        }
    }
}

impl std::fmt::Display for SrtMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SrtMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "caller" => Ok(Self::Caller),
            "listener" => Ok(Self::Listener),
            _ => Err(format!("Mode must be either \"caller\" or \"listener\", got \"{}\"", s)),
        }
    }
}

/// Encryption key length in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyLength {
    Aes128,
    Aes192,
    Aes256,
}

impl KeyLength {
    /// Value of the `pbkeylen` parameter
    pub fn bytes(&self) -> u32 {
        match self {
            Self::Aes128 => 16,
            Self::Aes192 => 24,
            Self::Aes256 => 32,
        }
    }

    pub fn from_bytes(bytes: u32) -> Option<Self> {
        match bytes {
            16 => Some(Self::Aes128),
            24 => Some(Self::Aes192),
            32 => Some(Self::Aes256),
            _ => None,
        }
    }
}

fn default_mode() -> String {
    SrtMode::Caller.as_str().to_string()
}

fn default_latency() -> u32 {
    120
}

/// Ingest server descriptor as supplied by the operator or settings store
///
/// Fields are kept in their raw form so `resolve` can report every problem
/// at once instead of failing on the first one during parsing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransportEndpoint {
    /// Hostname or address
    pub host: String,
    /// Port, valid range 1-65535
    pub port: u32,
    /// "caller" or "listener"
    #[serde(default = "default_mode")]
    pub mode: String,
    /// SRT latency in milliseconds
    #[serde(default = "default_latency", rename = "latency")]
    pub latency_ms: u32,
    /// Bandwidth cap in kbps
    #[serde(default, rename = "maxbw", skip_serializing_if = "Option::is_none")]
    pub max_bandwidth_kbps: Option<u32>,
    /// Encryption passphrase
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passphrase: Option<String>,
    /// Key length in bytes (16, 24 or 32); required with a passphrase
    #[serde(default, rename = "pbkeylen", skip_serializing_if = "Option::is_none")]
    pub pb_key_len: Option<u32>,
    /// Stream identifier; the stream key is used when absent
    #[serde(default, rename = "streamid", skip_serializing_if = "Option::is_none")]
    pub stream_id: Option<String>,
}

impl TransportEndpoint {
    /// Caller-mode endpoint with 120 ms latency
    pub fn new(host: impl Into<String>, port: u32) -> Self {
        Self {
            host: host.into(),
            port,
            mode: default_mode(),
            latency_ms: default_latency(),
            max_bandwidth_kbps: None,
            passphrase: None,
            pb_key_len: None,
            stream_id: None,
        }
    }

    pub fn with_mode(mut self, mode: SrtMode) -> Self {
        self.mode = mode.as_str().to_string();
        self
    }

    pub fn with_latency(mut self, ms: u32) -> Self {
        self.latency_ms = ms;
        self
    }

    pub fn with_max_bandwidth(mut self, kbps: u32) -> Self {
        self.max_bandwidth_kbps = Some(kbps);
        self
    }

    pub fn with_encryption(mut self, passphrase: impl Into<String>, key_len: u32) -> Self {
        self.passphrase = Some(passphrase.into());
        self.pb_key_len = Some(key_len);
        self
    }

    pub fn with_stream_id(mut self, id: impl Into<String>) -> Self {
        self.stream_id = Some(id.into());
        self
    }

    /// Check the descriptor, collecting every rejected field
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.host.trim().is_empty() {
            errors.push("host", "Host is required");
        }

        if !(1..=65535).contains(&self.port) {
            errors.push(
                "port",
                format!("Valid port number is required (1-65535), got {}", self.port),
            );
        }

        if let Err(e) = self.mode.parse::<SrtMode>() {
            errors.push("mode", e);
        }

        let passphrase = self.passphrase.as_deref().filter(|p| !p.is_empty());
        match (passphrase, self.pb_key_len) {
            (Some(_), None) => errors.push("pbkeylen", "Key length is required with a passphrase"),
            (_, Some(len)) if KeyLength::from_bytes(len).is_none() => {
                errors.push("pbkeylen", format!("Key length must be 16, 24 or 32, got {}", len))
            }
            _ => {}
        }

        errors.into_result()
    }
}

/// Build the SRT URL for a server and stream key
///
/// Returns every validation failure when the descriptor is unusable; a URL is
/// produced only when there are none.
pub fn resolve(server: &TransportEndpoint, stream_key: &str) -> Result<String, ValidationErrors> {
    server.validate()?;

    let mut url = format!("{}://{}:{}", SRT_SCHEME, server.host.trim(), server.port);
    let mut params: Vec<(&str, String)> = Vec::with_capacity(6);

    params.push(("mode", server.mode.clone()));
    params.push(("latency", server.latency_ms.to_string()));

    if let Some(maxbw) = server.max_bandwidth_kbps {
        params.push(("maxbw", format!("{}k", maxbw)));
    }

    if let Some(passphrase) = server.passphrase.as_deref().filter(|p| !p.is_empty()) {
        // validate() guarantees the key length is present here
        if let Some(len) = server.pb_key_len {
            params.push(("passphrase", passphrase.to_string()));
            params.push(("pbkeylen", len.to_string()));
        }
    }

    let stream_id = server
        .stream_id
        .as_deref()
        .filter(|s| !s.is_empty())
        .or(Some(stream_key).filter(|k| !k.is_empty()));
    if let Some(id) = stream_id {
        params.push(("streamid", id.to_string()));
    }

    let query: Vec<String> = params
        .iter()
        .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value)))
        .collect();
    url.push('?');
    url.push_str(&query.join("&"));

    Ok(url)
}

/// Mask secrets in a transport URL for logging
pub fn safe_url(url: &str) -> String {
    let Some((base, query)) = url.split_once('?') else {
        return url.to_string();
    };

    let masked: Vec<String> = query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((key, _)) if key == "passphrase" || key == "streamid" => format!("{}=****", key),
            _ => pair.to_string(),
        })
        .collect();

    format!("{}?{}", base, masked.join("&"))
}

/// Split `scheme://host:port?query` into its host and port parts
pub fn host_port(url: &str) -> Option<(&str, &str)> {
    let (_, rest) = url.split_once("://")?;
    let authority = rest.split(['?', '/']).next()?;
    let (host, port) = authority.rsplit_once(':')?;
    if host.is_empty() || port.is_empty() {
        return None;
    }
    Some((host, port))
}
