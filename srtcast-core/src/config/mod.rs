//! Configuration types for srtcast
//!
//! Encoding profiles, quality presets, and the on-disk configuration file.

mod file;

pub use file::{sample_config, ConfigFile, DefaultSettings, EngineSettings, NamedProfile, NamedServer, SettingsStore};

use serde::{Deserialize, Serialize};

use crate::error::ValidationErrors;

/// Default keyframe interval in frames
pub const DEFAULT_KEYFRAME_INTERVAL: u32 = 60;

/// Output resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl std::str::FromStr for Resolution {
    type Err = String;

    /// Accepts exactly `<digits>x<digits>`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once('x')
            .ok_or_else(|| format!("Invalid resolution '{}', expected WxH", s))?;

        let all_digits = |p: &str| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit());
        if !all_digits(w) || !all_digits(h) {
            return Err(format!("Invalid resolution '{}', expected WxH", s));
        }

        let width = w
            .parse()
            .map_err(|_| format!("Resolution width out of range: {}", w))?;
        let height = h
            .parse()
            .map_err(|_| format!("Resolution height out of range: {}", h))?;
        Ok(Self { width, height })
    }
}

impl Serialize for Resolution {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Resolution {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// x264 speed preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EncoderPreset {
    Ultrafast,
    Superfast,
    /// Default for live streaming
    #[default]
    Veryfast,
    Faster,
    Fast,
    Medium,
}

impl EncoderPreset {
    /// Name passed to `-preset`
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ultrafast => "ultrafast",
            Self::Superfast => "superfast",
            Self::Veryfast => "veryfast",
            Self::Faster => "faster",
            Self::Fast => "fast",
            Self::Medium => "medium",
        }
    }
}

impl std::fmt::Display for EncoderPreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EncoderPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ultrafast" => Ok(Self::Ultrafast),
            "superfast" => Ok(Self::Superfast),
            "veryfast" => Ok(Self::Veryfast),
            "faster" => Ok(Self::Faster),
            "fast" => Ok(Self::Fast),
            "medium" => Ok(Self::Medium),
            _ => Err(format!("Unknown encoder preset: {}", s)),
        }
    }
}

/// H.264 profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum H264Profile {
    Baseline,
    Main,
    #[default]
    High,
}

impl H264Profile {
    /// Name passed to `-profile:v`
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Baseline => "baseline",
            Self::Main => "main",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for H264Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for H264Profile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "baseline" => Ok(Self::Baseline),
            "main" => Ok(Self::Main),
            "high" => Ok(Self::High),
            _ => Err(format!("Unknown H.264 profile: {}", s)),
        }
    }
}

/// Named quality tiers offered to the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum QualityPreset {
    /// 854x480 @ 1000 kbps
    UltraLow,
    /// 1280x720 @ 2500 kbps
    Low,
    /// 1920x1080 @ 5000 kbps (default)
    #[default]
    Medium,
    /// 1920x1080 @ 8000 kbps
    High,
    /// 1920x1080 @ 12000 kbps
    UltraHigh,
}

impl QualityPreset {
    /// Every preset, lowest first
    pub const ALL: [QualityPreset; 5] = [
        Self::UltraLow,
        Self::Low,
        Self::Medium,
        Self::High,
        Self::UltraHigh,
    ];

    /// Display label
    pub fn label(&self) -> &'static str {
        match self {
            Self::UltraLow => "Ultra Low (480p)",
            Self::Low => "Low (720p)",
            Self::Medium => "Medium (1080p)",
            Self::High => "High (1080p)",
            Self::UltraHigh => "Ultra High (1080p)",
        }
    }

    /// Expand into a full encoding profile
    pub fn profile(&self) -> EncodingProfile {
        let (resolution, bitrate_kbps, preset, h264_profile) = match self {
            Self::UltraLow => (
                Resolution::new(854, 480),
                1000,
                EncoderPreset::Ultrafast,
                H264Profile::Baseline,
            ),
            Self::Low => (
                Resolution::new(1280, 720),
                2500,
                EncoderPreset::Veryfast,
                H264Profile::Main,
            ),
            Self::Medium => (
                Resolution::new(1920, 1080),
                5000,
                EncoderPreset::Veryfast,
                H264Profile::High,
            ),
            Self::High => (
                Resolution::new(1920, 1080),
                8000,
                EncoderPreset::Fast,
                H264Profile::High,
            ),
            Self::UltraHigh => (
                Resolution::new(1920, 1080),
                12000,
                EncoderPreset::Medium,
                H264Profile::High,
            ),
        };

        EncodingProfile {
            resolution,
            frame_rate: 30,
            bitrate_kbps,
            preset,
            h264_profile,
            keyframe_interval_frames: DEFAULT_KEYFRAME_INTERVAL,
        }
    }
}

impl std::fmt::Display for QualityPreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UltraLow => write!(f, "ultra-low"),
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::UltraHigh => write!(f, "ultra-high"),
        }
    }
}

impl std::str::FromStr for QualityPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ultra-low" | "ultralow" | "480p" => Ok(Self::UltraLow),
            "low" | "720p" => Ok(Self::Low),
            "medium" | "1080p" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "ultra-high" | "ultrahigh" => Ok(Self::UltraHigh),
            _ => Err(format!("Unknown quality preset: {}", s)),
        }
    }
}

/// How the engine should encode the capture
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EncodingProfile {
    /// Output size
    pub resolution: Resolution,
    /// Capture framerate
    pub frame_rate: u32,
    /// Target video bitrate in kbps
    #[serde(rename = "bitrate")]
    pub bitrate_kbps: u32,
    /// x264 speed preset
    #[serde(default)]
    pub preset: EncoderPreset,
    /// H.264 profile
    #[serde(default, rename = "profile")]
    pub h264_profile: H264Profile,
    /// GOP length in frames
    #[serde(default = "default_keyframe_interval", rename = "keyframe_interval")]
    pub keyframe_interval_frames: u32,
}

fn default_keyframe_interval() -> u32 {
    DEFAULT_KEYFRAME_INTERVAL
}

impl Default for EncodingProfile {
    fn default() -> Self {
        QualityPreset::default().profile()
    }
}

impl EncodingProfile {
    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_frame_rate(mut self, fps: u32) -> Self {
        self.frame_rate = fps;
        self
    }

    pub fn with_bitrate(mut self, kbps: u32) -> Self {
        self.bitrate_kbps = kbps;
        self
    }

    pub fn with_preset(mut self, preset: EncoderPreset) -> Self {
        self.preset = preset;
        self
    }

    pub fn with_h264_profile(mut self, profile: H264Profile) -> Self {
        self.h264_profile = profile;
        self
    }

    pub fn with_keyframe_interval(mut self, frames: u32) -> Self {
        self.keyframe_interval_frames = frames;
        self
    }

    /// Decoder buffer size in kbps (twice the bitrate)
    pub fn bufsize_kbps(&self) -> u64 {
        self.bitrate_kbps as u64 * 2
    }

    /// Check the profile, collecting every rejected field
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.resolution.width == 0 || self.resolution.height == 0 {
            errors.push("resolution", format!("{} has a zero dimension", self.resolution));
        }
        if self.bitrate_kbps == 0 {
            errors.push("bitrate", "must be greater than 0");
        }
        if self.frame_rate == 0 {
            errors.push("frame_rate", "must be greater than 0");
        }
        if self.keyframe_interval_frames == 0 {
            errors.push("keyframe_interval", "must be greater than 0");
        }

        errors.into_result()
    }

    /// Non-fatal advice about the profile
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.frame_rate > 60 {
            warnings.push(format!(
                "{} fps is above what screen grabbing usually sustains",
                self.frame_rate
            ));
        }

        let pixels = self.resolution.width as u64 * self.resolution.height as u64;
        if pixels >= 1920 * 1080 && self.bitrate_kbps < 2500 {
            warnings.push(format!(
                "{} kbps is low for {}; expect visible artifacts",
                self.bitrate_kbps, self.resolution
            ));
        }

        if self.h264_profile == H264Profile::Baseline && self.resolution.height > 720 {
            warnings.push("Baseline profile above 720p wastes bitrate; consider main or high".into());
        }

        warnings
    }
}
