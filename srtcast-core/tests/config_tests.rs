//! Integration tests for configuration system

use srtcast_core::config::{
    sample_config, ConfigFile, EncoderPreset, EncodingProfile, H264Profile, NamedProfile,
    NamedServer, QualityPreset, Resolution, SettingsStore,
};
use srtcast_core::endpoint::TransportEndpoint;
use tempfile::TempDir;

#[test]
fn test_quality_presets() {
    let low = QualityPreset::Low.profile();
    assert_eq!(low.resolution, Resolution::new(1280, 720));
    assert_eq!(low.bitrate_kbps, 2500);
    assert_eq!(low.frame_rate, 30);
    assert_eq!(low.keyframe_interval_frames, 60);

    let ultra_low = QualityPreset::UltraLow.profile();
    assert_eq!(ultra_low.resolution, Resolution::new(854, 480));
    assert_eq!(ultra_low.preset, EncoderPreset::Ultrafast);
    assert_eq!(ultra_low.h264_profile, H264Profile::Baseline);

    assert_eq!(QualityPreset::UltraHigh.profile().bitrate_kbps, 12000);
}

#[test]
fn test_every_preset_is_valid() {
    for preset in QualityPreset::ALL {
        assert!(preset.profile().validate().is_ok(), "{} should validate", preset);
    }
}

#[test]
fn test_preset_from_string() {
    assert_eq!("ultra-low".parse::<QualityPreset>(), Ok(QualityPreset::UltraLow));
    assert_eq!("720p".parse::<QualityPreset>(), Ok(QualityPreset::Low));
    assert_eq!("HIGH".parse::<QualityPreset>(), Ok(QualityPreset::High));
    assert!("4k".parse::<QualityPreset>().is_err());
}

#[test]
fn test_profile_validation_collects_fields() {
    let profile = EncodingProfile::default()
        .with_resolution(Resolution::new(0, 720))
        .with_bitrate(0)
        .with_frame_rate(0)
        .with_keyframe_interval(0);

    let errors = profile.validate().unwrap_err();
    assert_eq!(errors.len(), 4);
    assert!(errors.has_field("resolution"));
    assert!(errors.has_field("bitrate"));
    assert!(errors.has_field("frame_rate"));
    assert!(errors.has_field("keyframe_interval"));
}

#[test]
fn test_profile_warnings() {
    assert!(QualityPreset::Medium.profile().warnings().is_empty());

    let starved = QualityPreset::Medium.profile().with_bitrate(1000);
    assert_eq!(starved.warnings().len(), 1);

    let fast = QualityPreset::Low.profile().with_frame_rate(120);
    assert!(fast.warnings()[0].contains("120 fps"));
}

#[test]
fn test_bufsize_is_twice_bitrate() {
    assert_eq!(QualityPreset::Medium.profile().bufsize_kbps(), 10000);
}

#[test]
fn test_config_save_load() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("srtcast").join("config.toml");

    let mut config = ConfigFile::default();
    config.defaults.quality = QualityPreset::High;
    config.defaults.server = Some("studio".to_string());
    config.engine.stop_grace_ms = 1500;
    config.servers.push(NamedServer {
        name: "studio".to_string(),
        description: String::new(),
        endpoint: TransportEndpoint::new("10.0.0.5", 9000).with_encryption("hunter2hunter2", 16),
    });

    config.save_to(config_path.clone()).expect("Should save");
    assert!(config_path.exists());

    let loaded = ConfigFile::load_from(config_path).expect("Should load");
    assert_eq!(loaded.defaults.quality, QualityPreset::High);
    assert_eq!(loaded.engine.stop_grace_ms, 1500);
    assert_eq!(loaded.servers, config.servers);
    assert_eq!(
        loaded.default_server().map(|s| s.host),
        Some("10.0.0.5".to_string())
    );
}

#[test]
fn test_missing_file_gives_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let config = ConfigFile::load_from(temp_dir.path().join("absent.toml")).unwrap();
    assert_eq!(config.defaults.quality, QualityPreset::Medium);
    assert!(config.default_server().is_none());
}

#[test]
fn test_malformed_file_is_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(&path, "[defaults\nquality = ").unwrap();

    let err = ConfigFile::load_from(path).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config file"));
}

#[test]
fn test_sample_config() {
    let sample = sample_config();
    let config: ConfigFile = toml::from_str(&sample).expect("Sample should parse");

    assert!(config.validate().is_empty());
    let server = config.server("local").expect("Sample defines 'local'");
    assert_eq!(server.host, "localhost");
    assert_eq!(server.max_bandwidth_kbps, Some(10000));

    let gaming = config.profile("gaming").expect("Sample defines 'gaming'");
    assert_eq!(gaming.resolution, Resolution::new(1920, 1080));
    assert_eq!(gaming.keyframe_interval_frames, 120);
}

#[test]
fn test_default_profile_selection() {
    let mut config = ConfigFile::default();
    config.defaults.quality = QualityPreset::Low;
    assert_eq!(config.default_profile(), QualityPreset::Low.profile());

    let custom = QualityPreset::Low.profile().with_frame_rate(60);
    config.profiles.push(NamedProfile {
        name: "smooth".to_string(),
        description: String::new(),
        profile: custom.clone(),
    });
    config.defaults.profile = Some("smooth".to_string());
    assert_eq!(config.default_profile(), custom);
}

#[test]
fn test_validate_reports_bad_entries() {
    let mut config = ConfigFile::default();
    config.servers.push(NamedServer {
        name: "broken".to_string(),
        description: String::new(),
        endpoint: TransportEndpoint::new("", 70000),
    });
    config.defaults.profile = Some("missing".to_string());

    let problems = config.validate();
    assert_eq!(problems.len(), 2);
    assert!(problems[0].starts_with("Server 'broken'"));
    assert!(problems[1].contains("'missing'"));
}
