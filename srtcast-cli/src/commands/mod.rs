//! CLI command implementations

mod cast;
mod config;
mod endpoint;
mod info;
mod list;
mod status;
mod stop;

pub use cast::{cast, CastArgs};
pub use config::{config, ConfigArgs};
pub use endpoint::{resolve, test_endpoint, EndpointArgs, ResolveArgs, TestEndpointArgs};
pub use info::{info, InfoArgs};
pub use list::{list_sources, presets};
pub use status::{status, StatusArgs};
pub use stop::stop;

use anyhow::{Context, Result};
use srtcast_core::config::ConfigFile;
use std::path::Path;

/// Load the config file, from `path` when given
///
/// A missing file yields defaults; a malformed one is an error.
pub(crate) fn load_config(path: Option<&Path>) -> Result<ConfigFile> {
    let path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(ConfigFile::default_path);

    ConfigFile::load_from(path.clone())
        .with_context(|| format!("Failed to load configuration from {}", path.display()))
}

/// Truncate for table columns
pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
