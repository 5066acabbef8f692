//! Configuration file loading for pushpatch.
//!
//! Discovers and loads `pushpatch.toml` from the build output directory.
//! Merges config file settings with CLI arguments (CLI takes precedence).

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use fs_err as fs;
use pushpatch_core::settings::{DEFAULT_BUNDLE_IDENTIFIER, DEFAULT_MIN_IOS_VERSION};
use pushpatch_types::platform::ProjectApi;
use pushpatch_types::settings::DesiredSetting;
use serde::Deserialize;
use tracing::debug;

/// The config file name to search for.
pub const CONFIG_FILE_NAME: &str = "pushpatch.toml";

/// Top-level configuration from pushpatch.toml.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PushpatchConfig {
    /// Player settings the patch reads from the engine.
    pub player: PlayerConfig,

    /// Project shape overrides.
    pub project: ProjectConfig,

    /// Desired notification settings.
    pub settings: Vec<DesiredSetting>,
}

/// Player section of the config.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Bundle identifier; its last component names a new entitlements file.
    pub bundle_identifier: Option<String>,

    /// Minimum iOS deployment target, e.g. "12.0".
    pub min_ios_version: Option<String>,
}

/// Project section of the config.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Force the project shape instead of probing it.
    pub api: Option<ProjectApi>,
}

/// Look for `pushpatch.toml` in the build output directory.
pub fn discover_config(output_dir: &Utf8Path) -> Option<Utf8PathBuf> {
    let config_path = output_dir.join(CONFIG_FILE_NAME);
    if config_path.exists() {
        debug!("found config file at {}", config_path);
        Some(config_path)
    } else {
        debug!("no config file found at {}", config_path);
        None
    }
}

/// Load and parse a pushpatch.toml config file.
pub fn load_config(path: &Utf8Path) -> anyhow::Result<PushpatchConfig> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read config file {}", path))?;
    parse_config(&contents).with_context(|| format!("parse config file {}", path))
}

/// Parse a config file from a string.
pub fn parse_config(contents: &str) -> anyhow::Result<PushpatchConfig> {
    let config: PushpatchConfig = toml::from_str(contents).context("invalid TOML")?;
    Ok(config)
}

/// Load the explicit config, or the discovered one, or defaults.
pub fn load_or_default(
    output_dir: &Utf8Path,
    explicit: Option<&Utf8Path>,
) -> anyhow::Result<PushpatchConfig> {
    if let Some(path) = explicit {
        return load_config(path);
    }
    match discover_config(output_dir) {
        Some(path) => load_config(&path),
        None => Ok(PushpatchConfig::default()),
    }
}

/// Merged configuration combining config file and CLI arguments.
#[derive(Debug, Clone)]
pub struct MergedConfig {
    pub bundle_identifier: String,
    pub min_ios_version: String,
    pub project_api: ProjectApi,
    pub settings: Vec<DesiredSetting>,
}

/// Builder for merging config file with CLI arguments.
pub struct ConfigMerger {
    config: PushpatchConfig,
}

impl ConfigMerger {
    pub fn new(config: PushpatchConfig) -> Self {
        Self { config }
    }

    /// Merge with patch command CLI arguments.
    ///
    /// Scalar flags override the file. A settings list from the CLI replaces
    /// the file's list instead of extending it.
    pub fn merge_patch_args(
        self,
        cli_bundle_identifier: Option<&str>,
        cli_min_ios_version: Option<&str>,
        cli_project_api: Option<ProjectApi>,
        cli_settings: Option<Vec<DesiredSetting>>,
    ) -> MergedConfig {
        let bundle_identifier = cli_bundle_identifier
            .map(str::to_string)
            .or(self.config.player.bundle_identifier)
            .unwrap_or_else(|| DEFAULT_BUNDLE_IDENTIFIER.to_string());
        let min_ios_version = cli_min_ios_version
            .map(str::to_string)
            .or(self.config.player.min_ios_version)
            .unwrap_or_else(|| DEFAULT_MIN_IOS_VERSION.to_string());

        MergedConfig {
            bundle_identifier,
            min_ios_version,
            project_api: cli_project_api.or(self.config.project.api).unwrap_or_default(),
            settings: cli_settings.unwrap_or(self.config.settings),
        }
    }
}
