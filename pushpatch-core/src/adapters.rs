//! Default filesystem-backed port implementations.

use crate::ports::{SettingsSource, WritePort};
use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use fs_err as fs;
use pushpatch_types::settings::DesiredSetting;
use tracing::debug;

/// Loads a JSON array of `{key, kind, value}` records.
#[derive(Debug, Clone)]
pub struct FsSettingsSource {
    pub path: Utf8PathBuf,
}

impl FsSettingsSource {
    pub fn new(path: Utf8PathBuf) -> Self {
        Self { path }
    }
}

impl SettingsSource for FsSettingsSource {
    fn load_settings(&self) -> anyhow::Result<Vec<DesiredSetting>> {
        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("read settings {}", self.path))?;
        let settings: Vec<DesiredSetting> = serde_json::from_str(&text)
            .with_context(|| format!("parse settings {}", self.path))?;
        debug!(path = %self.path, count = settings.len(), "loaded desired settings");
        Ok(settings)
    }
}

/// In-memory settings source for embedding and testing.
#[derive(Debug, Clone, Default)]
pub struct InMemorySettingsSource {
    settings: Vec<DesiredSetting>,
}

impl InMemorySettingsSource {
    pub fn new(settings: Vec<DesiredSetting>) -> Self {
        Self { settings }
    }
}

impl SettingsSource for InMemorySettingsSource {
    fn load_settings(&self) -> anyhow::Result<Vec<DesiredSetting>> {
        Ok(self.settings.clone())
    }
}

/// Filesystem write operations.
#[derive(Debug, Clone, Default)]
pub struct FsWritePort;

impl WritePort for FsWritePort {
    fn write_file(&self, path: &Utf8Path, contents: &[u8]) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create parent dir for {}", path))?;
        }
        fs::write(path, contents).with_context(|| format!("write {}", path))
    }

    fn create_dir_all(&self, path: &Utf8Path) -> anyhow::Result<()> {
        fs::create_dir_all(path).with_context(|| format!("create_dir_all {}", path))
    }
}
