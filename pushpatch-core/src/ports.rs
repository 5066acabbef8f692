//! Port traits abstracting settings input and artifact writes away from the pipeline.

use camino::Utf8Path;
use pushpatch_types::settings::DesiredSetting;

/// Source of the desired-settings list. Read once per run.
pub trait SettingsSource {
    fn load_settings(&self) -> anyhow::Result<Vec<DesiredSetting>>;
}

/// File-system write operations.
pub trait WritePort {
    fn write_file(&self, path: &Utf8Path, contents: &[u8]) -> anyhow::Result<()>;
    fn create_dir_all(&self, path: &Utf8Path) -> anyhow::Result<()>;
}
