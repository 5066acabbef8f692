//! Clap-free settings for the patch pipeline.

use camino::Utf8PathBuf;
use pushpatch_types::platform::{BuildPlatform, ProjectApi};

pub const DEFAULT_BUNDLE_IDENTIFIER: &str = "com.Company.ProductName";
pub const DEFAULT_MIN_IOS_VERSION: &str = "12.0";

/// Settings for one patch invocation.
#[derive(Debug, Clone)]
pub struct PatchSettings {
    pub platform: BuildPlatform,
    /// Root of the generated iOS project.
    pub output_dir: Utf8PathBuf,

    // Player settings
    pub bundle_identifier: String,
    pub min_ios_version: String,

    pub project_api: ProjectApi,
    pub dry_run: bool,
}

impl Default for PatchSettings {
    fn default() -> Self {
        Self {
            platform: BuildPlatform::Ios,
            output_dir: Utf8PathBuf::from("."),
            bundle_identifier: DEFAULT_BUNDLE_IDENTIFIER.to_string(),
            min_ios_version: DEFAULT_MIN_IOS_VERSION.to_string(),
            project_api: ProjectApi::Auto,
            dry_run: false,
        }
    }
}
