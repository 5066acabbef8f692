use crate::platform::{BuildPlatform, ProjectApi};
use crate::tool::{RunInfo, ToolInfo};
use serde::{Deserialize, Serialize};

/// Serialized record of one patch invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchReport {
    pub schema: String,
    pub tool: ToolInfo,
    #[serde(default)]
    pub run: RunInfo,
    pub platform: BuildPlatform,
    pub output_dir: String,
    #[serde(default)]
    pub dry_run: bool,

    /// True when the platform is not patched and nothing was inspected.
    #[serde(default)]
    pub skipped_platform: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub targets: Option<TargetsInfo>,

    #[serde(default)]
    pub artifacts: Vec<ArtifactChange>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub advisories: Vec<Advisory>,

    pub summary: PatchSummary,
}

impl PatchReport {
    pub fn new(tool: ToolInfo, platform: BuildPlatform, output_dir: impl Into<String>) -> Self {
        Self {
            schema: crate::schema::PUSHPATCH_REPORT_V1.to_string(),
            tool,
            run: RunInfo::default(),
            platform,
            output_dir: output_dir.into(),
            dry_run: false,
            skipped_platform: false,
            targets: None,
            artifacts: vec![],
            advisories: vec![],
            summary: PatchSummary::default(),
        }
    }

    /// Recompute the summary counters from the artifact list.
    pub fn tally(&mut self) {
        self.summary.artifacts_checked = self.artifacts.len() as u64;
        self.summary.artifacts_changed = self
            .artifacts
            .iter()
            .filter(|a| a.status != ArtifactStatus::Unchanged)
            .count() as u64;
        self.summary.advisories = self.advisories.len() as u64;
    }
}

/// Targets the project patch resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetsInfo {
    /// Strategy actually used (`modern` or `legacy`, never `auto`).
    pub strategy: ProjectApi,
    pub main: String,
    pub framework_host: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Project,
    Entitlements,
    InfoPlist,
    Preprocessor,
}

impl ArtifactKind {
    pub fn label(self) -> &'static str {
        match self {
            ArtifactKind::Project => "project",
            ArtifactKind::Entitlements => "entitlements",
            ArtifactKind::InfoPlist => "info plist",
            ArtifactKind::Preprocessor => "preprocessor",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactStatus {
    Unchanged,
    Modified,
    Created,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactChange {
    pub kind: ArtifactKind,
    pub path: String,
    pub status: ArtifactStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256_before: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256_after: Option<String>,
}

/// Non-fatal diagnostic raised during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advisory {
    pub code: String,
    pub message: String,
}

/// Stable advisory codes.
pub mod advisory_codes {
    pub const MIN_OS_VERSION: &str = "min_os_version";
    pub const UNSUPPORTED_SETTING_KIND: &str = "unsupported_setting_kind";
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatchSummary {
    pub artifacts_checked: u64,
    pub artifacts_changed: u64,
    #[serde(default)]
    pub advisories: u64,
}
