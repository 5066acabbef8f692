use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Build target platform handed to the post-build callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildPlatform {
    Ios,
    Tvos,
    Android,
    Standalone,
}

impl BuildPlatform {
    /// Only iOS output carries the notification wiring.
    pub fn is_patched(self) -> bool {
        matches!(self, BuildPlatform::Ios)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BuildPlatform::Ios => "ios",
            BuildPlatform::Tvos => "tvos",
            BuildPlatform::Android => "android",
            BuildPlatform::Standalone => "standalone",
        }
    }
}

impl FromStr for BuildPlatform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ios" | "iphone" => Ok(BuildPlatform::Ios),
            "tvos" => Ok(BuildPlatform::Tvos),
            "android" => Ok(BuildPlatform::Android),
            "standalone" => Ok(BuildPlatform::Standalone),
            other => Err(format!("unknown build platform '{other}'")),
        }
    }
}

/// Which project shape to assume when resolving targets.
///
/// `Auto` probes the project once per invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectApi {
    #[default]
    Auto,
    /// Separate application and framework-host targets.
    Modern,
    /// A single application target serves both roles.
    Legacy,
}

impl ProjectApi {
    pub fn as_str(self) -> &'static str {
        match self {
            ProjectApi::Auto => "auto",
            ProjectApi::Modern => "modern",
            ProjectApi::Legacy => "legacy",
        }
    }
}

impl FromStr for ProjectApi {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(ProjectApi::Auto),
            "modern" => Ok(ProjectApi::Modern),
            "legacy" => Ok(ProjectApi::Legacy),
            other => Err(format!("unknown project api '{other}'")),
        }
    }
}

/// Role a target plays in the generated project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetRole {
    MainApplication,
    SharedFrameworkHost,
    Other,
}

impl TargetRole {
    pub fn as_str(self) -> &'static str {
        match self {
            TargetRole::MainApplication => "main_application",
            TargetRole::SharedFrameworkHost => "shared_framework_host",
            TargetRole::Other => "other",
        }
    }
}
