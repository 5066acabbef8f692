//! The patch pipeline, extracted from the CLI.
//!
//! Artifacts are read from the output directory, every edit is computed in
//! memory, and only then are changed files handed to the [`WritePort`].

use crate::ports::{SettingsSource, WritePort};
use crate::settings::PatchSettings;
use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use fs_err as fs;
use pushpatch_edit::capability::{PUSH_CAPABILITY, default_entitlements_name, push_capability_edit};
use pushpatch_edit::macros::{MacroFlags, PREPROCESSOR_REL_PATH, macro_edit};
use pushpatch_edit::plist_merge::{INFO_PLIST_NAME, plist_edit};
use pushpatch_edit::project::{CODE_SIGN_ENTITLEMENTS, ProjectGraph, project_path};
use pushpatch_edit::resolve::resolve_targets;
use pushpatch_edit::{FileEdit, PatchError, read_optional, render_patch};
use pushpatch_hash::sha256_hex_opt;
use pushpatch_types::outcome::{
    Advisory, ArtifactChange, ArtifactKind, ArtifactStatus, PatchReport, TargetsInfo,
    advisory_codes,
};
use pushpatch_types::platform::TargetRole;
use pushpatch_types::settings::{DesiredSetting, bool_setting, keys};
use pushpatch_types::tool::ToolInfo;
use tracing::{debug, info, warn};

pub const USER_NOTIFICATIONS_FRAMEWORK: &str = "UserNotifications.framework";
pub const CORE_LOCATION_FRAMEWORK: &str = "CoreLocation.framework";

/// Lowest deployment target the notification runtime supports.
const MIN_SUPPORTED_IOS: (u32, u32) = (10, 0);

/// Switches derived from the desired settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeatureFlags {
    pub need_location_framework: bool,
    pub add_push_capability: bool,
    /// Only meaningful when push is enabled.
    pub use_release_environment: bool,
}

impl FeatureFlags {
    pub fn from_settings(settings: &[DesiredSetting]) -> Self {
        let add_push_capability = bool_setting(settings, keys::ADD_REMOTE_NOTIFICATION_CAPABILITY);
        Self {
            need_location_framework: bool_setting(settings, keys::USE_LOCATION_TRIGGER),
            add_push_capability,
            use_release_environment: add_push_capability
                && bool_setting(settings, keys::USE_APS_RELEASE_ENVIRONMENT),
        }
    }

    fn macro_flags(self) -> MacroFlags {
        MacroFlags {
            location_enabled: self.need_location_framework,
            push_enabled: self.add_push_capability,
        }
    }
}

/// Outcome of `run_patch`.
#[derive(Debug, Clone)]
pub struct PatchOutcome {
    pub report: PatchReport,
    /// Unified diff of every change, whether or not it was written.
    pub patch: String,
}

/// One inspected artifact and the edit it needs, if any.
struct Checked {
    kind: ArtifactKind,
    path: Utf8PathBuf,
    before: Option<Vec<u8>>,
    edit: Option<FileEdit>,
}

impl Checked {
    fn change(&self, root: &Utf8Path) -> ArtifactChange {
        let status = match &self.edit {
            Some(edit) if !edit.is_change() => ArtifactStatus::Unchanged,
            Some(edit) if edit.is_creation() => ArtifactStatus::Created,
            Some(_) => ArtifactStatus::Modified,
            None => ArtifactStatus::Unchanged,
        };
        let after = self
            .edit
            .as_ref()
            .map(|e| e.after.as_slice())
            .or(self.before.as_deref());
        ArtifactChange {
            kind: self.kind,
            path: self
                .path
                .strip_prefix(root)
                .unwrap_or(self.path.as_path())
                .to_string(),
            status,
            sha256_before: sha256_hex_opt(self.before.as_deref()),
            sha256_after: sha256_hex_opt(after),
        }
    }
}

/// Run the patch pipeline against `settings.output_dir`.
///
/// Non-iOS platforms return an empty outcome without touching the filesystem.
pub fn run_patch(
    settings: &PatchSettings,
    source: &dyn SettingsSource,
    writer: &dyn WritePort,
    tool: ToolInfo,
) -> Result<PatchOutcome, PatchError> {
    let mut report = PatchReport::new(tool, settings.platform, settings.output_dir.as_str());
    report.run.started_at = Some(Utc::now());
    report.dry_run = settings.dry_run;

    if !settings.platform.is_patched() {
        debug!(platform = settings.platform.as_str(), "platform is not patched");
        report.skipped_platform = true;
        finish(&mut report);
        return Ok(PatchOutcome {
            report,
            patch: String::new(),
        });
    }

    let desired = source.load_settings().context("load desired settings")?;
    let flags = FeatureFlags::from_settings(&desired);
    debug!(?flags, settings = desired.len(), "derived feature flags");

    if let Some(advisory) = min_version_advisory(&settings.min_ios_version) {
        warn!(code = %advisory.code, "{}", advisory.message);
        report.advisories.push(advisory);
    }

    let root = settings.output_dir.as_path();
    let (mut checked, targets) = patch_project(settings, flags)?;
    report.targets = Some(targets);

    let plist_path = root.join(INFO_PLIST_NAME);
    let plist_bytes = read_required(&plist_path)?;
    let (merge, plist_change) =
        plist_edit(&plist_path, &plist_bytes, &desired, flags.add_push_capability)?;
    for key in &merge.skipped_keys {
        let advisory = Advisory {
            code: advisory_codes::UNSUPPORTED_SETTING_KIND.to_string(),
            message: format!("setting '{key}' has text kind and is not written to {INFO_PLIST_NAME}"),
        };
        warn!(key = %key, "text setting skipped");
        report.advisories.push(advisory);
    }
    checked.push(Checked {
        kind: ArtifactKind::InfoPlist,
        path: plist_path,
        before: Some(plist_bytes),
        edit: plist_change,
    });

    let header_path = root.join(PREPROCESSOR_REL_PATH);
    let header_bytes = read_required(&header_path)?;
    let header_change = macro_edit(&header_path, &header_bytes, flags.macro_flags())?;
    checked.push(Checked {
        kind: ArtifactKind::Preprocessor,
        path: header_path,
        before: Some(header_bytes),
        edit: header_change,
    });

    let edits: Vec<FileEdit> = checked
        .iter()
        .filter_map(|c| c.edit.clone())
        .filter(FileEdit::is_change)
        .collect();
    let patch = render_patch(root, &edits);

    if settings.dry_run {
        debug!(pending = edits.len(), "dry run, nothing written");
    } else {
        for edit in &edits {
            save(edit, writer)?;
        }
    }

    report.artifacts = checked.iter().map(|c| c.change(root)).collect();
    finish(&mut report);
    Ok(PatchOutcome { report, patch })
}

/// Write one edit through the port.
pub fn save(edit: &FileEdit, writer: &dyn WritePort) -> Result<bool, PatchError> {
    if !edit.is_change() {
        return Ok(false);
    }
    writer
        .write_file(&edit.path, &edit.after)
        .with_context(|| format!("save {}", edit.path))?;
    info!(path = %edit.path, created = edit.is_creation(), "wrote artifact");
    Ok(true)
}

fn patch_project(
    settings: &PatchSettings,
    flags: FeatureFlags,
) -> Result<(Vec<Checked>, TargetsInfo), PatchError> {
    let root = settings.output_dir.as_path();
    let path = project_path(root);
    let mut graph = ProjectGraph::open(&path)?;
    let targets = resolve_targets(&graph, settings.project_api)?;
    let mut checked = Vec::new();

    graph.link_framework(
        &targets,
        TargetRole::SharedFrameworkHost,
        USER_NOTIFICATIONS_FRAMEWORK,
        true,
    )?;
    if flags.need_location_framework {
        graph.link_framework(
            &targets,
            TargetRole::SharedFrameworkHost,
            CORE_LOCATION_FRAMEWORK,
            false,
        )?;
    }

    if flags.add_push_capability {
        let rel_path = graph
            .build_property_for_any_config(&targets.main, CODE_SIGN_ENTITLEMENTS)
            .unwrap_or_else(|| default_entitlements_name(&settings.bundle_identifier));
        let entitlements_path = root.join(&rel_path);
        let existing = read_optional(&entitlements_path)?;
        let sandbox = !flags.use_release_environment;
        let edit = push_capability_edit(&entitlements_path, existing.as_deref(), sandbox)?;
        debug!(path = %entitlements_path, sandbox, "push capability");

        graph.attach_capability_file(&targets.main, &rel_path)?;
        graph.enable_system_capability(&targets.main, PUSH_CAPABILITY)?;
        checked.push(Checked {
            kind: ArtifactKind::Entitlements,
            path: entitlements_path,
            before: existing,
            edit,
        });
    }

    checked.insert(
        0,
        Checked {
            kind: ArtifactKind::Project,
            path: path.clone(),
            before: Some(graph.source_text().as_bytes().to_vec()),
            edit: graph.pending_edit(),
        },
    );
    Ok((checked, targets.info()))
}

fn read_required(path: &Utf8Path) -> Result<Vec<u8>, PatchError> {
    let bytes = fs::read(path).with_context(|| format!("read {}", path))?;
    Ok(bytes)
}

fn finish(report: &mut PatchReport) {
    report.tally();
    report.run.ended_at = Some(Utc::now());
}

/// Advisory for a deployment target the notification runtime cannot serve.
pub fn min_version_advisory(version: &str) -> Option<Advisory> {
    let message = match parse_version(version) {
        Some(v) if v >= MIN_SUPPORTED_IOS => return None,
        Some(_) => format!(
            "minimum iOS version {version} is below {}.{}; notifications need iOS 10 or later",
            MIN_SUPPORTED_IOS.0, MIN_SUPPORTED_IOS.1
        ),
        None => format!("minimum iOS version '{version}' cannot be parsed"),
    };
    Some(Advisory {
        code: advisory_codes::MIN_OS_VERSION.to_string(),
        message,
    })
}

fn parse_version(version: &str) -> Option<(u32, u32)> {
    let mut parts = version.trim().split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = match parts.next() {
        Some(minor) => minor.parse().ok()?,
        None => 0,
    };
    Some((major, minor))
}

/// Write the run report as JSON, with a markdown summary next to it.
pub fn write_report(
    outcome: &PatchOutcome,
    path: &Utf8Path,
    writer: &dyn WritePort,
) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_str().is_empty()) {
        writer.create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(&outcome.report).context("serialize report")?;
    writer.write_file(path, json.as_bytes())?;

    #[cfg(feature = "reporting")]
    {
        let md = pushpatch_render::render_report_md(&outcome.report);
        writer.write_file(&path.with_extension("md"), md.as_bytes())?;
    }

    Ok(())
}
