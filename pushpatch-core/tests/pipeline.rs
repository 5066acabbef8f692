//! End-to-end pipeline runs against copies of the Unity output fixtures.

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use pretty_assertions::assert_eq;
use pushpatch_core::adapters::{FsWritePort, InMemorySettingsSource};
use pushpatch_core::pipeline::{PatchOutcome, run_patch, write_report};
use pushpatch_core::ports::WritePort;
use pushpatch_core::settings::PatchSettings;
use pushpatch_core::{PatchError, probe};
use pushpatch_edit::openstep;
use pushpatch_edit::project::{CODE_SIGN_ENTITLEMENTS, ProjectGraph};
use pushpatch_types::outcome::{ArtifactKind, ArtifactStatus, advisory_codes};
use pushpatch_types::platform::{BuildPlatform, ProjectApi};
use pushpatch_types::settings::{DesiredSetting, keys};
use pushpatch_types::tool::ToolInfo;
use std::collections::HashMap;
use std::sync::Mutex;
use tempfile::TempDir;

const FIXTURES: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../tests/fixtures");
const PROJECT: &str = "Unity-iPhone.xcodeproj/project.pbxproj";

/// Write port that records every write and forwards it to disk.
#[derive(Default)]
struct RecordingWritePort {
    writes: Mutex<HashMap<Utf8PathBuf, usize>>,
}

impl RecordingWritePort {
    fn total(&self) -> usize {
        self.writes.lock().unwrap().values().sum()
    }
}

impl WritePort for RecordingWritePort {
    fn write_file(&self, path: &Utf8Path, contents: &[u8]) -> anyhow::Result<()> {
        *self
            .writes
            .lock()
            .unwrap()
            .entry(path.to_path_buf())
            .or_default() += 1;
        FsWritePort.write_file(path, contents)
    }

    fn create_dir_all(&self, path: &Utf8Path) -> anyhow::Result<()> {
        FsWritePort.create_dir_all(path)
    }
}

/// Write port that stores files in memory only.
#[derive(Default)]
struct MemWritePort {
    files: Mutex<HashMap<Utf8PathBuf, Vec<u8>>>,
}

impl WritePort for MemWritePort {
    fn write_file(&self, path: &Utf8Path, contents: &[u8]) -> anyhow::Result<()> {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), contents.to_vec());
        Ok(())
    }

    fn create_dir_all(&self, _path: &Utf8Path) -> anyhow::Result<()> {
        Ok(())
    }
}

fn copy_dir(from: &Utf8Path, to: &Utf8Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(to).with_context(|| format!("mkdir {to}"))?;
    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        let src = Utf8PathBuf::from_path_buf(entry.path()).expect("utf8 fixture path");
        let dst = to.join(src.file_name().expect("file name"));
        if entry.file_type()?.is_dir() {
            copy_dir(&src, &dst)?;
        } else {
            std::fs::copy(&src, &dst)?;
        }
    }
    Ok(())
}

fn fixture(shape: &str) -> (TempDir, Utf8PathBuf) {
    let td = TempDir::new().unwrap();
    let out = Utf8PathBuf::from_path_buf(td.path().join("build")).expect("utf8");
    copy_dir(&Utf8Path::new(FIXTURES).join(shape), &out).unwrap();
    (td, out)
}

fn settings_for(out: &Utf8Path) -> PatchSettings {
    PatchSettings {
        output_dir: out.to_path_buf(),
        bundle_identifier: "com.acme.Rocket".to_string(),
        ..PatchSettings::default()
    }
}

fn tool() -> ToolInfo {
    ToolInfo {
        name: "pushpatch".to_string(),
        version: Some("0.0.0".to_string()),
    }
}

fn desired(location: bool, push: bool, release: bool) -> InMemorySettingsSource {
    InMemorySettingsSource::new(vec![
        DesiredSetting::boolean(keys::USE_LOCATION_TRIGGER, location),
        DesiredSetting::boolean(keys::ADD_REMOTE_NOTIFICATION_CAPABILITY, push),
        DesiredSetting::boolean(keys::USE_APS_RELEASE_ENVIRONMENT, release),
        DesiredSetting::enumeration("UnityNotificationRequestAuthorization", 7),
    ])
}

fn read(out: &Utf8Path, rel: &str) -> String {
    std::fs::read_to_string(out.join(rel)).unwrap()
}

fn status(outcome: &PatchOutcome, kind: ArtifactKind) -> Option<ArtifactStatus> {
    outcome
        .report
        .artifacts
        .iter()
        .find(|a| a.kind == kind)
        .map(|a| a.status)
}

#[test]
fn full_feature_run_patches_every_artifact() {
    let (_td, out) = fixture("modern");
    let writer = RecordingWritePort::default();

    let outcome = run_patch(&settings_for(&out), &desired(true, true, false), &writer, tool())
        .expect("run");

    assert_eq!(status(&outcome, ArtifactKind::Project), Some(ArtifactStatus::Modified));
    assert_eq!(status(&outcome, ArtifactKind::Entitlements), Some(ArtifactStatus::Created));
    assert_eq!(status(&outcome, ArtifactKind::InfoPlist), Some(ArtifactStatus::Modified));
    assert_eq!(status(&outcome, ArtifactKind::Preprocessor), Some(ArtifactStatus::Modified));
    assert_eq!(writer.total(), 4);
    assert_eq!(outcome.report.summary.artifacts_changed, 4);

    let plist = read(&out, "Info.plist");
    assert!(plist.contains("<key>UnityUseLocationNotificationTrigger</key>"));
    assert!(plist.contains("<key>UnityAddRemoteNotificationCapability</key>"));
    assert!(plist.contains("<string>remote-notification</string>"));
    assert!(plist.contains("<key>CFBundleIdentifier</key>"));

    let entitlements = read(&out, "Rocket.entitlements");
    assert!(entitlements.contains("<string>development</string>"));

    let header = read(&out, "Classes/Preprocessor.h");
    assert!(header.contains("#define UNITY_USES_LOCATION 1"));
    assert!(header.contains("#define UNITY_USES_REMOTE_NOTIFICATIONS 1"));
    assert!(header.contains("#define UNITY_USES_IAD 0"));

    let project = read(&out, PROJECT);
    assert!(project.contains("CODE_SIGN_ENTITLEMENTS = Rocket.entitlements;"));
    assert!(project.contains("path = System/Library/Frameworks/UserNotifications.framework;"));
    assert!(project.contains("path = System/Library/Frameworks/CoreLocation.framework;"));
    assert!(project.contains("com.apple.Push"));

    let targets = outcome.report.targets.expect("targets");
    assert_eq!(targets.strategy, ProjectApi::Modern);
    assert!(outcome.patch.contains("+#define UNITY_USES_LOCATION 1"));
}

#[test]
fn second_identical_run_writes_nothing() {
    for shape in ["modern", "legacy"] {
        let (_td, out) = fixture(shape);
        let settings = settings_for(&out);
        let source = desired(true, true, true);

        run_patch(&settings, &source, &RecordingWritePort::default(), tool()).expect("first run");
        let second_writer = RecordingWritePort::default();
        let second = run_patch(&settings, &source, &second_writer, tool()).expect("second run");

        assert_eq!(second_writer.total(), 0, "{shape}");
        assert_eq!(second.report.summary.artifacts_changed, 0, "{shape}");
        assert!(second.patch.is_empty(), "{shape}");
        for artifact in &second.report.artifacts {
            assert_eq!(artifact.sha256_before, artifact.sha256_after, "{}", artifact.path);
        }
    }
}

#[test]
fn push_disabled_leaves_push_artifacts_alone() {
    let (_td, out) = fixture("modern");
    let before_plist = read(&out, "Info.plist");
    let writer = RecordingWritePort::default();

    let outcome = run_patch(&settings_for(&out), &desired(false, false, false), &writer, tool())
        .expect("run");

    assert_eq!(status(&outcome, ArtifactKind::Entitlements), None);
    assert!(!out.join("Rocket.entitlements").exists());

    let plist = read(&out, "Info.plist");
    assert!(!plist.contains("UIBackgroundModes"));
    assert_ne!(plist, before_plist);

    let header = read(&out, "Classes/Preprocessor.h");
    assert!(header.contains("#define UNITY_USES_REMOTE_NOTIFICATIONS 0"));
    assert!(header.contains("#define UNITY_USES_LOCATION 0"));
    assert_eq!(status(&outcome, ArtifactKind::Preprocessor), Some(ArtifactStatus::Unchanged));

    let project = read(&out, PROJECT);
    assert!(project.contains("UserNotifications.framework"));
    assert!(!project.contains("CoreLocation.framework"));
    assert!(!project.contains("CODE_SIGN_ENTITLEMENTS"));
}

#[test]
fn release_environment_writes_production() {
    let (_td, out) = fixture("legacy");
    let outcome = run_patch(&settings_for(&out), &desired(false, true, true), &FsWritePort, tool())
        .expect("run");
    assert!(read(&out, "Rocket.entitlements").contains("<string>production</string>"));

    // Under the legacy shape the capability and the frameworks share one target.
    let targets = outcome.report.targets.expect("targets");
    assert_eq!(targets.main, targets.framework_host);
    let graph = ProjectGraph::open(&out.join(PROJECT)).expect("reopen project");
    assert_eq!(
        graph.build_property_for_any_config(&targets.main, CODE_SIGN_ENTITLEMENTS),
        Some("Rocket.entitlements".to_string())
    );
    assert!(
        graph
            .linked_frameworks(&targets.framework_host)
            .contains(&"UserNotifications.framework".to_string())
    );
    let root = openstep::parse(&read(&out, PROJECT)).expect("reparse");
    let push_enabled = root
        .as_dict()
        .and_then(|r| r.get_dict("objects"))
        .and_then(|o| o.get_dict("29B97313FDCFA39411CA2CEA"))
        .and_then(|p| p.get_dict("attributes"))
        .and_then(|a| a.get_dict("TargetAttributes"))
        .and_then(|t| t.get_dict(&targets.main))
        .and_then(|t| t.get_dict("SystemCapabilities"))
        .and_then(|s| s.get_dict("com.apple.Push"))
        .and_then(|p| p.get_str("enabled"));
    assert_eq!(push_enabled, Some("1"));
}

#[test]
fn configured_entitlements_path_is_reused() {
    let (_td, out) = fixture("modern");
    let project = read(&out, PROJECT).replace(
        "PRODUCT_BUNDLE_IDENTIFIER = com.acme.Rocket;",
        "CODE_SIGN_ENTITLEMENTS = \"Unity-iPhone/Existing.entitlements\";\n\t\t\t\tPRODUCT_BUNDLE_IDENTIFIER = com.acme.Rocket;",
    );
    std::fs::write(out.join(PROJECT), project).unwrap();

    run_patch(&settings_for(&out), &desired(false, true, false), &FsWritePort, tool())
        .expect("run");

    assert!(out.join("Unity-iPhone/Existing.entitlements").exists());
    assert!(!out.join("Rocket.entitlements").exists());
}

#[test]
fn legacy_project_links_into_the_single_target() {
    let (_td, out) = fixture("legacy");
    let outcome = run_patch(&settings_for(&out), &desired(true, false, false), &FsWritePort, tool())
        .expect("run");
    let targets = outcome.report.targets.expect("targets");
    assert_eq!(targets.strategy, ProjectApi::Legacy);
    assert_eq!(targets.main, targets.framework_host);

    let probed = probe(&out, ProjectApi::Auto).expect("probe");
    assert_eq!(probed.targets.len(), 1);
}

#[test]
fn dry_run_computes_patch_without_writing() {
    let (_td, out) = fixture("modern");
    let before = read(&out, "Classes/Preprocessor.h");
    let writer = MemWritePort::default();
    let settings = PatchSettings {
        dry_run: true,
        ..settings_for(&out)
    };

    let outcome = run_patch(&settings, &desired(true, true, false), &writer, tool()).expect("run");

    assert!(writer.files.lock().unwrap().is_empty());
    assert_eq!(read(&out, "Classes/Preprocessor.h"), before);
    assert!(outcome.report.dry_run);
    assert!(outcome.patch.contains("--- /dev/null"));
    assert!(outcome.patch.contains("diff --git a/Info.plist b/Info.plist"));
    assert_eq!(status(&outcome, ArtifactKind::InfoPlist), Some(ArtifactStatus::Modified));
}

#[test]
fn other_platforms_are_a_no_op() {
    let td = TempDir::new().unwrap();
    let out = Utf8PathBuf::from_path_buf(td.path().join("missing")).expect("utf8");
    let writer = MemWritePort::default();
    let settings = PatchSettings {
        platform: BuildPlatform::Android,
        ..settings_for(&out)
    };

    let outcome = run_patch(&settings, &desired(true, true, true), &writer, tool()).expect("run");

    assert!(outcome.report.skipped_platform);
    assert!(outcome.report.artifacts.is_empty());
    assert!(writer.files.lock().unwrap().is_empty());
}

#[test]
fn old_deployment_target_is_an_advisory() {
    let (_td, out) = fixture("modern");
    let settings = PatchSettings {
        min_ios_version: "9.0".to_string(),
        ..settings_for(&out)
    };
    let outcome = run_patch(&settings, &desired(false, false, false), &FsWritePort, tool())
        .expect("run");
    assert!(
        outcome
            .report
            .advisories
            .iter()
            .any(|a| a.code == advisory_codes::MIN_OS_VERSION)
    );
}

#[test]
fn text_settings_are_reported_and_skipped() {
    let (_td, out) = fixture("modern");
    let source = InMemorySettingsSource::new(vec![DesiredSetting::text("UnityDisplayName", "x")]);
    let outcome = run_patch(&settings_for(&out), &source, &FsWritePort, tool()).expect("run");
    assert!(!read(&out, "Info.plist").contains("UnityDisplayName"));
    assert!(
        outcome
            .report
            .advisories
            .iter()
            .any(|a| a.code == advisory_codes::UNSUPPORTED_SETTING_KIND)
    );
}

#[test]
fn malformed_plist_stops_before_any_write() {
    let (_td, out) = fixture("modern");
    std::fs::write(out.join("Info.plist"), "<plist><dict><key>x</key>").unwrap();
    let writer = RecordingWritePort::default();

    let err = run_patch(&settings_for(&out), &desired(true, true, false), &writer, tool())
        .unwrap_err();

    assert!(matches!(err, PatchError::MalformedArtifact { .. }));
    assert_eq!(err.exit_code(), 2);
    assert_eq!(writer.total(), 0);
}

#[test]
fn missing_project_is_a_runtime_error() {
    let (_td, out) = fixture("modern");
    std::fs::remove_file(out.join(PROJECT)).unwrap();
    let err = run_patch(&settings_for(&out), &desired(false, false, false), &FsWritePort, tool())
        .unwrap_err();
    assert_eq!(err.exit_code(), 1);
}

#[test]
fn missing_info_plist_error_names_the_file() {
    let (_td, out) = fixture("modern");
    std::fs::remove_file(out.join("Info.plist")).unwrap();
    let writer = RecordingWritePort::default();
    let err = run_patch(&settings_for(&out), &desired(false, true, false), &writer, tool())
        .unwrap_err();
    assert_eq!(err.exit_code(), 1);
    let message = err.to_string();
    assert!(message.contains(out.join("Info.plist").as_str()), "{message}");
    assert!(message.contains("failed to open file"), "{message}");
    assert_eq!(writer.total(), 0);
}

#[test]
fn report_is_written_as_json_and_markdown() {
    let (td, out) = fixture("modern");
    let outcome = run_patch(&settings_for(&out), &desired(true, true, false), &FsWritePort, tool())
        .expect("run");
    let report_path = Utf8PathBuf::from_path_buf(td.path().join("reports/run.json")).expect("utf8");

    write_report(&outcome, &report_path, &FsWritePort).expect("write report");

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&report_path).unwrap()).unwrap();
    assert_eq!(json["schema"], "pushpatch.report.v1");
    assert_eq!(json["summary"]["artifacts_changed"], 4);
    let md = std::fs::read_to_string(report_path.with_extension("md")).unwrap();
    assert!(md.starts_with("# pushpatch run"));
}
