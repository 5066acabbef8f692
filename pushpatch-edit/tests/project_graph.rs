//! Target resolution and project mutation against Unity-shaped fixtures.

use camino::Utf8Path;
use pretty_assertions::assert_eq;
use pushpatch_edit::PatchError;
use pushpatch_edit::openstep::{self, PbxValue};
use pushpatch_edit::project::{CODE_SIGN_ENTITLEMENTS, ProjectGraph};
use pushpatch_edit::resolve::{ResolvedTargets, resolve_targets};
use pushpatch_types::platform::{ProjectApi, TargetRole};

const MODERN: &str =
    include_str!("../../tests/fixtures/modern/Unity-iPhone.xcodeproj/project.pbxproj");
const LEGACY: &str =
    include_str!("../../tests/fixtures/legacy/Unity-iPhone.xcodeproj/project.pbxproj");

const MAIN_ID: &str = "1D6058900D05DD3D006BFB54";
const FRAMEWORK_ID: &str = "9D25AB9C213FB47800354C27";

fn graph(text: &str) -> ProjectGraph {
    ProjectGraph::parse(Utf8Path::new("/out/project.pbxproj"), text).expect("parse project")
}

fn resolved(graph: &ProjectGraph) -> ResolvedTargets {
    resolve_targets(graph, ProjectApi::Auto).expect("resolve")
}

/// Whether the build file linking `framework` into `target` carries the weak attribute.
fn weak_flag(text: &str, framework: &str) -> Option<bool> {
    let root = openstep::parse(text).expect("reparse");
    let objects = root.as_dict()?.get_dict("objects")?;
    let file_ref = objects.iter().find_map(|(id, o)| {
        let o = o.as_dict()?;
        (o.get_str("isa") == Some("PBXFileReference") && o.get_str("name") == Some(framework))
            .then_some(id)
    })?;
    objects.iter().find_map(|(_, o)| {
        let o = o.as_dict()?;
        if o.get_str("isa") != Some("PBXBuildFile") || o.get_str("fileRef") != Some(file_ref) {
            return None;
        }
        let attrs = o
            .get_dict("settings")
            .and_then(|s| s.get_array("ATTRIBUTES"))
            .cloned()
            .unwrap_or_default();
        Some(attrs.contains(&PbxValue::from("Weak")))
    })
}

#[test]
fn modern_project_resolves_separate_targets() {
    let g = graph(MODERN);
    let targets = resolved(&g);
    assert_eq!(targets.strategy, ProjectApi::Modern);
    assert_eq!(targets.main, MAIN_ID);
    assert_eq!(targets.framework_host, FRAMEWORK_ID);
    assert_eq!(targets.id_for(TargetRole::SharedFrameworkHost), FRAMEWORK_ID);
}

#[test]
fn legacy_project_uses_one_target_for_both_roles() {
    let g = graph(LEGACY);
    let targets = resolved(&g);
    assert_eq!(targets.strategy, ProjectApi::Legacy);
    assert_eq!(targets.main, MAIN_ID);
    assert_eq!(targets.framework_host, MAIN_ID);
}

#[test]
fn forcing_modern_on_a_legacy_project_is_a_missing_target() {
    let g = graph(LEGACY);
    let err = resolve_targets(&g, ProjectApi::Modern).unwrap_err();
    assert!(matches!(err, PatchError::MissingTarget { .. }));
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn forcing_legacy_on_a_modern_project_collapses_roles() {
    let g = graph(MODERN);
    let targets = resolve_targets(&g, ProjectApi::Legacy).expect("resolve");
    assert_eq!(targets.framework_host, MAIN_ID);
}

#[test]
fn targets_report_roles_from_product_type() {
    let g = graph(MODERN);
    let roles: Vec<(String, TargetRole)> =
        g.targets().into_iter().map(|t| (t.name, t.role)).collect();
    assert_eq!(
        roles,
        vec![
            ("Unity-iPhone".to_string(), TargetRole::MainApplication),
            ("UnityFramework".to_string(), TargetRole::SharedFrameworkHost),
        ]
    );
}

#[test]
fn linking_a_framework_is_idempotent() {
    let mut g = graph(MODERN);
    let targets = resolved(&g);

    let first = g
        .link_framework(&targets, TargetRole::SharedFrameworkHost, "UserNotifications.framework", true)
        .expect("link");
    let second = g
        .link_framework(&targets, TargetRole::SharedFrameworkHost, "UserNotifications.framework", true)
        .expect("link");
    assert!(first);
    assert!(!second);

    assert_eq!(
        g.linked_frameworks(FRAMEWORK_ID),
        vec!["Foundation.framework".to_string(), "UserNotifications.framework".to_string()]
    );
    assert!(g.linked_frameworks(MAIN_ID).iter().all(|f| f != "UserNotifications.framework"));

    let text = g.to_text();
    assert_eq!(
        text.matches("path = System/Library/Frameworks/UserNotifications.framework;")
            .count(),
        1
    );
    assert_eq!(weak_flag(&text, "UserNotifications.framework"), Some(true));
}

#[test]
fn required_frameworks_are_not_weak() {
    let mut g = graph(MODERN);
    let targets = resolved(&g);
    g.link_framework(&targets, TargetRole::SharedFrameworkHost, "CoreLocation.framework", false)
        .expect("link");
    assert_eq!(weak_flag(&g.to_text(), "CoreLocation.framework"), Some(false));
}

#[test]
fn existing_file_reference_is_reused() {
    let mut g = graph(MODERN);
    // Foundation is already referenced and linked into the framework host.
    let changed = g
        .add_framework(MAIN_ID, "Foundation.framework", false)
        .expect("link");
    assert!(changed);
    assert_eq!(
        g.to_text()
            .matches("path = System/Library/Frameworks/Foundation.framework;")
            .count(),
        1
    );
    assert!(g.linked_frameworks(MAIN_ID).contains(&"Foundation.framework".to_string()));
}

#[test]
fn legacy_and_modern_link_into_the_framework_host_role() {
    for text in [MODERN, LEGACY] {
        let mut g = graph(text);
        let targets = resolved(&g);
        g.link_framework(&targets, TargetRole::SharedFrameworkHost, "UserNotifications.framework", true)
            .expect("link");
        assert!(
            g.linked_frameworks(&targets.framework_host)
                .contains(&"UserNotifications.framework".to_string())
        );
    }
}

#[test]
fn missing_frameworks_phase_is_created() {
    let text = MODERN.replacen("\t\t\t\t9D25AB99213FB47800354C27 /* Frameworks */,\n", "", 1);
    let mut g = graph(&text);
    assert!(g.linked_frameworks(FRAMEWORK_ID).is_empty());
    g.add_framework(FRAMEWORK_ID, "UserNotifications.framework", true)
        .expect("link");
    assert_eq!(
        g.linked_frameworks(FRAMEWORK_ID),
        vec!["UserNotifications.framework".to_string()]
    );
}

#[test]
fn unknown_target_is_rejected() {
    let mut g = graph(MODERN);
    let err = g
        .add_framework("FFFFFFFFFFFFFFFFFFFFFFFF", "UserNotifications.framework", true)
        .unwrap_err();
    assert!(matches!(err, PatchError::MissingTarget { .. }));
}

#[test]
fn capability_file_is_attached_to_every_configuration() {
    let mut g = graph(MODERN);
    assert_eq!(g.build_property_for_any_config(MAIN_ID, CODE_SIGN_ENTITLEMENTS), None);

    assert!(g.attach_capability_file(MAIN_ID, "Rocket.entitlements").expect("attach"));
    assert!(!g.attach_capability_file(MAIN_ID, "Rocket.entitlements").expect("attach"));

    assert_eq!(
        g.build_property_for_any_config(MAIN_ID, CODE_SIGN_ENTITLEMENTS),
        Some("Rocket.entitlements".to_string())
    );
    let text = g.to_text();
    assert_eq!(text.matches("CODE_SIGN_ENTITLEMENTS = Rocket.entitlements;").count(), 2);
    assert_eq!(text.matches("lastKnownFileType = text.plist.entitlements;").count(), 1);
    assert_eq!(g.build_property_for_any_config(FRAMEWORK_ID, CODE_SIGN_ENTITLEMENTS), None);
}

#[test]
fn system_capability_is_enabled_once() {
    let mut g = graph(MODERN);
    assert!(g.enable_system_capability(MAIN_ID, "com.apple.Push").expect("enable"));
    assert!(!g.enable_system_capability(MAIN_ID, "com.apple.Push").expect("enable"));

    let root = openstep::parse(&g.to_text()).expect("reparse");
    let enabled = root
        .as_dict()
        .and_then(|r| r.get_dict("objects"))
        .and_then(|o| o.get_dict("29B97313FDCFA39411CA2CEA"))
        .and_then(|p| p.get_dict("attributes"))
        .and_then(|a| a.get_dict("TargetAttributes"))
        .and_then(|t| t.get_dict(MAIN_ID))
        .and_then(|t| t.get_dict("SystemCapabilities"))
        .and_then(|s| s.get_dict("com.apple.Push"))
        .and_then(|p| p.get_str("enabled"));
    assert_eq!(enabled, Some("1"));
}

/// `SystemCapabilities.<capability>.enabled` for `target` in the project attributes.
fn capability_enabled(text: &str, target: &str, capability: &str) -> Option<String> {
    let root = openstep::parse(text).expect("reparse");
    let objects = root.as_dict()?.get_dict("objects")?;
    let project = objects.get_dict(root.as_dict()?.get_str("rootObject")?)?;
    project
        .get_dict("attributes")?
        .get_dict("TargetAttributes")?
        .get_dict(target)?
        .get_dict("SystemCapabilities")?
        .get_dict(capability)?
        .get_str("enabled")
        .map(str::to_string)
}

#[test]
fn legacy_capability_lands_on_the_shared_target() {
    let mut g = graph(LEGACY);
    let targets = resolved(&g);
    assert_eq!(targets.strategy, ProjectApi::Legacy);
    assert_eq!(targets.main, targets.framework_host);

    g.link_framework(&targets, TargetRole::SharedFrameworkHost, "UserNotifications.framework", true)
        .expect("link");
    g.attach_capability_file(&targets.main, "Rocket.entitlements")
        .expect("attach");
    g.enable_system_capability(&targets.main, "com.apple.Push")
        .expect("enable");

    assert_eq!(
        g.build_property_for_any_config(&targets.framework_host, CODE_SIGN_ENTITLEMENTS),
        Some("Rocket.entitlements".to_string())
    );
    assert!(
        g.linked_frameworks(&targets.main)
            .contains(&"UserNotifications.framework".to_string())
    );
    let text = g.to_text();
    assert_eq!(
        capability_enabled(&text, &targets.framework_host, "com.apple.Push"),
        Some("1".to_string())
    );
    assert_eq!(text.matches("CODE_SIGN_ENTITLEMENTS = Rocket.entitlements;").count(), 2);
}

#[test]
fn rewrite_keeps_xcode_annotations() {
    let path = Utf8Path::new("/out/Unity-iPhone.xcodeproj/project.pbxproj");
    let mut g = ProjectGraph::parse(path, MODERN).expect("parse project");
    assert_eq!(g.to_text(), MODERN);

    let targets = resolved(&g);
    g.link_framework(&targets, TargetRole::SharedFrameworkHost, "UserNotifications.framework", true)
        .expect("link");
    let after = g.to_text();
    let dropped: Vec<&str> = MODERN
        .lines()
        .filter(|line| !after.lines().any(|l| l == *line))
        .collect();
    assert!(dropped.is_empty(), "lines lost on rewrite: {dropped:#?}");
    assert!(after.contains("/* UserNotifications.framework in Frameworks */,"));
    assert!(after.contains("fileRef = ") && after.contains("/* UserNotifications.framework */"));
}

#[test]
fn untouched_graph_has_no_pending_edit() {
    let mut g = graph(MODERN);
    assert!(g.pending_edit().is_none());
    let targets = resolved(&g);
    g.link_framework(&targets, TargetRole::SharedFrameworkHost, "Foundation.framework", false)
        .expect("link");
    assert!(!g.is_dirty());
    assert!(g.pending_edit().is_none());
}

#[test]
fn saved_project_needs_no_second_edit() {
    let mut g = graph(MODERN);
    let targets = resolved(&g);
    g.link_framework(&targets, TargetRole::SharedFrameworkHost, "UserNotifications.framework", true)
        .expect("link");
    g.attach_capability_file(&targets.main, "Rocket.entitlements")
        .expect("attach");
    let edit = g.pending_edit().expect("edit");
    let saved = String::from_utf8(edit.after).expect("utf8");

    let mut again = graph(&saved);
    let targets = resolved(&again);
    again
        .link_framework(&targets, TargetRole::SharedFrameworkHost, "UserNotifications.framework", true)
        .expect("link");
    again
        .attach_capability_file(&targets.main, "Rocket.entitlements")
        .expect("attach");
    assert!(again.pending_edit().is_none());
}

#[test]
fn new_object_ids_are_deterministic() {
    let run = || {
        let mut g = graph(LEGACY);
        let targets = resolved(&g);
        g.link_framework(&targets, TargetRole::SharedFrameworkHost, "CoreLocation.framework", false)
            .expect("link");
        g.to_text()
    };
    assert_eq!(run(), run());
}

#[test]
fn malformed_projects_are_reported() {
    let path = Utf8Path::new("/out/project.pbxproj");
    for text in ["{ objects = {", "( a, b )", "{ rootObject = X; }", "{ objects = {}; rootObject = X; }"] {
        let err = ProjectGraph::parse(path, text).unwrap_err();
        assert!(
            matches!(err, PatchError::MalformedArtifact { .. }),
            "{text}: {err}"
        );
    }
}

#[test]
fn open_reads_from_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = Utf8Path::from_path(dir.path())
        .expect("utf8")
        .join("project.pbxproj");
    std::fs::write(&path, MODERN).expect("write");
    let g = ProjectGraph::open(&path).expect("open");
    assert_eq!(g.targets().len(), 2);

    let missing = ProjectGraph::open(&path.with_file_name("absent.pbxproj")).unwrap_err();
    assert_eq!(missing.exit_code(), 1);
}
