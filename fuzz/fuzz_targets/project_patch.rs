#![no_main]

//! Fuzz target for project graph parsing, target resolution and framework linking.

use camino::Utf8Path;
use libfuzzer_sys::fuzz_target;
use pushpatch_edit::project::ProjectGraph;
use pushpatch_edit::resolve::resolve_targets;
use pushpatch_types::platform::{ProjectApi, TargetRole};

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };
    let path = Utf8Path::new("project.pbxproj");
    let Ok(mut graph) = ProjectGraph::parse(path, s) else {
        return;
    };
    let _ = graph.targets();
    let Ok(targets) = resolve_targets(&graph, ProjectApi::Auto) else {
        return;
    };
    if graph
        .link_framework(&targets, TargetRole::SharedFrameworkHost, "UserNotifications.framework", true)
        .is_err()
    {
        return;
    }

    // A saved graph must reparse and accept the same link without changing.
    let text = graph.to_text();
    let mut again = ProjectGraph::parse(path, &text).expect("saved project must parse");
    let targets = resolve_targets(&again, ProjectApi::Auto).expect("targets survive a save");
    again
        .link_framework(&targets, TargetRole::SharedFrameworkHost, "UserNotifications.framework", true)
        .expect("relink");
    assert!(!again.is_dirty());
});
