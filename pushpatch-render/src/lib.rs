//! Rendering helpers (markdown) for human-readable run summaries.

use pushpatch_types::outcome::{ArtifactStatus, PatchReport};

pub fn render_report_md(report: &PatchReport) -> String {
    let mut out = String::new();
    out.push_str("# pushpatch run\n\n");
    out.push_str(&format!("- Platform: `{}`\n", report.platform.as_str()));
    out.push_str(&format!("- Output dir: `{}`\n", report.output_dir));
    if report.dry_run {
        out.push_str("- Mode: dry run\n");
    }

    if report.skipped_platform {
        out.push_str("\n_Platform is not patched; nothing was inspected._\n");
        return out;
    }

    out.push_str(&format!(
        "- Artifacts: {} checked, {} changed\n",
        report.summary.artifacts_checked, report.summary.artifacts_changed
    ));
    if let Some(targets) = &report.targets {
        out.push_str(&format!(
            "- Project shape: `{}` (main `{}`, framework host `{}`)\n",
            targets.strategy.as_str(),
            targets.main,
            targets.framework_host
        ));
    }
    out.push('\n');

    out.push_str("## Artifacts\n\n");
    if report.artifacts.is_empty() {
        out.push_str("_No artifacts._\n");
    }
    for artifact in &report.artifacts {
        let before = artifact.sha256_before.as_deref().map(short).unwrap_or("-");
        let after = artifact.sha256_after.as_deref().map(short).unwrap_or("-");
        out.push_str(&format!(
            "- {} `{}`: {} ({} → {})\n",
            artifact.kind.label(),
            artifact.path,
            status_label(artifact.status),
            before,
            after
        ));
    }

    if !report.advisories.is_empty() {
        out.push_str("\n## Advisories\n\n");
        for advisory in &report.advisories {
            out.push_str(&format!("- `{}` {}\n", advisory.code, advisory.message));
        }
    }

    out
}

fn short(sha: &str) -> &str {
    sha.get(..12).unwrap_or(sha)
}

fn status_label(s: ArtifactStatus) -> &'static str {
    match s {
        ArtifactStatus::Unchanged => "unchanged",
        ArtifactStatus::Modified => "modified",
        ArtifactStatus::Created => "created",
    }
}
