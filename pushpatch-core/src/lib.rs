//! Embeddable core library for pushpatch.
//!
//! Provides a clap-free, I/O-abstracted entry point suitable for calling from
//! a build pipeline's post-build hook or from the `pushpatch` binary.
//!
//! # Port traits
//!
//! Settings input and artifact writes go through the traits in [`ports`]:
//! - [`SettingsSource`](ports::SettingsSource) supplies the desired settings
//! - [`WritePort`](ports::WritePort) writes changed artifacts
//!
//! The [`adapters`] module provides default filesystem-backed implementations.
//!
//! # Entry points
//!
//! - [`run_patch`](pipeline::run_patch) patches one build output directory
//! - [`probe`] reports the project shape and resolved targets without writing

pub mod adapters;
pub mod pipeline;
pub mod ports;
pub mod settings;

pub use pushpatch_edit::{PatchError, PatchResult};

use camino::Utf8Path;
use pushpatch_edit::project::{ProjectGraph, Target, project_path};
use pushpatch_edit::resolve::{ResolvedTargets, resolve_targets};
use pushpatch_types::platform::ProjectApi;

/// Result of inspecting a project without patching it.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub targets: Vec<Target>,
    pub resolved: ResolvedTargets,
}

/// Parse the project under `output_dir` and resolve its targets.
pub fn probe(output_dir: &Utf8Path, api: ProjectApi) -> PatchResult<ProbeOutcome> {
    let graph = ProjectGraph::open(&project_path(output_dir))?;
    let resolved = resolve_targets(&graph, api)?;
    Ok(ProbeOutcome {
        targets: graph.targets(),
        resolved,
    })
}
