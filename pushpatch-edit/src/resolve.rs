//! Target resolution for the two project shapes Unity generates.
//!
//! Modern projects split the application target (`Unity-iPhone`) from the
//! framework host (`UnityFramework`). Legacy projects have one application
//! target playing both roles.

use crate::error::{PatchError, PatchResult};
use crate::project::ProjectGraph;
use pushpatch_types::platform::{ProjectApi, TargetRole};
use pushpatch_types::outcome::TargetsInfo;
use tracing::debug;

pub const MAIN_TARGET_NAME: &str = "Unity-iPhone";
pub const FRAMEWORK_TARGET_NAME: &str = "UnityFramework";

/// Target ids for both roles, plus the strategy that produced them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTargets {
    pub strategy: ProjectApi,
    pub main: String,
    pub framework_host: String,
}

impl ResolvedTargets {
    /// `Other` maps to the main target.
    pub fn id_for(&self, role: TargetRole) -> &str {
        match role {
            TargetRole::SharedFrameworkHost => &self.framework_host,
            TargetRole::MainApplication | TargetRole::Other => &self.main,
        }
    }

    pub fn info(&self) -> TargetsInfo {
        TargetsInfo {
            strategy: self.strategy,
            main: self.main.clone(),
            framework_host: self.framework_host.clone(),
        }
    }
}

pub trait TargetResolver {
    fn strategy(&self) -> ProjectApi;
    fn main_target(&self, graph: &ProjectGraph) -> Option<String>;
    fn framework_host_target(&self, graph: &ProjectGraph) -> Option<String>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ModernResolver;

impl TargetResolver for ModernResolver {
    fn strategy(&self) -> ProjectApi {
        ProjectApi::Modern
    }

    fn main_target(&self, graph: &ProjectGraph) -> Option<String> {
        graph.target_by_name(MAIN_TARGET_NAME).map(|t| t.id)
    }

    fn framework_host_target(&self, graph: &ProjectGraph) -> Option<String> {
        graph.target_by_name(FRAMEWORK_TARGET_NAME).map(|t| t.id)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LegacyResolver;

impl TargetResolver for LegacyResolver {
    fn strategy(&self) -> ProjectApi {
        ProjectApi::Legacy
    }

    fn main_target(&self, graph: &ProjectGraph) -> Option<String> {
        graph
            .target_by_name(MAIN_TARGET_NAME)
            .or_else(|| {
                graph
                    .targets()
                    .into_iter()
                    .find(|t| t.role == TargetRole::MainApplication)
            })
            .map(|t| t.id)
    }

    fn framework_host_target(&self, graph: &ProjectGraph) -> Option<String> {
        self.main_target(graph)
    }
}

/// Pick a concrete strategy. `Auto` looks for the framework host target.
pub fn detect_project_api(graph: &ProjectGraph, requested: ProjectApi) -> ProjectApi {
    match requested {
        ProjectApi::Auto => {
            if graph.target_by_name(FRAMEWORK_TARGET_NAME).is_some() {
                ProjectApi::Modern
            } else {
                ProjectApi::Legacy
            }
        }
        explicit => explicit,
    }
}

fn resolver_for(api: ProjectApi) -> Box<dyn TargetResolver> {
    match api {
        ProjectApi::Modern => Box::new(ModernResolver),
        ProjectApi::Legacy | ProjectApi::Auto => Box::new(LegacyResolver),
    }
}

/// Resolve both target roles once for the whole run.
pub fn resolve_targets(graph: &ProjectGraph, requested: ProjectApi) -> PatchResult<ResolvedTargets> {
    let strategy = detect_project_api(graph, requested);
    let resolver = resolver_for(strategy);

    let main = resolver.main_target(graph).ok_or_else(|| PatchError::MissingTarget {
        message: format!(
            "no main application target ({} strategy) in {}",
            strategy.as_str(),
            graph.path()
        ),
    })?;
    let framework_host =
        resolver
            .framework_host_target(graph)
            .ok_or_else(|| PatchError::MissingTarget {
                message: format!(
                    "no framework host target ({} strategy) in {}",
                    strategy.as_str(),
                    graph.path()
                ),
            })?;

    debug!(
        strategy = resolver.strategy().as_str(),
        main = %main,
        framework_host = %framework_host,
        "resolved targets"
    );
    Ok(ResolvedTargets {
        strategy: resolver.strategy(),
        main,
        framework_host,
    })
}
