mod config;

use anyhow::Context;
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use config::ConfigMerger;
use pushpatch_core::PatchError;
use pushpatch_core::adapters::{FsSettingsSource, FsWritePort, InMemorySettingsSource};
use pushpatch_core::pipeline::{run_patch, write_report};
use pushpatch_core::ports::SettingsSource;
use pushpatch_core::settings::PatchSettings;
use pushpatch_types::platform::{BuildPlatform, ProjectApi};
use pushpatch_types::tool::ToolInfo;
use std::process::ExitCode;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "pushpatch",
    version,
    about = "Post-build patcher that wires notifications into a Unity iOS Xcode project."
)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Patch the project, entitlements, Info.plist and Preprocessor.h in a build output directory.
    Patch(PatchArgs),
    /// Print the detected project shape and resolved target ids.
    Probe(ProbeArgs),
}

#[derive(Debug, Parser)]
struct PatchArgs {
    /// Build output directory containing Unity-iPhone.xcodeproj.
    #[arg(long)]
    output_dir: Utf8PathBuf,

    /// Build platform; anything other than ios is a no-op.
    #[arg(long, default_value = "ios")]
    platform: BuildPlatform,

    /// Config file (default: <output_dir>/pushpatch.toml when present).
    #[arg(long)]
    config: Option<Utf8PathBuf>,

    /// JSON file of desired settings; replaces the config file's list.
    #[arg(long)]
    settings: Option<Utf8PathBuf>,

    /// Bundle identifier used to name a new entitlements file.
    #[arg(long)]
    bundle_id: Option<String>,

    /// Minimum iOS deployment target.
    #[arg(long)]
    min_ios_version: Option<String>,

    /// Project shape: auto, modern or legacy.
    #[arg(long)]
    project_api: Option<ProjectApi>,

    /// Compute and print the patch without writing any artifact.
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// Write the run report as JSON (plus a markdown summary next to it).
    #[arg(long)]
    report: Option<Utf8PathBuf>,
}

#[derive(Debug, Parser)]
struct ProbeArgs {
    /// Build output directory containing Unity-iPhone.xcodeproj.
    #[arg(long)]
    output_dir: Utf8PathBuf,

    /// Project shape: auto, modern or legacy.
    #[arg(long, default_value = "auto")]
    project_api: ProjectApi,

    /// Output format (text, json).
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() -> ExitCode {
    if let Err(e) = real_main() {
        error!("{:?}", e);
        let code = e
            .downcast_ref::<PatchError>()
            .map(PatchError::exit_code)
            .unwrap_or(1);
        return ExitCode::from(code);
    }
    ExitCode::from(0)
}

fn real_main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Patch(args) => cmd_patch(args),
        Command::Probe(args) => cmd_probe(args),
    }
}

fn cmd_patch(args: PatchArgs) -> anyhow::Result<()> {
    // Load config file and merge with CLI arguments
    let file_config = config::load_or_default(&args.output_dir, args.config.as_deref())
        .context("load pushpatch.toml config")?;
    let cli_settings = args
        .settings
        .as_ref()
        .map(|path| FsSettingsSource::new(path.clone()).load_settings())
        .transpose()?;
    let merged = ConfigMerger::new(file_config).merge_patch_args(
        args.bundle_id.as_deref(),
        args.min_ios_version.as_deref(),
        args.project_api,
        cli_settings,
    );

    debug!(
        "merged config: bundle_identifier={}, min_ios_version={}, project_api={:?}, settings={}",
        merged.bundle_identifier,
        merged.min_ios_version,
        merged.project_api,
        merged.settings.len()
    );

    let settings = PatchSettings {
        platform: args.platform,
        output_dir: args.output_dir,
        bundle_identifier: merged.bundle_identifier,
        min_ios_version: merged.min_ios_version,
        project_api: merged.project_api,
        dry_run: args.dry_run,
    };
    let source = InMemorySettingsSource::new(merged.settings);
    let outcome = run_patch(&settings, &source, &FsWritePort, tool_info())?;

    if let Some(path) = &args.report {
        write_report(&outcome, path, &FsWritePort)
            .with_context(|| format!("write report {}", path))?;
    }

    let report = &outcome.report;
    if report.skipped_platform {
        println!(
            "pushpatch: platform {} skipped",
            report.platform.as_str()
        );
        return Ok(());
    }
    if settings.dry_run {
        print!("{}", outcome.patch);
    }
    for advisory in &report.advisories {
        println!("advisory [{}]: {}", advisory.code, advisory.message);
    }
    println!(
        "pushpatch: {} of {} artifacts {}",
        report.summary.artifacts_changed,
        report.summary.artifacts_checked,
        if settings.dry_run { "would change" } else { "changed" }
    );
    info!("patched {}", settings.output_dir);
    Ok(())
}

fn cmd_probe(args: ProbeArgs) -> anyhow::Result<()> {
    let outcome = pushpatch_core::probe(&args.output_dir, args.project_api)?;
    let resolved = &outcome.resolved;
    let name_of = |id: &str| {
        outcome
            .targets
            .iter()
            .find(|t| t.id == id)
            .map(|t| t.name.clone())
            .unwrap_or_default()
    };

    match args.format {
        OutputFormat::Text => {
            println!("Project shape: {}", resolved.strategy.as_str());
            println!("Main target:   {} ({})", name_of(&resolved.main), resolved.main);
            println!(
                "Framework host: {} ({})",
                name_of(&resolved.framework_host),
                resolved.framework_host
            );
            println!();
            println!("  {:<26} {:<22} ROLE", "ID", "NAME");
            for target in &outcome.targets {
                println!(
                    "  {:<26} {:<22} {}",
                    target.id,
                    target.name,
                    target.role.as_str()
                );
            }
        }
        OutputFormat::Json => {
            let targets: Vec<_> = outcome
                .targets
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "id": t.id,
                        "name": t.name,
                        "role": t.role,
                    })
                })
                .collect();
            let doc = serde_json::json!({
                "strategy": resolved.strategy,
                "main": resolved.main,
                "framework_host": resolved.framework_host,
                "targets": targets,
            });
            println!("{}", serde_json::to_string_pretty(&doc)?);
        }
    }
    Ok(())
}

fn tool_info() -> ToolInfo {
    ToolInfo {
        name: "pushpatch".to_string(),
        version: Some(env!("CARGO_PKG_VERSION").to_string()),
    }
}
