//! Funnel Doctor: run the sales funnel diagnostic engine over a snapshot
//! file and print a JSON report.

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use funnel_core::config::BenchmarkProfile;
use funnel_core::{DiagnosticContext, EngineConfig, FunnelSnapshot};
use funnel_diagnostics::{FunnelDiagnosis, FunnelDiagnosticEngine, TargetSet};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "funnel-doctor")]
#[command(about = "Sales funnel diagnostics: stage grading, bottlenecks and next actions")]
#[command(version)]
struct Cli {
    /// TOML configuration file (environment variables still apply)
    #[arg(long, env = "FUNNEL_DOCTOR_CONFIG")]
    config: Option<PathBuf>,

    /// Benchmark profile (overrides config and context segment)
    #[arg(long, env = "FUNNEL_DOCTOR_PROFILE")]
    profile: Option<String>,

    /// Maximum number of actions (overrides config)
    #[arg(long)]
    max_actions: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Diagnose a funnel snapshot
    Diagnose {
        /// Snapshot JSON file
        snapshot: PathBuf,

        /// Partial target override JSON file, merged over the profile
        #[arg(short, long)]
        targets: Option<PathBuf>,

        /// Context JSON file (channel, segment, live-chat flag)
        #[arg(short, long)]
        context: Option<PathBuf>,

        /// Pretty-print the report
        #[arg(long, default_value_t = false)]
        pretty: bool,
    },

    /// Print the effective target registry
    Targets,
}

/// Report envelope written to stdout.
#[derive(Serialize)]
struct DiagnosisReport {
    report_id: Uuid,
    generated_at: DateTime<Utc>,
    profile: BenchmarkProfile,
    context: DiagnosticContext,
    #[serde(flatten)]
    diagnosis: FunnelDiagnosis,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "funnel_doctor=info,funnel_diagnostics=info".into()),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = EngineConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load config, using defaults");
        EngineConfig::default()
    });
    if let Some(max_actions) = cli.max_actions {
        config.actions.max_actions = max_actions;
    }
    let cli_profile = cli.profile.as_deref().map(parse_profile).transpose()?;

    match cli.command {
        Commands::Diagnose {
            snapshot,
            targets,
            context,
            pretty,
        } => cmd_diagnose(config, cli_profile, &snapshot, targets, context, pretty),
        Commands::Targets => {
            if let Some(profile) = cli_profile {
                config.benchmark_profile = profile;
            }
            let engine = FunnelDiagnosticEngine::from_config(config)?;
            println!("{}", serde_json::to_string_pretty(engine.targets())?);
            Ok(())
        }
    }
}

fn parse_profile(name: &str) -> anyhow::Result<BenchmarkProfile> {
    match BenchmarkProfile::from_segment(name) {
        Some(profile) => Ok(profile),
        None => bail!("unknown benchmark profile '{name}'"),
    }
}

fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> anyhow::Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {what} from {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {what} in {}", path.display()))
}

fn cmd_diagnose(
    mut config: EngineConfig,
    cli_profile: Option<BenchmarkProfile>,
    snapshot_path: &Path,
    targets_path: Option<PathBuf>,
    context_path: Option<PathBuf>,
    pretty: bool,
) -> anyhow::Result<()> {
    let snapshot: FunnelSnapshot = read_json(snapshot_path, "snapshot")?;
    let context: DiagnosticContext = match &context_path {
        Some(path) => read_json(path, "context")?,
        None => DiagnosticContext::default(),
    };

    // CLI flag, then the context's segment, then configuration.
    let segment_profile = context
        .segment
        .as_deref()
        .and_then(BenchmarkProfile::from_segment);
    if let Some(profile) = cli_profile.or(segment_profile) {
        config.benchmark_profile = profile;
    }
    let profile = config.benchmark_profile;

    // Construction errors render as a generic message; the engine has
    // already logged the detail.
    let mut engine = FunnelDiagnosticEngine::from_config(config)?;
    if let Some(path) = &targets_path {
        let overrides: TargetSet = read_json(path, "target overrides")?;
        engine = engine.with_target_overrides(&overrides)?;
    }

    let diagnosis = engine.diagnose(&snapshot, &context);
    let report = DiagnosisReport {
        report_id: Uuid::new_v4(),
        generated_at: Utc::now(),
        profile,
        context,
        diagnosis,
    };

    info!(
        report_id = %report.report_id,
        profile = ?report.profile,
        score = report.diagnosis.confidence.score,
        actions = report.diagnosis.actions.len(),
        "diagnosis complete"
    );

    let out = if pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{out}");
    Ok(())
}
