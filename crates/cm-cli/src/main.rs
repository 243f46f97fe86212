//! CLI entry point for the codemig migration engine.
//!
//! # Usage
//!
//! ```bash
//! codemig [OPTIONS] <COMMAND>
//!
//! # Preview a React 17 -> 18 upgrade
//! codemig --root ./app plan --from 17.0.2 --to 18.2.0 --type version-upgrade
//!
//! # Apply it, keeping a report
//! codemig --root ./app migrate --from 17.0.2 --to 18.2.0 --type version-upgrade --report report.txt
//!
//! # List the registered patterns
//! codemig patterns --category ui-framework
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use cm_core::{EngineSettings, MigrationConfig, MigrationPlan, MigrationResult, MigrationType, SafetyLevel};
use cm_engine::{Collaborators, CommandTestRunner, MigrationEngine};
use cm_patterns::PatternCategory;
use clap::{Args, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{WrapErr, eyre};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// CLI ARGUMENT TYPES
// =============================================================================

/// Plans and applies pattern-based codebase migrations.
#[derive(Parser)]
#[command(name = "codemig", version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Command to execute.
    #[command(subcommand)]
    command: Commands,

    /// Project root directory.
    #[arg(short, long, global = true, env = "CODEMIG_ROOT", default_value = ".")]
    root: Utf8PathBuf,

    /// JSON file with engine settings (risk heuristics, milestones, timeouts).
    #[arg(long, global = true, env = "CODEMIG_SETTINGS")]
    settings: Option<Utf8PathBuf>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Build a migration plan without touching any file.
    Plan {
        #[command(flatten)]
        request: RequestArgs,

        /// Print the plan as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Build a plan and execute it.
    Migrate {
        #[command(flatten)]
        request: RequestArgs,

        /// Validate every step without writing anything.
        #[arg(long)]
        dry_run: bool,

        /// Command run after the migration when `--include-tests` is set.
        #[arg(long, default_value = "npm test")]
        test_command: String,

        /// Write the text report to this file instead of stdout.
        #[arg(long)]
        report: Option<Utf8PathBuf>,

        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List the registered migration patterns.
    Patterns {
        /// Only show patterns of this category.
        #[arg(short, long, value_enum)]
        category: Option<CategoryArg>,

        /// Print the patterns as JSON.
        #[arg(long)]
        json: bool,
    },
}

/// Options describing what to migrate.
#[derive(Args)]
struct RequestArgs {
    /// JSON file holding a full migration config. Flags below override it.
    #[arg(long)]
    config: Option<Utf8PathBuf>,

    /// Version the codebase is migrating from.
    #[arg(long)]
    from: Option<String>,

    /// Version the codebase is migrating to.
    #[arg(long)]
    to: Option<String>,

    /// Kind of migration.
    #[arg(short = 't', long = "type", value_enum)]
    migration_type: Option<TypeArg>,

    /// What to do when a high-risk step fails.
    #[arg(long, value_enum)]
    safety: Option<SafetyArg>,

    /// Scan test files and run the test command afterwards.
    #[arg(long)]
    include_tests: bool,

    /// Skip the pre-run backup.
    #[arg(long)]
    no_backup: bool,

    /// Keep no rollback records.
    #[arg(long)]
    no_rollback: bool,

    /// Only scan files matching these globs.
    #[arg(long)]
    include: Vec<String>,

    /// Additional globs to exclude.
    #[arg(long)]
    exclude: Vec<String>,

    /// Build config setting written by the config-change step (`key=value`).
    #[arg(long = "set", value_parser = parse_override)]
    overrides: Vec<(String, String)>,
}

/// Migration kind.
#[derive(Clone, Copy, ValueEnum)]
enum TypeArg {
    /// Newer version of the same stack.
    VersionUpgrade,
    /// Move to another framework.
    FrameworkMigration,
    /// Restructure without changing the stack.
    ArchitectureRefactor,
    /// Bump third-party dependencies.
    DependencyUpdate,
    /// Apply a known breaking change.
    BreakingChange,
}

impl From<TypeArg> for MigrationType {
    fn from(arg: TypeArg) -> Self {
        match arg {
            TypeArg::VersionUpgrade => Self::VersionUpgrade,
            TypeArg::FrameworkMigration => Self::FrameworkMigration,
            TypeArg::ArchitectureRefactor => Self::ArchitectureRefactor,
            TypeArg::DependencyUpdate => Self::DependencyUpdate,
            TypeArg::BreakingChange => Self::BreakingChange,
        }
    }
}

/// Abort policy.
#[derive(Clone, Copy, ValueEnum)]
enum SafetyArg {
    /// Roll back automatically when a high-risk step fails.
    Conservative,
    /// Stop and keep partial changes.
    Moderate,
    /// Stop and keep partial changes.
    Aggressive,
}

impl From<SafetyArg> for SafetyLevel {
    fn from(arg: SafetyArg) -> Self {
        match arg {
            SafetyArg::Conservative => Self::Conservative,
            SafetyArg::Moderate => Self::Moderate,
            SafetyArg::Aggressive => Self::Aggressive,
        }
    }
}

/// Pattern category filter.
#[derive(Clone, Copy, ValueEnum)]
enum CategoryArg {
    /// UI framework APIs.
    UiFramework,
    /// Type annotations.
    TypeSystem,
    /// Core language constructs.
    GeneralLanguage,
    /// Stylesheets.
    Styling,
    /// Build tooling.
    Build,
    /// Test suites.
    Testing,
    /// Package manifests.
    Dependency,
}

impl From<CategoryArg> for PatternCategory {
    fn from(arg: CategoryArg) -> Self {
        match arg {
            CategoryArg::UiFramework => Self::UiFramework,
            CategoryArg::TypeSystem => Self::TypeSystem,
            CategoryArg::GeneralLanguage => Self::GeneralLanguage,
            CategoryArg::Styling => Self::Styling,
            CategoryArg::Build => Self::Build,
            CategoryArg::Testing => Self::Testing,
            CategoryArg::Dependency => Self::Dependency,
        }
    }
}

fn parse_override(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    if key.trim().is_empty() {
        return Err(format!("empty key in '{raw}'"));
    }
    Ok((key.trim().to_owned(), value.to_owned()))
}

// =============================================================================
// INITIALIZATION FUNCTIONS
// =============================================================================

/// Initializes the tracing subscriber.
///
/// `RUST_LOG` wins if set; otherwise `debug` with `--verbose` and `info`
/// without. Logs go to stderr so JSON output on stdout stays parseable.
fn init_tracing(verbose: bool, no_color: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if verbose { "debug" } else { "info" };
        EnvFilter::new(format!("{level},ignore=warn,globset=warn"))
    });

    let use_ansi = !no_color && std::env::var("NO_COLOR").is_err();

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(use_ansi)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

fn load_settings(path: Option<&Utf8Path>) -> color_eyre::Result<EngineSettings> {
    let Some(path) = path else {
        return Ok(EngineSettings::default());
    };
    let json = std::fs::read_to_string(path).wrap_err_with(|| format!("Failed to read {path}"))?;
    EngineSettings::from_json(&json).wrap_err_with(|| format!("Invalid settings in {path}"))
}

/// Merges the config file (if any) with the command-line flags.
fn build_config(request: &RequestArgs) -> color_eyre::Result<MigrationConfig> {
    let mut config = match &request.config {
        Some(path) => {
            let json =
                std::fs::read_to_string(path).wrap_err_with(|| format!("Failed to read {path}"))?;
            serde_json::from_str(&json).wrap_err_with(|| format!("Invalid migration config in {path}"))?
        }
        None => MigrationConfig::default(),
    };

    if let Some(from) = &request.from {
        config.source_version.clone_from(from);
    }
    if let Some(to) = &request.to {
        config.target_version.clone_from(to);
    }
    if let Some(migration_type) = request.migration_type {
        config.migration_type = migration_type.into();
    }
    if let Some(safety) = request.safety {
        config.safety_level = safety.into();
    }
    config.include_tests |= request.include_tests;
    config.backup_enabled &= !request.no_backup;
    config.rollback_enabled &= !request.no_rollback;
    config.include.extend(request.include.iter().cloned());
    config.exclude.extend(request.exclude.iter().cloned());
    config.config_overrides.extend(request.overrides.iter().cloned());

    if config.source_version.is_empty() || config.target_version.is_empty() {
        return Err(eyre!("--from and --to are required unless set in --config"));
    }
    Ok(config)
}

fn create_engine(
    root: &Utf8Path,
    settings: EngineSettings,
    test_command: Option<&str>,
) -> color_eyre::Result<MigrationEngine> {
    let mut collaborators = Collaborators::filesystem(root, &settings.execution)
        .wrap_err_with(|| format!("Cannot open project at {root}"))?;

    if let Some(command) = test_command {
        let mut parts = command.split_whitespace();
        let program = parts.next().ok_or_else(|| eyre!("--test-command is empty"))?;
        let args: Vec<&str> = parts.collect();
        collaborators = collaborators
            .with_test_runner(std::sync::Arc::new(CommandTestRunner::new(program, &args).in_dir(root)));
    }

    Ok(MigrationEngine::new(collaborators, settings)?)
}

// =============================================================================
// COMMAND IMPLEMENTATIONS
// =============================================================================

fn run_plan(engine: &MigrationEngine, config: &MigrationConfig, json: bool) -> color_eyre::Result<()> {
    let plan = engine.create_migration_plan(config)?;
    info!(plan_id = %plan.id, steps = plan.steps.len(), "Plan created");

    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    if json {
        serde_json::to_writer_pretty(&mut handle, &plan)?;
        writeln!(handle)?;
    } else {
        print_plan_summary(&mut handle, &plan)?;
    }
    Ok(())
}

async fn run_migrate(
    engine: &MigrationEngine,
    config: &MigrationConfig,
    report: Option<&Utf8Path>,
    json: bool,
) -> color_eyre::Result<bool> {
    let plan = engine.create_migration_plan(config)?;
    info!(plan_id = %plan.id, steps = plan.steps.len(), dry_run = config.dry_run, "Plan created");
    let id = plan.id.clone();

    let cancel = CancellationToken::new();
    let watcher = tokio::spawn(cancel_on_signal(cancel.clone()));
    let result = engine.execute_migration_with_cancel(plan, cancel).await;
    watcher.abort();
    let result = result?;

    let text = engine.generate_migration_report(&id)?;
    if let Some(path) = report {
        std::fs::write(path, &text).wrap_err_with(|| format!("Failed to write {path}"))?;
        info!(path = %path, "Report written");
    }

    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    if json {
        serde_json::to_writer_pretty(&mut handle, &result)?;
        writeln!(handle)?;
    } else if report.is_none() {
        write!(handle, "{text}")?;
    } else {
        print_result_summary(&mut handle, &result)?;
    }

    Ok(result.outcome.success)
}

/// Cancels `token` on Ctrl-C (and SIGTERM on Unix). The run stops before its
/// next step.
async fn cancel_on_signal(token: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let Ok(mut sigterm) = signal(SignalKind::terminate()) else {
            let _ = tokio::signal::ctrl_c().await;
            token.cancel();
            return;
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    warn!("Interrupted, stopping before the next step");
    token.cancel();
}

fn run_patterns(engine: &MigrationEngine, category: Option<CategoryArg>, json: bool) -> color_eyre::Result<()> {
    let category = category.map(PatternCategory::from);
    let summaries: Vec<_> = engine
        .pattern_summaries()
        .into_iter()
        .filter(|p| category.is_none_or(|c| p.category == c))
        .collect();

    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    if json {
        serde_json::to_writer_pretty(&mut handle, &summaries)?;
        writeln!(handle)?;
        return Ok(());
    }

    for p in &summaries {
        writeln!(
            handle,
            "{:<22} {:<17} {:<9} {}",
            p.id,
            p.category.label(),
            p.risk_level,
            p.name
        )?;
    }
    writeln!(handle)?;
    writeln!(handle, "{} patterns", summaries.len())?;
    Ok(())
}

// =============================================================================
// OUTPUT HELPERS
// =============================================================================

fn print_plan_summary(out: &mut impl Write, plan: &MigrationPlan) -> std::io::Result<()> {
    let config = &plan.config;
    let risk = &plan.risk_assessment;

    writeln!(out)?;
    writeln!(out, "Migration Plan {}", plan.id)?;
    writeln!(out, "==========================================")?;
    writeln!(
        out,
        "{} {} -> {}",
        config.migration_type.label(),
        config.source_version,
        config.target_version
    )?;
    writeln!(out)?;
    writeln!(out, "Steps:              {}", plan.steps.len())?;
    writeln!(out, "Files affected:     {}", plan.impact.files_affected)?;
    writeln!(out, "Overall risk:       {}", risk.overall_risk)?;
    writeln!(out, "Critical steps:     {}", risk.critical_steps)?;
    writeln!(out, "Breaking changes:   {}", plan.impact.breaking_changes)?;
    writeln!(out, "Estimated duration: {}s", plan.schedule.estimated_duration)?;
    writeln!(out, "Estimated downtime: {}s", risk.estimated_downtime)?;

    for milestone in &plan.schedule.milestones {
        writeln!(out)?;
        writeln!(out, "{} ({}s)", milestone.name, milestone.estimated_duration)?;
        for step_id in &milestone.step_ids {
            let Some(step) = plan.step(step_id) else {
                continue;
            };
            writeln!(out, "  [{:<8}] {} ({})", step.risk_level, step.description, step.file_path)?;
        }
    }
    Ok(())
}

fn print_result_summary(out: &mut impl Write, result: &MigrationResult) -> std::io::Result<()> {
    writeln!(out, "Migration {}: {}", result.id, result.status().label())?;
    writeln!(
        out,
        "  {} completed, {} failed, {} changes applied",
        result.execution.completed_steps.len(),
        result.execution.failed_steps.len(),
        result.outcome.changes_applied
    )?;
    for error in &result.execution.errors {
        writeln!(out, "  error: {error}")?;
    }
    Ok(())
}

// =============================================================================
// MAIN ENTRY POINT
// =============================================================================

/// Application entry point.
#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.no_color);

    let settings = load_settings(cli.settings.as_deref())?;

    match cli.command {
        Commands::Plan { request, json } => {
            let engine = create_engine(&cli.root, settings, None)?;
            let config = build_config(&request)?;
            run_plan(&engine, &config, json)
        }
        Commands::Migrate {
            request,
            dry_run,
            test_command,
            report,
            json,
        } => {
            let engine = create_engine(&cli.root, settings, Some(&test_command))?;
            let config = build_config(&request)?.with_dry_run(dry_run);
            let success = run_migrate(&engine, &config, report.as_deref(), json).await?;
            if !success {
                return Err(eyre!("migration did not complete"));
            }
            Ok(())
        }
        Commands::Patterns { category, json } => {
            let engine = create_engine(&cli.root, settings, None)?;
            run_patterns(&engine, category, json)
        }
    }
}
