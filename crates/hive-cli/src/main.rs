//! Hive CLI - build planning, content checks and merge verification
//!
//! Usage:
//!   hive init [PATH]              Write .hive/config.toml defaults
//!   hive mode --tasks N ...       Select a build mode and estimate its cost
//!   hive plan <file> [--budget]   Partition a JSON plan across sandboxes
//!   hive scan <file>...           Run content rules and build-blocker scan
//!   hive generate --domain D ...  Route one task through a queen
//!   hive merge <request>          Verify and merge a change set locally

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use hive_agent::{AnthropicGenerator, Queen, QueenDomain};
use hive_core::{
    language_from_path, EventBus, HiveConfig, MergeRequest, SharedContext, Task,
};
use hive_merge::{
    LocalDirectoryTarget, LocalSandboxProvider, MergeController, RuleBasedSlopDetector,
    RuleBasedSwarm,
};
use hive_planning::{
    assign_tasks, determine_build_mode, dispatch_within_budget, estimate_build_cost,
    format_duration, partition_tasks, validate_build_mode_config, BudgetTracker,
    BuildComplexityMetrics, ImplementationPlan, TaskOutcome, UserTier,
};
use hive_validation::{scan_build_blockers, scan_content};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "hive")]
#[command(author, version, about = "Parallel code generation with gated merges")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Project root holding .hive/config.toml
    #[arg(long, global = true, default_value = ".")]
    project: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write default configuration
    Init {
        /// Project path (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Select a build mode for the given complexity
    Mode {
        #[arg(long, default_value = "1")]
        tasks: usize,

        #[arg(long, default_value = "1")]
        features: usize,

        /// Estimated build duration in minutes
        #[arg(long, default_value = "10")]
        minutes: f64,

        /// free, pro, team or enterprise
        #[arg(long, default_value = "free")]
        tier: UserTier,

        #[arg(long)]
        tournament: bool,

        /// The build has visual intents (enables memory snapshots)
        #[arg(long)]
        visual: bool,
    },

    /// Partition an implementation plan and assign tasks to sandboxes
    Plan {
        /// Plan file (JSON with `phases` and/or `features`)
        file: PathBuf,

        #[arg(long, default_value = "10")]
        minutes: f64,

        #[arg(long, default_value = "free")]
        tier: UserTier,

        #[arg(long)]
        tournament: bool,

        /// Spend limit in USD; tasks past it are not scheduled
        #[arg(long, default_value = "100")]
        budget: f64,
    },

    /// Check files for placeholder content and build blockers
    Scan {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Language tag (inferred from each file's extension when omitted)
        #[arg(long)]
        language: Option<String>,
    },

    /// Generate artifacts for one task
    Generate {
        /// infrastructure, development, design or quality
        #[arg(long)]
        domain: QueenDomain,

        #[arg(long)]
        name: String,

        #[arg(long)]
        description: String,

        #[arg(long, default_value = "task-1")]
        id: String,
    },

    /// Run the seven verification gates over a merge request
    Merge {
        /// Merge request file (JSON)
        request: PathBuf,

        /// Directory the change set is merged into
        #[arg(long)]
        target: PathBuf,

        /// Apply the change set when approved
        #[arg(long)]
        auto_merge: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    match cli.command {
        Commands::Init { path } => cmd_init(&path),
        Commands::Mode {
            tasks,
            features,
            minutes,
            tier,
            tournament,
            visual,
        } => {
            let metrics = BuildComplexityMetrics::new(tasks, features, minutes)
                .with_tier(tier)
                .with_tournament(tournament)
                .with_visual_intents(visual);
            cmd_mode(&cli.project, &metrics)
        }
        Commands::Plan {
            file,
            minutes,
            tier,
            tournament,
            budget,
        } => cmd_plan(&cli.project, &file, minutes, tier, tournament, budget).await,
        Commands::Scan { files, language } => cmd_scan(&files, language.as_deref()).await,
        Commands::Generate {
            domain,
            name,
            description,
            id,
        } => cmd_generate(&cli.project, domain, Task::new(id, name, description)).await,
        Commands::Merge {
            request,
            target,
            auto_merge,
        } => cmd_merge(&cli.project, &request, target, auto_merge).await,
    }
}

fn load_config(project: &Path) -> Result<HiveConfig> {
    HiveConfig::load_or_default(project)
        .with_context(|| format!("Failed to load config from {}", project.display()))
}

fn cmd_init(path: &Path) -> Result<()> {
    info!("Initializing Hive in {}", path.display());
    HiveConfig::write_default(path).context("Failed to write config")?;

    println!("Initialized Hive in {}", path.display());
    println!("Created:");
    println!("  .hive/config.toml");
    Ok(())
}

fn cmd_mode(project: &Path, metrics: &BuildComplexityMetrics) -> Result<()> {
    let config = load_config(project)?;
    let mode = determine_build_mode(metrics);
    let validation = validate_build_mode_config(&mode);
    let cost = estimate_build_cost(&mode, metrics.estimated_duration_minutes, &config.cost);

    let report = serde_json::json!({
        "config": mode,
        "validation": validation,
        "cost": cost,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn cmd_plan(
    project: &Path,
    file: &Path,
    minutes: f64,
    tier: UserTier,
    tournament: bool,
    budget: f64,
) -> Result<()> {
    if budget.is_nan() || budget <= 0.0 {
        bail!("--budget must be positive, got {}", budget);
    }
    let config = load_config(project)?;
    let content = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read plan {}", file.display()))?;
    let plan = ImplementationPlan::from_json(&content).context("Failed to parse plan JSON")?;

    let tasks = partition_tasks(&plan);
    if tasks.is_empty() {
        bail!("Plan {} has no phases or features", file.display());
    }

    let metrics = BuildComplexityMetrics::from_plan(&plan, minutes, tier, tournament);
    let mode = determine_build_mode(&metrics);
    let validation = validate_build_mode_config(&mode);
    let cost = estimate_build_cost(&mode, minutes, &config.cost);

    println!("Mode: {} ({} sandbox(es))", mode.mode, mode.sandbox_count);
    for error in &validation.errors {
        println!("  error: {}", error);
    }
    for warning in &validation.warnings {
        println!("  warning: {}", warning);
    }
    println!(
        "Estimated: {} for ${:.4} ({})",
        format_duration(minutes * 60.0),
        cost.total_cost,
        cost.explanation
    );

    let assignments = assign_tasks(&tasks, mode.sandbox_count);
    for (index, assigned) in assignments.iter().enumerate() {
        println!("\nSandbox {}:", index);
        for task in assigned {
            println!("  {} - {}", task.id, task.name);
        }
    }

    // Each task is charged an even share of the estimate
    let per_task = cost.total_cost / tasks.len() as f64;
    let mut tracker = BudgetTracker::new(budget);
    let report = dispatch_within_budget(&assignments, &mut tracker, |_, _| async move {
        TaskOutcome {
            success: true,
            cost_usd: per_task,
        }
    })
    .await;

    println!(
        "\nBudget: ${:.4} of ${:.2} ({} task(s) scheduled)",
        report.cost_usd,
        budget,
        report.completed.len()
    );
    if !report.skipped.is_empty() {
        println!("Over budget, not scheduled: {}", report.skipped.join(", "));
    }
    Ok(())
}

async fn cmd_scan(files: &[PathBuf], language: Option<&str>) -> Result<()> {
    let mut total = 0;

    for file in files {
        let content = tokio::fs::read_to_string(file)
            .await
            .with_context(|| format!("Failed to read {}", file.display()))?;
        let path = file.to_string_lossy();
        let language = language.unwrap_or_else(|| language_from_path(&path));

        let mut findings: Vec<String> = scan_content(&content, language)
            .iter()
            .map(|issue| format!("{}: {}", path, issue.display_message()))
            .collect();
        findings.extend(scan_build_blockers(&path, &content));

        if findings.is_empty() {
            debug!("{} clean", path);
            continue;
        }
        total += findings.len();
        for finding in findings {
            println!("{}", finding);
        }
    }

    if total > 0 {
        bail!("{} issue(s) found", total);
    }
    println!("{} file(s) clean", files.len());
    Ok(())
}

async fn cmd_generate(project: &Path, domain: QueenDomain, task: Task) -> Result<()> {
    let config = load_config(project)?;
    let generator = AnthropicGenerator::from_config(config.generation)
        .context("Failed to create generation client")?;

    let events = EventBus::new();
    events.subscribe_all(|event| debug!("{}", event.to_json()));

    let project_id = project
        .canonicalize()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "hive".to_string());
    let queen = Queen::new(
        domain,
        Arc::new(generator),
        Arc::new(SharedContext::new(project_id)),
        events,
    );

    let artifacts = queen
        .execute_task(&task)
        .await
        .with_context(|| format!("Task {} failed", task.id))?;
    println!("{}", serde_json::to_string_pretty(&artifacts)?);
    Ok(())
}

async fn cmd_merge(project: &Path, request: &Path, target: PathBuf, auto_merge: bool) -> Result<()> {
    let config = load_config(project)?;
    let content = tokio::fs::read_to_string(request)
        .await
        .with_context(|| format!("Failed to read {}", request.display()))?;
    let request: MergeRequest =
        serde_json::from_str(&content).context("Failed to parse merge request JSON")?;

    let auto_merge = auto_merge || config.merge.auto_merge;
    let merge_config = config.merge.with_auto_merge(auto_merge);
    let events = EventBus::new();
    events.subscribe_all(|event| debug!("{}", event.to_json()));

    let controller = MergeController::new(
        merge_config.clone(),
        Arc::new(RuleBasedSwarm),
        Arc::new(RuleBasedSlopDetector::new(merge_config.anti_slop_threshold)),
        Arc::new(LocalSandboxProvider::new(
            Some(target.clone()),
            config.sandbox.check_commands,
        )),
        Arc::new(LocalDirectoryTarget::new(target)),
        events,
    );

    let result = controller.verify_and_merge(&request).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    if !result.success {
        bail!(
            "Merge {} rejected: {}",
            request.id,
            result.failed_checks.unwrap_or_default().join("; ")
        );
    }
    Ok(())
}
