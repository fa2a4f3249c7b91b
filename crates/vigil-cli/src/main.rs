use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use vigil_core::analysis::embedding::CharFrequencyEmbedder;
use vigil_core::analysis::surprise::UnigramSurpriseModel;
use vigil_core::clock::{Clock, SystemClock};
use vigil_core::protocol::default_protocols;
use vigil_core::seal::{SealManager, SealState};
use vigil_core::types::{now, Timestamp};
use vigil_core::{
    AnalysisPipeline, ClawBoardClient, Collector, MetricKind, MetricResult, ProtocolRegistry,
    RunLog, SealGate, SnapshotStore, StructuralReport, VigilConfig, VigilError,
};

mod report;

/// Vigil - blind collection and time-locked analysis of ClawBoard discourse
#[derive(Parser)]
#[command(name = "vigil", author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a configuration file (defaults apply when absent)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Data directory override
    #[arg(short, long, value_name = "DIR")]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Perform one collection pass and append a snapshot
    Collect,

    /// Report chain and seal status without touching semantic content
    Status {
        /// Output in JSON for integrations
        #[arg(long)]
        json: bool,
    },

    /// Create the seal record and freeze the protocol registry
    Seal {
        /// Unlock target, RFC3339 (e.g. 2026-03-03T22:09:00Z)
        target: String,
    },

    /// Attempt the one-way unlock transition
    Unlock,

    /// Run the pre-registered semantic metrics (requires unlock)
    Analyze,

    /// Print the structural talk-to-code report (permitted pre-unlock)
    TalkToCode,
}

struct System {
    store: Arc<SnapshotStore>,
    registry: Arc<ProtocolRegistry>,
    seal: Arc<SealManager>,
}

async fn open_system(config: &VigilConfig) -> anyhow::Result<System> {
    let gate = SealGate::new();
    let store = Arc::new(SnapshotStore::open(&config.data_dir, gate.clone()).await?);
    let registry = Arc::new(ProtocolRegistry::open(&config.data_dir, gate.clone()).await?);
    let seal = Arc::new(
        SealManager::open(&config.data_dir, store.clone(), registry.clone(), gate).await?,
    );
    Ok(System {
        store,
        registry,
        seal,
    })
}

#[derive(Serialize)]
struct StatusView {
    state: SealState,
    snapshots: u64,
    latest_tasks: usize,
    latest_comments: usize,
    last_collected_at: Option<Timestamp>,
    target_unlock_at: Option<Timestamp>,
    remaining_secs: Option<i64>,
    protocols_registered: usize,
    registry_frozen: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            1
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let mut config = match &cli.config {
        Some(path) => VigilConfig::from_file(path)?,
        None => VigilConfig::default(),
    };
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }

    let system = open_system(&config).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    match cli.command {
        Commands::Collect => collect(&config, &system, clock).await,
        Commands::Status { json } => status(&system, json),
        Commands::Seal { target } => seal(&config, &system, &target).await,
        Commands::Unlock => unlock(&system).await,
        Commands::Analyze => analyze(&config, &system, clock).await,
        Commands::TalkToCode => talk_to_code(&config, &system),
    }
}

async fn collect(
    config: &VigilConfig,
    system: &System,
    clock: Arc<dyn Clock>,
) -> anyhow::Result<i32> {
    println!("🔒 Blind collection pass against {}", config.api_base);

    let client = ClawBoardClient::new(config)?;
    let collector = Collector::new(client, system.store.clone(), clock, config.collect_limit);
    let (snapshot, report) = collector.collect_once().await?;

    println!(
        "📦 Snapshot {} stored ({})",
        snapshot.sequence_number,
        snapshot.content_hash.to_hex()
    );
    println!("   Tasks: {}", report.tasks_stored);
    println!("   Comments: {}", report.comments_stored);
    if !report.soft_failures.is_empty() {
        println!(
            "   {} {} items skipped:",
            "⚠".yellow(),
            report.soft_failures.len()
        );
        for failure in &report.soft_failures {
            println!("     task {}: {}", failure.task_id, failure.reason);
        }
    }

    if let Some(remaining) = system.seal.remaining_secs(now()) {
        println!("⏳ {} until unsealing", report::format_remaining(remaining));
    }
    Ok(0)
}

fn status(system: &System, json: bool) -> anyhow::Result<i32> {
    let stats = system.store.stats();
    let record = system.seal.record();
    let view = StatusView {
        state: system.seal.state(),
        snapshots: stats.snapshots,
        latest_tasks: stats.latest_task_count,
        latest_comments: stats.latest_comment_count,
        last_collected_at: stats.last_collected_at,
        target_unlock_at: record.as_ref().map(|r| r.target_unlock_at),
        remaining_secs: system.seal.remaining_secs(now()),
        protocols_registered: system.registry.len(),
        registry_frozen: system.registry.is_frozen(),
    };

    if json {
        println!("{}", serde_json::to_string(&view)?);
        return Ok(0);
    }

    println!("STATE: {}", view.state.to_string().to_uppercase().bold());
    println!("SNAPSHOTS: {}", view.snapshots);
    println!(
        "LATEST: {} tasks, {} comments",
        view.latest_tasks, view.latest_comments
    );
    if let Some(at) = view.last_collected_at {
        println!("LAST COLLECTED: {}", at.to_rfc3339());
    }
    println!(
        "PROTOCOLS: {} registered{}",
        view.protocols_registered,
        if view.registry_frozen { " (frozen)" } else { "" }
    );
    if let Some(target) = view.target_unlock_at {
        println!("UNLOCK TARGET: {}", target.to_rfc3339());
    }
    if let Some(remaining) = view.remaining_secs {
        println!("⏳ {} until unsealing", report::format_remaining(remaining));
    }
    Ok(0)
}

async fn seal(config: &VigilConfig, system: &System, target: &str) -> anyhow::Result<i32> {
    let target = chrono::DateTime::parse_from_rfc3339(target)
        .map_err(|e| anyhow::anyhow!("invalid RFC3339 target '{}': {}", target, e))?
        .with_timezone(&chrono::Utc);

    if system.registry.is_empty() && !system.registry.is_frozen() {
        println!("Pre-registering the default protocol set (5 metrics)");
        for definition in default_protocols(&config.analysis) {
            system.registry.register(definition).await?;
        }
    }

    let record = system.seal.seal(target, now()).await?;
    println!("🔒 Sealed until {}", record.target_unlock_at.to_rfc3339());
    println!(
        "   Chain hash over {} snapshots: {}",
        record.sealed_snapshot_count,
        record.chain_hash_at_seal.to_hex()
    );
    println!(
        "   Protocol freeze hash: {}",
        record.protocol_freeze_hash.to_hex()
    );
    Ok(0)
}

async fn unlock(system: &System) -> anyhow::Result<i32> {
    match system.seal.attempt_unlock(now()).await {
        Ok(outcome) => {
            println!(
                "🔓 {} Chain of {} sealed snapshots verified.",
                "Unlocked.".green().bold(),
                outcome.sealed_snapshots
            );
            Ok(0)
        }
        Err(e) => {
            if let VigilError::TooEarly { remaining_secs } = e.root() {
                println!(
                    "⏳ Too early: {} until the unlock target.",
                    report::format_remaining(*remaining_secs)
                );
                return Ok(2);
            }
            if let VigilError::IntegrityViolation { expected, actual } = e.root() {
                eprintln!("{}", "INTEGRITY VIOLATION".red().bold());
                eprintln!("  expected: {}", expected);
                eprintln!("  actual:   {}", actual);
                eprintln!("  The sealed data was modified during the blind period.");
                eprintln!("  Unlock is permanently blocked pending manual investigation.");
                return Ok(1);
            }
            Err(e.into())
        }
    }
}

async fn analyze(
    config: &VigilConfig,
    system: &System,
    clock: Arc<dyn Clock>,
) -> anyhow::Result<i32> {
    let pipeline = AnalysisPipeline::new(
        system.store.clone(),
        system.registry.clone(),
        RunLog::open(&config.data_dir),
        clock,
        Arc::new(CharFrequencyEmbedder::default()),
        Arc::new(UnigramSurpriseModel::from_corpus(
            &config.analysis.baseline_phrases,
        )),
        config.analysis.clone(),
    );

    let run = pipeline.run().await?;
    println!("Analysis run {}", run.run_id);
    println!("  executed at: {}", run.executed_at.to_rfc3339());
    println!(
        "  protocol version: {}",
        run.protocol_definition_hash.to_hex()
    );
    for result in &run.results {
        println!("  {:<26} {}", result.metric.to_string(), summarize(result));
    }
    Ok(0)
}

fn talk_to_code(config: &VigilConfig, system: &System) -> anyhow::Result<i32> {
    let activities = system.store.latest_activity();
    if activities.is_empty() {
        println!("No snapshots collected yet. Run `vigil collect` first.");
        return Ok(0);
    }

    let report = StructuralReport::build(&activities, now(), &config.thresholds);
    print!("{}", report::render_structural(&report));
    Ok(0)
}

fn summarize(result: &MetricResult) -> String {
    let value = &result.value;
    let f = |key: &str| value.get(key).and_then(serde_json::Value::as_f64).unwrap_or(0.0);
    let n = |key: &str| value.get(key).and_then(serde_json::Value::as_u64).unwrap_or(0);

    match result.metric {
        MetricKind::SemanticNovelty => {
            format!("mean distance from baseline {:.3}", f("overall_mean"))
        }
        MetricKind::ConceptualSynthesis => {
            let pollinations = value
                .get("cross_pollinations")
                .and_then(serde_json::Value::as_array)
                .map(Vec::len)
                .unwrap_or(0);
            format!("{} cross-pollinating concepts", pollinations)
        }
        MetricKind::TemporalDynamics => {
            format!("mean drift {:.3}, max {:.3}", f("mean_drift"), f("max_drift"))
        }
        MetricKind::CollaborativeEmergence => format!(
            "{} emergent pairs across {} multi-author threads",
            n("total_emergent_pairs"),
            n("multi_author_tasks")
        ),
        MetricKind::Surprise => {
            format!("{} outliers above {:.1}", n("outlier_count"), f("threshold"))
        }
    }
}
