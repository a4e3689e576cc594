use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use mec_core::{
    logging, read_grant_log, EdgeScheduler, GrantDispatcher, JsonlGrantLog, NullGrantDispatcher,
    SchedulerConfig,
};
use mec_sched::SchemeKind;

mod scenario;

use scenario::Scenario;

#[derive(Parser)]
#[command(name = "mec", about = "Edge offloading scheduler")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a scenario through the configured scheme.
    Run {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        scenario: PathBuf,
        /// Override the scheme named in the config.
        #[arg(long)]
        scheme: Option<SchemeKind>,
        /// Append admitted placements to this JSONL file.
        #[arg(long)]
        grant_log: Option<PathBuf>,
        /// Print one JSON report per epoch instead of a summary line.
        #[arg(long)]
        json: bool,
    },
    /// Replay a scenario through every scheme and print per-scheme totals.
    Compare {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        scenario: PathBuf,
    },
    /// List available schemes.
    Schemes,
    /// Print the last records of a grant log.
    Grants {
        #[arg(long, default_value = "./grants.jsonl")]
        path: PathBuf,
        #[arg(long, default_value_t = 10)]
        lines: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            config,
            scenario,
            scheme,
            grant_log,
            json,
        } => {
            let mut cfg = load_config(&config)?;
            if let Some(kind) = scheme {
                cfg.scheme = kind;
            }
            logging::init(cfg.log_filter.as_deref());
            let scenario = Scenario::from_path(&scenario)?;

            let dispatcher: Arc<dyn GrantDispatcher> = match &grant_log {
                Some(path) => Arc::new(
                    JsonlGrantLog::open(path)
                        .with_context(|| format!("opening grant log {}", path.display()))?,
                ),
                None => Arc::new(NullGrantDispatcher),
            };
            let scheduler = EdgeScheduler::from_config(&cfg, dispatcher);
            let mut pool = scheduler.new_pool();

            for (i, set) in scenario.candidate_sets(scheduler.node_ids())?.iter().enumerate() {
                let out = scheduler
                    .run_epoch(&mut pool, set)
                    .await
                    .with_context(|| format!("epoch {i}"))?;
                if json {
                    println!("{}", serde_json::to_string(&out.report)?);
                } else {
                    println!(
                        "epoch {i}: {} admitted {}/{} apps, utility {:.3}, {} us",
                        out.report.scheme,
                        out.report.admitted,
                        out.report.applications,
                        out.report.total_utility,
                        out.report.elapsed_us
                    );
                }
            }
            println!("{} applications hold grants", scheduler.grants().await.len());
        }
        Command::Compare { config, scenario } => {
            let cfg = load_config(&config)?;
            logging::init(cfg.log_filter.as_deref());
            let scenario = Scenario::from_path(&scenario)?;

            println!("{:<24} {:>8} {:>12} {:>10}", "scheme", "admitted", "utility", "time_us");
            for kind in SchemeKind::ALL {
                let scheduler = EdgeScheduler::new(
                    kind.build(cfg.forwarding_separate_type),
                    Arc::new(NullGrantDispatcher),
                    cfg.node_ids(),
                    cfg.capacities(),
                    cfg.max_candidates,
                );
                let mut pool = scheduler.new_pool();
                let (mut admitted, mut utility, mut elapsed) = (0usize, 0.0f64, 0u64);
                let mut failure = None;
                for set in scenario.candidate_sets(scheduler.node_ids())? {
                    match scheduler.run_epoch(&mut pool, &set).await {
                        Ok(out) => {
                            admitted += out.report.admitted;
                            utility += out.report.total_utility;
                            elapsed += out.report.elapsed_us;
                        }
                        Err(e) => {
                            failure = Some(e);
                            break;
                        }
                    }
                }
                match failure {
                    None => println!("{:<24} {admitted:>8} {utility:>12.3} {elapsed:>10}", kind.as_str()),
                    Some(e) => println!("{:<24} failed: {e}", kind.as_str()),
                }
            }
        }
        Command::Schemes => {
            for kind in SchemeKind::ALL {
                let forwarding = if kind.supports_forwarding() { "forwarding" } else { "local only" };
                println!("{:<24} {forwarding}", kind.as_str());
            }
        }
        Command::Grants { path, lines } => {
            let records = read_grant_log(&path)
                .with_context(|| format!("reading grant log {}", path.display()))?;
            let start = records.len().saturating_sub(lines);
            for record in &records[start..] {
                println!("{}", serde_json::to_string(record)?);
            }
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<SchedulerConfig> {
    SchedulerConfig::from_path(path).with_context(|| format!("loading config {}", path.display()))
}
