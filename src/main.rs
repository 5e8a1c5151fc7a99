use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};

use switchyard::config::Config;
use switchyard::orchestration::{Pipeline, PlanningPolicy};
use switchyard::{Error, Result, TaskBatch};

/// Switchyard - route tasks to tiered workers, plan them into parallel groups and run them
#[derive(Parser, Debug)]
#[command(name = "switchyard")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    SWITCHYARD_DEBUG=1     Enable debug logging (alternative to --debug)\n    RUST_LOG               Override the log filter")]
pub struct Cli {
    /// Config file (default: ~/.switchyard/switchyard.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging (writes to the configured log file)
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    /// Route through domain teams instead of the tiered router
    #[arg(long, global = true)]
    pub teams: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Show the routing decision for every task
    Route {
        /// Task batch (.json array or .toml with [[tasks]])
        tasks: PathBuf,
    },

    /// Route and plan without dispatching
    Plan {
        tasks: PathBuf,

        /// Ignore tiers; group by dependency depth only
        #[arg(long)]
        flat: bool,
    },

    /// Route, plan and execute a batch
    Run {
        tasks: PathBuf,

        #[arg(long)]
        flat: bool,

        /// Tasks in flight at once within a group (0 = unbounded)
        #[arg(long)]
        max_concurrency: Option<usize>,
    },

    /// Print the effective configuration
    Config {
        /// Write it to the config path
        #[arg(long)]
        save: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;

    let log_file = if cli.debug { Some(config.log_path()?) } else { None };
    switchyard::log::init(cli.debug, log_file.as_deref());

    if cli.teams {
        config.routing.use_teams = true;
    }

    match cli.command {
        Command::Route { tasks } => run_route(&config, &tasks),
        Command::Plan { tasks, flat } => {
            apply_flat(&mut config, flat);
            run_plan(&config, &tasks)
        }
        Command::Run {
            tasks,
            flat,
            max_concurrency,
        } => {
            apply_flat(&mut config, flat);
            if let Some(n) = max_concurrency {
                config.coordinator.max_concurrency = Some(n);
            }
            run_batch(&config, &tasks)
        }
        Command::Config { save } => run_config(&config, cli.config.as_deref(), save),
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

fn apply_flat(config: &mut Config, flat: bool) {
    if flat {
        config.planner.mode = PlanningPolicy::Flat;
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_route(config: &Config, tasks: &Path) -> Result<()> {
    let tasks = TaskBatch::load(tasks)?;
    let router = config.build_route()?;
    print_json(&router.route_all(&tasks))
}

fn run_plan(config: &Config, tasks: &Path) -> Result<()> {
    let tasks = TaskBatch::load(tasks)?;
    let pipeline = Pipeline::from_config(config)?;
    let (decisions, plan) = pipeline.plan(&tasks)?;
    print_json(&serde_json::json!({
        "decisions": decisions,
        "plan": plan,
    }))
}

/// Execute a batch and print the run as JSON.
///
/// Exits with status 2 when any task failed. An aborted run prints its
/// partial report before returning the error.
fn run_batch(config: &Config, tasks: &Path) -> Result<()> {
    let tasks = TaskBatch::load(tasks)?;
    let pipeline = Pipeline::from_config(config)?;
    let cancel = pipeline.coordinator().cancellation_token();

    let rt = tokio::runtime::Runtime::new()?;
    let outcome = rt.block_on(async {
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, settling in-flight tasks");
                cancel.cancel();
            }
        });
        pipeline.run(&tasks).await
    });

    match outcome {
        Ok(run) => {
            print_json(&run)?;
            if !run.report.is_success() {
                let summary = run.report.summary();
                info!(failed = summary.failed, timed_out = summary.timed_out, "run finished with failures");
                std::process::exit(2);
            }
            Ok(())
        }
        Err(err @ Error::BackendUnavailable { .. }) => {
            if let Some(partial) = err.partial_report() {
                print_json(partial)?;
            }
            Err(err)
        }
        Err(err) => Err(err),
    }
}

fn run_config(config: &Config, path: Option<&Path>, save: bool) -> Result<()> {
    if save {
        match path {
            Some(path) => config.save_to(path)?,
            None => config.save()?,
        }
    }
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}
