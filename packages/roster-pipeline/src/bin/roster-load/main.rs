mod logging;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use roster_pipeline::{declared_indexes, LoadPlan, PipelineConfig, PipelineOrchestrator};
use tracing::error;

#[derive(Parser)]
#[command(
    name = "roster-load",
    version,
    about = "Validate instructor, course, learner and schedule sources and load them"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full load and print the JSON summary
    Run(RunArgs),
    /// Print the load order and the index set of each collection
    Plan {
        /// Path to the YAML configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Path to the YAML configuration file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Directory holding the source files
    #[arg(long)]
    source_dir: Option<PathBuf>,
    /// SQLite database file
    #[arg(long)]
    db: Option<PathBuf>,
    /// Log level (error, warn, info, debug, trace)
    #[arg(long)]
    log_level: Option<String>,
    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

/// Defaults, then the YAML file, then `ROSTER_*` variables
fn load_config(path: Option<&PathBuf>) -> anyhow::Result<PipelineConfig> {
    let mut config = match path {
        Some(path) => PipelineConfig::from_yaml(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    config.apply_env();
    Ok(config)
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_ref())?;
    if let Some(dir) = args.source_dir {
        config.sources.dir = dir;
    }
    if let Some(db) = args.db {
        config.store.path = db;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    if args.json_logs {
        config.logging.json = true;
    }

    logging::init(&config.logging.level, config.logging.json);

    let orchestrator = PipelineOrchestrator::new(config)?;
    match orchestrator.run().await {
        Ok(summary) => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Load failed");
            Err(e.into())
        }
    }
}

fn plan(config: Option<PathBuf>) -> anyhow::Result<()> {
    let config = load_config(config.as_ref())?;
    config.validate()?;

    let plan = LoadPlan::standard()?;
    println!("{}", plan.execution_plan());
    for entity in plan.order() {
        println!();
        println!(
            "{} <- {}",
            entity.collection(),
            config.sources.path_for(entity).display()
        );
        for index in declared_indexes(entity) {
            let kind = match (index.unique, index.sparse) {
                (true, true) => "unique, sparse",
                (true, false) => "unique",
                _ => "secondary",
            };
            println!("  {} ({}) [{}]", index.name, index.fields.join(", "), kind);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run(args).await,
        Commands::Plan { config } => plan(config),
    }
}
