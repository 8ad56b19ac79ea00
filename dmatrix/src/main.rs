//! dmatrix - Command Line Interface
//!
//! Inspect how a set of data files would be sharded across training actors.
//!
//! ## Commands
//!
//! - `plan` - Show the resolved load mode and every rank's assignment
//! - `inspect` - Materialize one rank and print a JSON summary

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dmatrix::{
    init_production_logging, init_simple_logging, DataSource, DistributedMode, LoadMode,
    MatrixBuilder, MatrixOptions, RankAssignment, ShardingMode, WorkerContext,
};
use serde_json::json;
use tracing::info;

/// Distributed training matrix tooling
#[derive(Parser, Debug)]
#[command(name = "dmatrix")]
#[command(about = "Shard tabular data across boosting actors", long_about = None)]
#[command(version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Also write daily-rotated logs to this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show how the files would be assigned to actors
    Plan {
        /// Data files (.csv, .tsv, .parquet, .pq)
        #[arg(required = true)]
        paths: Vec<String>,

        /// Number of actors
        #[arg(short, long)]
        actors: usize,

        /// Options file (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Load mode override: auto, true or false
        #[arg(short, long)]
        distributed: Option<DistributedMode>,

        /// Row sharding: batch or interleaved
        #[arg(short, long)]
        sharding: Option<ShardingMode>,
    },

    /// Load one rank and summarize its payload
    Inspect {
        /// Data files (.csv, .tsv, .parquet, .pq)
        #[arg(required = true)]
        paths: Vec<String>,

        /// Number of actors
        #[arg(short, long)]
        actors: usize,

        /// Rank to load
        #[arg(short, long, default_value_t = 0)]
        rank: usize,

        /// Label column(s)
        #[arg(short, long)]
        label: Vec<String>,

        /// Options file (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Give ranks without data an empty payload instead of failing
        #[arg(long)]
        allow_insufficient_shards: bool,
    },
}

fn load_options(config: Option<&PathBuf>) -> Result<MatrixOptions> {
    match config {
        Some(path) => MatrixOptions::load(path)
            .with_context(|| format!("failed to load options from {}", path.display())),
        None => Ok(MatrixOptions::default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.log_dir {
        Some(dir) => init_production_logging(&cli.log_level, Some(dir.clone()))?,
        None => init_simple_logging(&cli.log_level)?,
    }

    match cli.command {
        Commands::Plan {
            paths,
            actors,
            config,
            distributed,
            sharding,
        } => {
            let mut options = load_options(config.as_ref())?;
            if let Some(distributed) = distributed {
                options.distributed = distributed;
            }
            if let Some(sharding) = sharding {
                options.sharding = sharding;
            }

            let matrix = MatrixBuilder::new(DataSource::paths(&paths))
                .options(options)
                .lazy(true)
                .build()?;
            let plan = matrix.plan(actors)?;
            plan.check_sufficiency(&matrix.source().describe(), false)?;

            println!("Source:      {}", matrix.source().describe());
            println!("Adapter:     {}", matrix.adapter_name());
            println!("Mode:        {}", plan.mode);
            println!("Sharding:    {}", plan.sharding);
            println!("Partitions:  {}", plan.num_partitions);
            match (plan.mode, plan.total_rows) {
                (_, Some(rows)) => println!("Rows:        {}", rows),
                (LoadMode::Centralized, None) => println!("Rows:        unknown until loaded"),
                (LoadMode::Distributed, None) => {}
            }
            println!("Fingerprint: {}", matrix.fingerprint());
            println!();

            for (rank, assignment) in plan.assignments().iter().enumerate() {
                match assignment {
                    RankAssignment::Partitions(partitions) => {
                        println!("rank {:>3}: partitions {:?}", rank, partitions);
                    }
                    RankAssignment::RowSlice { .. } => match plan.total_rows {
                        Some(total) => {
                            let rows = assignment.rows(total).unwrap_or_default();
                            println!(
                                "rank {:>3}: {} rows ({})",
                                rank,
                                rows.len(),
                                describe_rows(&rows)
                            );
                        }
                        None => println!("rank {:>3}: {} slice of the full source", rank, plan.sharding),
                    },
                }
            }
        }

        Commands::Inspect {
            paths,
            actors,
            rank,
            label,
            config,
            allow_insufficient_shards,
        } => {
            let options = load_options(config.as_ref())?;
            let mut builder = MatrixBuilder::new(DataSource::paths(&paths)).options(options);
            match label.len() {
                0 => {}
                1 => builder = builder.label(label[0].as_str()),
                _ => builder = builder.label(label),
            }
            let matrix = builder.num_actors(actors).lazy(true).build()?;

            let mut ctx = WorkerContext::new(rank, actors);
            if allow_insufficient_shards {
                ctx = ctx.allowing_insufficient_shards();
            }
            let payload = matrix.get_data(ctx).await?;
            info!(rank, rows = payload.num_rows(), "Rank loaded");

            let params: Vec<&str> = payload.to_params().keys().copied().collect();
            let summary = json!({
                "source": matrix.source().describe(),
                "fingerprint": matrix.fingerprint().to_string(),
                "mode": matrix.load_mode()?,
                "rank": rank,
                "num_actors": actors,
                "rows": payload.num_rows(),
                "features": payload.feature_names,
                "label_columns": payload.label.as_ref().map(|l| l.ncols()),
                "params": params,
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}

/// Compact description of a row index list: `a..b` when contiguous
fn describe_rows(rows: &[usize]) -> String {
    match (rows.first(), rows.last()) {
        (Some(first), Some(last)) if last - first + 1 == rows.len() => {
            format!("{}..{}", first, last + 1)
        }
        (Some(_), Some(_)) => format!("{} non-contiguous", rows.len()),
        _ => "empty".to_string(),
    }
}
