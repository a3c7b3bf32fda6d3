mod commands;
mod config;
pub mod defaults;
mod printing;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use commands::{run, template};
use config::EngineKind;

/// hapsim: forward simulation of haploid populations
///
/// Evolves a population under mutation, recombination, selection and drift,
/// either exactly over all genotypes of a short genome or as a list of clones
/// for long genomes.
#[derive(Parser, Debug)]
#[command(name = "hapsim")]
#[command(author, version, about = "Forward simulation of haploid populations", long_about = None)]
struct Cli {
    /// Number of threads to use for parallel processing
    ///
    /// If not specified, defaults to the number of logical CPUs.
    #[arg(short = 't', long, global = true)]
    threads: Option<usize>,

    /// Increase log verbosity (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a simulation described by a JSON configuration file.
    Run {
        /// Run configuration (see `hapsim template`)
        #[arg(short, long)]
        config: PathBuf,

        /// Override the configured random seed
        #[arg(long)]
        seed: Option<u64>,

        /// Hide the progress bar
        #[arg(long)]
        no_progress: bool,

        /// Print one JSON object per report instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Print a starting configuration.
    Template {
        /// Engine the configuration is for
        #[arg(short, long, value_enum, default_value = "exact")]
        engine: EngineKind,

        /// Output file (stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()?;
    }

    match cli.command {
        Commands::Run {
            config,
            seed,
            no_progress,
            json,
        } => {
            run::run_simulation(&config, seed, !no_progress, json)?;
        }
        Commands::Template { engine, output } => {
            template::write_template(engine, output.as_deref())?;
        }
    }

    Ok(())
}
