use cache_simulator::models::{CacheAlgorithm, SimulationConfig};
use cache_simulator::runner::SimulationRunner;
use cache_simulator::stats;
use cache_simulator::workload::{self, Pattern, WorkloadConfig};
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Midpoint cache simulator CLI
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

/// Parameters shared by `generate` and an in-memory `simulate`
#[derive(ClapArgs, Debug)]
struct WorkloadArgs {
    /// Access pattern
    #[arg(long, value_enum, default_value = "viral-burst")]
    pattern: Pattern,

    /// Number of requests
    #[arg(long, default_value = "1000000")]
    requests: usize,

    /// Size of the popular key set
    #[arg(long, default_value = "100")]
    hot_keys: usize,

    /// Percentage of requests that go to popular keys
    #[arg(long, default_value = "50", value_parser = clap::value_parser!(u8).range(0..=100))]
    hot_share: u8,

    /// Requests before the popular set changes (viral-burst)
    #[arg(long, default_value = "100000")]
    burst: usize,

    /// Key space (uniform)
    #[arg(long, default_value = "100000")]
    keys: usize,

    /// RNG seed
    #[arg(long, default_value = "42")]
    seed: u64,
}

impl From<&WorkloadArgs> for WorkloadConfig {
    fn from(args: &WorkloadArgs) -> Self {
        WorkloadConfig {
            pattern: args.pattern,
            requests: args.requests,
            hot_keys: args.hot_keys,
            hot_share: args.hot_share,
            burst: args.burst,
            keys: args.keys,
            seed: args.seed,
        }
    }
}

/// Subcommands for the CLI
#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a generated workload to a CSV trace
    Generate {
        #[command(flatten)]
        workload: WorkloadArgs,

        /// Output file
        #[arg(short, long, default_value = "trace.csv")]
        output: PathBuf,
    },

    /// Replay a trace (or a generated workload) against each cache
    Simulate {
        /// CSV trace; generated in memory when omitted
        trace: Option<PathBuf>,

        #[command(flatten)]
        workload: WorkloadArgs,

        /// Cache capacity (number of entries)
        #[arg(short, long, default_value = "10000")]
        capacity: usize,

        /// Algorithms to simulate (midpoint, midpoint-concurrent, lru, moka)
        #[arg(short, long, value_name = "ALGOS", num_args = 1.., value_delimiter = ',')]
        algorithms: Option<Vec<String>>,

        /// Threads driving the thread-safe caches
        #[arg(long, default_value = "1")]
        threads: usize,

        /// Refresh workers for midpoint-concurrent
        #[arg(long, default_value = "2")]
        refresh_workers: usize,

        /// Refresh queue bound for midpoint-concurrent
        #[arg(long, default_value = "4096")]
        refresh_queue: usize,

        /// Requests per reporting window
        #[arg(long, default_value = "100000")]
        window: usize,

        /// Print the hit rate of every window
        #[arg(long)]
        windows: bool,

        /// Export results to CSV file
        #[arg(long, value_name = "PATH")]
        output_csv: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match args.command {
        Commands::Generate { workload, output } => {
            let requests = workload::generate(&WorkloadConfig::from(&workload));
            workload::write_csv(&output, &requests)?;
            println!("Wrote {} requests to {}", requests.len(), output.display());
            Ok(())
        }

        Commands::Simulate {
            trace,
            workload,
            capacity,
            algorithms,
            threads,
            refresh_workers,
            refresh_queue,
            window,
            windows,
            output_csv,
        } => {
            let requests = match &trace {
                Some(path) => workload::read_csv(path)?,
                None => {
                    info!(pattern = ?workload.pattern, "no trace given, generating in memory");
                    workload::generate(&WorkloadConfig::from(&workload))
                }
            };

            let config = SimulationConfig {
                capacity: capacity.max(1),
                algorithms: select_algorithms(algorithms.as_deref()),
                threads: threads.max(1),
                refresh_workers,
                refresh_queue,
                window: window.max(1),
            };

            println!("Cache Simulation");
            println!("================");
            match &trace {
                Some(path) => println!("Trace: {}", path.display()),
                None => println!("Trace: generated ({:?})", workload.pattern),
            }
            println!("Cache capacity: {} entries", config.capacity);
            println!(
                "Algorithms: {:?}",
                config.algorithms.iter().map(|a| a.as_str()).collect::<Vec<_>>()
            );
            if config.threads > 1 {
                println!("Worker threads: {} (midpoint runs on one)", config.threads);
            }

            let result = SimulationRunner::new(config).run(&requests);
            stats::print_summary(&result);
            if windows {
                stats::print_windows(&result);
            }

            if let Some(csv_path) = output_csv {
                match stats::export_csv(&result, &csv_path) {
                    Ok(()) => println!("\nResults exported to: {}", csv_path.display()),
                    Err(e) => eprintln!("Failed to export CSV: {e}"),
                }
            }
            Ok(())
        }
    }
}

/// Parses algorithm names, falling back to all of them.
fn select_algorithms(names: Option<&[String]>) -> Vec<CacheAlgorithm> {
    let Some(names) = names.filter(|n| !n.is_empty()) else {
        return CacheAlgorithm::all();
    };

    let mut selected = Vec::new();
    for name in names {
        match CacheAlgorithm::parse(name) {
            Some(algorithm) if !selected.contains(&algorithm) => selected.push(algorithm),
            Some(_) => {}
            None => warn!(name = name.as_str(), "unknown algorithm, skipping"),
        }
    }
    if selected.is_empty() {
        warn!("no valid algorithms selected, using all");
        CacheAlgorithm::all()
    } else {
        selected
    }
}
