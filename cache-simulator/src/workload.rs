//! Workload generation and CSV trace I/O
//!
//! A trace is a sequence of [`Request`]s stored as CSV with the header
//! `seq,key,hot`. `hot` marks requests drawn from the popular key set, so
//! reports can show how well each cache protects popular keys separately
//! from the overall hit rate.
//!
//! Three patterns are available:
//!
//! | Pattern | Popular keys | Everything else |
//! |---------|--------------|-----------------|
//! | `viral-burst` | a fresh set every `burst` requests | one-time keys |
//! | `scan-mix` | one fixed set for the whole trace | one-time keys |
//! | `uniform` | none | uniform over `keys` |

use crate::models::Request;
use clap::ValueEnum;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// Errors reading or writing a trace
#[derive(Debug, Error)]
pub enum WorkloadError {
    #[error("failed to open trace: {0}")]
    Io(#[from] io::Error),

    #[error("malformed trace: {0}")]
    Csv(#[from] csv::Error),

    #[error("trace is empty")]
    Empty,
}

/// Access pattern of a generated workload
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Pattern {
    /// Popular set rotates every burst; the rest are one-time keys
    ViralBurst,
    /// Fixed popular set interleaved with a one-time scan
    ScanMix,
    /// Uniform over a fixed key space
    Uniform,
}

/// Parameters for a generated workload
#[derive(Debug, Clone)]
pub struct WorkloadConfig {
    pub pattern: Pattern,
    /// Total number of requests
    pub requests: usize,
    /// Size of the popular key set
    pub hot_keys: usize,
    /// Percentage of requests that go to the popular set
    pub hot_share: u8,
    /// Requests per popular set (viral-burst only)
    pub burst: usize,
    /// Key space for the uniform pattern
    pub keys: usize,
    /// RNG seed, so a trace can be regenerated exactly
    pub seed: u64,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            pattern: Pattern::ViralBurst,
            requests: 1_000_000,
            hot_keys: 100,
            hot_share: 50,
            burst: 100_000,
            keys: 100_000,
            seed: 42,
        }
    }
}

/// Generates the requests described by `config`.
///
/// Popular keys and one-time keys come from disjoint ranges: popular set
/// `n` uses `n * hot_keys .. (n + 1) * hot_keys`, one-time keys count up
/// from `u64::MAX / 2`.
pub fn generate(config: &WorkloadConfig) -> Vec<Request> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let hot_keys = config.hot_keys.max(1) as u64;
    let burst = config.burst.max(1);
    let mut next_once = u64::MAX / 2;
    let mut requests = Vec::with_capacity(config.requests);

    for seq in 0..config.requests {
        let request = match config.pattern {
            Pattern::Uniform => {
                let key = rng.gen_range(0..config.keys.max(1) as u64);
                Request::new(seq as u64, key, false)
            }
            Pattern::ViralBurst | Pattern::ScanMix => {
                if rng.gen_range(0..100u8) < config.hot_share {
                    let set = match config.pattern {
                        Pattern::ViralBurst => (seq / burst) as u64,
                        _ => 0,
                    };
                    let key = set * hot_keys + rng.gen_range(0..hot_keys);
                    Request::new(seq as u64, key, true)
                } else {
                    next_once += 1;
                    Request::new(seq as u64, next_once, false)
                }
            }
        };
        requests.push(request);
    }

    debug!(
        pattern = ?config.pattern,
        requests = requests.len(),
        "generated workload"
    );
    requests
}

/// Writes a trace as CSV.
pub fn write_csv(path: &Path, requests: &[Request]) -> Result<(), WorkloadError> {
    let file = File::create(path)?;
    let mut writer = csv::Writer::from_writer(BufWriter::with_capacity(1024 * 1024, file));
    for request in requests {
        writer.serialize(request)?;
    }
    writer.flush()?;
    info!(path = %path.display(), requests = requests.len(), "wrote trace");
    Ok(())
}

/// Reads a CSV trace written by [`write_csv`].
pub fn read_csv(path: &Path) -> Result<Vec<Request>, WorkloadError> {
    let file = File::open(path)?;
    let mut reader = csv::Reader::from_reader(BufReader::with_capacity(1024 * 1024, file));
    let requests = reader
        .deserialize()
        .collect::<Result<Vec<Request>, csv::Error>>()?;
    if requests.is_empty() {
        return Err(WorkloadError::Empty);
    }
    info!(path = %path.display(), requests = requests.len(), "read trace");
    Ok(requests)
}
