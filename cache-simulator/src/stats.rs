// Reporting for cache simulation results

use crate::models::{CsvResultRow, HitCount, SimulationResult};
use std::path::Path;

/// Prints a summary table, one row per algorithm.
pub fn print_summary(result: &SimulationResult) {
    println!("\nCache Simulation Summary");
    println!("========================");
    println!("Total requests: {}", result.total_requests);
    println!("Unique keys:    {}", result.unique_keys);
    println!("Elapsed:        {:.2?}", result.duration);

    println!(
        "\n{:<20} {:>9} {:>10} {:>11} {:>10} {:>12} {:>9} {:>9} {:>9}",
        "Algorithm",
        "HitRate",
        "Popular%",
        "WorstWin%",
        "Time",
        "Ops/sec",
        "GetAvg",
        "PutAvg",
        "Getp99"
    );
    println!("{}", "-".repeat(108));

    for (algorithm, stats) in &result.stats {
        println!(
            "{:<20} {:>8.2}% {:>9.2}% {:>10.2}% {:>8}ms {:>12.0} {:>7.0}ns {:>7.0}ns {:>7}ns",
            algorithm.as_str(),
            stats.overall.hit_rate(),
            stats.popular.hit_rate(),
            worst_window(&stats.windows),
            stats.simulation_time_ms,
            stats.latency.ops_per_sec(),
            stats.latency.get_stats.avg_ns(),
            stats.latency.put_stats.avg_ns(),
            stats.latency.get_stats.p99_ns,
        );
    }

    for (algorithm, stats) in &result.stats {
        if let (Some(hot), Some(cold)) = (
            stats.cache_metrics.get("hot_hits"),
            stats.cache_metrics.get("cold_hits"),
        ) {
            println!(
                "\n{algorithm}: {hot} hot hits, {cold} cold hits, {} promotions, {} boundary shifts",
                stats.cache_metrics.get("promotions").copied().unwrap_or(0.0),
                stats.cache_metrics.get("boundary_shifts").copied().unwrap_or(0.0),
            );
        }
    }
}

/// Prints the hit rate of every window, one column per algorithm.
pub fn print_windows(result: &SimulationResult) {
    println!("\nHit rate per {} requests", result.window);
    print!("{:>8}", "window");
    for algorithm in result.stats.keys() {
        print!(" {:>20}", algorithm.as_str());
    }
    println!();

    let windows = result
        .stats
        .values()
        .map(|s| s.windows.len())
        .max()
        .unwrap_or(0);
    for index in 0..windows {
        print!("{index:>8}");
        for stats in result.stats.values() {
            let rate = stats
                .windows
                .get(index)
                .map(HitCount::hit_rate)
                .unwrap_or(0.0);
            print!(" {rate:>19.2}%");
        }
        println!();
    }
}

/// Lowest hit rate over all non-empty windows after the first, which is
/// dominated by cold-start misses.
fn worst_window(windows: &[HitCount]) -> f64 {
    windows
        .iter()
        .skip(1)
        .filter(|w| w.hits + w.misses > 0)
        .map(HitCount::hit_rate)
        .fold(None, |worst: Option<f64>, rate| {
            Some(worst.map_or(rate, |w| w.min(rate)))
        })
        .unwrap_or(0.0)
}

/// Export results to a CSV file
pub fn export_csv(result: &SimulationResult, path: &Path) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_path(path)?;

    for (algorithm, stats) in &result.stats {
        let row = CsvResultRow {
            algorithm: algorithm.as_str().to_string(),
            hits: stats.overall.hits,
            misses: stats.overall.misses,
            hit_rate: stats.overall.hit_rate(),
            popular_hit_rate: stats.popular.hit_rate(),
            worst_window_hit_rate: worst_window(&stats.windows),
            simulation_time_ms: stats.simulation_time_ms,
            ops_per_sec: stats.latency.ops_per_sec(),
            get_avg_ns: stats.latency.get_stats.avg_ns(),
            get_p99_ns: stats.latency.get_stats.p99_ns,
            put_avg_ns: stats.latency.put_stats.avg_ns(),
            put_p99_ns: stats.latency.put_stats.p99_ns,
        };
        writer.serialize(row)?;
    }

    writer.flush()?;
    Ok(())
}
