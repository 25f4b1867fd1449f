//! Common utilities for fanflow-cmd

use anyhow::{Context, Result};
use fanflow::{PipelineConfig, RunReport};

/// Builds the pipeline configuration from an optional JSON file and an optional
/// worker count override.
pub fn load_config(path: Option<&str>, workers: Option<usize>) -> Result<PipelineConfig> {
    let mut config = match path {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("Failed to load pipeline configuration: {path}"))?,
        None => PipelineConfig::default(),
    };
    if let Some(workers) = workers {
        config = config.with_workers(workers);
    }
    Ok(config)
}

/// Prints the statistics of a finished run.
pub fn print_report(report: &RunReport) {
    println!("  Total time: {:.3} seconds", report.elapsed.as_secs_f64());
    println!("  Items sent: {}", report.source.items_sent);
    println!("  Items processed: {}", report.items_processed());
    println!("  Results emitted: {}", report.results_emitted());
    match report.shutdown {
        Some(reason) => println!("  Stopped early: {reason}"),
        None => println!("  Stopped early: no"),
    }
    for worker in &report.workers {
        println!(
            "    worker {:>3}: {:>10} items, {:>8} results, {:?}",
            worker.worker, worker.items_processed, worker.results_emitted, worker.exit
        );
    }

    let secs = report.elapsed.as_secs_f64();
    if secs > 0.0 {
        let items_per_sec = report.items_processed() as f64 / secs;
        println!("  Throughput: {items_per_sec:.0} items/s");
    }
}
