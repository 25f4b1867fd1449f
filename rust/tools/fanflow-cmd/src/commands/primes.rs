//! Primes command implementation

use anyhow::{Context, Result};
use fanflow::Pipeline;
use fanflow_testkit::primes::is_prime;

use crate::utils;

/// Run the primes command
pub fn run(limit: u64, workers: Option<usize>, config: Option<String>, json: bool) -> Result<()> {
    let config = utils::load_config(config.as_deref(), workers)?;
    let pipeline = Pipeline::new(config).with_context(|| "Invalid pipeline configuration")?;

    println!(
        "Counting primes below {limit} with {} workers",
        pipeline.config().workers
    );
    let output = pipeline.run(0..limit, |n| is_prime(n).then_some(n))?;

    println!("Run completed:");
    println!("  Primes found: {}", output.len());
    if let Some(largest) = output.results.iter().max() {
        println!("  Largest prime: {largest}");
    }
    utils::print_report(&output.report);

    if json {
        println!("{}", serde_json::to_string_pretty(&output.report)?);
    }
    Ok(())
}
