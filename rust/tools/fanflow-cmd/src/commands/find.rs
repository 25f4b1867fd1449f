//! Find command implementation

use std::time::Duration;

use anyhow::{Context, Result};
use fanflow::{Pipeline, StopCondition};
use fanflow_testkit::primes::is_prime;

use crate::utils;

/// Run the find command
pub fn run(
    threshold: u64,
    limit: Option<u64>,
    workers: Option<usize>,
    deadline_ms: Option<u64>,
) -> Result<()> {
    let mut config = utils::load_config(None, workers)?;
    if let Some(ms) = deadline_ms {
        config = config.with_deadline(Duration::from_millis(ms));
    }
    let pipeline = Pipeline::new(config).with_context(|| "Invalid pipeline configuration")?;
    let predicate = |n: u64| is_prime(n).then_some(n);
    let condition = StopCondition::limit(1);

    println!("Searching for a prime at or above {threshold}, stopping on the first match");
    let output = match limit {
        Some(limit) => pipeline.run_until(threshold..limit, predicate, condition)?,
        None => pipeline.run_until(threshold.., predicate, condition)?,
    };

    // Several workers may have found a match before the stop reached them. The
    // smallest one received is not necessarily the smallest prime above the
    // threshold.
    match output.results.iter().min() {
        Some(found) => println!("Found prime: {found} ({} received)", output.len()),
        None => println!("Nothing found"),
    }
    utils::print_report(&output.report);
    Ok(())
}

