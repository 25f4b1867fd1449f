//! Leak-check command implementation

use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use fanflow::{Pipeline, PipelineConfig, StopCondition};
use fanflow_testkit::{
    primes::is_prime,
    threads::{process_thread_count, wait_for_thread_count},
};

/// Run the leak-check command
pub fn run(iterations: u64, workers: usize) -> Result<()> {
    let Some(baseline) = process_thread_count()? else {
        println!("Thread counting is not supported on this platform");
        return Ok(());
    };
    let pipeline = Pipeline::new(PipelineConfig::default().with_workers(workers))?;

    println!("Running {iterations} early-stopped pipelines with {workers} workers");
    println!("  Baseline threads: {baseline}");

    let start_time = Instant::now();
    let mut results = 0usize;
    for i in 0..iterations {
        // An unbounded search that stops on the first hit.
        let output = pipeline.run_until(
            (i * 1000)..,
            |n| is_prime(n).then_some(n),
            StopCondition::limit(1),
        )?;
        results += output.len();
        log::debug!("iteration {i}: {:?}", output.report.shutdown);

        let live = pipeline.liveness().live();
        if live != 0 {
            bail!("{live} pipeline threads still running after iteration {i}");
        }
    }
    let elapsed = start_time.elapsed();

    let after = wait_for_thread_count(baseline, Duration::from_secs(5))?.unwrap_or(baseline);
    println!("Leak check completed:");
    println!("  Total time: {:.3} seconds", elapsed.as_secs_f64());
    println!("  Results received: {results}");
    println!("  Threads after: {after}");

    if after > baseline {
        bail!("thread count grew from {baseline} to {after}");
    }
    println!("  No leaked threads");
    Ok(())
}
