//! Process-level thread leak check. Kept as the only test of this binary so
//! that no other test's threads are counted.

use std::time::Duration;

use fanflow::{Pipeline, PipelineConfig, StopCondition};
use fanflow_testkit::{
    primes::is_prime,
    threads::{process_thread_count, wait_for_thread_count},
};

#[test]
fn test_runs_leave_no_threads_behind() {
    let Some(baseline) = process_thread_count().unwrap() else {
        return;
    };

    let p = Pipeline::new(
        PipelineConfig::default()
            .with_workers(8)
            .with_deadline(Duration::from_secs(60)),
    )
    .unwrap();
    for i in 0..50u64 {
        // Natural completion, early stop, and an abandoned stream.
        let output = p.run(0..200u64, |x| is_prime(x).then_some(x)).unwrap();
        assert_eq!(output.len(), 46);

        let output = p
            .run_until(0u64.., move |x| (x == 1000 + i).then_some(x), StopCondition::limit(1))
            .unwrap();
        assert_eq!(output.results, vec![1000 + i]);

        let running = p.spawn(0u64.., Some).unwrap();
        assert!(running.results().next().is_some());
        drop(running);

        assert_eq!(p.liveness().live(), 0);
    }

    let after = wait_for_thread_count(baseline, Duration::from_secs(5))
        .unwrap()
        .unwrap();
    assert!(
        after <= baseline,
        "thread count {after} above baseline {baseline}"
    );
}
