use std::{
    collections::BTreeSet,
    sync::{Arc, Mutex},
    thread,
    time::Duration,
};

use fanflow::{
    Error, Pipeline, PipelineConfig, ShutdownController, ShutdownReason, StopCondition,
    completion::WorkerExit, sequenced, source::SourceExit,
};
use fanflow_common::error::ErrorKind;
use fanflow_testkit::{
    jitter::{jitter, maybe_jitter},
    primes::{count_primes_below, is_prime},
};

fn pipeline(workers: usize) -> Pipeline {
    Pipeline::new(
        PipelineConfig::default()
            .with_workers(workers)
            .with_input_capacity(workers)
            .with_output_capacity(workers),
    )
    .unwrap()
}

/// Results match a sequential filter over the same input, for a spread of
/// worker counts and input sizes.
#[test]
fn test_set_equality_with_sequential_reference() {
    for workers in [1, 2, 3, 8] {
        for n in [0u64, 1, 17, 1000] {
            let p = pipeline(workers);
            let output = p.run(0..n, |x| is_prime(x).then_some(x)).unwrap();
            let got: BTreeSet<u64> = output.results.iter().copied().collect();
            let expected: BTreeSet<u64> = (0..n).filter(|&x| is_prime(x)).collect();
            assert_eq!(got, expected, "workers={workers} n={n}");
            assert_eq!(output.len(), expected.len(), "no duplicates");
            assert_eq!(output.report.items_processed(), n);
            assert_eq!(output.report.shutdown, None);
            assert_eq!(output.report.exit_order.len(), workers);
            assert_eq!(p.liveness().live(), 0);
        }
    }
}

#[test]
fn test_primes_below_one_million() {
    let p = pipeline(10);
    let output = p.run(0..1_000_000u64, |x| is_prime(x).then_some(x)).unwrap();
    assert_eq!(output.len(), 78_498);
    assert_eq!(output.len(), count_primes_below(1_000_000));
    assert_eq!(output.report.source.exit, SourceExit::Exhausted);
    assert_eq!(output.report.source.items_sent, 1_000_000);
    assert!(
        output
            .report
            .workers
            .iter()
            .all(|w| w.exit == WorkerExit::InputExhausted)
    );
    assert_eq!(p.liveness().live(), 0);
}

#[test]
fn test_first_match_yields_exactly_one_result() {
    let threshold = 123_457u64;
    let p = pipeline(8);
    let output = p
        .run_until(
            0u64..,
            move |x| (x == threshold).then_some(x),
            StopCondition::when(move |r: &u64| *r == threshold),
        )
        .unwrap();
    assert_eq!(output.results, vec![threshold]);
    assert_eq!(output.report.shutdown, Some(ShutdownReason::Satisfied));
    assert!(output.stopped_early());
    assert_eq!(p.liveness().live(), 0);
}

#[test]
fn test_early_stop_receives_at_least_m_results() {
    for m in [1usize, 5, 50] {
        let p = pipeline(4);
        let output = p
            .run_until(0u64.., |x| is_prime(x).then_some(x), StopCondition::limit(m))
            .unwrap();
        assert!(output.len() >= m);
        let unique: BTreeSet<u64> = output.results.iter().copied().collect();
        assert_eq!(unique.len(), output.len());
        assert!(output.results.iter().all(|&x| is_prime(x)));
        assert_eq!(p.liveness().live(), 0);
    }
}

#[test]
fn test_trigger_twice_is_harmless() {
    let p = pipeline(4);
    let controller = ShutdownController::new();
    let running = p.spawn_with(0u64.., Some, controller.clone()).unwrap();
    assert!(running.results().next().is_some());
    assert!(controller.trigger());
    assert!(!controller.trigger());
    assert!(!running.shutdown());
    let output = running.join().unwrap();
    assert_eq!(output.report.shutdown, Some(ShutdownReason::Requested));
    assert_eq!(p.liveness().live(), 0);
}

#[test]
fn test_external_cancellation_from_another_thread() {
    let p = pipeline(4);
    let controller = ShutdownController::new();
    let output = thread::scope(|s| {
        let canceller = controller.clone();
        s.spawn(move || {
            thread::sleep(Duration::from_millis(30));
            canceller.trigger();
        });
        p.run_with(
            0u64..,
            |x| (x % 97 == 0).then_some(x),
            StopCondition::Never,
            controller.clone(),
        )
        .unwrap()
    });
    assert_eq!(output.report.shutdown, Some(ShutdownReason::Requested));
    assert!(output.results.iter().all(|x| x % 97 == 0));
    assert_eq!(p.liveness().live(), 0);
}

#[test]
fn test_deadline_on_unbounded_source() {
    let p = Pipeline::new(
        PipelineConfig::default()
            .with_workers(3)
            .with_deadline(Duration::from_millis(40)),
    )
    .unwrap();
    let output = p.run(1u64.., |x| is_prime(x).then_some(x)).unwrap();
    assert_eq!(output.report.shutdown, Some(ShutdownReason::Deadline));
    assert_eq!(output.report.source.exit, SourceExit::Stopped);
    assert!(!output.is_empty());
    assert_eq!(p.liveness().live(), 0);
}

#[test]
fn test_stream_partially_then_drop() {
    let p = pipeline(3);
    let running = p.spawn(0u64.., |x| Some(x * 2)).unwrap();
    let controller = running.controller().clone();
    let first: Vec<u64> = running.results().take(10).collect();
    assert_eq!(first.len(), 10);
    assert!(first.iter().all(|x| x % 2 == 0));
    drop(running);
    assert_eq!(controller.reason(), Some(ShutdownReason::Dropped));
    assert_eq!(p.liveness().live(), 0);
}

#[test]
fn test_concurrent_independent_runs() {
    let p = pipeline(3);
    thread::scope(|s| {
        let handles: Vec<_> = (0..4u64)
            .map(|run| {
                let p = &p;
                s.spawn(move || p.run(0..500u64, move |x| Some(x + run)).unwrap())
            })
            .collect();
        for (run, handle) in handles.into_iter().enumerate() {
            let output = handle.join().unwrap();
            let got: BTreeSet<u64> = output.results.into_iter().collect();
            let expected: BTreeSet<u64> = (0..500).map(|x| x + run as u64).collect();
            assert_eq!(got, expected);
        }
    });
    assert_eq!(p.liveness().live(), 0);
}

/// Random sleeps in the source and the predicate shuffle the interleavings of
/// stop, send and close across repeated runs.
#[test]
fn test_stress_with_jitter() {
    for iteration in 0..30 {
        let workers = fastrand::usize(1..=6);
        let n = fastrand::u64(0..300);
        let stop_after = fastrand::usize(0..20);
        let p = Pipeline::new(
            PipelineConfig::default()
                .with_workers(workers)
                .with_input_capacity(fastrand::usize(1..=4))
                .with_output_capacity(fastrand::usize(1..=4)),
        )
        .unwrap();

        let items = (0..n).inspect(|_| maybe_jitter(8, 200));
        let condition = if iteration % 2 == 0 {
            StopCondition::Never
        } else {
            StopCondition::limit(stop_after)
        };
        let output = p
            .run_until(
                items,
                |x| {
                    jitter(50);
                    (x % 3 == 0).then_some(x)
                },
                condition,
            )
            .unwrap();

        let got: BTreeSet<u64> = output.results.iter().copied().collect();
        assert_eq!(got.len(), output.len(), "duplicate results");
        let expected: BTreeSet<u64> = (0..n).filter(|x| x % 3 == 0).collect();
        assert!(got.is_subset(&expected));
        if output.report.shutdown.is_none() {
            assert_eq!(got, expected);
        } else {
            assert!(output.len() >= stop_after.min(expected.len()));
        }
        assert_eq!(p.liveness().live(), 0, "iteration {iteration}");
    }
}

#[test]
fn test_panicking_predicate_is_reported() {
    let p = pipeline(4);
    let result = p.run(0..1000u32, |x| {
        if x == 500 {
            panic!("predicate failure on {x}");
        }
        Some(x)
    });
    let err: Error = result.unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::WorkerPanicked { .. }));
    assert!(err.is_structural());
    assert_eq!(p.liveness().live(), 0);
}

#[test]
fn test_fallible_predicate_results_are_partitioned() {
    let p = pipeline(4);
    let output = p
        .run(0..100u32, |x| {
            Some(if x % 10 == 0 {
                Err(format!("multiple of ten: {x}"))
            } else {
                Ok(x)
            })
        })
        .unwrap();
    let (ok, failed) = output.partition_results();
    assert_eq!(ok.len(), 90);
    assert_eq!(failed.len(), 10);
    assert!(failed.iter().all(|e| e.starts_with("multiple of ten")));
}

#[test]
fn test_sequenced_results_restore_submission_order() {
    let p = pipeline(6);
    let output = p
        .run(
            sequenced::sequence(0..2000u64),
            sequenced::lift(|x: u64| (x % 7 == 0).then_some(x * 10)),
        )
        .unwrap()
        .into_ordered();
    let expected: Vec<u64> = (0..2000).filter(|x| x % 7 == 0).map(|x| x * 10).collect();
    assert_eq!(output.results, expected);
}

#[test]
fn test_caller_side_accumulator_under_mutex() {
    let p = pipeline(4);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let acc = Arc::clone(&seen);
    let output = p
        .run(0..200u32, move |x| {
            if x % 2 == 0 {
                acc.lock().unwrap().push(x);
            }
            None::<u32>
        })
        .unwrap();
    assert!(output.is_empty());
    let mut seen = seen.lock().unwrap().clone();
    seen.sort_unstable();
    assert_eq!(seen, (0..200).filter(|x| x % 2 == 0).collect::<Vec<_>>());
}
