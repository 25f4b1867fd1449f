//! Pipeline runs: wiring the source, the worker pool, the completion tracker and
//! the result sink together, and joining them again.
//!
//! A run owns everything it creates. The channels, the stop signal and the
//! threads are built fresh by [`Pipeline::spawn_with`], so independent runs,
//! even of the same [`Pipeline`], can proceed concurrently. No thread outlives
//! its run: [`RunningPipeline::join`] joins every thread, and dropping a
//! [`RunningPipeline`] stops the run and joins them as well.
//!
//! ## Channel ownership
//!
//! | Channel    | Writers        | Closed by                              |
//! |------------|----------------|----------------------------------------|
//! | input      | source         | the source, when its sender drops      |
//! | output     | K workers      | the completion tracker, after K exits  |
//! | stop       | nobody         | the [`ShutdownController`]             |
//! | done       | nobody         | the completion tracker                 |
//! | completion | K worker guards| dropped by the tracker after K tokens  |

use std::{
    sync::Arc,
    thread::JoinHandle,
    time::{Duration, Instant},
};

use crossbeam_channel::Receiver;
use fanflow_common::{Result, error::Error};
use serde::{Deserialize, Serialize};

use crate::{
    completion::{self, CompletionSummary, CompletionTracker, OutputCloser, WorkerStats},
    config::PipelineConfig,
    liveness::Liveness,
    shutdown::{self, ShutdownController, ShutdownReason, StopSignal},
    sink::{ResultSink, StopCondition},
    source::{self, SourceExit, SourceStats},
    worker_pool::WorkerPool,
};

/// A configured fan-out/fan-in pipeline.
///
/// `Pipeline` itself holds no threads; each call to one of the `run*` or
/// `spawn*` methods starts an independent run.
///
/// ```rust,no_run
/// use fanflow::{pipeline::Pipeline, sink::StopCondition};
///
/// let pipeline = Pipeline::with_workers(4).unwrap();
///
/// // Natural completion: every even number below 100.
/// let evens = pipeline.run(0..100u32, |x| (x % 2 == 0).then_some(x)).unwrap();
/// assert_eq!(evens.results.len(), 50);
///
/// // Early stop: the first multiple of 7 above 1000 any worker finds.
/// let found = pipeline
///     .run_until(1000u64.., |x| (x % 7 == 0).then_some(x), StopCondition::limit(1))
///     .unwrap();
/// assert!(!found.results.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    liveness: Liveness,
}

impl Pipeline {
    /// Creates a pipeline after validating `config`.
    pub fn new(config: PipelineConfig) -> Result<Pipeline> {
        config.validate()?;
        Ok(Pipeline {
            config,
            liveness: Liveness::default(),
        })
    }

    /// Creates a pipeline with the default configuration and `workers` workers.
    pub fn with_workers(workers: usize) -> Result<Pipeline> {
        Self::new(PipelineConfig::default().with_workers(workers))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Counter of the threads currently running on behalf of this pipeline,
    /// across all of its runs.
    pub fn liveness(&self) -> &Liveness {
        &self.liveness
    }

    /// Runs `predicate` over `items` to natural completion.
    pub fn run<I, T, R, P>(&self, items: I, predicate: P) -> Result<PipelineOutput<R>>
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
        T: Send + 'static,
        R: Send + 'static,
        P: Fn(T) -> Option<R> + Send + Sync + 'static,
    {
        self.run_until(items, predicate, StopCondition::Never)
    }

    /// Runs `predicate` over `items` until the input is exhausted or `condition`
    /// is met by a received result.
    pub fn run_until<I, T, R, P>(
        &self,
        items: I,
        predicate: P,
        condition: StopCondition<R>,
    ) -> Result<PipelineOutput<R>>
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
        T: Send + 'static,
        R: Send + 'static,
        P: Fn(T) -> Option<R> + Send + Sync + 'static,
    {
        self.run_with(items, predicate, condition, ShutdownController::new())
    }

    /// Like [`run_until`](Self::run_until), with a caller-supplied controller so
    /// the run can also be cancelled from another thread.
    pub fn run_with<I, T, R, P>(
        &self,
        items: I,
        predicate: P,
        condition: StopCondition<R>,
        controller: ShutdownController,
    ) -> Result<PipelineOutput<R>>
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
        T: Send + 'static,
        R: Send + 'static,
        P: Fn(T) -> Option<R> + Send + Sync + 'static,
    {
        self.spawn_with(items, predicate, controller)?
            .collect_until(condition)
    }

    /// Starts a run and returns a handle for consuming its results as a stream.
    pub fn spawn<I, T, R, P>(&self, items: I, predicate: P) -> Result<RunningPipeline<R>>
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
        T: Send + 'static,
        R: Send + 'static,
        P: Fn(T) -> Option<R> + Send + Sync + 'static,
    {
        self.spawn_with(items, predicate, ShutdownController::new())
    }

    /// Starts a run stopped by `controller`.
    ///
    /// If any thread fails to spawn, the threads already started are stopped
    /// and joined before the error is returned.
    pub fn spawn_with<I, T, R, P>(
        &self,
        items: I,
        predicate: P,
        controller: ShutdownController,
    ) -> Result<RunningPipeline<R>>
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
        T: Send + 'static,
        R: Send + 'static,
        P: Fn(T) -> Option<R> + Send + Sync + 'static,
    {
        let config = &self.config;
        let started = Instant::now();
        let stop = controller.stop_signal();

        let (input_tx, input_rx) = crossbeam_channel::bounded::<T>(config.input_capacity);
        let (output_tx, output_rx) = crossbeam_channel::bounded::<R>(config.output_capacity);
        let (token_tx, token_rx) = completion::token_channel(config.workers);
        let (done_closer, done) = shutdown::signal_channel();
        let predicate = Arc::new(predicate);
        let mut threads = RunThreads::default();

        let spawned = WorkerPool {
            config,
            input: &input_rx,
            output: &output_tx,
            stop: &stop,
            predicate: &predicate,
            tokens: &token_tx,
            liveness: &self.liveness,
        }
        .spawn(&mut threads.workers);
        // From here on only the workers receive input and post tokens.
        drop((input_rx, token_tx));
        if let Err(e) = spawned {
            return Err(threads.abort(&controller, e));
        }

        // The tracker's closer holds the last output sender outside the workers.
        let tracker = CompletionTracker::new(
            config.workers,
            token_rx,
            OutputCloser::new(output_tx),
            done_closer,
            controller.clone(),
        );
        match tracker.spawn(config.thread_name("tracker"), &self.liveness) {
            Ok(handle) => threads.tracker = Some(handle),
            Err(e) => return Err(threads.abort(&controller, e)),
        }

        match source::spawn_source(
            config.thread_name("source"),
            items.into_iter(),
            input_tx,
            stop,
            &self.liveness,
        ) {
            Ok(handle) => threads.source = Some(handle),
            Err(e) => return Err(threads.abort(&controller, e)),
        }

        if let Some(deadline) = config.deadline {
            match shutdown::spawn_deadline_timer(
                config.thread_name("deadline"),
                deadline,
                controller.clone(),
                done,
                &self.liveness,
            ) {
                Ok(handle) => threads.deadline = Some(handle),
                Err(e) => return Err(threads.abort(&controller, e)),
            }
        }

        log::debug!(
            "pipeline run started: {} workers, input capacity {}, output capacity {}",
            config.workers,
            config.input_capacity,
            config.output_capacity
        );

        Ok(RunningPipeline {
            output: output_rx,
            controller,
            liveness: self.liveness.clone(),
            threads: Some(threads),
            started,
        })
    }
}

/// A run in progress.
///
/// Results can be consumed as they arrive through [`results`](Self::results);
/// [`join`](Self::join) collects whatever is left and joins every thread.
/// Dropping a `RunningPipeline` that was not joined triggers shutdown with
/// [`ShutdownReason::Dropped`] and joins the threads.
pub struct RunningPipeline<R> {
    output: Receiver<R>,
    controller: ShutdownController,
    liveness: Liveness,
    threads: Option<RunThreads>,
    started: Instant,
}

impl<R> RunningPipeline<R> {
    /// Blocking iterator over results in receipt order. It ends when the output
    /// channel is closed, i.e. after every worker has exited.
    pub fn results(&self) -> crossbeam_channel::Iter<'_, R> {
        self.output.iter()
    }

    /// The output channel, for callers that want to `select!` on it.
    pub fn output(&self) -> &Receiver<R> {
        &self.output
    }

    pub fn controller(&self) -> &ShutdownController {
        &self.controller
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.controller.stop_signal()
    }

    /// Requests shutdown of this run. Idempotent.
    pub fn shutdown(&self) -> bool {
        self.controller.trigger()
    }

    pub fn liveness(&self) -> &Liveness {
        &self.liveness
    }

    /// Collects the remaining results, stopping the run once `condition` is met,
    /// and joins every thread of the run.
    pub fn collect_until(mut self, condition: StopCondition<R>) -> Result<PipelineOutput<R>> {
        let mut sink = ResultSink::new(self.controller.clone(), condition);
        let results = sink.drain(&self.output);
        let report = self.finish()?;
        Ok(PipelineOutput { results, report })
    }

    /// Collects the remaining results until natural completion (or an earlier
    /// shutdown) and joins every thread of the run.
    pub fn join(self) -> Result<PipelineOutput<R>> {
        self.collect_until(StopCondition::Never)
    }

    fn finish(&mut self) -> Result<RunReport> {
        let threads = self
            .threads
            .take()
            .ok_or_else(|| Error::invalid_operation("join of a finished run"))?;
        let joined = threads.join();
        if let Some(err) = joined.error {
            return Err(err);
        }
        let report = RunReport {
            source: joined.source,
            workers: joined.workers,
            exit_order: joined.completion.map(|c| c.exit_order).unwrap_or_default(),
            shutdown: self.controller.reason(),
            elapsed: self.started.elapsed(),
        };
        log::debug!(
            "pipeline run finished in {:?}: {} items, {} results, shutdown {:?}",
            report.elapsed,
            report.items_processed(),
            report.results_emitted(),
            report.shutdown
        );
        Ok(report)
    }
}

impl<R> Drop for RunningPipeline<R> {
    fn drop(&mut self) {
        if let Some(threads) = self.threads.take() {
            self.controller.trigger_with(ShutdownReason::Dropped);
            if let Some(err) = threads.join().error {
                log::error!("dropped pipeline run failed: {err}");
            }
        }
    }
}

/// Results of a finished run.
#[derive(Debug, Clone)]
pub struct PipelineOutput<R> {
    /// Results in receipt order.
    pub results: Vec<R>,
    pub report: RunReport,
}

impl<R> PipelineOutput<R> {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// `true` if a shutdown was triggered during the run. The input may still
    /// have been exhausted by then; see [`RunReport::source`] for how far the
    /// source got.
    pub fn stopped_early(&self) -> bool {
        self.report.shutdown.is_some()
    }
}

impl<R, E> PipelineOutput<std::result::Result<R, E>> {
    /// Splits fallible results into successes and failures, each in receipt order.
    pub fn partition_results(self) -> (Vec<R>, Vec<E>) {
        let mut ok = Vec::new();
        let mut failed = Vec::new();
        for result in self.results {
            match result {
                Ok(r) => ok.push(r),
                Err(e) => failed.push(e),
            }
        }
        (ok, failed)
    }
}

/// What happened during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub source: SourceStats,
    /// Per-worker statistics, indexed by worker.
    pub workers: Vec<WorkerStats>,
    /// Worker indices in the order the completion tracker saw them exit.
    pub exit_order: Vec<usize>,
    /// Why the run was stopped early, if it was.
    pub shutdown: Option<ShutdownReason>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn items_processed(&self) -> u64 {
        self.workers.iter().map(|w| w.items_processed).sum()
    }

    pub fn results_emitted(&self) -> u64 {
        self.workers.iter().map(|w| w.results_emitted).sum()
    }
}

/// Join handles of every thread of one run.
#[derive(Default)]
struct RunThreads {
    source: Option<JoinHandle<SourceStats>>,
    workers: Vec<JoinHandle<WorkerStats>>,
    tracker: Option<JoinHandle<CompletionSummary>>,
    deadline: Option<JoinHandle<bool>>,
}

struct JoinedThreads {
    source: SourceStats,
    workers: Vec<WorkerStats>,
    completion: Option<CompletionSummary>,
    /// The first structural failure observed while joining.
    error: Option<Error>,
}

impl RunThreads {
    /// Stops a run that failed to start and joins whatever was spawned.
    fn abort(self, controller: &ShutdownController, err: Error) -> Error {
        log::error!("pipeline run failed to start: {err}");
        controller.trigger_with(ShutdownReason::Aborted);
        self.join();
        err
    }

    /// Joins every thread. Each of them terminates on its own once the input is
    /// exhausted or the stop signal is closed, so the order only affects which
    /// failure is reported first.
    fn join(self) -> JoinedThreads {
        let mut error = None;

        let mut workers = Vec::with_capacity(self.workers.len());
        for (worker, handle) in self.workers.into_iter().enumerate() {
            match handle.join() {
                Ok(stats) => workers.push(stats),
                Err(_) => {
                    log::error!("worker {worker} panicked");
                    error.get_or_insert_with(|| Error::worker_panicked(worker));
                    workers.push(WorkerStats::new(worker));
                }
            }
        }

        let source = match self.source.map(JoinHandle::join) {
            Some(Ok(stats)) => stats,
            Some(Err(_)) => {
                log::error!("source panicked");
                error.get_or_insert_with(Error::source_panicked);
                SourceStats {
                    items_sent: 0,
                    exit: SourceExit::Panicked,
                }
            }
            None => SourceStats {
                items_sent: 0,
                exit: SourceExit::Stopped,
            },
        };

        let completion = match self.tracker.map(JoinHandle::join) {
            Some(Ok(summary)) => Some(summary),
            Some(Err(_)) => {
                log::error!("completion tracker panicked");
                error.get_or_insert_with(Error::tracker_panicked);
                None
            }
            None => None,
        };

        if let Some(Err(_)) = self.deadline.map(JoinHandle::join) {
            log::error!("deadline timer panicked");
        }

        JoinedThreads {
            source,
            workers,
            completion,
            error,
        }
    }
}
