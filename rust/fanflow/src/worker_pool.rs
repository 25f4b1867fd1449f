//! The worker pool: K threads pulling items from a shared input channel.
//!
//! Every blocking operation a worker performs is a `select!` with a `recv` arm on
//! the stop signal, and every iteration starts with a non-blocking stop check.
//! A worker therefore never reads another item once the stop signal is closed,
//! even if the input channel still has buffered items, and never blocks on a
//! full output channel that nobody drains anymore.
//!
//! The predicate returns `Option<R>`: `Some` qualifies the item and is forwarded
//! to the output channel, `None` drops it. Fallible predicates carry their errors
//! inside `R`.

use std::{sync::Arc, thread::JoinHandle};

use crossbeam_channel::{Receiver, Sender, select};
use fanflow_common::Result;

use crate::{
    completion::{CompletionGuard, CompletionToken, WorkerExit, WorkerStats},
    config::PipelineConfig,
    liveness::{Liveness, spawn_tracked},
    shutdown::StopSignal,
};

/// The channel ends and shared state handed to every worker of a run.
pub(crate) struct WorkerPool<'a, T, R, P> {
    pub config: &'a PipelineConfig,
    pub input: &'a Receiver<T>,
    pub output: &'a Sender<R>,
    pub stop: &'a StopSignal,
    pub predicate: &'a Arc<P>,
    pub tokens: &'a Sender<CompletionToken>,
    pub liveness: &'a Liveness,
}

impl<T, R, P> WorkerPool<'_, T, R, P>
where
    T: Send + 'static,
    R: Send + 'static,
    P: Fn(T) -> Option<R> + Send + Sync + 'static,
{
    /// Spawns `config.workers` worker threads, pushing their handles into `handles`.
    ///
    /// On a spawn failure the workers started so far are left in `handles` so the
    /// caller can stop and join them.
    pub fn spawn(&self, handles: &mut Vec<JoinHandle<WorkerStats>>) -> Result<()> {
        for worker in 0..self.config.workers {
            let input = self.input.clone();
            let output = self.output.clone();
            let stop = self.stop.clone();
            let predicate = self.predicate.clone();
            let guard = CompletionGuard::new(worker, self.tokens.clone());
            let handle = spawn_tracked(
                self.liveness,
                self.config.thread_name(&format!("worker-{worker}")),
                "worker",
                move || run_worker(worker, input, output, stop, predicate, guard),
            )?;
            handles.push(handle);
        }
        Ok(())
    }
}

/// Runs one worker to completion.
///
/// `guard` outlives every channel end the worker holds: the output sender is
/// dropped inside [`work_loop`], before the completion token is posted.
fn run_worker<T, R, P>(
    worker: usize,
    input: Receiver<T>,
    output: Sender<R>,
    stop: StopSignal,
    predicate: Arc<P>,
    mut guard: CompletionGuard,
) -> WorkerStats
where
    P: Fn(T) -> Option<R>,
{
    let mut stats = WorkerStats::new(worker);
    stats.exit = work_loop(input, output, &stop, predicate.as_ref(), &mut stats);
    guard.set_exit(stats.exit);
    log::debug!(
        "worker {worker} done: {} items, {} results, {:?}",
        stats.items_processed,
        stats.results_emitted,
        stats.exit
    );
    stats
}

fn work_loop<T, R, P>(
    input: Receiver<T>,
    output: Sender<R>,
    stop: &StopSignal,
    predicate: &P,
    stats: &mut WorkerStats,
) -> WorkerExit
where
    P: Fn(T) -> Option<R>,
{
    loop {
        // `select!` picks randomly among ready arms, so check the stop signal
        // first to never start an item after shutdown.
        if stop.is_stopped() {
            return WorkerExit::Stopped;
        }

        let item = select! {
            recv(input) -> msg => match msg {
                Ok(item) => item,
                Err(_) => return WorkerExit::InputExhausted,
            },
            recv(stop.receiver()) -> _ => return WorkerExit::Stopped,
        };

        stats.items_processed += 1;
        let Some(result) = predicate(item) else {
            continue;
        };

        select! {
            send(output, result) -> res => match res {
                Ok(()) => stats.results_emitted += 1,
                Err(_) => return WorkerExit::OutputClosed,
            },
            recv(stop.receiver()) -> _ => return WorkerExit::Stopped,
        }
    }
}
