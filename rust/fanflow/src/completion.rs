//! Completion tracking: closing the output channel after the last worker exits.
//!
//! Each worker owns a [`CompletionGuard`]. When the worker returns, or unwinds,
//! the guard posts exactly one [`CompletionToken`] on a channel with capacity K,
//! so posting never blocks. The tracker thread drains exactly K tokens and only
//! then consumes its [`OutputCloser`], which releases the last output sender it
//! holds. Workers drop their own output senders before their guard fires, so the
//! output channel disconnects at that point and the result sink's loop ends.
//!
//! The tracker does not decide when a run should stop. The one exception is a
//! panicked worker: that is a broken run, and the tracker aborts the rest of it
//! through the [`ShutdownController`] so the other workers do not keep going.

use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use fanflow_common::Result;
use serde::{Deserialize, Serialize};

use crate::{
    liveness::{Liveness, spawn_tracked},
    shutdown::{ShutdownController, ShutdownReason, SignalCloser},
};

/// How a worker left the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerExit {
    /// The input channel was closed and fully drained.
    InputExhausted,
    /// The stop signal was observed.
    Stopped,
    /// Every receiver of the output channel went away.
    OutputClosed,
    /// The predicate panicked.
    Panicked,
}

/// Counters a worker keeps about its own work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStats {
    pub worker: usize,
    pub items_processed: u64,
    pub results_emitted: u64,
    pub exit: WorkerExit,
}

impl WorkerStats {
    pub(crate) fn new(worker: usize) -> WorkerStats {
        WorkerStats {
            worker,
            items_processed: 0,
            results_emitted: 0,
            exit: WorkerExit::Panicked,
        }
    }
}

/// The message a worker posts to the tracker when it exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionToken {
    pub worker: usize,
    pub exit: WorkerExit,
}

/// Creates the completion token channel for `workers` workers.
pub(crate) fn token_channel(
    workers: usize,
) -> (Sender<CompletionToken>, Receiver<CompletionToken>) {
    crossbeam_channel::bounded(workers)
}

/// Posts the owning worker's completion token when dropped.
///
/// The exit defaults to [`WorkerExit::Panicked`] until the worker records how it
/// actually finished, so an unwinding worker is still counted.
pub(crate) struct CompletionGuard {
    token: CompletionToken,
    tokens: Sender<CompletionToken>,
}

impl CompletionGuard {
    pub fn new(worker: usize, tokens: Sender<CompletionToken>) -> CompletionGuard {
        CompletionGuard {
            token: CompletionToken {
                worker,
                exit: WorkerExit::Panicked,
            },
            tokens,
        }
    }

    pub fn set_exit(&mut self, exit: WorkerExit) {
        self.token.exit = exit;
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        // Capacity is one slot per worker, so this cannot block. It only fails
        // if the tracker itself is gone.
        let _ = self.tokens.send(self.token);
    }
}

/// The unique capability to close a run's output channel.
///
/// Holds one output sender. Not `Clone`; [`close`](Self::close) consumes it.
pub struct OutputCloser<R>(Sender<R>);

impl<R> OutputCloser<R> {
    pub(crate) fn new(sender: Sender<R>) -> OutputCloser<R> {
        OutputCloser(sender)
    }

    /// Releases the closer's sender. The output channel disconnects once every
    /// worker has released its own sender as well.
    pub fn close(self) {
        drop(self.0);
    }
}

/// What the tracker observed during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionSummary {
    /// Worker indices in the order their completion tokens arrived.
    pub exit_order: Vec<usize>,
    /// Workers whose token reported [`WorkerExit::Panicked`].
    pub panicked: Vec<usize>,
}

/// Watches K workers and closes the output channel after the last one exits.
pub(crate) struct CompletionTracker<R> {
    workers: usize,
    tokens: Receiver<CompletionToken>,
    closer: OutputCloser<R>,
    done: SignalCloser,
    controller: ShutdownController,
}

impl<R: Send + 'static> CompletionTracker<R> {
    pub fn new(
        workers: usize,
        tokens: Receiver<CompletionToken>,
        closer: OutputCloser<R>,
        done: SignalCloser,
        controller: ShutdownController,
    ) -> CompletionTracker<R> {
        CompletionTracker {
            workers,
            tokens,
            closer,
            done,
            controller,
        }
    }

    pub fn spawn(self, name: String, liveness: &Liveness) -> Result<JoinHandle<CompletionSummary>> {
        spawn_tracked(liveness, name, "tracker", move || self.run())
    }

    /// Drains exactly `workers` tokens, then closes the output and done signals.
    pub fn run(self) -> CompletionSummary {
        let CompletionTracker {
            workers,
            tokens,
            closer,
            done,
            controller,
        } = self;

        let mut summary = CompletionSummary {
            exit_order: Vec::with_capacity(workers),
            panicked: Vec::new(),
        };

        for _ in 0..workers {
            let Ok(token) = tokens.recv() else {
                // Every guard posts before its sender is dropped, so this means a
                // worker was never started.
                log::error!(
                    "completion tokens disconnected after {} of {workers} workers",
                    summary.exit_order.len()
                );
                break;
            };
            log::debug!("worker {} exited: {:?}", token.worker, token.exit);
            if token.exit == WorkerExit::Panicked {
                log::error!("worker {} panicked, aborting the run", token.worker);
                summary.panicked.push(token.worker);
                controller.trigger_with(ShutdownReason::Aborted);
            }
            summary.exit_order.push(token.worker);
        }
        drop(tokens);

        closer.close();
        log::debug!(
            "output channel closed after {} worker exits",
            summary.exit_order.len()
        );
        done.close();
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown::signal_channel;
    use std::{thread, time::Duration};

    fn tracker_for(
        workers: usize,
    ) -> (
        CompletionTracker<u32>,
        Sender<CompletionToken>,
        Sender<u32>,
        Receiver<u32>,
        crate::shutdown::StopSignal,
        ShutdownController,
    ) {
        let (token_tx, token_rx) = token_channel(workers);
        let (out_tx, out_rx) = crossbeam_channel::bounded::<u32>(4);
        let (done_closer, done) = signal_channel();
        let controller = ShutdownController::new();
        let tracker = CompletionTracker::new(
            workers,
            token_rx,
            OutputCloser::new(out_tx.clone()),
            done_closer,
            controller.clone(),
        );
        (tracker, token_tx, out_tx, out_rx, done, controller)
    }

    #[test]
    fn test_guard_posts_token_on_drop() {
        let (tx, rx) = token_channel(1);
        let mut guard = CompletionGuard::new(7, tx);
        guard.set_exit(WorkerExit::InputExhausted);
        drop(guard);
        assert_eq!(
            rx.recv().unwrap(),
            CompletionToken {
                worker: 7,
                exit: WorkerExit::InputExhausted
            }
        );
    }

    #[test]
    fn test_guard_reports_panic_by_default() {
        let (tx, rx) = token_channel(1);
        let handle = thread::spawn::<_, ()>(move || {
            let _guard = CompletionGuard::new(2, tx);
            panic!("predicate failed");
        });
        assert!(handle.join().is_err());
        assert_eq!(rx.recv().unwrap().exit, WorkerExit::Panicked);
    }

    #[test]
    fn test_output_closes_only_after_last_token() {
        const WORKERS: usize = 3;
        let liveness = Liveness::default();
        let (tracker, token_tx, out_tx, out_rx, done, _controller) = tracker_for(WORKERS);
        let handle = tracker.spawn("test-tracker".to_string(), &liveness).unwrap();

        // The "workers" release their output senders before reporting.
        drop(out_tx);
        for worker in 0..WORKERS - 1 {
            token_tx
                .send(CompletionToken {
                    worker,
                    exit: WorkerExit::InputExhausted,
                })
                .unwrap();
        }

        thread::sleep(Duration::from_millis(50));
        assert!(matches!(
            out_rx.try_recv(),
            Err(crossbeam_channel::TryRecvError::Empty)
        ));
        assert!(!done.is_stopped());

        token_tx
            .send(CompletionToken {
                worker: WORKERS - 1,
                exit: WorkerExit::Stopped,
            })
            .unwrap();

        let summary = handle.join().unwrap();
        assert_eq!(summary.exit_order, vec![0, 1, 2]);
        assert!(summary.panicked.is_empty());
        assert!(matches!(
            out_rx.try_recv(),
            Err(crossbeam_channel::TryRecvError::Disconnected)
        ));
        assert!(done.is_stopped());
        assert_eq!(liveness.live(), 0);
    }

    #[test]
    fn test_panicked_worker_aborts_run() {
        let (tracker, token_tx, out_tx, _out_rx, _done, controller) = tracker_for(2);
        drop(out_tx);
        token_tx
            .send(CompletionToken {
                worker: 1,
                exit: WorkerExit::Panicked,
            })
            .unwrap();
        token_tx
            .send(CompletionToken {
                worker: 0,
                exit: WorkerExit::Stopped,
            })
            .unwrap();

        let summary = tracker.run();
        assert_eq!(summary.panicked, vec![1]);
        assert_eq!(summary.exit_order, vec![1, 0]);
        assert_eq!(controller.reason(), Some(ShutdownReason::Aborted));
    }

    #[test]
    fn test_missing_workers_do_not_hang_tracker() {
        let (tracker, token_tx, out_tx, out_rx, done, _controller) = tracker_for(4);
        drop(out_tx);
        token_tx
            .send(CompletionToken {
                worker: 0,
                exit: WorkerExit::InputExhausted,
            })
            .unwrap();
        drop(token_tx);

        let summary = tracker.run();
        assert_eq!(summary.exit_order, vec![0]);
        assert!(out_rx.recv().is_err());
        assert!(done.is_stopped());
    }
}
