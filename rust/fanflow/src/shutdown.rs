//! Broadcast-by-close cancellation for a pipeline run.
//!
//! A run has exactly one stop channel. Nothing is ever sent on it: its item type
//! is the uninhabited [`Signal`], so the only thing that can happen to it is that
//! its single [`Sender`] is dropped. Every [`StopSignal`] clone then observes the
//! disconnect, either through a non-blocking [`StopSignal::is_stopped`] check or
//! through a `recv` arm in a `crossbeam_channel::select!`.
//!
//! The sender lives inside the [`ShutdownController`]. Triggering takes it out of
//! an `Option` under a mutex and drops it, so the channel is closed exactly once
//! no matter how many threads call [`ShutdownController::trigger`] or how often.
//!
//! The same primitive, owned by a [`SignalCloser`], is used for the run's `done`
//! signal that the completion tracker closes once every worker has exited.

use std::{
    sync::{Arc, Mutex, OnceLock, PoisonError},
    thread::JoinHandle,
    time::Duration,
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, select};
use fanflow_common::Result;
use serde::{Deserialize, Serialize};

use crate::liveness::{Liveness, spawn_tracked};

/// Payload type of a signal channel. It has no values, so a signal channel can
/// only ever be closed, never written to.
#[derive(Debug)]
pub enum Signal {}

/// Why a run was asked to stop early.
///
/// Only the first trigger of a run records its reason; later triggers are no-ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownReason {
    /// An external caller invoked [`ShutdownController::trigger`].
    Requested,
    /// The result sink's stop condition was met.
    Satisfied,
    /// The configured deadline elapsed before the run completed.
    Deadline,
    /// A [`RunningPipeline`](crate::pipeline::RunningPipeline) was dropped
    /// before it was joined.
    Dropped,
    /// The run could not continue: a worker panicked or a thread failed to spawn.
    Aborted,
}

impl std::fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ShutdownReason::Requested => "requested",
            ShutdownReason::Satisfied => "satisfied",
            ShutdownReason::Deadline => "deadline",
            ShutdownReason::Dropped => "dropped",
            ShutdownReason::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// Creates a signal channel, returning its single closer and a cloneable reader.
pub(crate) fn signal_channel() -> (SignalCloser, StopSignal) {
    let (tx, rx) = crossbeam_channel::bounded::<Signal>(0);
    (SignalCloser(tx), StopSignal(rx))
}

/// The unique closing capability of a signal channel.
///
/// Not `Clone`: whoever holds it is the only role that can close the channel,
/// and [`close`](Self::close) consumes it.
pub(crate) struct SignalCloser(Sender<Signal>);

impl SignalCloser {
    pub fn close(self) {
        drop(self.0);
    }
}

/// The read side of a signal channel.
///
/// Cloning is cheap. Once the channel is closed every clone reports it forever.
#[derive(Clone)]
pub struct StopSignal(Receiver<Signal>);

impl StopSignal {
    /// Non-blocking check: `true` once the signal channel has been closed.
    pub fn is_stopped(&self) -> bool {
        match self.0.try_recv() {
            Ok(never) => match never {},
            Err(TryRecvError::Empty) => false,
            Err(TryRecvError::Disconnected) => true,
        }
    }

    /// Blocks until the signal channel is closed.
    pub fn wait(&self) {
        match self.0.recv() {
            Ok(never) => match never {},
            Err(_) => {}
        }
    }

    /// Blocks until the signal channel is closed or `timeout` elapses.
    ///
    /// Returns `true` if the signal was observed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        match self.0.recv_timeout(timeout) {
            Ok(never) => match never {},
            Err(RecvTimeoutError::Timeout) => false,
            Err(RecvTimeoutError::Disconnected) => true,
        }
    }

    /// The underlying receiver, for use as a `recv` arm in `select!`.
    pub(crate) fn receiver(&self) -> &Receiver<Signal> {
        &self.0
    }
}

impl std::fmt::Debug for StopSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopSignal")
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// The single authority that can stop a pipeline run early.
///
/// `ShutdownController` is cheap to clone and all clones control the same stop
/// channel, so the result sink, an external caller and the deadline timer can
/// each hold one. A controller belongs to one run: once triggered it stays
/// triggered, and a run started with an already triggered controller stops
/// immediately.
#[derive(Clone)]
pub struct ShutdownController {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    closer: Mutex<Option<SignalCloser>>,
    reason: OnceLock<ShutdownReason>,
    signal: StopSignal,
}

impl ShutdownController {
    /// Creates a controller with a fresh, open stop channel.
    pub fn new() -> ShutdownController {
        let (closer, signal) = signal_channel();
        ShutdownController {
            inner: Arc::new(ControllerInner {
                closer: Mutex::new(Some(closer)),
                reason: OnceLock::new(),
                signal,
            }),
        }
    }

    /// Returns a reader for this controller's stop channel.
    pub fn stop_signal(&self) -> StopSignal {
        self.inner.signal.clone()
    }

    /// Requests shutdown with [`ShutdownReason::Requested`].
    ///
    /// Idempotent. Returns `true` only for the call that actually closed the
    /// stop channel.
    pub fn trigger(&self) -> bool {
        self.trigger_with(ShutdownReason::Requested)
    }

    /// Requests shutdown, recording `reason` if this is the first trigger.
    ///
    /// Idempotent. Returns `true` only for the call that actually closed the
    /// stop channel.
    pub fn trigger_with(&self, reason: ShutdownReason) -> bool {
        let closer = self
            .inner
            .closer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match closer {
            Some(closer) => {
                // Record before closing so anyone who observes the stop can read the reason.
                let _ = self.inner.reason.set(reason);
                closer.close();
                log::info!("pipeline shutdown triggered ({reason})");
                true
            }
            None => {
                log::trace!("pipeline shutdown already triggered, ignoring {reason}");
                false
            }
        }
    }

    /// Returns `true` once any clone of this controller has been triggered.
    pub fn is_triggered(&self) -> bool {
        self.inner.signal.is_stopped()
    }

    /// The reason recorded by the first trigger, if any.
    pub fn reason(&self) -> Option<ShutdownReason> {
        self.inner.reason.get().copied()
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ShutdownController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownController")
            .field("triggered", &self.is_triggered())
            .field("reason", &self.reason())
            .finish()
    }
}

/// Spawns the optional deadline timer of a run.
///
/// The timer triggers `controller` with [`ShutdownReason::Deadline`] when
/// `deadline` elapses, unless the run was stopped or completed first. It
/// returns whether it fired.
pub(crate) fn spawn_deadline_timer(
    name: String,
    deadline: Duration,
    controller: ShutdownController,
    done: StopSignal,
    liveness: &Liveness,
) -> Result<JoinHandle<bool>> {
    let stop = controller.stop_signal();
    spawn_tracked(liveness, name, "deadline", move || {
        let timeout = crossbeam_channel::after(deadline);
        select! {
            recv(stop.receiver()) -> _ => false,
            recv(done.receiver()) -> _ => false,
            recv(timeout) -> _ => controller.trigger_with(ShutdownReason::Deadline),
        }
    })
}
