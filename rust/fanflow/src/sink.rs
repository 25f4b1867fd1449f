//! The result sink: the single consumer of the output channel.
//!
//! The sink reads until the output channel is closed by the completion tracker.
//! Its [`StopCondition`] may decide that it has seen enough, in which case it
//! triggers the run's [`ShutdownController`] once and keeps draining. It keeps
//! every result it receives, so after an early stop the results include at least
//! the ones that satisfied the condition, plus whatever was already in flight.

use crossbeam_channel::Receiver;

use crate::shutdown::{ShutdownController, ShutdownReason};

/// When a sink should ask the pipeline to stop.
pub enum StopCondition<R> {
    /// Never; consume until natural completion.
    Never,
    /// Stop as soon as a received result satisfies the predicate.
    When(Box<dyn FnMut(&R) -> bool + Send>),
    /// Stop once this many results have been received.
    Limit(usize),
}

impl<R> StopCondition<R> {
    pub fn when(f: impl FnMut(&R) -> bool + Send + 'static) -> Self {
        StopCondition::When(Box::new(f))
    }

    pub fn limit(count: usize) -> Self {
        StopCondition::Limit(count)
    }

    /// `true` if the condition holds before anything was received.
    fn is_met_upfront(&self) -> bool {
        matches!(self, StopCondition::Limit(0))
    }

    /// `true` if `result`, the `received`th result, satisfies the condition.
    fn is_met(&mut self, result: &R, received: usize) -> bool {
        match self {
            StopCondition::Never => false,
            StopCondition::When(f) => f(result),
            StopCondition::Limit(n) => received >= *n,
        }
    }
}

impl<R> Default for StopCondition<R> {
    fn default() -> Self {
        StopCondition::Never
    }
}

impl<R> std::fmt::Debug for StopCondition<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopCondition::Never => f.write_str("Never"),
            StopCondition::When(_) => f.write_str("When(..)"),
            StopCondition::Limit(n) => f.debug_tuple("Limit").field(n).finish(),
        }
    }
}

/// Aggregates a run's results on the calling thread.
pub struct ResultSink<R> {
    controller: ShutdownController,
    condition: StopCondition<R>,
    triggered: bool,
}

impl<R> ResultSink<R> {
    pub fn new(controller: ShutdownController, condition: StopCondition<R>) -> ResultSink<R> {
        ResultSink {
            controller,
            condition,
            triggered: false,
        }
    }

    /// Whether this sink has triggered the shutdown.
    pub fn triggered(&self) -> bool {
        self.triggered
    }

    /// Consumes `output` until it is closed and returns everything received,
    /// in receipt order.
    pub fn drain(&mut self, output: &Receiver<R>) -> Vec<R> {
        let mut results = Vec::new();
        if self.condition.is_met_upfront() {
            self.trigger();
        }
        for result in output.iter() {
            if !self.triggered && self.condition.is_met(&result, results.len() + 1) {
                self.trigger();
            }
            results.push(result);
        }
        log::debug!("sink drained {} results", results.len());
        results
    }

    fn trigger(&mut self) {
        self.triggered = true;
        self.controller.trigger_with(ShutdownReason::Satisfied);
    }
}
