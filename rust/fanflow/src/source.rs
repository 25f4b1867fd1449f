//! The work item source: the only writer, and the only closer, of the input channel.
//!
//! The source thread owns the single input [`Sender`]. It is moved into the thread
//! and dropped when the thread's function returns, on every path: exhaustion, an
//! observed stop, all workers gone, or unwinding out of the caller's iterator.
//! Dropping it is what closes the input channel, and that close is the workers'
//! natural completion signal.

use std::thread::JoinHandle;

use crossbeam_channel::{Sender, select};
use fanflow_common::Result;
use serde::{Deserialize, Serialize};

use crate::{
    liveness::{Liveness, spawn_tracked},
    shutdown::StopSignal,
};

/// How the source finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceExit {
    /// The item sequence ran out.
    Exhausted,
    /// The stop signal was observed.
    Stopped,
    /// Every worker had left, so nobody could receive more items.
    Abandoned,
    /// The item iterator panicked.
    Panicked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceStats {
    pub items_sent: u64,
    pub exit: SourceExit,
}

/// Spawns the source thread for `items`.
pub(crate) fn spawn_source<I, T>(
    name: String,
    items: I,
    input: Sender<T>,
    stop: StopSignal,
    liveness: &Liveness,
) -> Result<JoinHandle<SourceStats>>
where
    I: Iterator<Item = T> + Send + 'static,
    T: Send + 'static,
{
    spawn_tracked(liveness, name, "source", move || produce(items, input, &stop))
}

/// Sends every item of `items` on `input` until the sequence ends or a stop is
/// observed, then closes `input` by dropping it.
pub(crate) fn produce<I, T>(items: I, input: Sender<T>, stop: &StopSignal) -> SourceStats
where
    I: Iterator<Item = T>,
{
    let mut stats = SourceStats {
        items_sent: 0,
        exit: SourceExit::Exhausted,
    };

    for item in items {
        if stop.is_stopped() {
            stats.exit = SourceExit::Stopped;
            break;
        }
        select! {
            send(input, item) -> res => {
                if res.is_err() {
                    stats.exit = SourceExit::Abandoned;
                    break;
                }
                stats.items_sent += 1;
            },
            recv(stop.receiver()) -> _ => {
                stats.exit = SourceExit::Stopped;
                break;
            },
        }
    }

    drop(input);
    log::debug!(
        "source closed input after {} items: {:?}",
        stats.items_sent,
        stats.exit
    );
    stats
}
