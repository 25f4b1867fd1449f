//! Submission-order tagging for results.
//!
//! Workers finish in arbitrary order, so a run's results arrive in receipt
//! order. Tagging each item with its position in the input sequence lets the
//! caller restore submission order after the run:
//!
//! ```rust,no_run
//! use fanflow::{pipeline::Pipeline, sequenced};
//!
//! let pipeline = Pipeline::with_workers(4).unwrap();
//! let output = pipeline
//!     .run(sequenced::sequence(0..100u32), sequenced::lift(|x: u32| Some(x * x)))
//!     .unwrap()
//!     .into_ordered();
//! assert_eq!(output.results[3], 9);
//! ```

use crate::pipeline::PipelineOutput;

/// A value tagged with its position in the input sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Sequenced<T> {
    pub seq: u64,
    pub value: T,
}

impl<T> Sequenced<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Sequenced<U> {
        Sequenced {
            seq: self.seq,
            value: f(self.value),
        }
    }
}

/// Iterator adapter returned by [`sequence`].
#[derive(Debug, Clone)]
pub struct Sequence<I> {
    inner: I,
    next: u64,
}

impl<I: Iterator> Iterator for Sequence<I> {
    type Item = Sequenced<I::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        let value = self.inner.next()?;
        let seq = self.next;
        self.next += 1;
        Some(Sequenced { seq, value })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// Tags every item of `items` with its zero-based position.
pub fn sequence<I: IntoIterator>(items: I) -> Sequence<I::IntoIter> {
    Sequence {
        inner: items.into_iter(),
        next: 0,
    }
}

/// Adapts a predicate over `T` into one over `Sequenced<T>` that carries the
/// sequence number through to the result.
pub fn lift<T, R, P>(predicate: P) -> impl Fn(Sequenced<T>) -> Option<Sequenced<R>> + Send + Sync
where
    P: Fn(T) -> Option<R> + Send + Sync,
{
    move |item: Sequenced<T>| {
        let seq = item.seq;
        predicate(item.value).map(|value| Sequenced { seq, value })
    }
}

impl<R> PipelineOutput<Sequenced<R>> {
    /// Sorts the results back into submission order and strips the tags.
    pub fn into_ordered(self) -> PipelineOutput<R> {
        let mut results = self.results;
        results.sort_unstable_by_key(|r| r.seq);
        PipelineOutput {
            results: results.into_iter().map(|r| r.value).collect(),
            report: self.report,
        }
    }
}
