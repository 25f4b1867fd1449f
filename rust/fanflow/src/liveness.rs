//! Accounting for the threads a pipeline spawns.
//!
//! Every thread started by a run holds a [`LiveGuard`] for its whole lifetime.
//! The guard is created on the spawning thread before the OS thread exists and
//! released when the thread's closure returns or unwinds, so [`Liveness::live`]
//! never under-counts. After a run has been joined the count is back to what it
//! was before the run started.

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread::{self, JoinHandle},
};

use fanflow_common::{Result, error::Error};

/// A shared counter of live pipeline threads.
#[derive(Clone, Default)]
pub struct Liveness(Arc<AtomicUsize>);

impl Liveness {
    /// Number of threads currently attributed to this counter.
    pub fn live(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn enter(&self) -> LiveGuard {
        self.0.fetch_add(1, Ordering::SeqCst);
        LiveGuard(self.clone())
    }
}

impl std::fmt::Debug for Liveness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Liveness").field(&self.live()).finish()
    }
}

pub(crate) struct LiveGuard(Liveness);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        (self.0).0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Spawns a named thread that is counted by `liveness` while it runs.
///
/// `role` names the kind of thread in spawn errors and log records.
pub(crate) fn spawn_tracked<F, T>(
    liveness: &Liveness,
    name: String,
    role: &'static str,
    f: F,
) -> Result<JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let guard = liveness.enter();
    let thread_name = name.clone();
    thread::Builder::new()
        .name(name)
        .spawn(move || {
            let _guard = guard;
            log::trace!("{role} thread '{thread_name}' starting");
            let res = f();
            log::trace!("{role} thread '{thread_name}' exiting");
            res
        })
        .map_err(|e| Error::spawn(role, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_guard_counts() {
        let liveness = Liveness::default();
        assert_eq!(liveness.live(), 0);
        let a = liveness.enter();
        let b = liveness.clone().enter();
        assert_eq!(liveness.live(), 2);
        drop(a);
        assert_eq!(liveness.live(), 1);
        drop(b);
        assert_eq!(liveness.live(), 0);
    }

    #[test]
    fn test_spawn_tracked_counts_until_join() {
        let liveness = Liveness::default();
        let (tx, rx) = crossbeam_channel::bounded::<()>(0);
        let handle = spawn_tracked(&liveness, "test-tracked".to_string(), "test", move || {
            rx.recv().ok();
            thread::current().name().map(str::to_string)
        })
        .unwrap();

        assert_eq!(liveness.live(), 1);
        drop(tx);
        assert_eq!(handle.join().unwrap().as_deref(), Some("test-tracked"));
        assert_eq!(liveness.live(), 0);
    }

    #[test]
    fn test_guard_released_on_panic() {
        let liveness = Liveness::default();
        let handle = spawn_tracked::<_, ()>(&liveness, "test-panics".to_string(), "test", || {
            thread::sleep(Duration::from_millis(10));
            panic!("boom");
        })
        .unwrap();

        assert!(handle.join().is_err());
        assert_eq!(liveness.live(), 0);
    }
}
