//! Process-wide thread counting for leak checks.
//!
//! On Linux the live threads of the process are the entries of
//! `/proc/self/task`. Other platforms report no count, and leak assertions built
//! on it are skipped there.

use std::{
    thread,
    time::{Duration, Instant},
};

/// Returns the number of threads of the current process, or `None` if the
/// platform does not expose it.
pub fn process_thread_count() -> anyhow::Result<Option<usize>> {
    if !cfg!(target_os = "linux") {
        return Ok(None);
    }
    let count = std::fs::read_dir("/proc/self/task")?.count();
    Ok(Some(count))
}

/// Polls the process thread count until it is at most `baseline`, for up to
/// `timeout`. Returns the last observed count.
///
/// Joined threads can linger in `/proc` for a moment after `join` returns, so a
/// single sample right after a run may over-count.
pub fn wait_for_thread_count(baseline: usize, timeout: Duration) -> anyhow::Result<Option<usize>> {
    let deadline = Instant::now() + timeout;
    loop {
        let Some(count) = process_thread_count()? else {
            return Ok(None);
        };
        if count <= baseline || Instant::now() >= deadline {
            return Ok(Some(count));
        }
        thread::sleep(Duration::from_millis(5));
    }
}
