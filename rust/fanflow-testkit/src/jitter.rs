//! Random short sleeps, to shake out ordering assumptions in concurrent tests.

use std::{thread, time::Duration};

/// Sleeps for a random duration in `[0, max_micros]` microseconds.
pub fn jitter(max_micros: u64) {
    let micros = fastrand::u64(0..=max_micros);
    if micros > 0 {
        thread::sleep(Duration::from_micros(micros));
    }
}

/// Sleeps with probability `1 / one_in`, for at most `max_micros`.
pub fn maybe_jitter(one_in: u32, max_micros: u64) {
    if one_in > 0 && fastrand::u32(0..one_in) == 0 {
        jitter(max_micros);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_jitter_is_bounded() {
        let start = Instant::now();
        for _ in 0..10 {
            jitter(100);
        }
        maybe_jitter(0, 100);
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
