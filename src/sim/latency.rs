//! Latency with jitter for simulated collaborators.

use rand::Rng;
use std::time::Duration;

/// `base_ms` plus a uniformly random jitter in `0..jitter_ms`.
pub fn jittered(base_ms: u64, jitter_ms: u64) -> Duration {
    let jitter = if jitter_ms > 0 {
        rand::thread_rng().gen_range(0..jitter_ms)
    } else {
        0
    };

    Duration::from_millis(base_ms.saturating_add(jitter))
}
