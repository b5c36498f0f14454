use rand::Rng;
use std::thread;
use std::time::{Duration, Instant};

/// Longest uninterrupted wait; pause and stop requests are seen within this.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Pick a sleep uniformly from `[min_secs, max_secs]`.
pub fn random_interval<R: Rng + ?Sized>(rng: &mut R, min_secs: f64, max_secs: f64) -> Duration {
    let secs = if max_secs > min_secs {
        rng.gen_range(min_secs..=max_secs)
    } else {
        min_secs
    };
    Duration::from_secs_f64(secs.max(0.0))
}

/// Sleep for `total` in slices of at most `POLL_INTERVAL`, returning early
/// (with `true`) once `interrupted` reports a pending request.
pub fn sleep_interruptible(total: Duration, interrupted: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + total;
    loop {
        if interrupted() {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        thread::sleep((deadline - now).min(POLL_INTERVAL));
    }
}
