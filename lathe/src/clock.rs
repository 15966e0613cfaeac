//! Monotonic nanosecond clock and the coarse/fine wait primitives used by the pacer.
//!
//! All timestamps handed to a [`crate::Task`] come from [`nano_time`], which counts
//! nanoseconds from a process-wide epoch fixed on first use. Tasks should measure
//! latency against the same clock.

use std::{
    sync::OnceLock,
    thread,
    time::{Duration, Instant},
};

/// Remaining waits shorter than this are spun rather than slept.
pub const SPIN_WINDOW_NS: u64 = 2_000_000;

const NANOS_PER_MILLI: u64 = 1_000_000;

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Nanoseconds elapsed since the process-wide clock epoch.
#[inline]
pub fn nano_time() -> u64 {
    let epoch = EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_nanos() as u64
}

/// Sleep for `duration`, waking early if the thread is unparked.
///
/// Parking instead of `thread::sleep` lets an abort cut a long pause short.
pub fn pause(duration: Duration) {
    if !duration.is_zero() {
        thread::park_timeout(duration);
    }
}

/// Park until `duration` has fully elapsed or `stop` returns true.
///
/// Unlike [`pause`], spurious or stale wakeups do not cut the wait short.
pub fn pause_for(duration: Duration, stop: impl Fn() -> bool) {
    let deadline = Instant::now() + duration;
    loop {
        if stop() {
            return;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return;
        }
        thread::park_timeout(remaining);
    }
}

/// Spin until [`nano_time`] reaches `deadline`, or until `stop` returns true.
#[inline]
pub fn busy_wait_until(deadline: u64, stop: impl Fn() -> bool) {
    while nano_time() < deadline {
        if stop() {
            return;
        }
        std::hint::spin_loop();
    }
}

/// Wait until `deadline` using a coarse sleep for the bulk of the wait and a busy
/// spin for the final stretch.
///
/// OS sleeps overshoot by up to a few milliseconds, so the sleep stops
/// [`SPIN_WINDOW_NS`] short of the deadline and the remainder is spun.
pub fn wait_until(deadline: u64, stop: impl Fn() -> bool) {
    loop {
        let now = nano_time();
        if now >= deadline || stop() {
            return;
        }
        let coarse_ms = (deadline - now).saturating_sub(SPIN_WINDOW_NS) / NANOS_PER_MILLI;
        if coarse_ms == 0 {
            break;
        }
        // A spurious unpark just sends us round again.
        pause(Duration::from_millis(coarse_ms));
    }
    busy_wait_until(deadline, stop);
}
