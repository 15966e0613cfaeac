//! Pacing: issuing task invocations at precise target times
//!
//! The pacer turns a target throughput into a timeline of invocation times and
//! calls [`crate::Task::run`] at each of them. Two drivers share the same
//! bookkeeping and differ only in how they wait:
//!
//! - `blocking` owns the calling thread for the whole benchmark. It sleeps for
//!   the bulk of long gaps and spins for the final stretch.
//! - [`cooperative`] exposes the same logic as non-blocking step functions
//!   ([`WarmupHandler`], [`MeasureHandler`]) for an external event loop, which
//!   calls them repeatedly and never waits inside them.
//!
//! # Coordinated omission
//!
//! A benchmark whose task completes on another thread cannot see how long an
//! invocation *should* have waited behind a slow predecessor. When correction is
//! enabled the [`Schedule`] advances an ideal timestamp by one gap per invocation
//! and never resets it to "now"; the task is handed that ideal time. A stall on
//! the pacing thread therefore shows up as latency on every invocation it
//! delayed, not just the one that stalled.
//!
//! With correction disabled the next target is "now plus one gap" and the task
//! receives the actual time at which it was invoked.
//!
//! ```text
//! corrected:   next = next + gap     task.run(next)
//! uncorrected: next = now + gap      task.run(now_after_wait)
//! ```
//!
//! # Run lifecycle
//! 1. Warmup invocations run back to back with the current time.
//! 2. The pacer waits for the collector's warmup latch, optionally pauses, then
//!    calls `warmed_up`.
//! 3. Each run issues `iterations` paced invocations, then drains: it waits,
//!    yielding, until the end-to-end probe has received every sample of the run.
//! 4. Run bookkeeping snapshots every probe and resets the histograms.
//!
//! Aborts are observed between invocations (throttled to one check every
//! [`ABORT_CHECK_MASK`]` + 1` invocations in the blocking loop), inside every
//! wait, and on every drain poll.

pub(crate) mod blocking;
pub mod cooperative;

pub use cooperative::{MeasureHandler, WarmupHandler};
use internals::*;

#[cfg(feature = "internals")]
pub use internals::Schedule;

/// Abort checks in the blocking loop happen when the invocation counter masked
/// with this is zero.
pub const ABORT_CHECK_MASK: u32 = 1024 - 1;

/// Progress lines are never closer together than this many iterations.
const MIN_PROGRESS_MODULUS: u64 = 1_000;

mod internals {
    use super::*;

    /// Target-time bookkeeping shared by both drivers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Schedule {
        next: u64,
        correct: bool,
    }

    impl Schedule {
        /// A schedule whose first invocation is due at `start`.
        pub fn new(start: u64, correct_for_coordinated_omission: bool) -> Self {
            Self {
                next: start,
                correct: correct_for_coordinated_omission,
            }
        }

        /// The time the next invocation is due.
        pub fn next(&self) -> u64 {
            self.next
        }

        pub fn is_due(&self, now: u64) -> bool {
            now >= self.next
        }

        /// Move to the following invocation and return its due time.
        pub fn advance(&mut self, gap: u64, now: u64) -> u64 {
            self.next = if self.correct {
                self.next.saturating_add(gap)
            } else {
                now.saturating_add(gap)
            };
            self.next
        }
    }

    /// Decides when a `... run i out of n` progress line is due.
    ///
    /// A line needs the iteration to be a multiple of both 16 and a modulus that
    /// grows with the iteration count, and enough time since the previous line.
    #[derive(Debug, Clone)]
    pub(crate) struct ProgressThrottle {
        pub(super) modulus: u64,
        pub(super) interval_ns: u64,
        pub(super) last_print: u64,
    }

    impl ProgressThrottle {
        pub(crate) fn new(iterations: u64, now: u64) -> Self {
            let mut modulus = MIN_PROGRESS_MODULUS;
            while modulus <= iterations / 200 {
                modulus *= 10;
            }
            let interval_ns = match iterations {
                n if n > 200_000_000 => 60_000_000_000,
                n if n > 50_000_000 => 20_000_000_000,
                n if n > 10_000_000 => 10_000_000_000,
                _ => 5_000_000_000,
            };
            Self {
                modulus,
                interval_ns,
                last_print: now,
            }
        }

        pub(crate) fn should_print(&mut self, iteration: u64, now: u64) -> bool {
            if iteration % 16 == 0
                && iteration % self.modulus == 0
                && now > self.last_print.saturating_add(self.interval_ns)
            {
                self.last_print = now;
                return true;
            }
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod schedule {
        use super::*;

        #[test]
        fn corrected_schedule_never_resets_to_now() {
            let mut s = Schedule::new(1_000, true);
            // The pacer fell far behind; the ideal timeline is unaffected.
            assert_eq!(s.advance(100, 50_000), 1_100);
            assert_eq!(s.advance(100, 60_000), 1_200);
            assert!(s.is_due(60_000));
        }

        #[test]
        fn uncorrected_schedule_paces_from_now() {
            let mut s = Schedule::new(1_000, false);
            assert_eq!(s.advance(100, 50_000), 50_100);
            assert!(!s.is_due(50_099));
            assert!(s.is_due(50_100));
        }
    }

    mod progress {
        use super::*;

        const SEC: u64 = 1_000_000_000;

        #[test]
        fn modulus_grows_with_iterations() {
            assert_eq!(ProgressThrottle::new(9_000, 0).modulus, 1_000);
            assert_eq!(ProgressThrottle::new(200_000, 0).modulus, 10_000);
            assert_eq!(ProgressThrottle::new(100_000_000, 0).modulus, 1_000_000);
        }

        #[test]
        fn interval_grows_with_iterations() {
            assert_eq!(ProgressThrottle::new(1_000, 0).interval_ns, 5 * SEC);
            assert_eq!(ProgressThrottle::new(20_000_000, 0).interval_ns, 10 * SEC);
            assert_eq!(ProgressThrottle::new(60_000_000, 0).interval_ns, 20 * SEC);
            assert_eq!(ProgressThrottle::new(300_000_000, 0).interval_ns, 60 * SEC);
        }

        #[test]
        fn prints_only_on_modulus_after_interval() {
            let mut p = ProgressThrottle::new(100_000, 0);
            assert!(!p.should_print(1_000, SEC));
            assert!(!p.should_print(1_001, 6 * SEC));
            assert!(p.should_print(2_000, 6 * SEC));
            assert!(!p.should_print(4_000, 7 * SEC));
            assert!(p.should_print(4_000, 12 * SEC));
        }
    }
}
