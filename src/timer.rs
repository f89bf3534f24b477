//! Timing harness.
//!
//! Kernels are timed against a [`Clock`] exposing a monotonic microsecond counter. The benchmark
//! uses [`MonotonicClock`]; tests substitute a deterministic clock.

use crate::error::Result;

use std::{hint::black_box, time::Instant};

/// Source of monotonic time with microsecond resolution.
pub trait Clock {
    /// Microseconds elapsed since an arbitrary, fixed origin.
    fn real_usec(&self) -> u64;
}

/// Wall clock backed by [`Instant`].
#[derive(Clone, Copy, Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn real_usec(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }
}

/// Execution times recorded for one kernel.
#[derive(Clone, Debug, PartialEq)]
pub struct Measurement {
    /// Duration in seconds of each meta repetition, averaged over the tight loop.
    pub durations: Vec<f64>,
    /// Result of the last kernel invocation.
    pub result: f32,
}

impl Measurement {
    /// Average duration in seconds.
    pub fn mean(&self) -> f64 {
        if self.durations.is_empty() {
            return 0.0;
        }
        self.durations.iter().sum::<f64>() / self.durations.len() as f64
    }
}

/// Measures the execution time of `kernel`.
///
/// The kernel is run `tight_reps` times in a tight loop for each of the `meta_reps` repetitions;
/// every repetition records the elapsed time divided by `tight_reps`. Each result goes through
/// [`black_box`] so the compiler cannot elide the computation.
pub fn measure<C, F>(
    clock: &C,
    meta_reps: u8,
    tight_reps: u16,
    mut kernel: F,
) -> Result<Measurement>
where
    C: Clock + ?Sized,
    F: FnMut() -> Result<f32>,
{
    let tight_reps = tight_reps.max(1);
    let mut durations = Vec::with_capacity(meta_reps.into());
    let mut result = 0.0;

    for _ in 0..meta_reps {
        let start = clock.real_usec();
        for _ in 0..tight_reps {
            result = black_box(kernel()?);
        }
        let stop = clock.real_usec();

        let elapsed = stop.saturating_sub(start) as f64 / 1e6;
        durations.push(elapsed / f64::from(tight_reps));
    }

    Ok(Measurement { durations, result })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::BenchError;

    use std::cell::Cell;

    /// Clock that advances by a fixed step every time it is read.
    pub(crate) struct SteppingClock {
        now: Cell<u64>,
        step: u64,
    }

    impl SteppingClock {
        pub(crate) fn new(step: u64) -> Self {
            Self {
                now: Cell::new(0),
                step,
            }
        }
    }

    impl Clock for SteppingClock {
        fn real_usec(&self) -> u64 {
            let now = self.now.get();
            self.now.set(now + self.step);
            now
        }
    }

    #[test]
    fn zero_kernel_has_non_negative_duration() {
        let clock = MonotonicClock::new();
        let m = measure(&clock, 3, 1, || Ok(0.0)).unwrap();
        assert_eq!(m.durations.len(), 3);
        assert!(m.durations.iter().all(|&d| d >= 0.0));
        assert_eq!(m.result, 0.0);
    }

    #[test]
    fn averaging_over_trials_matches_a_single_call() {
        let single = measure(&SteppingClock::new(250), 1, 1, || Ok(0.0)).unwrap();
        let repeated = measure(&SteppingClock::new(250), 100, 1, || Ok(0.0)).unwrap();

        assert_eq!(single.mean(), 250e-6);
        assert_eq!(repeated.durations.len(), 100);
        assert!(repeated.durations.iter().all(|&d| d == single.mean()));
        assert!((repeated.mean() - single.mean()).abs() < 1e-12);
    }

    #[test]
    fn tight_loop_divides_elapsed_time() {
        let mut calls = 0;
        let m = measure(&SteppingClock::new(1000), 2, 4, || {
            calls += 1;
            Ok(1.5)
        })
        .unwrap();

        assert_eq!(calls, 8);
        assert_eq!(m.durations, vec![250e-6, 250e-6]);
        assert_eq!(m.result, 1.5);
    }

    #[test]
    fn kernel_errors_abort_the_measurement() {
        let result = measure(&SteppingClock::new(1), 5, 1, || Err(BenchError::NoSamples));
        assert!(matches!(result, Err(BenchError::NoSamples)));
    }

    #[test]
    fn monotonic_clock_never_goes_back() {
        let clock = MonotonicClock::default();
        let a = clock.real_usec();
        let b = clock.real_usec();
        assert!(b >= a);
    }
}
