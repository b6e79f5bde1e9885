use std::{sync::atomic::AtomicU64, time::Duration};

use crossbeam::utils::CachePadded;
use quanta::{Clock, Instant};

use crate::atomic_extension::AtomicExtension;

/// Monotonic start mark for one timed region.
pub struct Stopwatch<'c> {
    clock: &'c Clock,
    start: Instant,
}

impl<'c> Stopwatch<'c> {
    #[inline]
    pub fn start(clock: &'c Clock) -> Self {
        Self {
            clock,
            start: clock.now(),
        }
    }

    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.clock.now() - self.start
    }
}

/// Fine-grained timing of a single read or write call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallTiming {
    pub iteration: usize,
    pub connection: usize,
    pub call: usize,
    pub bytes: usize,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationTiming {
    pub worker_id: usize,
    pub iteration: usize,
    pub elapsed: Duration,
}

/// Pre-sized per-(iteration, worker) elapsed-time slots.
///
/// Each worker only stores into its own column. Readers must wait until every
/// worker has crossed the barrier that closes an iteration.
pub struct TimingBoard {
    workers: usize,
    iterations: usize,
    slots: Box<[CachePadded<AtomicU64>]>,
}

impl TimingBoard {
    pub fn new(workers: usize, iterations: usize) -> Self {
        let slots = (0..workers * iterations)
            .map(|_| CachePadded::new(AtomicU64::new(0)))
            .collect();

        Self {
            workers,
            iterations,
            slots,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    #[inline]
    fn slot(&self, iteration: usize, worker_id: usize) -> &AtomicU64 {
        assert!(worker_id < self.workers && iteration < self.iterations);
        &self.slots[iteration * self.workers + worker_id]
    }

    pub fn record(&self, timing: IterationTiming) {
        let nanos = u64::try_from(timing.elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.slot(timing.iteration, timing.worker_id)
            .store_release(nanos);
    }

    pub fn get(&self, iteration: usize, worker_id: usize) -> Duration {
        Duration::from_nanos(self.slot(iteration, worker_id).load_acquire())
    }

    /// Slowest worker of one iteration, which bounds that iteration's latency.
    pub fn iteration_max(&self, iteration: usize) -> Duration {
        (0..self.workers)
            .map(|worker_id| self.get(iteration, worker_id))
            .max()
            .unwrap_or_default()
    }

    pub fn summarize(&self, warmup: usize) -> TimingSummary {
        let maxima: Vec<Duration> = (0..self.iterations)
            .map(|iteration| self.iteration_max(iteration))
            .collect();

        TimingSummary::from_maxima(maxima, warmup)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingSummary {
    pub warmup: usize,
    /// Per-iteration maximum across workers, warmup included.
    pub maxima: Vec<Duration>,
    /// Mean of the maxima after the warmup window, if any iteration is left.
    pub mean: Option<Duration>,
}

impl TimingSummary {
    pub fn from_maxima(maxima: Vec<Duration>, warmup: usize) -> Self {
        let measured = maxima.get(warmup..).unwrap_or_default();

        let mean = u32::try_from(measured.len())
            .ok()
            .filter(|&count| count > 0)
            .map(|count| measured.iter().sum::<Duration>() / count);

        Self {
            warmup,
            maxima,
            mean,
        }
    }

    pub fn measured(&self) -> usize {
        self.maxima.len().saturating_sub(self.warmup)
    }
}
