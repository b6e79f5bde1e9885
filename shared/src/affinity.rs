use std::ops::Range;

use tracing::{debug, warn};

use crate::error::{AffinityError, ConfigError};

/// Capability to restrict the calling thread to a single core.
///
/// Pinning is a performance hint. Callers log a failure and keep running.
pub trait CoreBinder: Send + Sync {
    fn try_pin(&self, core_id: usize) -> Result<(), AffinityError>;
}

/// Pins through `sched_setaffinity` on the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct SchedBinder;

impl CoreBinder for SchedBinder {
    #[cfg(target_os = "linux")]
    fn try_pin(&self, core_id: usize) -> Result<(), AffinityError> {
        use nix::{
            sched::{sched_setaffinity, CpuSet},
            unistd::Pid,
        };

        let available = online_cores().ok_or(AffinityError::NotSupported)?;
        if core_id >= available {
            return Err(AffinityError::InvalidCore {
                core: core_id,
                available,
            });
        }

        let mut cpu_set = CpuSet::new();
        cpu_set
            .set(core_id)
            .map_err(|source| AffinityError::Rejected {
                core: core_id,
                source,
            })?;

        // pid 0 is the calling thread
        sched_setaffinity(Pid::from_raw(0), &cpu_set).map_err(|source| {
            AffinityError::Rejected {
                core: core_id,
                source,
            }
        })
    }

    #[cfg(not(target_os = "linux"))]
    fn try_pin(&self, _core_id: usize) -> Result<(), AffinityError> {
        Err(AffinityError::NotSupported)
    }
}

/// Declines every request. Used where pinning is unwanted, e.g. in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBinder;

impl CoreBinder for NoopBinder {
    fn try_pin(&self, _core_id: usize) -> Result<(), AffinityError> {
        Err(AffinityError::NotSupported)
    }
}

/// Pins the calling thread and logs the result. Returns whether the pin held.
pub fn pin_current(binder: &dyn CoreBinder, role: &str, worker: usize, core: usize) -> bool {
    match binder.try_pin(core) {
        Ok(()) => {
            debug!(role, worker, core, "thread pinned");
            true
        }
        Err(err) => {
            warn!(role, worker, core, %err, "running unpinned");
            false
        }
    }
}

#[cfg(target_os = "linux")]
pub fn online_cores() -> Option<usize> {
    use nix::unistd::{sysconf, SysconfVar};

    sysconf(SysconfVar::_NPROCESSORS_ONLN)
        .ok()
        .flatten()
        .and_then(|count| usize::try_from(count).ok())
        .filter(|&count| count > 0)
}

#[cfg(not(target_os = "linux"))]
pub fn online_cores() -> Option<usize> {
    std::thread::available_parallelism().ok().map(|n| n.get())
}

/// Core the calling thread is executing on right now, if the host reports it.
pub fn current_cpu() -> Option<usize> {
    #[cfg(target_os = "linux")]
    {
        nix::sched::sched_getcpu().ok()
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreAssignment {
    pub worker_id: usize,
    pub core_id: usize,
}

/// Disjoint core ranges for the compute team and its transmission tasks.
///
/// Worker `w` computes on `compute_base + w` and transmits on
/// `transmit_base + w`. Ids past the host's core count are allowed here; the
/// binder reports them at pin time.
#[derive(Debug, Clone)]
pub struct CorePlan {
    compute: Range<usize>,
    transmit: Range<usize>,
}

impl CorePlan {
    pub fn new(
        compute_base: usize,
        transmit_base: usize,
        workers: usize,
    ) -> Result<Self, ConfigError> {
        if workers == 0 {
            return Err(ConfigError::NoWorkers);
        }

        let compute = compute_base..compute_base + workers;
        let transmit = transmit_base..transmit_base + workers;

        if compute.start < transmit.end && transmit.start < compute.end {
            return Err(ConfigError::OverlappingCores { compute, transmit });
        }

        Ok(Self { compute, transmit })
    }

    pub fn workers(&self) -> usize {
        self.compute.len()
    }

    pub fn compute_core(&self, worker_id: usize) -> CoreAssignment {
        CoreAssignment {
            worker_id,
            core_id: self.compute.start + worker_id,
        }
    }

    pub fn transmit_core(&self, worker_id: usize) -> CoreAssignment {
        CoreAssignment {
            worker_id,
            core_id: self.transmit.start + worker_id,
        }
    }

    pub fn compute_cores(&self) -> Range<usize> {
        self.compute.clone()
    }

    pub fn transmit_cores(&self) -> Range<usize> {
        self.transmit.clone()
    }
}
