use std::{
    panic::resume_unwind,
    thread::{self, Scope, ScopedJoinHandle},
};

use quanta::Clock;

use crate::{
    affinity::{pin_current, CoreBinder},
    error::LaunchError,
};

use super::{transmit, TransmissionTask, TransmitReport};

/// A transmission launched for one trigger event.
pub enum InFlight<'scope> {
    /// Nothing was launched, or the launch failed. Joining returns at once.
    NotStarted,
    Running(ScopedJoinHandle<'scope, TransmitReport>),
}

impl<'scope> InFlight<'scope> {
    pub fn is_started(&self) -> bool {
        matches!(self, InFlight::Running(_))
    }

    /// Blocks until the transmission thread exits.
    pub fn join(self) -> Option<TransmitReport> {
        match self {
            InFlight::NotStarted => None,
            InFlight::Running(handle) => match handle.join() {
                Ok(report) => Some(report),
                Err(panic) => resume_unwind(panic),
            },
        }
    }
}

/// Spawns a thread that pins itself, runs `task` once, and exits.
///
/// If the spawn fails the task, and its payload, is dropped before returning.
pub fn launch<'scope, 'env>(
    scope: &'scope Scope<'scope, 'env>,
    task: TransmissionTask<'env>,
    binder: &'env dyn CoreBinder,
    clock: &'env Clock,
) -> Result<InFlight<'scope>, LaunchError> {
    let worker_id = task.worker_id;

    thread::Builder::new()
        .name(format!("oneshot-{}", worker_id))
        .spawn_scoped(scope, move || {
            pin_current(binder, "oneshot", worker_id, task.core_id);
            transmit(task, clock)
        })
        .map(InFlight::Running)
        .map_err(|source| LaunchError::Spawn {
            worker: worker_id,
            source,
        })
}
