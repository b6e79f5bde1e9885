use std::{
    mem,
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    thread::{self, Scope, ScopedJoinHandle},
};

use quanta::Clock;
use tracing::debug;

use crate::{
    affinity::{pin_current, CoreBinder},
    error::LaunchError,
};

use super::{transmit, TransmissionTask, TransmitReport};

enum Slot<'c> {
    Idle,
    Pending(TransmissionTask<'c>),
    /// The pooled thread has taken the request and is on the wire.
    Busy,
    Exiting,
}

struct State<'c> {
    slot: Slot<'c>,
    finished: Option<TransmitReport>,
    served: usize,
}

impl State<'_> {
    fn is_occupied(&self) -> bool {
        matches!(self.slot, Slot::Pending(_) | Slot::Busy)
    }
}

/// Capacity-1 request record shared by a compute worker and its pooled
/// transmission thread.
///
/// Every wait re-checks its predicate under the lock, so neither a spurious
/// wakeup nor a signal sent before the waiter parked can lose a request.
pub struct Mailbox<'c> {
    state: Mutex<State<'c>>,
    signal: Condvar,
}

impl<'c> Default for Mailbox<'c> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'c> Mailbox<'c> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                slot: Slot::Idle,
                finished: None,
                served: 0,
            }),
            signal: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<'c>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait_while<'a>(
        &'a self,
        guard: MutexGuard<'a, State<'c>>,
        condition: impl FnMut(&mut State<'c>) -> bool,
    ) -> MutexGuard<'a, State<'c>> {
        self.signal
            .wait_while(guard, condition)
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Places `task` in the slot once it is free. A pending request is never
    /// overwritten.
    pub fn submit(&self, task: TransmissionTask<'c>) -> Result<(), LaunchError> {
        let mut state = self.wait_while(self.lock(), |state| state.is_occupied());

        if matches!(state.slot, Slot::Exiting) {
            return Err(LaunchError::TransmitterGone {
                worker: task.worker_id,
            });
        }

        state.slot = Slot::Pending(task);
        self.signal.notify_all();
        Ok(())
    }

    /// Parks until a request arrives. Returns `None` once the mailbox is closed.
    pub fn take(&self) -> Option<TransmissionTask<'c>> {
        let mut state = self.wait_while(self.lock(), |state| {
            !matches!(state.slot, Slot::Pending(_) | Slot::Exiting)
        });

        match mem::replace(&mut state.slot, Slot::Busy) {
            Slot::Pending(task) => Some(task),
            other => {
                state.slot = other;
                None
            }
        }
    }

    pub fn complete(&self, report: TransmitReport) {
        let mut state = self.lock();
        state.finished = Some(report);
        state.served += 1;
        if matches!(state.slot, Slot::Busy) {
            state.slot = Slot::Idle;
        }
        self.signal.notify_all();
    }

    /// Blocks until no request is pending or on the wire, then hands back the
    /// report of the last finished request, if it was not collected yet.
    pub fn wait_idle(&self) -> Option<TransmitReport> {
        let mut state = self.wait_while(self.lock(), |state| state.is_occupied());
        state.finished.take()
    }

    /// Lets any outstanding request finish, then tells the pooled thread to exit.
    pub fn close(&self) {
        let mut state = self.wait_while(self.lock(), |state| state.is_occupied());
        state.slot = Slot::Exiting;
        self.signal.notify_all();
    }

    pub fn served(&self) -> usize {
        self.lock().served
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.lock().slot, Slot::Exiting)
    }
}

/// Long-lived transmission thread created once per compute worker and pinned
/// to its transmission core for its whole lifetime.
pub struct PooledTransmitter<'scope, 'env> {
    worker_id: usize,
    mailbox: Arc<Mailbox<'env>>,
    handle: Option<ScopedJoinHandle<'scope, usize>>,
}

impl<'scope, 'env> PooledTransmitter<'scope, 'env> {
    pub fn spawn(
        scope: &'scope Scope<'scope, 'env>,
        worker_id: usize,
        core_id: usize,
        binder: &'env dyn CoreBinder,
        clock: &'env Clock,
    ) -> Result<Self, LaunchError> {
        let mailbox = Arc::new(Mailbox::new());
        let remote = Arc::clone(&mailbox);

        let handle = thread::Builder::new()
            .name(format!("pooled-{}", worker_id))
            .spawn_scoped(scope, move || serve(&remote, worker_id, core_id, binder, clock))
            .map_err(|source| LaunchError::Spawn {
                worker: worker_id,
                source,
            })?;

        Ok(Self {
            worker_id,
            mailbox,
            handle: Some(handle),
        })
    }

    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    pub fn submit(&self, task: TransmissionTask<'env>) -> Result<(), LaunchError> {
        self.mailbox.submit(task)
    }

    pub fn wait_idle(&self) -> Option<TransmitReport> {
        self.mailbox.wait_idle()
    }

    /// Closes the mailbox and joins the thread. Returns how many requests it
    /// served.
    pub fn shutdown(mut self) -> usize {
        self.mailbox.close();
        match self.handle.take().map(ScopedJoinHandle::join) {
            Some(Ok(served)) => served,
            Some(Err(panic)) => std::panic::resume_unwind(panic),
            None => self.mailbox.served(),
        }
    }
}

impl Drop for PooledTransmitter<'_, '_> {
    fn drop(&mut self) {
        // the enclosing scope joins the thread, it only has to be told to stop
        if self.handle.is_some() {
            self.mailbox.close();
        }
    }
}

fn serve(
    mailbox: &Mailbox<'_>,
    worker_id: usize,
    core_id: usize,
    binder: &dyn CoreBinder,
    clock: &Clock,
) -> usize {
    pin_current(binder, "pooled", worker_id, core_id);

    while let Some(task) = mailbox.take() {
        let report = transmit(task, clock);
        mailbox.complete(report);
    }

    debug!(worker = worker_id, served = mailbox.served(), "pooled transmitter exiting");
    mailbox.served()
}
