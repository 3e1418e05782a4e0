//! Session-owned cache of reconciled dashboard state.
//!
//! Each slice has its own setter and a setter never touches another slice,
//! so a failed fetch of one resource leaves the others as they were.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use shared::{
    domain::{Machine, MachineStatus, SampleRecord},
    protocol::{SampleMap, StatusMap},
};
use tokio::sync::broadcast;
use tracing::debug;

/// Which slice of the store changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    Machines,
    Statuses,
    Samples,
    ActionLock { machine: String, busy: bool },
    Error,
    Loading,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DashboardState {
    pub machines: Vec<Machine>,
    pub statuses: StatusMap,
    pub samples: SampleMap,
    pub busy: HashMap<String, bool>,
    pub error: Option<String>,
    pub loading: bool,
}

impl DashboardState {
    /// Missing entries read as `Stopped`.
    pub fn status_of(&self, machine: &str) -> MachineStatus {
        self.statuses.get(machine).cloned().unwrap_or_default()
    }

    pub fn is_busy(&self, machine: &str) -> bool {
        self.busy.get(machine).copied().unwrap_or(false)
    }

    pub fn recent_samples(&self, machine: &str) -> &[SampleRecord] {
        self.samples.get(machine).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn machine(&self, name: &str) -> Option<&Machine> {
        self.machines.iter().find(|machine| machine.name == name)
    }
}

pub struct StateStore {
    inner: Mutex<DashboardState>,
    changes: broadcast::Sender<StoreChange>,
}

impl Default for StateStore {
    fn default() -> Self {
        let (changes, _) = broadcast::channel(256);
        Self {
            inner: Mutex::new(DashboardState::default()),
            changes,
        }
    }
}

impl StateStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> MutexGuard<'_, DashboardState> {
        // No code panics while holding the guard; recover the data regardless.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, change: StoreChange) {
        let _ = self.changes.send(change);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    pub fn snapshot(&self) -> DashboardState {
        self.state().clone()
    }

    pub fn set_machines(&self, machines: Vec<Machine>) {
        self.state().machines = machines;
        self.notify(StoreChange::Machines);
    }

    pub fn set_statuses(&self, statuses: StatusMap) {
        self.state().statuses = statuses;
        self.notify(StoreChange::Statuses);
    }

    /// Single-entry status write, used for the optimistic post-command update.
    pub fn set_status(&self, machine: &str, status: MachineStatus) {
        self.state().statuses.insert(machine.to_string(), status);
        self.notify(StoreChange::Statuses);
    }

    pub fn set_samples(&self, samples: SampleMap) {
        self.state().samples = samples;
        self.notify(StoreChange::Samples);
    }

    pub fn set_error(&self, error: Option<String>) {
        self.state().error = error;
        self.notify(StoreChange::Error);
    }

    pub fn error(&self) -> Option<String> {
        self.state().error.clone()
    }

    pub fn set_loading(&self, loading: bool) {
        self.state().loading = loading;
        self.notify(StoreChange::Loading);
    }

    pub fn is_loading(&self) -> bool {
        self.state().loading
    }

    pub fn set_action_busy(&self, machine: &str, busy: bool) {
        self.state().busy.insert(machine.to_string(), busy);
        self.notify(StoreChange::ActionLock {
            machine: machine.to_string(),
            busy,
        });
    }

    pub fn is_busy(&self, machine: &str) -> bool {
        self.state().is_busy(machine)
    }

    pub fn status_of(&self, machine: &str) -> MachineStatus {
        self.state().status_of(machine)
    }

    /// Takes the action lock for `machine` if it is free.
    ///
    /// The check and the set happen under one guard, so two dispatches for the
    /// same machine can never both succeed. The lock is released when the
    /// returned guard drops.
    pub fn try_acquire_action(self: &Arc<Self>, machine: &str) -> Option<ActionGuard> {
        {
            let mut state = self.state();
            if state.is_busy(machine) {
                debug!(machine, "action lock already held");
                return None;
            }
            state.busy.insert(machine.to_string(), true);
        }
        self.notify(StoreChange::ActionLock {
            machine: machine.to_string(),
            busy: true,
        });
        Some(ActionGuard {
            store: Arc::clone(self),
            machine: machine.to_string(),
        })
    }
}

/// Holds a machine's action lock; dropping it releases the lock.
pub struct ActionGuard {
    store: Arc<StateStore>,
    machine: String,
}

impl ActionGuard {
    pub fn machine(&self) -> &str {
        &self.machine
    }
}

impl Drop for ActionGuard {
    fn drop(&mut self) {
        self.store.set_action_busy(&self.machine, false);
    }
}
