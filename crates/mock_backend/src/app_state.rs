use std::{
    collections::HashMap,
    sync::Arc,
};

use axum::http::StatusCode;
use shared::{
    domain::{Machine, MachineStatus, SampleRecord},
    protocol::log_file_name,
};
use tokio::sync::{Mutex, Notify};

/// Backend routes whose behaviour tests can override or hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Machines,
    Statuses,
    Samples,
    Command,
    Logs,
}

/// A fixed response served instead of the normal handler output.
#[derive(Debug, Clone)]
pub struct CannedResponse {
    pub status: StatusCode,
    pub body: String,
}

#[derive(Default)]
pub(crate) struct BackendState {
    pub(crate) machines: Vec<Machine>,
    pub(crate) list_as_map: bool,
    pub(crate) statuses: HashMap<String, MachineStatus>,
    pub(crate) start_state: Option<MachineStatus>,
    /// Newest first, per machine name.
    pub(crate) samples: HashMap<String, Vec<SampleRecord>>,
    /// Keyed by log file name, e.g. `Roche_Cobas.log`.
    pub(crate) logs: HashMap<String, Vec<String>>,
    pub(crate) canned: HashMap<Endpoint, CannedResponse>,
    pub(crate) holds: HashMap<Endpoint, Arc<Notify>>,
    pub(crate) requests: HashMap<Endpoint, usize>,
    pub(crate) commands: Vec<(String, String)>,
}

impl BackendState {
    pub(crate) fn status_of(&self, name: &str) -> MachineStatus {
        self.statuses.get(name).cloned().unwrap_or_default()
    }

    pub(crate) fn is_configured(&self, name: &str) -> bool {
        self.machines.iter().any(|machine| machine.name == name)
    }

    pub(crate) fn append_log(&mut self, machine: &str, line: String) {
        self.logs
            .entry(log_file_name(machine))
            .or_default()
            .push(line);
    }
}

/// In-memory stand-in for the instrument backend.
///
/// Cloning shares the same state, so a test can keep a handle while the
/// server task owns another.
#[derive(Clone, Default)]
pub struct MockBackend {
    pub(crate) inner: Arc<Mutex<BackendState>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with_machines(machines: Vec<Machine>) -> Self {
        let backend = Self::new();
        backend.set_machines(machines).await;
        backend
    }

    pub async fn set_machines(&self, machines: Vec<Machine>) {
        let mut guard = self.inner.lock().await;
        for machine in &machines {
            guard
                .statuses
                .entry(machine.name.clone())
                .or_insert(MachineStatus::Stopped);
        }
        guard.machines = machines;
    }

    /// Serve `/api/machines` as a name-keyed object instead of a list.
    pub async fn list_machines_as_map(&self, enabled: bool) {
        self.inner.lock().await.list_as_map = enabled;
    }

    pub async fn set_status(&self, machine: &str, status: MachineStatus) {
        self.inner
            .lock()
            .await
            .statuses
            .insert(machine.to_string(), status);
    }

    pub async fn status_of(&self, machine: &str) -> MachineStatus {
        self.inner.lock().await.status_of(machine)
    }

    /// State reported (and stored) after a successful start; `Running` when unset.
    pub async fn set_start_state(&self, state: MachineStatus) {
        self.inner.lock().await.start_state = Some(state);
    }

    pub async fn push_sample(&self, machine: &str, record: SampleRecord) {
        self.inner
            .lock()
            .await
            .samples
            .entry(machine.to_string())
            .or_default()
            .insert(0, record);
    }

    pub async fn respond_with(&self, endpoint: Endpoint, status: StatusCode, body: impl Into<String>) {
        self.inner.lock().await.canned.insert(
            endpoint,
            CannedResponse {
                status,
                body: body.into(),
            },
        );
    }

    pub async fn clear_response(&self, endpoint: Endpoint) {
        self.inner.lock().await.canned.remove(&endpoint);
    }

    /// Holds the next request to `endpoint` after its response body has been
    /// computed, until the returned gate is notified.
    pub async fn hold_next(&self, endpoint: Endpoint) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.inner
            .lock()
            .await
            .holds
            .insert(endpoint, Arc::clone(&gate));
        gate
    }

    pub async fn request_count(&self, endpoint: Endpoint) -> usize {
        self.inner
            .lock()
            .await
            .requests
            .get(&endpoint)
            .copied()
            .unwrap_or(0)
    }

    /// Commands received so far as `(machine, action)`, including rejected ones.
    pub async fn commands(&self) -> Vec<(String, String)> {
        self.inner.lock().await.commands.clone()
    }

    pub async fn log_lines(&self, machine: &str) -> Vec<String> {
        self.inner
            .lock()
            .await
            .logs
            .get(&log_file_name(machine))
            .cloned()
            .unwrap_or_default()
    }
}
