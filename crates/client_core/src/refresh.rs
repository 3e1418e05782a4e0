use std::{sync::Arc, time::Duration};

use shared::{
    domain::Machine,
    protocol::{
        machine_samples_route, machine_status_route, machines_route, MachineListPayload,
        SampleMap, StatusMap,
    },
};
use tokio::{
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::{
    error::TransportError,
    store::StateStore,
    transport::{decode, ApiPath, RequestOptions, Transport},
};

/// Resource fetched by a refresh; each failure is reported on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Machines,
    Statuses,
    Samples,
}

impl Resource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Machines => "machines",
            Self::Statuses => "statuses",
            Self::Samples => "samples",
        }
    }

    pub fn failure_message(self, err: &TransportError) -> String {
        match self {
            Self::Machines => format!("Failed to load machines: {err}"),
            Self::Statuses => format!("Failed to load machine status: {err}"),
            Self::Samples => format!("Failed to load recent samples: {err}"),
        }
    }
}

/// Pulls backend resources into the store.
///
/// Each resource is written to the store as soon as its own response
/// settles. Overlapping refreshes are not serialised: the response that
/// resolves last overwrites the slice.
#[derive(Clone)]
pub struct RefreshEngine {
    transport: Arc<dyn Transport>,
    store: Arc<StateStore>,
    sample_limit: u32,
}

impl RefreshEngine {
    pub fn new(transport: Arc<dyn Transport>, store: Arc<StateStore>, sample_limit: u32) -> Self {
        Self {
            transport,
            store,
            sample_limit,
        }
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    /// Full refresh: registry, statuses and samples, with the loading flag
    /// raised and the error slot cleared first.
    pub async fn bootstrap(&self) {
        self.store.set_loading(true);
        self.store.set_error(None);

        tokio::join!(
            self.refresh_machines(),
            self.refresh_statuses(),
            self.refresh_samples()
        );

        self.store.set_loading(false);
        info!(
            machines = self.store.snapshot().machines.len(),
            error = self.store.error().is_some(),
            "bootstrap refresh settled"
        );
    }

    /// Lightweight refresh of statuses and samples. Leaves the loading flag
    /// and any previous error alone.
    pub async fn live_refresh(&self) {
        tokio::join!(self.refresh_statuses(), self.refresh_samples());
        debug!("live refresh settled");
    }

    async fn refresh_machines(&self) {
        match self.fetch_machines().await {
            Ok(machines) => self.store.set_machines(machines),
            Err(err) => self.record_failure(Resource::Machines, &err),
        }
    }

    async fn refresh_statuses(&self) {
        match self.fetch_statuses().await {
            Ok(statuses) => self.store.set_statuses(statuses),
            Err(err) => self.record_failure(Resource::Statuses, &err),
        }
    }

    async fn refresh_samples(&self) {
        match self.fetch_samples().await {
            Ok(samples) => self.store.set_samples(samples),
            Err(err) => self.record_failure(Resource::Samples, &err),
        }
    }

    fn record_failure(&self, resource: Resource, err: &TransportError) {
        warn!(resource = resource.as_str(), error = %err, "refresh failed");
        self.store.set_error(Some(resource.failure_message(err)));
    }

    pub async fn fetch_machines(&self) -> Result<Vec<Machine>, TransportError> {
        let path = ApiPath::route(machines_route());
        let value = self.transport.request(&path, RequestOptions::get()).await?;
        Ok(decode::<MachineListPayload>(&path, value)?.into_machines())
    }

    pub async fn fetch_statuses(&self) -> Result<StatusMap, TransportError> {
        let path = ApiPath::route(machine_status_route());
        let value = self.transport.request(&path, RequestOptions::get()).await?;
        decode(&path, value)
    }

    pub async fn fetch_samples(&self) -> Result<SampleMap, TransportError> {
        let path = ApiPath::route(machine_samples_route());
        let options = RequestOptions::get().query("limit", self.sample_limit);
        let value = self.transport.request(&path, options).await?;
        let mut samples: SampleMap = decode(&path, value)?;
        let limit = self.sample_limit as usize;
        for records in samples.values_mut() {
            records.truncate(limit);
        }
        Ok(samples)
    }
}

/// Recurring live refresh, cancelled when stopped or dropped.
///
/// Each tick runs its refresh as its own task, so a slow backend does not
/// stretch the polling period. Stopping the timer leaves refreshes already
/// in flight to settle.
pub struct LiveRefreshTask {
    handle: JoinHandle<()>,
}

impl LiveRefreshTask {
    /// First tick fires one full `period` after spawning.
    pub fn spawn(engine: RefreshEngine, period: Duration) -> Self {
        let period_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX);
        info!(period_ms, "live refresh timer started");
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let engine = engine.clone();
                tokio::spawn(async move { engine.live_refresh().await });
            }
        });
        Self { handle }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for LiveRefreshTask {
    fn drop(&mut self) {
        self.handle.abort();
        info!("live refresh timer stopped");
    }
}
