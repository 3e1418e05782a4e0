use std::sync::Arc;

use shared::domain::CommandAction;
use tokio::sync::broadcast;
use tracing::{info, warn};
use url::Url;

use crate::{
    config::ClientConfig,
    dispatcher::{CommandDispatcher, DispatchOutcome},
    error::{ConfigError, PreconditionViolation},
    presentation::{self, DashboardView},
    refresh::{LiveRefreshTask, RefreshEngine},
    store::{StateStore, StoreChange},
    transport::{HttpTransport, Transport},
};

/// One operator session: owns the store, the engines that write to it and
/// the live refresh timer.
///
/// Dropping the session (or calling [`DashboardSession::teardown`]) cancels
/// the timer, so repeated sessions never leave a recurring task behind.
pub struct DashboardSession {
    config: ClientConfig,
    store: Arc<StateStore>,
    transport: Arc<dyn Transport>,
    refresh: RefreshEngine,
    dispatcher: CommandDispatcher,
    live: Option<LiveRefreshTask>,
}

impl DashboardSession {
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        let transport = Arc::new(HttpTransport::new(&config)?);
        Ok(Self::with_transport(config, transport))
    }

    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        let store = StateStore::new();
        let refresh = RefreshEngine::new(
            Arc::clone(&transport),
            Arc::clone(&store),
            config.sample_limit,
        );
        let dispatcher =
            CommandDispatcher::new(Arc::clone(&transport), Arc::clone(&store), refresh.clone());
        Self {
            config,
            store,
            transport,
            refresh,
            dispatcher,
            live: None,
        }
    }

    /// Builds a session, runs the bootstrap refresh and starts the timer.
    pub async fn open(config: ClientConfig) -> Result<Self, ConfigError> {
        let mut session = Self::new(config)?;
        session.start().await;
        Ok(session)
    }

    /// Bootstrap refresh followed by the live refresh timer. Only the first
    /// call has any effect.
    pub async fn start(&mut self) {
        if self.live.is_some() {
            warn!("dashboard session already started");
            return;
        }
        self.refresh.bootstrap().await;
        self.live = Some(LiveRefreshTask::spawn(
            self.refresh.clone(),
            self.config.refresh_interval,
        ));
        info!(api_base = %self.config.api_base, "dashboard session started");
    }

    pub fn is_live(&self) -> bool {
        self.live.as_ref().is_some_and(LiveRefreshTask::is_running)
    }

    /// Operator-triggered full reload. The timer is left as it is.
    pub async fn reload(&self) {
        self.refresh.bootstrap().await;
    }

    pub fn view(&self) -> DashboardView {
        presentation::project(&self.store.snapshot())
    }

    /// Gates the action against the current view, then dispatches it.
    pub async fn request(
        &self,
        machine: &str,
        action: CommandAction,
    ) -> Result<DispatchOutcome, PreconditionViolation> {
        presentation::gate_action(&self.view(), machine, action)?;
        Ok(self.dispatcher.dispatch(machine, action).await)
    }

    pub async fn start_machine(
        &self,
        machine: &str,
    ) -> Result<DispatchOutcome, PreconditionViolation> {
        self.request(machine, CommandAction::Start).await
    }

    pub async fn stop_machine(
        &self,
        machine: &str,
    ) -> Result<DispatchOutcome, PreconditionViolation> {
        self.request(machine, CommandAction::Stop).await
    }

    pub fn log_url(&self, machine: &str) -> Option<Url> {
        presentation::log_url(&self.config.api_base, machine)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.store.subscribe()
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    pub fn dispatcher(&self) -> &CommandDispatcher {
        &self.dispatcher
    }

    pub fn refresh_engine(&self) -> &RefreshEngine {
        &self.refresh
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn teardown(mut self) {
        if let Some(live) = self.live.take() {
            live.stop();
        }
        info!("dashboard session closed");
    }
}
